//! Program side of the engine.
//!
//! The story program receives a [`Glk`] handle on its own thread and
//! drives everything through it: opening and closing windows, printing,
//! requesting input, and blocking in [`select`](Glk::select) for the next
//! event. Every blocking call watches the session's cancellation token,
//! so a host [`stop`](crate::session::GlkSession::stop) unwinds the
//! program from whatever it was waiting on.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossterm::event::KeyEvent;

use crate::cancel::{GlkResult, Interrupted};
use crate::event_queue::{Event, EventKind, QueueItem};
use crate::input::{self, KeyOutcome};
use crate::session::Shared;
use crate::window::{Split, StreamResult, WindowError, WindowId, WindowKind};

/// The program-side handle. Created by the session for each run; all
/// methods take `&self` and synchronize internally.
pub struct Glk {
    shared: Arc<Shared>,
}

impl Glk {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Opens a new window.
    ///
    /// The first window opens with `split` of `None` and becomes the
    /// root. Every later call names an existing leaf to halve: a pair
    /// window takes the leaf's place, with the new window on the side
    /// `split_spec` names and the old leaf on the other. The new window
    /// starts as the pair's key window.
    pub fn window_open(
        &self,
        split: Option<WindowId>,
        split_spec: Split,
        kind: WindowKind,
        rock: u32,
    ) -> Result<WindowId, WindowError> {
        let id = {
            let mut tree = self.shared.tree();
            tree.open(split, split_spec, kind, rock, self.shared.metrics)?
        };
        self.shared.arrange.begin_program_change();
        Ok(id)
    }

    /// Closes `win` and everything below it. The sibling takes over the
    /// freed space at the next arrange pass.
    pub fn window_close(&self, win: WindowId) -> Result<StreamResult, WindowError> {
        let result = {
            let mut tree = self.shared.tree();
            tree.close(win)?
        };
        self.shared.arrange.begin_program_change();
        Ok(result)
    }

    /// Walks every live window. Start with `None`, feed the previous
    /// return value back in, stop at `None`.
    pub fn window_iterate(&self, prev: Option<WindowId>) -> Option<WindowId> {
        self.shared.tree().iterate(prev)
    }

    pub fn window_root(&self) -> Option<WindowId> {
        self.shared.tree().root()
    }

    pub fn window_rock(&self, win: WindowId) -> Result<u32, WindowError> {
        Ok(self.shared.tree().window(win)?.rock)
    }

    pub fn window_kind(&self, win: WindowId) -> Result<WindowKind, WindowError> {
        Ok(self.shared.tree().window(win)?.kind())
    }

    /// The pair window directly above `win`; `None` for the root.
    pub fn window_parent(&self, win: WindowId) -> Result<Option<WindowId>, WindowError> {
        self.shared.tree().parent(win)
    }

    /// The other child of `win`'s parent; `None` for the root.
    pub fn window_sibling(&self, win: WindowId) -> Result<Option<WindowId>, WindowError> {
        self.shared.tree().sibling(win)
    }

    /// Current size of `win`: cells for text windows, device units for
    /// graphics, zero for blank and pair windows.
    ///
    /// Blocks until the host has arranged any pending tree change, so
    /// the program always reads settled geometry. A stale handle reads
    /// as zero by zero.
    pub fn window_get_size(&self, win: WindowId) -> GlkResult<(u32, u32)> {
        self.shared.cancel.checkpoint()?;
        self.shared.arrange.wait_settled(&self.shared.cancel)?;
        let tree = self.shared.tree();
        match tree.measure(win) {
            Ok(size) => Ok(size),
            Err(_) => Ok((0, 0)),
        }
    }

    /// Changes how the pair `pair` divides its space. A `key` of `None`
    /// keeps the current key window.
    pub fn window_set_arrangement(
        &self,
        pair: WindowId,
        split_spec: Split,
        key: Option<WindowId>,
    ) -> Result<(), WindowError> {
        {
            let mut tree = self.shared.tree();
            tree.set_arrangement(pair, split_spec, key)?;
        }
        self.shared.arrange.begin_program_change();
        Ok(())
    }

    pub fn window_get_arrangement(
        &self,
        pair: WindowId,
    ) -> Result<(Split, Option<WindowId>), WindowError> {
        self.shared.tree().get_arrangement(pair)
    }

    /// Prints to a text window. Grid output lands immediately at the
    /// cursor; buffer output is held back until the next
    /// `select`-family call so the display stays coherent.
    pub fn put_string(&self, win: WindowId, text: &str) -> Result<(), WindowError> {
        self.shared.tree().put_string(win, text)
    }

    /// Erases `win`: grids blank their cells, buffers drop their text,
    /// graphics windows repaint the background.
    pub fn window_clear(&self, win: WindowId) -> Result<(), WindowError> {
        self.shared.tree().clear(win)
    }

    /// Moves a grid window's output cursor. Coordinates past the edge
    /// park the cursor off-screen rather than wrap.
    pub fn window_move_cursor(&self, win: WindowId, x: u32, y: u32) -> Result<(), WindowError> {
        self.shared.tree().move_cursor(win, x, y)
    }

    /// Sets a graphics window's background color (`0x00RRGGBB`), used at
    /// the next clear.
    pub fn window_set_background_color(
        &self,
        win: WindowId,
        color: u32,
    ) -> Result<(), WindowError> {
        self.shared.tree().set_background_color(win, color)
    }

    /// Asks for one Latin-1 key press in `win`.
    pub fn request_char_event(&self, win: WindowId) -> Result<(), WindowError> {
        self.request_char(win, false)
    }

    /// Asks for one Unicode key press in `win`.
    pub fn request_char_event_uni(&self, win: WindowId) -> Result<(), WindowError> {
        self.request_char(win, true)
    }

    fn request_char(&self, win: WindowId, unicode: bool) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        match target.kind() {
            WindowKind::TextGrid | WindowKind::TextBuffer | WindowKind::Graphics => {}
            kind => {
                tracing::error!(window = ?win, ?kind, "window kind cannot take character input");
                return Err(WindowError::WrongWindowKind);
            }
        }
        if target.input.has_request() {
            tracing::warn!(window = ?win, "replacing a pending input request");
        }
        input::request_char(target, unicode);
        Ok(())
    }

    /// Retracts a pending character request. Harmless when none is
    /// pending.
    pub fn cancel_char_event(&self, win: WindowId) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        input::cancel_char(target);
        Ok(())
    }

    /// Asks for a line of Latin-1 input in `win`, seeded with `initial`.
    /// At most `maxlen` characters are kept; a grid caps that further at
    /// the room left on the cursor's row.
    pub fn request_line_event(
        &self,
        win: WindowId,
        maxlen: u32,
        initial: &str,
    ) -> Result<(), WindowError> {
        self.request_line(win, false, maxlen, initial)
    }

    /// Unicode variant of [`request_line_event`](Self::request_line_event).
    pub fn request_line_event_uni(
        &self,
        win: WindowId,
        maxlen: u32,
        initial: &str,
    ) -> Result<(), WindowError> {
        self.request_line(win, true, maxlen, initial)
    }

    fn request_line(
        &self,
        win: WindowId,
        unicode: bool,
        maxlen: u32,
        initial: &str,
    ) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        match target.kind() {
            WindowKind::TextGrid | WindowKind::TextBuffer => {}
            kind => {
                tracing::error!(window = ?win, ?kind, "window kind cannot take line input");
                return Err(WindowError::WrongWindowKind);
            }
        }
        if target.input.has_request() {
            tracing::warn!(window = ?win, "replacing a pending input request");
        }
        input::request_line(target, unicode, maxlen, initial);
        Ok(())
    }

    /// Retracts a pending line request. Whatever was composed so far is
    /// returned as an already-completed line event instead of being
    /// delivered through the queue.
    pub fn cancel_line_event(&self, win: WindowId) -> Result<Option<Event>, WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        Ok(input::cancel_line(target)
            .map(|len| Event::new(EventKind::LineInput, Some(win), len, 0)))
    }

    /// Retrieves the text of the most recent completed line event in
    /// `win`. Each completed line can be taken once.
    pub fn take_line_input(&self, win: WindowId) -> Result<Option<String>, WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        Ok(input::take_line_input(target))
    }

    /// Asks for one mouse click in a grid or graphics window.
    pub fn request_mouse_event(&self, win: WindowId) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        match target.kind() {
            WindowKind::TextGrid | WindowKind::Graphics => {
                target.mouse_request = true;
                Ok(())
            }
            kind => {
                tracing::error!(window = ?win, ?kind, "window kind cannot take mouse input");
                Err(WindowError::WrongWindowKind)
            }
        }
    }

    pub fn cancel_mouse_event(&self, win: WindowId) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        tree.window_mut(win)?.mouse_request = false;
        Ok(())
    }

    /// Asks for one hyperlink activation in a text window.
    pub fn request_hyperlink_event(&self, win: WindowId) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        let target = tree.window_mut(win)?;
        match target.kind() {
            WindowKind::TextGrid | WindowKind::TextBuffer => {
                target.hyperlink_request = true;
                Ok(())
            }
            kind => {
                tracing::error!(window = ?win, ?kind, "window kind cannot report hyperlinks");
                Err(WindowError::WrongWindowKind)
            }
        }
    }

    pub fn cancel_hyperlink_event(&self, win: WindowId) -> Result<(), WindowError> {
        let mut tree = self.shared.tree();
        tree.window_mut(win)?.hyperlink_request = false;
        Ok(())
    }

    /// Starts recurring timer events every `millisecs` milliseconds, or
    /// stops them when `millisecs` is zero. A new interval replaces the
    /// old one from now, not from the last tick.
    pub fn request_timer_events(&self, millisecs: u32) {
        if millisecs == 0 {
            self.shared.timer.stop();
            return;
        }
        let generation = self.shared.timer.restart();
        let interval = Duration::from_millis(u64::from(millisecs));
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || {
            loop {
                if !shared.timer.sleep_interval(generation, interval) {
                    return;
                }
                if shared.cancel.is_cancelled() {
                    return;
                }
                shared.push_event(Event::new(EventKind::Timer, None, 0, 0));
            }
        });
    }

    /// Blocks until an event is available and returns it.
    ///
    /// Buffered text-window output is released first, so the display is
    /// current while the program waits. Forced input queued by the host
    /// is resolved here: a forced key or line is matched against the
    /// first window in tree order with a fitting request, and otherwise
    /// held back without losing its place in line.
    pub fn select(&self) -> GlkResult<Event> {
        self.shared.cancel.checkpoint()?;
        self.flush();
        let event = self.next_event()?;
        self.tick()?;
        Ok(event)
    }

    /// Returns the oldest internally generated event without blocking.
    ///
    /// Only events the program did not request directly qualify: timer
    /// ticks, arrange and redraw notices, sound notifications. Input
    /// events are left queued for a real [`select`](Self::select).
    pub fn select_poll(&self) -> GlkResult<Option<Event>> {
        self.shared.cancel.checkpoint()?;
        self.flush();
        let event = self.shared.events.poll();
        self.tick()?;
        Ok(event)
    }

    /// Cooperative yield point. Long-running loops that do not call
    /// [`select`](Self::select) should call this now and then so a host
    /// stop request gets through.
    pub fn tick(&self) -> GlkResult<()> {
        self.shared.cancel.checkpoint()
    }

    /// Ends the program the polite way: prints the final message to the
    /// largest buffer window and parks until the host reports one more
    /// keypress.
    ///
    /// Returns the unwind value, so the last line of a program can be
    /// `return Err(glk.exit());`. Returning `Ok(())` from the program
    /// without calling this gets the same send-off from the session.
    pub fn exit(&self) -> Interrupted {
        self.exit_rendezvous();
        self.shared.exited.store(true, Ordering::Relaxed);
        Interrupted
    }

    /// Runs the appropriate shutdown path once `glk_main` has returned.
    pub(crate) fn finish(&self, outcome: GlkResult<()>) {
        if !self.shared.exited.load(Ordering::Relaxed) {
            match outcome {
                Ok(()) => self.exit_rendezvous(),
                Err(Interrupted) => self.quiesce(),
            }
        }
        self.teardown();
    }

    fn next_event(&self) -> GlkResult<Event> {
        match self.shared.events.pop_blocking() {
            QueueItem::Event(event) => Ok(event),
            QueueItem::Abort => {
                // Only the host's stop path queues this, after firing the
                // token; anything else is a bug in the engine.
                assert!(
                    self.shared.cancel.is_cancelled(),
                    "abort queued without cancellation"
                );
                Err(Interrupted)
            }
            QueueItem::ForcedChar(key) => {
                if let Some(event) = self.deliver_forced_char(&key) {
                    return Ok(event);
                }
                // Nobody wants a key right now: hand out the next event
                // and put the key back at the head of the line.
                let event = self.next_event()?;
                self.shared.events.push_front(QueueItem::ForcedChar(key));
                Ok(event)
            }
            QueueItem::ForcedLine(line) => {
                if let Some(event) = self.deliver_forced_line(&line) {
                    return Ok(event);
                }
                let event = self.next_event()?;
                self.shared.events.push_front(QueueItem::ForcedLine(line));
                Ok(event)
            }
        }
    }

    /// Hands a queued forced key to the first window with a character
    /// request.
    fn deliver_forced_char(&self, key: &KeyEvent) -> Option<Event> {
        let mut tree = self.shared.tree();
        let mut cursor = tree.iterate(None);
        while let Some(id) = cursor {
            if let Some(win) = tree.get_mut(id) {
                if win.input.char_pending() {
                    if let KeyOutcome::CharInput(code) = input::key_press(win, key) {
                        return Some(Event::new(EventKind::CharInput, Some(id), code, 0));
                    }
                }
            }
            cursor = tree.iterate(Some(id));
        }
        None
    }

    /// Hands a queued forced line to the first window with a line
    /// request.
    fn deliver_forced_line(&self, line: &str) -> Option<Event> {
        let mut tree = self.shared.tree();
        let mut cursor = tree.iterate(None);
        while let Some(id) = cursor {
            if let Some(win) = tree.get_mut(id) {
                if win.input.line_pending() {
                    if let Some(len) = input::finish_line_with(win, line) {
                        return Some(Event::new(EventKind::LineInput, Some(id), len, 0));
                    }
                }
            }
            cursor = tree.iterate(Some(id));
        }
        None
    }

    fn flush(&self) {
        let mut tree = self.shared.tree();
        let _ = tree.flush_buffers();
    }

    /// Normal send-off: quiesce input, print the final message, wait for
    /// one last keypress.
    fn exit_rendezvous(&self) {
        self.quiesce();
        let target = self.shared.tree().largest_text_buffer();
        if let Some(win) = target {
            let mut tree = self.shared.tree();
            let farewell = format!("\n{}\n", self.shared.final_message);
            let _ = tree.put_string(win, &farewell);
            let _ = tree.flush_buffers();
        }
        self.shared.shutdown.await_keypress(&self.shared.cancel);
    }

    /// Stops event sources and retires pending input so nothing fires
    /// into a finished program.
    fn quiesce(&self) {
        self.shared.timer.stop();
        {
            let mut tree = self.shared.tree();
            for id in tree.ids() {
                if let Some(win) = tree.get_mut(id) {
                    if win.input.char_pending() {
                        input::cancel_char(win);
                    } else if win.input.line_pending() {
                        let _ = input::cancel_line(win);
                    }
                }
            }
            let _ = tree.flush_buffers();
        }
        // Let a pending arrange land before anyone measures the tree;
        // a host that stops instead of arranging unblocks this too.
        let _ = self.shared.arrange.wait_settled(&self.shared.cancel);
    }

    /// Returns the session to its idle state: no windows, an empty
    /// queue, a re-armed cancellation token.
    fn teardown(&self) {
        {
            let mut tree = self.shared.tree();
            if let Some(root) = tree.root() {
                let _ = tree.close(root);
            }
        }
        self.shared.events.clear();
        self.shared.arrange.reset();
        self.shared.cancel.reset();
    }
}
