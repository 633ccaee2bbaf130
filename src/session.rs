//! Host side of the engine.
//!
//! A [`GlkSession`] owns the window tree and the event queue, runs the
//! program on its own thread, and forwards everything the outside world
//! does: display area changes, key presses, mouse clicks, forced input.
//! The program half of the same state is [`Glk`](crate::glk::Glk).

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{KeyEvent, KeyEventKind};
use ratatui::layout::Rect;
use thiserror::Error;

use crate::cancel::{CancellationToken, GlkResult};
use crate::constants::{DEFAULT_FINAL_MESSAGE, EVENT_PUSH_TIMEOUT, EVENT_QUEUE_MAX_LENGTH};
use crate::event_queue::{Event, EventKind, EventQueue, QueueItem};
use crate::glk::Glk;
use crate::input::{self, KeyOutcome};
use crate::layout;
use crate::timer::TimerControl;
use crate::window::{FontMetrics, WindowId, WindowKind, WindowTree};

/// Build-time knobs for a session.
///
/// The defaults match the historical desktop profile: 8x16 character
/// cells, no gap between panes, and a queue that holds a hundred events.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gap between the two children of every split, in device units.
    pub spacing: u16,
    /// Character cell size used to convert between units and cells.
    pub metrics: FontMetrics,
    /// Printed to the largest buffer window when the program finishes.
    pub final_message: String,
    /// How many items the event queue holds before producers wait.
    pub queue_capacity: usize,
    /// How long a producer waits on a full queue before dropping.
    pub queue_push_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spacing: 0,
            metrics: FontMetrics::default(),
            final_message: DEFAULT_FINAL_MESSAGE.to_owned(),
            queue_capacity: EVENT_QUEUE_MAX_LENGTH,
            queue_push_timeout: EVENT_PUSH_TIMEOUT,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.char_width == 0 || self.metrics.char_height == 0 {
            return Err(ConfigError::ZeroMetrics);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

/// Rejected [`SessionConfig`] values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("font metrics must be nonzero")]
    ZeroMetrics,
    #[error("event queue capacity must be nonzero")]
    ZeroQueueCapacity,
}

#[derive(Debug, Default)]
struct ArrangeFlags {
    /// The program changed the tree; geometry is stale until the host
    /// arranges again.
    needs_rearrange: bool,
    /// The next arrange pass settles a program-side change, so it is not
    /// reported back to the program as an `Arrange` event.
    ignore_next_arrange_event: bool,
}

/// Gate between program-side tree edits and host-side geometry.
#[derive(Debug, Default)]
pub(crate) struct ArrangeSync {
    flags: Mutex<ArrangeFlags>,
    rearranged: Condvar,
}

impl ArrangeSync {
    /// Marks geometry stale after a program-side tree change.
    pub(crate) fn begin_program_change(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        flags.needs_rearrange = true;
        flags.ignore_next_arrange_event = true;
    }

    /// Ends a host arrange pass: wakes size waiters and says whether the
    /// pass should surface as an `Arrange` event.
    pub(crate) fn finish_arrange(&self) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        let report = !flags.ignore_next_arrange_event;
        flags.ignore_next_arrange_event = false;
        flags.needs_rearrange = false;
        self.rearranged.notify_all();
        report
    }

    /// Blocks the program until pending geometry has been settled.
    pub(crate) fn wait_settled(&self, cancel: &CancellationToken) -> GlkResult<()> {
        let mut flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        while flags.needs_rearrange {
            cancel.checkpoint()?;
            flags = self
                .rearranged
                .wait(flags)
                .unwrap_or_else(|err| err.into_inner());
        }
        Ok(())
    }

    pub(crate) fn pending(&self) -> bool {
        self.flags
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .needs_rearrange
    }

    /// Wakes size waiters without settling anything, so a blocked call
    /// re-checks the cancellation token. Taking the lock first closes the
    /// window between a waiter's token check and its wait.
    pub(crate) fn release_waiters(&self) {
        let _flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        self.rearranged.notify_all();
    }

    pub(crate) fn reset(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        *flags = ArrangeFlags::default();
    }
}

#[derive(Debug, Default)]
struct GateFlags {
    /// The program is parked on the final-message prompt.
    awaiting: bool,
    pressed: bool,
}

/// End-of-program rendezvous: after printing the final message the
/// program parks here until the host reports one more keypress.
#[derive(Debug, Default)]
pub(crate) struct ShutdownGate {
    flags: Mutex<GateFlags>,
    released: Condvar,
}

impl ShutdownGate {
    /// Program side. Returns once the host reports a keypress or the
    /// session is cancelled.
    pub(crate) fn await_keypress(&self, cancel: &CancellationToken) {
        let mut flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        flags.awaiting = true;
        while !flags.pressed && !cancel.is_cancelled() {
            flags = self
                .released
                .wait(flags)
                .unwrap_or_else(|err| err.into_inner());
        }
        flags.awaiting = false;
        flags.pressed = false;
    }

    /// Host side: consumes a key if the program is parked at the gate.
    pub(crate) fn report_keypress(&self) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        if !flags.awaiting {
            return false;
        }
        flags.pressed = true;
        self.released.notify_all();
        true
    }

    /// Wakes a parked program so it observes cancellation.
    pub(crate) fn release(&self) {
        let _flags = self.flags.lock().unwrap_or_else(|err| err.into_inner());
        self.released.notify_all();
    }
}

/// State shared between the host session and the program thread.
///
/// Lock order: `windows` before `arrange.flags`; the queue's own lock is
/// a leaf and never held across either.
pub(crate) struct Shared {
    pub(crate) windows: Mutex<WindowTree>,
    pub(crate) events: EventQueue,
    pub(crate) arrange: ArrangeSync,
    pub(crate) cancel: CancellationToken,
    pub(crate) shutdown: ShutdownGate,
    pub(crate) timer: TimerControl,
    pub(crate) running: AtomicBool,
    pub(crate) exited: AtomicBool,
    pub(crate) spacing: AtomicU16,
    pub(crate) metrics: FontMetrics,
    pub(crate) final_message: String,
}

impl Shared {
    pub(crate) fn tree(&self) -> MutexGuard<'_, WindowTree> {
        self.windows.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub(crate) fn spacing(&self) -> u16 {
        self.spacing.load(Ordering::Relaxed)
    }

    pub(crate) fn push_event(&self, event: Event) {
        self.events.push(QueueItem::Event(event));
    }
}

/// Point-in-time copy of one window, for hosts to draw from.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub id: WindowId,
    pub kind: WindowKind,
    pub rock: u32,
    /// Geometry from the most recent arrange pass, in device units.
    pub rect: Rect,
    pub parent: Option<WindowId>,
    /// Grid rows, top to bottom. `None` for other kinds.
    pub grid_rows: Option<Vec<String>>,
    pub grid_cursor: Option<(u16, u16)>,
    /// Buffer text released so far. `None` for other kinds.
    pub buffer_text: Option<String>,
    /// Line input still being composed in this window.
    pub line_input: Option<String>,
    /// Graphics background color, `0x00RRGGBB`.
    pub background: Option<u32>,
    /// The window is waiting for a key press.
    pub char_request: bool,
    /// The window is waiting for a line of input.
    pub line_request: bool,
}

/// A host-side handle on one engine instance.
///
/// The session is the display half: it decides geometry and forwards
/// input. The story program runs on its own thread against a [`Glk`]
/// handle and talks back through the shared event queue. Dropping the
/// session while a program runs detaches the thread; call
/// [`stop`](Self::stop) and [`wait`](Self::wait) for an orderly end.
pub struct GlkSession {
    shared: Arc<Shared>,
    program: Mutex<Option<JoinHandle<()>>>,
}

impl GlkSession {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            windows: Mutex::new(WindowTree::new()),
            events: EventQueue::with_limits(config.queue_capacity, config.queue_push_timeout),
            arrange: ArrangeSync::default(),
            cancel: CancellationToken::default(),
            shutdown: ShutdownGate::default(),
            timer: TimerControl::default(),
            running: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            spacing: AtomicU16::new(config.spacing),
            metrics: config.metrics,
            final_message: config.final_message,
        });
        Ok(Self {
            shared,
            program: Mutex::new(None),
        })
    }

    /// Starts `glk_main` on its own thread.
    ///
    /// One program at a time: a second call while one is running is
    /// diagnosed and ignored. When `glk_main` returns `Ok` the session
    /// gives it the normal send-off (final message, then one keypress);
    /// an `Err` return skips the send-off and tears down quietly.
    pub fn run<F>(&self, glk_main: F)
    where
        F: FnOnce(&Glk) -> GlkResult<()> + Send + 'static,
    {
        if self.shared.running.swap(true, Ordering::Relaxed) {
            tracing::warn!("a program is already running; ignoring run request");
            return;
        }
        self.shared.cancel.reset();
        // A stop() that raced the previous teardown can leave an abort
        // item behind.
        self.shared.events.clear();
        self.shared.exited.store(false, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let handle = thread::spawn(move || {
            let glk = Glk::new(Arc::clone(&shared));
            let outcome = glk_main(&glk);
            glk.finish(outcome);
            shared.running.store(false, Ordering::Relaxed);
        });
        *self.program.lock().unwrap_or_else(|err| err.into_inner()) = Some(handle);
    }

    /// Asks the running program to unwind.
    ///
    /// Returns immediately; pair with [`wait`](Self::wait) to block until
    /// the thread is gone. Does nothing when no program is running.
    pub fn stop(&self) {
        if !self.running() {
            return;
        }
        self.shared.cancel.cancel();
        // Jumps the queue so a program blocked in select wakes now.
        self.shared.events.push_front(QueueItem::Abort);
        self.shared.timer.stop();
        self.shared.arrange.release_waiters();
        self.shared.shutdown.release();
    }

    /// Blocks until the program thread has finished and been joined.
    pub fn wait(&self) {
        let handle = self
            .program
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        if handle.join().is_err() {
            tracing::error!("program thread panicked");
        }
        self.shared.running.store(false, Ordering::Relaxed);
    }

    pub fn running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Gives the tree its display area and recomputes every window's
    /// geometry.
    ///
    /// Call when the area changes, when spacing should take effect, or
    /// when [`needs_arrange`](Self::needs_arrange) turns true. A pass the
    /// program asked for (by opening, closing, or rearranging windows)
    /// settles silently; any other pass that moves a window is reported
    /// as an `Arrange` event, addressed to the smallest subtree that
    /// covers the change.
    pub fn arrange(&self, area: Rect) {
        let (changed, root) = {
            let mut tree = self.shared.tree();
            let changed = layout::arrange_tree(&mut tree, area, self.shared.spacing());
            (changed, tree.root())
        };
        let report = self.shared.arrange.finish_arrange();
        if report {
            if let Some(changed) = changed {
                let win = if Some(changed) == root {
                    None
                } else {
                    Some(changed)
                };
                self.shared.push_event(Event::new(EventKind::Arrange, win, 0, 0));
            }
        }
    }

    /// True when a program-side tree change is waiting for an
    /// [`arrange`](Self::arrange) call.
    pub fn needs_arrange(&self) -> bool {
        self.shared.arrange.pending()
    }

    /// Natural size of the whole tree, in device units.
    pub fn size_request(&self) -> (u32, u32) {
        let tree = self.shared.tree();
        layout::size_request(&tree, self.shared.spacing())
    }

    /// Reports a key press aimed at `win`.
    ///
    /// Returns true when the key was consumed, either by a pending input
    /// request or by the end-of-program prompt (which takes any key, for
    /// any window). Repeats and releases are ignored.
    pub fn key_press(&self, win: WindowId, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if self.shared.shutdown.report_keypress() {
            return true;
        }
        let outcome = {
            let mut tree = self.shared.tree();
            match tree.get_mut(win) {
                Some(target) => input::key_press(target, &key),
                None => {
                    tracing::error!(window = ?win, "key press for an unknown window");
                    return false;
                }
            }
        };
        match outcome {
            KeyOutcome::CharInput(code) => {
                self.shared
                    .push_event(Event::new(EventKind::CharInput, Some(win), code, 0));
                true
            }
            KeyOutcome::LineInput(len) => {
                self.shared
                    .push_event(Event::new(EventKind::LineInput, Some(win), len, 0));
                true
            }
            KeyOutcome::Composing => true,
            KeyOutcome::Ignored => false,
        }
    }

    /// Reports a mouse press at window-local coordinates, in device
    /// units. Delivered only while `win` has a mouse request pending;
    /// one event retires the request. Grid windows report cell
    /// coordinates, graphics windows raw units.
    pub fn mouse_press(&self, win: WindowId, x: u16, y: u16) -> bool {
        let event = {
            let mut tree = self.shared.tree();
            let Some(target) = tree.get_mut(win) else {
                tracing::error!(window = ?win, "mouse press for an unknown window");
                return false;
            };
            if !target.mouse_request {
                return false;
            }
            let (val1, val2) = match target.kind() {
                WindowKind::TextGrid => (
                    u32::from(x / target.unit_width.max(1)),
                    u32::from(y / target.unit_height.max(1)),
                ),
                WindowKind::Graphics => (u32::from(x), u32::from(y)),
                _ => return false,
            };
            target.mouse_request = false;
            Event::new(EventKind::MouseInput, Some(win), val1, val2)
        };
        self.shared.push_event(event);
        true
    }

    /// Reports that the user followed hyperlink `link` in `win`.
    /// Delivered only while `win` has a hyperlink request pending; one
    /// event retires the request.
    pub fn hyperlink_press(&self, win: WindowId, link: u32) -> bool {
        let event = {
            let mut tree = self.shared.tree();
            let Some(target) = tree.get_mut(win) else {
                tracing::error!(window = ?win, "hyperlink press for an unknown window");
                return false;
            };
            if !target.hyperlink_request {
                return false;
            }
            target.hyperlink_request = false;
            Event::new(EventKind::Hyperlink, Some(win), link, 0)
        };
        self.shared.push_event(event);
        true
    }

    /// Queues a key for the program's next character request, even one
    /// it has not made yet. Repeats and releases are ignored.
    pub fn feed_char_input(&self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        self.shared.events.push(QueueItem::ForcedChar(key));
    }

    /// Queues a whole line for the program's next line request.
    pub fn feed_line_input(&self, text: &str) {
        self.shared.events.push(QueueItem::ForcedLine(text.to_owned()));
    }

    /// True while queued forced characters await delivery.
    pub fn char_input_pending(&self) -> bool {
        self.shared.events.has_forced_char()
    }

    /// True while queued forced lines await delivery.
    pub fn line_input_pending(&self) -> bool {
        self.shared.events.has_forced_line()
    }

    /// Tells the program the display surface was invalidated, so graphics
    /// windows should be repainted.
    pub fn redraw(&self) {
        self.shared.push_event(Event::new(EventKind::Redraw, None, 0, 0));
    }

    /// Changes the split gap. Takes effect at the next arrange pass.
    pub fn set_spacing(&self, spacing: u16) {
        self.shared.spacing.store(spacing, Ordering::Relaxed);
    }

    pub fn spacing(&self) -> u16 {
        self.shared.spacing()
    }

    /// Copies out every live window, in tree order.
    pub fn snapshot(&self) -> Vec<WindowSnapshot> {
        let tree = self.shared.tree();
        let mut out = Vec::new();
        let mut cursor = tree.iterate(None);
        while let Some(id) = cursor {
            if let Some(win) = tree.get(id) {
                out.push(WindowSnapshot {
                    id,
                    kind: win.kind(),
                    rock: win.rock,
                    rect: win.rect,
                    parent: win.parent,
                    grid_rows: win.grid().map(|g| g.rows().collect()),
                    grid_cursor: win.grid().map(|g| g.cursor()),
                    buffer_text: win.buffer().map(|b| b.text().to_owned()),
                    line_input: win.input.composition().map(str::to_owned),
                    background: win.graphics().map(|g| g.background()),
                    char_request: win.input.char_pending(),
                    line_request: win.input.line_pending(),
                });
            }
            cursor = tree.iterate(Some(id));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

    use super::*;
    use crate::window::{Split, SplitDirection, SplitMode};

    fn key(code: KeyCode) -> KeyEvent {
        let mut ev = KeyEvent::new(code, KeyModifiers::NONE);
        ev.kind = KeyEventKind::Press;
        ev
    }

    fn session() -> GlkSession {
        GlkSession::new(SessionConfig::default()).unwrap()
    }

    fn open_root_grid(session: &GlkSession) -> WindowId {
        let metrics = session.shared.metrics;
        session
            .shared
            .tree()
            .open(
                None,
                Split::new(SplitDirection::Above, SplitMode::Proportional, 100),
                WindowKind::TextGrid,
                1,
                metrics,
            )
            .unwrap()
    }

    #[test]
    fn config_validation_rejects_degenerate_values() {
        let mut config = SessionConfig::default();
        config.metrics.char_width = 0;
        assert_eq!(
            GlkSession::new(config).err(),
            Some(ConfigError::ZeroMetrics)
        );

        let config = SessionConfig {
            queue_capacity: 0,
            ..SessionConfig::default()
        };
        assert_eq!(
            GlkSession::new(config).err(),
            Some(ConfigError::ZeroQueueCapacity)
        );
    }

    #[test]
    fn program_driven_arrange_is_not_reported() {
        let session = session();
        open_root_grid(&session);
        session.shared.arrange.begin_program_change();
        assert!(session.needs_arrange());

        session.arrange(Rect {
            x: 0,
            y: 0,
            width: 80,
            height: 48,
        });
        assert!(!session.needs_arrange());
        assert_eq!(session.shared.events.len(), 0);

        // A host-driven resize afterwards does get reported.
        session.arrange(Rect {
            x: 0,
            y: 0,
            width: 80,
            height: 64,
        });
        let event = session.shared.events.poll().unwrap();
        assert_eq!(event.kind, EventKind::Arrange);
        assert_eq!(event.win, None);
    }

    #[test]
    fn key_press_completes_a_character_request() {
        let session = session();
        let win = open_root_grid(&session);
        input::request_char(session.shared.tree().window_mut(win).unwrap(), false);

        assert!(session.key_press(win, key(KeyCode::Char('q'))));
        let event = {
            let guard = session.shared.events.pop_blocking();
            match guard {
                QueueItem::Event(event) => event,
                other => panic!("unexpected item {other:?}"),
            }
        };
        assert_eq!(event.kind, EventKind::CharInput);
        assert_eq!(event.win, Some(win));
        assert_eq!(event.val1, u32::from('q'));

        // The request was one-shot.
        assert!(!session.key_press(win, key(KeyCode::Char('q'))));
    }

    #[test]
    fn releases_and_repeats_are_ignored() {
        let session = session();
        let win = open_root_grid(&session);
        input::request_char(session.shared.tree().window_mut(win).unwrap(), false);

        let mut release = key(KeyCode::Char('q'));
        release.kind = KeyEventKind::Release;
        assert!(!session.key_press(win, release));
        assert_eq!(session.shared.events.len(), 0);
    }

    #[test]
    fn mouse_press_scales_grid_coordinates_to_cells() {
        let session = session();
        let win = open_root_grid(&session);
        session.shared.tree().window_mut(win).unwrap().mouse_request = true;

        // 8x16 cells: unit (20, 35) lands in cell (2, 2).
        assert!(session.mouse_press(win, 20, 35));
        let event = session.shared.events.pop_blocking();
        let QueueItem::Event(event) = event else {
            panic!("unexpected item {event:?}");
        };
        assert_eq!(event.kind, EventKind::MouseInput);
        assert_eq!((event.val1, event.val2), (2, 2));

        // One click retires the request.
        assert!(!session.mouse_press(win, 20, 35));
    }

    #[test]
    fn hyperlink_press_needs_a_pending_request() {
        let session = session();
        let win = open_root_grid(&session);
        assert!(!session.hyperlink_press(win, 7));

        session
            .shared
            .tree()
            .window_mut(win)
            .unwrap()
            .hyperlink_request = true;
        assert!(session.hyperlink_press(win, 7));
        let QueueItem::Event(event) = session.shared.events.pop_blocking() else {
            panic!("expected an event");
        };
        assert_eq!(event.kind, EventKind::Hyperlink);
        assert_eq!(event.val1, 7);
    }

    #[test]
    fn shutdown_gate_takes_any_key_while_awaited() {
        let gate = ShutdownGate::default();
        assert!(!gate.report_keypress());

        let gate = Arc::new(gate);
        let cancel = Arc::new(CancellationToken::default());
        let parked = {
            let gate = Arc::clone(&gate);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || gate.await_keypress(&cancel))
        };
        while !gate.report_keypress() {
            thread::sleep(Duration::from_millis(1));
        }
        parked.join().unwrap();
    }

    #[test]
    fn forced_input_flags_track_the_queue() {
        let session = session();
        assert!(!session.char_input_pending());
        session.feed_char_input(key(KeyCode::Char('y')));
        session.feed_line_input("yes");
        assert!(session.char_input_pending());
        assert!(session.line_input_pending());
    }

    #[test]
    fn snapshot_copies_window_content() {
        let session = session();
        let win = open_root_grid(&session);
        session.arrange(Rect {
            x: 0,
            y: 0,
            width: 80,
            height: 32,
        });
        session.shared.tree().put_string(win, "hi").unwrap();

        let shot = session.snapshot();
        assert_eq!(shot.len(), 1);
        assert_eq!(shot[0].id, win);
        assert_eq!(shot[0].kind, WindowKind::TextGrid);
        let rows = shot[0].grid_rows.as_ref().unwrap();
        assert_eq!(rows[0], "hi        ");
        assert_eq!(shot[0].buffer_text, None);
    }
}
