//! Arena-backed window tree: splitting, closing, traversal, and the
//! bookkeeping that keeps key-window references from dangling.

use super::{
    FontMetrics, PairBody, Split, StreamResult, Window, WindowBody, WindowError, WindowKind,
};

/// Generation-checked handle to a window.
///
/// Handles stay unique for the life of the tree: a slot reused after a close
/// gets a new generation, so a stale handle is detected instead of silently
/// naming the replacement window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    window: Option<Window>,
}

/// The window tree and its arena of nodes.
///
/// Invariants: every pair has exactly two live children whose parent links
/// point back at it; every non-pair window is a leaf; there is exactly one
/// root, or the tree is empty.
#[derive(Default)]
pub(crate) struct WindowTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: Option<WindowId>,
}

impl WindowTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn root(&self) -> Option<WindowId> {
        self.root
    }

    pub(crate) fn get(&self, id: WindowId) -> Option<&Window> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.window.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.window.as_mut()
    }

    /// Like [`get`], but an invalid handle is a diagnosed usage error.
    pub(crate) fn window(&self, id: WindowId) -> Result<&Window, WindowError> {
        self.get(id).ok_or_else(|| {
            tracing::error!(window = ?id, "invalid window handle");
            WindowError::InvalidWindow
        })
    }

    pub(crate) fn window_mut(&mut self, id: WindowId) -> Result<&mut Window, WindowError> {
        match self.get_mut(id) {
            Some(w) => Ok(w),
            None => {
                tracing::error!(window = ?id, "invalid window handle");
                Err(WindowError::InvalidWindow)
            }
        }
    }

    fn alloc(&mut self, window: Window) -> WindowId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.window = Some(window);
            WindowId {
                index: index as u32,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                window: Some(window),
            });
            WindowId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: WindowId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.window.take().is_some() {
                self.free.push(id.index as usize);
            }
        }
    }

    /// All live windows, in slot order. Used for sweeps; the public
    /// enumeration order is [`iterate`].
    pub(crate) fn ids(&self) -> Vec<WindowId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.window.is_some())
            .map(|(index, slot)| WindowId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Opens a new window.
    ///
    /// The first window must be opened with `split = None` and becomes the
    /// root directly. Every later window names an existing leaf to split: a
    /// pair window (rock 0) takes the leaf's place, with the new window and
    /// the old leaf as its children — the new window first for Above/Left.
    /// The new window starts out as the pair's key window.
    ///
    /// Either the whole operation succeeds or the tree is left untouched.
    pub(crate) fn open(
        &mut self,
        split: Option<WindowId>,
        split_spec: Split,
        kind: WindowKind,
        rock: u32,
        metrics: FontMetrics,
    ) -> Result<WindowId, WindowError> {
        if kind == WindowKind::Pair {
            tracing::error!("pair windows cannot be opened directly");
            return Err(WindowError::WrongWindowKind);
        }
        if let Err(e) = split_spec.validate() {
            tracing::error!(error = %e, "rejected window split");
            return Err(e);
        }

        let Some(split_id) = split else {
            if self.root.is_some() {
                tracing::error!("tried to open a first window while the tree has a root");
                return Err(WindowError::RootExists);
            }
            let id = self.alloc(Window::new_leaf(kind, rock, metrics));
            self.root = Some(id);
            tracing::debug!(window = ?id, ?kind, rock, "opened root window");
            return Ok(id);
        };

        let split_win = self.window(split_id)?;
        if split_win.kind() == WindowKind::Pair {
            tracing::error!(window = ?split_id, "split target must be a leaf window");
            return Err(WindowError::NotALeaf);
        }
        let grandparent = split_win.parent;

        let new_id = self.alloc(Window::new_leaf(kind, rock, metrics));
        let (first, second) = if split_spec.direction.dir_side_first() {
            (new_id, split_id)
        } else {
            (split_id, new_id)
        };
        let pair_id = self.alloc(Window::new_pair(PairBody {
            first,
            second,
            split: split_spec,
            key_window: Some(new_id),
        }));

        // Wire the pair into the split window's old position.
        if let Some(w) = self.get_mut(new_id) {
            w.parent = Some(pair_id);
        }
        if let Some(w) = self.get_mut(split_id) {
            w.parent = Some(pair_id);
        }
        if let Some(w) = self.get_mut(pair_id) {
            w.parent = grandparent;
        }
        match grandparent {
            None => self.root = Some(pair_id),
            Some(g) => {
                if let Some(gp) = self.get_mut(g).and_then(|w| w.pair_mut()) {
                    if gp.first == split_id {
                        gp.first = pair_id;
                    } else {
                        gp.second = pair_id;
                    }
                }
            }
        }

        tracing::debug!(window = ?new_id, ?kind, rock, split = ?split_id, "opened window");
        Ok(new_id)
    }

    /// Closes `id` and destroys its whole subtree.
    ///
    /// The sibling (if any) takes over the position held by the parent
    /// pair, which is destroyed with the subtree. Key-window references
    /// into the destroyed subtree are cleared everywhere first, and pending
    /// input requests on destroyed windows are force-cancelled.
    ///
    /// Returns the closed window's output-stream character counts.
    pub(crate) fn close(&mut self, id: WindowId) -> Result<StreamResult, WindowError> {
        let win = self.window(id)?;
        let result = StreamResult {
            read_count: win.read_count,
            write_count: win.write_count,
        };
        let parent = win.parent;
        let doomed = self.subtree(id);

        for pid in self.ids() {
            let stale = self
                .get(pid)
                .and_then(|w| w.pair())
                .and_then(|p| p.key_window)
                .is_some_and(|k| doomed.contains(&k));
            if stale {
                if let Some(p) = self.get_mut(pid).and_then(|w| w.pair_mut()) {
                    p.key_window = None;
                }
                tracing::debug!(pair = ?pid, "cleared key window pointing into closing subtree");
            }
        }

        for wid in &doomed {
            if let Some(w) = self.get_mut(*wid) {
                if w.input.has_request() {
                    tracing::warn!(window = ?wid, "cancelling input request of closing window");
                    w.input.force_cancel();
                }
            }
        }

        if Some(id) == self.root {
            for wid in doomed {
                self.release(wid);
            }
            self.root = None;
            tracing::debug!(window = ?id, "closed root window; tree is empty");
            return Ok(result);
        }

        let pair_id = parent.ok_or(WindowError::InvalidWindow)?;
        let (first, second) = self
            .get(pair_id)
            .and_then(|w| w.pair())
            .map(|p| (p.first, p.second))
            .ok_or(WindowError::InvalidWindow)?;
        let sibling = if first == id { second } else { first };
        let grandparent = self.get(pair_id).ok_or(WindowError::InvalidWindow)?.parent;

        if let Some(w) = self.get_mut(sibling) {
            w.parent = grandparent;
        }
        match grandparent {
            None => self.root = Some(sibling),
            Some(g) => {
                if let Some(gp) = self.get_mut(g).and_then(|w| w.pair_mut()) {
                    if gp.first == pair_id {
                        gp.first = sibling;
                    } else {
                        gp.second = sibling;
                    }
                }
            }
        }

        for wid in doomed {
            self.release(wid);
        }
        self.release(pair_id);
        tracing::debug!(window = ?id, sibling = ?sibling, "closed window");
        Ok(result)
    }

    /// Pre-order traversal. `None` starts at the root; the order is stable
    /// while the tree is unchanged.
    pub(crate) fn iterate(&self, prev: Option<WindowId>) -> Option<WindowId> {
        let Some(prev) = prev else {
            return self.root;
        };
        let win = self.get(prev)?;
        if let Some(pair) = win.pair() {
            return Some(pair.first);
        }
        let mut cur = prev;
        let mut parent = win.parent;
        while let Some(p) = parent {
            let pw = self.get(p)?;
            if let Some(pair) = pw.pair() {
                if pair.first == cur {
                    return Some(pair.second);
                }
            }
            cur = p;
            parent = pw.parent;
        }
        None
    }

    /// `id` plus all its descendants.
    pub(crate) fn subtree(&self, id: WindowId) -> Vec<WindowId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(w) = self.get(cur) {
                out.push(cur);
                if let Some(p) = w.pair() {
                    stack.push(p.first);
                    stack.push(p.second);
                }
            }
        }
        out
    }

    pub(crate) fn parent(&self, id: WindowId) -> Result<Option<WindowId>, WindowError> {
        Ok(self.window(id)?.parent)
    }

    pub(crate) fn sibling(&self, id: WindowId) -> Result<Option<WindowId>, WindowError> {
        let Some(parent) = self.window(id)?.parent else {
            return Ok(None);
        };
        Ok(self
            .get(parent)
            .and_then(|w| w.pair())
            .map(|p| if p.first == id { p.second } else { p.first }))
    }

    pub(crate) fn is_descendant(&self, node: WindowId, ancestor: WindowId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.get(id).and_then(|w| w.parent);
        }
        false
    }

    /// Changes a pair's split parameters and optionally its key window.
    /// Passing `None` for the key leaves the current key window in place.
    pub(crate) fn set_arrangement(
        &mut self,
        pair_id: WindowId,
        split: Split,
        key: Option<WindowId>,
    ) -> Result<(), WindowError> {
        if self.window(pair_id)?.pair().is_none() {
            tracing::error!(window = ?pair_id, "arrangement target is not a pair window");
            return Err(WindowError::NotAPair);
        }
        if let Err(e) = split.validate() {
            tracing::error!(pair = ?pair_id, error = %e, "rejected split arrangement");
            return Err(e);
        }
        if let Some(k) = key {
            let key_win = self.window(k)?;
            if key_win.kind() == WindowKind::Pair {
                tracing::error!(pair = ?pair_id, key = ?k, "key window cannot be a pair");
                return Err(WindowError::InvalidKeyWindow);
            }
            if !self.is_descendant(k, pair_id) {
                tracing::error!(pair = ?pair_id, key = ?k, "key window is not below the pair");
                return Err(WindowError::InvalidKeyWindow);
            }
        }
        if let Some(p) = self.get_mut(pair_id).and_then(|w| w.pair_mut()) {
            p.split = split;
            if key.is_some() {
                p.key_window = key;
            }
        }
        Ok(())
    }

    pub(crate) fn get_arrangement(
        &self,
        pair_id: WindowId,
    ) -> Result<(Split, Option<WindowId>), WindowError> {
        let pair = self.window(pair_id)?.pair().ok_or_else(|| {
            tracing::error!(window = ?pair_id, "arrangement target is not a pair window");
            WindowError::NotAPair
        })?;
        Ok((pair.split, pair.key_window))
    }

    /// Current size of a window: cells for text windows, pixels for
    /// graphics, zero for blank and pair windows.
    pub(crate) fn measure(&self, id: WindowId) -> Result<(u32, u32), WindowError> {
        let win = self.window(id)?;
        Ok(match &win.body {
            WindowBody::Blank | WindowBody::Pair(_) => (0, 0),
            WindowBody::TextGrid(g) => (u32::from(g.width()), u32::from(g.height())),
            WindowBody::TextBuffer(_) => (
                cells(win.rect.width, win.unit_width),
                cells(win.rect.height, win.unit_height),
            ),
            WindowBody::Graphics(_) => (u32::from(win.rect.width), u32::from(win.rect.height)),
        })
    }

    /// Writes program output into a window. Text grids take it at the
    /// cursor, text buffers accumulate it until the next flush, blank
    /// windows swallow it. Graphics and pair windows have no text stream.
    pub(crate) fn put_string(&mut self, id: WindowId, s: &str) -> Result<(), WindowError> {
        let win = self.window_mut(id)?;
        match &mut win.body {
            WindowBody::TextGrid(g) => {
                let n = g.put_str(s);
                win.write_count = win.write_count.saturating_add(n);
            }
            WindowBody::TextBuffer(b) => {
                b.pending.push_str(s);
                win.write_count = win.write_count.saturating_add(s.chars().count() as u32);
            }
            WindowBody::Blank => {
                win.write_count = win.write_count.saturating_add(s.chars().count() as u32);
            }
            WindowBody::Graphics(_) | WindowBody::Pair(_) => {
                tracing::error!(window = ?id, "window kind cannot accept text output");
                return Err(WindowError::WrongWindowKind);
            }
        }
        Ok(())
    }

    /// Clears a window's content. Illegal while line input is pending.
    pub(crate) fn clear(&mut self, id: WindowId) -> Result<(), WindowError> {
        let win = self.window_mut(id)?;
        if win.input.line_pending() {
            tracing::error!(window = ?id, "cannot clear a window awaiting line input");
            return Err(WindowError::LineInputPending);
        }
        match &mut win.body {
            WindowBody::TextGrid(g) => g.clear(),
            WindowBody::TextBuffer(b) => b.clear(),
            // Erased to the background color; nothing else is stored.
            WindowBody::Graphics(_) => {}
            WindowBody::Blank | WindowBody::Pair(_) => {}
        }
        Ok(())
    }

    pub(crate) fn move_cursor(&mut self, id: WindowId, x: u32, y: u32) -> Result<(), WindowError> {
        let win = self.window_mut(id)?;
        match &mut win.body {
            WindowBody::TextGrid(g) => {
                g.move_cursor(x, y);
                Ok(())
            }
            _ => {
                tracing::error!(window = ?id, "cursor movement requires a text-grid window");
                Err(WindowError::WrongWindowKind)
            }
        }
    }

    pub(crate) fn set_background_color(
        &mut self,
        id: WindowId,
        color: u32,
    ) -> Result<(), WindowError> {
        let win = self.window_mut(id)?;
        match &mut win.body {
            WindowBody::Graphics(g) => {
                g.background = color;
                Ok(())
            }
            _ => {
                tracing::error!(window = ?id, "background color requires a graphics window");
                Err(WindowError::WrongWindowKind)
            }
        }
    }

    /// Flushes all buffered text-buffer output, returning the flushed
    /// chunks for host display.
    pub(crate) fn flush_buffers(&mut self) -> Vec<(WindowId, String)> {
        let mut out = Vec::new();
        for id in self.ids() {
            if let Some(w) = self.get_mut(id) {
                if let WindowBody::TextBuffer(b) = &mut w.body {
                    if let Some(chunk) = b.flush() {
                        out.push((id, chunk));
                    }
                }
            }
        }
        out
    }

    /// Text-buffer window with the largest cell area, used for the final
    /// shutdown message.
    pub(crate) fn largest_text_buffer(&self) -> Option<WindowId> {
        let mut best: Option<(WindowId, u64)> = None;
        let mut cur = self.iterate(None);
        while let Some(id) = cur {
            if let Some(win) = self.get(id) {
                if win.kind() == WindowKind::TextBuffer {
                    let (w, h) = self.measure(id).unwrap_or((0, 0));
                    let area = u64::from(w) * u64::from(h);
                    if best.is_none_or(|(_, a)| area > a) {
                        best = Some((id, area));
                    }
                }
            }
            cur = self.iterate(Some(id));
        }
        best.map(|(id, _)| id)
    }

    /// Structural self-check used by the test suites.
    #[allow(dead_code)]
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        let live = self.ids();
        match self.root {
            None => {
                if !live.is_empty() {
                    return Err(format!("empty tree has {} live windows", live.len()));
                }
                return Ok(());
            }
            Some(root) => {
                if self.get(root).is_none() {
                    return Err("root handle is dead".into());
                }
                if self.get(root).is_some_and(|w| w.parent.is_some()) {
                    return Err("root has a parent".into());
                }
            }
        }

        let mut reachable = 0usize;
        let mut cur = self.iterate(None);
        while let Some(id) = cur {
            reachable += 1;
            if reachable > live.len() {
                return Err("iteration does not terminate".into());
            }
            cur = self.iterate(Some(id));
        }
        if reachable != live.len() {
            return Err(format!(
                "{} live windows but {} reachable from the root",
                live.len(),
                reachable
            ));
        }

        for id in live {
            let win = match self.get(id) {
                Some(w) => w,
                None => return Err("live id is dead".into()),
            };
            if let Some(pair) = win.pair() {
                for child in [pair.first, pair.second] {
                    match self.get(child) {
                        None => return Err(format!("pair {id:?} has a dead child")),
                        Some(c) if c.parent != Some(id) => {
                            return Err(format!("child of {id:?} does not point back"));
                        }
                        Some(_) => {}
                    }
                }
                if let Some(key) = pair.key_window {
                    if self.get(key).is_none() {
                        return Err(format!("pair {id:?} has a dangling key window"));
                    }
                    if !self.is_descendant(key, id) {
                        return Err(format!("key window of {id:?} is outside its subtree"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn cells(length: u16, unit: u16) -> u32 {
    if unit == 0 {
        0
    } else {
        u32::from(length / unit)
    }
}
