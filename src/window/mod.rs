//! Window kinds, split descriptions, and the per-window state record.

mod text_grid;
pub(crate) mod tree;

use ratatui::layout::{Direction, Rect};
use thiserror::Error;

use crate::constants::{DEFAULT_CHAR_HEIGHT, DEFAULT_CHAR_WIDTH, PROPORTION_MAX};
use crate::input::InputState;

pub use text_grid::TextGridContent;
pub use tree::WindowId;
pub(crate) use tree::WindowTree;

/// Usage errors for the window API.
///
/// These are diagnostics, not process failures: the offending call logs the
/// problem and leaves the tree exactly as it was.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    /// The handle no longer names a live window.
    #[error("invalid or stale window handle")]
    InvalidWindow,
    /// A split target must be an existing leaf window.
    #[error("split target is a pair window, not a leaf")]
    NotALeaf,
    /// The operation is only meaningful on a pair window.
    #[error("window is not a pair")]
    NotAPair,
    /// The window's kind does not support this operation.
    #[error("operation does not apply to this window kind")]
    WrongWindowKind,
    /// Split parameters were out of range or inconsistent.
    #[error("invalid split: {0}")]
    InvalidSplit(&'static str),
    /// A first window was opened while the tree already has a root.
    #[error("tree already has a root window")]
    RootExists,
    /// A key window must be a non-pair descendant of its pair.
    #[error("key window is not a non-pair descendant of the pair")]
    InvalidKeyWindow,
    /// The operation is illegal while line input is pending on the window.
    #[error("line input is pending on this window")]
    LineInputPending,
}

/// The closed set of window kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Draws nothing and accepts no input.
    Blank,
    /// Fixed grid of character cells with an output cursor.
    TextGrid,
    /// Scrolling stream of text.
    TextBuffer,
    /// Pixel canvas; this engine tracks only its size and background color.
    Graphics,
    /// Internal split node; always has exactly two children.
    Pair,
}

/// Which edge of the split window the new window appears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    Above,
    Below,
    Left,
    Right,
}

impl SplitDirection {
    /// Axis the children are laid out along.
    pub fn direction(self) -> Direction {
        match self {
            SplitDirection::Above | SplitDirection::Below => Direction::Vertical,
            SplitDirection::Left | SplitDirection::Right => Direction::Horizontal,
        }
    }

    /// Above and Left place the direction side first in child order; the
    /// same side carries the computed length during arrangement.
    pub(crate) fn dir_side_first(self) -> bool {
        matches!(self, SplitDirection::Above | SplitDirection::Left)
    }
}

/// How a pair divides its length between the two children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// The key-window side gets `size` multiples of the key window's unit
    /// length; without a key window it gets zero.
    Fixed,
    /// The direction side gets `size` percent of the available length.
    Proportional,
}

/// Split parameters of a pair window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub direction: SplitDirection,
    pub mode: SplitMode,
    pub size: u32,
}

impl Split {
    pub fn new(direction: SplitDirection, mode: SplitMode, size: u32) -> Self {
        Self {
            direction,
            mode,
            size,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), WindowError> {
        if self.mode == SplitMode::Proportional && self.size > PROPORTION_MAX {
            return Err(WindowError::InvalidSplit(
                "proportional size is a percentage and cannot exceed 100",
            ));
        }
        Ok(())
    }
}

/// Character counts of a window's output stream, reported when the window
/// closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamResult {
    pub read_count: u32,
    pub write_count: u32,
}

/// Measured size of one character cell, in device units. Text-grid and
/// text-buffer windows inherit these as their unit lengths when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub char_width: u16,
    pub char_height: u16,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            char_width: DEFAULT_CHAR_WIDTH,
            char_height: DEFAULT_CHAR_HEIGHT,
        }
    }
}

/// Scrolled-off text plus the tail not yet released to the host.
#[derive(Debug, Clone, Default)]
pub struct TextBufferContent {
    pub(crate) text: String,
    pub(crate) pending: String,
}

impl TextBufferContent {
    /// Everything flushed so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Moves pending output into the visible text; returns the flushed
    /// chunk when there was one.
    pub(crate) fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let chunk = std::mem::take(&mut self.pending);
        self.text.push_str(&chunk);
        Some(chunk)
    }

    pub(crate) fn clear(&mut self) {
        self.text.clear();
        self.pending.clear();
    }
}

/// What little a headless engine tracks of a graphics window.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsContent {
    pub(crate) background: u32,
}

impl Default for GraphicsContent {
    fn default() -> Self {
        // 0x00RRGGBB, white.
        Self {
            background: 0x00FF_FFFF,
        }
    }
}

impl GraphicsContent {
    pub fn background(&self) -> u32 {
        self.background
    }
}

/// Kind-specific window state.
#[derive(Debug)]
pub(crate) enum WindowBody {
    Blank,
    TextGrid(TextGridContent),
    TextBuffer(TextBufferContent),
    Graphics(GraphicsContent),
    Pair(PairBody),
}

#[derive(Debug)]
pub(crate) struct PairBody {
    pub(crate) first: WindowId,
    pub(crate) second: WindowId,
    pub(crate) split: Split,
    /// Weak: cleared when the referenced window (or an ancestor of it)
    /// closes. A Fixed split without a key window collapses to zero.
    pub(crate) key_window: Option<WindowId>,
}

#[derive(Debug)]
pub(crate) struct Window {
    pub(crate) rock: u32,
    pub(crate) parent: Option<WindowId>,
    /// Rectangle assigned by the last arrangement.
    pub(crate) rect: Rect,
    pub(crate) unit_width: u16,
    pub(crate) unit_height: u16,
    pub(crate) body: WindowBody,
    pub(crate) input: InputState,
    pub(crate) mouse_request: bool,
    pub(crate) hyperlink_request: bool,
    /// Completed line inputs, most recent first.
    pub(crate) history: Vec<String>,
    pub(crate) read_count: u32,
    pub(crate) write_count: u32,
}

impl Window {
    pub(crate) fn new_leaf(kind: WindowKind, rock: u32, metrics: FontMetrics) -> Self {
        let (unit_width, unit_height, body) = match kind {
            WindowKind::Blank => (0, 0, WindowBody::Blank),
            WindowKind::TextGrid => (
                metrics.char_width,
                metrics.char_height,
                WindowBody::TextGrid(TextGridContent::default()),
            ),
            WindowKind::TextBuffer => (
                metrics.char_width,
                metrics.char_height,
                WindowBody::TextBuffer(TextBufferContent::default()),
            ),
            WindowKind::Graphics => (1, 1, WindowBody::Graphics(GraphicsContent::default())),
            WindowKind::Pair => unreachable!("pair windows are created by splitting"),
        };
        Self {
            rock,
            parent: None,
            rect: Rect::ZERO,
            unit_width,
            unit_height,
            body,
            input: InputState::default(),
            mouse_request: false,
            hyperlink_request: false,
            history: Vec::new(),
            read_count: 0,
            write_count: 0,
        }
    }

    pub(crate) fn new_pair(pair: PairBody) -> Self {
        Self {
            rock: 0,
            parent: None,
            rect: Rect::ZERO,
            unit_width: 0,
            unit_height: 0,
            body: WindowBody::Pair(pair),
            input: InputState::default(),
            mouse_request: false,
            hyperlink_request: false,
            history: Vec::new(),
            read_count: 0,
            write_count: 0,
        }
    }

    pub(crate) fn kind(&self) -> WindowKind {
        match self.body {
            WindowBody::Blank => WindowKind::Blank,
            WindowBody::TextGrid(_) => WindowKind::TextGrid,
            WindowBody::TextBuffer(_) => WindowKind::TextBuffer,
            WindowBody::Graphics(_) => WindowKind::Graphics,
            WindowBody::Pair(_) => WindowKind::Pair,
        }
    }

    pub(crate) fn pair(&self) -> Option<&PairBody> {
        match &self.body {
            WindowBody::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn pair_mut(&mut self) -> Option<&mut PairBody> {
        match &mut self.body {
            WindowBody::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn grid(&self) -> Option<&TextGridContent> {
        match &self.body {
            WindowBody::TextGrid(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn grid_mut(&mut self) -> Option<&mut TextGridContent> {
        match &mut self.body {
            WindowBody::TextGrid(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn buffer(&self) -> Option<&TextBufferContent> {
        match &self.body {
            WindowBody::TextBuffer(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> Option<&mut TextBufferContent> {
        match &mut self.body {
            WindowBody::TextBuffer(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn graphics(&self) -> Option<&GraphicsContent> {
        match &self.body {
            WindowBody::Graphics(g) => Some(g),
            _ => None,
        }
    }

    /// Unit length along the given layout axis, used by Fixed splits.
    pub(crate) fn unit_length(&self, direction: Direction) -> u16 {
        match direction {
            Direction::Horizontal => self.unit_width,
            Direction::Vertical => self.unit_height,
        }
    }
}
