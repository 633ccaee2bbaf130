//! Geometry negotiation for the window tree.

mod arrange;

pub(crate) use arrange::{arrange_tree, size_request};

use ratatui::layout::{Direction, Rect};

/// Extent of `rect` along `direction`.
fn axis_length(direction: Direction, rect: Rect) -> u16 {
    match direction {
        Direction::Horizontal => rect.width,
        Direction::Vertical => rect.height,
    }
}
