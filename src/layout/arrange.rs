//! The two halves of size negotiation: a bottom-up preferred-size pass and
//! the top-down pass that hands every window its rectangle.

use ratatui::layout::{Direction, Rect};

use crate::window::{SplitDirection, SplitMode, WindowBody, WindowId, WindowTree};

use super::axis_length;

/// Assigns `area` to the whole tree.
///
/// Returns the smallest subtree containing every window whose cell geometry
/// changed, or `None` when nothing changed. Only text grids report changes;
/// buffer and graphics windows track their new size silently.
pub(crate) fn arrange_tree(tree: &mut WindowTree, area: Rect, spacing: u16) -> Option<WindowId> {
    let root = tree.root()?;
    allocate(tree, root, area, spacing)
}

fn allocate(tree: &mut WindowTree, id: WindowId, area: Rect, spacing: u16) -> Option<WindowId> {
    let Some(win) = tree.get_mut(id) else {
        return None;
    };
    win.rect = area;

    let Some((first, second, split, key)) = win
        .pair()
        .map(|p| (p.first, p.second, p.split, p.key_window))
    else {
        let unit_width = win.unit_width;
        let unit_height = win.unit_height;
        if let WindowBody::TextGrid(grid) = &mut win.body {
            let new_width = cells(area.width, unit_width);
            let new_height = cells(area.height, unit_height);
            if grid.resize(new_width, new_height) {
                return Some(id);
            }
        }
        return None;
    };

    let direction = split.direction.direction();
    let length = axis_length(direction, area);
    // Too little room to honor the spacing here; descendants still apply
    // the configured value to their own splits.
    let spacing_here = if spacing > length { 0 } else { spacing };
    let avail = length - spacing_here;

    // The window on the direction side gets the computed length, the other
    // side takes what is left.
    let computed: u16 = match split.mode {
        SplitMode::Fixed => match key.and_then(|k| tree.get(k)) {
            Some(key_win) => {
                let want = u64::from(split.size) * u64::from(key_win.unit_length(direction));
                want.min(u64::from(avail)) as u16
            }
            None => 0,
        },
        SplitMode::Proportional => {
            ((u32::from(split.size) * u32::from(avail)).div_ceil(100)) as u16
        }
    };
    let (len_first, len_second) = if split.direction.dir_side_first() {
        (computed, avail.saturating_sub(computed))
    } else {
        (avail.saturating_sub(computed), computed)
    };

    let (rect_first, rect_second) = match direction {
        Direction::Horizontal => (
            Rect {
                x: area.x,
                y: area.y,
                width: len_first,
                height: area.height,
            },
            Rect {
                x: area
                    .x
                    .saturating_add(len_first)
                    .saturating_add(spacing_here),
                y: area.y,
                width: len_second,
                height: area.height,
            },
        ),
        Direction::Vertical => (
            Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: len_first,
            },
            Rect {
                x: area.x,
                y: area
                    .y
                    .saturating_add(len_first)
                    .saturating_add(spacing_here),
                width: area.width,
                height: len_second,
            },
        ),
    };

    let first_changed = allocate(tree, first, rect_first, spacing);
    let second_changed = allocate(tree, second, rect_second, spacing);
    match (first_changed, second_changed) {
        (Some(_), Some(_)) => Some(id),
        (Some(changed), None) => Some(changed),
        (None, second_changed) => second_changed,
    }
}

/// Preferred size of the whole tree in device units: fixed splits claim
/// their full constraint, the rest of the tree asks for what it already
/// has.
pub(crate) fn size_request(tree: &WindowTree, spacing: u16) -> (u32, u32) {
    match tree.root() {
        Some(root) => request(tree, root, spacing),
        None => (0, 0),
    }
}

fn request(tree: &WindowTree, id: WindowId, spacing: u16) -> (u32, u32) {
    let Some(win) = tree.get(id) else {
        return (0, 0);
    };
    let Some((first, second, split, key)) = win
        .pair()
        .map(|p| (p.first, p.second, p.split, p.key_window))
    else {
        // A leaf asks for the size it already has; a grid derives it from
        // its cell geometry, so an unallocated grid asks for nothing.
        return match win.grid() {
            Some(g) => (
                u32::from(g.width()) * u32::from(win.unit_width),
                u32::from(g.height()) * u32::from(win.unit_height),
            ),
            None => (u32::from(win.rect.width), u32::from(win.rect.height)),
        };
    };

    let (mut w1, mut h1) = request(tree, first, spacing);
    let (mut w2, mut h2) = request(tree, second, spacing);

    // A fixed split overrides the request of the direction side with its
    // constraint, whatever that child measured for itself.
    if split.mode == SplitMode::Fixed {
        let fixed = key
            .and_then(|k| tree.get(k))
            .map(|kw| {
                let unit = kw.unit_length(split.direction.direction());
                (u64::from(split.size) * u64::from(unit)).min(u64::from(u32::MAX)) as u32
            })
            .unwrap_or(0);
        match split.direction {
            SplitDirection::Left => w1 = fixed,
            SplitDirection::Right => w2 = fixed,
            SplitDirection::Above => h1 = fixed,
            SplitDirection::Below => h2 = fixed,
        }
    }

    match split.direction.direction() {
        Direction::Horizontal => (
            w1.saturating_add(w2).saturating_add(u32::from(spacing)),
            h1.max(h2),
        ),
        Direction::Vertical => (
            w1.max(w2),
            h1.saturating_add(h2).saturating_add(u32::from(spacing)),
        ),
    }
}

fn cells(length: u16, unit: u16) -> u16 {
    if unit == 0 { 0 } else { length / unit }
}
