//! Cell-addressed content model for text-grid windows.
//!
//! A grid holds a fixed rectangle of character cells. Output goes to the
//! cursor position and wraps to the following row; anything past the last
//! row is dropped. Resizing preserves content: the far edge is truncated
//! when the grid shrinks and padded with blanks when it grows.

/// Character cells of one text-grid window, plus the output cursor.
#[derive(Debug, Clone, Default)]
pub struct TextGridContent {
    width: u16,
    height: u16,
    lines: Vec<Vec<char>>,
    cursor_x: u16,
    cursor_y: u16,
}

impl TextGridContent {
    /// Grid width in cells, as of the last resize.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Grid height in cells, as of the last resize.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Cursor position. May sit one past the right edge after a full row,
    /// or below the bottom edge when parked off-screen.
    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor_x, self.cursor_y)
    }

    /// One row as a string, blank-padded to the grid width.
    pub fn row(&self, y: u16) -> Option<String> {
        self.lines.get(y as usize).map(|l| l.iter().collect())
    }

    /// All rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        self.lines.iter().map(|l| l.iter().collect())
    }

    /// Resizes to `width` × `height` cells, keeping existing content.
    ///
    /// Rows below the new height and columns past the new width are thrown
    /// away; new rows and columns are filled with spaces. Returns true when
    /// the cell dimensions actually changed.
    pub(crate) fn resize(&mut self, width: u16, height: u16) -> bool {
        let changed = self.width != width || self.height != height;

        self.lines.truncate(height as usize);
        for line in &mut self.lines {
            line.resize(width as usize, ' ');
        }
        while self.lines.len() < height as usize {
            self.lines.push(vec![' '; width as usize]);
        }

        self.width = width;
        self.height = height;
        changed
    }

    /// Blanks every cell and homes the cursor.
    pub(crate) fn clear(&mut self) {
        for line in &mut self.lines {
            line.fill(' ');
        }
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    /// Moves the output cursor to (`x`, `y`).
    ///
    /// An `x` past the right edge carries into following rows; a `y` at or
    /// past the bottom parks the cursor just off-screen, so later output is
    /// dropped until the cursor moves again.
    pub(crate) fn move_cursor(&mut self, x: u32, y: u32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let mut x = x;
        let mut y = y;
        if x >= u32::from(self.width) {
            y += x / u32::from(self.width);
            x %= u32::from(self.width);
        }
        if y >= u32::from(self.height) {
            // Off-screen: leave the cursor past the last cell.
            self.cursor_x = self.width.saturating_sub(1);
            self.cursor_y = self.height;
            return;
        }
        self.cursor_x = x as u16;
        self.cursor_y = y as u16;
    }

    /// Writes text at the cursor, advancing it and wrapping at the right
    /// edge. Output below the last row is dropped. Returns the number of
    /// characters consumed (including dropped ones).
    pub(crate) fn put_str(&mut self, s: &str) -> u32 {
        let mut count = 0u32;
        for ch in s.chars() {
            count += 1;
            if ch == '\n' {
                self.cursor_x = 0;
                self.cursor_y = self.cursor_y.saturating_add(1);
                continue;
            }
            if self.width == 0 {
                continue;
            }
            if self.cursor_x >= self.width {
                self.cursor_x = 0;
                self.cursor_y = self.cursor_y.saturating_add(1);
            }
            if self.cursor_y >= self.height {
                continue;
            }
            self.lines[self.cursor_y as usize][self.cursor_x as usize] = ch;
            self.cursor_x += 1;
        }
        count
    }

    /// Cells left on the cursor row, used to cap grid line input.
    pub(crate) fn cells_left_on_row(&self) -> u32 {
        if self.cursor_y >= self.height {
            return 0;
        }
        u32::from(self.width.saturating_sub(self.cursor_x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: u16, h: u16) -> TextGridContent {
        let mut g = TextGridContent::default();
        g.resize(w, h);
        g
    }

    #[test]
    fn resize_reports_change_only_when_dimensions_move() {
        let mut g = TextGridContent::default();
        assert!(g.resize(10, 4));
        assert!(!g.resize(10, 4));
        assert!(g.resize(10, 5));
    }

    #[test]
    fn grow_pads_with_blanks_and_shrink_truncates_far_edge() {
        let mut g = grid(4, 2);
        g.put_str("abcdwxyz");
        assert_eq!(g.row(0).as_deref(), Some("abcd"));
        assert_eq!(g.row(1).as_deref(), Some("wxyz"));

        g.resize(6, 3);
        assert_eq!(g.row(0).as_deref(), Some("abcd  "));
        assert_eq!(g.row(1).as_deref(), Some("wxyz  "));
        assert_eq!(g.row(2).as_deref(), Some("      "));

        g.resize(2, 1);
        assert_eq!(g.row(0).as_deref(), Some("ab"));
        assert_eq!(g.row(1), None);
    }

    #[test]
    fn cursor_wraps_past_right_edge_into_following_rows() {
        let mut g = grid(5, 3);
        g.move_cursor(12, 0);
        assert_eq!(g.cursor(), (2, 2));
    }

    #[test]
    fn cursor_past_bottom_parks_off_screen_and_drops_output() {
        let mut g = grid(5, 2);
        g.move_cursor(0, 7);
        assert_eq!(g.cursor(), (4, 2));
        g.put_str("hi");
        assert_eq!(g.row(0).as_deref(), Some("     "));
        assert_eq!(g.row(1).as_deref(), Some("     "));
    }

    #[test]
    fn put_str_wraps_and_drops_below_last_row() {
        let mut g = grid(3, 2);
        let written = g.put_str("abcdefgh");
        assert_eq!(written, 8);
        assert_eq!(g.row(0).as_deref(), Some("abc"));
        assert_eq!(g.row(1).as_deref(), Some("def"));
    }

    #[test]
    fn clear_blanks_cells_and_homes_cursor() {
        let mut g = grid(3, 2);
        g.put_str("xyz");
        g.clear();
        assert_eq!(g.row(0).as_deref(), Some("   "));
        assert_eq!(g.cursor(), (0, 0));
    }

    #[test]
    fn zero_size_grid_is_inert() {
        let mut g = grid(0, 0);
        g.move_cursor(3, 3);
        assert_eq!(g.put_str("abc"), 3);
        assert_eq!(g.row(0), None);
    }
}
