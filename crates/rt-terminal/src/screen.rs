//! Screen buffer

use rt_core::TerminalSize;

const TAB_WIDTH: usize = 8;

/// A cell color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// The display layer's default foreground or background
    #[default]
    Default,
    /// Palette index (0-7 normal, 8-15 bright, 16-255 extended)
    Indexed(u8),
    /// 24-bit color
    Rgb(u8, u8, u8),
}

/// Rendition attributes of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attrs {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub underline: bool,
    pub inverse: bool,
}

/// One character cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub ch: char,
    pub attrs: Attrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            attrs: Attrs::default(),
        }
    }
}

impl Cell {
    fn blank(attrs: Attrs) -> Self {
        Self { ch: ' ', attrs }
    }
}

/// Zero-based cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CursorPos {
    pub row: u16,
    pub col: u16,
}

/// A copy of the screen published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSnapshot {
    pub size: TerminalSize,
    pub cursor: CursorPos,
    pub cursor_visible: bool,
    /// True while the alternate screen is active
    pub alternate: bool,
    /// Row text with trailing blanks trimmed
    pub lines: Vec<String>,
    pub cells: Vec<Vec<Cell>>,
    /// Increases every time the terminal state changes
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SavedCursor {
    row: usize,
    col: usize,
    pen: Attrs,
    pending_wrap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MainScreen {
    grid: Vec<Vec<Cell>>,
    cursor: SavedCursor,
}

/// The logical screen: a `rows x cols` grid plus cursor state.
///
/// Dimensions are always at least 1x1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    size: TerminalSize,
    grid: Vec<Vec<Cell>>,
    row: usize,
    col: usize,
    pen: Attrs,
    /// Cursor sits past the last column; the next print wraps first
    pending_wrap: bool,
    autowrap: bool,
    cursor_visible: bool,
    scroll_top: usize,
    scroll_bottom: usize,
    saved: Option<SavedCursor>,
    tab_stops: Vec<bool>,
    main: Option<MainScreen>,
}

fn clamp_size(size: TerminalSize) -> TerminalSize {
    TerminalSize::new(size.cols.max(1), size.rows.max(1))
}

fn blank_row(cols: usize, attrs: Attrs) -> Vec<Cell> {
    vec![Cell::blank(attrs); cols]
}

fn blank_grid(rows: usize, cols: usize) -> Vec<Vec<Cell>> {
    vec![blank_row(cols, Attrs::default()); rows]
}

fn default_tabs(cols: usize) -> Vec<bool> {
    (0..cols).map(|c| c > 0 && c % TAB_WIDTH == 0).collect()
}

fn resize_grid(grid: &mut Vec<Vec<Cell>>, cursor_row: usize, rows: usize, cols: usize) -> usize {
    // Drop lines from the top so the cursor line survives a shrink.
    let overflow = (cursor_row + 1).saturating_sub(rows);
    if overflow > 0 {
        grid.drain(..overflow);
    }
    for line in grid.iter_mut() {
        line.resize(cols, Cell::default());
    }
    grid.resize(rows, blank_row(cols, Attrs::default()));
    cursor_row - overflow
}

impl Screen {
    pub fn new(size: TerminalSize) -> Self {
        let size = clamp_size(size);
        let rows = size.rows as usize;
        let cols = size.cols as usize;
        Self {
            size,
            grid: blank_grid(rows, cols),
            row: 0,
            col: 0,
            pen: Attrs::default(),
            pending_wrap: false,
            autowrap: true,
            cursor_visible: true,
            scroll_top: 0,
            scroll_bottom: rows - 1,
            saved: None,
            tab_stops: default_tabs(cols),
            main: None,
        }
    }

    pub fn size(&self) -> TerminalSize {
        self.size
    }

    fn rows(&self) -> usize {
        self.size.rows as usize
    }

    fn cols(&self) -> usize {
        self.size.cols as usize
    }

    pub fn cursor(&self) -> CursorPos {
        CursorPos {
            row: self.row as u16,
            col: self.col as u16,
        }
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn is_alternate(&self) -> bool {
        self.main.is_some()
    }

    /// Attributes applied to newly printed characters
    pub fn pen(&self) -> Attrs {
        self.pen
    }

    /// Scroll region as zero-based inclusive rows
    pub fn scroll_region(&self) -> (u16, u16) {
        (self.scroll_top as u16, self.scroll_bottom as u16)
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.grid.get(row as usize)?.get(col as usize)
    }

    /// Text of one row with trailing blanks removed
    pub fn line_text(&self, row: u16) -> Option<String> {
        let line = self.grid.get(row as usize)?;
        let text: String = line.iter().map(|c| c.ch).collect();
        Some(text.trim_end().to_string())
    }

    /// All rows joined by newlines, trailing blank rows dropped
    pub fn contents(&self) -> String {
        let mut lines: Vec<String> = (0..self.size.rows)
            .filter_map(|r| self.line_text(r))
            .collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    pub fn snapshot(&self, revision: u64) -> ScreenSnapshot {
        ScreenSnapshot {
            size: self.size,
            cursor: self.cursor(),
            cursor_visible: self.cursor_visible,
            alternate: self.is_alternate(),
            lines: (0..self.size.rows)
                .filter_map(|r| self.line_text(r))
                .collect(),
            cells: self.grid.clone(),
            revision,
        }
    }

    pub(crate) fn pen_mut(&mut self) -> &mut Attrs {
        &mut self.pen
    }

    fn erase_attrs(&self) -> Attrs {
        Attrs {
            bg: self.pen.bg,
            ..Attrs::default()
        }
    }

    pub(crate) fn print(&mut self, ch: char) {
        if self.pending_wrap {
            if self.autowrap {
                self.col = 0;
                self.linefeed();
            }
            self.pending_wrap = false;
        }
        self.grid[self.row][self.col] = Cell {
            ch,
            attrs: self.pen,
        };
        if self.col + 1 >= self.cols() {
            self.pending_wrap = true;
        } else {
            self.col += 1;
        }
    }

    pub(crate) fn linefeed(&mut self) {
        self.pending_wrap = false;
        if self.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.row + 1 < self.rows() {
            self.row += 1;
        }
    }

    pub(crate) fn reverse_index(&mut self) {
        self.pending_wrap = false;
        if self.row == self.scroll_top {
            self.scroll_down(1);
        } else if self.row > 0 {
            self.row -= 1;
        }
    }

    pub(crate) fn carriage_return(&mut self) {
        self.pending_wrap = false;
        self.col = 0;
    }

    pub(crate) fn backspace(&mut self) {
        self.pending_wrap = false;
        self.col = self.col.saturating_sub(1);
    }

    pub(crate) fn tab(&mut self) {
        let last = self.cols() - 1;
        self.col = (self.col + 1..self.cols())
            .find(|&c| self.tab_stops[c])
            .unwrap_or(last);
    }

    /// Scroll the region up, blank lines enter at the bottom
    pub(crate) fn scroll_up(&mut self, n: usize) {
        let (top, bottom) = (self.scroll_top, self.scroll_bottom);
        let n = n.min(bottom - top + 1);
        let blank = blank_row(self.cols(), self.erase_attrs());
        for _ in 0..n {
            self.grid.remove(top);
            self.grid.insert(bottom, blank.clone());
        }
    }

    /// Scroll the region down, blank lines enter at the top
    pub(crate) fn scroll_down(&mut self, n: usize) {
        let (top, bottom) = (self.scroll_top, self.scroll_bottom);
        let n = n.min(bottom - top + 1);
        let blank = blank_row(self.cols(), self.erase_attrs());
        for _ in 0..n {
            self.grid.remove(bottom);
            self.grid.insert(top, blank.clone());
        }
    }

    pub(crate) fn move_up(&mut self, n: usize) {
        let min = if self.row >= self.scroll_top {
            self.scroll_top
        } else {
            0
        };
        self.row = self.row.saturating_sub(n).max(min);
        self.pending_wrap = false;
    }

    pub(crate) fn move_down(&mut self, n: usize) {
        let max = if self.row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.rows() - 1
        };
        self.row = (self.row + n).min(max);
        self.pending_wrap = false;
    }

    pub(crate) fn move_forward(&mut self, n: usize) {
        self.col = (self.col + n).min(self.cols() - 1);
        self.pending_wrap = false;
    }

    pub(crate) fn move_back(&mut self, n: usize) {
        self.col = self.col.saturating_sub(n);
        self.pending_wrap = false;
    }

    pub(crate) fn set_col(&mut self, col: usize) {
        self.col = col.min(self.cols() - 1);
        self.pending_wrap = false;
    }

    pub(crate) fn set_row(&mut self, row: usize) {
        self.row = row.min(self.rows() - 1);
        self.pending_wrap = false;
    }

    pub(crate) fn goto(&mut self, row: usize, col: usize) {
        self.set_row(row);
        self.set_col(col);
    }

    fn clear_cells(&mut self, row: usize, from: usize, to: usize) {
        let blank = Cell::blank(self.erase_attrs());
        let to = to.min(self.cols());
        if let Some(line) = self.grid.get_mut(row) {
            for cell in line.iter_mut().take(to).skip(from) {
                *cell = blank;
            }
        }
    }

    /// ED: 0 cursor to end, 1 start to cursor, 2 and 3 everything
    pub(crate) fn erase_display(&mut self, mode: u16) {
        let (rows, cols) = (self.rows(), self.cols());
        match mode {
            0 => {
                self.clear_cells(self.row, self.col, cols);
                for r in self.row + 1..rows {
                    self.clear_cells(r, 0, cols);
                }
            }
            1 => {
                for r in 0..self.row {
                    self.clear_cells(r, 0, cols);
                }
                self.clear_cells(self.row, 0, self.col + 1);
            }
            2 | 3 => {
                for r in 0..rows {
                    self.clear_cells(r, 0, cols);
                }
            }
            _ => {}
        }
    }

    /// EL: 0 cursor to end, 1 start to cursor, 2 whole line
    pub(crate) fn erase_line(&mut self, mode: u16) {
        let cols = self.cols();
        match mode {
            0 => self.clear_cells(self.row, self.col, cols),
            1 => self.clear_cells(self.row, 0, self.col + 1),
            2 => self.clear_cells(self.row, 0, cols),
            _ => {}
        }
    }

    pub(crate) fn erase_chars(&mut self, n: usize) {
        self.clear_cells(self.row, self.col, self.col + n);
    }

    pub(crate) fn insert_chars(&mut self, n: usize) {
        let blank = Cell::blank(self.erase_attrs());
        let n = n.min(self.cols() - self.col);
        let line = &mut self.grid[self.row];
        for _ in 0..n {
            line.pop();
            line.insert(self.col, blank);
        }
        self.pending_wrap = false;
    }

    pub(crate) fn delete_chars(&mut self, n: usize) {
        let blank = Cell::blank(self.erase_attrs());
        let n = n.min(self.cols() - self.col);
        let line = &mut self.grid[self.row];
        for _ in 0..n {
            line.remove(self.col);
            line.push(blank);
        }
        self.pending_wrap = false;
    }

    /// IL: only acts when the cursor is inside the scroll region
    pub(crate) fn insert_lines(&mut self, n: usize) {
        if self.row < self.scroll_top || self.row > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.row + 1);
        let blank = blank_row(self.cols(), self.erase_attrs());
        for _ in 0..n {
            self.grid.remove(self.scroll_bottom);
            self.grid.insert(self.row, blank.clone());
        }
        self.carriage_return();
    }

    /// DL: only acts when the cursor is inside the scroll region
    pub(crate) fn delete_lines(&mut self, n: usize) {
        if self.row < self.scroll_top || self.row > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.row + 1);
        let blank = blank_row(self.cols(), self.erase_attrs());
        for _ in 0..n {
            self.grid.remove(self.row);
            self.grid.insert(self.scroll_bottom, blank.clone());
        }
        self.carriage_return();
    }

    /// DECSTBM with zero-based inclusive rows; invalid regions are ignored
    pub(crate) fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows() - 1);
        if top >= bottom {
            return;
        }
        self.scroll_top = top;
        self.scroll_bottom = bottom;
        self.goto(0, 0);
    }

    pub(crate) fn save_cursor(&mut self) {
        self.saved = Some(self.current_cursor());
    }

    pub(crate) fn restore_cursor(&mut self) {
        let saved = self.saved.unwrap_or(SavedCursor {
            row: 0,
            col: 0,
            pen: Attrs::default(),
            pending_wrap: false,
        });
        self.apply_cursor(saved);
    }

    fn current_cursor(&self) -> SavedCursor {
        SavedCursor {
            row: self.row,
            col: self.col,
            pen: self.pen,
            pending_wrap: self.pending_wrap,
        }
    }

    fn apply_cursor(&mut self, saved: SavedCursor) {
        self.row = saved.row.min(self.rows() - 1);
        self.col = saved.col.min(self.cols() - 1);
        self.pen = saved.pen;
        self.pending_wrap = saved.pending_wrap;
    }

    pub(crate) fn set_autowrap(&mut self, on: bool) {
        self.autowrap = on;
        if !on {
            self.pending_wrap = false;
        }
    }

    pub(crate) fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor_visible = visible;
    }

    /// `CSI ? 1049 h`: save the cursor and switch to a cleared alternate grid
    pub(crate) fn enter_alternate(&mut self) {
        if self.main.is_some() {
            return;
        }
        let (rows, cols) = (self.rows(), self.cols());
        let grid = std::mem::replace(&mut self.grid, blank_grid(rows, cols));
        self.main = Some(MainScreen {
            grid,
            cursor: self.current_cursor(),
        });
    }

    /// `CSI ? 1049 l`: restore the main grid and its cursor
    pub(crate) fn leave_alternate(&mut self) {
        if let Some(main) = self.main.take() {
            self.grid = main.grid;
            self.apply_cursor(main.cursor);
        }
    }

    /// RIS: back to power-on state, keeping the size
    pub(crate) fn reset(&mut self) {
        *self = Screen::new(self.size);
    }

    /// Blank every cell and home the cursor, keeping modes
    pub(crate) fn clear(&mut self) {
        self.erase_display(2);
        self.goto(0, 0);
    }

    /// Change dimensions.
    ///
    /// Rows are truncated or padded (dropping from the top when the cursor
    /// would fall off), columns are truncated or padded on the right. The
    /// cursor is clamped and the scroll region reset to the full screen.
    pub fn resize(&mut self, size: TerminalSize) {
        let size = clamp_size(size);
        if size == self.size {
            return;
        }
        let rows = size.rows as usize;
        let cols = size.cols as usize;

        self.row = resize_grid(&mut self.grid, self.row, rows, cols);
        if let Some(main) = self.main.as_mut() {
            main.cursor.row = resize_grid(&mut main.grid, main.cursor.row, rows, cols);
            main.cursor.col = main.cursor.col.min(cols - 1);
        }

        self.size = size;
        self.col = self.col.min(cols - 1);
        self.pending_wrap = false;
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.tab_stops = default_tabs(cols);
        if let Some(saved) = self.saved.as_mut() {
            saved.row = saved.row.min(rows - 1);
            saved.col = saved.col.min(cols - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(cols: u16, rows: u16) -> Screen {
        Screen::new(TerminalSize::new(cols, rows))
    }

    fn print_str(screen: &mut Screen, text: &str) {
        for ch in text.chars() {
            screen.print(ch);
        }
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let screen = screen(0, 0);
        assert_eq!(screen.size(), TerminalSize::new(1, 1));
    }

    #[test]
    fn test_pending_wrap_at_last_column() {
        let mut s = screen(4, 2);
        print_str(&mut s, "abcd");
        assert_eq!(s.cursor(), CursorPos { row: 0, col: 3 });
        s.print('e');
        assert_eq!(s.line_text(0).unwrap(), "abcd");
        assert_eq!(s.line_text(1).unwrap(), "e");
        assert_eq!(s.cursor(), CursorPos { row: 1, col: 1 });
    }

    #[test]
    fn test_carriage_return_cancels_pending_wrap() {
        let mut s = screen(4, 2);
        print_str(&mut s, "abcd");
        s.carriage_return();
        s.print('X');
        assert_eq!(s.line_text(0).unwrap(), "Xbcd");
        assert_eq!(s.line_text(1).unwrap(), "");
    }

    #[test]
    fn test_linefeed_scrolls_at_bottom() {
        let mut s = screen(3, 2);
        print_str(&mut s, "one");
        s.carriage_return();
        s.linefeed();
        print_str(&mut s, "two");
        s.carriage_return();
        s.linefeed();
        assert_eq!(s.line_text(0).unwrap(), "two");
        assert_eq!(s.line_text(1).unwrap(), "");
    }

    #[test]
    fn test_scroll_region_confines_scrolling() {
        let mut s = screen(2, 4);
        for (row, text) in ["a", "b", "c", "d"].iter().enumerate() {
            s.goto(row, 0);
            print_str(&mut s, text);
        }
        s.set_scroll_region(1, 2);
        s.goto(2, 0);
        s.linefeed();
        assert_eq!(s.contents(), "a\nc\n\nd");
    }

    #[test]
    fn test_invalid_scroll_region_is_ignored() {
        let mut s = screen(2, 4);
        s.set_scroll_region(2, 2);
        assert_eq!(s.scroll_region(), (0, 3));
    }

    #[test]
    fn test_tab_stops_every_eight() {
        let mut s = screen(20, 1);
        s.tab();
        assert_eq!(s.cursor().col, 8);
        s.tab();
        assert_eq!(s.cursor().col, 16);
        s.tab();
        assert_eq!(s.cursor().col, 19);
    }

    #[test]
    fn test_erase_line_modes() {
        let mut s = screen(5, 1);
        print_str(&mut s, "hello");
        s.set_col(2);
        s.erase_line(0);
        assert_eq!(s.line_text(0).unwrap(), "he");
        print_str(&mut s, "llo");
        s.set_col(2);
        s.erase_line(1);
        assert_eq!(s.line_text(0).unwrap(), "   lo");
    }

    #[test]
    fn test_erase_uses_current_background() {
        let mut s = screen(3, 1);
        s.pen_mut().bg = Color::Indexed(4);
        s.erase_line(2);
        assert_eq!(s.cell(0, 0).unwrap().attrs.bg, Color::Indexed(4));
    }

    #[test]
    fn test_insert_and_delete_chars() {
        let mut s = screen(5, 1);
        print_str(&mut s, "abcde");
        s.set_col(1);
        s.insert_chars(2);
        assert_eq!(s.line_text(0).unwrap(), "a  bc");
        s.delete_chars(2);
        assert_eq!(s.line_text(0).unwrap(), "abc");
    }

    #[test]
    fn test_insert_and_delete_lines() {
        let mut s = screen(1, 3);
        for (row, text) in ["a", "b", "c"].iter().enumerate() {
            s.goto(row, 0);
            print_str(&mut s, text);
        }
        s.goto(1, 0);
        s.insert_lines(1);
        assert_eq!(s.contents(), "a\n\nb");
        s.delete_lines(1);
        assert_eq!(s.contents(), "a\nb");
    }

    #[test]
    fn test_alternate_screen_restores_main() {
        let mut s = screen(4, 2);
        print_str(&mut s, "main");
        s.enter_alternate();
        assert!(s.is_alternate());
        assert_eq!(s.contents(), "");
        print_str(&mut s, "alt");
        s.leave_alternate();
        assert!(!s.is_alternate());
        assert_eq!(s.contents(), "main");
        assert_eq!(s.cursor(), CursorPos { row: 0, col: 3 });
    }

    #[test]
    fn test_resize_truncates_pads_and_clamps() {
        let mut s = screen(6, 3);
        print_str(&mut s, "abcdef");
        s.resize(TerminalSize::new(3, 5));
        assert_eq!(s.size(), TerminalSize::new(3, 5));
        assert_eq!(s.line_text(0).unwrap(), "abc");
        assert_eq!(s.cursor(), CursorPos { row: 0, col: 2 });
        assert_eq!(s.scroll_region(), (0, 4));
    }

    #[test]
    fn test_resize_keeps_cursor_line() {
        let mut s = screen(4, 4);
        for (row, text) in ["a", "b", "c", "d"].iter().enumerate() {
            s.goto(row, 0);
            print_str(&mut s, text);
        }
        s.resize(TerminalSize::new(4, 2));
        assert_eq!(s.contents(), "c\nd");
        assert_eq!(s.cursor().row, 1);
    }

    #[test]
    fn test_save_restore_cursor_keeps_pen() {
        let mut s = screen(10, 5);
        s.goto(2, 3);
        s.pen_mut().bold = true;
        s.save_cursor();
        s.goto(0, 0);
        s.pen_mut().bold = false;
        s.restore_cursor();
        assert_eq!(s.cursor(), CursorPos { row: 2, col: 3 });
        assert!(s.pen().bold);
    }

    #[test]
    fn test_snapshot_lines_match_grid() {
        let mut s = screen(5, 2);
        print_str(&mut s, "hi");
        let snap = s.snapshot(7);
        assert_eq!(snap.lines, vec!["hi".to_string(), String::new()]);
        assert_eq!(snap.cells.len(), 2);
        assert_eq!(snap.revision, 7);
    }

    #[test]
    fn test_alternate_grid_restores_main_contents_and_cursor() {
        let mut s = screen(10, 3);
        print_str(&mut s, "main");
        s.enter_alternate();
        assert!(s.is_alternate());
        assert_eq!(s.contents(), "");

        s.goto(2, 5);
        print_str(&mut s, "alt");
        s.enter_alternate();
        assert_eq!(s.line_text(2).as_deref(), Some("     alt"));

        s.leave_alternate();
        assert!(!s.is_alternate());
        assert_eq!(s.contents(), "main");
        assert_eq!(s.cursor(), CursorPos { row: 0, col: 4 });
    }

    #[test]
    fn test_resize_on_alternate_grid_resizes_main() {
        let mut s = screen(10, 3);
        print_str(&mut s, "abcdefgh");
        s.enter_alternate();
        s.resize(TerminalSize::new(4, 2));
        s.leave_alternate();
        assert_eq!(s.contents(), "abcd");
        assert_eq!(s.cursor(), CursorPos { row: 0, col: 3 });
    }
}
