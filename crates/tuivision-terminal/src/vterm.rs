use serde::Serialize;
use vt100::Parser;

const MAX_SCROLLBACK: usize = 1000;

const DEFAULT_FG: &str = "#ffffff";
const DEFAULT_BG: &str = "#000000";

const ANSI_PALETTE: [&str; 16] = [
    "#000000", "#cd0000", "#00cd00", "#cdcd00", "#0000ee", "#cd00cd", "#00cdcd", "#e5e5e5",
    "#7f7f7f", "#ff0000", "#00ff00", "#ffff00", "#5c5cff", "#ff00ff", "#00ffff", "#ffffff",
];

/// Zero-based cursor cell. Serialised as `{x, y, visible}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CursorPosition {
    #[serde(rename = "y")]
    pub row: u16,
    #[serde(rename = "x")]
    pub col: u16,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellData {
    pub char: String,
    pub fg: String,
    pub bg: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineData {
    pub text: String,
    pub cells: Vec<CellData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenState {
    pub width: u16,
    pub height: u16,
    pub cursor: CursorPosition,
    pub lines: Vec<LineData>,
}

impl ScreenState {
    /// Visible text, one row per line, trailing whitespace trimmed.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cell-grid emulation fed by the pump thread.
pub trait Renderer: Send {
    fn process(&mut self, data: &[u8]);
    fn resize(&mut self, cols: u16, rows: u16);
    /// `(cols, rows)`
    fn size(&self) -> (u16, u16);
    fn cursor(&self) -> CursorPosition;
    fn screen_state(&self) -> ScreenState;
    fn screen_text(&self) -> String;
}

pub struct VirtualTerminal {
    parser: Parser,
    cols: u16,
    rows: u16,
}

impl VirtualTerminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            parser: Parser::new(rows, cols, MAX_SCROLLBACK),
            cols,
            rows,
        }
    }

    fn row_text(&self, row: u16) -> String {
        let screen = self.parser.screen();
        let mut line = String::with_capacity(usize::from(self.cols));
        for col in 0..self.cols {
            match screen.cell(row, col) {
                Some(cell) if cell.is_wide_continuation() => {}
                Some(cell) if cell.has_contents() => line.push_str(&cell.contents()),
                _ => line.push(' '),
            }
        }
        line.trim_end().to_string()
    }
}

impl Renderer for VirtualTerminal {
    fn process(&mut self, data: &[u8]) {
        self.parser.process(data);
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.parser.set_size(rows, cols);
        self.cols = cols;
        self.rows = rows;
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn cursor(&self) -> CursorPosition {
        let screen = self.parser.screen();
        let (row, col) = screen.cursor_position();
        CursorPosition {
            row,
            col,
            visible: !screen.hide_cursor(),
        }
    }

    fn screen_state(&self) -> ScreenState {
        let screen = self.parser.screen();
        let mut lines = Vec::with_capacity(usize::from(self.rows));

        for row in 0..self.rows {
            let mut cells = Vec::with_capacity(usize::from(self.cols));
            for col in 0..self.cols {
                cells.push(match screen.cell(row, col) {
                    Some(cell) => cell_data(cell),
                    None => blank_cell(),
                });
            }
            lines.push(LineData {
                text: self.row_text(row),
                cells,
            });
        }

        ScreenState {
            width: self.cols,
            height: self.rows,
            cursor: self.cursor(),
            lines,
        }
    }

    fn screen_text(&self) -> String {
        (0..self.rows)
            .map(|row| self.row_text(row))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn blank_cell() -> CellData {
    CellData {
        char: " ".to_string(),
        fg: DEFAULT_FG.to_string(),
        bg: DEFAULT_BG.to_string(),
        bold: false,
        italic: false,
        underline: false,
        inverse: false,
    }
}

fn cell_data(cell: &vt100::Cell) -> CellData {
    let fg = color_to_hex(cell.fgcolor(), DEFAULT_FG);
    let bg = color_to_hex(cell.bgcolor(), DEFAULT_BG);
    let inverse = cell.inverse();
    let (fg, bg) = if inverse { (bg, fg) } else { (fg, bg) };

    CellData {
        // The right half of a wide glyph has no text of its own.
        char: if cell.is_wide_continuation() {
            String::new()
        } else if cell.has_contents() {
            cell.contents()
        } else {
            " ".to_string()
        },
        fg,
        bg,
        bold: cell.bold(),
        italic: cell.italic(),
        underline: cell.underline(),
        inverse,
    }
}

fn color_to_hex(color: vt100::Color, default: &str) -> String {
    match color {
        vt100::Color::Default => default.to_string(),
        vt100::Color::Idx(idx) => indexed_to_hex(idx),
        vt100::Color::Rgb(r, g, b) => rgb_hex(r, g, b),
    }
}

fn indexed_to_hex(idx: u8) -> String {
    match idx {
        0..=15 => ANSI_PALETTE[usize::from(idx)].to_string(),
        16..=231 => {
            let idx = idx - 16;
            let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
            rgb_hex(level(idx / 36), level((idx % 36) / 6), level(idx % 6))
        }
        _ => {
            let gray = (idx - 232) * 10 + 8;
            rgb_hex(gray, gray, gray)
        }
    }
}

fn rgb_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_terminal() {
        let mut term = VirtualTerminal::new(80, 24);
        term.process(b"Hello, World!");
        assert!(term.screen_text().contains("Hello, World!"));
    }

    #[test]
    fn test_screen_text_keeps_every_row() {
        let mut term = VirtualTerminal::new(20, 5);
        term.process(b"top   \r\n\r\nthird");
        let text = term.screen_text();
        assert_eq!(text, "top\n\nthird\n\n");
        assert_eq!(text.split('\n').count(), 5);
    }

    #[test]
    fn test_cursor_position() {
        let mut term = VirtualTerminal::new(80, 24);
        term.process(b"ABC\r\nDE");
        let cursor = term.cursor();
        assert_eq!(cursor.row, 1);
        assert_eq!(cursor.col, 2);
        assert!(cursor.visible);

        term.process(b"\x1b[?25l");
        assert!(!term.cursor().visible);
    }

    #[test]
    fn test_cursor_serialises_as_xy() {
        let cursor = CursorPosition {
            row: 3,
            col: 7,
            visible: true,
        };
        let json = serde_json::to_value(cursor).unwrap();
        assert_eq!(json["x"], 7);
        assert_eq!(json["y"], 3);
        assert_eq!(json["visible"], true);
    }

    #[test]
    fn test_screen_state_attributes_and_colors() {
        let mut term = VirtualTerminal::new(20, 3);
        term.process(b"\x1b[1;31mR\x1b[0m\x1b[3;48;5;21mB\x1b[0m\x1b[4;38;2;1;2;3mU");
        let state = term.screen_state();

        assert_eq!(state.width, 20);
        assert_eq!(state.height, 3);
        assert_eq!(state.lines.len(), 3);

        let cells = &state.lines[0].cells;
        assert_eq!(cells[0].char, "R");
        assert!(cells[0].bold);
        assert_eq!(cells[0].fg, "#cd0000");
        assert_eq!(cells[0].bg, "#000000");

        assert!(cells[1].italic);
        assert_eq!(cells[1].bg, "#0000ff");

        assert!(cells[2].underline);
        assert_eq!(cells[2].fg, "#010203");

        assert_eq!(cells[3].char, " ");
        assert_eq!(cells[3].fg, DEFAULT_FG);
        assert_eq!(state.lines[0].text, "RBU");
    }

    #[test]
    fn test_inverse_swaps_colors() {
        let mut term = VirtualTerminal::new(10, 2);
        term.process(b"\x1b[7mX");
        let cell = &term.screen_state().lines[0].cells[0];
        assert!(cell.inverse);
        assert_eq!(cell.fg, DEFAULT_BG);
        assert_eq!(cell.bg, DEFAULT_FG);
    }

    #[test]
    fn test_wide_characters_are_not_doubled() {
        let mut term = VirtualTerminal::new(10, 2);
        term.process("漢字!".as_bytes());
        assert_eq!(term.screen_text().lines().next(), Some("漢字!"));
        let cells = &term.screen_state().lines[0].cells;
        assert_eq!(cells.len(), 10);
        assert_eq!(cells[0].char, "漢");
        assert_eq!(cells[1].char, "");
        assert_eq!(cells[4].char, "!");
    }

    #[test]
    fn test_resize_changes_dimensions() {
        let mut term = VirtualTerminal::new(80, 24);
        term.resize(40, 10);
        assert_eq!(term.size(), (40, 10));
        assert_eq!(term.screen_text().split('\n').count(), 10);
        let state = term.screen_state();
        assert_eq!((state.width, state.height), (40, 10));
    }

    #[test]
    fn test_indexed_palette_conversion() {
        assert_eq!(indexed_to_hex(1), "#cd0000");
        assert_eq!(indexed_to_hex(15), "#ffffff");
        assert_eq!(indexed_to_hex(16), "#000000");
        assert_eq!(indexed_to_hex(196), "#ff0000");
        assert_eq!(indexed_to_hex(231), "#ffffff");
        assert_eq!(indexed_to_hex(232), "#080808");
        assert_eq!(indexed_to_hex(255), "#eeeeee");
    }

    #[test]
    fn test_screen_state_text_matches_screen_text() {
        let mut term = VirtualTerminal::new(20, 4);
        term.process(b"one\r\ntwo  \r\n");
        assert_eq!(term.screen_state().text(), term.screen_text());
    }
}
