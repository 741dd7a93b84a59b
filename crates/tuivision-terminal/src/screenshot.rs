use std::fmt::Write;

use crate::vterm::ScreenState;

mod png;

pub use png::render_png;

const BACKGROUND: &str = "#000000";
const CHAR_WIDTH_RATIO: f64 = 0.6;
const LINE_HEIGHT_RATIO: f64 = 1.2;

/// Cell size in pixels for a given font size, shared by both renderers.
fn cell_size(font_size: f64) -> (f64, f64) {
    (font_size * CHAR_WIDTH_RATIO, font_size * LINE_HEIGHT_RATIO)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotOptions {
    pub font_size: f64,
    pub padding: f64,
    pub show_cursor: bool,
    pub cursor_color: String,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            font_size: 14.0,
            padding: 8.0,
            show_cursor: true,
            cursor_color: "#ffffff".to_string(),
        }
    }
}

/// Renders a screen snapshot as a standalone SVG document.
///
/// Glyph metrics are approximated for a monospace face: each cell is
/// `0.6 * font_size` wide and `1.2 * font_size` tall.
pub fn render_svg(state: &ScreenState, options: &ScreenshotOptions) -> String {
    let (char_width, char_height) = cell_size(options.font_size);
    let width = char_width * f64::from(state.width) + options.padding * 2.0;
    let height = char_height * f64::from(state.height) + options.padding * 2.0;

    let mut svg = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.2}" height="{height:.2}" viewBox="0 0 {width:.2} {height:.2}">"#
    );
    svg.push_str("<defs>\n<style type=\"text/css\">\n");
    let _ = writeln!(
        svg,
        r#"  .terminal-text {{ font-family: "DejaVu Sans Mono", "Consolas", monospace; font-size: {}px; white-space: pre; }}"#,
        options.font_size
    );
    svg.push_str("</style>\n</defs>\n");
    let _ = writeln!(
        svg,
        r#"<rect width="{width:.2}" height="{height:.2}" fill="{BACKGROUND}"/>"#
    );

    let cursor = state.cursor;
    for (y, line) in state.lines.iter().take(usize::from(state.height)).enumerate() {
        let y_pos = options.padding + y as f64 * char_height;
        for (x, cell) in line.cells.iter().take(usize::from(state.width)).enumerate() {
            let x_pos = options.padding + x as f64 * char_width;

            if !cell.bg.eq_ignore_ascii_case(BACKGROUND) {
                let _ = writeln!(
                    svg,
                    r#"<rect x="{x_pos:.2}" y="{y_pos:.2}" width="{char_width:.2}" height="{char_height:.2}" fill="{}"/>"#,
                    escape_xml(&cell.bg)
                );
            }

            if options.show_cursor
                && cursor.visible
                && x == usize::from(cursor.col)
                && y == usize::from(cursor.row)
            {
                let _ = writeln!(
                    svg,
                    r#"<rect x="{x_pos:.2}" y="{y_pos:.2}" width="{char_width:.2}" height="{char_height:.2}" fill="{}" opacity="0.5"/>"#,
                    escape_xml(&options.cursor_color)
                );
            }

            if cell.char.is_empty() || cell.char == " " {
                continue;
            }

            let mut styles = Vec::new();
            if cell.bold {
                styles.push("font-weight:bold");
            }
            if cell.italic {
                styles.push("font-style:italic");
            }
            let style_attr = if styles.is_empty() {
                String::new()
            } else {
                format!(r#" style="{}""#, styles.join(";"))
            };

            let text_y = y_pos + options.font_size;
            let _ = writeln!(
                svg,
                r#"<text class="terminal-text" x="{x_pos:.2}" y="{text_y:.2}" fill="{}"{style_attr}>{}</text>"#,
                escape_xml(&cell.fg),
                escape_xml(&cell.char)
            );

            if cell.underline {
                let underline_y = y_pos + char_height - 2.0;
                let x_end = x_pos + char_width;
                let _ = writeln!(
                    svg,
                    r#"<line x1="{x_pos:.2}" y1="{underline_y:.2}" x2="{x_end:.2}" y2="{underline_y:.2}" stroke="{}" stroke-width="1"/>"#,
                    escape_xml(&cell.fg)
                );
            }
        }
    }

    svg.push_str("</svg>");
    svg
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
