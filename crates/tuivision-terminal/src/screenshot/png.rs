//! Bitmap rendering of a screen snapshot.
//!
//! Glyphs come from the first monospace TrueType face found on disk
//! (`TUIVISION_FONT` overrides the search). Without a usable face each
//! printable cell is drawn as a solid block in its foreground colour, so the
//! layout stays readable even on a bare container.

use std::io::Cursor;
use std::path::Path;
use std::sync::OnceLock;

use ab_glyph::Font;
use ab_glyph::FontVec;
use ab_glyph::PxScale;
use ab_glyph::ScaleFont;
use ab_glyph::point;
use image::ImageFormat;
use image::Rgba;
use image::RgbaImage;
use tracing::debug;
use tracing::warn;

use super::BACKGROUND;
use super::ScreenshotOptions;
use super::cell_size;
use crate::error::RenderError;
use crate::vterm::CellData;
use crate::vterm::ScreenState;

/// Largest edge, in pixels, the renderer will allocate.
const MAX_EDGE: u32 = 16_384;
const CURSOR_ALPHA: f32 = 0.5;
/// Floor for anti-aliased coverage so thin strokes survive small sizes.
const MIN_GLYPH_ALPHA: f32 = 0.25;
const FALLBACK_WHITE: [u8; 3] = [255, 255, 255];

const FONT_ENV: &str = "TUIVISION_FONT";
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/google-noto/NotoSansMono-Regular.ttf",
    "/usr/share/fonts/noto/NotoSansMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/Monaco.ttf",
];

fn font() -> Option<&'static FontVec> {
    static FONT: OnceLock<Option<FontVec>> = OnceLock::new();
    FONT.get_or_init(|| {
        let override_path = std::env::var(FONT_ENV).ok();
        override_path
            .iter()
            .map(String::as_str)
            .chain(FONT_PATHS.iter().copied())
            .find_map(|path| load_font(Path::new(path)))
            .or_else(|| {
                warn!("No monospace font found, screenshots will use block glyphs");
                None
            })
    })
    .as_ref()
}

fn load_font(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    match FontVec::try_from_vec_and_index(data, 0) {
        Ok(font) => {
            debug!(path = %path.display(), "Loaded screenshot font");
            Some(font)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Unusable font file");
            None
        }
    }
}

/// Parses `#rrggbb`.
fn parse_hex(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn blend(dst: &mut Rgba<u8>, src: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (d, s) in dst.0.iter_mut().zip(src) {
        let mixed = f32::from(s) * alpha + f32::from(*d) * (1.0 - alpha);
        *d = mixed.round() as u8;
    }
}

/// Pixel rectangle clipped to the image.
struct Rect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Rect {
    fn new(img: &RgbaImage, x: f64, y: f64, w: f64, h: f64) -> Self {
        let clamp_x = |v: f64| (v.round().max(0.0) as u32).min(img.width());
        let clamp_y = |v: f64| (v.round().max(0.0) as u32).min(img.height());
        Self {
            x0: clamp_x(x),
            y0: clamp_y(y),
            x1: clamp_x(x + w),
            y1: clamp_y(y + h),
        }
    }

    fn fill(&self, img: &mut RgbaImage, color: [u8; 3], alpha: f32) {
        for py in self.y0..self.y1 {
            for px in self.x0..self.x1 {
                blend(img.get_pixel_mut(px, py), color, alpha);
            }
        }
    }
}

struct Canvas<'a> {
    img: RgbaImage,
    font: Option<&'a FontVec>,
    scale: PxScale,
    char_width: f64,
    char_height: f64,
}

impl Canvas<'_> {
    fn draw_text(&mut self, cell: &CellData, x: f64, y: f64, fg: [u8; 3]) {
        let Some(font) = self.font else {
            self.draw_block(x, y, fg);
            return;
        };
        let scaled = font.as_scaled(self.scale);
        let mut drawn = false;
        let mut pen_x = x as f32;
        let baseline = y as f32 + (self.char_height as f32 + scaled.ascent() + scaled.descent()) / 2.0;

        for ch in cell.char.chars() {
            let id = font.glyph_id(ch);
            if id.0 == 0 {
                continue;
            }
            let glyph = id.with_scale_and_position(self.scale, point(pen_x, baseline));
            pen_x += scaled.h_advance(id);
            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            drawn = true;
            let bounds = outlined.px_bounds();
            // Bold has no separate face; a second pass one pixel right thickens the strokes.
            let passes: &[f32] = if cell.bold { &[0.0, 1.0] } else { &[0.0] };
            for &shift in passes {
                let (width, height) = (self.img.width(), self.img.height());
                let img = &mut self.img;
                outlined.draw(|gx, gy, coverage| {
                    if coverage <= 0.0 {
                        return;
                    }
                    let px = (bounds.min.x + shift) as i64 + i64::from(gx);
                    let py = bounds.min.y as i64 + i64::from(gy);
                    if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                        return;
                    }
                    blend(
                        img.get_pixel_mut(px as u32, py as u32),
                        fg,
                        coverage.max(MIN_GLYPH_ALPHA),
                    );
                });
            }
        }

        if !drawn && cell.char.chars().any(|ch| !ch.is_whitespace()) {
            self.draw_block(x, y, fg);
        }
    }

    fn draw_block(&mut self, x: f64, y: f64, fg: [u8; 3]) {
        let margin = (self.char_width / 6.0).max(1.0);
        Rect::new(
            &self.img,
            x + margin,
            y + margin,
            self.char_width - margin * 2.0,
            self.char_height - margin * 2.0,
        )
        .fill(&mut self.img, fg, 0.7);
    }
}

/// Renders a screen snapshot as PNG bytes, using the same cell geometry as
/// [`render_svg`](super::render_svg).
pub fn render_png(state: &ScreenState, options: &ScreenshotOptions) -> Result<Vec<u8>, RenderError> {
    if state.width == 0 || state.height == 0 {
        return Err(RenderError::EmptyScreen {
            cols: state.width,
            rows: state.height,
        });
    }

    let (char_width, char_height) = cell_size(options.font_size);
    let width_px = (char_width * f64::from(state.width) + options.padding * 2.0).ceil();
    let height_px = (char_height * f64::from(state.height) + options.padding * 2.0).ceil();
    if !(1.0..=f64::from(MAX_EDGE)).contains(&width_px)
        || !(1.0..=f64::from(MAX_EDGE)).contains(&height_px)
    {
        return Err(RenderError::TooLarge {
            width: width_px.clamp(0.0, f64::from(u32::MAX)) as u32,
            height: height_px.clamp(0.0, f64::from(u32::MAX)) as u32,
        });
    }

    let background = parse_hex(BACKGROUND).unwrap_or([0, 0, 0]);
    let mut canvas = Canvas {
        img: RgbaImage::from_pixel(
            width_px as u32,
            height_px as u32,
            Rgba([background[0], background[1], background[2], 255]),
        ),
        font: font(),
        scale: PxScale::from(options.font_size as f32),
        char_width,
        char_height,
    };
    let cursor_color = parse_hex(&options.cursor_color).unwrap_or(FALLBACK_WHITE);
    let cursor = state.cursor;

    for (y, line) in state.lines.iter().take(usize::from(state.height)).enumerate() {
        let y_pos = options.padding + y as f64 * char_height;
        for (x, cell) in line.cells.iter().take(usize::from(state.width)).enumerate() {
            let x_pos = options.padding + x as f64 * char_width;
            let rect = Rect::new(&canvas.img, x_pos, y_pos, char_width, char_height);

            if let Some(bg) = parse_hex(&cell.bg).filter(|bg| *bg != background) {
                rect.fill(&mut canvas.img, bg, 1.0);
            }
            if options.show_cursor
                && cursor.visible
                && x == usize::from(cursor.col)
                && y == usize::from(cursor.row)
            {
                rect.fill(&mut canvas.img, cursor_color, CURSOR_ALPHA);
            }

            if cell.char.is_empty() || cell.char == " " {
                continue;
            }
            let fg = parse_hex(&cell.fg).unwrap_or(FALLBACK_WHITE);
            canvas.draw_text(cell, x_pos, y_pos, fg);

            if cell.underline {
                let underline = Rect::new(&canvas.img, x_pos, y_pos + char_height - 2.0, char_width, 1.0);
                underline.fill(&mut canvas.img, fg, 1.0);
            }
        }
    }

    let mut buf = Cursor::new(Vec::new());
    canvas.img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vterm::Renderer;
    use crate::vterm::VirtualTerminal;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    fn screen(input: &[u8], cols: u16, rows: u16) -> ScreenState {
        let mut term = VirtualTerminal::new(cols, rows);
        term.process(input);
        term.screen_state()
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#cd0000"), Some([0xcd, 0, 0]));
        assert_eq!(parse_hex("#FFFFFF"), Some([255, 255, 255]));
        assert_eq!(parse_hex("cd0000"), None);
        assert_eq!(parse_hex("#abc"), None);
        assert_eq!(parse_hex("#gg0000"), None);
    }

    #[test]
    fn test_png_dimensions_match_cell_grid() {
        let bytes = render_png(&screen(b"", 10, 2), &ScreenshotOptions::default()).unwrap();
        assert!(bytes.starts_with(PNG_MAGIC));
        let img = decode(&bytes);
        // ceil(10 * 8.4 + 16) x ceil(2 * 16.8 + 16)
        assert_eq!((img.width(), img.height()), (100, 50));
    }

    #[test]
    fn test_background_and_cursor_are_painted() {
        let options = ScreenshotOptions {
            font_size: 10.0,
            padding: 0.0,
            show_cursor: true,
            cursor_color: "#00ff00".into(),
        };
        // Red background under the first cell, cursor parked on the third.
        let img = decode(&render_png(&screen(b"\x1b[41m \x1b[0m ", 4, 1), &options).unwrap());
        assert_eq!(img.get_pixel(2, 5).0, [0xcd, 0, 0, 255]);
        // Cell 1 stays black; cell 2 is half green.
        assert_eq!(img.get_pixel(8, 5).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(14, 5).0, [0, 128, 0, 255]);

        let hidden = ScreenshotOptions {
            show_cursor: false,
            ..options
        };
        let img = decode(&render_png(&screen(b"  ", 4, 1), &hidden).unwrap());
        assert_eq!(img.get_pixel(14, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_text_leaves_ink_in_its_cell() {
        let options = ScreenshotOptions {
            show_cursor: false,
            ..ScreenshotOptions::default()
        };
        let img = decode(&render_png(&screen(b"\x1b[32mW", 3, 1), &options).unwrap());
        let (cw, ch) = cell_size(options.font_size);
        let inked = (8..(8.0 + cw) as u32)
            .flat_map(|x| (8..(8.0 + ch) as u32).map(move |y| (x, y)))
            .any(|(x, y)| img.get_pixel(x, y).0[1] > 0);
        assert!(inked);
        // The neighbouring cell stays clear.
        let right = (8.0 + cw * 2.0) as u32;
        assert!((right..right + 4).all(|x| img.get_pixel(x, 12).0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_degenerate_sizes_are_rejected() {
        let state = ScreenState {
            width: 0,
            ..screen(b"", 1, 1)
        };
        assert!(matches!(
            render_png(&state, &ScreenshotOptions::default()),
            Err(RenderError::EmptyScreen { cols: 0, rows: 1 })
        ));

        let huge = ScreenshotOptions {
            font_size: 10_000.0,
            ..ScreenshotOptions::default()
        };
        assert!(matches!(
            render_png(&screen(b"", 80, 24), &huge),
            Err(RenderError::TooLarge { .. })
        ));
    }
}
