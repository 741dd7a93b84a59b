#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Terminal-side building blocks: the PTY spawn primitive, the vt100-backed
//! screen model, the query responder and the PNG and SVG screenshot renderers.

pub mod error;
mod keys;
mod pty;
mod query_responder;
mod screenshot;
mod vterm;

pub use error::PtyError;
pub use error::RenderError;
pub use error::SpawnErrorKind;
pub use keys::KEY_NAMES;
pub use keys::key_to_escape_sequence;
pub use pty::ChildExit;
pub use pty::PtyHandle;
pub use pty::ReadEvent;
pub use query_responder::QueryResponder;
pub use screenshot::ScreenshotOptions;
pub use screenshot::render_png;
pub use screenshot::render_svg;
pub use vterm::CellData;
pub use vterm::CursorPosition;
pub use vterm::LineData;
pub use vterm::Renderer;
pub use vterm::ScreenState;
pub use vterm::VirtualTerminal;

pub type Result<T> = std::result::Result<T, PtyError>;
