use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::Serialize;
use tuivision_terminal::CursorPosition;
use tuivision_terminal::ScreenState;
use tuivision_terminal::ScreenshotOptions;
use tuivision_terminal::render_png;
use tuivision_terminal::render_svg;

use crate::error::SessionError;
use crate::manager::SessionManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenFormat {
    /// Every cell with colours and attributes.
    #[default]
    Full,
    /// Plain text only.
    Text,
    /// Text plus size and cursor.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GetScreenInput {
    pub session_id: String,
    #[serde(default)]
    pub format: ScreenFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactScreen {
    pub width: u16,
    pub height: u16,
    pub cursor: CursorPosition,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScreenOutput {
    Full(ScreenState),
    Text(String),
    Compact(CompactScreen),
}

pub struct GetScreenUseCase {
    manager: Arc<SessionManager>,
}

impl GetScreenUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id, format = ?input.format))]
    pub fn execute(&self, input: GetScreenInput) -> Result<ScreenOutput, SessionError> {
        let session = self.manager.require(&input.session_id)?;
        let output = match input.format {
            ScreenFormat::Text => ScreenOutput::Text(session.screen_text()),
            ScreenFormat::Compact => {
                let state = session.screen_state();
                ScreenOutput::Compact(CompactScreen {
                    width: state.width,
                    height: state.height,
                    cursor: state.cursor,
                    text: state.text(),
                })
            }
            ScreenFormat::Full => ScreenOutput::Full(session.screen_state()),
        };
        Ok(output)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Svg,
}

impl ScreenshotFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Svg => "svg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "image/png",
            ScreenshotFormat::Svg => "image/svg+xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetScreenshotInput {
    pub session_id: String,
    #[serde(default)]
    pub format: ScreenshotFormat,
    pub font_size: Option<f64>,
    pub show_cursor: Option<bool>,
    pub cursor_color: Option<String>,
}

impl GetScreenshotInput {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            format: ScreenshotFormat::default(),
            font_size: None,
            show_cursor: None,
            cursor_color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenshotOutput {
    pub format: ScreenshotFormat,
    pub mime_type: &'static str,
    /// Base64 PNG bytes, or the SVG document itself.
    pub data: String,
    /// Terminal columns.
    pub width: u16,
    /// Terminal rows.
    pub height: u16,
}

pub struct GetScreenshotUseCase {
    manager: Arc<SessionManager>,
}

impl GetScreenshotUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id, format = input.format.as_str()))]
    pub fn execute(&self, input: GetScreenshotInput) -> Result<ScreenshotOutput, SessionError> {
        let (output, _) = self.render(input)?;
        Ok(output)
    }

    /// Like [`execute`](Self::execute) but also hands back the raw image
    /// bytes, for callers that write the file themselves.
    pub fn render(&self, input: GetScreenshotInput) -> Result<(ScreenshotOutput, Vec<u8>), SessionError> {
        let session = self.manager.require(&input.session_id)?;

        let defaults = ScreenshotOptions::default();
        let options = ScreenshotOptions {
            font_size: input
                .font_size
                .filter(|size| size.is_finite() && *size > 0.0)
                .unwrap_or(defaults.font_size),
            show_cursor: input.show_cursor.unwrap_or(defaults.show_cursor),
            cursor_color: input.cursor_color.unwrap_or(defaults.cursor_color),
            ..defaults
        };

        let state = session.screen_state();
        let (data, bytes) = match input.format {
            ScreenshotFormat::Png => {
                let png = render_png(&state, &options)?;
                (STANDARD.encode(&png), png)
            }
            ScreenshotFormat::Svg => {
                let svg = render_svg(&state, &options);
                let bytes = svg.clone().into_bytes();
                (svg, bytes)
            }
        };
        tracing::debug!(bytes = bytes.len(), "Screenshot rendered");

        let output = ScreenshotOutput {
            format: input.format,
            mime_type: input.format.mime_type(),
            data,
            width: state.width,
            height: state.height,
        };
        Ok((output, bytes))
    }
}
