//! Caller-facing operations with serde request/response types.

mod input;
mod lifecycle;
mod screen;
mod spawn;
mod wait;

pub use input::SendInput;
pub use input::SendInputOutput;
pub use input::SendInputUseCase;
pub use input::escape_control_chars;
pub use lifecycle::CloseInput;
pub use lifecycle::CloseOutput;
pub use lifecycle::CloseUseCase;
pub use lifecycle::ListOutput;
pub use lifecycle::ListUseCase;
pub use lifecycle::ListedSession;
pub use lifecycle::ResizeInput;
pub use lifecycle::ResizeOutput;
pub use lifecycle::ResizeUseCase;
pub use screen::CompactScreen;
pub use screen::GetScreenInput;
pub use screen::GetScreenUseCase;
pub use screen::GetScreenshotInput;
pub use screen::GetScreenshotUseCase;
pub use screen::ScreenFormat;
pub use screen::ScreenOutput;
pub use screen::ScreenshotFormat;
pub use screen::ScreenshotOutput;
pub use spawn::SpawnInput;
pub use spawn::SpawnOutput;
pub use spawn::SpawnUseCase;
pub use wait::ExitSummary;
pub use wait::WaitForChangeInput;
pub use wait::WaitForChangeOutput;
pub use wait::WaitForChangeUseCase;
pub use wait::WaitForTextInput;
pub use wait::WaitForTextOutput;
pub use wait::WaitForTextUseCase;
