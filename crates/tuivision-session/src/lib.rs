#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Session lifecycle on top of `tuivision-terminal`: a registry of PTY
//! sessions with an idle sweep, blocking waits on screen content, and the
//! serde-facing operations callers drive them through.

mod clock;
mod config;
mod error;
mod events;
mod manager;
mod session;
mod types;
pub mod usecases;
mod wait;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use config::DEFAULT_MAX_SESSIONS;
pub use config::ManagerConfig;
pub use error::ErrorCategory;
pub use error::SessionError;
pub use error::codes;
pub use events::EventBus;
pub use events::SessionEvent;
pub use events::Subscription;
pub use manager::SessionManager;
pub use manager::SpawnOptions;
pub use manager::SpawnedSession;
pub use session::Session;
pub use session::SessionExit;
pub use session::SessionInfo;
pub use session::SessionStatus;
pub use types::DEFAULT_COLS;
pub use types::DEFAULT_ROWS;
pub use types::MAX_COLS;
pub use types::MAX_ROWS;
pub use types::MIN_COLS;
pub use types::MIN_ROWS;
pub use types::SessionId;
pub use types::validate_dimensions;
pub use wait::ChangeWaitOutcome;
pub use wait::DEFAULT_CHANGE_TIMEOUT;
pub use wait::DEFAULT_STABLE;
pub use wait::DEFAULT_TEXT_TIMEOUT;
pub use wait::TextMatcher;
pub use wait::TextWaitOutcome;
pub use wait::WaitTarget;
pub use wait::wait_for_screen_change;
pub use wait::wait_for_text;

pub type Result<T> = std::result::Result<T, SessionError>;
