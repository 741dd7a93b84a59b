//! Blocking waits over a session's event stream.
//!
//! Both waits subscribe before looking at the session, so an event published
//! between the initial check and the first receive is never missed.

use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::RecvTimeoutError;
use regex::Regex;
use regex::RegexBuilder;

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::events::Subscription;
use crate::session::Session;
use crate::session::SessionExit;

pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CHANGE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STABLE: Duration = Duration::from_millis(300);

/// Anything a wait can observe.
pub trait WaitTarget {
    fn subscribe(&self) -> Subscription;
    /// `None` while the process is running.
    fn exit(&self) -> Option<SessionExit>;
    fn screen_text(&self) -> String;
}

impl WaitTarget for Session {
    fn subscribe(&self) -> Subscription {
        Session::subscribe(self)
    }

    fn exit(&self) -> Option<SessionExit> {
        self.status().exit()
    }

    fn screen_text(&self) -> String {
        Session::screen_text(self)
    }
}

/// A compiled screen-text pattern.
///
/// Flags follow the JavaScript convention: `i`, `m` and `s` change matching,
/// `g`, `y` and `u` are accepted and have no effect here.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    regex: Regex,
}

impl TextMatcher {
    pub fn new(pattern: &str, flags: Option<&str>) -> Result<Self, SessionError> {
        let invalid = |reason: String| SessionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.unwrap_or_default().chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'g' | 'y' | 'u' => {}
                other => return Err(invalid(format!("unsupported flag '{other}'"))),
            }
        }

        let regex = builder.build().map_err(|e| invalid(e.to_string()))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWaitOutcome {
    pub found: bool,
    pub elapsed: Duration,
    pub screen_text: String,
    pub exit: Option<SessionExit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeWaitOutcome {
    pub changed: bool,
    pub elapsed: Duration,
    pub screen_text: String,
    pub exit: Option<SessionExit>,
}

/// Blocks until the screen text matches, the process stops, or `timeout`
/// elapses.
pub fn wait_for_text<T>(target: &T, matcher: &TextMatcher, timeout: Duration) -> TextWaitOutcome
where
    T: WaitTarget + ?Sized,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let subscription = target.subscribe();

    let outcome = |found: bool, screen_text: String, exit: Option<SessionExit>| TextWaitOutcome {
        found,
        elapsed: start.elapsed(),
        screen_text,
        exit,
    };

    if let Some(exit) = target.exit() {
        return outcome(false, target.screen_text(), Some(exit));
    }

    let mut text = target.screen_text();
    if matcher.is_match(&text) {
        return outcome(true, text, None);
    }

    loop {
        match subscription.recv_deadline(deadline) {
            Ok(SessionEvent::Data(_)) => {
                text = target.screen_text();
                if matcher.is_match(&text) {
                    return outcome(true, text, None);
                }
            }
            Ok(SessionEvent::Exit(exit)) => {
                return outcome(false, target.screen_text(), Some(exit));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let exit = target.exit().unwrap_or(SessionExit::Closed(None));
                return outcome(false, target.screen_text(), Some(exit));
            }
            Err(RecvTimeoutError::Timeout) => return outcome(false, text, None),
        }
    }
}

/// Blocks until the screen text differs from what it was on entry and then
/// stays unchanged for `stable`. Each new change restarts the quiet period.
pub fn wait_for_screen_change<T>(target: &T, timeout: Duration, stable: Duration) -> ChangeWaitOutcome
where
    T: WaitTarget + ?Sized,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let subscription = target.subscribe();

    let outcome = |changed: bool, screen_text: String, exit: Option<SessionExit>| {
        ChangeWaitOutcome {
            changed,
            elapsed: start.elapsed(),
            screen_text,
            exit,
        }
    };

    let baseline = target.screen_text();
    if let Some(exit) = target.exit() {
        return outcome(false, baseline, Some(exit));
    }

    let mut last_text = baseline.clone();
    let mut settle_at: Option<Instant> = None;

    loop {
        let wake_at = settle_at.map_or(deadline, |settle| settle.min(deadline));
        match subscription.recv_deadline(wake_at) {
            Ok(SessionEvent::Data(_)) => {
                let next = target.screen_text();
                if next != last_text {
                    last_text = next;
                    settle_at = Some(Instant::now() + stable);
                }
            }
            Ok(SessionEvent::Exit(exit)) => {
                let final_text = target.screen_text();
                return outcome(final_text != baseline, final_text, Some(exit));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let final_text = target.screen_text();
                let exit = target.exit().unwrap_or(SessionExit::Closed(None));
                return outcome(final_text != baseline, final_text, Some(exit));
            }
            Err(RecvTimeoutError::Timeout) => {
                let settled = settle_at.is_some_and(|settle| Instant::now() >= settle);
                if settled {
                    return outcome(true, last_text, None);
                }
                if Instant::now() >= deadline {
                    return outcome(false, last_text, None);
                }
            }
        }
    }
}
