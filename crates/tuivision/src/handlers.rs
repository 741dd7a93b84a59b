use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use tuivision_session::ManagerConfig;
use tuivision_session::SessionManager;
use tuivision_session::TextMatcher;
use tuivision_session::usecases::CloseInput;
use tuivision_session::usecases::CloseUseCase;
use tuivision_session::usecases::ExitSummary;
use tuivision_session::usecases::GetScreenInput;
use tuivision_session::usecases::GetScreenUseCase;
use tuivision_session::usecases::GetScreenshotInput;
use tuivision_session::usecases::GetScreenshotUseCase;
use tuivision_session::usecases::ScreenOutput;
use tuivision_session::usecases::SendInput;
use tuivision_session::usecases::SendInputUseCase;
use tuivision_session::usecases::SpawnInput;
use tuivision_session::usecases::SpawnOutput;
use tuivision_session::usecases::SpawnUseCase;
use tuivision_session::usecases::WaitForChangeInput;
use tuivision_session::usecases::WaitForChangeUseCase;
use tuivision_session::usecases::WaitForTextInput;
use tuivision_session::usecases::WaitForTextUseCase;
use tuivision_terminal::KEY_NAMES;

use crate::commands::OutputFormat;
use crate::commands::RunArgs;
use crate::commands::screenshot_format;

/// Process exit status when `--wait-for` never matched.
pub const EXIT_WAIT_TIMEOUT: i32 = 75;

#[derive(Debug, Serialize)]
struct WaitReport {
    kind: &'static str,
    satisfied: bool,
    elapsed_ms: u64,
    #[serde(flatten)]
    exit: ExitSummary,
}

#[derive(Debug, Serialize)]
struct RunReport {
    #[serde(flatten)]
    session: SpawnOutput,
    wait: WaitReport,
    screen: ScreenOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<String>,
}

/// Runs one spawn/interact/capture cycle and returns the process exit status.
pub fn handle_run(args: RunArgs, out: &mut impl Write) -> anyhow::Result<i32> {
    // Reject a bad pattern before anything is spawned or typed.
    if let Some(pattern) = &args.wait_for {
        TextMatcher::new(pattern, args.flags.as_deref())?;
    }

    let manager = Arc::new(SessionManager::new(ManagerConfig::from_env()));

    let spawned = SpawnUseCase::new(Arc::clone(&manager)).execute(SpawnInput {
        command: args.command.clone(),
        args: args.args.clone(),
        cols: Some(args.cols),
        rows: Some(args.rows),
        env: (!args.env.is_empty()).then(|| args.env.iter().cloned().collect::<HashMap<_, _>>()),
        cwd: args.cwd.clone(),
        use_script: args.use_script,
        answer_queries: !args.no_answer_queries,
    })?;
    let session_id = spawned.session_id.to_string();
    debug!(session_id = %session_id, pid = ?spawned.pid, "Spawned");

    let result = drive(&manager, &session_id, spawned, &args, out);

    // The child may already have been reaped; closing only drops the entry.
    if let Err(err) = CloseUseCase::new(Arc::clone(&manager)).execute(CloseInput {
        session_id: session_id.clone(),
    }) {
        debug!(session_id = %session_id, error = %err, "Close after run failed");
    }
    manager.dispose();
    result
}

fn drive(
    manager: &Arc<SessionManager>,
    session_id: &str,
    spawned: SpawnOutput,
    args: &RunArgs,
    out: &mut impl Write,
) -> anyhow::Result<i32> {
    let wait_change = WaitForChangeUseCase::new(Arc::clone(manager));
    let change_input = WaitForChangeInput {
        session_id: session_id.to_string(),
        timeout_ms: args.timeout_ms,
        stable_ms: args.stable_ms,
    };

    if args.input.is_some() || !args.keys.is_empty() {
        // Let the program draw before typing into it.
        let ready = wait_change.execute(change_input.clone())?;
        if !ready.exit.exited {
            SendInputUseCase::new(Arc::clone(manager)).execute(SendInput {
                session_id: session_id.to_string(),
                input: args.input.clone(),
                key: None,
                keys: (!args.keys.is_empty()).then(|| args.keys.clone()),
            })?;
        }
    }

    let wait = match &args.wait_for {
        Some(pattern) => {
            let outcome = WaitForTextUseCase::new(Arc::clone(manager)).execute(WaitForTextInput {
                session_id: session_id.to_string(),
                pattern: pattern.clone(),
                flags: args.flags.clone(),
                timeout_ms: args.timeout_ms,
            })?;
            WaitReport {
                kind: "text",
                satisfied: outcome.found,
                elapsed_ms: outcome.elapsed_ms,
                exit: outcome.exit,
            }
        }
        None => {
            let outcome = wait_change.execute(change_input)?;
            WaitReport {
                kind: "change",
                satisfied: outcome.changed,
                elapsed_ms: outcome.elapsed_ms,
                exit: outcome.exit,
            }
        }
    };

    let screen = GetScreenUseCase::new(Arc::clone(manager)).execute(GetScreenInput {
        session_id: session_id.to_string(),
        format: args.format.screen_format(),
    })?;

    let screenshot = match &args.screenshot {
        Some(path) => {
            let input = GetScreenshotInput {
                format: screenshot_format(path),
                ..GetScreenshotInput::new(session_id)
            };
            let (_, bytes) = GetScreenshotUseCase::new(Arc::clone(manager)).render(input)?;
            std::fs::write(path, bytes)
                .with_context(|| format!("writing screenshot to {}", path.display()))?;
            Some(path.display().to_string())
        }
        None => None,
    };

    let status = if args.wait_for.is_some() && !wait.satisfied {
        EXIT_WAIT_TIMEOUT
    } else {
        0
    };

    match (args.format, screen) {
        (OutputFormat::Text, ScreenOutput::Text(text)) => {
            writeln!(out, "{text}")?;
        }
        (_, screen) => {
            let report = RunReport {
                session: spawned,
                wait,
                screen,
                screenshot,
            };
            let value: Value = serde_json::to_value(&report)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
    }
    Ok(status)
}

pub fn handle_keys(out: &mut impl Write) -> anyhow::Result<()> {
    for name in KEY_NAMES {
        writeln!(out, "{name}")?;
    }
    writeln!(out)?;
    writeln!(out, "Modifiers: ctrl+<letter>, alt+<key>, meta+<key>, shift+tab")?;
    Ok(())
}
