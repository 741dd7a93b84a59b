mod commands;
mod handlers;

use clap::Parser;

use tuivision_common::init_tracing;
use tuivision_session::ErrorCategory;
use tuivision_session::SessionError;

use crate::commands::Cli;
use crate::commands::Commands;

fn main() {
    let telemetry = init_tracing("warn");
    let code = match run() {
        Ok(code) => code,
        Err(e) => report_error(&e),
    };
    // process::exit skips destructors; flush buffered logs first.
    drop(telemetry);
    std::process::exit(code);
}

fn report_error(e: &anyhow::Error) -> i32 {
    if let Some(session_error) = e.downcast_ref::<SessionError>() {
        eprintln!("Error: {session_error}");
        eprintln!("Suggestion: {}", session_error.suggestion());
        if session_error.is_retryable() {
            eprintln!("(This error may be transient - retry may succeed)");
        }
        return exit_code_for_session_error(session_error);
    }
    eprintln!("Error: {e:#}");
    1
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Run(args) => handlers::handle_run(args, &mut stdout),
        Commands::Keys => {
            handlers::handle_keys(&mut stdout)?;
            Ok(0)
        }
    }
}

fn exit_code_for_session_error(error: &SessionError) -> i32 {
    match error.category() {
        ErrorCategory::InvalidInput => 64, // EX_USAGE
        ErrorCategory::NotFound => 69,     // EX_UNAVAILABLE
        ErrorCategory::Busy => 73,         // EX_CANTCREAT
        ErrorCategory::External => 74,     // EX_IOERR
    }
}
