//! Tracing setup for the tuivision binary.
//!
//! Logs go to stderr so stdout stays free for screen output. Environment:
//! - `RUST_LOG`: `EnvFilter` directives, overriding the default level
//! - `TUIVISION_LOG`: append to this file instead of stderr
//! - `TUIVISION_LOG_FORMAT`: `text` (default) or `json`

use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Flushes the log file on drop. Hold it until the process is about to exit.
#[derive(Debug)]
pub struct TelemetryGuard {
    _file_writer: Option<WorkerGuard>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LogSettings {
    directives: Option<String>,
    file: Option<PathBuf>,
    json: bool,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        Self {
            directives: value("RUST_LOG"),
            file: value("TUIVISION_LOG").map(PathBuf::from),
            json: value("TUIVISION_LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json")),
        }
    }

    /// Unparseable `RUST_LOG` falls back to `default_level`.
    fn filter(&self, default_level: &str) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(default_level))
    }
}

/// Installs the global subscriber. A second call leaves the first in place.
pub fn init_tracing(default_level: &str) -> TelemetryGuard {
    install(
        &LogSettings::from_lookup(|key| std::env::var(key).ok()),
        default_level,
    )
}

fn install(settings: &LogSettings, default_level: &str) -> TelemetryGuard {
    let (writer, file_writer) = match settings.file.as_deref().and_then(open_log_file) {
        Some(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = file_writer.is_none() && std::io::stderr().is_terminal();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if settings.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(writer)
            .with_filter(settings.filter(default_level))
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(settings.filter(default_level))
            .boxed()
    };

    let installed = tracing_subscriber::registry().with(layer).try_init().is_ok();
    TelemetryGuard {
        _file_writer: file_writer.filter(|_| installed),
    }
}

#[expect(clippy::print_stderr, reason = "runs before a subscriber exists")]
fn open_log_file(path: &Path) -> Option<File> {
    match File::options().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!(
                "Warning: cannot open log file {}: {err}; logging to stderr",
                path.display()
            );
            None
        }
    }
}
