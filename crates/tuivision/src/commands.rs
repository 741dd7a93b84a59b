use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use tuivision_session::usecases::ScreenFormat;
use tuivision_session::usecases::ScreenshotFormat;

const LONG_ABOUT: &str = r#"tuivision runs terminal programs inside a virtual terminal so scripts can
type into them, wait for output and read the screen back.

WORKFLOW:
    1. Spawn the program in a PTY
    2. Optionally send text and keys
    3. Wait for a pattern or for the screen to settle
    4. Print the screen and close the session

EXAMPLES:
    # Capture htop's first frame
    tuivision run htop

    # Answer a prompt and wait for the result
    tuivision run --key Enter --wait-for 'Created' -- npx create-next-app

    # Save a screenshot (PNG, or SVG when the name ends in .svg)
    tuivision run --screenshot vim.png -- vim README.md"#;

#[derive(Parser)]
#[command(name = "tuivision")]
#[command(author, version)]
#[command(about = "Drive terminal programs headlessly and capture their screen")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Spawn a program, interact with it once and print its screen
    #[command(name = "run")]
    Run(RunArgs),

    /// List the key names accepted by --key
    #[command(name = "keys")]
    Keys,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Command to execute. A single string is split like a shell would.
    pub command: String,

    /// Arguments for the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Terminal width in columns
    #[arg(long, default_value_t = 80)]
    pub cols: u32,

    /// Terminal height in rows
    #[arg(long, default_value_t = 24)]
    pub rows: u32,

    /// Working directory for the spawned process
    #[arg(short = 'd', long)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable as KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Raw text to type once the program has drawn
    #[arg(short, long)]
    pub input: Option<String>,

    /// Key to press after the text, e.g. Enter or ctrl+c (repeatable)
    #[arg(short, long = "key")]
    pub keys: Vec<String>,

    /// Wait until the screen matches this regular expression
    #[arg(short, long)]
    pub wait_for: Option<String>,

    /// Regex flags for --wait-for (i, m, s)
    #[arg(long, requires = "wait_for")]
    pub flags: Option<String>,

    /// Upper bound for each wait, in milliseconds
    #[arg(short, long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// How long the screen must stay unchanged to count as settled
    #[arg(long, default_value_t = 300)]
    pub stable_ms: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write a screenshot to this file: SVG for *.svg, PNG otherwise
    #[arg(long)]
    pub screenshot: Option<PathBuf>,

    /// Run the program under script(1)
    #[arg(long)]
    pub use_script: bool,

    /// Leave terminal queries (cursor position, device attributes) unanswered
    #[arg(long)]
    pub no_answer_queries: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain screen text
    Text,
    /// JSON with screen text, size and cursor
    Compact,
    /// JSON with every cell
    Full,
}

impl OutputFormat {
    pub fn screen_format(self) -> ScreenFormat {
        match self {
            OutputFormat::Text => ScreenFormat::Text,
            OutputFormat::Compact => ScreenFormat::Compact,
            OutputFormat::Full => ScreenFormat::Full,
        }
    }
}

/// Picks the image format from a screenshot path's extension.
pub fn screenshot_format(path: &Path) -> ScreenshotFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("svg") => ScreenshotFormat::Svg,
        _ => ScreenshotFormat::Png,
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
