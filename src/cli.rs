use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Terminal dashboard for department-scoped tasks.
/// Connection settings come from FLOWDESK_URL and FLOWDESK_KEY (or a .env file).
#[derive(Parser)]
#[command(name = "flowdesk", version, about = "Department task dashboard")]
pub struct Cli {
    /// Load environment variables from this file instead of ./.env.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Log target: off | stdout | stderr | <file path>. Overrides FLOWDESK_LOG.
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Tracing filter directive, e.g. "debug". Overrides FLOWDESK_LOG_LEVEL.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Defaults to `ui`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}
