//! # FlowDesk - department task dashboard
//!
//! A terminal dashboard for tasks organised under departments and
//! sub-departments, kept live against a hosted Postgres backend exposed over
//! PostgREST, plus a small CLI for scripting.
//!
//! ## Key Features
//!
//! - **Department tree**: top-level departments with one level of sub-departments,
//!   each with a colour and icon, and a progress gauge for the selected scope
//! - **Three views**: a list table, a board grouped by status, and a timeline
//!   positioning dated tasks between the earliest and latest due date
//! - **Task detail**: subtasks, comments and status changes that show up
//!   immediately and are confirmed by the next fetch
//! - **Live updates**: a realtime change feed triggers a full refetch whenever
//!   another client writes
//!
//! ## Quick Start
//!
//! ```bash
//! export FLOWDESK_URL=https://<project>.supabase.co
//! export FLOWDESK_KEY=<anon key>
//!
//! # Launch the dashboard
//! flowdesk
//!
//! # Add a task via CLI
//! flowdesk add "Draft hiring plan" --dept "Engineering › Backend" --due "next fri"
//!
//! # List overdue-prone work on a timeline
//! flowdesk list --status in-progress --timeline
//! ```
//!
//! ## Key Commands
//!
//! - `flowdesk ui` - Launch the dashboard (the default)
//! - `flowdesk list` - Tasks with department/search/status/priority filters
//! - `flowdesk depts` - Department tree with progress
//! - `flowdesk members` - Team members
//! - `flowdesk add <title>` - Create a task
//! - `flowdesk status <id> <status>` - Move a task through the workflow
//!
//! Settings are read from the environment and an optional `.env` file; see
//! [`config`].

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

pub mod backend;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod crud;
pub mod db;
pub mod department;
pub mod error;
pub mod fields;
pub mod logging;
pub mod member;
pub mod realtime;
pub mod sync;
pub mod task;
pub mod views;
pub mod tui {
    pub mod app;
    pub mod colors;
    pub mod dept_form;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod task_form;
    pub mod task_views;
    pub mod utils;
}

use backend::{Backend, RestBackend};
use cli::Cli;
use cmd::*;
use config::{Config, LogTarget};

async fn dispatch(command: Commands, backend: Arc<dyn Backend>) -> error::Result<()> {
    match command {
        Commands::Ui => cmd_ui(backend),

        Commands::List { dept, search, status, priority, timeline } =>
            cmd_list(backend.as_ref(), dept, search, status, priority, timeline).await,

        Commands::Depts => cmd_depts(backend.as_ref()).await,

        Commands::Members => cmd_members(backend.as_ref()).await,

        Commands::Add { title, desc, dept, status, priority, assignee, due, recurrence, tags } =>
            cmd_add(backend.as_ref(), title, desc, dept, status, priority, assignee, due,
                    recurrence, tags).await,

        Commands::Status { id, status } => cmd_status(backend.as_ref(), id, status).await,

        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = Config::load(cli.env_file.as_deref());
    if let Some(log) = cli.log.as_deref() {
        config.log = LogTarget::parse(log);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Err(e) = logging::init(&config.log, &config.log_level) {
        eprintln!("Could not open log target: {e}");
    }

    let backend: Arc<dyn Backend> = Arc::new(RestBackend::new(&config));
    let command = cli.command.unwrap_or(Commands::Ui);
    info!(backend = %config.backend_url, "starting");

    if let Err(e) = dispatch(command, backend).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
