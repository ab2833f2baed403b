//! Log subscriber set-up.
//!
//! The dashboard owns the terminal, so logging defaults to off; point
//! `FLOWDESK_LOG` at a file to follow fetches and change notifications.

use std::fs::OpenOptions;

use tracing_subscriber::EnvFilter;

use crate::config::LogTarget;

/// Install the global `tracing` subscriber for the given target.
pub fn init(target: &LogTarget, level: &str) -> std::io::Result<()> {
    let filter = || EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = || tracing_subscriber::fmt().with_env_filter(filter());

    let installed = match target {
        LogTarget::Off => return Ok(()),
        LogTarget::Stdout => builder().with_writer(std::io::stdout).try_init(),
        LogTarget::Stderr => builder().with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
    };

    if let Err(e) = installed {
        eprintln!("Logging already initialised: {e}");
    }
    Ok(())
}
