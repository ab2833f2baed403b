//! Runtime configuration.
//!
//! Values are read once at start-up from the process environment, optionally
//! seeded from a `.env` file. Nothing here validates the backend endpoint:
//! a missing or malformed URL or key only surfaces as a connection error on
//! the first fetch.
//!
//! ## Environment Variables
//! - `FLOWDESK_URL` (or `SUPABASE_URL`) - backend endpoint
//! - `FLOWDESK_KEY` (or `SUPABASE_ANON_KEY`) - access key
//! - `FLOWDESK_TIMEOUT_SECS` - per-request timeout, default 15
//! - `FLOWDESK_LOG` - `off`, `stdout`, `stderr` or a file path
//! - `FLOWDESK_LOG_LEVEL` - tracing filter directive, default `info`

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Off,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "0" | "off" | "none" => LogTarget::Off,
            "1" | "stdout" => LogTarget::Stdout,
            "2" | "stderr" => LogTarget::Stderr,
            path => LogTarget::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub log: LogTarget,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: String::new(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log: LogTarget::Off,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load `.env` (or the given file) into the environment, then read the config.
    pub fn load(env_file: Option<&Path>) -> Self {
        match env_file {
            Some(path) => {
                if let Err(e) = dotenvy::from_path(path) {
                    eprintln!("Could not read {}: {}", path.display(), e);
                }
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let defaults = Config::default();
        let request_timeout = first(&["FLOWDESK_TIMEOUT_SECS"])
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Config {
            backend_url: first(&["FLOWDESK_URL", "SUPABASE_URL"]).unwrap_or_default(),
            api_key: first(&["FLOWDESK_KEY", "SUPABASE_ANON_KEY"]).unwrap_or_default(),
            request_timeout,
            log: first(&["FLOWDESK_LOG"])
                .map(|v| LogTarget::parse(&v))
                .unwrap_or(defaults.log),
            log_level: first(&["FLOWDESK_LOG_LEVEL"]).unwrap_or(defaults.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_values_do_not_fail() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.backend_url.is_empty());
        assert!(config.api_key.is_empty());
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.log, LogTarget::Off);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_flowdesk_vars_win_over_supabase_fallbacks() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://fallback.example"),
            ("FLOWDESK_URL", "https://primary.example"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("FLOWDESK_TIMEOUT_SECS", "3"),
            ("FLOWDESK_LOG", "/tmp/flowdesk.log"),
        ]));
        assert_eq!(config.backend_url, "https://primary.example");
        assert_eq!(config.api_key, "anon");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.log, LogTarget::File(PathBuf::from("/tmp/flowdesk.log")));
    }

    #[test]
    fn test_bad_timeout_falls_back_to_default() {
        let config = Config::from_lookup(lookup(&[("FLOWDESK_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let config = Config::from_lookup(lookup(&[("FLOWDESK_TIMEOUT_SECS", "0")]));
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_log_target_parse() {
        assert_eq!(LogTarget::parse("off"), LogTarget::Off);
        assert_eq!(LogTarget::parse("2"), LogTarget::Stderr);
        assert_eq!(LogTarget::parse("stdout"), LogTarget::Stdout);
        assert_eq!(LogTarget::parse("run.log"), LogTarget::File(PathBuf::from("run.log")));
    }
}
