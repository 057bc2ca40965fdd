//! Logging configuration
//!
//! The bridge runs inside someone else's process, so it logs nothing above
//! `warn` unless asked:
//!
//! - `LIGHTGREP_JNI_LOG`: an `EnvFilter` directive, e.g. `jlightgrep=debug`
//! - `LIGHTGREP_JNI_LOG_ANSI`: `1`/`true` to colour output

use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LIGHTGREP_JNI_LOG";
pub const LOG_ANSI_ENV: &str = "LIGHTGREP_JNI_LOG_ANSI";
pub const DEFAULT_FILTER: &str = "warn";

static LOG_INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            ansi: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup(LOG_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let ansi = lookup(LOG_ANSI_ENV)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { filter, ansi }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }

    /// Install a stderr subscriber, once per process
    ///
    /// Does nothing if the host already installed a global subscriber.
    pub fn install(&self) {
        LOG_INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(self.env_filter())
                .with_ansi(self.ansi)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        });
    }
}
