#![forbid(unsafe_code)]

//! Structured logging setup.
//!
//! The runtime crates only emit `tracing` events and spans. Binaries (or
//! tests that want to see output) call [`init_logging`] once to install a
//! `tracing-subscriber` registry with an [`EnvFilter`].
//!
//! The human-readable format is always available; JSON output needs the
//! `json-logs` feature and falls back to the readable format otherwise.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging section of [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive string. Default: `info`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogSettings {
    /// The configured filter, or `info` if the directive does not parse.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a global subscriber was already installed; the
/// existing one is left in place.
pub fn init_logging(settings: &LogSettings) -> bool {
    let registry = tracing_subscriber::registry().with(settings.env_filter());
    let installed = match settings.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        #[cfg(feature = "json-logs")]
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        #[cfg(not(feature = "json-logs"))]
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        let settings = LogSettings::default();
        assert_eq!(settings.filter, "info");
        assert_eq!(settings.env_filter().to_string(), "info");
    }

    #[test]
    fn bad_directive_falls_back_to_info() {
        let settings = LogSettings {
            filter: "pdfdesk=[[[".into(),
            format: LogFormat::Pretty,
        };
        assert_eq!(settings.env_filter().to_string(), "info");
    }

    #[test]
    fn second_init_reports_false() {
        let settings = LogSettings::default();
        let _ = init_logging(&settings);
        assert!(!init_logging(&settings));
    }
}
