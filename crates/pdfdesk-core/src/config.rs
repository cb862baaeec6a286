#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`RuntimeConfig`] gathers every tunable of the runtime into one struct that
//! can be loaded from TOML or JSON and then overridden from the environment.
//!
//! ```toml
//! # pdfdesk.toml
//! [timing]
//! debounce_ms = 250
//! value_throttle = "drop-late"
//!
//! [history]
//! max_history = 80
//! ```
//!
//! | Variable                 | Field                  | Default |
//! |--------------------------|------------------------|---------|
//! | `PDFDESK_DEBOUNCE_MS`    | `timing.debounce_ms`   | 300     |
//! | `PDFDESK_THROTTLE_MS`    | `timing.throttle_ms`   | 300     |
//! | `PDFDESK_MAX_HISTORY`    | `history.max_history`  | 50      |
//! | `PDFDESK_ACTIVITY_LIMIT` | `activity.limit`       | 100     |
//! | `PDFDESK_LOG`            | `log.filter`           | `info`  |
//!
//! Unparseable environment values are ignored. Range checks happen in
//! [`RuntimeConfig::validate`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::delay::{Delay, ThrottlePolicy};
use crate::error::{ConfigError, TimingError};
use crate::logging::LogSettings;

pub const ENV_DEBOUNCE_MS: &str = "PDFDESK_DEBOUNCE_MS";
pub const ENV_THROTTLE_MS: &str = "PDFDESK_THROTTLE_MS";
pub const ENV_MAX_HISTORY: &str = "PDFDESK_MAX_HISTORY";
pub const ENV_ACTIVITY_LIMIT: &str = "PDFDESK_ACTIVITY_LIMIT";
pub const ENV_LOG: &str = "PDFDESK_LOG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// All runtime tunables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub timing: TimingSettings,
    pub history: HistorySettings,
    pub activity: ActivitySettings,
    pub retry: RetrySettings,
    pub log: LogSettings,
}

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config
    }

    /// Full startup path: read `path` (JSON when the extension is `.json`,
    /// TOML otherwise), apply environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
                Self::from_json_file(path)?
            }
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validated()
    }

    /// Overwrite fields for which `lookup` yields a parseable value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup(ENV_DEBOUNCE_MS).and_then(|v| v.trim().parse::<f64>().ok()) {
            self.timing.debounce_ms = ms;
        }
        if let Some(ms) = lookup(ENV_THROTTLE_MS).and_then(|v| v.trim().parse::<f64>().ok()) {
            self.timing.throttle_ms = ms;
        }
        if let Some(max) = lookup(ENV_MAX_HISTORY).and_then(|v| v.trim().parse::<usize>().ok()) {
            self.history.max_history = max;
        }
        if let Some(limit) =
            lookup(ENV_ACTIVITY_LIMIT).and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.activity.limit = limit;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log.filter = filter;
        }
    }

    /// Check every field. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        check_delay(&mut errors, "timing.debounce_ms", self.timing.debounce_ms);
        check_delay(&mut errors, "timing.throttle_ms", self.timing.throttle_ms);
        check_delay(&mut errors, "retry.delay_ms", self.retry.delay_ms);

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be > 0".into());
        }
        if self.activity.limit == 0 {
            errors.push("activity.limit must be > 0".into());
        }
        if self.activity.recent > self.activity.limit {
            errors.push(format!(
                "activity.recent ({}) must not exceed activity.limit ({})",
                self.activity.recent, self.activity.limit
            ));
        }
        if self.activity.storage_key.is_empty() {
            errors.push("activity.storage_key must not be empty".into());
        }

        errors
    }

    /// `self` if [`validate`](Self::validate) finds nothing, otherwise
    /// [`ConfigError::Invalid`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

fn check_delay(errors: &mut Vec<String>, field: &str, ms: f64) {
    if !ms.is_finite() || ms < 0.0 {
        errors.push(format!("{field} must be a finite, non-negative number, got {ms}"));
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Debounce and throttle defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Debounce window in milliseconds. Default: 300.
    pub debounce_ms: f64,
    /// Throttle window in milliseconds. Default: 300.
    pub throttle_ms: f64,
    /// Policy for throttled values. Default: drop-late.
    pub value_throttle: ThrottlePolicy,
    /// Policy for throttled functions. Default: defer-trailing.
    pub function_throttle: ThrottlePolicy,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300.0,
            throttle_ms: 300.0,
            value_throttle: ThrottlePolicy::DropLate,
            function_throttle: ThrottlePolicy::DeferTrailing,
        }
    }
}

impl TimingSettings {
    pub fn debounce_delay(&self) -> Result<Delay, TimingError> {
        Delay::try_from_millis_f64(self.debounce_ms)
    }

    pub fn throttle_delay(&self) -> Result<Delay, TimingError> {
        Delay::try_from_millis_f64(self.throttle_ms)
    }
}

/// Undo/redo capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum number of entries kept in the undo stack. Default: 50.
    pub max_history: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { max_history: 50 }
    }
}

/// Recent-activity log persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivitySettings {
    /// Maximum retained entries. Default: 100.
    pub limit: usize,
    /// Entries returned by the "recent" view. Default: 10.
    pub recent: usize,
    /// Storage key for the serialized log. Default: `app-history`.
    pub storage_key: String,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            limit: 100,
            recent: 10,
            storage_key: "app-history".into(),
        }
    }
}

/// Fixed-delay retry defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first. Default: 3.
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds. Default: 1000.
    pub delay_ms: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.timing.debounce_ms, 300.0);
        assert_eq!(config.history.max_history, 50);
        assert_eq!(config.activity.limit, 100);
        assert_eq!(config.activity.recent, 10);
        assert_eq!(config.activity.storage_key, "app-history");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.timing.value_throttle, ThrottlePolicy::DropLate);
        assert_eq!(config.timing.function_throttle, ThrottlePolicy::DeferTrailing);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [timing]
            debounce_ms = 120
            value_throttle = "defer-trailing"

            [history]
            max_history = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.debounce_ms, 120.0);
        assert_eq!(config.timing.throttle_ms, 300.0);
        assert_eq!(config.timing.value_throttle, ThrottlePolicy::DeferTrailing);
        assert_eq!(config.history.max_history, 5);
        assert_eq!(config.activity, ActivitySettings::default());
    }

    #[test]
    fn json_config_parses() {
        let config = RuntimeConfig::from_json_str(
            r#"{"retry": {"max_attempts": 5}, "log": {"filter": "debug", "format": "json"}}"#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_ms, 1000.0);
        assert_eq!(config.log.filter, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = RuntimeConfig::from_toml_str("[timing\ndebounce_ms = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            (ENV_DEBOUNCE_MS, "75"),
            (ENV_THROTTLE_MS, " 40.5 "),
            (ENV_MAX_HISTORY, "12"),
            (ENV_ACTIVITY_LIMIT, "20"),
            (ENV_LOG, "pdfdesk_runtime=trace"),
        ]));
        assert_eq!(config.timing.debounce_ms, 75.0);
        assert_eq!(config.timing.throttle_ms, 40.5);
        assert_eq!(config.history.max_history, 12);
        assert_eq!(config.activity.limit, 20);
        assert_eq!(config.log.filter, "pdfdesk_runtime=trace");
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            (ENV_DEBOUNCE_MS, "soon"),
            (ENV_MAX_HISTORY, "-3"),
            (ENV_LOG, "   "),
        ]));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn validate_reports_every_problem() {
        let mut config = RuntimeConfig::default();
        config.timing.debounce_ms = -1.0;
        config.timing.throttle_ms = f64::NAN;
        config.retry.max_attempts = 0;
        config.activity.limit = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("timing.debounce_ms")));
        assert!(errors.iter().any(|e| e.contains("timing.throttle_ms")));
        assert!(errors.iter().any(|e| e.contains("retry.max_attempts")));
        assert!(errors.iter().any(|e| e.contains("activity.recent")));
    }

    #[test]
    fn validated_wraps_errors() {
        let mut config = RuntimeConfig::default();
        config.activity.storage_key.clear();
        assert!(matches!(config.validated(), Err(ConfigError::Invalid(e)) if e.len() == 1));
    }

    #[test]
    fn timing_delays_convert() {
        let timing = TimingSettings::default();
        assert_eq!(
            timing.debounce_delay().unwrap().as_duration(),
            Duration::from_millis(300)
        );
        let bad = TimingSettings {
            throttle_ms: -10.0,
            ..TimingSettings::default()
        };
        assert!(bad.throttle_delay().is_err());
    }

    #[test]
    fn load_reads_toml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("pdfdesk.toml");
        std::fs::write(&toml_path, "[activity]\nrecent = 4\n").unwrap();
        assert_eq!(RuntimeConfig::from_toml_file(&toml_path).unwrap().activity.recent, 4);

        let json_path = dir.path().join("pdfdesk.json");
        std::fs::write(&json_path, r#"{"history": {"max_history": 9}}"#).unwrap();
        assert_eq!(
            RuntimeConfig::from_json_file(&json_path).unwrap().history.max_history,
            9
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuntimeConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
