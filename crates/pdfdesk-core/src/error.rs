#![forbid(unsafe_code)]

//! Error taxonomy shared by the pdfdesk crates.
//!
//! Timing errors are narrow: a bad delay is rejected when a wrapper is
//! constructed, and errors raised by a wrapped function surface from the
//! scheduler tick that ran it. Calling `undo`/`redo` on an empty stack is not
//! an error at all; it yields `None`.

use std::convert::Infallible;
use thiserror::Error;

/// Error returned by a scheduled callback or a wrapped function.
pub type CallbackError = Box<dyn std::error::Error + 'static>;

/// Errors from the timing layer.
#[derive(Debug, Error)]
pub enum TimingError {
    /// A caller passed an out-of-range argument.
    #[error("invalid argument `{what}`: {reason} (got {value})")]
    InvalidArgument {
        what: &'static str,
        reason: &'static str,
        value: f64,
    },

    /// `advance_by` only makes sense for virtual time.
    #[error("advancing time requires a scheduler driven by a manual clock")]
    ManualClockRequired,

    /// A callback fired by the scheduler returned an error.
    #[error("scheduled callback failed: {0}")]
    Callback(#[source] CallbackError),
}

impl TimingError {
    pub(crate) fn negative_delay(value: f64) -> Self {
        Self::InvalidArgument {
            what: "delay",
            reason: "must be a finite, non-negative number of milliseconds",
            value,
        }
    }
}

impl From<Infallible> for TimingError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Errors from loading a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration parsed but failed validation.
    #[error("configuration rejected: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Return types a wrapped function may have.
///
/// Infallible callbacks return `()`. Fallible ones return `Result<(), E>`;
/// the error is boxed and handed to whoever drives the invocation.
pub trait CallbackOutput {
    fn into_result(self) -> Result<(), CallbackError>;
}

impl CallbackOutput for () {
    fn into_result(self) -> Result<(), CallbackError> {
        Ok(())
    }
}

impl<E: Into<CallbackError>> CallbackOutput for Result<(), E> {
    fn into_result(self) -> Result<(), CallbackError> {
        self.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_output_is_ok() {
        assert!(().into_result().is_ok());
    }

    #[test]
    fn result_output_boxes_error() {
        let out: Result<(), String> = Err("disk full".to_string());
        let err = out.into_result().unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn invalid_argument_message_names_field() {
        let err = TimingError::negative_delay(-5.0);
        let msg = err.to_string();
        assert!(msg.contains("delay"));
        assert!(msg.contains("-5"));
    }

    #[test]
    fn callback_error_exposes_source() {
        use std::error::Error as _;
        let err = TimingError::Callback("boom".into());
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".into()));
    }

    #[test]
    fn invalid_config_joins_messages() {
        let err = ConfigError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "configuration rejected: a; b");
    }
}
