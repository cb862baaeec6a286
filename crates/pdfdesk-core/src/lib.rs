#![forbid(unsafe_code)]

//! pdfdesk core
//!
//! Shared foundations for the pdfdesk frontend runtime:
//!
//! - [`Clock`] - monotonic and manually driven time sources
//! - [`Delay`] - validated, non-negative timer delays
//! - [`ThrottlePolicy`] - how throttled wrappers treat in-window input
//! - [`TimingError`] / [`ConfigError`] - the error taxonomy
//! - [`RuntimeConfig`] - tunables loaded from TOML, JSON, or the environment
//! - [`init_logging`] - `tracing` subscriber installation
//!
//! # Role in pdfdesk
//! `pdfdesk-core` has no scheduling logic of its own. `pdfdesk-runtime`
//! builds the scheduler, timing wrappers, and history engine on top of it.

pub mod clock;
pub mod config;
pub mod delay;
pub mod error;
pub mod logging;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    ActivitySettings, HistorySettings, RetrySettings, RuntimeConfig, TimingSettings,
};
pub use delay::{Delay, ThrottlePolicy};
pub use error::{CallbackError, CallbackOutput, ConfigError, TimingError};
pub use logging::{LogFormat, LogSettings, init_logging};
