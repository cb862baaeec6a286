#![forbid(unsafe_code)]

//! pdfdesk runtime
//!
//! Single-threaded building blocks for the pdfdesk frontend's view models.
//!
//! # Key Components
//!
//! - [`Observable`] - shared value with change notification
//! - [`Scheduler`] - cooperative timer queue driven by a [`Clock`]
//! - [`DebouncedValue`] / [`DebouncedFn`] - trailing-edge debounce
//! - [`ThrottledValue`] / [`ThrottledFn`] - leading-edge throttle
//! - [`History`] - bounded undo/redo over snapshots
//! - [`retry()`] - scheduler-driven retry with backoff
//! - [`Once`] - run a function at most once, keeping its first result
//! - [`StoredValue`] - observable mirrored into a [`StorageBackend`]
//! - [`ActivityLog`] - persisted recent-activity list
//!
//! # How it fits in the system
//! Nothing here spawns threads or blocks. Timers fire only when the owner
//! drives the [`Scheduler`] from its event loop (or, in tests, advances a
//! manual clock). The history engine and storage layer are synchronous.

pub mod activity;
pub mod once;
pub mod reactive;
pub mod retry;
pub mod storage;
pub mod timing;
pub mod undo;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog, NewActivity};
pub use pdfdesk_core::{Clock, Delay, ThrottlePolicy, TimingError};
pub use once::Once;
pub use reactive::{Observable, Subscription};
pub use retry::{BackoffStrategy, RetryError, RetryHandle, RetryPolicy, retry};
pub use storage::{
    FileStorage, MemoryStorage, StorageBackend, StorageError, StorageResult, StoredValue,
};
pub use timing::{
    DebouncedFn, DebouncedValue, Invocation, Scheduler, ThrottledFn, ThrottledValue, TimerId,
    WeakScheduler,
};
pub use undo::{History, HistoryConfig, HistoryState};
