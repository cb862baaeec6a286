#![forbid(unsafe_code)]

//! Bounded undo/redo history.
//!
//! # Architecture
//!
//! ```text
//! push(1) push(2) push(3)          max_history = 2
//! ┌───────────────────────────────────────────────┐
//! │ past:    [1, 2]      (oldest first)           │
//! │ present: 3                                    │
//! │ future:  []          (nearest redo first)     │
//! └───────────────────────────────────────────────┘
//!
//! undo() x2
//! ┌───────────────────────────────────────────────┐
//! │ past:    []                                   │
//! │ present: 1                                    │
//! │ future:  [2, 3]                               │
//! └───────────────────────────────────────────────┘
//!
//! push(4)  new branch, future cleared
//! ┌───────────────────────────────────────────────┐
//! │ past:    [1]                                  │
//! │ present: 4                                    │
//! │ future:  []                                   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The history is purely synchronous and never touches the scheduler.

pub mod history;

pub use history::{History, HistoryConfig, HistoryState};
