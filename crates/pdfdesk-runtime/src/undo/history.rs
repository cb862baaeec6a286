#![forbid(unsafe_code)]

//! Past/present/future snapshot history with a capped past.

use std::collections::VecDeque;
use std::fmt;

use pdfdesk_core::HistorySettings;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Configuration for [`History`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept in `past`. Oldest entries are
    /// evicted first. Zero keeps nothing.
    pub max_history: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_history: 50 }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self { max_history }
    }

    /// No eviction at all (for tests and short-lived editors).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_history: usize::MAX,
        }
    }
}

impl From<&HistorySettings> for HistoryConfig {
    fn from(settings: &HistorySettings) -> Self {
        Self::new(settings.max_history)
    }
}

/// An owned copy of all three slots, in the same order as [`History`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState<T> {
    pub past: Vec<T>,
    pub present: Option<T>,
    pub future: Vec<T>,
}

impl<T> Default for HistoryState<T> {
    fn default() -> Self {
        Self {
            past: Vec::new(),
            present: None,
            future: Vec::new(),
        }
    }
}

/// Undo/redo over immutable snapshots.
///
/// # Invariants
///
/// 1. `past.len() <= config.max_history` after every operation.
/// 2. `push` clears `future`.
/// 3. `present` is its own slot, never an element of `past` or `future`.
/// 4. `can_undo() == !past.is_empty()` and `can_redo() == !future.is_empty()`.
pub struct History<T> {
    /// Oldest first.
    past: VecDeque<T>,
    present: Option<T>,
    /// Nearest redo first.
    future: VecDeque<T>,
    config: HistoryConfig,
}

impl<T: fmt::Debug> fmt::Debug for History<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("present", &self.present)
            .field("undo_depth", &self.past.len())
            .field("redo_depth", &self.future.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<T> History<T> {
    /// An empty history with no present value.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            past: VecDeque::new(),
            present: None,
            future: VecDeque::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_initial(initial: T, config: HistoryConfig) -> Self {
        let mut history = Self::new(config);
        history.present = Some(initial);
        history
    }

    /// Rebuild a history from a saved state. `past` is trimmed to capacity
    /// from the oldest end.
    #[must_use]
    pub fn from_state(state: HistoryState<T>, config: HistoryConfig) -> Self {
        let mut history = Self {
            past: state.past.into(),
            present: state.present,
            future: state.future.into(),
            config,
        };
        history.enforce_capacity();
        history
    }

    // ====================================================================
    // Navigation
    // ====================================================================

    /// Record `value` as the new present. The previous present (if any)
    /// becomes the most recent past entry, and all redo history is dropped.
    pub fn push(&mut self, value: T) {
        if let Some(previous) = self.present.replace(value) {
            self.past.push_back(previous);
            self.enforce_capacity();
        }
        self.future.clear();
        trace!(undo_depth = self.past.len(), "history push");
    }

    /// Step back one entry. Returns `None` (and changes nothing) if there is
    /// no past.
    pub fn undo(&mut self) -> Option<&T> {
        let previous = self.past.pop_back()?;
        if let Some(current) = self.present.replace(previous) {
            self.future.push_front(current);
        }
        trace!(
            undo_depth = self.past.len(),
            redo_depth = self.future.len(),
            "history undo"
        );
        self.present.as_ref()
    }

    /// Step forward one entry. Returns `None` (and changes nothing) if there
    /// is no future.
    pub fn redo(&mut self) -> Option<&T> {
        let next = self.future.pop_front()?;
        if let Some(current) = self.present.replace(next) {
            self.past.push_back(current);
            self.enforce_capacity();
        }
        trace!(
            undo_depth = self.past.len(),
            redo_depth = self.future.len(),
            "history redo"
        );
        self.present.as_ref()
    }

    /// Forget all history and start over from `present`.
    pub fn reset(&mut self, present: Option<T>) {
        self.past.clear();
        self.future.clear();
        self.present = present;
    }

    /// Forget past and future, keeping the present.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    // ====================================================================
    // Query
    // ====================================================================

    #[must_use]
    pub fn present(&self) -> Option<&T> {
        self.present.as_ref()
    }

    /// Oldest first.
    pub fn past(&self) -> impl ExactSizeIterator<Item = &T> + DoubleEndedIterator {
        self.past.iter()
    }

    /// Nearest redo first.
    pub fn future(&self) -> impl ExactSizeIterator<Item = &T> + DoubleEndedIterator {
        self.future.iter()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Change the capacity. Shrinking evicts the oldest past entries now.
    pub fn set_max_history(&mut self, max_history: usize) {
        self.config.max_history = max_history;
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        while self.past.len() > self.config.max_history {
            self.past.pop_front();
        }
    }
}

impl<T: Clone> History<T> {
    /// Snapshot of all three slots.
    #[must_use]
    pub fn state(&self) -> HistoryState<T> {
        HistoryState {
            past: self.past.iter().cloned().collect(),
            present: self.present.clone(),
            future: self.future.iter().cloned().collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
