// SPDX-License-Identifier: Apache-2.0
//! Retry policies and scheduler-driven retry loops.
//!
//! [`RetryPolicy`] describes how many attempts to make and how long to wait
//! between them. [`retry`] runs an operation under a policy on the
//! cooperative [`Scheduler`]: the first attempt runs synchronously, later
//! attempts run from timer callbacks, and the outcome is reported once to a
//! completion callback.
//!
//! # Determinism
//!
//! Backoff delays use fixed formulas (no jitter) so tests driven by a manual
//! clock see exact timing sequences.
//!
//! # Example
//!
//! ```
//! use pdfdesk_runtime::retry::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(4, BackoffStrategy::Exponential {
//!     base_ms: 100,
//!     max_ms: 5000,
//! });
//!
//! assert_eq!(policy.delay(0), Duration::from_millis(100));
//! assert_eq!(policy.delay(1), Duration::from_millis(200));
//! assert_eq!(policy.delay(2), Duration::from_millis(400));
//! ```

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use pdfdesk_core::{Delay, RetrySettings, TimingError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use web_time::Duration;

use crate::timing::{Scheduler, TimerId, WeakScheduler};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackoffStrategy {
    /// Fixed delay between attempts.
    Fixed { delay_ms: u64 },
    /// `base_ms * 2^retry`, capped at `max_ms`.
    Exponential { base_ms: u64, max_ms: u64 },
    /// `base_ms * (retry + 1)`, capped at `max_ms`.
    Linear { base_ms: u64, max_ms: u64 },
}

/// A retry policy with a bounded number of attempts and a backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart.
    fn default() -> Self {
        Self::new(3, BackoffStrategy::Fixed { delay_ms: 1000 })
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Try exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, BackoffStrategy::Fixed { delay_ms: 0 })
    }

    /// A fixed-delay policy from configuration. Fractional milliseconds are
    /// truncated.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, TimingError> {
        let delay = Delay::try_from(settings.delay_ms)?;
        let delay_ms = u64::try_from(delay.as_duration().as_millis()).unwrap_or(u64::MAX);
        Ok(Self::new(
            settings.max_attempts,
            BackoffStrategy::Fixed { delay_ms },
        ))
    }

    /// Delay before the given retry (0-indexed: `delay(0)` precedes the
    /// second attempt).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        match &self.backoff {
            BackoffStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffStrategy::Exponential { base_ms, max_ms } => {
                let multiplier = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
                let delay = base_ms.saturating_mul(multiplier);
                Duration::from_millis(delay.min(*max_ms))
            }
            BackoffStrategy::Linear { base_ms, max_ms } => {
                let delay = base_ms.saturating_mul(u64::from(retry) + 1);
                Duration::from_millis(delay.min(*max_ms))
            }
        }
    }

    /// Sum of every inter-attempt delay.
    #[must_use]
    pub fn total_max_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.delay(retry))
            .sum()
    }

    fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a retry loop ended without a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("retry cancelled")]
    Cancelled,
}

type Operation<T, E> = Box<dyn FnMut(u32) -> Result<T, E>>;
type Completion<T, E> = Box<dyn FnOnce(Result<T, RetryError<E>>)>;

struct RetryTask<T, E> {
    policy: RetryPolicy,
    /// Taken out while an attempt runs.
    operation: Option<Operation<T, E>>,
    on_complete: Option<Completion<T, E>>,
    attempts: u32,
    timer: Option<TimerId>,
    finished: bool,
}

impl<T, E> RetryTask<T, E> {
    /// Mark finished and hand back the completion callback, if it has not
    /// been taken yet.
    fn finish(&mut self) -> Option<Completion<T, E>> {
        self.finished = true;
        self.operation = None;
        self.on_complete.take()
    }
}

trait RetryControl {
    fn cancel(&self, scheduler: Option<Scheduler>) -> bool;
    fn attempts(&self) -> u32;
    fn is_finished(&self) -> bool;
}

impl<T, E> RetryControl for RefCell<RetryTask<T, E>> {
    fn cancel(&self, scheduler: Option<Scheduler>) -> bool {
        let (timer, completion) = {
            let mut task = self.borrow_mut();
            if task.finished {
                return false;
            }
            let timer = task.timer.take();
            (timer, task.finish())
        };
        if let (Some(id), Some(scheduler)) = (timer, scheduler) {
            scheduler.cancel(id);
        }
        debug!(attempts = self.borrow().attempts, "retry cancelled");
        if let Some(completion) = completion {
            completion(Err(RetryError::Cancelled));
        }
        true
    }

    fn attempts(&self) -> u32 {
        self.borrow().attempts
    }

    fn is_finished(&self) -> bool {
        self.borrow().finished
    }
}

/// Handle to a running [`retry`] loop.
///
/// Dropping the handle does not stop the loop.
#[derive(Clone)]
pub struct RetryHandle {
    scheduler: WeakScheduler,
    task: Rc<dyn RetryControl>,
}

impl RetryHandle {
    /// Stop further attempts. The completion callback receives
    /// [`RetryError::Cancelled`]. Returns `false` if the loop already ended.
    pub fn cancel(&self) -> bool {
        self.task.cancel(self.scheduler.upgrade())
    }

    /// Attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.task.attempts()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandle")
            .field("attempts", &self.attempts())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Run `operation` until it succeeds or the policy's attempts run out.
///
/// `operation` receives the 1-based attempt number. `on_complete` is called
/// exactly once, with the first success, the last error, or
/// [`RetryError::Cancelled`]. A retry that cannot be armed because the
/// scheduler is gone also reports `Cancelled`; a retry already pending on a
/// scheduler that is then dropped is discarded with the scheduler.
pub fn retry<T, E, F, C>(
    scheduler: &Scheduler,
    policy: RetryPolicy,
    operation: F,
    on_complete: C,
) -> RetryHandle
where
    T: 'static,
    E: fmt::Display + 'static,
    F: FnMut(u32) -> Result<T, E> + 'static,
    C: FnOnce(Result<T, RetryError<E>>) + 'static,
{
    let task = Rc::new(RefCell::new(RetryTask {
        policy,
        operation: Some(Box::new(operation)),
        on_complete: Some(Box::new(on_complete)),
        attempts: 0,
        timer: None,
        finished: false,
    }));
    let weak = scheduler.downgrade();
    run_attempt(&task, &weak);
    RetryHandle {
        scheduler: weak,
        task,
    }
}

fn run_attempt<T, E>(task: &Rc<RefCell<RetryTask<T, E>>>, scheduler: &WeakScheduler)
where
    T: 'static,
    E: fmt::Display + 'static,
{
    let (mut operation, attempt) = {
        let mut state = task.borrow_mut();
        if state.finished {
            return;
        }
        let Some(operation) = state.operation.take() else {
            return;
        };
        state.timer = None;
        state.attempts += 1;
        (operation, state.attempts)
    };

    let result = operation(attempt);

    let completion = {
        let mut state = task.borrow_mut();
        if state.finished {
            // Cancelled from inside the operation.
            return;
        }
        state.operation = Some(operation);
        match result {
            Ok(value) => {
                debug!(attempt, "retry succeeded");
                state.finish().map(|done| (done, Ok(value)))
            }
            Err(err) if attempt < state.policy.attempt_budget() => {
                let delay = state.policy.delay(attempt - 1);
                match scheduler.upgrade() {
                    Some(live) => {
                        warn!(
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "attempt failed; retrying"
                        );
                        let next = Rc::clone(task);
                        let weak = scheduler.clone();
                        state.timer =
                            Some(live.schedule(delay, move || run_attempt(&next, &weak)));
                        None
                    }
                    None => {
                        warn!(attempt, error = %err, "scheduler gone; abandoning retry");
                        state
                            .finish()
                            .map(|done| (done, Err(RetryError::Cancelled)))
                    }
                }
            }
            Err(err) => {
                warn!(attempt, error = %err, "retry attempts exhausted");
                state.finish().map(|done| {
                    (
                        done,
                        Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: err,
                        }),
                    )
                })
            }
        }
    };

    if let Some((done, outcome)) = completion {
        done(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    type Outcome = Rc<RefCell<Option<Result<&'static str, RetryError<String>>>>>;

    fn outcome() -> (Outcome, impl FnOnce(Result<&'static str, RetryError<String>>) + 'static) {
        let slot: Outcome = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        (slot, move |result| *sink.borrow_mut() = Some(result))
    }

    fn fixed(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy::new(max_attempts, BackoffStrategy::Fixed { delay_ms })
    }

    #[test]
    fn fixed_backoff_constant_delay() {
        let policy = fixed(3, 100);
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_caps_at_max() {
        let policy = RetryPolicy::new(
            5,
            BackoffStrategy::Exponential {
                base_ms: 1000,
                max_ms: 3000,
            },
        );
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(2), Duration::from_millis(3000));
        assert_eq!(policy.delay(63), Duration::from_millis(3000));
        assert_eq!(policy.delay(64), Duration::from_millis(3000));
    }

    #[test]
    fn linear_backoff_increments() {
        let policy = RetryPolicy::new(
            4,
            BackoffStrategy::Linear {
                base_ms: 200,
                max_ms: 500,
            },
        );
        assert_eq!(policy.delay(0), Duration::from_millis(200));
        assert_eq!(policy.delay(1), Duration::from_millis(400));
        assert_eq!(policy.delay(2), Duration::from_millis(500));
    }

    #[test]
    fn default_policy_is_three_attempts_one_second_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.total_max_delay(), Duration::from_secs(2));
        assert_eq!(RetryPolicy::no_retry().total_max_delay(), Duration::ZERO);
    }

    #[test]
    fn policy_from_settings() {
        let settings = RetrySettings {
            max_attempts: 5,
            delay_ms: 250.0,
        };
        assert_eq!(RetryPolicy::from_settings(&settings).unwrap(), fixed(5, 250));

        let bad = RetrySettings {
            max_attempts: 5,
            delay_ms: -1.0,
        };
        assert!(RetryPolicy::from_settings(&bad).is_err());
    }

    #[test]
    fn policy_serializes_with_tagged_backoff() {
        let json = serde_json::to_string(&fixed(2, 50)).unwrap();
        assert_eq!(json, r#"{"max_attempts":2,"backoff":{"kind":"fixed","delay_ms":50}}"#);
    }

    #[test]
    fn first_attempt_runs_synchronously() {
        let scheduler = Scheduler::manual();
        let (result, done) = outcome();
        let handle = retry(&scheduler, fixed(3, 1000), |_| Ok::<_, String>("ok"), done);

        assert_eq!(*result.borrow(), Some(Ok("ok")));
        assert!(handle.is_finished());
        assert_eq!(handle.attempts(), 1);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn succeeds_on_third_attempt_after_delays() {
        let scheduler = Scheduler::manual();
        let (result, done) = outcome();
        let handle = retry(
            &scheduler,
            fixed(3, 1000),
            |attempt| {
                if attempt < 3 {
                    Err(format!("attempt {attempt} timed out"))
                } else {
                    Ok("merged.pdf")
                }
            },
            done,
        );

        assert_eq!(handle.attempts(), 1);
        scheduler.advance_by(Duration::from_millis(999)).unwrap();
        assert_eq!(handle.attempts(), 1);
        scheduler.advance_by(Duration::from_millis(1)).unwrap();
        assert_eq!(handle.attempts(), 2);
        scheduler.advance_by(Duration::from_millis(1000)).unwrap();
        assert_eq!(handle.attempts(), 3);
        assert_eq!(*result.borrow(), Some(Ok("merged.pdf")));
    }

    #[test]
    fn exhaustion_reports_last_error() {
        let scheduler = Scheduler::manual();
        let (result, done) = outcome();
        retry(
            &scheduler,
            fixed(3, 10),
            |attempt| Err::<&'static str, _>(format!("failure {attempt}")),
            done,
        );
        scheduler.run_until_idle().unwrap();

        assert_eq!(
            *result.borrow(),
            Some(Err(RetryError::Exhausted {
                attempts: 3,
                last: "failure 3".into()
            }))
        );
        assert_eq!(scheduler.now(), Duration::from_millis(20));
    }

    #[test]
    fn cancel_between_attempts() {
        let scheduler = Scheduler::manual();
        let (result, done) = outcome();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let handle = retry(
            &scheduler,
            fixed(5, 100),
            move |_| {
                c.set(c.get() + 1);
                Err::<&'static str, _>("busy".to_string())
            },
            done,
        );

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(scheduler.pending_count(), 0);
        scheduler.advance_by(Duration::from_secs(10)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(*result.borrow(), Some(Err(RetryError::Cancelled)));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let scheduler = Scheduler::manual();
        let (result, done) = outcome();
        retry(
            &scheduler,
            fixed(0, 10),
            |_| Err::<&'static str, _>("nope".to_string()),
            done,
        );
        assert!(matches!(
            *result.borrow(),
            Some(Err(RetryError::Exhausted { attempts: 1, .. }))
        ));
    }

    #[test]
    fn error_display() {
        let err: RetryError<String> = RetryError::Exhausted {
            attempts: 3,
            last: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 3 attempt(s): connection refused"
        );
    }
}
