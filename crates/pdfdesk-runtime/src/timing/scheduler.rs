#![forbid(unsafe_code)]

//! Cooperative timer queue.
//!
//! [`Scheduler`] is the "run this callback after N milliseconds" / "cancel a
//! previously scheduled callback" primitive. It never spawns threads and
//! never fires anything on its own: timers fire only when the owner drives
//! the queue with [`run_due`](Scheduler::run_due),
//! [`advance_by`](Scheduler::advance_by), or
//! [`run_until_idle`](Scheduler::run_until_idle).
//!
//! # Invariants
//!
//! 1. Timers fire in `(deadline, arm order)` order.
//! 2. [`cancel`](Scheduler::cancel) is synchronous and idempotent; a cancelled
//!    timer never fires.
//! 3. No borrow of the queue is held while a callback runs, so callbacks may
//!    schedule or cancel freely.
//! 4. A failing callback does not stop the other due timers; the first error
//!    is returned once the batch has run.
//! 5. A tick only fires timers armed before it started. A zero-delay timer
//!    armed by a callback waits for the next tick, so a callback that keeps
//!    re-arming itself cannot stall a single drive call.
//!
//! # Example
//!
//! ```
//! use pdfdesk_runtime::timing::{Delay, Scheduler};
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::manual();
//! let fired = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&fired);
//! scheduler.schedule(Delay::from_millis(300), move || flag.set(true));
//!
//! scheduler.advance_by(Duration::from_millis(299)).unwrap();
//! assert!(!fired.get());
//! scheduler.advance_by(Duration::from_millis(1)).unwrap();
//! assert!(fired.get());
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use pdfdesk_core::{CallbackError, CallbackOutput, Clock, Delay, TimingError};
use tracing::{debug, warn};

type TimerCallback = Box<dyn FnOnce() -> Result<(), CallbackError>>;

/// Handle to a scheduled timer.
///
/// Ids are allocated in arm order and never reused by the same scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct SchedulerInner {
    clock: Clock,
    next_id: u64,
    /// Keyed by deadline, then id, which gives FIFO order among equal deadlines.
    queue: BTreeMap<(Duration, TimerId), TimerCallback>,
    deadlines: HashMap<TimerId, Duration>,
}

/// A single-threaded cooperative timer queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

/// Non-owning handle, for callbacks that need to re-arm without keeping the
/// scheduler alive.
#[derive(Clone)]
pub struct WeakScheduler {
    inner: Weak<RefCell<SchedulerInner>>,
}

impl WeakScheduler {
    #[must_use]
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.inner.upgrade().map(|inner| Scheduler { inner })
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &inner.clock.now())
            .field("manual", &inner.clock.is_manual())
            .field("pending", &inner.queue.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::monotonic()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                clock,
                next_id: 0,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
            })),
        }
    }

    /// A scheduler on virtual time starting at zero.
    #[must_use]
    pub fn manual() -> Self {
        Self::new(Clock::manual())
    }

    /// A scheduler on the platform monotonic clock.
    #[must_use]
    pub fn monotonic() -> Self {
        Self::new(Clock::monotonic())
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The clock driving this scheduler (shares state with it).
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.inner.borrow().clock.clone()
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.borrow().clock.now()
    }

    // ====================================================================
    // Arming
    // ====================================================================

    /// Run `callback` once `delay` has elapsed.
    pub fn schedule<F, R>(&self, delay: impl Into<Delay>, callback: F) -> TimerId
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutput,
    {
        let delay = delay.into();
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        let deadline = inner.clock.now().saturating_add(delay.as_duration());
        inner
            .queue
            .insert((deadline, id), Box::new(move || callback().into_result()));
        inner.deadlines.insert(id, deadline);
        debug!(
            timer = id.0,
            delay_ms = delay.as_millis_f64(),
            deadline_us = deadline.as_micros() as u64,
            "timer armed"
        );
        id
    }

    /// Cancel a pending timer. Returns `false` if it already fired or was
    /// already cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(deadline) = inner.deadlines.remove(&id) else {
            return false;
        };
        inner.queue.remove(&(deadline, id));
        debug!(timer = id.0, "timer cancelled");
        true
    }

    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.borrow().deadlines.contains_key(&id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Deadline of the earliest pending timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner
            .borrow()
            .queue
            .keys()
            .next()
            .map(|(deadline, _)| *deadline)
    }

    // ====================================================================
    // Driving
    // ====================================================================

    /// Fire every timer whose deadline is at or before the current time.
    ///
    /// This is one tick. Returns the number of callbacks run, or the first
    /// callback error.
    pub fn run_due(&self) -> Result<usize, TimingError> {
        let mut first_error = None;
        let fired = self.tick(self.now(), &mut first_error);
        finish(fired, first_error)
    }

    /// Advance a manual clock by `by`, firing timers at their exact
    /// deadlines along the way (including timers armed by those callbacks).
    ///
    /// Each distinct instant gets one tick. Zero-delay timers armed during a
    /// tick fire at the next instant the clock stops at; at the final instant
    /// they stay pending for the next drive call.
    pub fn advance_by(&self, by: Duration) -> Result<usize, TimingError> {
        let clock = self.clock();
        let Some(manual) = clock.as_manual() else {
            return Err(TimingError::ManualClockRequired);
        };
        let target = manual.now().saturating_add(by);
        let mut first_error = None;
        let mut fired = 0;
        let mut last_tick: Option<Duration> = None;
        while let Some(next) = self.next_deadline() {
            let mut at = next.max(manual.now());
            if last_tick == Some(at) {
                // Only timers armed by the previous tick are left at `at`.
                at = self
                    .next_deadline_after(at)
                    .filter(|d| *d <= target)
                    .unwrap_or(target);
                if last_tick == Some(at) {
                    break;
                }
            }
            if at > target {
                break;
            }
            manual.set(at);
            fired += self.tick(at, &mut first_error);
            last_tick = Some(at);
        }
        manual.set(target);
        finish(fired, first_error)
    }

    /// Fire timers until the queue is empty.
    ///
    /// A monotonic clock is waited on with `std::thread::sleep`; a manual
    /// clock jumps straight to each deadline. A callback that keeps
    /// re-arming itself keeps this loop alive.
    pub fn run_until_idle(&self) -> Result<usize, TimingError> {
        let clock = self.clock();
        let mut first_error = None;
        let mut fired = 0;
        while let Some(deadline) = self.next_deadline() {
            let now = clock.now();
            if deadline > now {
                match clock.as_manual() {
                    Some(manual) => {
                        manual.set(deadline);
                    }
                    None => std::thread::sleep(deadline - now),
                }
            }
            fired += self.tick(clock.now(), &mut first_error);
        }
        finish(fired, first_error)
    }

    /// Earliest deadline strictly later than `at`.
    fn next_deadline_after(&self, at: Duration) -> Option<Duration> {
        let from = (at.saturating_add(Duration::from_nanos(1)), TimerId(0));
        self.inner
            .borrow()
            .queue
            .range(from..)
            .next()
            .map(|((deadline, _), _)| *deadline)
    }

    /// Pop the earliest timer due at `now` that was armed before `fence`.
    fn pop_due(&self, now: Duration, fence: u64) -> Option<(TimerId, TimerCallback)> {
        let mut inner = self.inner.borrow_mut();
        let key = inner
            .queue
            .keys()
            .take_while(|(deadline, _)| *deadline <= now)
            .find(|(_, id)| id.0 < fence)
            .copied()?;
        let callback = inner.queue.remove(&key)?;
        inner.deadlines.remove(&key.1);
        Some((key.1, callback))
    }

    fn tick(&self, now: Duration, first_error: &mut Option<CallbackError>) -> usize {
        let fence = self.inner.borrow().next_id;
        let mut fired = 0;
        while let Some((id, callback)) = self.pop_due(now, fence) {
            fired += 1;
            debug!(timer = id.0, now_us = now.as_micros() as u64, "timer fired");
            if let Err(err) = callback() {
                warn!(timer = id.0, error = %err, "timer callback failed");
                if first_error.is_none() {
                    *first_error = Some(err);
                }
            }
        }
        fired
    }
}

fn finish(fired: usize, first_error: Option<CallbackError>) -> Result<usize, TimingError> {
    match first_error {
        Some(err) => Err(TimingError::Callback(err)),
        None => Ok(fired),
    }
}
