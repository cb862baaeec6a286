#![forbid(unsafe_code)]

//! Trailing-edge debounce for observable values and plain functions.
//!
//! Every change (or call) cancels the pending timer and re-arms it, so only
//! the last input of a quiet period ever lands. There is no leading edge.
//!
//! ```
//! use pdfdesk_runtime::reactive::Observable;
//! use pdfdesk_runtime::timing::{DebouncedValue, Delay, Scheduler};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::manual();
//! let query = Observable::new(String::from("inv"));
//! let debounced = DebouncedValue::new(&scheduler, &query, Delay::from_millis(300)).unwrap();
//!
//! query.set("invoice".into());
//! assert_eq!(debounced.get(), "inv");
//! scheduler.advance_by(Duration::from_millis(300)).unwrap();
//! assert_eq!(debounced.get(), "invoice");
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use pdfdesk_core::{CallbackOutput, Delay, TimingError};
use tracing::trace;

use super::scheduler::{Scheduler, TimerId};
use super::{BoxedTarget, boxed_target, invoke};
use crate::reactive::{Observable, Subscription};

/// The single pending timer of a debounced wrapper.
#[derive(Debug, Default)]
struct PendingSlot(Cell<Option<TimerId>>);

impl PendingSlot {
    /// Cancel the pending timer, if any. Returns whether one was pending.
    fn cancel(&self, scheduler: &Scheduler) -> bool {
        match self.0.take() {
            Some(id) => scheduler.cancel(id),
            None => false,
        }
    }

    fn arm(&self, id: TimerId) {
        self.0.set(Some(id));
    }

    /// Called by the timer as it fires. Arming always cancels the previous
    /// timer, so the firing timer is the armed one.
    fn fired(&self) {
        self.0.set(None);
    }

    fn is_armed(&self) -> bool {
        self.0.get().is_some()
    }
}

// ============================================================================
// DebouncedValue
// ============================================================================

/// A view of an [`Observable`] that settles on the source's latest value
/// once the source has been quiet for `delay`.
///
/// The view starts at the source's current value. Dropping it cancels the
/// pending update and detaches from the source.
pub struct DebouncedValue<T> {
    output: Observable<T>,
    scheduler: Scheduler,
    pending: Rc<PendingSlot>,
    delay: Delay,
    _source: Subscription,
}

impl<T: Clone + PartialEq + 'static> DebouncedValue<T> {
    /// Fails with [`TimingError::InvalidArgument`] for a negative or
    /// non-finite delay.
    pub fn new<D>(scheduler: &Scheduler, source: &Observable<T>, delay: D) -> Result<Self, TimingError>
    where
        D: TryInto<Delay>,
        TimingError: From<D::Error>,
    {
        let delay = delay.try_into()?;
        let output = Observable::new(source.get());
        let pending = Rc::new(PendingSlot::default());

        let subscription = {
            let scheduler = scheduler.clone();
            let output = output.clone();
            let pending = Rc::clone(&pending);
            source.subscribe(move |value: &T| {
                pending.cancel(&scheduler);
                let value = value.clone();
                let output = output.clone();
                let slot = Rc::clone(&pending);
                let timer = scheduler.schedule(delay, move || {
                    slot.fired();
                    output.set(value);
                });
                pending.arm(timer);
            })
        };

        Ok(Self {
            output,
            scheduler: scheduler.clone(),
            pending,
            delay,
            _source: subscription,
        })
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.output.get()
    }

    /// The settled value as an observable, for chaining or subscribing.
    #[must_use]
    pub fn observable(&self) -> &Observable<T> {
        &self.output
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_armed()
    }

    /// Discard the pending update. The view keeps its current value and
    /// keeps following the source.
    pub fn cancel(&self) -> bool {
        self.pending.cancel(&self.scheduler)
    }

    #[must_use]
    pub fn delay(&self) -> Delay {
        self.delay
    }
}

impl<T> Drop for DebouncedValue<T> {
    fn drop(&mut self) {
        self.pending.cancel(&self.scheduler);
    }
}

impl<T: fmt::Debug> fmt::Debug for DebouncedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedValue")
            .field("output", &self.output)
            .field("delay", &self.delay)
            .field("pending", &self.pending.is_armed())
            .finish()
    }
}

// ============================================================================
// DebouncedFn
// ============================================================================

/// A debounced wrapper around `FnMut(A)`.
///
/// Only the arguments of the most recent call in a quiet window reach the
/// wrapped function. An error it returns surfaces from the scheduler call
/// that fired it, as [`TimingError::Callback`].
pub struct DebouncedFn<A> {
    target: Rc<RefCell<BoxedTarget<A>>>,
    scheduler: Scheduler,
    pending: Rc<PendingSlot>,
    delay: Delay,
}

impl<A: 'static> DebouncedFn<A> {
    pub fn new<F, R, D>(scheduler: &Scheduler, f: F, delay: D) -> Result<Self, TimingError>
    where
        F: FnMut(A) -> R + 'static,
        R: CallbackOutput,
        D: TryInto<Delay>,
        TimingError: From<D::Error>,
    {
        Ok(Self {
            target: Rc::new(boxed_target(f)),
            scheduler: scheduler.clone(),
            pending: Rc::new(PendingSlot::default()),
            delay: delay.try_into()?,
        })
    }

    /// Replace any pending invocation with one for `args`, `delay` from now.
    pub fn call(&self, args: A) {
        if self.pending.cancel(&self.scheduler) {
            trace!(delay_ms = self.delay.as_millis_f64(), "debounce window restarted");
        }
        let target = Rc::clone(&self.target);
        let slot = Rc::clone(&self.pending);
        let timer = self.scheduler.schedule(self.delay, move || {
            slot.fired();
            invoke(&target, args)
        });
        self.pending.arm(timer);
    }

    /// Discard the pending invocation. Idempotent; the wrapper stays usable.
    pub fn cancel(&self) -> bool {
        self.pending.cancel(&self.scheduler)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_armed()
    }

    #[must_use]
    pub fn delay(&self) -> Delay {
        self.delay
    }
}

impl<A> Drop for DebouncedFn<A> {
    fn drop(&mut self) {
        self.pending.cancel(&self.scheduler);
    }
}

impl<A> fmt::Debug for DebouncedFn<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedFn")
            .field("delay", &self.delay)
            .field("pending", &self.pending.is_armed())
            .finish_non_exhaustive()
    }
}
