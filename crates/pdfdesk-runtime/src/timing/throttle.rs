#![forbid(unsafe_code)]

//! Leading-edge throttle for observable values and plain functions.
//!
//! Input that arrives with no open window is delivered at once and opens a
//! window of `delay`. Building a [`ThrottledValue`] counts as its first
//! delivery (the view takes the source's current value) and opens the first
//! window; a [`ThrottledFn`] starts with no window, so its first call always
//! goes straight through. What happens to input inside an open window depends
//! on the [`ThrottlePolicy`]:
//!
//! ```text
//!   delay = 300        t=0     t=150          t=300          t=350
//!   DropLate           fire    drop           .              fire
//!   DeferTrailing      fire    defer ───────► fire (trailing) defer ─► t=600
//! ```
//!
//! A delivery on the leading edge supersedes any deferred trailing input.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use pdfdesk_core::{CallbackError, CallbackOutput, Clock, Delay, ThrottlePolicy, TimingError};
use tracing::{debug, trace};

use super::scheduler::{Scheduler, TimerId};
use super::{BoxedTarget, boxed_target, invoke, is_running};
use crate::reactive::{Observable, Subscription};

/// What a throttled wrapper did with one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Delivered synchronously on the leading edge.
    Immediate,
    /// Held back; it fires when the current window closes unless newer
    /// input replaces it.
    Deferred,
    /// Discarded under [`ThrottlePolicy::DropLate`].
    Dropped,
}

#[derive(Debug, Default)]
struct ThrottleState {
    /// When the open window started.
    last_fire: Option<Duration>,
    trailing: Option<TimerId>,
}

enum Decision {
    Fire,
    Drop,
    Defer { remaining: Duration },
}

/// Window bookkeeping shared by both wrappers.
struct ThrottleCore {
    scheduler: Scheduler,
    clock: Clock,
    delay: Delay,
    policy: ThrottlePolicy,
    state: Rc<RefCell<ThrottleState>>,
}

impl ThrottleCore {
    fn new(scheduler: &Scheduler, delay: Delay, policy: ThrottlePolicy) -> Self {
        Self {
            scheduler: scheduler.clone(),
            clock: scheduler.clock(),
            delay,
            policy,
            state: Rc::new(RefCell::new(ThrottleState::default())),
        }
    }

    /// Start a window now, as if an input had just been delivered.
    fn open_window(&self) {
        self.state.borrow_mut().last_fire = Some(self.clock.now());
    }

    /// Classify an input arriving now. A `Fire` decision has already opened
    /// the new window and cancelled any trailing timer.
    fn decide(&self) -> Decision {
        let now = self.clock.now();
        let window = self.delay.as_duration();
        let mut state = self.state.borrow_mut();
        let elapsed = state.last_fire.map(|at| now.saturating_sub(at));
        match elapsed {
            Some(elapsed) if elapsed < window => match self.policy {
                ThrottlePolicy::DropLate => Decision::Drop,
                ThrottlePolicy::DeferTrailing => Decision::Defer {
                    remaining: window - elapsed,
                },
            },
            _ => {
                state.last_fire = Some(now);
                if let Some(id) = state.trailing.take() {
                    self.scheduler.cancel(id);
                    trace!(timer = id.raw(), "trailing input superseded");
                }
                Decision::Fire
            }
        }
    }

    /// Arm (or re-arm) the trailing timer with the latest input.
    fn defer<F>(&self, remaining: Duration, deliver: F)
    where
        F: FnOnce() -> Result<(), CallbackError> + 'static,
    {
        let previous = self.state.borrow_mut().trailing.take();
        if let Some(id) = previous {
            self.scheduler.cancel(id);
        }
        let state = Rc::clone(&self.state);
        let clock = self.clock.clone();
        let id = self.scheduler.schedule(remaining, move || {
            {
                let mut state = state.borrow_mut();
                state.trailing = None;
                state.last_fire = Some(clock.now());
            }
            deliver()
        });
        self.state.borrow_mut().trailing = Some(id);
    }

    fn cancel(&self) -> bool {
        let trailing = self.state.borrow_mut().trailing.take();
        match trailing {
            Some(id) => {
                debug!(timer = id.raw(), "throttle trailing call cancelled");
                self.scheduler.cancel(id)
            }
            None => false,
        }
    }

    fn is_pending(&self) -> bool {
        self.state.borrow().trailing.is_some()
    }
}

impl fmt::Debug for ThrottleCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ThrottleCore")
            .field("delay", &self.delay)
            .field("policy", &self.policy)
            .field("last_fire", &state.last_fire)
            .field("trailing", &state.trailing)
            .finish()
    }
}

impl Drop for ThrottleCore {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// ThrottledValue
// ============================================================================

/// A view of an [`Observable`] updated at most once per `delay` window.
///
/// The view starts at the source's current value, and that initial
/// mirroring opens the first window: a change inside `delay` of construction
/// is throttled like any other.
pub struct ThrottledValue<T> {
    output: Observable<T>,
    core: Rc<ThrottleCore>,
    _source: Subscription,
}

impl<T: Clone + PartialEq + 'static> ThrottledValue<T> {
    /// A throttled view using [`ThrottlePolicy::DropLate`].
    pub fn new<D>(scheduler: &Scheduler, source: &Observable<T>, delay: D) -> Result<Self, TimingError>
    where
        D: TryInto<Delay>,
        TimingError: From<D::Error>,
    {
        Self::with_policy(scheduler, source, delay, ThrottlePolicy::DropLate)
    }

    pub fn with_policy<D>(
        scheduler: &Scheduler,
        source: &Observable<T>,
        delay: D,
        policy: ThrottlePolicy,
    ) -> Result<Self, TimingError>
    where
        D: TryInto<Delay>,
        TimingError: From<D::Error>,
    {
        let core = Rc::new(ThrottleCore::new(scheduler, delay.try_into()?, policy));
        let output = Observable::new(source.get());
        core.open_window();

        let subscription = {
            let core = Rc::downgrade(&core);
            let output = output.clone();
            source.subscribe(move |value: &T| {
                let Some(core) = core.upgrade() else {
                    return;
                };
                match core.decide() {
                    Decision::Fire => output.set(value.clone()),
                    Decision::Drop => trace!("throttled value change dropped"),
                    Decision::Defer { remaining } => {
                        let output = output.clone();
                        let value = value.clone();
                        core.defer(remaining, move || {
                            output.set(value);
                            Ok(())
                        });
                    }
                }
            })
        };

        Ok(Self {
            output,
            core,
            _source: subscription,
        })
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.output.get()
    }

    #[must_use]
    pub fn observable(&self) -> &Observable<T> {
        &self.output
    }

    #[must_use]
    pub fn policy(&self) -> ThrottlePolicy {
        self.core.policy
    }

    /// Whether a deferred change is waiting for the window to close.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.core.is_pending()
    }

    /// Discard the deferred change, if any.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }
}

impl<T: fmt::Debug> fmt::Debug for ThrottledValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledValue")
            .field("output", &self.output)
            .field("core", &self.core)
            .finish()
    }
}

// ============================================================================
// ThrottledFn
// ============================================================================

/// A throttled wrapper around `FnMut(A)`.
///
/// Leading-edge calls run synchronously and return the wrapped function's
/// error directly. A deferred trailing call runs on a scheduler tick, and its
/// error surfaces from that tick as [`TimingError::Callback`].
pub struct ThrottledFn<A> {
    target: Rc<RefCell<BoxedTarget<A>>>,
    core: ThrottleCore,
}

impl<A: 'static> ThrottledFn<A> {
    /// A throttled function using [`ThrottlePolicy::DeferTrailing`].
    pub fn new<F, R, D>(scheduler: &Scheduler, f: F, delay: D) -> Result<Self, TimingError>
    where
        F: FnMut(A) -> R + 'static,
        R: CallbackOutput,
        D: TryInto<Delay>,
        TimingError: From<D::Error>,
    {
        Self::with_policy(scheduler, f, delay, ThrottlePolicy::DeferTrailing)
    }

    pub fn with_policy<F, R, D>(
        scheduler: &Scheduler,
        f: F,
        delay: D,
        policy: ThrottlePolicy,
    ) -> Result<Self, TimingError>
    where
        F: FnMut(A) -> R + 'static,
        R: CallbackOutput,
        D: TryInto<Delay>,
        TimingError: From<D::Error>,
    {
        Ok(Self {
            core: ThrottleCore::new(scheduler, delay.try_into()?, policy),
            target: Rc::new(boxed_target(f)),
        })
    }

    /// Call the wrapped function, subject to the throttle window.
    ///
    /// A call made from inside the wrapped function itself cannot run nested;
    /// when it would fire it is deferred to the next scheduler tick instead.
    pub fn call(&self, args: A) -> Result<Invocation, CallbackError> {
        match self.core.decide() {
            Decision::Fire if is_running(&self.target) => {
                trace!("re-entrant throttled call deferred");
                let target = Rc::clone(&self.target);
                self.core.defer(Duration::ZERO, move || invoke(&target, args));
                Ok(Invocation::Deferred)
            }
            Decision::Fire => {
                invoke(&self.target, args)?;
                Ok(Invocation::Immediate)
            }
            Decision::Drop => Ok(Invocation::Dropped),
            Decision::Defer { remaining } => {
                let target = Rc::clone(&self.target);
                self.core.defer(remaining, move || invoke(&target, args));
                Ok(Invocation::Deferred)
            }
        }
    }

    /// Clear the trailing call, if any. Idempotent.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.core.is_pending()
    }

    #[must_use]
    pub fn policy(&self) -> ThrottlePolicy {
        self.core.policy
    }
}

impl<A> fmt::Debug for ThrottledFn<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledFn")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}
