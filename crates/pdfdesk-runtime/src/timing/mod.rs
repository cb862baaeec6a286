#![forbid(unsafe_code)]

//! Timing control: debounced and throttled views over changing values and
//! callable functions.
//!
//! # Architecture
//!
//! ```text
//!  Observable<T> ──change──► DebouncedValue / ThrottledValue ──► Observable<T>
//!                                 │
//!  caller ──call(args)──► DebouncedFn / ThrottledFn ──► wrapped FnMut(A)
//!                                 │ arm / cancel
//!                                 ▼
//!                        Scheduler (cooperative timer queue, Clock)
//! ```
//!
//! Every wrapper keeps an explicit state struct (pending timer handle, last
//! accepted timestamp) and holds at most one pending timer. Cancellation is
//! synchronous: once `cancel()` returns, the cancelled invocation can no
//! longer fire. Dropping a wrapper cancels its pending timer.
//!
//! # Throttle policies
//!
//! | Policy                            | In-window input                   |
//! |-----------------------------------|-----------------------------------|
//! | [`ThrottlePolicy::DropLate`]      | discarded                         |
//! | [`ThrottlePolicy::DeferTrailing`] | latest kept, fired at window end  |
//!
//! [`ThrottledValue`] defaults to `DropLate`, [`ThrottledFn`] to
//! `DeferTrailing`.

pub mod debounce;
pub mod scheduler;
pub mod throttle;

use std::cell::RefCell;

pub use debounce::{DebouncedFn, DebouncedValue};
pub use pdfdesk_core::{CallbackError, CallbackOutput, Delay, ThrottlePolicy, TimingError};
pub use scheduler::{Scheduler, TimerId, WeakScheduler};
pub use throttle::{Invocation, ThrottledFn, ThrottledValue};

/// A wrapped function with its return type normalised.
pub(crate) type BoxedTarget<A> = Box<dyn FnMut(A) -> Result<(), CallbackError>>;

pub(crate) fn boxed_target<A, R, F>(mut f: F) -> RefCell<BoxedTarget<A>>
where
    F: FnMut(A) -> R + 'static,
    R: CallbackOutput,
{
    RefCell::new(Box::new(move |args| f(args).into_result()))
}

/// Whether the wrapped function is on the stack right now.
pub(crate) fn is_running<A>(target: &RefCell<BoxedTarget<A>>) -> bool {
    target.try_borrow_mut().is_err()
}

/// Run the wrapped function. A call that would re-enter it is refused with
/// an error instead of running nested.
pub(crate) fn invoke<A>(target: &RefCell<BoxedTarget<A>>, args: A) -> Result<(), CallbackError> {
    let mut target = target
        .try_borrow_mut()
        .map_err(|_| CallbackError::from("wrapped function is already running"))?;
    (*target)(args)
}
