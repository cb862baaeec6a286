#![forbid(unsafe_code)]

//! Run-at-most-once function wrapper.
//!
//! [`Once`] runs the wrapped function on the first call and hands back that
//! first result on every later call. Arguments to later calls are ignored.
//!
//! ```
//! use pdfdesk_runtime::Once;
//!
//! let init = Once::new(|path: String| path.len());
//! assert_eq!(init.call("/docs/a.pdf".into()), Some(&11));
//! assert_eq!(init.call("/other.pdf".into()), Some(&11));
//! ```

use std::cell::{OnceCell, RefCell};
use std::fmt;

use tracing::trace;

type OnceTarget<A, R> = Box<dyn FnOnce(A) -> R>;

pub struct Once<A, R> {
    target: RefCell<Option<OnceTarget<A, R>>>,
    result: OnceCell<R>,
}

impl<A, R> Once<A, R> {
    pub fn new(f: impl FnOnce(A) -> R + 'static) -> Self {
        Self {
            target: RefCell::new(Some(Box::new(f))),
            result: OnceCell::new(),
        }
    }

    /// Run the function if it has not run yet, and return its result.
    ///
    /// Returns `None` only for a call made from inside the function while
    /// that first run is still in progress.
    pub fn call(&self, args: A) -> Option<&R> {
        if let Some(result) = self.result.get() {
            trace!("once: returning first result");
            return Some(result);
        }
        let target = self.target.borrow_mut().take()?;
        let result = target(args);
        Some(self.result.get_or_init(|| result))
    }

    /// The first result, if the function has run.
    #[must_use]
    pub fn get(&self) -> Option<&R> {
        self.result.get()
    }

    #[must_use]
    pub fn has_run(&self) -> bool {
        self.result.get().is_some()
    }
}

impl<A, R: fmt::Debug> fmt::Debug for Once<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Once")
            .field("result", &self.result.get())
            .finish_non_exhaustive()
    }
}
