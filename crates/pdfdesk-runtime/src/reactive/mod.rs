#![forbid(unsafe_code)]

//! Reactive values.
//!
//! [`Observable`] is the explicit publish/subscribe primitive the timing
//! wrappers consume and produce: a shared value with `get`, `set`, and
//! `subscribe`, where dropping the returned [`Subscription`] unsubscribes.

pub mod observable;

pub use observable::{Observable, Subscription};
