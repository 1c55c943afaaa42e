#![forbid(unsafe_code)]

//! Runtime: the reactive path-observation engine.
//!
//! Notifications are delivered through [`pathwire_core::Scheduler`]; see
//! [`reactive`] for the object model, observation and disposal.

pub mod reactive;

pub use reactive::{
    DisposableMetadata, Obj, ObserveError, ObserveOptions, Path, PathObserver, Subscription,
    Value, compute, notify_all, observe, observe_strict,
};
