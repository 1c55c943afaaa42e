#![forbid(unsafe_code)]

//! Pathwire public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use pathwire_core as core;
#[cfg(feature = "runtime")]
pub use pathwire_runtime as runtime;

#[cfg(feature = "runtime")]
pub use pathwire_runtime::{arr, obj};

/// Common imports for working with pathwire.
///
/// The prelude brings [`Disposable`](pathwire_runtime::reactive::Disposable)
/// into scope; `observer.dispose()` on an `Rc<PathObserver>` then goes
/// through the trait and performs the same teardown as
/// `PathObserver::dispose`.
pub mod prelude {
    pub use pathwire_core::{CancelToken, Priority, Scheduler, SchedulerConfig};

    #[cfg(feature = "runtime")]
    pub use pathwire_runtime::reactive::{
        Disposable, DisposableMetadata, IntoPath, Obj, ObserveError, ObserveOptions, Path,
        PathObserver, Subscription, Value, compute, declare_computed, notify_all, observe,
        observe_strict, observe_with,
    };
    #[cfg(feature = "runtime")]
    pub use pathwire_runtime::{arr, obj};
}

#[cfg(all(test, feature = "runtime"))]
mod tests {
    use super::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn prelude_dispose_tears_down_observer() {
        let root = obj! { "value" => 1 };
        let observer = observe(&root, "value").expect("observable");
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));

        observer.dispose();
        assert!(observer.is_disposed());

        root.set("value", 2);
        Scheduler::current().drain().expect("drain succeeds");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn prelude_root_disposal_runs() {
        let root = obj! { "a" => obj! { "b" => 1 } };
        let observer = observe(&root, "a.b").expect("observable");
        DisposableMetadata::of(&root).dispose();
        assert!(observer.is_disposed());
        assert_eq!(
            pathwire_runtime::reactive::metadata_of(&root).subject_count("a"),
            0
        );
    }
}
