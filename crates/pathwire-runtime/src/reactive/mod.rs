#![forbid(unsafe_code)]

//! Reactive path observation over live, mutable object graphs.
//!
//! This module lets arbitrary code say "tell me when `root.a.b.c` changes"
//! without building the graph out of special cells and without polling:
//!
//! - [`Obj`] / [`Value`]: the dynamic object model being observed.
//! - [`observe`]: returns the shared [`PathObserver`] for a `(root, path)`
//!   pair, installing interceptors along the chain.
//! - [`Subscription`]: RAII guard that removes its listener on drop.
//! - [`compute`]: turns "any dependency path changed" into "this key
//!   changed".
//! - [`DisposableMetadata`]: one-call teardown of everything set up for a
//!   root object.
//!
//! # Architecture
//!
//! Each object embeds a lazily created [`Metadata`] record holding the
//! per-key fan-out (`subjects`), the observers rooted at it and its computed
//! declarations. Writes to an intercepted key compare old and new values by
//! identity; a change re-wires every observer whose path continues below
//! the key (detach from the old sub-object, attach to the new one) and then
//! schedules each affected observer on the thread's
//! [`Scheduler`](pathwire_core::Scheduler). Delivery happens when the
//! scheduler drains, so a burst of writes collapses into one notification
//! per observer.
//!
//! Observers hold their root weakly and fan-outs hold observers weakly, so
//! the only strong edge into an observer is its root's metadata (plus any
//! handle the consumer keeps).
//!
//! # Invariants
//!
//! 1. At most one interceptor per `(object, key)`.
//! 2. At most one observer per `(root, path)`.
//! 3. If observer `P` is in `O.subjects[k]` with suffix `S` and `O[k]` is an
//!    object, then `P` is in `O[k].subjects[S.key()]` with `S.rest()`.
//! 4. Writing a value identical to the current one (`Object.is` semantics)
//!    neither re-wires nor notifies.
//! 5. Disposing a root leaves no fan-out entry for observers rooted there
//!    and leaves observers rooted elsewhere untouched.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use pathwire_core::Scheduler;
//! use pathwire_runtime::obj;
//! use pathwire_runtime::reactive::{Value, observe};
//!
//! let target = obj! { "value" => 1 };
//! let observer = observe(&target, "value").unwrap();
//! let recorded = Rc::new(RefCell::new(Value::Undefined));
//! let sink = Rc::clone(&recorded);
//! let _sub = observer.subscribe(move |v| *sink.borrow_mut() = v.clone());
//! assert_eq!(*recorded.borrow(), Value::from(1));
//!
//! target.set("value", 2);
//! assert_eq!(*recorded.borrow(), Value::from(1));
//! Scheduler::current().drain().unwrap();
//! assert_eq!(*recorded.borrow(), Value::from(2));
//! ```

mod array;
pub mod computed;
pub mod disposal;
pub mod error;
pub mod intercept;
pub mod metadata;
pub mod object;
pub mod observe;
pub mod observer;
pub mod path;
pub mod value;

pub use computed::{ComputedWiring, compute, declare_computed};
pub use disposal::{Disposable, DisposableMetadata, DisposeFn, disposable_metadata_of};
pub use error::{NotObservableReason, ObserveError};
pub use intercept::notify_all;
pub use metadata::{Metadata, metadata_of};
pub use object::{Getter, Obj, Property, Setter, WeakObj, read_path};
pub use observe::{ObserveOptions, observe, observe_strict, observe_with};
pub use observer::{ListenerId, ObserverId, PathObserver, Subscription};
pub use path::{IntoPath, Path, PathSuffix};
pub use value::Value;
