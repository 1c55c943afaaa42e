#![forbid(unsafe_code)]

//! Root-scoped disposal.
//!
//! Every object carries a [`DisposableMetadata`] accumulator. Consumers
//! (and the engine itself, for computed wiring) add disposables to it; one
//! [`DisposableMetadata::dispose`] call then tears down everything that was
//! set up on the object's behalf:
//!
//! 1. accumulated disposables, in registration order;
//! 2. every path observer rooted at the object, oldest first;
//! 3. computed declarations;
//! 4. interceptors on the object whose fan-out is now empty.
//!
//! Observers rooted at other objects are never touched, even when their
//! paths run through this one.
//!
//! A disposable that captures its own root strongly keeps the root alive
//! until it is disposed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::metadata::metadata_of;
use super::object::{Obj, WeakObj};
use super::observer::{PathObserver, Subscription};

/// Something that can be torn down once.
///
/// Implementations must tolerate repeated calls. The method takes `&self`
/// so that calling `observer.dispose()` on an `Rc<PathObserver>` resolves
/// to the same teardown whether or not this trait is in scope.
pub trait Disposable {
    /// Release whatever this value holds.
    fn dispose(&self);
}

impl Disposable for Subscription {
    fn dispose(&self) {
        self.unsubscribe();
    }
}

impl Disposable for Rc<PathObserver> {
    fn dispose(&self) {
        PathObserver::dispose(self);
    }
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

/// Adapter turning a closure into a [`Disposable`] that runs at most once.
pub struct DisposeFn<F: FnOnce()>(RefCell<Option<F>>);

impl<F: FnOnce()> DisposeFn<F> {
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self(RefCell::new(Some(f)))
    }
}

impl<F: FnOnce()> Disposable for DisposeFn<F> {
    fn dispose(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f();
        }
    }
}

impl<F: FnOnce()> fmt::Debug for DisposeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.0.borrow().is_some() {
            "pending"
        } else {
            "done"
        };
        f.debug_tuple("DisposeFn").field(&state).finish()
    }
}

/// Disposables accumulated on behalf of one root object.
pub struct DisposableMetadata {
    owner: WeakObj,
    items: RefCell<Vec<Box<dyn Disposable>>>,
}

/// The accumulator of `root`, created on first access.
pub fn disposable_metadata_of(root: &Obj) -> Rc<DisposableMetadata> {
    DisposableMetadata::of(root)
}

impl DisposableMetadata {
    pub(crate) fn new(owner: WeakObj) -> Self {
        Self {
            owner,
            items: RefCell::new(Vec::new()),
        }
    }

    /// The accumulator of `root`.
    pub fn of(root: &Obj) -> Rc<Self> {
        Rc::clone(metadata_of(root).disposables())
    }

    /// Add a disposable.
    pub fn add(&self, disposable: impl Disposable + 'static) {
        self.items.borrow_mut().push(Box::new(disposable));
    }

    /// Add a closure to run on dispose.
    pub fn add_fn(&self, f: impl FnOnce() + 'static) {
        self.add(DisposeFn::new(f));
    }

    /// Number of accumulated disposables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether nothing is accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear down everything set up on the root's behalf.
    ///
    /// Calling it again is a no-op unless new work was added in between.
    pub fn dispose(&self) {
        let mut disposed = 0usize;
        // Disposables may add more disposables; keep going until quiet.
        loop {
            let batch = std::mem::take(&mut *self.items.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for item in batch {
                item.dispose();
                disposed += 1;
            }
        }

        let Some(root) = self.owner.upgrade() else {
            return;
        };
        let Some(meta) = root.metadata().cloned() else {
            return;
        };
        let observers = meta.take_observers();
        for observer in &observers {
            PathObserver::dispose(observer);
        }
        meta.clear_computed();
        let released = meta.release_idle_interceptors();
        if disposed > 0 || !observers.is_empty() || released > 0 {
            tracing::debug!(
                object = root.id(),
                disposables = disposed,
                observers = observers.len(),
                interceptors = released,
                "root disposed"
            );
        }
    }
}

impl fmt::Debug for DisposableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableMetadata")
            .field("owner", &self.owner)
            .field("items", &self.len())
            .finish()
    }
}
