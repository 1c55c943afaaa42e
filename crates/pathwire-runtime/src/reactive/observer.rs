#![forbid(unsafe_code)]

//! Path observers and their subscriptions.
//!
//! A [`PathObserver`] is the live subscription for one `(root, path)` pair.
//! It is shared: observing the same path on the same root twice yields the
//! same `Rc<PathObserver>`. Listeners receive the value read along the path
//! at delivery time, never a value captured at write time.
//!
//! # Invariants
//!
//! 1. At most one notification is pending per observer; N writes before a
//!    drain produce a single delivery.
//! 2. Listeners are invoked in subscription order.
//! 3. A disposed observer never schedules or delivers again.
//! 4. The root is held weakly; an observer whose root is gone is inert.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use pathwire_core::{Priority, Scheduler};

use super::error::ObserveError;
use super::object::{Obj, WeakObj};
use super::observe;
use super::path::Path;
use super::value::Value;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a [`PathObserver`]; ids grow with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Identifier of one listener within one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

type Listener = Rc<dyn Fn(&Value)>;

/// Live observation of one path from one root object.
pub struct PathObserver {
    id: ObserverId,
    root: WeakObj,
    path: Path,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
    pending: Cell<bool>,
    disposed: Cell<bool>,
    notifications: Cell<u64>,
    /// Object last attached at each segment, so disposal can detach even
    /// after the root is gone.
    links: RefCell<Vec<WeakObj>>,
    scheduler: Scheduler,
    self_ref: Weak<PathObserver>,
}

impl PathObserver {
    /// Create an observer bound to the current thread's scheduler.
    pub(crate) fn new(root: &Obj, path: Path) -> Rc<Self> {
        let links = RefCell::new(vec![WeakObj::default(); path.len()]);
        Rc::new_cyclic(|self_ref| Self {
            id: ObserverId::next(),
            root: root.downgrade(),
            path,
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
            pending: Cell::new(false),
            disposed: Cell::new(false),
            notifications: Cell::new(0),
            links,
            scheduler: Scheduler::current(),
            self_ref: self_ref.clone(),
        })
    }

    /// This observer's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// The observed path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The root object, if still alive.
    #[must_use]
    pub fn root(&self) -> Option<Obj> {
        self.root.upgrade()
    }

    /// Current value at the path (`Undefined` once the root is gone).
    #[must_use]
    pub fn value(&self) -> Value {
        self.root
            .upgrade()
            .map(|root| self.path.read(&root))
            .unwrap_or_default()
    }

    /// Add a listener and call it once with the current value.
    pub fn subscribe(&self, listener: impl Fn(&Value) + 'static) -> Subscription {
        let listener: Listener = Rc::new(listener);
        let subscription = self.add_listener(Rc::clone(&listener));
        listener(&self.value());
        subscription
    }

    /// Add a listener without the initial call.
    pub fn subscribe_lazy(&self, listener: impl Fn(&Value) + 'static) -> Subscription {
        self.add_listener(Rc::new(listener))
    }

    fn add_listener(&self, listener: Listener) -> Subscription {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        Subscription {
            observer: self.self_ref.clone(),
            listener: id,
            active: Cell::new(true),
        }
    }

    /// Remove a listener by id.
    ///
    /// Unlike [`Subscription::unsubscribe`], an unknown id is an error.
    pub fn remove_listener(&self, id: ListenerId) -> Result<(), ObserveError> {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            listeners
                .iter()
                .position(|(listener, _)| *listener == id)
                .map(|index| listeners.remove(index))
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(ObserveError::ListenerNotSubscribed {
                path: self.path.to_string(),
                listener: id.0,
            }),
        }
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Whether a notification is queued but not yet delivered.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// How many notification passes reached at least one listener.
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.notifications.get()
    }

    /// Read the current value and hand it to every listener.
    ///
    /// Skips the read entirely when nobody is listening.
    pub fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let Some(root) = self.root.upgrade() else {
            return;
        };
        let value = self.path.read(&root);
        self.notifications.set(self.notifications.get() + 1);
        for listener in listeners {
            if self.disposed.get() {
                break;
            }
            listener(&value);
        }
    }

    /// Remember that `obj` carries this observer for segment `index`.
    pub(crate) fn record_link(&self, index: usize, obj: &Obj) {
        if let Some(slot) = self.links.borrow_mut().get_mut(index) {
            *slot = obj.downgrade();
        }
    }

    /// Queue a notification unless one is already pending.
    pub(crate) fn schedule(&self) {
        if self.pending.get() || self.disposed.get() {
            return;
        }
        self.pending.set(true);
        let observer = self.self_ref.clone();
        self.scheduler.enqueue_labeled(
            "notify",
            move || {
                if let Some(observer) = observer.upgrade() {
                    observer.pending.set(false);
                    observer.notify();
                }
                Ok(())
            },
            Priority::Normal,
            None,
        );
    }

    /// Detach from every fan-out along the path and drop all listeners.
    ///
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        let links = std::mem::take(&mut *self.links.borrow_mut());
        if let Some(root) = self.root.upgrade() {
            observe::detach(&root, self.id, &self.path.full());
            if let Some(meta) = root.metadata() {
                meta.unregister_observer(&self.path.canonical_key(), self.id);
            }
        } else {
            // Without a root the chain cannot be walked; use the recorded links.
            for (link, key) in links.iter().zip(self.path.segments()) {
                let Some(obj) = link.upgrade() else {
                    continue;
                };
                if let Some(meta) = obj.metadata() {
                    meta.remove_subject(key, self.id);
                }
            }
        }
        drop(listeners);
        tracing::debug!(observer = %self.id, path = %self.path, "path observer disposed");
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("path", &self.path)
            .field("listeners", &self.listener_count())
            .field("pending", &self.pending.get())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

/// RAII handle for one listener.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) removes the
/// listener; both are no-ops once the listener is gone.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    observer: Weak<PathObserver>,
    listener: ListenerId,
    active: Cell<bool>,
}

impl Subscription {
    /// The listener this handle controls.
    #[must_use]
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Whether the listener is still attached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get() && self.observer.strong_count() > 0
    }

    /// Remove the listener. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(observer) = self.observer.upgrade() {
            // Already gone (e.g. the observer was disposed) is fine here.
            let _ = observer.remove_listener(self.listener);
        }
    }

    /// Keep the listener attached for the observer's whole lifetime.
    pub fn forget(self) -> ListenerId {
        self.active.set(false);
        self.listener
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("listener", &self.listener)
            .field("active", &self.active.get())
            .finish()
    }
}
