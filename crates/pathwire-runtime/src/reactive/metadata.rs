#![forbid(unsafe_code)]

//! Per-object observation metadata.
//!
//! Every object that takes part in observation carries one [`Metadata`]
//! record, created lazily by [`metadata_of`] and stored inside the object
//! itself. The record therefore lives exactly as long as the object and no
//! global table ever keeps an object alive.
//!
//! # Ownership
//!
//! - `observers` holds the **strong** references to the path observers
//!   rooted at this object, one per canonical path.
//! - `subjects` is the per-key fan-out. It holds observers **weakly**; an
//!   entry whose observer is gone is pruned the next time the key is read.
//! - Nothing here holds the owning object strongly.
//!
//! All methods borrow their cells only for the duration of the call and
//! never invoke user code while a borrow is held, so listeners may freely
//! re-enter the engine.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};

use super::computed::ComputedWiring;
use super::disposal::{Disposable, DisposableMetadata};
use super::object::{Obj, WeakObj};
use super::observer::{ObserverId, PathObserver};
use super::path::{Path, PathSuffix};

/// One entry of a key's fan-out: an observer and what it still follows.
#[derive(Clone)]
pub(crate) struct Subject {
    observer: Weak<PathObserver>,
    rest: Option<PathSuffix>,
}

struct ComputedDecl {
    dependencies: Vec<Path>,
    wiring: Option<ComputedWiring>,
}

/// Observation bookkeeping for one object.
pub struct Metadata {
    owner: WeakObj,
    subjects: RefCell<AHashMap<String, BTreeMap<ObserverId, Subject>>>,
    computed: RefCell<AHashMap<String, ComputedDecl>>,
    observers: RefCell<AHashMap<String, Rc<PathObserver>>>,
    intercepted: RefCell<AHashSet<String>>,
    reactive_array: Cell<bool>,
    disposables: Rc<DisposableMetadata>,
}

/// Metadata for `obj`, created on first access.
pub fn metadata_of(obj: &Obj) -> Rc<Metadata> {
    Rc::clone(
        obj.metadata_cell()
            .get_or_init(|| Rc::new(Metadata::new(obj.downgrade()))),
    )
}

impl Metadata {
    fn new(owner: WeakObj) -> Self {
        Self {
            disposables: Rc::new(DisposableMetadata::new(owner.clone())),
            owner,
            subjects: RefCell::new(AHashMap::new()),
            computed: RefCell::new(AHashMap::new()),
            observers: RefCell::new(AHashMap::new()),
            intercepted: RefCell::new(AHashSet::new()),
            reactive_array: Cell::new(false),
        }
    }

    /// The object this record describes, if still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Obj> {
        self.owner.upgrade()
    }

    /// Number of live observers registered on `key`.
    #[must_use]
    pub fn subject_count(&self, key: &str) -> usize {
        self.subjects.borrow().get(key).map_or(0, |fan_out| {
            fan_out
                .values()
                .filter(|subject| subject.observer.strong_count() > 0)
                .count()
        })
    }

    /// Keys with a non-empty fan-out, sorted.
    #[must_use]
    pub fn observed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .subjects
            .borrow()
            .iter()
            .filter(|(_, fan_out)| !fan_out.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of path observers rooted at this object.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Whether an interceptor is installed on `key`.
    #[must_use]
    pub fn is_intercepted(&self, key: &str) -> bool {
        self.intercepted.borrow().contains(key)
    }

    /// Whether the array mutation adapter is active on this object.
    #[must_use]
    pub fn is_reactive_array(&self) -> bool {
        self.reactive_array.get()
    }

    /// Declared dependencies of a computed key.
    #[must_use]
    pub fn computed_dependencies(&self, key: &str) -> Option<Vec<Path>> {
        self.computed
            .borrow()
            .get(key)
            .map(|decl| decl.dependencies.clone())
    }

    /// Whether the computed key's dependencies are currently wired.
    #[must_use]
    pub fn is_computed_wired(&self, key: &str) -> bool {
        self.computed
            .borrow()
            .get(key)
            .is_some_and(|decl| decl.wiring.is_some())
    }

    /// Disposables accumulated on behalf of this object.
    #[must_use]
    pub fn disposables(&self) -> &Rc<DisposableMetadata> {
        &self.disposables
    }

    // -- Fan-out ------------------------------------------------------------

    pub(crate) fn add_subject(
        &self,
        key: &str,
        observer: &Rc<PathObserver>,
        rest: Option<PathSuffix>,
    ) {
        self.subjects
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .insert(
                observer.id(),
                Subject {
                    observer: Rc::downgrade(observer),
                    rest,
                },
            );
    }

    /// Remove one observer from a key's fan-out. Empty fan-outs are dropped.
    pub(crate) fn remove_subject(&self, key: &str, id: ObserverId) -> bool {
        let mut subjects = self.subjects.borrow_mut();
        let Some(fan_out) = subjects.get_mut(key) else {
            return false;
        };
        let removed = fan_out.remove(&id).is_some();
        if fan_out.is_empty() {
            subjects.remove(key);
        }
        removed
    }

    /// Live fan-out of `key` in observer creation order.
    ///
    /// Dead entries are pruned as a side effect.
    pub(crate) fn subjects_snapshot(
        &self,
        key: &str,
    ) -> Vec<(Rc<PathObserver>, Option<PathSuffix>)> {
        let mut subjects = self.subjects.borrow_mut();
        let Some(fan_out) = subjects.get_mut(key) else {
            return Vec::new();
        };
        let mut live = Vec::with_capacity(fan_out.len());
        fan_out.retain(|_, subject| match subject.observer.upgrade() {
            Some(observer) => {
                live.push((observer, subject.rest.clone()));
                true
            }
            None => false,
        });
        if fan_out.is_empty() {
            subjects.remove(key);
        }
        live
    }

    // -- Shared observers ---------------------------------------------------

    pub(crate) fn shared_observer(&self, canonical: &str) -> Option<Rc<PathObserver>> {
        self.observers.borrow().get(canonical).cloned()
    }

    pub(crate) fn register_observer(&self, canonical: String, observer: Rc<PathObserver>) {
        self.observers.borrow_mut().insert(canonical, observer);
    }

    /// Drop the shared entry, but only if it still points at `id`.
    pub(crate) fn unregister_observer(&self, canonical: &str, id: ObserverId) {
        let mut observers = self.observers.borrow_mut();
        if observers
            .get(canonical)
            .is_some_and(|observer| observer.id() == id)
        {
            observers.remove(canonical);
        }
    }

    /// Remove every rooted observer, oldest first.
    pub(crate) fn take_observers(&self) -> Vec<Rc<PathObserver>> {
        let mut taken: Vec<Rc<PathObserver>> = self
            .observers
            .borrow_mut()
            .drain()
            .map(|(_, observer)| observer)
            .collect();
        taken.sort_by_key(|observer| observer.id());
        taken
    }

    // -- Interceptors -------------------------------------------------------

    /// Record an interceptor on `key`. Returns `false` if already present.
    pub(crate) fn mark_intercepted(&self, key: &str) -> bool {
        self.intercepted.borrow_mut().insert(key.to_string())
    }

    /// Uninstall interceptors whose fan-out is empty. Returns how many.
    pub(crate) fn release_idle_interceptors(&self) -> usize {
        let idle: Vec<String> = self
            .intercepted
            .borrow()
            .iter()
            .filter(|key| self.subject_count(key) == 0)
            .cloned()
            .collect();
        let mut intercepted = self.intercepted.borrow_mut();
        let mut subjects = self.subjects.borrow_mut();
        for key in &idle {
            intercepted.remove(key);
            subjects.remove(key);
        }
        idle.len()
    }

    /// Returns `false` if the array was already reactive.
    pub(crate) fn set_reactive_array(&self) -> bool {
        !self.reactive_array.replace(true)
    }

    // -- Computed -----------------------------------------------------------

    /// Record dependencies for `key`, tearing down any previous wiring.
    pub(crate) fn declare_computed(&self, key: &str, dependencies: Vec<Path>) {
        let previous = self.computed.borrow_mut().insert(
            key.to_string(),
            ComputedDecl {
                dependencies,
                wiring: None,
            },
        );
        if let Some(wiring) = previous.and_then(|decl| decl.wiring) {
            wiring.dispose();
        }
    }

    /// Claim the dependencies of an unwired computed key.
    ///
    /// The returned wiring is stored immediately so re-entrant attaches do
    /// not wire the same key twice.
    pub(crate) fn take_unwired_computed(&self, key: &str) -> Option<(Vec<Path>, ComputedWiring)> {
        let mut computed = self.computed.borrow_mut();
        let decl = computed.get_mut(key)?;
        if decl.wiring.is_some() {
            return None;
        }
        let wiring = ComputedWiring::default();
        decl.wiring = Some(wiring.clone());
        Some((decl.dependencies.clone(), wiring))
    }

    /// Forget a wiring that failed part way, so the next attach retries.
    pub(crate) fn reset_computed_wiring(&self, key: &str, wiring: &ComputedWiring) {
        let mut computed = self.computed.borrow_mut();
        if let Some(decl) = computed.get_mut(key) {
            if decl.wiring.as_ref().is_some_and(|w| w.ptr_eq(wiring)) {
                decl.wiring = None;
            }
        }
    }

    /// Drop every computed declaration and its wiring.
    pub(crate) fn clear_computed(&self) {
        let drained: Vec<ComputedDecl> = self
            .computed
            .borrow_mut()
            .drain()
            .map(|(_, decl)| decl)
            .collect();
        for decl in drained {
            if let Some(wiring) = decl.wiring {
                wiring.dispose();
            }
        }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("owner", &self.owner)
            .field("observed_keys", &self.observed_keys())
            .field("observers", &self.observer_count())
            .field("intercepted", &self.intercepted.borrow().len())
            .field("reactive_array", &self.reactive_array.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe::observe;

    #[test]
    fn metadata_is_memoized_per_object() {
        let a = Obj::new();
        let b = Obj::new();
        let first = metadata_of(&a);
        let second = metadata_of(&a);
        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &metadata_of(&b)));
        assert!(first.owner().is_some_and(|owner| owner.ptr_eq(&a)));
    }

    #[test]
    fn metadata_does_not_keep_owner_alive() {
        let a = Obj::new();
        let meta = metadata_of(&a);
        let weak = a.downgrade();
        drop(a);
        assert!(weak.is_dropped());
        assert!(meta.owner().is_none());
    }

    #[test]
    fn fan_out_bookkeeping() {
        let root = crate::obj! { "a" => 1 };
        let observer = observe(&root, "a").expect("observable");
        let meta = metadata_of(&root);
        assert_eq!(meta.subject_count("a"), 1);
        assert_eq!(meta.observed_keys(), vec!["a".to_string()]);
        assert!(meta.is_intercepted("a"));

        assert!(meta.remove_subject("a", observer.id()));
        assert!(!meta.remove_subject("a", observer.id()));
        assert_eq!(meta.subject_count("a"), 0);
        assert!(meta.observed_keys().is_empty());
    }

    #[test]
    fn unregister_requires_matching_id() {
        let root = crate::obj! { "a" => 1, "b" => 2 };
        let a = observe(&root, "a").expect("observable");
        let b = observe(&root, "b").expect("observable");
        let meta = metadata_of(&root);
        let key_a = a.path().canonical_key();
        meta.unregister_observer(&key_a, b.id());
        assert_eq!(meta.observer_count(), 2);
        meta.unregister_observer(&key_a, a.id());
        assert_eq!(meta.observer_count(), 1);
    }

    #[test]
    fn take_observers_is_creation_ordered() {
        let root = crate::obj! { "x" => 1, "y" => 2, "z" => 3 };
        let ids: Vec<ObserverId> = ["z", "x", "y"]
            .into_iter()
            .map(|key| observe(&root, key).expect("observable").id())
            .collect();
        let taken: Vec<ObserverId> = metadata_of(&root)
            .take_observers()
            .iter()
            .map(|observer| observer.id())
            .collect();
        assert_eq!(taken, ids);
        assert_eq!(metadata_of(&root).observer_count(), 0);
    }

    #[test]
    fn idle_interceptors_are_released() {
        let root = crate::obj! { "a" => 1, "b" => 2 };
        let a = observe(&root, "a").expect("observable");
        let _b = observe(&root, "b").expect("observable");
        let meta = metadata_of(&root);
        meta.remove_subject("a", a.id());
        assert_eq!(meta.release_idle_interceptors(), 1);
        assert!(!meta.is_intercepted("a"));
        assert!(meta.is_intercepted("b"));
    }

    #[test]
    fn computed_claims_are_exclusive() {
        let root = Obj::new();
        let meta = metadata_of(&root);
        meta.declare_computed("sum", vec![Path::key("a"), Path::key("b")]);
        let (deps, wiring) = meta.take_unwired_computed("sum").expect("unwired");
        assert_eq!(deps.len(), 2);
        assert!(meta.is_computed_wired("sum"));
        assert!(meta.take_unwired_computed("sum").is_none());

        meta.reset_computed_wiring("sum", &wiring);
        assert!(!meta.is_computed_wired("sum"));

        meta.clear_computed();
        assert!(meta.computed_dependencies("sum").is_none());
    }
}
