#![forbid(unsafe_code)]

//! Computed keys driven by dependency paths.
//!
//! A computed key is a property (typically a getter) whose change
//! notification comes from a declared list of dependency paths rather than
//! from writes to the key itself. The engine never evaluates the derived
//! value; it only turns "some dependency changed" into "the computed key
//! changed" by calling [`notify_all`] on the key.
//!
//! # Coalescing
//!
//! Each dependency observer re-notifies the key through the key's own
//! observers, which carry a pending flag. Several dependencies changing in
//! one burst therefore produce one notification of the key, delivered in
//! the same drain.
//!
//! # Wiring
//!
//! Dependencies are wired lazily: [`declare_computed`] only records them,
//! and the first observation that reaches the key wires them. The wiring is
//! registered as a disposable on the owning object.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::disposal::Disposable;
use super::error::ObserveError;
use super::intercept::notify_all;
use super::metadata::metadata_of;
use super::object::Obj;
use super::observe::observe;
use super::observer::{PathObserver, Subscription};
use super::path::{IntoPath, Path};

/// Subscriptions connecting a computed key to its dependencies.
///
/// Cloning creates a new handle to the **same** set.
#[derive(Clone, Default)]
pub struct ComputedWiring {
    subscriptions: Rc<RefCell<Vec<Subscription>>>,
}

impl ComputedWiring {
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.subscriptions, &other.subscriptions)
    }

    fn push(&self, subscription: Subscription) {
        self.subscriptions.borrow_mut().push(subscription);
    }

    /// Number of live dependency subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Whether no dependency is wired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Disposable for ComputedWiring {
    fn dispose(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
    }
}

impl fmt::Debug for ComputedWiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedWiring")
            .field("subscriptions", &self.len())
            .finish()
    }
}

fn collect_paths<I>(dependencies: I) -> Result<Vec<Path>, ObserveError>
where
    I: IntoIterator,
    I::Item: IntoPath,
{
    dependencies.into_iter().map(IntoPath::into_path).collect()
}

/// Record the dependencies of `obj[key]`.
///
/// Replaces any earlier declaration. If the key is already observed the new
/// dependencies are wired immediately; otherwise wiring waits for the first
/// observation of the key.
pub fn declare_computed<I>(obj: &Obj, key: &str, dependencies: I) -> Result<(), ObserveError>
where
    I: IntoIterator,
    I::Item: IntoPath,
{
    let dependencies = collect_paths(dependencies)?;
    let meta = metadata_of(obj);
    meta.declare_computed(key, dependencies);
    if meta.subject_count(key) > 0 {
        wire_pending(obj, key)?;
    }
    Ok(())
}

/// Declare `root[key]` as computed from `dependencies` and observe it.
///
/// Returns the shared observer for `[key]`.
pub fn compute<I>(root: &Obj, key: &str, dependencies: I) -> Result<Rc<PathObserver>, ObserveError>
where
    I: IntoIterator,
    I::Item: IntoPath,
{
    declare_computed(root, key, dependencies)?;
    observe(root, Path::key(key))
}

/// Wire the declared dependencies of `obj[key]` if that has not happened yet.
pub(crate) fn wire_pending(obj: &Obj, key: &str) -> Result<(), ObserveError> {
    let meta = metadata_of(obj);
    let Some((dependencies, wiring)) = meta.take_unwired_computed(key) else {
        return Ok(());
    };
    for dependency in &dependencies {
        let observer = match observe(obj, dependency) {
            Ok(observer) => observer,
            Err(error) => {
                wiring.dispose();
                meta.reset_computed_wiring(key, &wiring);
                return Err(error);
            }
        };
        let target = obj.downgrade();
        let computed_key = key.to_string();
        wiring.push(observer.subscribe_lazy(move |_| {
            if let Some(target) = target.upgrade() {
                notify_all(&target, &computed_key);
            }
        }));
    }
    meta.disposables().add(wiring);
    tracing::debug!(
        object = obj.id(),
        key,
        dependencies = dependencies.len(),
        "computed dependencies wired"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::value::Value;
    use pathwire_core::Scheduler;
    use std::cell::Cell;

    fn drain() {
        Scheduler::current().drain().expect("drain succeeds");
    }

    fn sum_object() -> Obj {
        let root = crate::obj! { "a" => 1, "b" => 2 };
        root.define_getter("sum", |this| {
            let a = this.get("a").as_number().unwrap_or(0.0);
            let b = this.get("b").as_number().unwrap_or(0.0);
            Value::from(a + b)
        });
        root
    }

    #[test]
    fn dependency_change_notifies_computed_key() {
        let root = sum_object();
        let observer = compute(&root, "sum", ["a", "b"]).expect("wired");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = observer.subscribe(move |v| sink.borrow_mut().push(v.clone()));
        assert_eq!(*seen.borrow(), vec![Value::from(3)]);

        root.set("a", 10);
        drain();
        assert_eq!(*seen.borrow(), vec![Value::from(3), Value::from(12)]);
    }

    #[test]
    fn simultaneous_dependency_changes_coalesce() {
        let root = sum_object();
        let observer = compute(&root, "sum", ["a", "b"]).expect("wired");
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));

        root.set("a", 5);
        root.set("b", 6);
        drain();
        assert_eq!(calls.get(), 1);
        assert_eq!(observer.value(), Value::from(11));
    }

    #[test]
    fn declaration_is_wired_on_first_observation() {
        let root = sum_object();
        declare_computed(&root, "sum", ["a", "b"]).expect("declared");
        let meta = metadata_of(&root);
        assert!(!meta.is_computed_wired("sum"));
        assert_eq!(
            meta.computed_dependencies("sum"),
            Some(vec![Path::key("a"), Path::key("b")])
        );

        let observer = observe(&root, "sum").expect("observable");
        assert!(meta.is_computed_wired("sum"));
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));
        root.set("b", 7);
        drain();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_reached_through_a_path_is_wired() {
        let inner = sum_object();
        declare_computed(&inner, "sum", ["a", "b"]).expect("declared");
        let root = crate::obj! { "totals" => inner.clone() };
        let observer = observe(&root, "totals.sum").expect("observable");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = observer.subscribe_lazy(move |v| sink.borrow_mut().push(v.clone()));
        inner.set("a", 100);
        drain();
        assert_eq!(*seen.borrow(), vec![Value::from(102)]);
    }

    #[test]
    fn nested_dependency_paths() {
        let root = crate::obj! { "user" => crate::obj! { "first" => "Ada" } };
        root.define_getter("greeting", |this| {
            let name = this
                .get("user")
                .as_object()
                .map(|user| user.get("first").to_display_string())
                .unwrap_or_default();
            Value::from(format!("Hello, {name}"))
        });
        let observer = compute(&root, "greeting", ["user.first"]).expect("wired");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = observer.subscribe_lazy(move |v| sink.borrow_mut().push(v.clone()));

        root.set("user", crate::obj! { "first" => "Grace" });
        drain();
        assert_eq!(*seen.borrow(), vec![Value::from("Hello, Grace")]);
    }

    #[test]
    fn redeclaring_replaces_wiring() {
        let root = sum_object();
        let observer = compute(&root, "sum", ["a"]).expect("wired");
        declare_computed(&root, "sum", ["b"]).expect("redeclared");
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));

        root.set("a", 50);
        drain();
        assert_eq!(calls.get(), 0);
        root.set("b", 50);
        drain();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn wiring_dispose_unsubscribes() {
        let root = sum_object();
        compute(&root, "sum", ["a", "b"]).expect("wired");
        let dependency = observe(&root, "a").expect("shared");
        assert_eq!(dependency.listener_count(), 1);
        if let Some(meta) = root.metadata() {
            meta.clear_computed();
        }
        assert_eq!(dependency.listener_count(), 0);
    }

    #[test]
    fn empty_dependency_path_fails_declaration() {
        let root = Obj::new();
        let deps: Vec<Vec<&str>> = vec![vec![]];
        assert_eq!(
            declare_computed(&root, "x", deps),
            Err(ObserveError::EmptyPath)
        );
    }
}
