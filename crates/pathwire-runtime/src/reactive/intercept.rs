#![forbid(unsafe_code)]

//! Property interception.
//!
//! Installing an interceptor on `(object, key)` is a metadata flag: from
//! then on [`Obj::set`] routes writes to that key through [`write`], which
//! compares the old and new value by identity and, when they differ,
//! re-wires every observer whose path continues below the key before
//! scheduling every observer registered on it.
//!
//! Interceptors are never uninstalled by observers going away; an
//! interceptor with an empty fan-out is a no-op. Only root disposal
//! releases idle interceptors.

use std::rc::Rc;

use super::array;
use super::error::ObserveError;
use super::metadata::metadata_of;
use super::object::{Obj, parse_index};
use super::observe;
use super::observer::PathObserver;
use super::path::PathSuffix;
use super::value::Value;

/// Make writes to `obj[key]` observable. Idempotent.
pub(crate) fn install(obj: &Obj, key: &str) -> Result<(), ObserveError> {
    let meta = metadata_of(obj);
    if meta.is_intercepted(key) {
        return Ok(());
    }
    obj.check_observable(key)
        .map_err(|reason| ObserveError::PropertyNotObservable {
            object: obj.id(),
            key: key.to_string(),
            reason,
        })?;
    meta.mark_intercepted(key);
    if obj.is_array() && (key == "length" || parse_index(key).is_some()) {
        array::make_reactive(obj);
    }
    tracing::debug!(object = obj.id(), key, "interceptor installed");
    Ok(())
}

/// Intercepted write. Returns whether the underlying write was accepted.
pub(crate) fn write(obj: &Obj, key: &str, value: Value) -> bool {
    let old = obj.get(key);
    if !obj.write_raw(key, value) {
        return false;
    }
    // Re-read so accessors report what they actually stored.
    let new = obj.get(key);
    if !old.same_value(&new) {
        property_changed(obj, key, &old, &new);
    }
    true
}

/// Re-wire the suffixes hanging off `key`, then schedule its observers.
pub(crate) fn property_changed(obj: &Obj, key: &str, old: &Value, new: &Value) {
    let Some(meta) = obj.metadata().cloned() else {
        return;
    };
    let subjects = meta.subjects_snapshot(key);
    for (observer, rest) in &subjects {
        if let Some(rest) = rest {
            if !observer.is_disposed() {
                rewire(observer, rest, old, new);
            }
        }
    }
    for (observer, _) in subjects {
        observer.schedule();
    }
}

fn rewire(observer: &Rc<PathObserver>, rest: &PathSuffix, old: &Value, new: &Value) {
    if let Value::Object(old) = old {
        observe::detach(old, observer.id(), rest);
    }
    if let Value::Object(new) = new {
        if let Err(error) = observe::attach(new, observer, rest) {
            tracing::warn!(
                observer = %observer.id(),
                path = %observer.path(),
                %error,
                "re-wiring failed, tail left unobserved"
            );
            observe::detach(new, observer.id(), rest);
            return;
        }
    }
    tracing::trace!(
        observer = %observer.id(),
        path = %observer.path(),
        from = rest.start(),
        "re-wired"
    );
}

/// Schedule every observer registered on `obj[key]`.
///
/// The escape hatch for changes the interceptor cannot see, such as a
/// sub-object mutated in place or a getter whose inputs changed. No
/// re-wiring happens.
pub fn notify_all(obj: &Obj, key: &str) {
    let Some(meta) = obj.metadata().cloned() else {
        return;
    };
    for (observer, _) in meta.subjects_snapshot(key) {
        observer.schedule();
    }
}
