#![forbid(unsafe_code)]

//! The path-observation algorithm.
//!
//! [`observe`] walks `root.k0.k1...kn`, installing an interceptor on every
//! key it reaches and registering the observer in that key's fan-out with
//! the suffix it still has to follow. The walk stops at the first value
//! that is not an object; the unobserved tail is picked up later by
//! write-time re-wiring when an object lands there.
//!
//! # Invariants
//!
//! 1. One observer per `(root, path)`: repeated calls share it.
//! 2. If an observer sits in `O.subjects[k]` with suffix `S` and `O[k]` is
//!    an object, that object has the observer in `subjects[S.key()]` with
//!    `S.rest()`.
//! 3. A failed observation leaves no fan-out entries behind.

use std::rc::Rc;

use super::computed;
use super::error::ObserveError;
use super::intercept;
use super::metadata::metadata_of;
use super::object::Obj;
use super::observer::{ObserverId, PathObserver};
use super::path::{IntoPath, Path, PathSuffix};
use super::value::Value;

/// Options for [`observe_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Require every intermediate segment to hold an object already.
    /// Default: false.
    pub strict: bool,
}

impl ObserveOptions {
    /// Options with strict resolution enabled.
    #[must_use]
    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Set strict resolution.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Observe `path` from `root`, tolerating missing intermediates.
pub fn observe(root: &Obj, path: impl IntoPath) -> Result<Rc<PathObserver>, ObserveError> {
    observe_with(root, path, ObserveOptions::default())
}

/// Observe `path` from `root`, failing with
/// [`ObserveError::PathNotResolvable`] if an intermediate is not an object.
pub fn observe_strict(root: &Obj, path: impl IntoPath) -> Result<Rc<PathObserver>, ObserveError> {
    observe_with(root, path, ObserveOptions::strict())
}

/// Observe with explicit options.
pub fn observe_with(
    root: &Obj,
    path: impl IntoPath,
    options: ObserveOptions,
) -> Result<Rc<PathObserver>, ObserveError> {
    let path = path.into_path()?;
    if options.strict {
        ensure_resolvable(root, &path)?;
    }

    let meta = metadata_of(root);
    let canonical = path.canonical_key();
    if let Some(existing) = meta.shared_observer(&canonical) {
        return Ok(existing);
    }

    let observer = PathObserver::new(root, path.clone());
    // Registered before attaching so re-entrant observation of the same
    // path (via computed wiring) finds it.
    meta.register_observer(canonical.clone(), Rc::clone(&observer));
    let suffix = path.full();
    if let Err(error) = attach(root, &observer, &suffix) {
        detach(root, observer.id(), &suffix);
        meta.unregister_observer(&canonical, observer.id());
        return Err(error);
    }
    tracing::trace!(object = root.id(), observer = %observer.id(), %path, "observing");
    Ok(observer)
}

fn ensure_resolvable(root: &Obj, path: &Path) -> Result<(), ObserveError> {
    let segments = path.segments();
    let mut current = root.clone();
    for (index, segment) in segments[..segments.len() - 1].iter().enumerate() {
        current = match current.get(segment) {
            Value::Object(next) => next,
            _ => {
                return Err(ObserveError::PathNotResolvable {
                    path: path.to_string(),
                    segment: segment.clone(),
                    index,
                });
            }
        };
    }
    Ok(())
}

/// Register `observer` on `obj[suffix.key()]` and follow the suffix down.
pub(crate) fn attach(
    obj: &Obj,
    observer: &Rc<PathObserver>,
    suffix: &PathSuffix,
) -> Result<(), ObserveError> {
    let key = suffix.key();
    intercept::install(obj, key)?;
    let rest = suffix.rest();
    metadata_of(obj).add_subject(key, observer, rest.clone());
    observer.record_link(suffix.start(), obj);
    computed::wire_pending(obj, key)?;
    if let (Some(rest), Value::Object(next)) = (rest, obj.get(key)) {
        attach(&next, observer, &rest)?;
    }
    Ok(())
}

/// Remove `id` from the fan-outs along `suffix`, starting at `obj`.
pub(crate) fn detach(obj: &Obj, id: ObserverId, suffix: &PathSuffix) {
    let key = suffix.key();
    if let Some(meta) = obj.metadata() {
        meta.remove_subject(key, id);
    }
    if let (Some(rest), Value::Object(next)) = (suffix.rest(), obj.get(key)) {
        detach(&next, id, &rest);
    }
}
