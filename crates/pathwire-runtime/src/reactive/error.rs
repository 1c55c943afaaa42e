#![forbid(unsafe_code)]

//! Errors raised by the observation engine.
//!
//! Every variant is a programmer error surfaced synchronously at the call
//! that caused it. Nothing here is retried internally.

use std::fmt;

/// Why a property could not be intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotObservableReason {
    /// Non-configurable, non-writable data property.
    ReadOnly,
    /// Non-configurable accessor without a setter.
    GetterOnly,
    /// The key does not exist and the object cannot grow.
    NonExtensible,
}

impl fmt::Display for NotObservableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "property is non-configurable and read-only"),
            Self::GetterOnly => write!(f, "property is a non-configurable getter without setter"),
            Self::NonExtensible => write!(f, "object is not extensible"),
        }
    }
}

/// Errors returned by `observe` and friends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
    /// An interceptor could not be installed on a property along the path.
    #[error("property `{key}` of object #{object} cannot be observed: {reason}")]
    PropertyNotObservable {
        /// Id of the object owning the property.
        object: u64,
        /// The property key.
        key: String,
        /// What made the property unobservable.
        reason: NotObservableReason,
    },

    /// Strict observation found a non-object intermediate segment.
    #[error("path `{path}` is not resolvable: `{segment}` (segment {index}) is not an object")]
    PathNotResolvable {
        /// The full dotted path.
        path: String,
        /// The segment whose value is missing.
        segment: String,
        /// Index of that segment.
        index: usize,
    },

    /// A listener id was removed from an observer it never belonged to.
    #[error("listener {listener} is not subscribed to `{path}`")]
    ListenerNotSubscribed {
        /// The observer's dotted path.
        path: String,
        /// The unknown listener id.
        listener: u64,
    },

    /// A path was built from zero segments.
    #[error("a path needs at least one segment")]
    EmptyPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ObserveError::PropertyNotObservable {
            object: 3,
            key: "value".into(),
            reason: NotObservableReason::ReadOnly,
        };
        assert_eq!(
            err.to_string(),
            "property `value` of object #3 cannot be observed: property is non-configurable and read-only"
        );

        let err = ObserveError::PathNotResolvable {
            path: "a.b.c".into(),
            segment: "b".into(),
            index: 1,
        };
        assert_eq!(
            err.to_string(),
            "path `a.b.c` is not resolvable: `b` (segment 1) is not an object"
        );

        assert_eq!(
            ObserveError::EmptyPath.to_string(),
            "a path needs at least one segment"
        );
    }
}
