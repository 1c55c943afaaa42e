#![forbid(unsafe_code)]

//! Property paths.
//!
//! A [`Path`] is an immutable, non-empty list of property names shared
//! behind an `Rc`, so suffixes ([`PathSuffix`]) are cheap views rather than
//! copies. The canonical key length-prefixes every segment, which keeps it
//! injective for any property name (including names containing `.`).

use std::fmt;
use std::rc::Rc;

use super::error::ObserveError;
use super::object::Obj;
use super::value::Value;

/// Ordered, non-empty sequence of property names.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Rc<[String]>,
}

impl Path {
    /// Build a path from segments. Fails on an empty sequence.
    pub fn new<I, S>(segments: I) -> Result<Self, ObserveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ObserveError::EmptyPath);
        }
        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Single-segment path.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: Rc::from(vec![key.into()]),
        }
    }

    /// Split a dotted expression (`"a.b.c"`).
    pub fn parse(dotted: &str) -> Result<Self, ObserveError> {
        if dotted.is_empty() {
            return Err(ObserveError::EmptyPath);
        }
        Self::new(dotted.split('.'))
    }

    /// All segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; paths are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// First segment.
    #[must_use]
    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    /// Identity key used to share observers of equal paths.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let capacity = self.segments.iter().map(|s| s.len() + 4).sum();
        let mut key = String::with_capacity(capacity);
        for segment in self.segments.iter() {
            key.push_str(&segment.len().to_string());
            key.push(':');
            key.push_str(segment);
        }
        key
    }

    /// The whole path as a suffix starting at segment 0.
    #[must_use]
    pub fn full(&self) -> PathSuffix {
        PathSuffix {
            path: self.clone(),
            start: 0,
        }
    }

    /// Suffix starting at `start`, or `None` past the end.
    #[must_use]
    pub fn suffix(&self, start: usize) -> Option<PathSuffix> {
        (start < self.len()).then(|| PathSuffix {
            path: self.clone(),
            start,
        })
    }

    /// Read the value at this path from `root`.
    ///
    /// A non-object intermediate yields [`Value::Undefined`].
    #[must_use]
    pub fn read(&self, root: &Obj) -> Value {
        self.full().read(root)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

/// The remaining part of a path, from some segment to the end.
#[derive(Clone, PartialEq, Eq)]
pub struct PathSuffix {
    path: Path,
    start: usize,
}

impl PathSuffix {
    /// The property key this suffix starts with.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.path.segments[self.start]
    }

    /// Everything after [`key`](Self::key), if anything.
    #[must_use]
    pub fn rest(&self) -> Option<PathSuffix> {
        self.path.suffix(self.start + 1)
    }

    /// Whether this suffix is a single key.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.start + 1 == self.path.len()
    }

    /// Segments covered by this suffix.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.path.segments[self.start..]
    }

    /// The full path this suffix belongs to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the first segment within the full path.
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Read the value this suffix designates relative to `obj`.
    #[must_use]
    pub fn read(&self, obj: &Obj) -> Value {
        let mut current = Value::Object(obj.clone());
        for segment in self.segments() {
            current = match &current {
                Value::Object(object) => object.get(segment),
                _ => return Value::Undefined,
            };
        }
        current
    }
}

impl fmt::Debug for PathSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathSuffix({})", self.segments().join("."))
    }
}

/// Conversion into a [`Path`].
///
/// String slices are treated as dotted expressions; arrays, slices and
/// vectors are taken segment by segment.
pub trait IntoPath {
    /// Perform the conversion.
    fn into_path(self) -> Result<Path, ObserveError>;
}

impl IntoPath for Path {
    fn into_path(self) -> Result<Path, ObserveError> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> Result<Path, ObserveError> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Path, ObserveError> {
        Path::parse(self)
    }
}

impl<const N: usize> IntoPath for [&str; N] {
    fn into_path(self) -> Result<Path, ObserveError> {
        Path::new(self)
    }
}

impl IntoPath for &[&str] {
    fn into_path(self) -> Result<Path, ObserveError> {
        Path::new(self.iter().copied())
    }
}

impl IntoPath for &[String] {
    fn into_path(self) -> Result<Path, ObserveError> {
        Path::new(self.iter().cloned())
    }
}

impl IntoPath for Vec<&str> {
    fn into_path(self) -> Result<Path, ObserveError> {
        Path::new(self)
    }
}

impl IntoPath for Vec<String> {
    fn into_path(self) -> Result<Path, ObserveError> {
        Path::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_paths_are_rejected() {
        assert_eq!(Path::new(Vec::<String>::new()), Err(ObserveError::EmptyPath));
        assert_eq!(Path::parse(""), Err(ObserveError::EmptyPath));
        assert_eq!(Vec::<&str>::new().into_path(), Err(ObserveError::EmptyPath));
    }

    #[test]
    fn parse_splits_on_dots() {
        let path = Path::parse("a.b.c").expect("valid path");
        assert_eq!(path.segments(), ["a", "b", "c"]);
        assert_eq!(path.to_string(), "a.b.c");
        assert_eq!(path.first(), "a");
    }

    #[test]
    fn canonical_key_is_injective_for_dotted_names() {
        let dotted = Path::new(["a.b"]).expect("valid path");
        let split = Path::new(["a", "b"]).expect("valid path");
        assert_ne!(dotted.canonical_key(), split.canonical_key());
        assert_eq!(split.canonical_key(), "1:a1:b");

        let tricky = Path::new(["1:a", "b"]).expect("valid path");
        let other = Path::new(["1", "a1:b"]).expect("valid path");
        assert_ne!(tricky.canonical_key(), other.canonical_key());
    }

    #[test]
    fn suffix_navigation() {
        let path = Path::parse("a.b.c").expect("valid path");
        let full = path.full();
        assert_eq!(full.key(), "a");
        assert!(!full.is_last());

        let rest = full.rest().expect("has rest");
        assert_eq!(rest.key(), "b");
        assert_eq!(rest.segments(), ["b", "c"]);
        assert_eq!(rest.start(), 1);

        let last = rest.rest().expect("has rest");
        assert!(last.is_last());
        assert!(last.rest().is_none());
        assert!(path.suffix(3).is_none());
    }

    #[test]
    fn into_path_variants_agree() {
        let expected = Path::parse("x.y").expect("valid path");
        assert_eq!(["x", "y"].into_path(), Ok(expected.clone()));
        assert_eq!(vec!["x", "y"].into_path(), Ok(expected.clone()));
        assert_eq!(
            vec!["x".to_string(), "y".to_string()].into_path(),
            Ok(expected.clone())
        );
        let slice: &[&str] = &["x", "y"];
        assert_eq!(slice.into_path(), Ok(expected.clone()));
        assert_eq!((&expected).into_path(), Ok(expected.clone()));
    }
}
