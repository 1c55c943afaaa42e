#![forbid(unsafe_code)]

//! Dynamic objects and arrays.
//!
//! [`Obj`] is a cheap `Rc` handle to a mutable bag of properties, optionally
//! backed by an element vector (arrays). Objects are not built "observable";
//! the engine retrofits interception onto individual keys the first time a
//! path runs through them, and [`Obj::set`] routes writes to intercepted keys
//! through the interceptor.
//!
//! # Arrays
//!
//! `"length"` and canonical index keys (`"0"`, `"1"`, ... without leading
//! zeros) map onto the element vector. Writing `"length"` truncates or
//! extends with [`Value::Undefined`]; writing an index at or past the end
//! extends the array.
//!
//! # Freezing
//!
//! [`Obj::freeze`] makes the object non-extensible and every property
//! non-configurable and read-only. A frozen array also rejects element
//! writes and every mutating method.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use super::array;
use super::error::NotObservableReason;
use super::intercept;
use super::metadata::Metadata;
use super::path::Path;
use super::value::Value;

// ---------------------------------------------------------------------------
// Object ids
// ---------------------------------------------------------------------------

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Property descriptors
// ---------------------------------------------------------------------------

/// Accessor read hook.
pub type Getter = Rc<dyn Fn(&Obj) -> Value>;

/// Accessor write hook.
pub type Setter = Rc<dyn Fn(&Obj, Value)>;

/// A property descriptor.
#[derive(Clone)]
pub enum Property {
    /// Plain stored value.
    Data {
        /// Stored value.
        value: Value,
        /// Whether writes are accepted.
        writable: bool,
        /// Whether the property may be redefined.
        configurable: bool,
    },
    /// Computed on read, optionally accepting writes.
    Accessor {
        /// Read hook.
        get: Getter,
        /// Write hook; `None` makes the property getter-only.
        set: Option<Setter>,
        /// Whether the property may be redefined.
        configurable: bool,
    },
}

impl Property {
    /// Writable, configurable data property.
    #[must_use]
    pub fn data(value: impl Into<Value>) -> Self {
        Self::Data {
            value: value.into(),
            writable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-configurable data property.
    #[must_use]
    pub fn readonly(value: impl Into<Value>) -> Self {
        Self::Data {
            value: value.into(),
            writable: false,
            configurable: false,
        }
    }

    /// Configurable getter-only accessor.
    #[must_use]
    pub fn getter(get: impl Fn(&Obj) -> Value + 'static) -> Self {
        Self::Accessor {
            get: Rc::new(get),
            set: None,
            configurable: true,
        }
    }

    /// Configurable accessor with both hooks.
    #[must_use]
    pub fn accessor(
        get: impl Fn(&Obj) -> Value + 'static,
        set: impl Fn(&Obj, Value) + 'static,
    ) -> Self {
        Self::Accessor {
            get: Rc::new(get),
            set: Some(Rc::new(set)),
            configurable: true,
        }
    }

    /// Override the configurable flag.
    #[must_use]
    pub fn with_configurable(mut self, value: bool) -> Self {
        match &mut self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => {
                *configurable = value;
            }
        }
        self
    }

    /// Whether the property may be redefined.
    #[must_use]
    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    fn observable(&self) -> Result<(), NotObservableReason> {
        match self {
            Self::Data {
                writable: false,
                configurable: false,
                ..
            } => Err(NotObservableReason::ReadOnly),
            Self::Accessor {
                set: None,
                configurable: false,
                ..
            } => Err(NotObservableReason::GetterOnly),
            _ => Ok(()),
        }
    }

    fn freeze(&mut self) {
        match self {
            Self::Data {
                writable,
                configurable,
                ..
            } => {
                *writable = false;
                *configurable = false;
            }
            Self::Accessor { configurable, .. } => *configurable = false,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data {
                value,
                writable,
                configurable,
            } => f
                .debug_struct("Data")
                .field("value", value)
                .field("writable", writable)
                .field("configurable", configurable)
                .finish(),
            Self::Accessor {
                set, configurable, ..
            } => f
                .debug_struct("Accessor")
                .field("setter", &set.is_some())
                .field("configurable", configurable)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Obj
// ---------------------------------------------------------------------------

struct ObjectInner {
    id: u64,
    props: RefCell<AHashMap<String, Property>>,
    order: RefCell<Vec<String>>,
    elements: Option<RefCell<Vec<Value>>>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
    meta: OnceCell<Rc<Metadata>>,
}

/// Shared handle to a dynamic object or array.
///
/// Cloning creates a new handle to the **same** object. Equality and hashing
/// are by identity.
#[derive(Clone)]
pub struct Obj(Rc<ObjectInner>);

/// Weak counterpart of [`Obj`].
#[derive(Clone, Default)]
pub struct WeakObj(Weak<ObjectInner>);

impl WeakObj {
    /// Upgrade to a strong handle if the object is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Obj> {
        self.0.upgrade().map(Obj)
    }

    /// Whether the object has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl fmt::Debug for WeakObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(obj) => write!(f, "Weak({obj:?})"),
            None => f.write_str("Weak(<dropped>)"),
        }
    }
}

/// Largest length a write through `length` or an index may grow an array to.
///
/// Elements are stored densely, so a write that would open a larger hole is
/// rejected instead of allocating it.
pub const MAX_DENSE_LEN: usize = 1 << 24;

/// Parse a canonical array index (`"0"`, `"17"`, never `"01"` or `"+1"`).
///
/// Indices run from `0` to `u32::MAX - 1`; larger all-digit keys are plain
/// property names.
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    let index: u32 = key.parse().ok()?;
    (index < u32::MAX).then_some(index as usize)
}

impl Default for Obj {
    fn default() -> Self {
        Self::new()
    }
}

impl Obj {
    fn with_elements(elements: Option<Vec<Value>>) -> Self {
        Self(Rc::new(ObjectInner {
            id: next_object_id(),
            props: RefCell::new(AHashMap::new()),
            order: RefCell::new(Vec::new()),
            elements: elements.map(RefCell::new),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
            meta: OnceCell::new(),
        }))
    }

    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::with_elements(None)
    }

    /// Create an array holding `values`.
    #[must_use]
    pub fn array<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::with_elements(Some(values.into_iter().map(Into::into).collect()))
    }

    /// Process-unique id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Whether both handles refer to the same object.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Create a weak handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakObj {
        WeakObj(Rc::downgrade(&self.0))
    }

    /// Whether this object is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.0.elements.is_some()
    }

    pub(crate) fn elements(&self) -> Option<&RefCell<Vec<Value>>> {
        self.0.elements.as_ref()
    }

    pub(crate) fn metadata(&self) -> Option<&Rc<Metadata>> {
        self.0.meta.get()
    }

    pub(crate) fn metadata_cell(&self) -> &OnceCell<Rc<Metadata>> {
        &self.0.meta
    }

    // -- Reads --------------------------------------------------------------

    /// Read a property. Missing keys read as [`Value::Undefined`].
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        if let Some(elements) = self.elements() {
            if key == "length" {
                return Value::from(elements.borrow().len());
            }
            if let Some(index) = parse_index(key) {
                return elements.borrow().get(index).cloned().unwrap_or_default();
            }
        }
        // Clone the descriptor so the getter may touch this object.
        let property = self.0.props.borrow().get(key).cloned();
        match property {
            Some(Property::Data { value, .. }) => value,
            Some(Property::Accessor { get, .. }) => get(self),
            None => Value::Undefined,
        }
    }

    /// Whether the key exists.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        if let Some(elements) = self.elements() {
            if key == "length" {
                return true;
            }
            if let Some(index) = parse_index(key) {
                return index < elements.borrow().len();
            }
        }
        self.0.props.borrow().contains_key(key)
    }

    /// Own keys: array indices first, then named properties in definition
    /// order. `"length"` is not listed.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self.elements() {
            Some(elements) => (0..elements.borrow().len()).map(|i| i.to_string()).collect(),
            None => Vec::new(),
        };
        keys.extend(self.0.order.borrow().iter().cloned());
        keys
    }

    /// Current descriptor of a named property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<Property> {
        self.0.props.borrow().get(key).cloned()
    }

    // -- Writes -------------------------------------------------------------

    /// Write a property, returning whether the write was accepted.
    ///
    /// Writes to intercepted keys notify their observers; an index write
    /// that changes a reactive array's length also notifies `"length"`
    /// observers.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let length_before = self.reactive_len();
        let intercepted = self.metadata().is_some_and(|meta| meta.is_intercepted(key));
        let accepted = if intercepted {
            intercept::write(self, key, value)
        } else {
            self.write_raw(key, value)
        };
        if let Some(before) = length_before {
            if key != "length" && self.array_len() != before {
                array::length_changed(self);
            }
        }
        accepted
    }

    fn reactive_len(&self) -> Option<usize> {
        self.metadata()
            .filter(|meta| meta.is_reactive_array())
            .map(|_| self.array_len())
    }

    /// Write without interception.
    pub(crate) fn write_raw(&self, key: &str, value: Value) -> bool {
        if let Some(elements) = self.elements() {
            if key == "length" {
                let Some(len) = value.as_number().and_then(as_length) else {
                    return false;
                };
                if self.is_frozen() {
                    return false;
                }
                let mut elements = elements.borrow_mut();
                if len > elements.len() && len > MAX_DENSE_LEN {
                    return false;
                }
                elements.resize(len, Value::Undefined);
                return true;
            }
            if let Some(index) = parse_index(key) {
                if self.is_frozen() {
                    return false;
                }
                let mut elements = elements.borrow_mut();
                if index >= elements.len() {
                    if !self.0.extensible.get() || index >= MAX_DENSE_LEN {
                        return false;
                    }
                    elements.resize(index + 1, Value::Undefined);
                }
                elements[index] = value;
                return true;
            }
        }

        let setter = {
            let mut props = self.0.props.borrow_mut();
            if !props.contains_key(key) {
                if !self.0.extensible.get() {
                    return false;
                }
                props.insert(key.to_string(), Property::data(value));
                drop(props);
                self.0.order.borrow_mut().push(key.to_string());
                return true;
            }
            match props.get_mut(key) {
                Some(Property::Data {
                    value: slot,
                    writable,
                    ..
                }) => {
                    if !*writable {
                        return false;
                    }
                    *slot = value;
                    return true;
                }
                Some(Property::Accessor { set, .. }) => set.clone(),
                None => None,
            }
        };
        match setter {
            Some(set) => {
                set(self, value);
                true
            }
            None => false,
        }
    }

    /// Define (or redefine) a named property.
    ///
    /// Fails when the existing property is non-configurable or the key is
    /// new and the object is non-extensible. Defining does not notify;
    /// follow up with [`notify_all`](super::intercept::notify_all) when a
    /// redefinition changes an observed value.
    pub fn define(&self, key: &str, property: Property) -> bool {
        if self.is_array() && (key == "length" || parse_index(key).is_some()) {
            return false;
        }
        let mut props = self.0.props.borrow_mut();
        match props.get(key).map(Property::is_configurable) {
            Some(false) => false,
            Some(true) => {
                props.insert(key.to_string(), property);
                true
            }
            None if !self.0.extensible.get() => false,
            None => {
                props.insert(key.to_string(), property);
                drop(props);
                self.0.order.borrow_mut().push(key.to_string());
                true
            }
        }
    }

    /// Define a data property with explicit flags.
    pub fn define_data(
        &self,
        key: &str,
        value: impl Into<Value>,
        writable: bool,
        configurable: bool,
    ) -> bool {
        self.define(
            key,
            Property::Data {
                value: value.into(),
                writable,
                configurable,
            },
        )
    }

    /// Define a configurable getter-only accessor.
    pub fn define_getter(&self, key: &str, get: impl Fn(&Obj) -> Value + 'static) -> bool {
        self.define(key, Property::getter(get))
    }

    /// Define a configurable accessor with a setter.
    pub fn define_accessor(
        &self,
        key: &str,
        get: impl Fn(&Obj) -> Value + 'static,
        set: impl Fn(&Obj, Value) + 'static,
    ) -> bool {
        self.define(key, Property::accessor(get, set))
    }

    // -- Integrity ----------------------------------------------------------

    /// Reject new keys from now on.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    /// Whether new keys may be added.
    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Freeze the object (see the module docs).
    pub fn freeze(&self) {
        self.0.extensible.set(false);
        self.0.frozen.set(true);
        for property in self.0.props.borrow_mut().values_mut() {
            property.freeze();
        }
    }

    /// Whether [`freeze`](Self::freeze) was called.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Whether an interceptor could be installed on `key`.
    pub fn check_observable(&self, key: &str) -> Result<(), NotObservableReason> {
        if self.is_array() && (key == "length" || parse_index(key).is_some()) {
            if self.is_frozen() {
                return Err(NotObservableReason::ReadOnly);
            }
            return Ok(());
        }
        match self.0.props.borrow().get(key) {
            Some(property) => property.observable(),
            None if !self.0.extensible.get() => Err(NotObservableReason::NonExtensible),
            None => Ok(()),
        }
    }
}

fn as_length(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as usize)
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Obj {}

impl Hash for Obj {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.elements() {
            Some(elements) => write!(f, "Array#{}[{}]", self.0.id, elements.borrow().len()),
            None => write!(f, "Object#{}", self.0.id),
        }
    }
}

/// Read the value at `path` from `root`.
///
/// Any non-object intermediate yields [`Value::Undefined`].
#[must_use]
pub fn read_path(root: &Obj, path: &Path) -> Value {
    path.read(root)
}

/// Build an [`Obj`] from `key => value` pairs.
///
/// ```
/// use pathwire_runtime::obj;
///
/// let point = obj! { "x" => 1, "y" => 2 };
/// assert_eq!(point.get("y").as_number(), Some(2.0));
/// ```
#[macro_export]
macro_rules! obj {
    () => {
        $crate::reactive::Obj::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let object = $crate::reactive::Obj::new();
        $(
            object.set($key, $crate::reactive::Value::from($value));
        )+
        object
    }};
}

/// Build an array [`Obj`] from values.
///
/// ```
/// use pathwire_runtime::arr;
///
/// let list = arr![1, "two", true];
/// assert_eq!(list.array_len(), 3);
/// ```
#[macro_export]
macro_rules! arr {
    () => {
        $crate::reactive::Obj::array(::std::iter::empty::<$crate::reactive::Value>())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::reactive::Obj::array([$($crate::reactive::Value::from($value)),+])
    };
}
