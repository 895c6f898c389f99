// ============================================================================
// spark-bindings - Host Values
// The dynamic value model observed by the engine
// ============================================================================
//
// Rust cannot intercept writes to native fields, so everything the engine
// observes is expressed through this model: objects are explicit slot
// containers, collections are handles whose mutating methods describe what
// they did. Observation is installed by registering a watcher/hook, never by
// rewriting the target's behaviour.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use smallvec::SmallVec;

use super::error::{ReactiveError, Result};
use super::types::{PropertyReader, RawReader, SlotWatcher, weak_addr};
use crate::collections::{ReactiveMap, ReactiveSet, ReactiveVec};
use crate::reactivity::equality::same_value;

// =============================================================================
// VALUE
// =============================================================================

/// A host value. Reference variants (`Object`, `Array`, `Map`, `Set`,
/// `Function`) have identity; cloning a `Value` clones the handle.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(Object),
    Array(ReactiveVec),
    Map(ReactiveMap),
    Set(ReactiveSet),
    Function(Function),
}

impl Value {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Function(_) => "function",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveVec> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// True for the collection variants.
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Map(_) | Value::Set(_))
    }

    /// Identity address of a reference value.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Object(o) => Some(o.id()),
            Value::Array(a) => Some(a.id()),
            Value::Map(m) => Some(m.id()),
            Value::Set(s) => Some(s.id()),
            Value::Function(f) => Some(f.id()),
            _ => None,
        }
    }

    /// Hashable projection using same-value-zero semantics.
    pub fn hash_key(&self) -> HashKey {
        match self {
            Value::Undefined => HashKey::Undefined,
            Value::Null => HashKey::Null,
            Value::Bool(b) => HashKey::Bool(*b),
            Value::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                let bits = if n.is_nan() { f64::NAN.to_bits() } else { n.to_bits() };
                HashKey::Number(bits)
            }
            Value::Str(s) => HashKey::Str(s.clone()),
            other => HashKey::Ref(other.identity().unwrap_or_default()),
        }
    }

    /// Read a property without tracking.
    pub fn get_property(&self, key: &str) -> Result<Value> {
        match self {
            Value::Undefined | Value::Null => Err(ReactiveError::NullTarget {
                key: key.to_string(),
                target: self.type_name(),
            }),
            Value::Object(obj) => obj.get(key),
            Value::Array(arr) => {
                if key == "length" {
                    return Ok(Value::from(arr.len()));
                }
                Ok(index_key(key)
                    .and_then(|i| arr.get(i))
                    .unwrap_or(Value::Undefined))
            }
            Value::Map(map) if key == "size" => Ok(Value::from(map.len())),
            Value::Set(set) if key == "size" => Ok(Value::from(set.len())),
            Value::Str(s) if key == "length" => Ok(Value::from(s.chars().count())),
            _ => Ok(Value::Undefined),
        }
    }

    /// Write a property directly. Observers watching the slot are notified.
    pub fn set_property(&self, key: &str, value: Value) -> Result<()> {
        match self {
            Value::Undefined | Value::Null => Err(ReactiveError::NullTarget {
                key: key.to_string(),
                target: self.type_name(),
            }),
            Value::Object(obj) => obj.set(key, value),
            Value::Array(arr) => match index_key(key) {
                Some(i) if i < arr.len() => {
                    arr.set(i, value);
                    Ok(())
                }
                Some(i) if i == arr.len() => {
                    arr.push(value);
                    Ok(())
                }
                _ => Err(ReactiveError::ReadOnly(key.to_string())),
            },
            _ => Err(ReactiveError::ReadOnly(key.to_string())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(o) => write!(f, "Object@{:x}", o.id()),
            Value::Array(a) => write!(f, "Array@{:x}(len={})", a.id(), a.len()),
            Value::Map(m) => write!(f, "Map@{:x}(size={})", m.id(), m.len()),
            Value::Set(s) => write!(f, "Set@{:x}(size={})", s.id(), s.len()),
            Value::Function(func) => write!(f, "Function@{:x}", func.id()),
        }
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<ReactiveVec> for Value {
    fn from(a: ReactiveVec) -> Self {
        Value::Array(a)
    }
}

impl From<ReactiveMap> for Value {
    fn from(m: ReactiveMap) -> Self {
        Value::Map(m)
    }
}

impl From<ReactiveSet> for Value {
    fn from(s: ReactiveSet) -> Self {
        Value::Set(s)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Undefined)
    }
}

/// Parse a canonical array index ("0", "12"; not "01" or "+1").
pub fn index_key(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

// =============================================================================
// HASH KEY
// =============================================================================

/// Hashable projection of a `Value` used by keyed collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Ref(usize),
}

// =============================================================================
// FUNCTION
// =============================================================================

type NativeFn = dyn Fn(&[Value]) -> Result<Value>;

/// A callable host value.
#[derive(Clone)]
pub struct Function {
    inner: Rc<NativeFn>,
}

impl Function {
    pub fn new(f: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Self { inner: Rc::new(f) }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.inner)(args)
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        self.id() == other.id()
    }
}

// =============================================================================
// OBJECT
// =============================================================================

/// Getter of an accessor slot. Receives the owning object and a reader that
/// decides whether the getter's own reads are tracked.
pub type Getter = Rc<dyn Fn(&Object, &dyn PropertyReader) -> Result<Value>>;

/// Setter of an accessor slot.
pub type Setter = Rc<dyn Fn(&Object, Value) -> Result<()>>;

/// One watcher per engine observing the slot; usually just one.
type Watchers = SmallVec<[Weak<dyn SlotWatcher>; 1]>;

enum Slot {
    Data(Value),
    Accessor { get: Getter, set: Option<Setter> },
}

pub(crate) struct ObjectInner {
    slots: RefCell<AHashMap<Rc<str>, Slot>>,
    watchers: RefCell<AHashMap<Rc<str>, Watchers>>,
}

/// A plain object: a bag of named slots with identity.
///
/// # Example
///
/// ```
/// use spark_bindings::{Object, Value};
///
/// let person = Object::new();
/// person.set("name", Value::from("Ada")).unwrap();
/// assert_eq!(person.get("name").unwrap(), Value::from("Ada"));
/// assert_eq!(person.get("missing").unwrap(), Value::Undefined);
/// ```
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl Object {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                slots: RefCell::new(AHashMap::new()),
                watchers: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// Create an object from `(key, value)` pairs.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let obj = Self::new();
        {
            let mut slots = obj.inner.slots.borrow_mut();
            for (k, v) in entries {
                slots.insert(Rc::from(k.as_ref()), Slot::Data(v.into()));
            }
        }
        obj
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.inner))
    }

    /// True if a data or accessor slot exists under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.inner.slots.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    /// Read a slot. Accessor getters run with an untracked reader.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.get_with(key, &RawReader)
    }

    /// Read a slot, handing `reader` to an accessor getter.
    pub fn get_with(&self, key: &str, reader: &dyn PropertyReader) -> Result<Value> {
        let getter = {
            let slots = self.inner.slots.borrow();
            match slots.get(key) {
                None => return Ok(Value::Undefined),
                Some(Slot::Data(v)) => return Ok(v.clone()),
                Some(Slot::Accessor { get, .. }) => get.clone(),
            }
        };
        // Borrow released: the getter may read other slots of this object
        getter(self, reader)
    }

    /// Write a slot.
    ///
    /// Data slots store the value and tell the installed watcher (if any).
    /// Accessor slots call their setter, or fail with `ReadOnly`.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        enum Outcome {
            Stored(Value),
            Setter(Setter),
            ReadOnly,
        }

        let outcome = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(key) {
                Some(Slot::Data(current)) => Outcome::Stored(std::mem::replace(current, value.clone())),
                Some(Slot::Accessor { set: Some(set), .. }) => Outcome::Setter(set.clone()),
                Some(Slot::Accessor { set: None, .. }) => Outcome::ReadOnly,
                None => {
                    slots.insert(Rc::from(key), Slot::Data(value.clone()));
                    Outcome::Stored(Value::Undefined)
                }
            }
        };

        match outcome {
            Outcome::Stored(old) => self.notify_watcher(key, &value, &old),
            Outcome::Setter(setter) => setter(self, value),
            Outcome::ReadOnly => Err(ReactiveError::ReadOnly(key.to_string())),
        }
    }

    /// Define (or replace) an accessor slot with no backing storage.
    pub fn define_accessor(
        &self,
        key: &str,
        get: impl Fn(&Object, &dyn PropertyReader) -> Result<Value> + 'static,
        set: Option<Setter>,
    ) {
        self.inner.slots.borrow_mut().insert(
            Rc::from(key),
            Slot::Accessor {
                get: Rc::new(get),
                set,
            },
        );
    }

    /// The getter/setter pair of an accessor slot.
    pub fn accessor(&self, key: &str) -> Option<(Getter, Option<Setter>)> {
        match self.inner.slots.borrow().get(key) {
            Some(Slot::Accessor { get, set }) => Some((get.clone(), set.clone())),
            _ => None,
        }
    }

    /// Add a watcher told about writes to `key`. Several engines may watch
    /// the same slot; each is told. Adding the same watcher twice is a no-op.
    pub(crate) fn watch(&self, key: &str, watcher: Weak<dyn SlotWatcher>) {
        let addr = weak_addr(&watcher);
        let mut watchers = self.inner.watchers.borrow_mut();
        let entry = watchers.entry(Rc::from(key)).or_default();
        entry.retain(|w| w.strong_count() > 0);
        if !entry.iter().any(|w| weak_addr(w) == addr) {
            entry.push(watcher);
        }
    }

    /// Remove one watcher from `key`, leaving the others in place.
    pub(crate) fn unwatch(&self, key: &str, watcher: &Weak<dyn SlotWatcher>) {
        let addr = weak_addr(watcher);
        let mut watchers = self.inner.watchers.borrow_mut();
        if let Some(entry) = watchers.get_mut(key) {
            entry.retain(|w| w.strong_count() > 0 && weak_addr(w) != addr);
            if entry.is_empty() {
                watchers.remove(key);
            }
        }
    }

    /// Number of live watchers on `key`.
    pub fn watcher_count(&self, key: &str) -> usize {
        self.inner
            .watchers
            .borrow()
            .get(key)
            .map_or(0, |entry| entry.iter().filter(|w| w.strong_count() > 0).count())
    }

    fn notify_watcher(&self, key: &str, new_value: &Value, old_value: &Value) -> Result<()> {
        // Upgrade first: the borrow must be released before calling out
        let watchers: Vec<Rc<dyn SlotWatcher>> = match self.inner.watchers.borrow().get(key) {
            Some(entry) => entry.iter().filter_map(Weak::upgrade).collect(),
            None => return Ok(()),
        };
        let errors: Vec<ReactiveError> = watchers
            .iter()
            .filter_map(|watcher| watcher.slot_changed(new_value, old_value).err())
            .collect();
        ReactiveError::collect(errors)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &format_args!("{:x}", self.id()))
            .field("keys", &self.keys())
            .finish()
    }
}

/// Weak handle to an object; used by caches that must not keep targets alive.
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(|inner| Object { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
