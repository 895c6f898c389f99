// ============================================================================
// spark-bindings - ReactiveMap
// An insertion-ordered keyed collection with positional change reporting
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::RandomState;
use indexmap::IndexMap as OrderedMap;

use super::hooks::Hooks;
use super::index_map::Mutation;
use crate::core::types::CollectionHook;
use crate::core::value::{HashKey, Value};
use crate::reactivity::equality::same_value;

// =============================================================================
// REACTIVE MAP
// =============================================================================

struct MapInner {
    entries: RefCell<OrderedMap<HashKey, (Value, Value), RandomState>>,
    hooks: Hooks,
}

/// A shared map from `Value` keys to values, iterated in insertion order.
///
/// Positions in change descriptors are insertion-order positions. Keys
/// compare with same-value-zero semantics.
///
/// # Example
///
/// ```
/// use spark_bindings::{ReactiveMap, Value};
///
/// let map = ReactiveMap::new();
/// map.set(Value::from("a"), Value::from(1));
/// map.set(Value::from("b"), Value::from(2));
///
/// assert_eq!(map.get(&Value::from("a")), Some(Value::from(1)));
/// assert_eq!(map.delete(&Value::from("a")), Some(Value::from(1)));
/// assert_eq!(map.len(), 1);
/// ```
#[derive(Clone)]
pub struct ReactiveMap {
    inner: Rc<MapInner>,
}

impl Default for ReactiveMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveMap {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(OrderedMap::with_hasher(RandomState::new())),
                hooks: Hooks::default(),
            }),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let map = Self::new();
        {
            let mut storage = map.inner.entries.borrow_mut();
            for (key, value) in entries {
                storage.insert(key.hash_key(), (key, value));
            }
        }
        map
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ReactiveMap) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakMap {
        WeakMap(Rc::downgrade(&self.inner))
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    pub fn has(&self, key: &Value) -> bool {
        self.inner.entries.borrow().contains_key(&key.hash_key())
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.inner
            .entries
            .borrow()
            .get(&key.hash_key())
            .map(|(_, v)| v.clone())
    }

    pub fn keys(&self) -> Vec<Value> {
        self.inner
            .entries
            .borrow()
            .values()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.inner
            .entries
            .borrow()
            .values()
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner.entries.borrow().values().cloned().collect()
    }

    /// Insert or overwrite. Writing the same value again is not a mutation.
    /// Returns the previous value.
    pub fn set(&self, key: Value, value: Value) -> Option<Value> {
        let hash = key.hash_key();
        let mutation = {
            let mut storage = self.inner.entries.borrow_mut();
            match storage.get_full_mut(&hash) {
                Some((index, _, (_, current))) => {
                    if same_value(current, &value) {
                        return Some(value);
                    }
                    let old = std::mem::replace(current, value);
                    Mutation::Replace { index, old }
                }
                None => {
                    let start = storage.len();
                    storage.insert(hash, (key, value));
                    Mutation::Splice {
                        start,
                        removed: Vec::new(),
                        inserted: 1,
                    }
                }
            }
        };
        let previous = match &mutation {
            Mutation::Replace { old, .. } => Some(old.clone()),
            _ => None,
        };
        self.notify(mutation);
        previous
    }

    /// Remove a key. Deleting an absent key is not a mutation.
    pub fn delete(&self, key: &Value) -> Option<Value> {
        let (index, value) = {
            let mut storage = self.inner.entries.borrow_mut();
            let (index, _, (_, value)) = storage.shift_remove_full(&key.hash_key())?;
            (index, value)
        };
        self.notify(Mutation::Splice {
            start: index,
            removed: vec![value.clone()],
            inserted: 0,
        });
        Some(value)
    }

    pub fn clear(&self) {
        let removed: Vec<Value> = {
            let mut storage = self.inner.entries.borrow_mut();
            storage.drain(..).map(|(_, (_, v))| v).collect()
        };
        if !removed.is_empty() {
            self.notify(Mutation::Clear { removed });
        }
    }

    pub(crate) fn add_hook(&self, hook: Weak<dyn CollectionHook>) {
        self.inner.hooks.add(hook);
    }

    pub(crate) fn remove_hook(&self, hook: &Weak<dyn CollectionHook>) {
        self.inner.hooks.remove(hook);
    }

    /// Number of live observers hooked into this collection.
    pub fn hook_count(&self) -> usize {
        self.inner.hooks.count()
    }

    fn notify(&self, mutation: Mutation) {
        self.inner.hooks.notify(mutation);
    }
}

impl std::fmt::Debug for ReactiveMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.inner.entries.borrow().values().map(|(k, v)| (k, v)))
            .finish()
    }
}

/// Weak handle to a `ReactiveMap`.
#[derive(Clone)]
pub struct WeakMap(Weak<MapInner>);

impl WeakMap {
    pub fn upgrade(&self) -> Option<ReactiveMap> {
        self.0.upgrade().map(|inner| ReactiveMap { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
