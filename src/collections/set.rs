// ============================================================================
// spark-bindings - ReactiveSet
// An insertion-ordered set of values with positional change reporting
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::RandomState;
use indexmap::IndexMap as OrderedMap;

use super::hooks::Hooks;
use super::index_map::Mutation;
use crate::core::types::CollectionHook;
use crate::core::value::{HashKey, Value};

// =============================================================================
// REACTIVE SET
// =============================================================================

struct SetInner {
    members: RefCell<OrderedMap<HashKey, Value, RandomState>>,
    hooks: Hooks,
}

/// A shared set of values, iterated in insertion order.
///
/// # Example
///
/// ```
/// use spark_bindings::{ReactiveSet, Value};
///
/// let tags = ReactiveSet::new();
/// assert!(tags.add(Value::from("rust")));
/// assert!(!tags.add(Value::from("rust")));
/// assert_eq!(tags.len(), 1);
/// ```
#[derive(Clone)]
pub struct ReactiveSet {
    inner: Rc<SetInner>,
}

impl Default for ReactiveSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveSet {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SetInner {
                members: RefCell::new(OrderedMap::with_hasher(RandomState::new())),
                hooks: Hooks::default(),
            }),
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let set = Self::new();
        {
            let mut members = set.inner.members.borrow_mut();
            for value in values {
                members.entry(value.hash_key()).or_insert(value);
            }
        }
        set
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ReactiveSet) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakSet {
        WeakSet(Rc::downgrade(&self.inner))
    }

    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.borrow().is_empty()
    }

    pub fn has(&self, value: &Value) -> bool {
        self.inner.members.borrow().contains_key(&value.hash_key())
    }

    pub fn values(&self) -> Vec<Value> {
        self.inner.members.borrow().values().cloned().collect()
    }

    /// Add a member. Returns false (and does not notify) if already present.
    pub fn add(&self, value: Value) -> bool {
        let start = {
            let mut members = self.inner.members.borrow_mut();
            let hash = value.hash_key();
            if members.contains_key(&hash) {
                return false;
            }
            members.insert(hash, value);
            members.len() - 1
        };
        self.notify(Mutation::Splice {
            start,
            removed: Vec::new(),
            inserted: 1,
        });
        true
    }

    /// Remove a member. Returns false (and does not notify) if absent.
    pub fn delete(&self, value: &Value) -> bool {
        let removed = self
            .inner
            .members
            .borrow_mut()
            .shift_remove_full(&value.hash_key());
        let Some((index, _, member)) = removed else {
            return false;
        };
        self.notify(Mutation::Splice {
            start: index,
            removed: vec![member],
            inserted: 0,
        });
        true
    }

    pub fn clear(&self) {
        let removed: Vec<Value> = self.inner.members.borrow_mut().drain(..).map(|(_, v)| v).collect();
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

impl std::fmt::Debug for ReactiveSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.inner.members.borrow().values())
            .finish()
    }
}

/// Weak handle to a `ReactiveSet`.
#[derive(Clone)]
pub struct WeakSet(Weak<SetInner>);

impl WeakSet {
    pub fn upgrade(&self) -> Option<ReactiveSet> {
        self.0.upgrade().map(|inner| ReactiveSet { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter(Cell<usize>);

    impl CollectionHook for Counter {
        fn collection_mutated(&self, _: Mutation) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn duplicate_add_and_absent_delete_are_silent() {
        let set = ReactiveSet::from_values([Value::from(1)]);
        let counter = Rc::new(Counter(Cell::new(0)));
        let hook: Rc<dyn CollectionHook> = counter.clone();
        set.add_hook(Rc::downgrade(&hook));

        assert!(!set.add(Value::from(1)));
        assert!(!set.delete(&Value::from(2)));
        assert_eq!(counter.0.get(), 0);

        assert!(set.add(Value::from(2)));
        assert!(set.delete(&Value::from(1)));
        set.clear();
        assert_eq!(counter.0.get(), 3);
        assert!(set.is_empty());
    }

    #[test]
    fn nan_is_a_single_member() {
        let set = ReactiveSet::new();
        set.add(Value::Number(f64::NAN));
        set.add(Value::Number(f64::NAN));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn objects_are_members_by_identity() {
        let a = crate::core::value::Object::new();
        let set = ReactiveSet::new();
        set.add(Value::from(a.clone()));
        set.add(Value::from(crate::core::value::Object::new()));
        assert_eq!(set.len(), 2);
        assert!(set.has(&Value::from(a)));
    }
}
