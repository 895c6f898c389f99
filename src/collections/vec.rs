// ============================================================================
// spark-bindings - ReactiveVec
// An ordered collection whose mutations describe themselves positionally
// ============================================================================

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use super::hooks::Hooks;
use super::index_map::Mutation;
use crate::core::types::CollectionHook;
use crate::core::value::Value;

// =============================================================================
// REACTIVE VEC
// =============================================================================

struct VecInner {
    items: RefCell<Vec<Value>>,
    hooks: Hooks,
}

/// A shared, ordered list of values.
///
/// Cloning the handle shares the storage. Every mutating method tells each
/// installed collection hook (one collection observer per engine) what it did, after
/// the storage borrow has been released.
///
/// # Example
///
/// ```
/// use spark_bindings::{ReactiveVec, Value};
///
/// let list = ReactiveVec::from_values(["a", "b", "c"].map(Value::from));
/// let removed = list.splice(1, 1, [Value::from("x"), Value::from("y")]);
///
/// assert_eq!(removed, vec![Value::from("b")]);
/// assert_eq!(list.len(), 4);
/// assert_eq!(list.get(3), Some(Value::from("c")));
/// ```
#[derive(Clone)]
pub struct ReactiveVec {
    inner: Rc<VecInner>,
}

impl Default for ReactiveVec {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveVec {
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Rc::new(VecInner {
                items: RefCell::new(values.into_iter().collect()),
                hooks: Hooks::default(),
            }),
        }
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ReactiveVec) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakVec {
        WeakVec(Rc::downgrade(&self.inner))
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Snapshot of the current contents.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Append a value. Returns the new length.
    pub fn push(&self, value: Value) -> usize {
        let len = self.len();
        self.splice(len, 0, [value]);
        len + 1
    }

    pub fn pop(&self) -> Option<Value> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.splice(len - 1, 1, std::iter::empty()).pop()
    }

    /// Remove and return the first value.
    pub fn shift(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.splice(0, 1, std::iter::empty()).pop()
    }

    /// Prepend a value.
    pub fn unshift(&self, value: Value) {
        self.splice(0, 0, [value]);
    }

    /// Insert at `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: Value) {
        self.splice(index, 0, [value]);
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        self.splice(index, 1, std::iter::empty()).pop()
    }

    /// Remove `delete_count` values at `start` and insert `items` in their
    /// place. Both bounds are clamped. Returns the removed values.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let items: Vec<Value> = items.into_iter().collect();
        let inserted = items.len();
        let (start, removed) = {
            let mut data = self.inner.items.borrow_mut();
            let start = start.min(data.len());
            let end = start + delete_count.min(data.len() - start);
            let removed: Vec<Value> = data.splice(start..end, items).collect();
            (start, removed)
        };
        if !removed.is_empty() || inserted > 0 {
            self.notify(Mutation::Splice {
                start,
                removed: removed.clone(),
                inserted,
            });
        }
        removed
    }

    /// Overwrite the value at `index`. Out of range is a no-op returning `None`.
    pub fn set(&self, index: usize, value: Value) -> Option<Value> {
        let old = {
            let mut data = self.inner.items.borrow_mut();
            let slot = data.get_mut(index)?;
            std::mem::replace(slot, value)
        };
        self.notify(Mutation::Replace {
            index,
            old: old.clone(),
        });
        Some(old)
    }

    /// Stable sort. Always notifies, even if the order did not change.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        // The comparator may read this vec, so it runs on a copy
        let items = self.to_vec();
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|&a, &b| compare(&items[a], &items[b]));
        let sorted = order.iter().map(|&i| items[i].clone()).collect();
        *self.inner.items.borrow_mut() = sorted;
        self.notify(Mutation::Permute { order });
    }

    /// Reverse in place. Always notifies.
    pub fn reverse(&self) {
        let order = {
            let mut data = self.inner.items.borrow_mut();
            data.reverse();
            (0..data.len()).rev().collect()
        };
        self.notify(Mutation::Permute { order });
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.items.borrow_mut());
        if !removed.is_empty() {
            self.notify(Mutation::Clear { removed });
        }
    }

    /// Replace the whole contents.
    pub fn replace_all(&self, values: impl IntoIterator<Item = Value>) {
        let len = self.len();
        self.splice(0, len, values);
    }

    // =========================================================================
    // HOOK
    // =========================================================================

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

impl std::fmt::Debug for ReactiveVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.items.borrow().iter()).finish()
    }
}

/// Weak handle to a `ReactiveVec`.
#[derive(Clone)]
pub struct WeakVec(Weak<VecInner>);

impl WeakVec {
    pub fn upgrade(&self) -> Option<ReactiveVec> {
        self.0.upgrade().map(|inner| ReactiveVec { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
