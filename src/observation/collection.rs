// ============================================================================
// spark-bindings - Collection Observers
// Index-map producing observers for arrays, maps and sets
// ============================================================================
//
// A CollectionObserver installs itself as a hook on its collection. Each
// mutation is folded into the pending IndexMap right away (a single
// positional pass, never an old-vs-new value comparison) and the observer
// queues itself for flush. The flush hands subscribers the net descriptor
// for the whole synchronous burst and starts a fresh identity map.
//
// Size and index observers are scalar views layered on top: they subscribe
// to the collection observer while they themselves have subscribers, and
// notify only when their own value actually changed.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::collections::{IndexMap, Mutation, WeakMap, WeakSet, WeakVec};
use crate::core::constants::*;
use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::{CollectionHook, Flushable, Observer, Subscriber};
use crate::core::value::Value;
use crate::reactivity::equality::has_changed;
use crate::reactivity::subscribers::SubscriberSet;

// =============================================================================
// COLLECTION TARGET
// =============================================================================

/// Weak reference to an observed collection.
#[derive(Clone)]
pub(crate) enum CollectionTarget {
    Array(WeakVec),
    Map(WeakMap),
    Set(WeakSet),
}

impl CollectionTarget {
    pub(crate) fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Array(a) => Some(Self::Array(a.downgrade())),
            Value::Map(m) => Some(Self::Map(m.downgrade())),
            Value::Set(s) => Some(Self::Set(s.downgrade())),
            _ => None,
        }
    }

    pub(crate) fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Array(w) => w.upgrade().map(Value::Array),
            Self::Map(w) => w.upgrade().map(Value::Map),
            Self::Set(w) => w.upgrade().map(Value::Set),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        match self {
            Self::Array(w) => w.is_alive(),
            Self::Map(w) => w.is_alive(),
            Self::Set(w) => w.is_alive(),
        }
    }

    fn len(&self) -> usize {
        match self.upgrade() {
            Some(Value::Array(a)) => a.len(),
            Some(Value::Map(m)) => m.len(),
            Some(Value::Set(s)) => s.len(),
            _ => 0,
        }
    }

    fn add_hook(&self, hook: Weak<dyn CollectionHook>) {
        match self.upgrade() {
            Some(Value::Array(a)) => a.add_hook(hook),
            Some(Value::Map(m)) => m.add_hook(hook),
            Some(Value::Set(s)) => s.add_hook(hook),
            _ => {}
        }
    }

    fn remove_hook(&self, hook: &Weak<dyn CollectionHook>) {
        match self.upgrade() {
            Some(Value::Array(a)) => a.remove_hook(hook),
            Some(Value::Map(m)) => m.remove_hook(hook),
            Some(Value::Set(s)) => s.remove_hook(hook),
            _ => {}
        }
    }
}

// =============================================================================
// COLLECTION OBSERVER
// =============================================================================

pub struct CollectionObserver {
    ctx: Rc<ReactiveContext>,
    target: CollectionTarget,
    subscribers: SubscriberSet,
    index_map: RefCell<IndexMap>,
    version: Cell<u64>,
    self_weak: Weak<CollectionObserver>,
}

impl CollectionObserver {
    pub(crate) fn new(ctx: Rc<ReactiveContext>, collection: &Value) -> Option<Rc<Self>> {
        let target = CollectionTarget::of(collection)?;
        let observer = Rc::new_cyclic(|self_weak| Self {
            ctx,
            index_map: RefCell::new(IndexMap::identity(target.len())),
            target,
            subscribers: SubscriberSet::new(),
            version: Cell::new(0),
            self_weak: self_weak.clone(),
        });
        let hook: Weak<dyn CollectionHook> = Rc::downgrade(&observer) as Weak<dyn CollectionHook>;
        observer.target.add_hook(hook);
        Some(observer)
    }

    /// Incremented on every mutation.
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Current element count of the collection.
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The collection, if it is still alive.
    pub fn collection(&self) -> Option<Value> {
        self.target.upgrade()
    }

    /// Snapshot of the descriptor accumulated since the last flush.
    pub fn pending_index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    /// Unhook from the collection. Other engines' observers stay hooked.
    pub(crate) fn detach(&self) {
        let hook: Weak<dyn CollectionHook> = self.self_weak.clone();
        self.target.remove_hook(&hook);
    }
}

impl CollectionHook for CollectionObserver {
    fn collection_mutated(&self, mutation: Mutation) {
        self.index_map.borrow_mut().record(&mutation);
        self.version.set(self.version.get() + 1);
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.enqueue(me);
        }
    }
}

impl Flushable for CollectionObserver {
    fn flush(&self) -> Result<()> {
        let index_map = self.index_map.replace(IndexMap::identity(self.target.len()));
        let version = self.version.get();
        let result = self.subscribers.notify_collection(&index_map);
        if self.version.get() != version {
            // Mutated during notification: those changes are already folded
            // into the fresh map and the observer is queued again
            tracing::debug!(
                before = version,
                after = self.version.get(),
                "collection mutated during notification"
            );
        }
        result
    }
}

impl Observer for CollectionObserver {
    fn get_value(&self) -> Result<Value> {
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.observe(me);
        }
        Ok(self.target.upgrade().unwrap_or_default())
    }

    fn set_value(&self, _: Value) -> Result<()> {
        Err(ReactiveError::ReadOnly("[collection]".into()))
    }

    fn subscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn capabilities(&self) -> u32 {
        READABLE | OBSERVABLE | COLLECTION
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// SIZE OBSERVER
// =============================================================================

/// `length` of an array, `size` of a map or set.
pub struct CollectionSizeObserver {
    ctx: Rc<ReactiveContext>,
    collection: Rc<CollectionObserver>,
    subscribers: SubscriberSet,
    last: Cell<usize>,
    self_weak: Weak<CollectionSizeObserver>,
}

impl CollectionSizeObserver {
    pub(crate) fn new(ctx: Rc<ReactiveContext>, collection: Rc<CollectionObserver>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            ctx,
            last: Cell::new(collection.len()),
            collection,
            subscribers: SubscriberSet::new(),
            self_weak: self_weak.clone(),
        })
    }

    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.self_weak.upgrade().map(|me| me as Rc<dyn Subscriber>)
    }
}

impl Observer for CollectionSizeObserver {
    fn get_value(&self) -> Result<Value> {
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.observe(me);
        }
        Ok(Value::from(self.collection.len()))
    }

    /// Arrays accept a new length (truncating or padding with `Undefined`).
    fn set_value(&self, value: Value) -> Result<()> {
        let Some(Value::Array(array)) = self.collection.collection() else {
            return Err(ReactiveError::ReadOnly("size".into()));
        };
        let Some(length) = value.as_number().filter(|n| *n >= 0.0 && n.fract() == 0.0) else {
            return Err(ReactiveError::evaluation("length", "invalid array length"));
        };
        let length = length as usize;
        let current = array.len();
        if length < current {
            array.splice(length, current - length, std::iter::empty());
        } else if length > current {
            array.splice(current, 0, std::iter::repeat_n(Value::Undefined, length - current));
        }
        Ok(())
    }

    fn subscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let first = !self.subscribers.any();
        let added = self.subscribers.add(subscriber);
        if added && first {
            self.last.set(self.collection.len());
            if let Some(me) = self.as_subscriber() {
                self.collection.subscribe(&me);
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && !self.subscribers.any() {
            if let Some(me) = self.as_subscriber() {
                self.collection.unsubscribe(&me);
            }
        }
        removed
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn capabilities(&self) -> u32 {
        match self.collection.collection() {
            Some(Value::Array(_)) => READABLE | WRITABLE | OBSERVABLE,
            _ => READABLE | OBSERVABLE,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Subscriber for CollectionSizeObserver {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        Ok(())
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        let new = self.collection.len();
        let old = self.last.replace(new);
        if new == old {
            return Ok(());
        }
        self.subscribers.notify(&Value::from(new), &Value::from(old))
    }
}

// =============================================================================
// ARRAY INDEX OBSERVER
// =============================================================================

/// One position of an array (`items[2]`).
pub struct ArrayIndexObserver {
    ctx: Rc<ReactiveContext>,
    collection: Rc<CollectionObserver>,
    index: usize,
    subscribers: SubscriberSet,
    last: RefCell<Value>,
    self_weak: Weak<ArrayIndexObserver>,
}

impl ArrayIndexObserver {
    pub(crate) fn new(
        ctx: Rc<ReactiveContext>,
        collection: Rc<CollectionObserver>,
        index: usize,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            ctx,
            collection,
            index,
            subscribers: SubscriberSet::new(),
            last: RefCell::new(Value::Undefined),
            self_weak: self_weak.clone(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn current(&self) -> Value {
        match self.collection.collection() {
            Some(Value::Array(array)) => array.get(self.index).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.self_weak.upgrade().map(|me| me as Rc<dyn Subscriber>)
    }
}

impl Observer for ArrayIndexObserver {
    fn get_value(&self) -> Result<Value> {
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.observe(me);
        }
        Ok(self.current())
    }

    fn set_value(&self, value: Value) -> Result<()> {
        match self.collection.collection() {
            Some(array @ Value::Array(_)) => array.set_property(&self.index.to_string(), value),
            _ => Ok(()),
        }
    }

    fn subscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let first = !self.subscribers.any();
        let added = self.subscribers.add(subscriber);
        if added && first {
            *self.last.borrow_mut() = self.current();
            if let Some(me) = self.as_subscriber() {
                self.collection.subscribe(&me);
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && !self.subscribers.any() {
            if let Some(me) = self.as_subscriber() {
                self.collection.unsubscribe(&me);
            }
        }
        removed
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn capabilities(&self) -> u32 {
        PROPERTY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Subscriber for ArrayIndexObserver {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        Ok(())
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        let new = self.current();
        let old = self.last.replace(new.clone());
        if !has_changed(&new, &old) {
            return Ok(());
        }
        self.subscribers.notify(&new, &old)
    }
}

// =============================================================================
// TESTS
// =============================================================================
