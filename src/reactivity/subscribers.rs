// ============================================================================
// spark-bindings - Subscriber Set
// Compact multi-subscriber registry attached to every observable
// ============================================================================
//
// Most observables have between zero and three subscribers, so entries live
// inline in a SmallVec and only spill to the heap beyond that. Subscribers
// are held weakly: the owner of a subscriber (a binding, an effect handle)
// decides its lifetime, and a dropped subscriber silently leaves every set.
//
// Notification iterates a snapshot taken at pass start. A subscriber that
// removes itself or another during the pass still gets exactly the one call
// it was owed; a subscriber added during the pass waits for the next pass.
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::collections::IndexMap;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::{Subscriber, rc_addr, weak_addr};
use crate::core::value::Value;

type Entries = SmallVec<[Weak<dyn Subscriber>; 3]>;

/// Ordered, deduplicated set of weakly held subscribers.
///
/// # Example
///
/// ```
/// use spark_bindings::{Result, Subscriber, SubscriberSet, Value};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Count(Cell<u32>);
/// impl Subscriber for Count {
///     fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
///         self.0.set(self.0.get() + 1);
///         Ok(())
///     }
/// }
///
/// let set = SubscriberSet::new();
/// let sub = Rc::new(Count(Cell::new(0)));
/// let as_dyn: Rc<dyn Subscriber> = sub.clone();
///
/// assert!(set.add(&as_dyn));
/// assert!(!set.add(&as_dyn));
/// set.notify(&Value::from(1), &Value::from(0)).unwrap();
/// assert_eq!(sub.0.get(), 1);
/// ```
#[derive(Default)]
pub struct SubscriberSet {
    entries: RefCell<Entries>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns true if it was not already present.
    pub fn add(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let addr = rc_addr(subscriber);
        let mut entries = self.entries.borrow_mut();
        entries.retain(|w| w.strong_count() > 0);
        if entries.iter().any(|w| weak_addr(w) == addr) {
            return false;
        }
        entries.push(Rc::downgrade(subscriber));
        true
    }

    /// Remove a subscriber, keeping the order of the rest. Returns true if
    /// it was present.
    pub fn remove(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let addr = rc_addr(subscriber);
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|w| weak_addr(w) == addr) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let addr = rc_addr(subscriber);
        self.entries
            .borrow()
            .iter()
            .any(|w| weak_addr(w) == addr && w.strong_count() > 0)
    }

    /// True if at least one live subscriber is present.
    pub fn any(&self) -> bool {
        self.entries.borrow().iter().any(|w| w.strong_count() > 0)
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        !self.any()
    }

    /// Drop entries whose subscriber no longer exists.
    pub fn prune(&self) {
        self.entries.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    /// Live subscribers in insertion order.
    pub fn snapshot(&self) -> Vec<Rc<dyn Subscriber>> {
        self.entries.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    /// Tell every subscriber present now about a scalar change.
    ///
    /// Failures do not stop the pass; they are returned together afterwards.
    pub fn notify(&self, new_value: &Value, old_value: &Value) -> Result<()> {
        self.notify_each(|subscriber| subscriber.handle_change(new_value, old_value))
    }

    /// Tell every subscriber present now about a collection change.
    pub fn notify_collection(&self, index_map: &IndexMap) -> Result<()> {
        self.notify_each(|subscriber| subscriber.handle_collection_change(index_map))
    }

    fn notify_each(&self, mut call: impl FnMut(&Rc<dyn Subscriber>) -> Result<()>) -> Result<()> {
        // Snapshot first: the borrow must be released before calling out
        let subscribers = self.snapshot();
        let mut errors = Vec::new();
        for subscriber in &subscribers {
            if let Err(err) = call(subscriber) {
                errors.push(err);
            }
        }
        ReactiveError::collect(errors)
    }
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
