// ============================================================================
// spark-bindings - Type Definitions
// Type-erased traits for the observation graph
// ============================================================================

use std::any::Any;
use std::rc::{Rc, Weak};

use super::constants::*;
use super::error::Result;
use super::value::Value;
use crate::collections::{IndexMap, Mutation};

// =============================================================================
// TYPE-ERASED TRAITS
// =============================================================================
//
// Graph operations (subscribe, notify, track) never need to know which kind
// of observer or binding sits behind a handle. Observers are stored as
// Rc<dyn Observer> in caches and dependency records, subscribers as
// Weak<dyn Subscriber> in subscriber sets.
// =============================================================================

/// Anything that can receive a change notification: a binding relay, a
/// computed observer, an effect, a signal listener.
pub trait Subscriber {
    /// A scalar observable changed from `old_value` to `new_value`.
    fn handle_change(&self, new_value: &Value, old_value: &Value) -> Result<()>;

    /// A collection observable flushed its accumulated change descriptor.
    fn handle_collection_change(&self, index_map: &IndexMap) -> Result<()> {
        let _ = index_map;
        Ok(())
    }
}

/// The uniform getValue/setValue/subscribe shape shared by model observers
/// and target accessors.
pub trait Observer: Any {
    /// Read the current value. Inside an active tracker the read is recorded.
    fn get_value(&self) -> Result<Value>;

    /// Write a new value.
    fn set_value(&self, value: Value) -> Result<()>;

    /// Add a subscriber. Returns true if it was not already present.
    fn subscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool;

    /// Remove a subscriber. Returns true if it was present.
    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool;

    /// Number of live subscribers.
    fn subscriber_count(&self) -> usize;

    /// Capability bitmask (READABLE, WRITABLE, OBSERVABLE, ...)
    fn capabilities(&self) -> u32;

    /// Upcast to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    fn is_observable(&self) -> bool {
        self.capabilities() & OBSERVABLE != 0
    }

    fn is_writable(&self) -> bool {
        self.capabilities() & WRITABLE != 0
    }
}

/// A tracking context: receives every observer read while it is the
/// innermost active entry of the dependency tracker.
pub trait Connectable {
    fn observe(&self, observer: Rc<dyn Observer>);
}

/// A unit of deferred work held by the flush queue.
pub trait Flushable {
    fn flush(&self) -> Result<()>;
}

/// Reads a property of a host value. Getters receive one of these so their
/// reads can be tracked (observer locator) or not (raw reader).
pub trait PropertyReader {
    fn read(&self, target: &Value, key: &str) -> Result<Value>;
}

/// Installed on an object slot by the observer locator; told about every
/// write made through `Object::set`.
pub trait SlotWatcher {
    fn slot_changed(&self, new_value: &Value, old_value: &Value) -> Result<()>;
}

/// Installed on a collection by the observer locator; told about every
/// mutation made through the collection's methods.
pub trait CollectionHook {
    fn collection_mutated(&self, mutation: Mutation);
}

// =============================================================================
// IDENTITY HELPERS
// =============================================================================

/// Address of the allocation behind an `Rc`, ignoring trait-object metadata.
pub fn rc_addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Address of the allocation behind a `Weak`. Stable while the weak exists.
pub fn weak_addr<T: ?Sized>(weak: &Weak<T>) -> usize {
    Weak::as_ptr(weak) as *const () as usize
}

// =============================================================================
// RAW READER
// =============================================================================

/// Reads properties directly, without involving observers or the tracker.
pub struct RawReader;

impl PropertyReader for RawReader {
    fn read(&self, target: &Value, key: &str) -> Result<Value> {
        target.get_property(key)
    }
}

// =============================================================================
// TESTS
// =============================================================================
