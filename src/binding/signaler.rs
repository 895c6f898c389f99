// ============================================================================
// spark-bindings - Signaler
// Named external triggers for signal and update-trigger interceptors
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::core::error::Result;
use crate::core::types::Subscriber;
use crate::core::value::Value;
use crate::reactivity::subscribers::SubscriberSet;

/// Named channels. `dispatch(name)` calls `handle_change` on every listener
/// of that name, with `name` as the new value.
///
/// ```
/// use spark_bindings::{Signaler, Subscriber, Value, Result};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Hits(Cell<u32>);
/// impl Subscriber for Hits {
///     fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
///         self.0.set(self.0.get() + 1);
///         Ok(())
///     }
/// }
///
/// let signaler = Signaler::new();
/// let hits = Rc::new(Hits(Cell::new(0)));
/// let listener: Rc<dyn Subscriber> = hits.clone();
/// signaler.add_listener("locale-changed", &listener);
/// signaler.dispatch("locale-changed").unwrap();
/// signaler.dispatch("unrelated").unwrap();
/// assert_eq!(hits.0.get(), 1);
/// ```
#[derive(Default)]
pub struct Signaler {
    channels: RefCell<AHashMap<Rc<str>, Rc<SubscriberSet>>>,
}

impl Signaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, name: &str, listener: &Rc<dyn Subscriber>) -> bool {
        let set = self
            .channels
            .borrow_mut()
            .entry(Rc::from(name))
            .or_insert_with(|| Rc::new(SubscriberSet::new()))
            .clone();
        set.add(listener)
    }

    pub fn remove_listener(&self, name: &str, listener: &Rc<dyn Subscriber>) -> bool {
        let mut channels = self.channels.borrow_mut();
        let Some(set) = channels.get(name) else {
            return false;
        };
        let removed = set.remove(listener);
        if set.is_empty() {
            channels.remove(name);
        }
        removed
    }

    /// Notify every listener of `name`. Errors are collected across the pass.
    pub fn dispatch(&self, name: &str) -> Result<()> {
        // Clone the set out so listeners may (un)register during dispatch
        let set = self.channels.borrow().get(name).cloned();
        let Some(set) = set else {
            return Ok(());
        };
        tracing::debug!(signal = name, listeners = set.len(), "signal dispatched");
        let signal = Value::from(name);
        set.notify(&signal, &Value::Undefined)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.channels.borrow().get(name).map_or(0, |set| set.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
