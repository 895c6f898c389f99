// ============================================================================
// spark-bindings - Target Accessors
// View-side targets with the same shape as an observer
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::constants::*;
use crate::core::error::Result;
use crate::core::types::{Observer, Subscriber};
use crate::core::value::Value;
use crate::reactivity::subscribers::SubscriberSet;

type Callback = Box<dyn Fn(&Value)>;

/// A host-owned target slot (think element property).
///
/// `set_value` is the binding writing *to* the view: it stores the value and
/// runs the render callback but does not notify. `emit` is the view changing
/// on its own (user input): it stores and notifies subscribers, which is
/// what drives from-target bindings.
///
/// ```
/// use spark_bindings::{CallbackAccessor, Observer, Value};
///
/// let input = CallbackAccessor::new();
/// input.set_value(Value::from("hi")).unwrap();
/// assert_eq!(input.get_value().unwrap(), Value::from("hi"));
/// assert!(input.is_observable());
/// ```
pub struct CallbackAccessor {
    value: RefCell<Value>,
    on_set: Option<Callback>,
    subscribers: SubscriberSet,
    observable: bool,
}

impl CallbackAccessor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::build(None, true))
    }

    /// A target that renders through `on_set`.
    pub fn with_callback(on_set: impl Fn(&Value) + 'static) -> Rc<Self> {
        Rc::new(Self::build(Some(Box::new(on_set)), true))
    }

    /// A write-only target with no change notification, e.g. `textContent`.
    pub fn unobservable() -> Rc<Self> {
        Rc::new(Self::build(None, false))
    }

    fn build(on_set: Option<Callback>, observable: bool) -> Self {
        Self {
            value: RefCell::new(Value::Undefined),
            on_set,
            subscribers: SubscriberSet::new(),
            observable,
        }
    }

    /// Simulate the view changing the value itself.
    pub fn emit(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let old = self.value.replace(value.clone());
        self.subscribers.notify(&value, &old)
    }

    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }
}

impl Observer for CallbackAccessor {
    fn get_value(&self) -> Result<Value> {
        Ok(self.value.borrow().clone())
    }

    fn set_value(&self, value: Value) -> Result<()> {
        *self.value.borrow_mut() = value.clone();
        if let Some(on_set) = &self.on_set {
            on_set(&value);
        }
        Ok(())
    }

    fn subscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.observable && self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn capabilities(&self) -> u32 {
        if self.observable {
            READABLE | WRITABLE | OBSERVABLE
        } else {
            READABLE | WRITABLE
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Count(Cell<u32>);

    impl Subscriber for Count {
        fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn set_value_renders_without_notifying() {
        let rendered = Rc::new(RefCell::new(Vec::new()));
        let sink = rendered.clone();
        let accessor = CallbackAccessor::with_callback(move |v| sink.borrow_mut().push(v.clone()));
        let spy = Rc::new(Count(Cell::new(0)));
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        accessor.subscribe(&spy_dyn);

        accessor.set_value(Value::from(1)).unwrap();
        assert_eq!(*rendered.borrow(), vec![Value::from(1)]);
        assert_eq!(spy.0.get(), 0);

        accessor.emit(2).unwrap();
        assert_eq!(spy.0.get(), 1);
        assert_eq!(accessor.value(), Value::from(2));
    }

    #[test]
    fn unobservable_rejects_subscribers() {
        let accessor = CallbackAccessor::unobservable();
        let spy: Rc<dyn Subscriber> = Rc::new(Count(Cell::new(0)));
        assert!(!accessor.subscribe(&spy));
        assert!(!accessor.is_observable());
        assert!(accessor.is_writable());
    }
}
