// ============================================================================
// spark-bindings - Property Observers
// Scalar observers over plain object slots and primitive values
// ============================================================================

use std::any::Any;
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::ReactiveContext;
use crate::core::error::Result;
use crate::core::types::{Observer, SlotWatcher, Subscriber};
use crate::core::value::{Object, Value, WeakObject};
use crate::reactivity::equality::same_value;
use crate::reactivity::subscribers::SubscriberSet;

// =============================================================================
// PROPERTY OBSERVER
// =============================================================================

/// Observes one data slot of an object.
///
/// Installed as the slot's watcher at creation, so every `Object::set` on
/// that key reaches it. Writes of the same value (by `same_value`) do not
/// notify. The target is held weakly; once it is gone reads give
/// `Undefined` and writes are ignored.
pub struct PropertyObserver {
    ctx: Rc<ReactiveContext>,
    target: WeakObject,
    key: Rc<str>,
    subscribers: SubscriberSet,
    self_weak: Weak<PropertyObserver>,
}

impl PropertyObserver {
    pub(crate) fn new(ctx: Rc<ReactiveContext>, target: &Object, key: &str) -> Rc<Self> {
        let observer = Rc::new_cyclic(|self_weak| Self {
            ctx,
            target: target.downgrade(),
            key: Rc::from(key),
            subscribers: SubscriberSet::new(),
            self_weak: self_weak.clone(),
        });
        let watcher: Weak<dyn SlotWatcher> = Rc::downgrade(&observer) as Weak<dyn SlotWatcher>;
        target.watch(key, watcher);
        observer
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> Option<Object> {
        self.target.upgrade()
    }

    /// Stop watching the slot. Other engines' watchers stay installed.
    pub(crate) fn detach(&self) {
        if let Some(target) = self.target.upgrade() {
            let watcher: Weak<dyn SlotWatcher> = self.self_weak.clone();
            target.unwatch(&self.key, &watcher);
        }
    }
}

impl Observer for PropertyObserver {
    fn get_value(&self) -> Result<Value> {
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.observe(me);
        }
        match self.target.upgrade() {
            Some(target) => target.get(&self.key),
            None => Ok(Value::Undefined),
        }
    }

    fn set_value(&self, value: Value) -> Result<()> {
        match self.target.upgrade() {
            // The slot watcher (this observer) is told about the write
            Some(target) => target.set(&self.key, value),
            None => Ok(()),
        }
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
        PROPERTY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl SlotWatcher for PropertyObserver {
    fn slot_changed(&self, new_value: &Value, old_value: &Value) -> Result<()> {
        if same_value(new_value, old_value) {
            return Ok(());
        }
        tracing::trace!(key = %self.key, "property changed");
        // Errors go to the engine's sink when one is installed, else to the writer
        self.ctx.errors.surface(self.subscribers.notify(new_value, old_value))
    }
}

// =============================================================================
// PRIMITIVE OBSERVER
// =============================================================================

/// Read-only view of a property of a primitive (e.g. a string's `length`).
/// Primitives never change, so this never notifies and is never cached.
pub struct PrimitiveObserver {
    value: Value,
    key: Rc<str>,
}

impl PrimitiveObserver {
    pub(crate) fn new(target: &Value, key: &str) -> Result<Rc<Self>> {
        Ok(Rc::new(Self {
            value: target.get_property(key)?,
            key: Rc::from(key),
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Observer for PrimitiveObserver {
    fn get_value(&self) -> Result<Value> {
        Ok(self.value.clone())
    }

    fn set_value(&self, _: Value) -> Result<()> {
        Err(crate::core::error::ReactiveError::ReadOnly(self.key.to_string()))
    }

    fn subscribe(&self, _: &Rc<dyn Subscriber>) -> bool {
        false
    }

    fn unsubscribe(&self, _: &Rc<dyn Subscriber>) -> bool {
        false
    }

    fn subscriber_count(&self) -> usize {
        0
    }

    fn capabilities(&self) -> u32 {
        READABLE
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
    use crate::core::error::ReactiveError;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Spy {
        calls: Cell<u32>,
        last: RefCell<Option<(Value, Value)>>,
    }

    impl Subscriber for Spy {
        fn handle_change(&self, new_value: &Value, old_value: &Value) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            *self.last.borrow_mut() = Some((new_value.clone(), old_value.clone()));
            Ok(())
        }
    }

    #[test]
    fn notifies_on_write_with_new_and_old() {
        let (ctx, _) = ReactiveContext::manual();
        let obj = Object::from_entries([("count", 0)]);
        let observer = PropertyObserver::new(ctx, &obj, "count");
        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        assert!(observer.subscribe(&spy_dyn));

        obj.set("count", Value::from(5)).unwrap();
        assert_eq!(spy.calls.get(), 1);
        assert_eq!(
            *spy.last.borrow(),
            Some((Value::from(5), Value::from(0)))
        );

        observer.set_value(Value::from(6)).unwrap();
        assert_eq!(spy.calls.get(), 2);
        assert_eq!(obj.get("count").unwrap(), Value::from(6));
    }

    struct Failing;

    impl Subscriber for Failing {
        fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
            Err(ReactiveError::evaluation("failing", "boom"))
        }
    }

    #[test]
    fn subscriber_error_without_sink_reaches_writer() {
        let (ctx, _) = ReactiveContext::manual();
        let obj = Object::from_entries([("a", 1)]);
        let observer = PropertyObserver::new(ctx, &obj, "a");
        let failing: Rc<dyn Subscriber> = Rc::new(Failing);
        observer.subscribe(&failing);

        let result = obj.set("a", Value::from(2));
        assert!(matches!(result, Err(ReactiveError::Evaluation { .. })));
    }

    #[test]
    fn subscriber_error_goes_to_sink_when_installed() {
        let (ctx, _) = ReactiveContext::manual();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.errors
            .set_sink(Some(Rc::new(move |err: &ReactiveError| sink.borrow_mut().push(err.clone()))));
        let obj = Object::from_entries([("a", 1)]);
        let observer = PropertyObserver::new(ctx, &obj, "a");
        let failing: Rc<dyn Subscriber> = Rc::new(Failing);
        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        observer.subscribe(&failing);
        observer.subscribe(&spy_dyn);

        assert!(obj.set("a", Value::from(2)).is_ok());
        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(seen.borrow()[0], ReactiveError::Evaluation { .. }));
        // The rest of the pass still ran
        assert_eq!(spy.calls.get(), 1);
    }

    #[test]
    fn detach_leaves_other_watchers() {
        let (ctx, _) = ReactiveContext::manual();
        let obj = Object::from_entries([("a", 1)]);
        let first = PropertyObserver::new(ctx.clone(), &obj, "a");
        let second = PropertyObserver::new(ctx, &obj, "a");
        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        second.subscribe(&spy_dyn);
        assert_eq!(obj.watcher_count("a"), 2);

        first.detach();
        assert_eq!(obj.watcher_count("a"), 1);
        obj.set("a", Value::from(2)).unwrap();
        assert_eq!(spy.calls.get(), 1);
    }

    #[test]
    fn same_value_write_is_silent() {
        let (ctx, _) = ReactiveContext::manual();
        let obj = Object::from_entries([("n", f64::NAN)]);
        let observer = PropertyObserver::new(ctx, &obj, "n");
        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        observer.subscribe(&spy_dyn);

        obj.set("n", Value::Number(f64::NAN)).unwrap();
        assert_eq!(spy.calls.get(), 0);
    }

    #[test]
    fn unsubscribed_spy_hears_nothing() {
        let (ctx, _) = ReactiveContext::manual();
        let obj = Object::from_entries([("a", 1)]);
        let observer = PropertyObserver::new(ctx, &obj, "a");
        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        observer.subscribe(&spy_dyn);
        assert!(observer.unsubscribe(&spy_dyn));
        assert_eq!(observer.subscriber_count(), 0);

        obj.set("a", Value::from(2)).unwrap();
        assert_eq!(spy.calls.get(), 0);
    }

    #[test]
    fn dead_target_reads_undefined() {
        let (ctx, _) = ReactiveContext::manual();
        let obj = Object::from_entries([("a", 1)]);
        let observer = PropertyObserver::new(ctx, &obj, "a");
        drop(obj);
        assert_eq!(observer.get_value().unwrap(), Value::Undefined);
        assert!(observer.set_value(Value::from(1)).is_ok());
        assert!(observer.target().is_none());
    }

    #[test]
    fn primitive_observer_is_constant() {
        let observer = PrimitiveObserver::new(&Value::from("abc"), "length").unwrap();
        assert_eq!(observer.get_value().unwrap(), Value::from(3));
        assert_eq!(
            observer.set_value(Value::from(1)),
            Err(ReactiveError::ReadOnly("length".into()))
        );
        assert_eq!(observer.capabilities() & OBSERVABLE, 0);
    }
}
