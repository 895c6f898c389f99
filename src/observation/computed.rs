// ============================================================================
// spark-bindings - Computed Observer
// Observes an accessor slot by tracking what its getter reads
// ============================================================================
//
// While the observer has subscribers it is "connected": the getter runs as
// its own tracking frame, so the observer subscribes to exactly the
// observers the getter read last time. A dependency change recomputes the
// value and notifies only if it differs. With no subscribers the observer
// holds no subscriptions at all and every read recomputes untracked.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::locator::ObserverLocator;
use crate::collections::IndexMap;
use crate::core::constants::*;
use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::{Connectable, Observer, PropertyReader, RawReader, Subscriber};
use crate::core::value::{Getter, Object, Setter, Value, WeakObject};
use crate::reactivity::equality::has_changed;
use crate::reactivity::subscribers::SubscriberSet;
use crate::reactivity::tracking::ObserverRecord;

pub struct ComputedObserver {
    ctx: Rc<ReactiveContext>,
    locator: Weak<ObserverLocator>,
    target: WeakObject,
    key: Rc<str>,
    getter: Getter,
    setter: Option<Setter>,
    subscribers: SubscriberSet,
    record: ObserverRecord,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    computing: Cell<bool>,
    self_weak: Weak<ComputedObserver>,
}

impl ComputedObserver {
    pub(crate) fn new(
        ctx: Rc<ReactiveContext>,
        locator: Weak<ObserverLocator>,
        target: &Object,
        key: &str,
        getter: Getter,
        setter: Option<Setter>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            ctx,
            locator,
            target: target.downgrade(),
            key: Rc::from(key),
            getter,
            setter,
            subscribers: SubscriberSet::new(),
            record: ObserverRecord::new(),
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(true),
            computing: Cell::new(false),
            self_weak: self_weak.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of observers the getter currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.record.count()
    }

    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.self_weak.upgrade().map(|me| me as Rc<dyn Subscriber>)
    }

    fn run_getter(&self, target: &Object) -> Result<Value> {
        match self.locator.upgrade() {
            Some(locator) => (self.getter)(target, &*locator as &dyn PropertyReader),
            None => (self.getter)(target, &RawReader),
        }
    }

    /// Run the getter, refreshing subscriptions when connected.
    fn compute(&self) -> Result<Value> {
        let Some(target) = self.target.upgrade() else {
            return Ok(Value::Undefined);
        };
        if self.computing.get() {
            // Self-referencing getter: answer with the last value
            return Ok(self.value.borrow().clone());
        }
        self.computing.set(true);

        let result = match (self.subscribers.any(), self.self_weak.upgrade()) {
            (true, Some(me)) => {
                self.record.begin();
                let frame: Rc<dyn Connectable> = me.clone();
                let result = self.ctx.tracker.track(frame, || self.run_getter(&target));
                if result.is_ok() {
                    let subscriber: Rc<dyn Subscriber> = me;
                    self.record.clear_stale(&subscriber);
                }
                result
            }
            _ => self.ctx.untracked(|| self.run_getter(&target)),
        };
        self.computing.set(false);

        let value = result?;
        *self.value.borrow_mut() = value.clone();
        self.dirty.set(false);
        Ok(value)
    }

    fn recompute_and_notify(&self, force: bool) -> Result<()> {
        if !self.subscribers.any() {
            self.dirty.set(true);
            return Ok(());
        }
        let old = self.value.borrow().clone();
        let new = self.compute()?;
        if force || has_changed(&new, &old) {
            tracing::trace!(key = %self.key, "computed value changed");
            self.subscribers.notify(&new, &old)?;
        }
        Ok(())
    }
}

impl Observer for ComputedObserver {
    fn get_value(&self) -> Result<Value> {
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.observe(me);
        }
        if self.subscribers.any() && !self.dirty.get() {
            return Ok(self.value.borrow().clone());
        }
        self.compute()
    }

    fn set_value(&self, value: Value) -> Result<()> {
        let Some(setter) = &self.setter else {
            return Err(ReactiveError::ReadOnly(self.key.to_string()));
        };
        match self.target.upgrade() {
            Some(target) => setter(&target, value),
            None => Ok(()),
        }
    }

    fn subscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let first = !self.subscribers.any();
        let added = self.subscribers.add(subscriber);
        if added && first {
            // Connect: compute once inside our own frame to collect dependencies
            self.dirty.set(true);
            if let Err(err) = self.compute() {
                self.ctx.errors.report_unhandled(err);
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && !self.subscribers.any() {
            if let Some(me) = self.as_subscriber() {
                self.record.clear_all(&me);
            }
            self.dirty.set(true);
        }
        removed
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn capabilities(&self) -> u32 {
        let writable = if self.setter.is_some() { WRITABLE } else { 0 };
        READABLE | OBSERVABLE | COMPUTED | writable
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Connectable for ComputedObserver {
    fn observe(&self, observer: Rc<dyn Observer>) {
        if let Some(me) = self.as_subscriber() {
            self.record.observe(observer, &me);
        }
    }
}

impl Subscriber for ComputedObserver {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        self.recompute_and_notify(false)
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        // Same collection identity, different contents
        self.recompute_and_notify(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Spy {
        seen: RefCell<Vec<Value>>,
    }

    impl Subscriber for Spy {
        fn handle_change(&self, new_value: &Value, _: &Value) -> Result<()> {
            self.seen.borrow_mut().push(new_value.clone());
            Ok(())
        }
    }

    fn person() -> Object {
        let obj = Object::from_entries([("first", "Ada"), ("last", "Lovelace"), ("formal", "no")]);
        obj.define_accessor(
            "display",
            |this, reader| {
                let target = Value::Object(this.clone());
                let first = reader.read(&target, "first")?;
                if reader.read(&target, "formal")?.as_str() == Some("yes") {
                    let last = reader.read(&target, "last")?;
                    return Ok(Value::from(format!(
                        "{} {}",
                        first.as_str().unwrap_or_default(),
                        last.as_str().unwrap_or_default()
                    )));
                }
                Ok(first)
            },
            None,
        );
        obj
    }

    fn display_observer(obj: &Object) -> (Rc<ObserverLocator>, Rc<dyn Observer>) {
        let (ctx, _) = ReactiveContext::manual();
        let locator = ObserverLocator::new(ctx);
        let observer = locator
            .get_observer(&Value::Object(obj.clone()), "display")
            .unwrap();
        (locator, observer)
    }

    #[test]
    fn unsubscribed_reads_recompute() {
        let obj = person();
        let (_locator, observer) = display_observer(&obj);
        assert_eq!(observer.get_value().unwrap(), Value::from("Ada"));
        obj.set("first", Value::from("Grace")).unwrap();
        assert_eq!(observer.get_value().unwrap(), Value::from("Grace"));
        assert!(observer.capabilities() & COMPUTED != 0);
        assert!(!observer.is_writable());
    }

    #[test]
    fn connected_observer_tracks_dynamic_dependencies() {
        let obj = person();
        let (_locator, observer) = display_observer(&obj);
        let computed = observer.as_any().downcast_ref::<ComputedObserver>().unwrap();

        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        observer.subscribe(&spy_dyn);
        assert_eq!(computed.dependency_count(), 2);

        // `last` is not a dependency yet
        obj.set("last", Value::from("Byron")).unwrap();
        assert!(spy.seen.borrow().is_empty());

        obj.set("formal", Value::from("yes")).unwrap();
        assert_eq!(*spy.seen.borrow(), vec![Value::from("Ada Byron")]);
        assert_eq!(computed.dependency_count(), 3);

        obj.set("last", Value::from("Lovelace")).unwrap();
        assert_eq!(spy.seen.borrow().len(), 2);
    }

    #[test]
    fn unchanged_result_does_not_notify() {
        let obj = person();
        let (_locator, observer) = display_observer(&obj);
        let spy = Rc::new(Spy::default());
        let spy_dyn: Rc<dyn Subscriber> = spy.clone();
        observer.subscribe(&spy_dyn);

        // formal flips to another non-"yes" value: display stays "Ada"
        obj.set("formal", Value::from("nope")).unwrap();
        assert!(spy.seen.borrow().is_empty());
    }

    #[test]
    fn last_unsubscribe_disconnects() {
        let obj = person();
        let (_locator, observer) = display_observer(&obj);
        let computed = observer.as_any().downcast_ref::<ComputedObserver>().unwrap();
        let spy: Rc<dyn Subscriber> = Rc::new(Spy::default());

        observer.subscribe(&spy);
        assert!(computed.dependency_count() > 0);
        observer.unsubscribe(&spy);
        assert_eq!(computed.dependency_count(), 0);
    }

    #[test]
    fn setter_and_read_only() {
        let obj = Object::from_entries([("celsius", 0)]);
        obj.define_accessor(
            "fahrenheit",
            |this, reader| {
                let c = reader.read(&Value::Object(this.clone()), "celsius")?;
                Ok(Value::from(c.as_number().unwrap_or(0.0) * 9.0 / 5.0 + 32.0))
            },
            Some(Rc::new(|this: &Object, v: Value| {
                let f = v.as_number().unwrap_or(32.0);
                this.set("celsius", Value::from((f - 32.0) * 5.0 / 9.0))
            })),
        );
        let (ctx, _) = ReactiveContext::manual();
        let locator = ObserverLocator::new(ctx);
        let observer = locator
            .get_observer(&Value::Object(obj.clone()), "fahrenheit")
            .unwrap();

        assert!(observer.is_writable());
        observer.set_value(Value::from(212)).unwrap();
        assert_eq!(obj.get("celsius").unwrap(), Value::from(100));
        assert_eq!(observer.get_value().unwrap(), Value::from(212));
    }
}
