use proptest::prelude::*;
use spark_bindings::binding::expression::scope;
use spark_bindings::{
    Binding, BindingMode, Engine, IndexMap, Object, Observer, ReactiveVec, Result, Scope,
    Subscriber, SubscriberSet, Value,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct Counter {
    changes: Cell<usize>,
    maps: RefCell<Vec<IndexMap>>,
}

impl Subscriber for Counter {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        self.changes.set(self.changes.get() + 1);
        Ok(())
    }

    fn handle_collection_change(&self, index_map: &IndexMap) -> Result<()> {
        self.maps.borrow_mut().push(index_map.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
    Shift,
    Unshift(i32),
    Splice(usize, usize, Vec<i32>),
    Set(usize, i32),
    Sort,
    Reverse,
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<i32>().prop_map(Op::Push),
        2 => Just(Op::Pop),
        1 => Just(Op::Shift),
        2 => any::<i32>().prop_map(Op::Unshift),
        4 => (0usize..8, 0usize..4, prop::collection::vec(any::<i32>(), 0..4))
            .prop_map(|(start, count, items)| Op::Splice(start, count, items)),
        2 => (0usize..8, any::<i32>()).prop_map(|(i, v)| Op::Set(i, v)),
        1 => Just(Op::Sort),
        1 => Just(Op::Reverse),
        1 => Just(Op::Clear),
    ]
}

fn apply_op(items: &ReactiveVec, op: &Op) {
    match op {
        Op::Push(v) => {
            items.push(Value::from(*v));
        }
        Op::Pop => {
            items.pop();
        }
        Op::Shift => {
            items.shift();
        }
        Op::Unshift(v) => items.unshift(Value::from(*v)),
        Op::Splice(start, count, new) => {
            items.splice(*start, *count, new.iter().map(|v| Value::from(*v)));
        }
        Op::Set(index, v) => {
            items.set(*index, Value::from(*v));
        }
        Op::Sort => items.sort_by(|a, b| {
            a.as_number()
                .unwrap_or(0.0)
                .total_cmp(&b.as_number().unwrap_or(0.0))
        }),
        Op::Reverse => items.reverse(),
        Op::Clear => items.clear(),
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Reconstructing the new order from the old one through the net index
    /// map always yields the collection's current contents.
    #[test]
    fn index_map_rebuilds_current_order(
        initial in prop::collection::vec(any::<i32>(), 0..6),
        ops in prop::collection::vec(op(), 1..12),
    ) {
        let engine = Engine::new();
        let items = ReactiveVec::from_values(initial.iter().map(|v| Value::from(*v)));
        let observer = engine.collection_observer(&Value::from(items.clone())).unwrap();
        let counter = Rc::new(Counter::default());
        let subscriber: Rc<dyn Subscriber> = counter.clone();
        observer.subscribe(&subscriber);

        let old = items.to_vec();
        for op in &ops {
            apply_op(&items, op);
        }
        engine.flush().unwrap();

        let maps = counter.maps.borrow();
        prop_assert!(maps.len() <= 1);
        match maps.first() {
            Some(map) => {
                prop_assert!(map.validate());
                prop_assert_eq!(map.len(), items.len());
                prop_assert_eq!(map.apply(&old, &items.to_vec()), items.to_vec());
                prop_assert_eq!(
                    map.entries().iter().flatten().count() + map.deleted_indices().len(),
                    old.len()
                );
            }
            None => {
                prop_assert_eq!(old, items.to_vec());
            }
        }
    }

    /// A subscriber set holds each member once, whatever the add/remove order,
    /// and a notification reaches each member exactly once.
    #[test]
    fn subscriber_set_is_stable(
        actions in prop::collection::vec((0usize..5, any::<bool>()), 0..40),
    ) {
        let members: Vec<Rc<Counter>> = (0..5).map(|_| Rc::new(Counter::default())).collect();
        let handles: Vec<Rc<dyn Subscriber>> = members
            .iter()
            .map(|m| m.clone() as Rc<dyn Subscriber>)
            .collect();
        let set = SubscriberSet::new();
        let mut expected = [false; 5];

        for (who, add) in actions {
            if add {
                prop_assert_eq!(set.add(&handles[who]), !expected[who]);
            } else {
                prop_assert_eq!(set.remove(&handles[who]), expected[who]);
            }
            expected[who] = add;
        }

        prop_assert_eq!(set.len(), expected.iter().filter(|e| **e).count());
        set.notify(&Value::from(1), &Value::from(0)).unwrap();
        for (member, subscribed) in members.iter().zip(expected) {
            prop_assert_eq!(member.changes.get(), usize::from(subscribed));
        }
    }

    /// However many writes land between flushes, each binding updates at most
    /// once per flush and ends up showing the latest value.
    #[test]
    fn flush_updates_each_binding_once(
        writes in prop::collection::vec((0usize..3, -5i32..5), 0..30),
    ) {
        let engine = Engine::new();
        let keys = ["a", "b", "c"];
        let vm = Object::from_entries(keys.map(|k| (k, 0)));
        let view = Object::new();
        let bindings: Vec<_> = keys
            .iter()
            .map(|k| {
                let binding = engine
                    .create_binding(scope(k), &Value::Object(view.clone()), k, BindingMode::ToTarget)
                    .unwrap();
                binding.bind(&Scope::new(vm.clone())).unwrap();
                binding
            })
            .collect();

        for (key, value) in &writes {
            vm.set(keys[*key], Value::from(*value)).unwrap();
        }
        engine.flush().unwrap();

        for (key, binding) in keys.iter().zip(&bindings) {
            let last = writes.iter().rev().find(|(k, _)| keys[*k] == *key).map(|(_, v)| *v);
            if last.is_none() {
                prop_assert_eq!(binding.update_count(), 1);
            } else {
                prop_assert!(binding.update_count() <= 2);
            }
            prop_assert_eq!(view.get(key).unwrap(), Value::from(last.unwrap_or(0)));
        }
        prop_assert!(engine.context().queue.is_empty());
    }
}
