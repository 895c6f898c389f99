//! Benchmarks for spark-bindings
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spark_bindings::binding::expression::{member, scope};
use spark_bindings::{
    Binding, BindingMode, Engine, IndexMap, Object, Observer, ReactiveVec, Result, Scope,
    Subscriber, SubscriberSet, Value,
};
use std::rc::Rc;

struct Noop;

impl Subscriber for Noop {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        Ok(())
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// SUBSCRIBER BENCHMARKS
// =============================================================================

fn bench_subscriber_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscriber_notify");

    for count in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("subscribers", count), &count, |b, &count| {
            let set = SubscriberSet::new();
            let subscribers: Vec<Rc<dyn Subscriber>> =
                (0..count).map(|_| Rc::new(Noop) as Rc<dyn Subscriber>).collect();
            for subscriber in &subscribers {
                set.add(subscriber);
            }
            let new_value = Value::from(1);
            let old_value = Value::from(0);

            b.iter(|| set.notify(black_box(&new_value), black_box(&old_value)))
        });
    }

    group.finish();
}

fn bench_property_read(c: &mut Criterion) {
    let engine = Engine::new();
    let vm = Value::Object(Object::from_entries([("count", 1)]));
    // Warm the observer cache
    let _ = engine.get_observer(&vm, "count");

    c.bench_function("property_read", |b| {
        b.iter(|| black_box(engine.read(&vm, "count")))
    });
}

// =============================================================================
// FLUSH BENCHMARKS
// =============================================================================

fn bench_binding_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("binding_flush");

    for writes in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("writes", writes), &writes, |b, &writes| {
            let engine = Engine::new();
            let vm = Object::from_entries([("count", 0)]);
            let view = Object::new();
            let binding = engine
                .create_binding(scope("count"), &Value::Object(view.clone()), "text", BindingMode::ToTarget)
                .unwrap();
            binding.bind(&Scope::new(vm.clone())).unwrap();
            let mut n = 0;

            b.iter(|| {
                for _ in 0..writes {
                    n += 1;
                    let _ = vm.set("count", Value::from(n));
                }
                engine.flush()
            })
        });
    }

    group.finish();
}

fn bench_many_bindings(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_bindings");

    for count in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("bound", count), &count, |b, &count| {
            let engine = Engine::new();
            let user = Object::from_entries([("name", "Ada")]);
            let vm = Object::from_entries([("user", Value::Object(user.clone()))]);
            let view = Object::new();
            let bindings: Vec<_> = (0..count)
                .map(|i| {
                    let binding = engine
                        .create_binding(
                            member(scope("user"), "name"),
                            &Value::Object(view.clone()),
                            &format!("slot{i}"),
                            BindingMode::ToTarget,
                        )
                        .unwrap();
                    binding.bind(&Scope::new(vm.clone())).unwrap();
                    binding
                })
                .collect();
            let mut n = 0;

            b.iter(|| {
                n += 1;
                let _ = user.set("name", Value::from(n));
                engine.flush()
            });
            drop(bindings);
        });
    }

    group.finish();
}

// =============================================================================
// COLLECTION BENCHMARKS
// =============================================================================

fn bench_collection_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_mutation");

    for len in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("splice", len), &len, |b, &len| {
            let engine = Engine::new();
            let items = ReactiveVec::from_values((0..len).map(Value::from));
            let observer = engine.collection_observer(&Value::from(items.clone())).unwrap();
            let subscriber: Rc<dyn Subscriber> = Rc::new(Noop);
            observer.subscribe(&subscriber);

            b.iter(|| {
                items.splice(len / 2, 1, [Value::from(-1), Value::from(-2)]);
                items.pop();
                engine.flush()
            })
        });
    }

    group.finish();
}

fn bench_collection_reverse(c: &mut Criterion) {
    let engine = Engine::new();
    let items = ReactiveVec::from_values((0..1000).rev().map(Value::from));
    let observer = engine.collection_observer(&Value::from(items.clone())).unwrap();
    let subscriber: Rc<dyn Subscriber> = Rc::new(Noop);
    observer.subscribe(&subscriber);

    c.bench_function("collection_reverse_1000", |b| {
        b.iter(|| {
            items.reverse();
            engine.flush()
        })
    });
}

// =============================================================================

criterion_group!(
    subscriber_benches,
    bench_subscriber_notify,
    bench_property_read,
);

criterion_group!(
    flush_benches,
    bench_binding_flush,
    bench_many_bindings,
);

criterion_group!(
    collection_benches,
    bench_collection_mutation,
    bench_collection_reverse,
);

criterion_main!(subscriber_benches, flush_benches, collection_benches);
