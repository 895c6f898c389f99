// ============================================================================
// spark-bindings - Effects
// Side effects that re-run when the observers they read change
// ============================================================================
//
// `Effect::run(f)` runs `f` once as its own tracking frame and subscribes to
// every observer it read. A change queues the effect on the flush queue; the
// flush re-runs it and re-subscribes to exactly what the new run read.
//
// The returned handle owns the effect: `stop()` or dropping the handle
// unsubscribes everything and runs the last cleanup.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::collections::IndexMap;
use crate::core::context::ReactiveContext;
use crate::core::error::Result;
use crate::core::types::{Connectable, Flushable, Observer, Subscriber};
use crate::core::value::Value;
use crate::observation::ObserverLocator;
use crate::reactivity::tracking::ObserverRecord;

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Runs before the next execution, and once more on stop
pub type CleanupFn = Box<dyn FnOnce()>;

/// Effect body: reads through the locator, optionally returns a cleanup
pub type EffectFn = Box<dyn FnMut(&ObserverLocator) -> Result<Option<CleanupFn>>>;

// =============================================================================
// EFFECT
// =============================================================================

pub struct Effect {
    ctx: Rc<ReactiveContext>,
    locator: Rc<ObserverLocator>,

    /// Taken out while running, so a re-entrant run is a no-op
    func: RefCell<Option<EffectFn>>,

    teardown: RefCell<Option<CleanupFn>>,
    record: ObserverRecord,
    runs: Cell<u64>,
    stopped: Cell<bool>,
    self_weak: Weak<Effect>,
}

impl Effect {
    /// Run `f` now and again whenever anything it read changes.
    ///
    /// ```
    /// use spark_bindings::{Effect, Object, ObserverLocator, ReactiveContext, Value};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let (ctx, _) = ReactiveContext::manual();
    /// let locator = ObserverLocator::new(ctx.clone());
    /// let vm = Object::from_entries([("count", 1)]);
    /// let seen = Rc::new(Cell::new(0.0));
    ///
    /// let target = Value::Object(vm.clone());
    /// let sink = seen.clone();
    /// let handle = Effect::run(ctx.clone(), locator, move |locator| {
    ///     sink.set(locator.read(&target, "count")?.as_number().unwrap_or(0.0));
    ///     Ok(())
    /// })
    /// .unwrap();
    ///
    /// vm.set("count", Value::from(2)).unwrap();
    /// ctx.flush().unwrap();
    /// assert_eq!(seen.get(), 2.0);
    /// assert_eq!(handle.run_count(), 2);
    /// ```
    pub fn run(
        ctx: Rc<ReactiveContext>,
        locator: Rc<ObserverLocator>,
        mut f: impl FnMut(&ObserverLocator) -> Result<()> + 'static,
    ) -> Result<EffectHandle> {
        Self::run_with_cleanup(ctx, locator, move |locator| f(locator).map(|_| None))
    }

    /// Like `run`, but `f` may return a cleanup for its previous run.
    pub fn run_with_cleanup(
        ctx: Rc<ReactiveContext>,
        locator: Rc<ObserverLocator>,
        f: impl FnMut(&ObserverLocator) -> Result<Option<CleanupFn>> + 'static,
    ) -> Result<EffectHandle> {
        let effect = Rc::new_cyclic(|self_weak: &Weak<Effect>| Self {
            ctx,
            locator,
            func: RefCell::new(Some(Box::new(f))),
            teardown: RefCell::new(None),
            record: ObserverRecord::new(),
            runs: Cell::new(0),
            stopped: Cell::new(false),
            self_weak: self_weak.clone(),
        });
        if let Err(err) = effect.execute() {
            effect.stop();
            return Err(err);
        }
        Ok(EffectHandle { effect })
    }

    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.self_weak.upgrade().map(|me| me as Rc<dyn Subscriber>)
    }

    fn run_teardown(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    fn execute(&self) -> Result<()> {
        if self.stopped.get() {
            return Ok(());
        }
        let Some(me) = self.self_weak.upgrade() else {
            return Ok(());
        };
        let Some(mut func) = self.func.borrow_mut().take() else {
            return Ok(());
        };
        self.run_teardown();

        self.record.begin();
        let frame: Rc<dyn Connectable> = me.clone();
        let result = self.ctx.tracker.track(frame, || func(&self.locator));
        let subscriber: Rc<dyn Subscriber> = me;
        // Keep what this run read even if it failed, so a fix re-runs it
        self.record.clear_stale(&subscriber);
        self.runs.set(self.runs.get() + 1);

        if !self.stopped.get() {
            *self.func.borrow_mut() = Some(func);
        }
        let cleanup = result?;
        if self.stopped.get() {
            if let Some(cleanup) = cleanup {
                cleanup();
            }
        } else {
            *self.teardown.borrow_mut() = cleanup;
        }
        tracing::trace!(runs = self.runs.get(), dependencies = self.record.count(), "effect ran");
        Ok(())
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        if let Some(me) = self.as_subscriber() {
            self.record.clear_all(&me);
        }
        if let Some(me) = self.self_weak.upgrade() {
            let flushable: Rc<dyn Flushable> = me;
            self.ctx.queue.remove(&flushable);
        }
        self.func.borrow_mut().take();
        self.run_teardown();
        tracing::debug!(runs = self.runs.get(), "effect stopped");
    }

    fn schedule(&self) {
        if self.stopped.get() {
            return;
        }
        if let Some(me) = self.self_weak.upgrade() {
            self.ctx.enqueue(me as Rc<dyn Flushable>);
        }
    }
}

impl Connectable for Effect {
    fn observe(&self, observer: Rc<dyn Observer>) {
        if let Some(me) = self.as_subscriber() {
            self.record.observe(observer, &me);
        }
    }
}

impl Subscriber for Effect {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        self.schedule();
        Ok(())
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        self.schedule();
        Ok(())
    }
}

impl Flushable for Effect {
    fn flush(&self) -> Result<()> {
        self.execute()
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Owner of a running effect. Dropping it stops the effect.
pub struct EffectHandle {
    effect: Rc<Effect>,
}

impl EffectHandle {
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        !self.effect.stopped.get()
    }

    /// Completed runs, including the initial one.
    pub fn run_count(&self) -> u64 {
        self.effect.runs.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.effect.record.count()
    }
}

impl Drop for EffectHandle {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("active", &self.is_active())
            .field("runs", &self.run_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::ReactiveVec;
    use crate::core::error::ReactiveError;
    use crate::core::value::Object;

    fn setup() -> (Rc<ReactiveContext>, Rc<ObserverLocator>) {
        let (ctx, _) = ReactiveContext::manual();
        let locator = ObserverLocator::new(ctx.clone());
        (ctx, locator)
    }

    #[test]
    fn reruns_once_per_flush() {
        let (ctx, locator) = setup();
        let vm = Object::from_entries([("a", 1), ("b", 2)]);
        let target = Value::Object(vm.clone());
        let handle = Effect::run(ctx.clone(), locator, move |locator| {
            locator.read(&target, "a")?;
            locator.read(&target, "b")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(handle.dependency_count(), 2);

        vm.set("a", Value::from(10)).unwrap();
        vm.set("b", Value::from(20)).unwrap();
        ctx.flush().unwrap();
        assert_eq!(handle.run_count(), 2);
    }

    #[test]
    fn stop_unsubscribes_and_runs_cleanup() {
        let (ctx, locator) = setup();
        let vm = Object::from_entries([("a", 1)]);
        let target = Value::Object(vm.clone());
        let cleanups = Rc::new(Cell::new(0));
        let counter = cleanups.clone();
        let handle = Effect::run_with_cleanup(ctx.clone(), locator.clone(), move |locator| {
            locator.read(&target, "a")?;
            let counter = counter.clone();
            Ok(Some(Box::new(move || counter.set(counter.get() + 1)) as CleanupFn))
        })
        .unwrap();

        vm.set("a", Value::from(2)).unwrap();
        ctx.flush().unwrap();
        assert_eq!(cleanups.get(), 1);

        handle.stop();
        assert_eq!(cleanups.get(), 2);
        assert!(!handle.is_active());
        let observer = locator.get_observer(&Value::Object(vm.clone()), "a").unwrap();
        assert_eq!(observer.subscriber_count(), 0);

        vm.set("a", Value::from(3)).unwrap();
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn dropping_the_handle_stops() {
        let (ctx, locator) = setup();
        let items = ReactiveVec::new();
        let list = Value::from(items.clone());
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let handle = Effect::run(ctx.clone(), locator, move |locator| {
            counter.set(counter.get() + 1);
            locator.read(&list, "length")?;
            Ok(())
        })
        .unwrap();

        items.push(Value::from(1));
        ctx.flush().unwrap();
        assert_eq!(runs.get(), 2);

        drop(handle);
        items.push(Value::from(2));
        ctx.flush().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn failing_first_run_returns_error() {
        let (ctx, locator) = setup();
        let result = Effect::run(ctx, locator, |_| Err(ReactiveError::evaluation("effect", "nope")));
        assert!(matches!(result, Err(ReactiveError::Evaluation { .. })));
    }
}
