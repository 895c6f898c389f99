// ============================================================================
// spark-bindings - Dependency Tracking
// Attributes every observer read to the innermost active tracking context
// ============================================================================
//
// The tracker is an explicit stack owned by the ReactiveContext, not ambient
// global state. `enter`/`exit` push and pop tracking contexts (bindings,
// computed observers, effects). `pause`/`resume` suspend recording without
// touching the stack, so a one-time evaluation nested anywhere records
// nothing, while contexts entered *after* the pause record normally.
//
// Borrow scoping follows the collect-then-mutate pattern: the stack borrow is
// released before calling into the tracking context, which may itself read
// more observers (and so re-enter the tracker).
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;

use crate::core::error::{ReactiveError, Result};
use crate::core::types::{Connectable, Observer, Subscriber, rc_addr};

// =============================================================================
// DEPENDENCY TRACKER
// =============================================================================

/// Stack of active tracking contexts.
///
/// # Example
///
/// ```
/// use spark_bindings::{DependencyTracker, Observer, Connectable};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Count(Cell<usize>);
/// impl Connectable for Count {
///     fn observe(&self, _: Rc<dyn Observer>) {
///         self.0.set(self.0.get() + 1);
///     }
/// }
///
/// let tracker = DependencyTracker::new();
/// let ctx: Rc<dyn Connectable> = Rc::new(Count(Cell::new(0)));
/// tracker.track(ctx.clone(), || assert!(tracker.is_tracking()));
/// assert!(!tracker.is_tracking());
/// ```
#[derive(Default)]
pub struct DependencyTracker {
    stack: RefCell<Vec<Rc<dyn Connectable>>>,
    /// Stack depth at each active pause
    pauses: RefCell<Vec<usize>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `context` the innermost tracking context.
    pub fn enter(&self, context: Rc<dyn Connectable>) {
        self.stack.borrow_mut().push(context);
    }

    /// Pop `context`. Fails if it is not the innermost context.
    pub fn exit(&self, context: &Rc<dyn Connectable>) -> Result<()> {
        let mut stack = self.stack.borrow_mut();
        match stack.last() {
            Some(top) if rc_addr(top) == rc_addr(context) => {
                stack.pop();
                Ok(())
            }
            _ => Err(ReactiveError::TrackerMismatch),
        }
    }

    /// Suspend recording for the contexts currently on the stack.
    pub fn pause(&self) {
        let depth = self.stack.borrow().len();
        self.pauses.borrow_mut().push(depth);
    }

    /// Undo the most recent `pause`.
    pub fn resume(&self) -> Result<()> {
        self.pauses
            .borrow_mut()
            .pop()
            .map(|_| ())
            .ok_or_else(|| ReactiveError::Misuse("resume() without a matching pause()".into()))
    }

    pub fn is_paused(&self) -> bool {
        let depth = self.stack.borrow().len();
        self.pauses.borrow().last().is_some_and(|&paused_at| depth <= paused_at)
    }

    /// True if a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        !self.stack.borrow().is_empty() && !self.is_paused()
    }

    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    pub fn current(&self) -> Option<Rc<dyn Connectable>> {
        self.stack.borrow().last().cloned()
    }

    /// Record a read of `observer` in the innermost context.
    pub fn observe(&self, observer: Rc<dyn Observer>) {
        if self.is_paused() {
            return;
        }
        // Release the stack borrow before calling out
        let current = self.current();
        if let Some(context) = current {
            context.observe(observer);
        }
    }

    /// Run `f` with `context` as the innermost tracking context.
    pub fn track<R>(&self, context: Rc<dyn Connectable>, f: impl FnOnce() -> R) -> R {
        struct FrameGuard<'a> {
            tracker: &'a DependencyTracker,
            context: Rc<dyn Connectable>,
        }

        impl Drop for FrameGuard<'_> {
            fn drop(&mut self) {
                if self.tracker.exit(&self.context).is_err() {
                    tracing::warn!("tracking frame was not innermost on exit");
                }
            }
        }

        self.enter(context.clone());
        let _guard = FrameGuard {
            tracker: self,
            context,
        };
        f()
    }

    /// Run `f` without recording any reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        struct PauseGuard<'a>(&'a DependencyTracker);

        impl Drop for PauseGuard<'_> {
            fn drop(&mut self) {
                let _ = self.0.resume();
            }
        }

        self.pause();
        let _guard = PauseGuard(self);
        f()
    }
}

// =============================================================================
// OBSERVER RECORD
// =============================================================================

/// The set of observers one subscriber currently depends on.
///
/// Each evaluation starts with `begin()`; observers read during it are
/// stamped with the new version. `clear_stale` then unsubscribes from the
/// ones that were not read again, so the subscription set always equals the
/// dependencies of the latest evaluation.
#[derive(Default)]
pub struct ObserverRecord {
    version: Cell<u64>,
    entries: RefCell<AHashMap<usize, (Rc<dyn Observer>, u64)>>,
}

impl ObserverRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new evaluation.
    pub fn begin(&self) {
        self.version.set(self.version.get() + 1);
    }

    /// Record a read and subscribe `subscriber` if this observer is new.
    pub fn observe(&self, observer: Rc<dyn Observer>, subscriber: &Rc<dyn Subscriber>) {
        let addr = rc_addr(&observer);
        let version = self.version.get();
        let is_new = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&addr) {
                Some(entry) => {
                    entry.1 = version;
                    false
                }
                None => {
                    entries.insert(addr, (observer.clone(), version));
                    true
                }
            }
        };
        if is_new {
            observer.subscribe(subscriber);
            tracing::trace!(observer = addr, "subscribed to dependency");
        }
    }

    /// Unsubscribe from observers not read since the last `begin()`.
    pub fn clear_stale(&self, subscriber: &Rc<dyn Subscriber>) {
        let version = self.version.get();
        let stale: Vec<Rc<dyn Observer>> = {
            let mut entries = self.entries.borrow_mut();
            let keys: Vec<usize> = entries
                .iter()
                .filter(|(_, (_, v))| *v != version)
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|(o, _)| o))
                .collect()
        };
        for observer in stale {
            observer.unsubscribe(subscriber);
        }
    }

    /// Unsubscribe from everything.
    pub fn clear_all(&self, subscriber: &Rc<dyn Subscriber>) {
        let all: Vec<Rc<dyn Observer>> = self
            .entries
            .borrow_mut()
            .drain()
            .map(|(_, (o, _))| o)
            .collect();
        for observer in all {
            observer.unsubscribe(subscriber);
        }
    }

    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn contains(&self, observer: &Rc<dyn Observer>) -> bool {
        self.entries.borrow().contains_key(&rc_addr(observer))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::reactivity::subscribers::SubscriberSet;
    use std::any::Any;

    #[derive(Default)]
    struct Recorder {
        reads: RefCell<Vec<usize>>,
    }

    impl Connectable for Recorder {
        fn observe(&self, observer: Rc<dyn Observer>) {
            self.reads.borrow_mut().push(rc_addr(&observer));
        }
    }

    #[derive(Default)]
    struct Dummy {
        subscribers: SubscriberSet,
    }

    impl Observer for Dummy {
        fn get_value(&self) -> Result<Value> {
            Ok(Value::Undefined)
        }
        fn set_value(&self, _: Value) -> Result<()> {
            Ok(())
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
            crate::core::constants::PROPERTY
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Nop;

    impl Subscriber for Nop {
        fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reads_go_to_innermost_context() {
        let tracker = DependencyTracker::new();
        let outer = Rc::new(Recorder::default());
        let inner = Rc::new(Recorder::default());
        let a: Rc<dyn Observer> = Rc::new(Dummy::default());
        let b: Rc<dyn Observer> = Rc::new(Dummy::default());

        tracker.track(outer.clone(), || {
            tracker.observe(a.clone());
            tracker.track(inner.clone(), || tracker.observe(b.clone()));
            tracker.observe(a.clone());
        });

        assert_eq!(*outer.reads.borrow(), vec![rc_addr(&a), rc_addr(&a)]);
        assert_eq!(*inner.reads.borrow(), vec![rc_addr(&b)]);
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn exit_must_match_top() {
        let tracker = DependencyTracker::new();
        let a: Rc<dyn Connectable> = Rc::new(Recorder::default());
        let b: Rc<dyn Connectable> = Rc::new(Recorder::default());
        tracker.enter(a.clone());
        tracker.enter(b.clone());
        assert_eq!(tracker.exit(&a), Err(ReactiveError::TrackerMismatch));
        assert!(tracker.exit(&b).is_ok());
        assert!(tracker.exit(&a).is_ok());
    }

    #[test]
    fn pause_suppresses_existing_frames_only() {
        let tracker = DependencyTracker::new();
        let outer = Rc::new(Recorder::default());
        let nested = Rc::new(Recorder::default());
        let obs: Rc<dyn Observer> = Rc::new(Dummy::default());

        tracker.track(outer.clone(), || {
            tracker.untracked(|| {
                tracker.observe(obs.clone());
                assert!(!tracker.is_tracking());
                tracker.track(nested.clone(), || {
                    assert!(tracker.is_tracking());
                    tracker.observe(obs.clone());
                });
            });
            assert!(tracker.is_tracking());
        });

        assert!(outer.reads.borrow().is_empty());
        assert_eq!(nested.reads.borrow().len(), 1);
    }

    #[test]
    fn resume_without_pause_is_misuse() {
        let tracker = DependencyTracker::new();
        assert!(matches!(tracker.resume(), Err(ReactiveError::Misuse(_))));
    }

    #[test]
    fn record_drops_stale_dependencies() {
        let record = ObserverRecord::new();
        let sub: Rc<dyn Subscriber> = Rc::new(Nop);
        let a = Rc::new(Dummy::default());
        let b = Rc::new(Dummy::default());
        let a_dyn: Rc<dyn Observer> = a.clone();
        let b_dyn: Rc<dyn Observer> = b.clone();

        record.begin();
        record.observe(a_dyn.clone(), &sub);
        record.observe(b_dyn.clone(), &sub);
        record.observe(a_dyn.clone(), &sub);
        record.clear_stale(&sub);
        assert_eq!(record.count(), 2);
        assert_eq!(a.subscriber_count(), 1);

        record.begin();
        record.observe(a_dyn.clone(), &sub);
        record.clear_stale(&sub);
        assert!(record.contains(&a_dyn));
        assert!(!record.contains(&b_dyn));
        assert_eq!(b.subscriber_count(), 0);

        record.clear_all(&sub);
        assert_eq!(record.count(), 0);
        assert_eq!(a.subscriber_count(), 0);
    }
}
