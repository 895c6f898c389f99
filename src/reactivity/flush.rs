// ============================================================================
// spark-bindings - Flush Queue
// Deduplicating single-pass queue for deferred "apply consequence" work
// ============================================================================
//
// Observers and bindings push Flushables here instead of applying changes
// inline, so a burst of synchronous writes settles into a single update per
// item. Rules:
//
// - an item already waiting is not queued twice
// - an item is taken off the pending set *before* it flushes, so one that
//   re-enqueues itself during the pass is a new request and runs again,
//   after everything already queued
// - `add` during a pass appends to the running pass instead of nesting one
// - there is no iteration cap: a flushable that always re-enqueues itself
//   keeps the pass running
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use ahash::AHashSet;

use super::scheduling::Scheduler;
use crate::core::error::{ErrorChannel, ReactiveError, Result};
use crate::core::types::{Flushable, rc_addr};

/// The deferred-work queue driven by the injected scheduler.
///
/// # Example
///
/// ```
/// use spark_bindings::{ErrorChannel, FlushQueue, Flushable, ManualScheduler, Result};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Work(Cell<u32>);
/// impl Flushable for Work {
///     fn flush(&self) -> Result<()> {
///         self.0.set(self.0.get() + 1);
///         Ok(())
///     }
/// }
///
/// let scheduler = Rc::new(ManualScheduler::new());
/// let queue = FlushQueue::new(scheduler.clone(), Rc::new(ErrorChannel::default()));
/// let work = Rc::new(Work(Cell::new(0)));
///
/// for _ in 0..3 {
///     queue.add(work.clone());
/// }
/// scheduler.run_pending();
/// assert_eq!(work.0.get(), 1);
/// ```
pub struct FlushQueue {
    items: RefCell<VecDeque<Rc<dyn Flushable>>>,
    pending: RefCell<AHashSet<usize>>,
    flushing: Cell<bool>,
    scheduled: Cell<bool>,
    passes: Cell<u64>,
    scheduler: Rc<dyn Scheduler>,
    errors: Rc<ErrorChannel>,
    self_weak: Weak<FlushQueue>,
}

impl FlushQueue {
    pub fn new(scheduler: Rc<dyn Scheduler>, errors: Rc<ErrorChannel>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            items: RefCell::new(VecDeque::new()),
            pending: RefCell::new(AHashSet::new()),
            flushing: Cell::new(false),
            scheduled: Cell::new(false),
            passes: Cell::new(0),
            scheduler,
            errors,
            self_weak: self_weak.clone(),
        })
    }

    /// Queue `item`. Returns false if it is already waiting.
    pub fn add(&self, item: Rc<dyn Flushable>) -> bool {
        let addr = rc_addr(&item);
        if !self.pending.borrow_mut().insert(addr) {
            return false;
        }
        self.items.borrow_mut().push_back(item);
        tracing::trace!(item = addr, "flushable queued");

        if !self.flushing.get() && !self.scheduled.get() {
            self.schedule();
        }
        true
    }

    fn schedule(&self) {
        self.scheduled.set(true);
        let queue = self.self_weak.clone();
        self.scheduler.queue_task(Box::new(move || {
            let Some(queue) = queue.upgrade() else {
                return;
            };
            queue.scheduled.set(false);
            if let Err(err) = queue.flush() {
                queue.errors.report_unhandled(err);
            }
        }));
    }

    /// Run one pass: flush items in order until the queue is empty.
    ///
    /// Calling this from inside a running pass is a no-op; the running pass
    /// picks up whatever was queued. Item failures do not stop the pass.
    pub fn flush(&self) -> Result<()> {
        struct FlushingGuard<'a>(&'a Cell<bool>);

        impl Drop for FlushingGuard<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        if self.flushing.get() {
            return Ok(());
        }
        self.flushing.set(true);
        let _guard = FlushingGuard(&self.flushing);

        let mut errors = Vec::new();
        let mut flushed = 0usize;
        loop {
            let next = self.items.borrow_mut().pop_front();
            let Some(item) = next else {
                break;
            };
            // Off the pending set first: a re-enqueue from inside flush() counts
            self.pending.borrow_mut().remove(&rc_addr(&item));
            if let Err(err) = item.flush() {
                errors.push(err);
            }
            flushed += 1;
        }

        self.passes.set(self.passes.get() + 1);
        if flushed > 0 {
            tracing::debug!(flushed, errors = errors.len(), "flush pass complete");
        }
        ReactiveError::collect(errors)
    }

    /// Drop `item` from the queue without flushing it.
    pub fn remove(&self, item: &Rc<dyn Flushable>) -> bool {
        let addr = rc_addr(item);
        if !self.pending.borrow_mut().remove(&addr) {
            return false;
        }
        self.items.borrow_mut().retain(|queued| rc_addr(queued) != addr);
        true
    }

    /// Discard all pending work without flushing it.
    pub fn clear(&self) {
        let dropped = {
            self.pending.borrow_mut().clear();
            std::mem::take(&mut *self.items.borrow_mut())
        };
        if !dropped.is_empty() {
            tracing::debug!(dropped = dropped.len(), "flush queue cleared");
        }
    }

    pub fn contains(&self, item: &Rc<dyn Flushable>) -> bool {
        self.pending.borrow().contains(&rc_addr(item))
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes.get()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactivity::scheduling::ManualScheduler;

    fn setup() -> (Rc<ManualScheduler>, Rc<FlushQueue>, Rc<ErrorChannel>) {
        let scheduler = Rc::new(ManualScheduler::new());
        let errors = Rc::new(ErrorChannel::default());
        let queue = FlushQueue::new(scheduler.clone(), errors.clone());
        (scheduler, queue, errors)
    }

    struct Logged {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Flushable for Logged {
        fn flush(&self) -> Result<()> {
            self.log.borrow_mut().push(self.name);
            Ok(())
        }
    }

    /// Re-enqueues itself a fixed number of times, then enqueues `then`.
    struct Requeue {
        queue: Rc<FlushQueue>,
        remaining: Cell<u32>,
        runs: Cell<u32>,
        self_weak: RefCell<Weak<Requeue>>,
    }

    impl Flushable for Requeue {
        fn flush(&self) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            if self.remaining.get() > 0 {
                self.remaining.set(self.remaining.get() - 1);
                if let Some(me) = self.self_weak.borrow().upgrade() {
                    assert!(self.queue.add(me));
                }
            }
            Ok(())
        }
    }

    struct Failing;

    impl Flushable for Failing {
        fn flush(&self) -> Result<()> {
            Err(ReactiveError::Misuse("flush failed".into()))
        }
    }

    #[test]
    fn dedups_before_flush() {
        let (scheduler, queue, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(Logged { name: "a", log: log.clone() });

        assert!(queue.add(a.clone()));
        assert!(!queue.add(a.clone()));
        assert!(!queue.add(a.clone()));
        assert_eq!(queue.len(), 1);
        assert_eq!(scheduler.pending_tasks(), 1);

        scheduler.run_pending();
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn items_flush_in_enqueue_order() {
        let (_, queue, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            queue.add(Rc::new(Logged { name, log: log.clone() }));
        }
        queue.flush().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(queue.passes(), 1);
    }

    #[test]
    fn requeue_during_pass_is_a_new_request() {
        let (_, queue, _) = setup();
        let requeue = Rc::new(Requeue {
            queue: queue.clone(),
            remaining: Cell::new(2),
            runs: Cell::new(0),
            self_weak: RefCell::new(Weak::new()),
        });
        *requeue.self_weak.borrow_mut() = Rc::downgrade(&requeue);

        queue.add(requeue.clone());
        queue.flush().unwrap();

        assert_eq!(requeue.runs.get(), 3);
        assert_eq!(queue.passes(), 1);
    }

    #[test]
    fn nested_flush_is_noop() {
        struct Nested(Rc<FlushQueue>, Cell<bool>);
        impl Flushable for Nested {
            fn flush(&self) -> Result<()> {
                self.1.set(self.0.is_flushing());
                self.0.flush()
            }
        }

        let (_, queue, _) = setup();
        let nested = Rc::new(Nested(queue.clone(), Cell::new(false)));
        queue.add(nested.clone());
        queue.flush().unwrap();
        assert!(nested.1.get());
        assert_eq!(queue.passes(), 1);
        assert!(!queue.is_flushing());
    }

    #[test]
    fn remove_and_clear_discard_work() {
        let (scheduler, queue, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a: Rc<dyn Flushable> = Rc::new(Logged { name: "a", log: log.clone() });
        let b: Rc<dyn Flushable> = Rc::new(Logged { name: "b", log: log.clone() });

        queue.add(a.clone());
        queue.add(b.clone());
        assert!(queue.remove(&a));
        assert!(!queue.contains(&a));
        scheduler.run_pending();
        assert_eq!(*log.borrow(), vec!["b"]);

        queue.add(a.clone());
        queue.clear();
        scheduler.run_pending();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn errors_are_collected_after_the_pass() {
        let (_, queue, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        queue.add(Rc::new(Failing));
        queue.add(Rc::new(Logged { name: "after", log: log.clone() }));

        let result = queue.flush();
        assert!(matches!(result, Err(ReactiveError::Misuse(_))));
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn scheduled_pass_reports_unhandled() {
        let (scheduler, queue, errors) = setup();
        queue.add(Rc::new(Failing));
        scheduler.run_pending();
        assert_eq!(errors.take_unhandled().len(), 1);
    }
}
