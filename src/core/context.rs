// ============================================================================
// spark-bindings - Reactive Context
// The explicit, injected state shared by every observer and binding
// ============================================================================
//
// There is no ambient global here. Everything an observer or binding needs
// (the dependency tracker, the flush queue, the host scheduler and the error
// channel) lives in one ReactiveContext that is passed down by `Rc` when
// the observer or binding is created. Two engines never share state.
// ============================================================================

use std::rc::Rc;
use std::time::Duration;

use super::error::{ErrorChannel, Result};
use super::types::{Flushable, Observer};
use crate::reactivity::flush::FlushQueue;
use crate::reactivity::scheduling::{ManualScheduler, Scheduler};
use crate::reactivity::tracking::DependencyTracker;

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Shared engine state.
pub struct ReactiveContext {
    /// Stack of active tracking contexts
    pub tracker: DependencyTracker,

    /// Deferred work, driven by `scheduler`
    pub queue: Rc<FlushQueue>,

    /// Host scheduling primitive
    pub scheduler: Rc<dyn Scheduler>,

    /// Where errors with no synchronous caller go
    pub errors: Rc<ErrorChannel>,
}

impl ReactiveContext {
    pub fn new(scheduler: Rc<dyn Scheduler>, errors: Rc<ErrorChannel>) -> Rc<Self> {
        Rc::new(Self {
            tracker: DependencyTracker::new(),
            queue: FlushQueue::new(scheduler.clone(), errors.clone()),
            scheduler,
            errors,
        })
    }

    /// A context on a fresh virtual-clock scheduler, with no error sink.
    pub fn manual() -> (Rc<Self>, Rc<ManualScheduler>) {
        let scheduler = Rc::new(ManualScheduler::new());
        let context = Self::new(scheduler.clone(), Rc::new(ErrorChannel::default()));
        (context, scheduler)
    }

    /// Record a read of `observer` in the innermost tracking context.
    pub fn observe(&self, observer: Rc<dyn Observer>) {
        self.tracker.observe(observer);
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// Run `f` without recording reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.tracker.untracked(f)
    }

    /// Queue deferred work.
    pub fn enqueue(&self, item: Rc<dyn Flushable>) -> bool {
        self.queue.add(item)
    }

    /// Run a flush pass now, surfacing errors through the channel.
    pub fn flush(&self) -> Result<()> {
        let result = self.queue.flush();
        self.errors.surface(result)
    }

    /// Current time on the scheduler's clock.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ReactiveError;
    use std::cell::Cell;

    struct Work(Cell<u32>);

    impl Flushable for Work {
        fn flush(&self) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    struct Broken;

    impl Flushable for Broken {
        fn flush(&self) -> Result<()> {
            Err(ReactiveError::Misuse("broken".into()))
        }
    }

    #[test]
    fn manual_context_drives_queue() {
        let (ctx, scheduler) = ReactiveContext::manual();
        let work = Rc::new(Work(Cell::new(0)));
        assert!(ctx.enqueue(work.clone()));
        scheduler.run_pending();
        assert_eq!(work.0.get(), 1);
        assert_eq!(ctx.now(), Duration::ZERO);
    }

    #[test]
    fn flush_surfaces_errors_to_caller() {
        let (ctx, _) = ReactiveContext::manual();
        ctx.enqueue(Rc::new(Broken));
        assert!(ctx.flush().is_err());
    }

    #[test]
    fn flush_routes_errors_to_sink() {
        let (ctx, _) = ReactiveContext::manual();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        ctx.errors
            .set_sink(Some(Rc::new(move |_| seen_clone.set(seen_clone.get() + 1))));

        ctx.enqueue(Rc::new(Broken));
        assert!(ctx.flush().is_ok());
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn untracked_is_not_tracking() {
        let (ctx, _) = ReactiveContext::manual();
        assert!(!ctx.is_tracking());
        ctx.untracked(|| assert!(!ctx.is_tracking()));
    }
}
