// ============================================================================
// spark-bindings - Scheduling
// The injected primitive that drives flush timing and interceptor timers
// ============================================================================
//
// The engine never decides *when* deferred work runs. It hands tasks to a
// Scheduler supplied by the host: a render loop, an event loop tick, or the
// virtual-clock ManualScheduler used in tests. All it requires is that a
// queued task is eventually run at most once, and that a cancelled task
// never runs.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

/// A unit of scheduled work.
pub type Task = Box<dyn FnOnce()>;

// =============================================================================
// SCHEDULER TRAIT
// =============================================================================

/// Host scheduling primitive (macrotask / microtask / animation-frame equivalent).
pub trait Scheduler {
    /// Current time on this scheduler's clock.
    fn now(&self) -> Duration;

    /// Run `task` soon, after the current synchronous burst.
    fn queue_task(&self, task: Task);

    /// Run `task` once `delay` has elapsed, unless cancelled first.
    fn queue_delayed(&self, delay: Duration, task: Task) -> TaskHandle;
}

// =============================================================================
// TASK HANDLE
// =============================================================================

/// Cancellation handle for a delayed task.
#[derive(Clone, Debug, Default)]
pub struct TaskHandle {
    cancelled: Rc<Cell<bool>>,
    finished: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running. No effect once it has run.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// True while the task may still run.
    pub fn is_pending(&self) -> bool {
        !self.cancelled.get() && !self.finished.get()
    }

    fn mark_finished(&self) {
        self.finished.set(true);
    }
}

// =============================================================================
// MANUAL SCHEDULER
// =============================================================================

struct Timer {
    due: Duration,
    seq: u64,
    handle: TaskHandle,
    task: Task,
}

/// Deterministic scheduler with a virtual clock.
///
/// Tasks run only when the host calls `run_pending`, `advance` or
/// `advance_to`. Timers fire in due order (ties in scheduling order), and
/// the task queue is drained after each timer so deferred work a timer
/// enqueued is settled before the next timer fires.
///
/// # Example
///
/// ```
/// use spark_bindings::{ManualScheduler, Scheduler};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let fired = Rc::new(Cell::new(false));
/// let fired_clone = fired.clone();
/// scheduler.queue_delayed(Duration::from_millis(50), Box::new(move || fired_clone.set(true)));
///
/// scheduler.advance(Duration::from_millis(49));
/// assert!(!fired.get());
/// scheduler.advance(Duration::from_millis(1));
/// assert!(fired.get());
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    seq: Cell<u64>,
    tasks: RefCell<VecDeque<Task>>,
    timers: RefCell<Vec<Timer>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Move the clock forward by `delta`, firing due timers in order.
    pub fn advance(&self, delta: Duration) -> usize {
        self.advance_to(self.now.get() + delta)
    }

    /// Move the clock to `target` (never backwards), firing due timers.
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut ran = self.run_pending();
        while let Some(timer) = self.take_next_due(target) {
            if timer.due > self.now.get() {
                self.now.set(timer.due);
            }
            if !timer.handle.is_cancelled() {
                timer.handle.mark_finished();
                (timer.task)();
                ran += 1;
            }
            ran += self.run_pending();
        }
        if target > self.now.get() {
            self.now.set(target);
        }
        ran
    }

    /// Number of queued (not delayed) tasks.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Number of timers that can still fire.
    pub fn pending_timers(&self) -> usize {
        self.timers
            .borrow()
            .iter()
            .filter(|t| t.handle.is_pending())
            .count()
    }

    pub(crate) fn schedule_at(&self, due: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }

    fn take_next_due(&self, target: Duration) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        timers.retain(|t| !t.handle.is_cancelled());
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(timers.remove(index))
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn queue_task(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn queue_delayed(&self, delay: Duration, task: Task) -> TaskHandle {
        self.schedule_at(self.now.get() + delay, task)
    }
}

// =============================================================================
// INSTANT SCHEDULER
// =============================================================================

/// Wall-clock scheduler. The host calls `poll()` from its loop; due timers
/// and queued tasks run inside `poll`.
pub struct InstantScheduler {
    origin: Instant,
    queue: ManualScheduler,
}

impl Default for InstantScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl InstantScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            queue: ManualScheduler::new(),
        }
    }

    /// Run everything that is due now. Returns how many tasks ran.
    pub fn poll(&self) -> usize {
        self.queue.advance_to(self.origin.elapsed())
    }

    /// True if tasks or live timers are waiting.
    pub fn has_pending(&self) -> bool {
        self.queue.pending_tasks() > 0 || self.queue.pending_timers() > 0
    }
}

impl Scheduler for InstantScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn queue_task(&self, task: Task) {
        self.queue.queue_task(task);
    }

    fn queue_delayed(&self, delay: Duration, task: Task) -> TaskHandle {
        self.queue.schedule_at(self.now() + delay, task)
    }
}

// =============================================================================
// TESTS
// =============================================================================
