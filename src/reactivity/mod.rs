// ============================================================================
// spark-bindings - Reactivity Module
// Subscriber sets, the flush queue, dependency tracking and scheduling
// ============================================================================

pub mod equality;
pub mod flush;
pub mod scheduling;
pub mod subscribers;
pub mod tracking;

pub use equality::{has_changed, same_value};
pub use flush::FlushQueue;
pub use scheduling::{InstantScheduler, ManualScheduler, Scheduler, Task, TaskHandle};
pub use subscribers::SubscriberSet;
pub use tracking::{DependencyTracker, ObserverRecord};
