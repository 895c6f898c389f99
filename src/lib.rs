// ============================================================================
// spark-bindings - Reactive Observation and Data-Binding Engine
// ============================================================================
//
// Observers detect writes to host values (object slots, collections,
// computed accessors), subscriber sets fan the change out, the flush queue
// coalesces bursts into one pass, and bindings keep targets in sync with
// source expressions. Interceptors decide when a binding actually reacts.
//
// Layering, leaf first:
//   core         host values, graph traits, errors, the shared context
//   reactivity   subscriber sets, flush queue, dependency tracker, scheduler
//   collections  reactive vec/map/set and the index-map change descriptor
//   observation  observers and the locator that caches them
//   binding      binding kinds, expressions, interceptors, effects
//   engine       the facade most hosts use
// ============================================================================

pub mod binding;
pub mod collections;
pub mod core;
pub mod engine;
pub mod observation;
pub mod reactivity;

mod macros;

// Re-export core items at crate root for ergonomic access
pub use core::constants;
pub use core::context::ReactiveContext;
pub use core::error::{ErrorChannel, ErrorSink, ReactiveError, Result};
pub use core::types::{
    CollectionHook, Connectable, Flushable, Observer, PropertyReader, RawReader, SlotWatcher,
    Subscriber,
};
pub use core::value::{Function, Getter, HashKey, Object, Setter, Value, WeakObject};

// Reactivity
pub use reactivity::equality::{has_changed, same_value};
pub use reactivity::flush::FlushQueue;
pub use reactivity::scheduling::{InstantScheduler, ManualScheduler, Scheduler, Task, TaskHandle};
pub use reactivity::subscribers::SubscriberSet;
pub use reactivity::tracking::{DependencyTracker, ObserverRecord};

// Collections
pub use collections::{IndexMap, Mutation, ReactiveMap, ReactiveSet, ReactiveVec};

// Observation
pub use observation::{
    ArrayIndexObserver, CollectionObserver, CollectionSizeObserver, ComputedObserver,
    ObserverLocator, PrimitiveObserver, PropertyObserver,
};

// Bindings
pub use binding::effect::CleanupFn;
pub use binding::{
    Binding, BindingMode, CallBinding, CallbackAccessor, Effect, EffectHandle, Expression,
    Interceptor, InterceptorSpec, LetBinding, PropertyBinding, RefBinding, Scope, Signaler,
};

// Engine
pub use engine::{Engine, EngineBuilder, EngineOptions};

// =============================================================================
// TESTS
// =============================================================================
