// ============================================================================
// spark-bindings - Core Module
// Host values, graph traits, errors and the shared reactive context
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;
pub mod types;
pub mod value;

pub use constants::*;
pub use context::ReactiveContext;
pub use error::{ErrorChannel, ErrorSink, ReactiveError, Result};
pub use types::{
    CollectionHook, Connectable, Flushable, Observer, PropertyReader, RawReader, SlotWatcher,
    Subscriber,
};
pub use value::{Function, Getter, HashKey, Object, Setter, Value, WeakObject, index_key};
