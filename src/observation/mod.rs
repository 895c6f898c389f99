// ============================================================================
// spark-bindings - Observation
// Observer implementations and the locator that resolves and caches them
// ============================================================================

pub mod collection;
pub mod computed;
pub mod locator;
pub mod property;

pub use collection::{ArrayIndexObserver, CollectionObserver, CollectionSizeObserver};
pub use computed::ComputedObserver;
pub use locator::ObserverLocator;
pub use property::{PrimitiveObserver, PropertyObserver};
