// ============================================================================
// spark-bindings - Collections
// Ordered and keyed collections plus the index-map change descriptor
// ============================================================================
//
// Each collection is a shared handle whose mutating methods describe what
// they did as a `Mutation`. A collection observer folds those mutations into
// an `IndexMap` and hands the net descriptor to subscribers on flush.
// ============================================================================

mod hooks;
mod index_map;
mod map;
mod set;
mod vec;

pub use index_map::{IndexMap, Mutation};
pub use map::{ReactiveMap, WeakMap};
pub use set::{ReactiveSet, WeakSet};
pub use vec::{ReactiveVec, WeakVec};
