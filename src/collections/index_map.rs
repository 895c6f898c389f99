// ============================================================================
// spark-bindings - Index Map
// Change descriptor for ordered collections: new position -> prior position
// ============================================================================
//
// An index map starts as the identity over the collection's length at the
// start of a turn. Every mutation is folded into it positionally, so after a
// burst of synchronous mutations it describes the net effect only:
//
//   entries[i] == Some(p)  element now at i was at p before the turn
//   entries[i] == None     element at i was created during the turn
//
// Prior positions that no longer appear are listed in `deleted_indices`,
// together with the removed elements. Elements created and removed within
// the same turn leave no trace.
// ============================================================================

use ahash::AHashSet;

use crate::core::value::Value;

// =============================================================================
// MUTATION
// =============================================================================

/// A positional description of one collection mutation.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// `removed` elements were taken out at `start` and `inserted` new
    /// elements were put in their place.
    Splice {
        start: usize,
        removed: Vec<Value>,
        inserted: usize,
    },
    /// The element at `index` was overwritten; `old` is what it held.
    Replace { index: usize, old: Value },
    /// Elements were reordered; new position `i` holds what was at `order[i]`.
    Permute { order: Vec<usize> },
    /// Every element was removed.
    Clear { removed: Vec<Value> },
}

// =============================================================================
// INDEX MAP
// =============================================================================

/// Net change descriptor for a collection since the last flush.
///
/// # Example
///
/// ```
/// use spark_bindings::{IndexMap, Mutation, Value};
///
/// // [a, b, c].splice(1, 1, x, y)
/// let mut map = IndexMap::identity(3);
/// map.record(&Mutation::Splice { start: 1, removed: vec![Value::from("b")], inserted: 2 });
///
/// assert_eq!(map.entries(), &[Some(0), None, None, Some(2)]);
/// assert_eq!(map.deleted_indices(), &[1]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IndexMap {
    entries: Vec<Option<usize>>,
    deleted_indices: Vec<usize>,
    deleted_items: Vec<Value>,
}

impl IndexMap {
    /// The "nothing moved" map over a collection of `len` elements.
    pub fn identity(len: usize) -> Self {
        Self {
            entries: (0..len).map(Some).collect(),
            deleted_indices: Vec::new(),
            deleted_items: Vec::new(),
        }
    }

    /// Fold one mutation into the map.
    pub fn record(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Splice {
                start,
                removed,
                inserted,
            } => self.apply_splice(*start, removed, *inserted),
            Mutation::Replace { index, old } => self.apply_replace(*index, old),
            Mutation::Permute { order } => self.apply_permute(order),
            Mutation::Clear { removed } => self.apply_clear(removed),
        }
    }

    fn apply_splice(&mut self, start: usize, removed: &[Value], inserted: usize) {
        let start = start.min(self.entries.len());
        let end = (start + removed.len()).min(self.entries.len());
        let taken: Vec<Option<usize>> = self
            .entries
            .splice(start..end, std::iter::repeat_n(None, inserted))
            .collect();
        for (entry, item) in taken.into_iter().zip(removed) {
            self.forget(entry, item);
        }
    }

    fn apply_replace(&mut self, index: usize, old: &Value) {
        if let Some(slot) = self.entries.get_mut(index) {
            let entry = slot.take();
            self.forget(entry, old);
        }
    }

    fn apply_permute(&mut self, order: &[usize]) {
        let permuted = order
            .iter()
            .map(|&from| self.entries.get(from).copied().flatten())
            .collect();
        self.entries = permuted;
    }

    fn apply_clear(&mut self, removed: &[Value]) {
        let taken = std::mem::take(&mut self.entries);
        for (entry, item) in taken.into_iter().zip(removed) {
            self.forget(entry, item);
        }
    }

    fn forget(&mut self, entry: Option<usize>, item: &Value) {
        if let Some(prior) = entry {
            self.deleted_indices.push(prior);
            self.deleted_items.push(item.clone());
        }
    }

    /// Rebuild the new order from the old one: positions with a prior index
    /// take the old element, new positions take the element from `current`.
    pub fn apply(&self, old: &[Value], current: &[Value]) -> Vec<Value> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Some(prior) => old.get(*prior).cloned().unwrap_or_default(),
                None => current.get(i).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// True if nothing was added, removed or moved.
    pub fn is_identity(&self) -> bool {
        self.deleted_indices.is_empty()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, entry)| *entry == Some(i))
    }

    /// Every prior index appears at most once, and never both kept and deleted.
    pub fn validate(&self) -> bool {
        let mut seen = AHashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .flatten()
            .chain(self.deleted_indices.iter())
            .all(|prior| seen.insert(*prior))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prior position of the element now at `index`.
    pub fn prior(&self, index: usize) -> Option<usize> {
        self.entries.get(index).copied().flatten()
    }

    /// True if the element at `index` was created during the turn.
    pub fn is_new(&self, index: usize) -> bool {
        matches!(self.entries.get(index), Some(None))
    }

    pub fn entries(&self) -> &[Option<usize>] {
        &self.entries
    }

    pub fn deleted_indices(&self) -> &[usize] {
        &self.deleted_indices
    }

    pub fn deleted_items(&self) -> &[Value] {
        &self.deleted_items
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn values(labels: &[&str]) -> Vec<Value> {
        labels.iter().map(|l| Value::from(*l)).collect()
    }

    #[test]
    fn identity_map() {
        let map = IndexMap::identity(3);
        assert!(map.is_identity());
        assert!(map.validate());
        assert_eq!(map.len(), 3);
        assert_eq!(map.prior(2), Some(2));
    }

    #[test]
    fn splice_marks_new_and_moved() {
        let mut map = IndexMap::identity(3);
        map.record(&Mutation::Splice {
            start: 1,
            removed: values(&["b"]),
            inserted: 2,
        });

        assert_eq!(map.entries(), &[Some(0), None, None, Some(2)]);
        assert!(map.is_new(1) && map.is_new(2));
        assert_eq!(map.deleted_indices(), &[1]);
        assert_eq!(map.deleted_items(), values(&["b"]).as_slice());
        assert!(map.validate());
        assert!(!map.is_identity());

        let old = values(&["a", "b", "c"]);
        let new = values(&["a", "x", "y", "c"]);
        assert_eq!(map.apply(&old, &new), new);
    }

    #[test]
    fn created_then_removed_leaves_no_trace() {
        let mut map = IndexMap::identity(1);
        map.record(&Mutation::Splice {
            start: 1,
            removed: vec![],
            inserted: 1,
        });
        map.record(&Mutation::Splice {
            start: 1,
            removed: values(&["tmp"]),
            inserted: 0,
        });
        assert!(map.is_identity());
    }

    #[test]
    fn replace_marks_position_new() {
        let mut map = IndexMap::identity(2);
        map.record(&Mutation::Replace {
            index: 0,
            old: Value::from("a"),
        });
        assert_eq!(map.entries(), &[None, Some(1)]);
        assert_eq!(map.deleted_indices(), &[0]);
    }

    #[test]
    fn permute_moves_entries() {
        let mut map = IndexMap::identity(3);
        map.record(&Mutation::Permute {
            order: vec![2, 1, 0],
        });
        assert_eq!(map.entries(), &[Some(2), Some(1), Some(0)]);

        let old = values(&["a", "b", "c"]);
        let new = values(&["c", "b", "a"]);
        assert_eq!(map.apply(&old, &new), new);
    }

    #[test]
    fn identity_permutation_stays_identity() {
        let mut map = IndexMap::identity(3);
        map.record(&Mutation::Permute {
            order: vec![0, 1, 2],
        });
        assert!(map.is_identity());
    }

    #[test]
    fn clear_then_repopulate_reports_net_effect() {
        let mut map = IndexMap::identity(2);
        map.record(&Mutation::Clear {
            removed: values(&["a", "b"]),
        });
        map.record(&Mutation::Splice {
            start: 0,
            removed: vec![],
            inserted: 3,
        });

        assert_eq!(map.entries(), &[None, None, None]);
        assert_eq!(map.deleted_indices(), &[0, 1]);
        assert!(map.validate());
    }
}
