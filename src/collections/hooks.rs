// ============================================================================
// spark-bindings - Collection Hooks
// The weakly held observers a collection reports its mutations to
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::index_map::Mutation;
use crate::core::types::{CollectionHook, weak_addr};

/// One hook per engine observing the collection; usually just one.
#[derive(Default)]
pub(crate) struct Hooks {
    entries: RefCell<SmallVec<[Weak<dyn CollectionHook>; 1]>>,
}

impl Hooks {
    /// Add `hook`. Adding the same hook twice is a no-op.
    pub(crate) fn add(&self, hook: Weak<dyn CollectionHook>) {
        let addr = weak_addr(&hook);
        let mut entries = self.entries.borrow_mut();
        entries.retain(|h| h.strong_count() > 0);
        if !entries.iter().any(|h| weak_addr(h) == addr) {
            entries.push(hook);
        }
    }

    pub(crate) fn remove(&self, hook: &Weak<dyn CollectionHook>) {
        let addr = weak_addr(hook);
        self.entries
            .borrow_mut()
            .retain(|h| h.strong_count() > 0 && weak_addr(h) != addr);
    }

    pub(crate) fn count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|h| h.strong_count() > 0)
            .count()
    }

    /// Tell every live hook. Call with no storage borrow held.
    pub(crate) fn notify(&self, mutation: Mutation) {
        let hooks: SmallVec<[Rc<dyn CollectionHook>; 1]> =
            self.entries.borrow().iter().filter_map(Weak::upgrade).collect();
        let Some((last, rest)) = hooks.split_last() else {
            return;
        };
        for hook in rest {
            hook.collection_mutated(mutation.clone());
        }
        last.collection_mutated(mutation);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Count(Cell<u32>);

    impl CollectionHook for Count {
        fn collection_mutated(&self, _: Mutation) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn every_hook_hears_each_mutation() {
        let hooks = Hooks::default();
        let a = Rc::new(Count::default());
        let b = Rc::new(Count::default());
        let a_dyn: Rc<dyn CollectionHook> = a.clone();
        let b_dyn: Rc<dyn CollectionHook> = b.clone();
        hooks.add(Rc::downgrade(&a_dyn));
        hooks.add(Rc::downgrade(&a_dyn));
        hooks.add(Rc::downgrade(&b_dyn));
        assert_eq!(hooks.count(), 2);

        hooks.notify(Mutation::Clear { removed: Vec::new() });
        assert_eq!((a.0.get(), b.0.get()), (1, 1));

        hooks.remove(&Rc::downgrade(&a_dyn));
        hooks.notify(Mutation::Clear { removed: Vec::new() });
        assert_eq!((a.0.get(), b.0.get()), (1, 2));
    }
}
