// ============================================================================
// spark-bindings - Observer Locator
// Resolves and caches the one observer for each (target, key) pair
// ============================================================================
//
// Caching is what keeps subscriptions from fragmenting: every reader of
// `person.name` must end up on the same observer. Entries are keyed by the
// target's identity and hold the target weakly, so a discarded target is
// never kept alive by the cache. A dead entry is never returned; `sweep`
// drops them and `release` drops a live target's entries early.
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use super::collection::{ArrayIndexObserver, CollectionObserver, CollectionSizeObserver, CollectionTarget};
use super::computed::ComputedObserver;
use super::property::{PrimitiveObserver, PropertyObserver};
use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::{Observer, PropertyReader};
use crate::core::value::{Value, WeakObject, index_key};

// =============================================================================
// CACHE ENTRIES
// =============================================================================

#[derive(Clone)]
enum WeakTarget {
    Object(WeakObject),
    Collection(CollectionTarget),
}

impl WeakTarget {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Object(o) => Some(Self::Object(o.downgrade())),
            other => CollectionTarget::of(other).map(Self::Collection),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::Object(w) => w.is_alive(),
            Self::Collection(c) => c.is_alive(),
        }
    }
}

struct PropertyEntry {
    target: WeakTarget,
    observer: Rc<dyn Observer>,
}

struct CollectionEntry {
    target: CollectionTarget,
    observer: Rc<CollectionObserver>,
}

// =============================================================================
// OBSERVER LOCATOR
// =============================================================================

/// Observer registry for one engine.
///
/// # Example
///
/// ```
/// use spark_bindings::{Object, ObserverLocator, ReactiveContext, Value};
/// use std::rc::Rc;
///
/// let (ctx, _) = ReactiveContext::manual();
/// let locator = ObserverLocator::new(ctx);
/// let person = Value::from(Object::from_entries([("name", "Ada")]));
///
/// let a = locator.get_observer(&person, "name").unwrap();
/// let b = locator.get_observer(&person, "name").unwrap();
/// assert!(Rc::ptr_eq(&a, &b));
/// assert_eq!(a.get_value().unwrap(), Value::from("Ada"));
/// ```
pub struct ObserverLocator {
    ctx: Rc<ReactiveContext>,
    properties: RefCell<AHashMap<(usize, Rc<str>), PropertyEntry>>,
    collections: RefCell<AHashMap<usize, CollectionEntry>>,
    self_weak: Weak<ObserverLocator>,
}

impl ObserverLocator {
    pub fn new(ctx: Rc<ReactiveContext>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            ctx,
            properties: RefCell::new(AHashMap::new()),
            collections: RefCell::new(AHashMap::new()),
            self_weak: self_weak.clone(),
        })
    }

    pub fn context(&self) -> &Rc<ReactiveContext> {
        &self.ctx
    }

    /// The observer for `target[key]`, created and cached on first use.
    ///
    /// Resolution order: cached entry, accessor slot (computed observer),
    /// collection `length`/`size`, array index, plain data slot. Primitive
    /// targets get a constant, uncached observer.
    pub fn get_observer(&self, target: &Value, key: &str) -> Result<Rc<dyn Observer>> {
        if target.is_nullish() {
            return Err(ReactiveError::NullTarget {
                key: key.to_string(),
                target: target.type_name(),
            });
        }
        let Some(weak_target) = WeakTarget::of(target) else {
            if matches!(target, Value::Function(_)) {
                return Err(self.unobservable(target, key));
            }
            return Ok(PrimitiveObserver::new(target, key)?);
        };
        let id = target.identity().unwrap_or_default();
        let cache_key = (id, Rc::<str>::from(key));

        if let Some(entry) = self.properties.borrow().get(&cache_key) {
            if entry.target.is_alive() {
                return Ok(entry.observer.clone());
            }
        }

        let observer = self.create_observer(target, key)?;
        tracing::trace!(object = id, key, kind = target.type_name(), "observer created");
        self.properties.borrow_mut().insert(
            cache_key,
            PropertyEntry {
                target: weak_target,
                observer: observer.clone(),
            },
        );
        Ok(observer)
    }

    fn create_observer(&self, target: &Value, key: &str) -> Result<Rc<dyn Observer>> {
        match target {
            Value::Object(obj) => match obj.accessor(key) {
                Some((getter, setter)) => Ok(ComputedObserver::new(
                    self.ctx.clone(),
                    self.self_weak.clone(),
                    obj,
                    key,
                    getter,
                    setter,
                )),
                None => Ok(PropertyObserver::new(self.ctx.clone(), obj, key)),
            },
            Value::Array(_) => {
                if key == "length" {
                    let collection = self.collection_observer(target)?;
                    return Ok(CollectionSizeObserver::new(self.ctx.clone(), collection));
                }
                match index_key(key) {
                    Some(index) => {
                        let collection = self.collection_observer(target)?;
                        Ok(ArrayIndexObserver::new(self.ctx.clone(), collection, index))
                    }
                    None => Err(self.unobservable(target, key)),
                }
            }
            Value::Map(_) | Value::Set(_) if key == "size" => {
                let collection = self.collection_observer(target)?;
                Ok(CollectionSizeObserver::new(self.ctx.clone(), collection))
            }
            _ => Err(self.unobservable(target, key)),
        }
    }

    fn unobservable(&self, target: &Value, key: &str) -> ReactiveError {
        ReactiveError::UnobservableKey {
            key: key.to_string(),
            target: target.type_name(),
        }
    }

    /// The collection observer for an array, map or set.
    pub fn collection_observer(&self, target: &Value) -> Result<Rc<CollectionObserver>> {
        let (Some(weak_target), Some(id)) = (CollectionTarget::of(target), target.identity()) else {
            return Err(self.unobservable(target, "[collection]"));
        };
        if let Some(entry) = self.collections.borrow().get(&id) {
            if entry.target.is_alive() {
                return Ok(entry.observer.clone());
            }
        }
        let observer = CollectionObserver::new(self.ctx.clone(), target)
            .ok_or_else(|| self.unobservable(target, "[collection]"))?;
        tracing::trace!(object = id, kind = target.type_name(), "collection observer created");
        self.collections.borrow_mut().insert(
            id,
            CollectionEntry {
                target: weak_target,
                observer: observer.clone(),
            },
        );
        Ok(observer)
    }

    /// Read `target[key]`, recording the read when a tracking context is
    /// active. Keys that cannot be observed are read untracked.
    pub fn read(&self, target: &Value, key: &str) -> Result<Value> {
        if target.is_nullish() {
            return Err(ReactiveError::NullTarget {
                key: key.to_string(),
                target: target.type_name(),
            });
        }
        if !self.ctx.is_tracking() {
            return match target {
                Value::Object(obj) => obj.get_with(key, self),
                other => other.get_property(key),
            };
        }
        match self.get_observer(target, key) {
            Ok(observer) => observer.get_value(),
            Err(ReactiveError::UnobservableKey { .. }) => target.get_property(key),
            Err(err) => Err(err),
        }
    }

    /// Drop every cache entry for `target` and detach its watchers/hooks.
    /// Returns how many entries were removed.
    pub fn release(&self, target: &Value) -> usize {
        let Some(id) = target.identity() else {
            return 0;
        };
        let removed: Vec<PropertyEntry> = {
            let mut properties = self.properties.borrow_mut();
            let keys: Vec<(usize, Rc<str>)> = properties.keys().filter(|(t, _)| *t == id).cloned().collect();
            keys.iter().filter_map(|k| properties.remove(k)).collect()
        };
        for entry in &removed {
            if let Some(observer) = entry.observer.as_any().downcast_ref::<PropertyObserver>() {
                observer.detach();
            }
        }
        let collection = self.collections.borrow_mut().remove(&id);
        if let Some(entry) = &collection {
            entry.observer.detach();
        }
        let removed = removed.len() + usize::from(collection.is_some());
        tracing::debug!(object = id, removed, "observer cache entries released");
        removed
    }

    /// Drop cache entries whose target no longer exists.
    pub fn sweep(&self) -> usize {
        let before = self.observer_count();
        self.properties
            .borrow_mut()
            .retain(|_, entry| entry.target.is_alive());
        self.collections
            .borrow_mut()
            .retain(|_, entry| entry.target.is_alive());
        let swept = before - self.observer_count();
        if swept > 0 {
            tracing::debug!(swept, "dead observer cache entries swept");
        }
        swept
    }

    /// Number of cached observers, property and collection.
    pub fn observer_count(&self) -> usize {
        self.properties.borrow().len() + self.collections.borrow().len()
    }
}

impl PropertyReader for ObserverLocator {
    fn read(&self, target: &Value, key: &str) -> Result<Value> {
        ObserverLocator::read(self, target, key)
    }
}

// =============================================================================
// TESTS
// =============================================================================
