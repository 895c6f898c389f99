// ============================================================================
// spark-bindings - Scope
// The binding context chain expressions resolve names against
// ============================================================================

use std::rc::Rc;

use crate::core::value::{Object, Value};

struct ScopeInner {
    binding_context: Value,
    override_context: Object,
    parent: Option<Scope>,
}

/// A binding context plus an override context, chained to a parent scope.
///
/// Names resolve against the override context first (`$event`, let-bound
/// locals), then the binding context, then up the parent chain.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new(binding_context: impl Into<Value>) -> Self {
        Self::create(binding_context.into(), None)
    }

    /// A child scope whose parent is `self`.
    pub fn child(&self, binding_context: impl Into<Value>) -> Self {
        Self::create(binding_context.into(), Some(self.clone()))
    }

    fn create(binding_context: Value, parent: Option<Scope>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                binding_context,
                override_context: Object::new(),
                parent,
            }),
        }
    }

    /// Same binding context, with `name` set in a fresh override layer.
    pub fn with_override(&self, name: &str, value: Value) -> Self {
        let override_context = Object::new();
        for key in self.inner.override_context.keys() {
            if let Ok(v) = self.inner.override_context.get(&key) {
                // Data slots only: copying cannot fail
                let _ = override_context.set(&key, v);
            }
        }
        let _ = override_context.set(name, value);
        Self {
            inner: Rc::new(ScopeInner {
                binding_context: self.inner.binding_context.clone(),
                override_context,
                parent: self.inner.parent.clone(),
            }),
        }
    }

    pub fn binding_context(&self) -> &Value {
        &self.inner.binding_context
    }

    pub fn override_context(&self) -> &Object {
        &self.inner.override_context
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// The object `name` should be read from or assigned to.
    ///
    /// `ancestor > 0` skips that many parents and uses that scope's binding
    /// context directly. Otherwise the first scope (walking up) whose
    /// override or binding context has `name` wins; if none has it, the
    /// current binding context is used so assignments create the slot there.
    pub fn context_for(&self, name: &str, ancestor: usize) -> Value {
        if ancestor > 0 {
            let mut scope = self;
            for _ in 0..ancestor {
                match scope.parent() {
                    Some(parent) => scope = parent,
                    None => return Value::Undefined,
                }
            }
            return scope.binding_context().clone();
        }

        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.inner.override_context.has(name) {
                return Value::Object(scope.inner.override_context.clone());
            }
            if let Value::Object(obj) = &scope.inner.binding_context {
                if obj.has(name) {
                    return scope.inner.binding_context.clone();
                }
            }
            current = scope.parent();
        }
        self.inner.binding_context.clone()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("binding_context", &self.inner.binding_context)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_override_before_binding_context() {
        let vm = Object::from_entries([("name", "vm")]);
        let scope = Scope::new(vm.clone()).with_override("name", Value::from("local"));
        let ctx = scope.context_for("name", 0);
        assert!(!ctx.as_object().unwrap().ptr_eq(&vm));
        assert_eq!(ctx.get_property("name").unwrap(), Value::from("local"));
    }

    #[test]
    fn walks_up_to_parent_that_has_name() {
        let parent_vm = Object::from_entries([("title", "outer")]);
        let child_vm = Object::from_entries([("item", 1)]);
        let scope = Scope::new(parent_vm.clone()).child(child_vm.clone());

        assert!(scope.context_for("title", 0).as_object().unwrap().ptr_eq(&parent_vm));
        assert!(scope.context_for("item", 0).as_object().unwrap().ptr_eq(&child_vm));
        // Unknown names land on the nearest binding context
        assert!(scope.context_for("missing", 0).as_object().unwrap().ptr_eq(&child_vm));
    }

    #[test]
    fn explicit_ancestor_hops() {
        let root = Object::new();
        let scope = Scope::new(root.clone()).child(Object::new());
        assert!(scope.context_for("x", 1).as_object().unwrap().ptr_eq(&root));
        assert_eq!(scope.context_for("x", 2), Value::Undefined);
    }
}
