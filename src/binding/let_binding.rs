// ============================================================================
// spark-bindings - Let Binding
// Keeps a named local in the scope equal to a source expression
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::expression::Expression;
use super::scope::Scope;
use super::{Binding, BindingMode, Connector};
use crate::collections::IndexMap;
use crate::core::context::ReactiveContext;
use crate::core::error::Result;
use crate::core::types::{Connectable, Observer};
use crate::core::value::Value;
use crate::observation::ObserverLocator;

/// `<let full-name.bind="first + ' ' + last">`.
///
/// Writes into the override context by default, or into the binding context
/// with `to_binding_context`. Unlike property bindings, a dependency change
/// re-evaluates immediately: other bindings reading the local then queue
/// themselves in the same flush pass.
pub struct LetBinding {
    conn: Connector,
    source: Rc<dyn Expression>,
    name: Rc<str>,
    to_binding_context: bool,
    scope: RefCell<Option<Scope>>,
    self_weak: Weak<LetBinding>,
}

impl LetBinding {
    pub fn new(
        ctx: Rc<ReactiveContext>,
        locator: Rc<ObserverLocator>,
        source: Rc<dyn Expression>,
        name: &str,
        to_binding_context: bool,
    ) -> Rc<Self> {
        let binding = Rc::new_cyclic(|self_weak: &Weak<LetBinding>| Self {
            conn: Connector::new(ctx, locator),
            source,
            name: Rc::from(name),
            to_binding_context,
            scope: RefCell::new(None),
            self_weak: self_weak.clone(),
        });
        let head: Weak<dyn Binding> = Rc::downgrade(&binding) as Weak<dyn Binding>;
        binding.conn.head.set(head);
        binding
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn destination(&self, scope: &Scope) -> Value {
        if self.to_binding_context {
            scope.binding_context().clone()
        } else {
            Value::Object(scope.override_context().clone())
        }
    }

    fn refresh(&self, scope: &Scope) -> Result<()> {
        let Some(me) = self.self_weak.upgrade() else {
            return Ok(());
        };
        let value = self
            .conn
            .evaluate_tracked(me as Rc<dyn Connectable>, &*self.source, scope)?;
        self.destination(scope).set_property(&self.name, value)
    }
}

impl Binding for LetBinding {
    fn bind(&self, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            self.unbind();
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        if let Err(err) = self.refresh(scope) {
            self.conn.disconnect();
            *self.scope.borrow_mut() = None;
            return Err(err);
        }
        tracing::debug!(name = %self.name, source = %self.source.describe(), "let binding bound");
        Ok(())
    }

    fn unbind(&self) {
        if self.scope.borrow_mut().take().is_none() {
            return;
        }
        self.conn.disconnect();
        tracing::debug!(name = %self.name, "let binding unbound");
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }

    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        let scope = self.scope.borrow().clone();
        match scope {
            Some(scope) => self.refresh(&scope),
            None => Ok(()),
        }
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        self.handle_change(&Value::Undefined, &Value::Undefined)
    }

    fn call_source(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn mode(&self) -> BindingMode {
        BindingMode::ToTarget
    }

    fn set_head(&self, head: Weak<dyn Binding>) {
        self.conn.head.set(head);
    }
}

impl Connectable for LetBinding {
    fn observe(&self, observer: Rc<dyn Observer>) {
        self.conn.observe(observer);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::expression::func;
    use crate::core::value::Object;

    fn full_name() -> Rc<dyn Expression> {
        func("first + ' ' + last", |scope, locator| {
            let vm = scope.binding_context();
            let first = locator.read(vm, "first")?;
            let last = locator.read(vm, "last")?;
            Ok(Value::from(format!(
                "{} {}",
                first.as_str().unwrap_or_default(),
                last.as_str().unwrap_or_default()
            )))
        })
    }

    #[test]
    fn keeps_override_local_current() {
        let (ctx, _) = ReactiveContext::manual();
        let locator = ObserverLocator::new(ctx.clone());
        let vm = Object::from_entries([("first", "Ada"), ("last", "Lovelace")]);
        let scope = Scope::new(vm.clone());
        let binding = LetBinding::new(ctx, locator, full_name(), "fullName", false);

        binding.bind(&scope).unwrap();
        assert_eq!(scope.override_context().get("fullName").unwrap(), Value::from("Ada Lovelace"));
        assert!(!vm.has("fullName"));

        vm.set("last", Value::from("King")).unwrap();
        assert_eq!(scope.override_context().get("fullName").unwrap(), Value::from("Ada King"));

        binding.unbind();
        vm.set("first", Value::from("Augusta")).unwrap();
        assert_eq!(scope.override_context().get("fullName").unwrap(), Value::from("Ada King"));
    }

    #[test]
    fn can_write_to_binding_context() {
        let (ctx, _) = ReactiveContext::manual();
        let locator = ObserverLocator::new(ctx.clone());
        let vm = Object::from_entries([("first", "Ada"), ("last", "Lovelace")]);
        let binding = LetBinding::new(ctx, locator, full_name(), "fullName", true);
        binding.bind(&Scope::new(vm.clone())).unwrap();
        assert_eq!(vm.get("fullName").unwrap(), Value::from("Ada Lovelace"));
    }
}
