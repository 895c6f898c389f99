// ============================================================================
// spark-bindings - Call Binding
// Installs a callable on the target that evaluates the source expression
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::expression::Expression;
use super::scope::Scope;
use super::{Binding, BindingMode, Head};
use crate::collections::IndexMap;
use crate::core::context::ReactiveContext;
use crate::core::error::Result;
use crate::core::types::Observer;
use crate::core::value::{Function, Value};
use crate::observation::ObserverLocator;

/// `click.call="save($event)"`.
///
/// While bound, the target holds a `Function`. Calling it evaluates the
/// source in a child scope where `$event` is the first argument, and returns
/// the result. The data flows from the target, so debounce and throttle
/// intercept the call itself.
pub struct CallBinding {
    ctx: Rc<ReactiveContext>,
    locator: Rc<ObserverLocator>,
    head: Head,
    source: Rc<dyn Expression>,
    target: Rc<dyn Observer>,
    scope: RefCell<Option<Scope>>,
    calls: Cell<u64>,
}

impl CallBinding {
    pub fn new(
        ctx: Rc<ReactiveContext>,
        locator: Rc<ObserverLocator>,
        source: Rc<dyn Expression>,
        target: Rc<dyn Observer>,
    ) -> Rc<Self> {
        let binding = Rc::new(Self {
            ctx,
            locator,
            head: Head::default(),
            source,
            target,
            scope: RefCell::new(None),
            calls: Cell::new(0),
        });
        let head: Weak<dyn Binding> = Rc::downgrade(&binding) as Weak<dyn Binding>;
        binding.head.set(head);
        binding
    }

    /// How many times the source has been evaluated through the target.
    pub fn call_count(&self) -> u64 {
        self.calls.get()
    }
}

impl Binding for CallBinding {
    fn bind(&self, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            self.unbind();
        }
        let head = self.head.clone();
        let callable = Function::new(move |args: &[Value]| match head.get() {
            Some(entry) => entry.call_source(args.first().cloned().unwrap_or_default()),
            None => Ok(Value::Undefined),
        });
        self.target.set_value(Value::Function(callable))?;
        *self.scope.borrow_mut() = Some(scope.clone());
        tracing::debug!(source = %self.source.describe(), "call binding bound");
        Ok(())
    }

    fn unbind(&self) {
        if self.scope.borrow_mut().take().is_none() {
            return;
        }
        if let Err(err) = self.target.set_value(Value::Undefined) {
            tracing::warn!(%err, "could not uninstall call binding target");
        }
        tracing::debug!(source = %self.source.describe(), "call binding unbound");
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }

    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        Ok(())
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        Ok(())
    }

    fn call_source(&self, event: Value) -> Result<Value> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(Value::Undefined);
        };
        let scope = scope.with_override("$event", event);
        self.calls.set(self.calls.get() + 1);
        self.ctx
            .untracked(|| self.source.evaluate(&scope, &self.locator))
    }

    fn mode(&self) -> BindingMode {
        BindingMode::FromTarget
    }

    fn set_head(&self, head: Weak<dyn Binding>) {
        self.head.set(head);
    }
}

// =============================================================================
// TESTS
// =============================================================================
