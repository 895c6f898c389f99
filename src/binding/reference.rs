// ============================================================================
// spark-bindings - Ref Binding
// Publishes a target reference into the source location
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::expression::Expression;
use super::scope::Scope;
use super::{Binding, BindingMode};
use crate::collections::IndexMap;
use crate::core::context::ReactiveContext;
use crate::core::error::Result;
use crate::core::value::Value;
use crate::observation::ObserverLocator;
use crate::reactivity::equality::same_value;

/// `ref="input"`: on bind, assigns `target` to the source expression; on
/// unbind, clears the source back to `Null` if it still holds `target`.
pub struct RefBinding {
    ctx: Rc<ReactiveContext>,
    locator: Rc<ObserverLocator>,
    source: Rc<dyn Expression>,
    target: Value,
    scope: RefCell<Option<Scope>>,
}

impl RefBinding {
    pub fn new(
        ctx: Rc<ReactiveContext>,
        locator: Rc<ObserverLocator>,
        source: Rc<dyn Expression>,
        target: Value,
    ) -> Rc<Self> {
        Rc::new(Self {
            ctx,
            locator,
            source,
            target,
            scope: RefCell::new(None),
        })
    }

    pub fn target(&self) -> &Value {
        &self.target
    }
}

impl Binding for RefBinding {
    fn bind(&self, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            self.unbind();
        }
        self.ctx
            .untracked(|| self.source.assign(scope, &self.locator, self.target.clone()))?;
        *self.scope.borrow_mut() = Some(scope.clone());
        Ok(())
    }

    fn unbind(&self) {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return;
        };
        let result = self.ctx.untracked(|| {
            let current = self.source.evaluate(&scope, &self.locator)?;
            if same_value(&current, &self.target) {
                self.source.assign(&scope, &self.locator, Value::Null)?;
            }
            Ok(())
        });
        if let Err(err) = result {
            self.ctx.errors.report_unhandled(err);
        }
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

    fn call_source(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn mode(&self) -> BindingMode {
        BindingMode::OneTime
    }

    fn set_head(&self, _: Weak<dyn Binding>) {}
}

// =============================================================================
// TESTS
// =============================================================================
