// ============================================================================
// spark-bindings - Property Binding
// Source expression <-> target observer, in one of four modes
// ============================================================================
//
// to-target:   bind evaluates the source tracked and writes the target; a
//              dependency change queues this binding on the flush queue, and
//              the flush re-evaluates (re-subscribing) and writes again.
// from-target: the binding subscribes to the target; a target change is
//              assigned into the source synchronously.
// two-way:     both.
// one-time:    evaluate untracked at bind, write the target, never listen.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::expression::Expression;
use super::scope::Scope;
use super::{Binding, BindingMode, Connector, TargetRelay};
use crate::collections::IndexMap;
use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::{Connectable, Flushable, Observer, Subscriber};
use crate::core::value::Value;
use crate::observation::ObserverLocator;

pub struct PropertyBinding {
    conn: Connector,
    source: Rc<dyn Expression>,
    target: Rc<dyn Observer>,
    mode: BindingMode,
    scope: RefCell<Option<Scope>>,
    target_relay: Rc<dyn Subscriber>,
    updating_target: Cell<bool>,
    updates: Cell<u64>,
    self_weak: Weak<PropertyBinding>,
}

impl PropertyBinding {
    pub fn new(
        ctx: Rc<ReactiveContext>,
        locator: Rc<ObserverLocator>,
        source: Rc<dyn Expression>,
        target: Rc<dyn Observer>,
        mode: BindingMode,
    ) -> Rc<Self> {
        let conn = Connector::new(ctx, locator);
        let target_relay: Rc<dyn Subscriber> = Rc::new(TargetRelay(conn.head.clone()));
        let binding = Rc::new_cyclic(|self_weak: &Weak<PropertyBinding>| Self {
            conn,
            source,
            target,
            mode,
            scope: RefCell::new(None),
            target_relay,
            updating_target: Cell::new(false),
            updates: Cell::new(0),
            self_weak: self_weak.clone(),
        });
        let head: Weak<dyn Binding> = Rc::downgrade(&binding) as Weak<dyn Binding>;
        binding.conn.head.set(head);
        binding
    }

    pub fn source(&self) -> &Rc<dyn Expression> {
        &self.source
    }

    pub fn target(&self) -> &Rc<dyn Observer> {
        &self.target
    }

    /// How many times the target has been written.
    pub fn update_count(&self) -> u64 {
        self.updates.get()
    }

    /// Number of observers the source currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.conn.dependency_count()
    }

    fn update_target(&self, value: Value) -> Result<()> {
        self.updating_target.set(true);
        let result = self.target.set_value(value);
        self.updating_target.set(false);
        self.updates.set(self.updates.get() + 1);
        result
    }

    fn current_scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    /// Evaluate the source and write the target.
    fn refresh(&self, scope: &Scope) -> Result<()> {
        let Some(me) = self.self_weak.upgrade() else {
            return Ok(());
        };
        let value = self
            .conn
            .evaluate_tracked(me as Rc<dyn Connectable>, &*self.source, scope)?;
        self.update_target(value)
    }

    fn connect(&self, scope: &Scope) -> Result<()> {
        if self.mode.is_one_time() {
            let value = self.conn.evaluate_untracked(&*self.source, scope)?;
            return self.update_target(value);
        }
        if self.mode.to_target() {
            self.refresh(scope)?;
        }
        if self.mode.from_target() {
            self.target.subscribe(&self.target_relay);
            if !self.mode.to_target() {
                let value = self.target.get_value()?;
                self.conn.ctx.untracked(|| {
                    self.source.assign(scope, &self.conn.locator, value)
                })?;
            }
        }
        Ok(())
    }

    fn teardown(&self) {
        self.conn.disconnect();
        self.target.unsubscribe(&self.target_relay);
        if let Some(me) = self.self_weak.upgrade() {
            let flushable: Rc<dyn Flushable> = me;
            self.conn.ctx.queue.remove(&flushable);
        }
        *self.scope.borrow_mut() = None;
    }

    fn enqueue(&self) {
        if let Some(me) = self.self_weak.upgrade() {
            self.conn.ctx.enqueue(me as Rc<dyn Flushable>);
        }
    }
}

impl Binding for PropertyBinding {
    fn bind(&self, scope: &Scope) -> Result<()> {
        if let Some(current) = self.current_scope() {
            if current.ptr_eq(scope) {
                return Ok(());
            }
            self.unbind();
        }
        if self.mode.from_target() && !self.target.is_observable() {
            return Err(ReactiveError::Misuse(format!(
                "{:?} binding of `{}` needs an observable target",
                self.mode,
                self.source.describe()
            )));
        }

        *self.scope.borrow_mut() = Some(scope.clone());
        if let Err(err) = self.connect(scope) {
            self.teardown();
            tracing::debug!(source = %self.source.describe(), %err, "bind failed");
            return Err(err);
        }
        tracing::debug!(
            source = %self.source.describe(),
            mode = ?self.mode,
            dependencies = self.conn.dependency_count(),
            "binding bound"
        );
        Ok(())
    }

    fn unbind(&self) {
        if !self.is_bound() {
            return;
        }
        self.teardown();
        tracing::debug!(source = %self.source.describe(), "binding unbound");
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }

    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        if self.is_bound() && self.mode.to_target() {
            self.enqueue();
        }
        Ok(())
    }

    fn handle_collection_change(&self, _: &IndexMap) -> Result<()> {
        if self.is_bound() && self.mode.to_target() {
            self.enqueue();
        }
        Ok(())
    }

    fn call_source(&self, value: Value) -> Result<Value> {
        if !self.mode.from_target() || self.updating_target.get() {
            return Ok(value);
        }
        let Some(scope) = self.current_scope() else {
            return Ok(value);
        };
        self.conn
            .ctx
            .untracked(|| self.source.assign(&scope, &self.conn.locator, value.clone()))?;
        Ok(value)
    }

    fn mode(&self) -> BindingMode {
        self.mode
    }

    fn set_head(&self, head: Weak<dyn Binding>) {
        self.conn.head.set(head);
    }
}

impl Connectable for PropertyBinding {
    fn observe(&self, observer: Rc<dyn Observer>) {
        self.conn.observe(observer);
    }
}

impl Flushable for PropertyBinding {
    fn flush(&self) -> Result<()> {
        match self.current_scope() {
            Some(scope) => self.refresh(&scope),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
