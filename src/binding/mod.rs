// ============================================================================
// spark-bindings - Bindings
// The binding state machine, its concrete kinds and interceptors
// ============================================================================
//
// Every binding is `unbound` or `bound`. `bind(scope)` evaluates the source
// under the dependency tracker and subscribes to exactly what it read;
// `unbind()` drops every subscription, any queued flush and the scope.
//
// Observers never call a binding directly. They notify relays owned by the
// innermost binding, and the relays route to the *head* of the chain: the
// outermost interceptor if any are installed, the binding itself otherwise.
// That is how an interceptor owns the binding's entry points without the
// binding knowing about it.
// ============================================================================

pub mod accessor;
pub mod call;
pub mod effect;
pub mod expression;
pub mod interceptor;
pub mod let_binding;
pub mod property;
pub mod reference;
pub mod scope;
pub mod signaler;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::collections::IndexMap;
use crate::core::constants::*;
use crate::core::context::ReactiveContext;
use crate::core::error::Result;
use crate::core::types::{Connectable, Observer, Subscriber};
use crate::core::value::Value;
use crate::observation::ObserverLocator;
use crate::reactivity::tracking::ObserverRecord;

pub use accessor::CallbackAccessor;
pub use call::CallBinding;
pub use effect::{Effect, EffectHandle};
pub use expression::{AccessKeyed, AccessMember, AccessScope, Expression, FnExpression, Literal};
pub use interceptor::{Interceptor, InterceptorSpec};
pub use let_binding::LetBinding;
pub use property::PropertyBinding;
pub use reference::RefBinding;
pub use scope::Scope;
pub use signaler::Signaler;

// =============================================================================
// BINDING MODE
// =============================================================================

/// Direction of data flow between source expression and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingMode {
    /// Evaluate once at bind, never subscribe
    OneTime,
    /// Source changes update the target
    ToTarget,
    /// Target changes are assigned back to the source
    FromTarget,
    /// Both directions
    TwoWay,
}

impl BindingMode {
    pub fn flags(self) -> u32 {
        match self {
            BindingMode::OneTime => ONE_TIME,
            BindingMode::ToTarget => TO_TARGET,
            BindingMode::FromTarget => FROM_TARGET,
            BindingMode::TwoWay => TWO_WAY,
        }
    }

    pub fn is_one_time(self) -> bool {
        self.flags() & ONE_TIME != 0
    }

    pub fn to_target(self) -> bool {
        self.flags() & TO_TARGET != 0
    }

    pub fn from_target(self) -> bool {
        self.flags() & FROM_TARGET != 0
    }
}

// =============================================================================
// BINDING TRAIT
// =============================================================================

/// The shared lifecycle of every binding kind and interceptor.
pub trait Binding {
    /// `unbound -> bound`. All-or-nothing: on error the binding stays
    /// unbound with no subscriptions.
    fn bind(&self, scope: &Scope) -> Result<()>;

    /// `bound -> unbound`. Idempotent.
    fn unbind(&self);

    fn is_bound(&self) -> bool;

    /// A source dependency changed.
    fn handle_change(&self, new_value: &Value, old_value: &Value) -> Result<()>;

    /// A source collection flushed a change descriptor.
    fn handle_collection_change(&self, index_map: &IndexMap) -> Result<()>;

    /// Target-side write flowing back into the source (or, for call
    /// bindings, the target invoking the source). Applied synchronously.
    fn call_source(&self, value: Value) -> Result<Value>;

    fn mode(&self) -> BindingMode;

    /// True if the binding's interesting entry point is `call_source`
    /// rather than `handle_change`.
    fn flows_from_target(&self) -> bool {
        self.mode().from_target()
    }

    /// Route notifications for this binding (and any it wraps) to `head`.
    fn set_head(&self, head: Weak<dyn Binding>);
}

// =============================================================================
// HEAD + RELAYS
// =============================================================================

/// Shared pointer to the current entry point of a binding chain.
#[derive(Clone, Default)]
pub(crate) struct Head(Rc<RefCell<Option<Weak<dyn Binding>>>>);

impl Head {
    pub(crate) fn set(&self, head: Weak<dyn Binding>) {
        *self.0.borrow_mut() = Some(head);
    }

    pub(crate) fn get(&self) -> Option<Rc<dyn Binding>> {
        self.0.borrow().as_ref().and_then(Weak::upgrade)
    }
}

/// Subscribed to source dependencies; forwards to `head.handle_change`.
pub(crate) struct SourceRelay(pub(crate) Head);

impl Subscriber for SourceRelay {
    fn handle_change(&self, new_value: &Value, old_value: &Value) -> Result<()> {
        match self.0.get() {
            Some(head) => head.handle_change(new_value, old_value),
            None => Ok(()),
        }
    }

    fn handle_collection_change(&self, index_map: &IndexMap) -> Result<()> {
        match self.0.get() {
            Some(head) => head.handle_collection_change(index_map),
            None => Ok(()),
        }
    }
}

/// Subscribed to the target; forwards target writes to `head.call_source`.
pub(crate) struct TargetRelay(pub(crate) Head);

impl Subscriber for TargetRelay {
    fn handle_change(&self, new_value: &Value, _: &Value) -> Result<()> {
        match self.0.get() {
            Some(head) => head.call_source(new_value.clone()).map(|_| ()),
            None => Ok(()),
        }
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// Source-side plumbing shared by bindings that track an expression.
pub(crate) struct Connector {
    pub(crate) ctx: Rc<ReactiveContext>,
    pub(crate) locator: Rc<ObserverLocator>,
    pub(crate) head: Head,
    record: ObserverRecord,
    relay: Rc<dyn Subscriber>,
}

impl Connector {
    pub(crate) fn new(ctx: Rc<ReactiveContext>, locator: Rc<ObserverLocator>) -> Self {
        let head = Head::default();
        Self {
            ctx,
            locator,
            relay: Rc::new(SourceRelay(head.clone())),
            head,
            record: ObserverRecord::new(),
        }
    }

    /// Evaluate `source` as `frame`, re-subscribing to exactly what it read.
    /// A collection result is observed as a whole as well.
    pub(crate) fn evaluate_tracked(
        &self,
        frame: Rc<dyn Connectable>,
        source: &dyn Expression,
        scope: &Scope,
    ) -> Result<Value> {
        self.record.begin();
        let value = self
            .ctx
            .tracker
            .track(frame, || source.evaluate(scope, &self.locator))?;
        if value.is_collection() {
            let observer = self.locator.collection_observer(&value)?;
            self.record.observe(observer, &self.relay);
        }
        self.record.clear_stale(&self.relay);
        Ok(value)
    }

    pub(crate) fn evaluate_untracked(&self, source: &dyn Expression, scope: &Scope) -> Result<Value> {
        self.ctx.untracked(|| source.evaluate(scope, &self.locator))
    }

    /// Called from the binding's `Connectable::observe`.
    pub(crate) fn observe(&self, observer: Rc<dyn Observer>) {
        self.record.observe(observer, &self.relay);
    }

    /// Drop every source subscription.
    pub(crate) fn disconnect(&self) {
        self.record.clear_all(&self.relay);
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.record.count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
