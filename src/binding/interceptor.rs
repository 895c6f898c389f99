// ============================================================================
// spark-bindings - Interceptors
// Decorators that own a binding's entry points and decide when to forward
// ============================================================================
//
// An interceptor wraps `next` (a binding or another interceptor) and makes
// itself the head of the chain, so relays deliver `handle_change` and
// `call_source` to it first. Chains are built in declared order: the first
// spec wraps the binding, the last one is the outermost entry point.
//
// Debounce and throttle intercept `call_source` when the wrapped binding
// flows from its target (from-target, two-way, call) and `handle_change`
// otherwise. Signal swallows source changes and forwards on a named signal.
// Update-trigger buffers target writes until a named event fires.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::scope::Scope;
use super::signaler::Signaler;
use super::{Binding, BindingMode};
use crate::collections::IndexMap;
use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::Subscriber;
use crate::core::value::Value;
use crate::reactivity::equality::same_value;
use crate::reactivity::scheduling::TaskHandle;

/// Delay used by `debounce()` / `throttle()` when nothing else is configured.
pub const DEFAULT_INTERCEPT_DELAY: Duration = Duration::from_millis(200);

// =============================================================================
// SPEC
// =============================================================================

/// Declarative description of one interceptor. `None` delays take the
/// engine default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptorSpec {
    Debounce(Option<Duration>),
    Throttle(Option<Duration>),
    Signal(Vec<String>),
    UpdateTrigger(Vec<String>),
}

impl InterceptorSpec {
    pub fn debounce() -> Self {
        Self::Debounce(None)
    }

    pub fn debounce_for(delay: Duration) -> Self {
        Self::Debounce(Some(delay))
    }

    pub fn throttle() -> Self {
        Self::Throttle(None)
    }

    pub fn throttle_for(delay: Duration) -> Self {
        Self::Throttle(Some(delay))
    }

    pub fn signal<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Signal(names.into_iter().map(Into::into).collect())
    }

    pub fn update_trigger<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UpdateTrigger(events.into_iter().map(Into::into).collect())
    }

    /// Fill unset delays.
    pub fn with_defaults(self, debounce: Duration, throttle: Duration) -> Self {
        match self {
            Self::Debounce(None) => Self::Debounce(Some(debounce)),
            Self::Throttle(None) => Self::Throttle(Some(throttle)),
            other => other,
        }
    }
}

enum Kind {
    Debounce(Duration),
    Throttle(Duration),
    Signal(Vec<Rc<str>>),
    UpdateTrigger(Vec<Rc<str>>),
}

impl Kind {
    fn from_spec(spec: InterceptorSpec) -> Self {
        let names = |names: Vec<String>| -> Vec<Rc<str>> { names.into_iter().map(Rc::from).collect() };
        match spec {
            InterceptorSpec::Debounce(delay) => Kind::Debounce(delay.unwrap_or(DEFAULT_INTERCEPT_DELAY)),
            InterceptorSpec::Throttle(delay) => Kind::Throttle(delay.unwrap_or(DEFAULT_INTERCEPT_DELAY)),
            InterceptorSpec::Signal(list) => Kind::Signal(names(list)),
            InterceptorSpec::UpdateTrigger(list) => Kind::UpdateTrigger(names(list)),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Kind::Debounce(_) => "debounce",
            Kind::Throttle(_) => "throttle",
            Kind::Signal(_) => "signal",
            Kind::UpdateTrigger(_) => "update-trigger",
        }
    }

    fn channels(&self) -> &[Rc<str>] {
        match self {
            Kind::Signal(names) | Kind::UpdateTrigger(names) => names,
            _ => &[],
        }
    }
}

/// A call held back by an interceptor.
enum Pending {
    Change(Value, Value),
    Collection(IndexMap),
    Call(Value),
}

impl Pending {
    /// Value compared by throttle. Collection changes always count as new.
    fn key(&self) -> Option<&Value> {
        match self {
            Pending::Change(new_value, _) => Some(new_value),
            Pending::Call(value) => Some(value),
            Pending::Collection(_) => None,
        }
    }
}

// =============================================================================
// INTERCEPTOR
// =============================================================================

pub struct Interceptor {
    ctx: Rc<ReactiveContext>,
    signaler: Rc<Signaler>,
    next: Rc<dyn Binding>,
    kind: Kind,
    pending: RefCell<Option<Pending>>,
    timer: RefCell<Option<TaskHandle>>,
    last_forwarded: RefCell<Option<Value>>,
    forwarded: Cell<u64>,
    listener: Rc<dyn Subscriber>,
    self_weak: Weak<Interceptor>,
}

/// Registered with the signaler; routes signals back to the interceptor.
struct TriggerRelay(Weak<Interceptor>);

impl Subscriber for TriggerRelay {
    fn handle_change(&self, _: &Value, _: &Value) -> Result<()> {
        match self.0.upgrade() {
            Some(interceptor) => interceptor.on_trigger(),
            None => Ok(()),
        }
    }
}

impl Interceptor {
    /// Wrap `next` and become its head.
    pub fn new(
        ctx: Rc<ReactiveContext>,
        signaler: Rc<Signaler>,
        next: Rc<dyn Binding>,
        spec: InterceptorSpec,
    ) -> Rc<Self> {
        let interceptor = Rc::new_cyclic(|self_weak: &Weak<Interceptor>| Self {
            ctx,
            signaler,
            next,
            kind: Kind::from_spec(spec),
            pending: RefCell::new(None),
            timer: RefCell::new(None),
            last_forwarded: RefCell::new(None),
            forwarded: Cell::new(0),
            listener: Rc::new(TriggerRelay(self_weak.clone())),
            self_weak: self_weak.clone(),
        });
        let head: Weak<dyn Binding> = Rc::downgrade(&interceptor) as Weak<dyn Binding>;
        interceptor.next.set_head(head);
        interceptor
    }

    /// Wrap `binding` in each spec in turn. Returns the outermost entry
    /// point, which the caller must keep alive.
    pub fn chain(
        ctx: &Rc<ReactiveContext>,
        signaler: &Rc<Signaler>,
        binding: Rc<dyn Binding>,
        specs: impl IntoIterator<Item = InterceptorSpec>,
    ) -> Rc<dyn Binding> {
        specs.into_iter().fold(binding, |next, spec| {
            Interceptor::new(ctx.clone(), signaler.clone(), next, spec) as Rc<dyn Binding>
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind.label()
    }

    pub fn next(&self) -> &Rc<dyn Binding> {
        &self.next
    }

    /// True while a call is being held back.
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// How many held or intercepted calls were passed on.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.get()
    }

    fn intercepts_calls(&self) -> bool {
        self.next.flows_from_target()
    }

    fn validate(&self) -> Result<()> {
        match &self.kind {
            Kind::Signal(names) if names.is_empty() => Err(ReactiveError::Misuse(
                "signal interceptor needs at least one signal name".into(),
            )),
            Kind::UpdateTrigger(events) if events.is_empty() => Err(ReactiveError::Misuse(
                "update-trigger interceptor needs at least one event name".into(),
            )),
            Kind::UpdateTrigger(_) if !self.next.flows_from_target() => Err(ReactiveError::Misuse(
                format!("update-trigger needs a from-target binding, got {:?}", self.next.mode()),
            )),
            _ => Ok(()),
        }
    }

    fn forward(&self, pending: Pending) -> Result<Value> {
        self.forwarded.set(self.forwarded.get() + 1);
        match pending {
            Pending::Change(new_value, old_value) => {
                self.next.handle_change(&new_value, &old_value).map(|_| Value::Undefined)
            }
            Pending::Collection(index_map) => self
                .next
                .handle_collection_change(&index_map)
                .map(|_| Value::Undefined),
            Pending::Call(value) => self.next.call_source(value),
        }
    }

    /// Forward from a timer or signal, where there is no caller to return to.
    fn forward_detached(&self, pending: Pending) {
        if let Err(err) = self.forward(pending) {
            self.ctx.errors.report_unhandled(err);
        }
    }

    fn take_pending(&self) -> Option<Pending> {
        self.pending.borrow_mut().take()
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.borrow_mut().take() {
            timer.cancel();
        }
    }

    fn arm_timer(&self, delay: Duration) {
        self.cancel_timer();
        let weak = self.self_weak.clone();
        let handle = self.ctx.scheduler.queue_delayed(
            delay,
            Box::new(move || {
                if let Some(interceptor) = weak.upgrade() {
                    interceptor.on_timer();
                }
            }),
        );
        *self.timer.borrow_mut() = Some(handle);
    }

    fn window_open(&self) -> bool {
        self.timer.borrow().as_ref().is_some_and(TaskHandle::is_pending)
    }

    /// Entry point for every intercepted call.
    fn intercept(&self, pending: Pending) -> Result<Value> {
        if !self.next.is_bound() {
            return Ok(Value::Undefined);
        }
        match self.kind {
            Kind::Debounce(delay) => {
                *self.pending.borrow_mut() = Some(pending);
                self.arm_timer(delay);
                tracing::trace!(delay_ms = delay.as_millis() as u64, "debounce re-armed");
                Ok(Value::Undefined)
            }
            Kind::Throttle(delay) => {
                if self.window_open() {
                    *self.pending.borrow_mut() = Some(pending);
                    return Ok(Value::Undefined);
                }
                *self.last_forwarded.borrow_mut() = pending.key().cloned();
                self.arm_timer(delay);
                self.forward(pending)
            }
            Kind::Signal(_) => Ok(Value::Undefined),
            Kind::UpdateTrigger(_) => {
                *self.pending.borrow_mut() = Some(pending);
                Ok(Value::Undefined)
            }
        }
    }

    fn on_timer(&self) {
        self.timer.borrow_mut().take();
        match self.kind {
            Kind::Debounce(_) => {
                if let Some(pending) = self.take_pending() {
                    tracing::debug!("debounce window elapsed, forwarding");
                    self.forward_detached(pending);
                }
            }
            Kind::Throttle(delay) => {
                let Some(pending) = self.take_pending() else {
                    return;
                };
                let differs = match (pending.key(), self.last_forwarded.borrow().as_ref()) {
                    (Some(value), Some(last)) => !same_value(value, last),
                    _ => true,
                };
                if differs {
                    tracing::debug!("throttle window elapsed, forwarding latest");
                    *self.last_forwarded.borrow_mut() = pending.key().cloned();
                    self.arm_timer(delay);
                    self.forward_detached(pending);
                }
            }
            Kind::Signal(_) | Kind::UpdateTrigger(_) => {}
        }
    }

    fn on_trigger(&self) -> Result<()> {
        if !self.next.is_bound() {
            return Ok(());
        }
        match self.kind {
            Kind::Signal(_) => self
                .forward(Pending::Change(Value::Undefined, Value::Undefined))
                .map(|_| ()),
            Kind::UpdateTrigger(_) => match self.take_pending() {
                Some(pending) => self.forward(pending).map(|_| ()),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn reset(&self) {
        self.cancel_timer();
        self.pending.borrow_mut().take();
        self.last_forwarded.borrow_mut().take();
    }
}

impl Binding for Interceptor {
    fn bind(&self, scope: &Scope) -> Result<()> {
        self.validate()?;
        self.next.bind(scope)?;
        for name in self.kind.channels() {
            self.signaler.add_listener(name, &self.listener);
        }
        tracing::debug!(kind = self.kind.label(), "interceptor bound");
        Ok(())
    }

    fn unbind(&self) {
        self.reset();
        for name in self.kind.channels() {
            self.signaler.remove_listener(name, &self.listener);
        }
        self.next.unbind();
    }

    fn is_bound(&self) -> bool {
        self.next.is_bound()
    }

    fn handle_change(&self, new_value: &Value, old_value: &Value) -> Result<()> {
        let intercepted = match self.kind {
            Kind::Debounce(_) | Kind::Throttle(_) => !self.intercepts_calls(),
            Kind::Signal(_) => true,
            Kind::UpdateTrigger(_) => false,
        };
        if intercepted {
            self.intercept(Pending::Change(new_value.clone(), old_value.clone()))
                .map(|_| ())
        } else {
            self.next.handle_change(new_value, old_value)
        }
    }

    fn handle_collection_change(&self, index_map: &IndexMap) -> Result<()> {
        let intercepted = match self.kind {
            Kind::Debounce(_) | Kind::Throttle(_) => !self.intercepts_calls(),
            Kind::Signal(_) => true,
            Kind::UpdateTrigger(_) => false,
        };
        if intercepted {
            self.intercept(Pending::Collection(index_map.clone())).map(|_| ())
        } else {
            self.next.handle_collection_change(index_map)
        }
    }

    fn call_source(&self, value: Value) -> Result<Value> {
        let intercepted = match self.kind {
            Kind::Debounce(_) | Kind::Throttle(_) => self.intercepts_calls(),
            Kind::Signal(_) => false,
            Kind::UpdateTrigger(_) => true,
        };
        if intercepted {
            self.intercept(Pending::Call(value))
        } else {
            self.next.call_source(value)
        }
    }

    fn mode(&self) -> BindingMode {
        self.next.mode()
    }

    fn flows_from_target(&self) -> bool {
        self.next.flows_from_target()
    }

    fn set_head(&self, head: Weak<dyn Binding>) {
        self.next.set_head(head);
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

// =============================================================================
// TESTS
// =============================================================================
