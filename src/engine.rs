// ============================================================================
// spark-bindings - Engine
// One-stop facade wiring context, observer locator and signaler together
// ============================================================================

use std::rc::Rc;
use std::time::Duration;

use crate::binding::interceptor::DEFAULT_INTERCEPT_DELAY;
use crate::binding::{
    Binding, BindingMode, CallBinding, Effect, EffectHandle, Expression, Interceptor, InterceptorSpec,
    LetBinding, PropertyBinding, RefBinding, Signaler,
};
use crate::core::context::ReactiveContext;
use crate::core::error::{ErrorChannel, ErrorSink, ReactiveError, Result};
use crate::core::types::Observer;
use crate::core::value::Value;
use crate::observation::{CollectionObserver, ObserverLocator};
use crate::reactivity::scheduling::{ManualScheduler, Scheduler};

// =============================================================================
// OPTIONS
// =============================================================================

/// Code-level engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Delay for `InterceptorSpec::debounce()`
    pub default_debounce: Duration,
    /// Window for `InterceptorSpec::throttle()`
    pub default_throttle: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_debounce: DEFAULT_INTERCEPT_DELAY,
            default_throttle: DEFAULT_INTERCEPT_DELAY,
        }
    }
}

// =============================================================================
// BUILDER
// =============================================================================

#[derive(Default)]
pub struct EngineBuilder {
    scheduler: Option<Rc<dyn Scheduler>>,
    sink: Option<ErrorSink>,
    options: EngineOptions,
}

impl EngineBuilder {
    /// Drive flushes and timers with `scheduler` instead of a fresh
    /// `ManualScheduler`.
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Route notification errors and errors from scheduled work to `sink`.
    pub fn error_sink(mut self, sink: impl Fn(&ReactiveError) + 'static) -> Self {
        self.sink = Some(Rc::new(sink));
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Engine {
        let (scheduler, manual) = match self.scheduler {
            Some(scheduler) => (scheduler, None),
            None => {
                let manual = Rc::new(ManualScheduler::new());
                (manual.clone() as Rc<dyn Scheduler>, Some(manual))
            }
        };
        let errors = Rc::new(ErrorChannel::new(self.sink));
        let ctx = ReactiveContext::new(scheduler, errors);
        let locator = ObserverLocator::new(ctx.clone());
        tracing::debug!(options = ?self.options, manual = manual.is_some(), "engine built");
        Engine {
            ctx,
            locator,
            signaler: Rc::new(Signaler::new()),
            options: self.options,
            manual,
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The observation and binding engine.
///
/// ```
/// use spark_bindings::binding::expression::scope;
/// use spark_bindings::{BindingMode, Binding, Engine, Object, Scope, Value};
///
/// let engine = Engine::new();
/// let vm = Object::from_entries([("count", 0)]);
/// let view = Object::new();
///
/// let binding = engine
///     .create_binding(scope("count"), &Value::Object(view.clone()), "text", BindingMode::ToTarget)
///     .unwrap();
/// binding.bind(&Scope::new(vm.clone())).unwrap();
///
/// vm.set("count", Value::from(5)).unwrap();
/// engine.flush().unwrap();
/// assert_eq!(view.get("text").unwrap(), Value::from(5));
/// ```
pub struct Engine {
    ctx: Rc<ReactiveContext>,
    locator: Rc<ObserverLocator>,
    signaler: Rc<Signaler>,
    options: EngineOptions,
    manual: Option<Rc<ManualScheduler>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Default engine on a `ManualScheduler`, with no error sink.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> &Rc<ReactiveContext> {
        &self.ctx
    }

    pub fn locator(&self) -> &Rc<ObserverLocator> {
        &self.locator
    }

    pub fn signaler(&self) -> &Rc<Signaler> {
        &self.signaler
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// The virtual-clock scheduler, if the engine created one.
    pub fn manual_scheduler(&self) -> Option<&Rc<ManualScheduler>> {
        self.manual.as_ref()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn get_observer(&self, target: &Value, key: &str) -> Result<Rc<dyn Observer>> {
        self.locator.get_observer(target, key)
    }

    pub fn collection_observer(&self, target: &Value) -> Result<Rc<CollectionObserver>> {
        self.locator.collection_observer(target)
    }

    pub fn read(&self, target: &Value, key: &str) -> Result<Value> {
        self.locator.read(target, key)
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Bind `source` to `target[property]`.
    pub fn create_binding(
        &self,
        source: Rc<dyn Expression>,
        target: &Value,
        property: &str,
        mode: BindingMode,
    ) -> Result<Rc<PropertyBinding>> {
        let observer = self.locator.get_observer(target, property)?;
        Ok(self.create_binding_with_accessor(source, observer, mode))
    }

    /// Bind `source` to a host-provided target accessor.
    pub fn create_binding_with_accessor(
        &self,
        source: Rc<dyn Expression>,
        accessor: Rc<dyn Observer>,
        mode: BindingMode,
    ) -> Rc<PropertyBinding> {
        PropertyBinding::new(self.ctx.clone(), self.locator.clone(), source, accessor, mode)
    }

    pub fn call_binding(
        &self,
        source: Rc<dyn Expression>,
        target: &Value,
        property: &str,
    ) -> Result<Rc<CallBinding>> {
        let observer = self.locator.get_observer(target, property)?;
        Ok(CallBinding::new(self.ctx.clone(), self.locator.clone(), source, observer))
    }

    pub fn ref_binding(&self, source: Rc<dyn Expression>, target: Value) -> Rc<RefBinding> {
        RefBinding::new(self.ctx.clone(), self.locator.clone(), source, target)
    }

    pub fn let_binding(
        &self,
        source: Rc<dyn Expression>,
        name: &str,
        to_binding_context: bool,
    ) -> Rc<LetBinding> {
        LetBinding::new(self.ctx.clone(), self.locator.clone(), source, name, to_binding_context)
    }

    /// Wrap `binding` in `specs`, first spec innermost. Keep the returned
    /// entry point alive for as long as the binding is in use.
    pub fn intercept(&self, binding: Rc<dyn Binding>, specs: &[InterceptorSpec]) -> Rc<dyn Binding> {
        let resolved = specs.iter().cloned().map(|spec| {
            spec.with_defaults(self.options.default_debounce, self.options.default_throttle)
        });
        Interceptor::chain(&self.ctx, &self.signaler, binding, resolved)
    }

    /// Run `f` now and whenever what it read changes.
    pub fn effect(&self, f: impl FnMut(&ObserverLocator) -> Result<()> + 'static) -> Result<EffectHandle> {
        Effect::run(self.ctx.clone(), self.locator.clone(), f)
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Run a flush pass now.
    pub fn flush(&self) -> Result<()> {
        self.ctx.flush()
    }

    /// Dispatch a named signal to signal and update-trigger interceptors.
    pub fn signal(&self, name: &str) -> Result<()> {
        let result = self.signaler.dispatch(name);
        self.ctx.errors.surface(result)
    }

    /// Forget every cached observer of a discarded target.
    pub fn release(&self, target: &Value) -> usize {
        self.locator.release(target)
    }

    /// Forget cached observers whose targets are gone.
    pub fn sweep(&self) -> usize {
        self.locator.sweep()
    }

    /// Errors from scheduled work that had no sink to go to.
    pub fn take_unhandled_errors(&self) -> Vec<ReactiveError> {
        self.ctx.errors.take_unhandled()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::expression::{func, scope};
    use crate::binding::Scope;
    use crate::core::value::Object;
    use std::cell::RefCell;

    #[test]
    fn builder_defaults_to_manual_scheduler() {
        let engine = Engine::new();
        assert!(engine.manual_scheduler().is_some());
        assert_eq!(engine.options(), EngineOptions::default());

        let custom = Engine::builder()
            .scheduler(Rc::new(ManualScheduler::new()))
            .build();
        assert!(custom.manual_scheduler().is_none());
    }

    #[test]
    fn default_debounce_comes_from_options() {
        let engine = Engine::builder()
            .options(EngineOptions {
                default_debounce: Duration::from_millis(10),
                ..EngineOptions::default()
            })
            .build();
        let vm = Object::from_entries([("count", 0)]);
        let view = Object::new();
        let binding = engine
            .create_binding(scope("count"), &Value::Object(view.clone()), "text", BindingMode::ToTarget)
            .unwrap();
        let head = engine.intercept(binding, &[InterceptorSpec::debounce()]);
        head.bind(&Scope::new(vm.clone())).unwrap();

        vm.set("count", Value::from(1)).unwrap();
        let scheduler = engine.manual_scheduler().unwrap();
        scheduler.advance(Duration::from_millis(9));
        assert_eq!(view.get("text").unwrap(), Value::from(0));
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(view.get("text").unwrap(), Value::from(1));
    }

    #[test]
    fn errors_from_timers_are_retained_without_sink() {
        let engine = Engine::new();
        let vm = Object::from_entries([("count", 0)]);
        let source = func("fails after first", |scope, locator| {
            let n = locator.read(scope.binding_context(), "count")?;
            if n.as_number() == Some(0.0) {
                return Ok(n);
            }
            Err(ReactiveError::evaluation("fails after first", "boom"))
        });
        let binding = engine
            .create_binding(source, &Value::Object(Object::new()), "text", BindingMode::ToTarget)
            .unwrap();
        binding.bind(&Scope::new(vm.clone())).unwrap();

        vm.set("count", Value::from(1)).unwrap();
        // Scheduled flush: no synchronous caller
        engine.manual_scheduler().unwrap().run_pending();
        let errors = engine.take_unhandled_errors();
        assert_eq!(errors.len(), 1);
        assert!(engine.take_unhandled_errors().is_empty());
    }

    #[test]
    fn sink_receives_flush_errors() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let engine = Engine::builder()
            .error_sink(move |err| sink.borrow_mut().push(err.to_string()))
            .build();
        let vm = Object::from_entries([("count", 0)]);
        let source = func("fails on change", |scope, locator| {
            let n = locator.read(scope.binding_context(), "count")?;
            if n.as_number() == Some(0.0) {
                return Ok(n);
            }
            Err(ReactiveError::evaluation("fails on change", "boom"))
        });
        let binding = engine
            .create_binding(source, &Value::Object(Object::new()), "text", BindingMode::ToTarget)
            .unwrap();
        binding.bind(&Scope::new(vm.clone())).unwrap();

        vm.set("count", Value::from(1)).unwrap();
        assert!(engine.flush().is_ok());
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn release_forgets_target_observers() {
        let engine = Engine::new();
        let vm = Value::Object(Object::from_entries([("a", 1), ("b", 2)]));
        engine.get_observer(&vm, "a").unwrap();
        engine.get_observer(&vm, "b").unwrap();
        assert_eq!(engine.release(&vm), 2);
        assert_eq!(engine.locator().observer_count(), 0);
    }
}
