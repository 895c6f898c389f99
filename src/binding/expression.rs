// ============================================================================
// spark-bindings - Expressions
// The evaluate/assign contract bindings need from a parsed expression
// ============================================================================
//
// Parsing is someone else's job. These nodes are the minimal set a host
// needs to hand bindings something to evaluate: literals, scope lookups,
// member and keyed access, and an escape hatch for anything else.
//
// Reads go through `ObserverLocator::read`, so evaluating inside a tracking
// frame is what connects an expression to its dependencies.
// ============================================================================

use std::fmt;
use std::rc::Rc;

use super::scope::Scope;
use crate::core::error::{ReactiveError, Result};
use crate::core::value::Value;
use crate::observation::ObserverLocator;

/// A parsed expression node.
pub trait Expression {
    fn evaluate(&self, scope: &Scope, locator: &ObserverLocator) -> Result<Value>;

    /// Write `value` to the location the expression resolves to.
    fn assign(&self, _scope: &Scope, _locator: &ObserverLocator, _value: Value) -> Result<()> {
        Err(ReactiveError::NotAssignable(self.describe()))
    }

    /// Evaluate for the side effect of recording dependencies.
    fn connect(&self, scope: &Scope, locator: &ObserverLocator) -> Result<()> {
        self.evaluate(scope, locator).map(|_| ())
    }

    /// Source-like rendering for error messages and logs.
    fn describe(&self) -> String;
}

// =============================================================================
// NODES
// =============================================================================

pub struct Literal(pub Value);

impl Expression for Literal {
    fn evaluate(&self, _: &Scope, _: &ObserverLocator) -> Result<Value> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("{:?}", self.0)
    }
}

/// A bare name, optionally `$parent`-qualified `ancestor` times.
pub struct AccessScope {
    pub name: Rc<str>,
    pub ancestor: usize,
}

impl Expression for AccessScope {
    fn evaluate(&self, scope: &Scope, locator: &ObserverLocator) -> Result<Value> {
        let context = scope.context_for(&self.name, self.ancestor);
        if context.is_nullish() {
            return Ok(Value::Undefined);
        }
        locator.read(&context, &self.name)
    }

    fn assign(&self, scope: &Scope, _: &ObserverLocator, value: Value) -> Result<()> {
        let context = scope.context_for(&self.name, self.ancestor);
        context.set_property(&self.name, value)
    }

    fn describe(&self) -> String {
        format!("{}{}", "$parent.".repeat(self.ancestor), self.name)
    }
}

/// `object.name`. Reading through a nullish object yields `Undefined`.
pub struct AccessMember {
    pub object: Rc<dyn Expression>,
    pub name: Rc<str>,
}

impl Expression for AccessMember {
    fn evaluate(&self, scope: &Scope, locator: &ObserverLocator) -> Result<Value> {
        let object = self.object.evaluate(scope, locator)?;
        if object.is_nullish() {
            return Ok(Value::Undefined);
        }
        locator.read(&object, &self.name)
    }

    fn assign(&self, scope: &Scope, locator: &ObserverLocator, value: Value) -> Result<()> {
        let object = self.object.evaluate(scope, locator)?;
        object.set_property(&self.name, value)
    }

    fn describe(&self) -> String {
        format!("{}.{}", self.object.describe(), self.name)
    }
}

/// `object[key]`. Map targets are looked up by value and observed as a whole.
pub struct AccessKeyed {
    pub object: Rc<dyn Expression>,
    pub key: Rc<dyn Expression>,
}

impl Expression for AccessKeyed {
    fn evaluate(&self, scope: &Scope, locator: &ObserverLocator) -> Result<Value> {
        let object = self.object.evaluate(scope, locator)?;
        if object.is_nullish() {
            return Ok(Value::Undefined);
        }
        let key = self.key.evaluate(scope, locator)?;
        if let Value::Map(map) = &object {
            if locator.context().is_tracking() {
                let observer = locator.collection_observer(&object)?;
                locator.context().observe(observer);
            }
            return Ok(map.get(&key).unwrap_or(Value::Undefined));
        }
        match property_key(&key) {
            Some(name) => locator.read(&object, &name),
            None => Ok(Value::Undefined),
        }
    }

    fn assign(&self, scope: &Scope, locator: &ObserverLocator, value: Value) -> Result<()> {
        let object = self.object.evaluate(scope, locator)?;
        let key = self.key.evaluate(scope, locator)?;
        if let Value::Map(map) = &object {
            map.set(key, value);
            return Ok(());
        }
        match property_key(&key) {
            Some(name) => object.set_property(&name, value),
            None => Err(ReactiveError::NotAssignable(self.describe())),
        }
    }

    fn describe(&self) -> String {
        format!("{}[{}]", self.object.describe(), self.key.describe())
    }
}

/// Host-supplied evaluation, for anything the nodes above cannot express.
pub struct FnExpression {
    label: String,
    eval: Rc<dyn Fn(&Scope, &ObserverLocator) -> Result<Value>>,
    assign: Option<Rc<dyn Fn(&Scope, &ObserverLocator, Value) -> Result<()>>>,
}

impl FnExpression {
    pub fn new(
        label: impl Into<String>,
        eval: impl Fn(&Scope, &ObserverLocator) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            eval: Rc::new(eval),
            assign: None,
        }
    }

    pub fn with_assign(
        mut self,
        assign: impl Fn(&Scope, &ObserverLocator, Value) -> Result<()> + 'static,
    ) -> Self {
        self.assign = Some(Rc::new(assign));
        self
    }
}

impl Expression for FnExpression {
    fn evaluate(&self, scope: &Scope, locator: &ObserverLocator) -> Result<Value> {
        (self.eval)(scope, locator)
    }

    fn assign(&self, scope: &Scope, locator: &ObserverLocator, value: Value) -> Result<()> {
        match &self.assign {
            Some(assign) => assign(scope, locator, value),
            None => Err(ReactiveError::NotAssignable(self.label.clone())),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl fmt::Debug for dyn Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({})", self.describe())
    }
}

/// Property name for a keyed access. Integral numbers become index keys.
fn property_key(key: &Value) -> Option<String> {
    match key {
        Value::Str(s) => Some(s.to_string()),
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(format!("{}", *n as u64)),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

pub fn literal(value: impl Into<Value>) -> Rc<dyn Expression> {
    Rc::new(Literal(value.into()))
}

pub fn scope(name: &str) -> Rc<dyn Expression> {
    Rc::new(AccessScope {
        name: Rc::from(name),
        ancestor: 0,
    })
}

/// `$parent` hops: `parent_scope("x", 1)` is `$parent.x`.
pub fn parent_scope(name: &str, ancestor: usize) -> Rc<dyn Expression> {
    Rc::new(AccessScope {
        name: Rc::from(name),
        ancestor,
    })
}

pub fn member(object: Rc<dyn Expression>, name: &str) -> Rc<dyn Expression> {
    Rc::new(AccessMember {
        object,
        name: Rc::from(name),
    })
}

pub fn keyed(object: Rc<dyn Expression>, key: Rc<dyn Expression>) -> Rc<dyn Expression> {
    Rc::new(AccessKeyed { object, key })
}

pub fn func(
    label: impl Into<String>,
    eval: impl Fn(&Scope, &ObserverLocator) -> Result<Value> + 'static,
) -> Rc<dyn Expression> {
    Rc::new(FnExpression::new(label, eval))
}

/// Dotted path shorthand: `path("user.address.city")`.
pub fn path(dotted: &str) -> Rc<dyn Expression> {
    let mut parts = dotted.split('.');
    let head = scope(parts.next().unwrap_or_default());
    parts.fold(head, member)
}

// =============================================================================
// TESTS
// =============================================================================
