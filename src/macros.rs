// ============================================================================
// spark-bindings - Ergonomic Macros
// ============================================================================

/// Clone variables into a move closure.
///
/// Cuts the boilerplate of cloning `Rc`s and value handles before moving
/// them into an effect or expression closure.
///
/// # Usage
///
/// ```rust
/// use spark_bindings::{cloned, Engine, Object, Value};
///
/// let engine = Engine::new();
/// let vm = Value::Object(Object::from_entries([("count", 1)]));
///
/// let handle = engine
///     .effect(cloned!(vm => move |locator| {
///         locator.read(&vm, "count")?;
///         Ok(())
///     }))
///     .unwrap();
/// assert_eq!(handle.dependency_count(), 1);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Build an `Object` from `key => value` pairs of mixed value types.
///
/// # Usage
///
/// ```rust
/// use spark_bindings::{object, ReactiveVec, Value};
///
/// let vm = object! {
///     "title" => "Todos",
///     "count" => 2,
///     "items" => ReactiveVec::new(),
/// };
/// assert_eq!(vm.get("count").unwrap(), Value::from(2));
/// assert!(matches!(vm.get("items").unwrap(), Value::Array(_)));
/// ```
#[macro_export]
macro_rules! object {
    () => {
        $crate::Object::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Object::from_entries([
            $( ($key, $crate::Value::from($value)) ),+
        ])
    };
}

// =============================================================================
// TESTS
// =============================================================================
