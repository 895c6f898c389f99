// ============================================================================
// spark-bindings - Equality
// Change-detection comparisons used by observers and interceptors
// ============================================================================

use crate::core::value::Value;

// =============================================================================
// SAME VALUE
// =============================================================================

/// "Same value" comparison used for change detection.
///
/// - NaN is the same as NaN (a NaN write is not a change)
/// - `0.0` and `-0.0` are the same
/// - reference values compare by identity, never structurally
///
/// # Example
///
/// ```
/// use spark_bindings::{same_value, Object, Value};
///
/// assert!(same_value(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
///
/// let a = Object::new();
/// assert!(same_value(&Value::from(a.clone()), &Value::from(a)));
/// assert!(!same_value(&Value::from(Object::new()), &Value::from(Object::new())));
/// ```
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Map(x), Value::Map(y)) => x.ptr_eq(y),
        (Value::Set(x), Value::Set(y)) => x.ptr_eq(y),
        (Value::Function(x), Value::Function(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Negation of `same_value`; reads better at call sites that ask "did it change?"
pub fn has_changed(new_value: &Value, old_value: &Value) -> bool {
    !same_value(new_value, old_value)
}

// =============================================================================
// TESTS
// =============================================================================
