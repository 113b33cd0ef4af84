//! Read-modify-write operations on a single stored value.
//!
//! These are the pure halves of `increment`, `decrement`, `append` and
//! `remove_element`: the client reads the current value, applies the
//! operation here, and writes the result back.

use crate::error::{Result, StoreError};
use serde_json::{Number, Value};

/// An operation applied to the current value at a key.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueOperation {
    /// Add to a number (absent or null counts as 0).
    Add(Number),

    /// Subtract from a number (absent or null counts as 0).
    Subtract(Number),

    /// Push onto an array (absent or null counts as `[]`).
    Append(Value),

    /// Drop every equal element from an array (absent or null counts as `[]`).
    RemoveElement(Value),
}

impl ValueOperation {
    /// Build an [`Add`](Self::Add), rejecting non-numeric amounts.
    pub fn add(amount: Value) -> Result<Self> {
        Ok(ValueOperation::Add(require_number(amount)?))
    }

    /// Build a [`Subtract`](Self::Subtract), rejecting non-numeric amounts.
    pub fn subtract(amount: Value) -> Result<Self> {
        Ok(ValueOperation::Subtract(require_number(amount)?))
    }

    /// Build an [`Append`](Self::Append), rejecting a missing element.
    pub fn append(element: Option<Value>) -> Result<Self> {
        Ok(ValueOperation::Append(require_element(element)?))
    }

    /// Build a [`RemoveElement`](Self::RemoveElement), rejecting a missing element.
    pub fn remove_element(element: Option<Value>) -> Result<Self> {
        Ok(ValueOperation::RemoveElement(require_element(element)?))
    }
}

fn require_number(amount: Value) -> Result<Number> {
    match amount {
        Value::Number(n) => Ok(n),
        other => Err(StoreError::InvalidValue(format!(
            "amount must be a number, got {}",
            type_name(&other)
        ))),
    }
}

fn require_element(element: Option<Value>) -> Result<Value> {
    element.ok_or_else(|| StoreError::InvalidValue("element must be provided".into()))
}

/// Apply an operation to the current value, returning the value to store.
pub fn apply_operation(current: Option<Value>, operation: ValueOperation) -> Result<Value> {
    match operation {
        ValueOperation::Add(amount) => {
            let base = current_number(current)?;
            Ok(Value::Number(combine(&base, &amount, false)?))
        }

        ValueOperation::Subtract(amount) => {
            let base = current_number(current)?;
            Ok(Value::Number(combine(&base, &amount, true)?))
        }

        ValueOperation::Append(element) => {
            let mut items = current_array(current)?;
            items.push(element);
            Ok(Value::Array(items))
        }

        ValueOperation::RemoveElement(element) => {
            let mut items = current_array(current)?;
            items.retain(|item| !elements_equal(item, &element));
            Ok(Value::Array(items))
        }
    }
}

fn current_number(current: Option<Value>) -> Result<Number> {
    match current {
        None | Some(Value::Null) => Ok(Number::from(0)),
        Some(Value::Number(n)) => Ok(n),
        Some(other) => Err(StoreError::InvalidValue(format!(
            "stored value is not a number ({})",
            type_name(&other)
        ))),
    }
}

fn current_array(current: Option<Value>) -> Result<Vec<Value>> {
    match current {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(StoreError::InvalidValue(format!(
            "stored value is not an array ({})",
            type_name(&other)
        ))),
    }
}

/// Integer arithmetic while both sides fit in `i64` and nothing overflows,
/// floating point otherwise.
fn combine(base: &Number, amount: &Number, subtract: bool) -> Result<Number> {
    if let (Some(a), Some(b)) = (base.as_i64(), amount.as_i64()) {
        let exact = if subtract {
            a.checked_sub(b)
        } else {
            a.checked_add(b)
        };
        if let Some(n) = exact {
            return Ok(Number::from(n));
        }
    }

    let (a, b) = match (base.as_f64(), amount.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(StoreError::InvalidValue(format!(
                "cannot combine {} and {}",
                base, amount
            )))
        }
    };
    let result = if subtract { a - b } else { a + b };
    Number::from_f64(result).ok_or_else(|| {
        StoreError::InvalidValue(format!("result {} is not a finite number", result))
    })
}

/// Element equality used by `RemoveElement`.
///
/// Scalars compare by value, numbers numerically (`1 == 1.0`). Arrays and
/// objects never compare equal, so removing a composite element leaves the
/// array unchanged.
pub fn elements_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        _ => false,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_on_absent() {
        let op = ValueOperation::add(json!(3)).unwrap();
        assert_eq!(apply_operation(None, op).unwrap(), json!(3));
    }

    #[test]
    fn test_add_on_null() {
        let op = ValueOperation::add(json!(2)).unwrap();
        assert_eq!(apply_operation(Some(Value::Null), op).unwrap(), json!(2));
    }

    #[test]
    fn test_subtract() {
        let op = ValueOperation::subtract(json!(1)).unwrap();
        assert_eq!(apply_operation(Some(json!(3)), op).unwrap(), json!(2));
    }

    #[test]
    fn test_float_arithmetic() {
        let op = ValueOperation::add(json!(0.5)).unwrap();
        assert_eq!(apply_operation(Some(json!(1)), op).unwrap(), json!(1.5));
    }

    #[test]
    fn test_overflow_falls_back_to_float() {
        let op = ValueOperation::add(json!(1)).unwrap();
        let result = apply_operation(Some(json!(i64::MAX)), op).unwrap();
        assert!(result.is_f64());
    }

    #[test]
    fn test_non_numeric_amount_rejected() {
        assert!(matches!(
            ValueOperation::add(json!("not-a-number")),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            ValueOperation::subtract(Value::Null),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_add_on_non_numeric_current_rejected() {
        let op = ValueOperation::add(json!(1)).unwrap();
        let result = apply_operation(Some(json!({"a": 1})), op);
        assert!(matches!(result, Err(StoreError::InvalidValue(_))));

        let op = ValueOperation::add(json!(1)).unwrap();
        let result = apply_operation(Some(json!("5")), op);
        assert!(matches!(result, Err(StoreError::InvalidValue(_))));
    }

    #[test]
    fn test_append() {
        let state = apply_operation(None, ValueOperation::append(Some(json!(1))).unwrap()).unwrap();
        assert_eq!(state, json!([1]));

        let state =
            apply_operation(Some(state), ValueOperation::append(Some(json!(2))).unwrap()).unwrap();
        assert_eq!(state, json!([1, 2]));
    }

    #[test]
    fn test_append_missing_element_rejected() {
        assert!(matches!(
            ValueOperation::append(None),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            ValueOperation::remove_element(None),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_append_on_non_array_rejected() {
        let op = ValueOperation::append(Some(json!(1))).unwrap();
        let result = apply_operation(Some(json!(5)), op);
        assert!(matches!(result, Err(StoreError::InvalidValue(_))));
    }

    #[test]
    fn test_remove_element_removes_all_equal_scalars() {
        let op = ValueOperation::remove_element(Some(json!(1))).unwrap();
        let state = apply_operation(Some(json!([1, 2, 1, 1.0, "1"])), op).unwrap();
        assert_eq!(state, json!([2, "1"]));
    }

    #[test]
    fn test_remove_element_composite_is_noop() {
        let op = ValueOperation::remove_element(Some(json!({"a": 1}))).unwrap();
        let state = apply_operation(Some(json!([{"a": 1}, 2])), op).unwrap();
        assert_eq!(state, json!([{"a": 1}, 2]));
    }

    #[test]
    fn test_remove_element_on_absent_yields_empty() {
        let op = ValueOperation::remove_element(Some(json!(1))).unwrap();
        assert_eq!(apply_operation(None, op).unwrap(), json!([]));
    }

    #[test]
    fn test_elements_equal() {
        assert!(elements_equal(&json!(null), &json!(null)));
        assert!(elements_equal(&json!(2), &json!(2.0)));
        assert!(elements_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!elements_equal(&json!(true), &json!(1)));
        assert!(!elements_equal(&json!([1]), &json!([1])));
    }
}
