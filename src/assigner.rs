//! Type-checked mutation of conversation variables.
//!
//! Which operations are legal depends on the value currently stored in the
//! slot, so the operator family is chosen at run time from its [`ValueKind`].

use crate::ast::{Num, ValueKind, describe};
use crate::error::{OperatorTypeError, WorkflowError};
use crate::expression::{ExpressionEvaluator, Scope, is_wrapped};
use crate::variable::{VariablePool, VariableSelector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOperation {
    #[serde(alias = "over-write", alias = "set")]
    Assign,
    Clear,
    #[serde(alias = "+=")]
    Add,
    #[serde(alias = "-=")]
    Subtract,
    #[serde(alias = "*=")]
    Multiply,
    #[serde(alias = "/=")]
    Divide,
    Append,
    Extend,
    #[serde(alias = "remove-first")]
    RemoveFirst,
    #[serde(alias = "remove-last")]
    RemoveLast,
}

impl AssignmentOperation {
    pub fn name(self) -> &'static str {
        match self {
            AssignmentOperation::Assign => "assign",
            AssignmentOperation::Clear => "clear",
            AssignmentOperation::Add => "add",
            AssignmentOperation::Subtract => "subtract",
            AssignmentOperation::Multiply => "multiply",
            AssignmentOperation::Divide => "divide",
            AssignmentOperation::Append => "append",
            AssignmentOperation::Extend => "extend",
            AssignmentOperation::RemoveFirst => "remove_first",
            AssignmentOperation::RemoveLast => "remove_last",
        }
    }

    /// Whether the operation reads a right-hand value.
    pub fn takes_value(self) -> bool {
        !matches!(
            self,
            AssignmentOperation::Clear
                | AssignmentOperation::RemoveFirst
                | AssignmentOperation::RemoveLast
        )
    }
}

impl fmt::Display for AssignmentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One configured mutation: `variable_selector` must name a `conv.*` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentItem {
    pub variable_selector: VariableSelector,
    pub operation: AssignmentOperation,
    /// A literal, or an expression when written as `{{ ... }}`.
    #[serde(default)]
    pub value: Value,
}

impl AssignmentItem {
    pub fn new(variable_selector: VariableSelector, operation: AssignmentOperation, value: Value) -> Self {
        Self {
            variable_selector,
            operation,
            value,
        }
    }

    /// Applies the item through `pool` and returns the stored value.
    pub fn apply(&self, pool: &mut VariablePool<'_>) -> Result<Value, WorkflowError> {
        let current = pool.get(&self.variable_selector)?;
        let value = if self.operation.takes_value() {
            self.resolve_value(pool)?
        } else {
            Value::Null
        };
        let updated = apply_operation(&current, self.operation, &value)?;
        pool.set(&self.variable_selector, updated.clone())?;
        Ok(updated)
    }

    fn resolve_value(&self, pool: &VariablePool<'_>) -> Result<Value, WorkflowError> {
        match &self.value {
            Value::String(source) if is_wrapped(source) => {
                let scope = Scope::from_state(pool.state());
                Ok(ExpressionEvaluator::evaluate(source, &scope)?)
            }
            other => Ok(other.clone()),
        }
    }
}

/// Computes the new value of a slot holding `current`.
pub fn apply_operation(
    current: &Value,
    operation: AssignmentOperation,
    value: &Value,
) -> Result<Value, OperatorTypeError> {
    match ValueKind::of(current) {
        ValueKind::String => string_operation(operation, value),
        ValueKind::Number => number_operation(current, operation, value),
        ValueKind::Boolean => boolean_operation(operation, value),
        ValueKind::Array => array_operation(current, operation, value),
        ValueKind::Object => object_operation(operation, value),
        // An unset slot takes its type from the first assignment.
        ValueKind::Null => match operation {
            AssignmentOperation::Assign => Ok(value.clone()),
            _ => Err(unsupported(operation, ValueKind::Null)),
        },
    }
}

fn string_operation(operation: AssignmentOperation, value: &Value) -> Result<Value, OperatorTypeError> {
    match operation {
        AssignmentOperation::Assign => {
            expect_value(operation, ValueKind::String, value)?;
            Ok(value.clone())
        }
        AssignmentOperation::Clear => Ok(Value::String(String::new())),
        _ => Err(unsupported(operation, ValueKind::String)),
    }
}

fn number_operation(
    current: &Value,
    operation: AssignmentOperation,
    value: &Value,
) -> Result<Value, OperatorTypeError> {
    if operation == AssignmentOperation::Clear {
        return Ok(Value::from(0));
    }
    let rhs = match value {
        Value::Number(n) => Num::from_number(n),
        other => return Err(mismatch(operation, "value", ValueKind::Number, other)),
    };
    let lhs = match current {
        Value::Number(n) => Num::from_number(n),
        other => return Err(mismatch(operation, "target", ValueKind::Number, other)),
    };

    let (int_fn, float_fn): (fn(i64, i64) -> Option<i64>, fn(f64, f64) -> f64) = match operation {
        AssignmentOperation::Assign => return Ok(value.clone()),
        AssignmentOperation::Add => (i64::checked_add, |a, b| a + b),
        AssignmentOperation::Subtract => (i64::checked_sub, |a, b| a - b),
        AssignmentOperation::Multiply => (i64::checked_mul, |a, b| a * b),
        AssignmentOperation::Divide => {
            if rhs.is_zero() {
                return Err(OperatorTypeError::DivisionByZero);
            }
            return store_float(operation, lhs.as_f64() / rhs.as_f64());
        }
        _ => return Err(unsupported(operation, ValueKind::Number)),
    };

    match (lhs, rhs) {
        (Num::Int(a), Num::Int(b)) => int_fn(a, b)
            .map(Value::from)
            .ok_or_else(|| OperatorTypeError::NumericRange(operation.name().to_string())),
        (a, b) => store_float(operation, float_fn(a.as_f64(), b.as_f64())),
    }
}

fn boolean_operation(operation: AssignmentOperation, value: &Value) -> Result<Value, OperatorTypeError> {
    match operation {
        AssignmentOperation::Assign => {
            expect_value(operation, ValueKind::Boolean, value)?;
            Ok(value.clone())
        }
        AssignmentOperation::Clear => Ok(Value::Bool(false)),
        _ => Err(unsupported(operation, ValueKind::Boolean)),
    }
}

fn array_operation(
    current: &Value,
    operation: AssignmentOperation,
    value: &Value,
) -> Result<Value, OperatorTypeError> {
    let items = current.as_array().cloned().unwrap_or_default();
    match operation {
        AssignmentOperation::Assign => {
            expect_value(operation, ValueKind::Array, value)?;
            Ok(value.clone())
        }
        AssignmentOperation::Clear => Ok(Value::Array(Vec::new())),
        AssignmentOperation::Append => {
            let mut items = items;
            items.push(value.clone());
            Ok(Value::Array(items))
        }
        AssignmentOperation::Extend => {
            let Value::Array(extra) = value else {
                return Err(mismatch(operation, "value", ValueKind::Array, value));
            };
            let mut items = items;
            items.extend(extra.iter().cloned());
            Ok(Value::Array(items))
        }
        AssignmentOperation::RemoveFirst | AssignmentOperation::RemoveLast => {
            if items.is_empty() {
                return Err(OperatorTypeError::EmptyArray(operation.name().to_string()));
            }
            let mut items = items;
            if operation == AssignmentOperation::RemoveFirst {
                items.remove(0);
            } else {
                items.pop();
            }
            Ok(Value::Array(items))
        }
        _ => Err(unsupported(operation, ValueKind::Array)),
    }
}

fn object_operation(operation: AssignmentOperation, value: &Value) -> Result<Value, OperatorTypeError> {
    match operation {
        AssignmentOperation::Assign => {
            expect_value(operation, ValueKind::Object, value)?;
            Ok(value.clone())
        }
        AssignmentOperation::Clear => Ok(Value::Object(Map::new())),
        _ => Err(unsupported(operation, ValueKind::Object)),
    }
}

fn store_float(operation: AssignmentOperation, result: f64) -> Result<Value, OperatorTypeError> {
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| OperatorTypeError::NumericRange(operation.name().to_string()))
}

fn expect_value(operation: AssignmentOperation, kind: ValueKind, value: &Value) -> Result<(), OperatorTypeError> {
    if ValueKind::of(value) == kind {
        Ok(())
    } else {
        Err(mismatch(operation, "value", kind, value))
    }
}

fn mismatch(operation: AssignmentOperation, role: &'static str, expected: ValueKind, found: &Value) -> OperatorTypeError {
    OperatorTypeError::TypeMismatch {
        operation: operation.name().to_string(),
        role,
        expected: expected.name().to_string(),
        found: describe(found),
    }
}

fn unsupported(operation: AssignmentOperation, kind: ValueKind) -> OperatorTypeError {
    OperatorTypeError::UnsupportedOperation {
        operation: operation.name().to_string(),
        kind: kind.name().to_string(),
    }
}
