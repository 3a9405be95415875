use super::Scope;
use crate::ast::{Expression, Num, ValueKind, compare_values, is_empty, is_truthy, values_equal};
use crate::error::EvaluationError;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Upper bound on strings and arrays produced by `*` repetition.
const MAX_SEQUENCE_LENGTH: usize = 1_000_000;

// This macro generates the body of a numeric binary operation.
macro_rules! eval_op {
    ($self:ident, $l:ident, $r:ident, $op_str:expr, $int_fn:expr, $float_fn:expr) => {{
        let left = $self.evaluate_recursive($l)?;
        let right = $self.evaluate_recursive($r)?;
        numeric($op_str, &left, &right, $int_fn, $float_fn).map(Cow::Owned)
    }};
}

// This macro generates the body of an ordering comparison.
macro_rules! eval_cmp {
    ($self:ident, $l:ident, $r:ident, $op_str:expr, $accept:expr) => {{
        let left = $self.evaluate_recursive($l)?;
        let right = $self.evaluate_recursive($r)?;
        let ordering = compare_values(&left, &right)
            .ok_or_else(|| pair_mismatch($op_str, "two numbers, strings or arrays", &left, &right))?;
        Ok(Cow::Owned(Value::Bool($accept(ordering))))
    }};
}

/// The core recursive engine for evaluating a single AST against a scope.
pub(super) struct AstEngine<'a> {
    expression: &'a Expression,
    scope: &'a Scope<'a>,
}

impl<'a> AstEngine<'a> {
    pub(super) fn new(expression: &'a Expression, scope: &'a Scope<'a>) -> Self {
        Self { expression, scope }
    }

    pub(super) fn evaluate(&self) -> Result<Value, EvaluationError> {
        self.evaluate_recursive(self.expression).map(Cow::into_owned)
    }

    fn evaluate_recursive(&self, expr: &'a Expression) -> Result<Cow<'a, Value>, EvaluationError> {
        match expr {
            // --- Arithmetic Operations ---
            Expression::Sum(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                match (left.as_ref(), right.as_ref()) {
                    (Value::String(a), Value::String(b)) => {
                        Ok(Cow::Owned(Value::String(format!("{}{}", a, b))))
                    }
                    (Value::Array(a), Value::Array(b)) => {
                        check_length("+", a.len() + b.len())?;
                        Ok(Cow::Owned(Value::Array(a.iter().chain(b).cloned().collect())))
                    }
                    _ => numeric("+", &left, &right, i64::checked_add, |a, b| a + b).map(Cow::Owned),
                }
            }
            Expression::Subtract(l, r) => eval_op!(self, l, r, "-", i64::checked_sub, |a, b| a - b),
            Expression::Multiply(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                match (left.as_ref(), right.as_ref()) {
                    (Value::String(_) | Value::Array(_), Value::Number(_)) => repeat(&left, &right),
                    (Value::Number(_), Value::String(_) | Value::Array(_)) => repeat(&right, &left),
                    _ => numeric("*", &left, &right, i64::checked_mul, |a, b| a * b),
                }
                .map(Cow::Owned)
            }
            Expression::Divide(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                let (a, b) = numbers("/", &left, &right)?;
                if b.is_zero() {
                    return Err(EvaluationError::DivisionByZero);
                }
                Num::Float(a.as_f64() / b.as_f64()).into_value("/").map(Cow::Owned)
            }
            Expression::FloorDivide(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                let (a, b) = numbers("//", &left, &right)?;
                if b.is_zero() {
                    return Err(EvaluationError::DivisionByZero);
                }
                match (a, b) {
                    (Num::Int(x), Num::Int(y)) => {
                        let q = x
                            .checked_div(y)
                            .ok_or_else(|| EvaluationError::Overflow("//".to_string()))?;
                        let q = if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q };
                        Ok(Cow::Owned(Value::from(q)))
                    }
                    (x, y) => Num::Float((x.as_f64() / y.as_f64()).floor())
                        .into_value("//")
                        .map(Cow::Owned),
                }
            }
            Expression::Modulo(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                let (a, b) = numbers("%", &left, &right)?;
                if b.is_zero() {
                    return Err(EvaluationError::DivisionByZero);
                }
                match (a, b) {
                    (Num::Int(x), Num::Int(y)) => {
                        let rem = x
                            .checked_rem(y)
                            .ok_or_else(|| EvaluationError::Overflow("%".to_string()))?;
                        let rem = if rem != 0 && ((rem < 0) != (y < 0)) { rem + y } else { rem };
                        Ok(Cow::Owned(Value::from(rem)))
                    }
                    (x, y) => {
                        let (x, y) = (x.as_f64(), y.as_f64());
                        let rem = x % y;
                        let rem = if rem != 0.0 && ((rem < 0.0) != (y < 0.0)) { rem + y } else { rem };
                        Num::Float(rem).into_value("%").map(Cow::Owned)
                    }
                }
            }
            Expression::Power(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                let (base, exp) = numbers("**", &left, &right)?;
                power(base, exp).map(Cow::Owned)
            }
            Expression::Negate(v) => {
                let value = self.evaluate_recursive(v)?;
                match Num::from_value(&value) {
                    Some(Num::Int(i)) => i
                        .checked_neg()
                        .map(|n| Cow::Owned(Value::from(n)))
                        .ok_or_else(|| EvaluationError::Overflow("-".to_string())),
                    Some(Num::Float(f)) => Num::Float(-f).into_value("-").map(Cow::Owned),
                    None => Err(mismatch("-", "number", &value)),
                }
            }
            Expression::Positive(v) => {
                let value = self.evaluate_recursive(v)?;
                if value.is_number() {
                    Ok(value)
                } else {
                    Err(mismatch("+", "number", &value))
                }
            }

            // --- Logical Operations ---
            // `and`/`or` short-circuit and yield the deciding operand.
            Expression::And(l, r) => {
                let left = self.evaluate_recursive(l)?;
                if !is_truthy(&left) {
                    return Ok(left);
                }
                self.evaluate_recursive(r)
            }
            Expression::Or(l, r) => {
                let left = self.evaluate_recursive(l)?;
                if is_truthy(&left) {
                    return Ok(left);
                }
                self.evaluate_recursive(r)
            }
            Expression::Not(v) => {
                let value = self.evaluate_recursive(v)?;
                Ok(Cow::Owned(Value::Bool(!is_truthy(&value))))
            }

            // --- Comparison Operations ---
            Expression::Equal(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                Ok(Cow::Owned(Value::Bool(values_equal(&left, &right))))
            }
            Expression::NotEqual(l, r) => {
                let left = self.evaluate_recursive(l)?;
                let right = self.evaluate_recursive(r)?;
                Ok(Cow::Owned(Value::Bool(!values_equal(&left, &right))))
            }
            Expression::GreaterThan(l, r) => eval_cmp!(self, l, r, ">", |o| o == Ordering::Greater),
            Expression::GreaterThanOrEqual(l, r) => {
                eval_cmp!(self, l, r, ">=", |o| o != Ordering::Less)
            }
            Expression::SmallerThan(l, r) => eval_cmp!(self, l, r, "<", |o| o == Ordering::Less),
            Expression::SmallerThanOrEqual(l, r) => {
                eval_cmp!(self, l, r, "<=", |o| o != Ordering::Greater)
            }

            // --- Membership ---
            Expression::In(needle, haystack) => {
                let found = self.contains(needle, haystack, "in")?;
                Ok(Cow::Owned(Value::Bool(found)))
            }
            Expression::NotIn(needle, haystack) => {
                let found = self.contains(needle, haystack, "not in")?;
                Ok(Cow::Owned(Value::Bool(!found)))
            }

            // --- Predicates ---
            Expression::IsEmpty(v) => {
                let value = self.evaluate_recursive(v)?;
                Ok(Cow::Owned(Value::Bool(is_empty(&value))))
            }
            Expression::StartsWith(l, r) => {
                let (text, affix) = self.string_pair(l, r, "startswith")?;
                Ok(Cow::Owned(Value::Bool(text.starts_with(affix.as_str()))))
            }
            Expression::EndsWith(l, r) => {
                let (text, affix) = self.string_pair(l, r, "endswith")?;
                Ok(Cow::Owned(Value::Bool(text.ends_with(affix.as_str()))))
            }

            // --- Access ---
            Expression::Attribute(base, attr) => {
                if attr.starts_with("__") {
                    return Err(EvaluationError::Forbidden(format!(
                        "access to special attribute '{}'",
                        attr
                    )));
                }
                if let Expression::Name(namespace) = base.as_ref() {
                    if let Some(lookup) = self.scope.qualified(namespace, attr) {
                        return lookup
                            .map(Cow::Borrowed)
                            .ok_or_else(|| EvaluationError::UndefinedVariable(expr.to_string()));
                    }
                }
                let value = self.evaluate_recursive(base)?;
                field(value, attr)?
                    .ok_or_else(|| EvaluationError::UndefinedVariable(expr.to_string()))
            }
            Expression::Index(base, index) => {
                let value = self.evaluate_recursive(base)?;
                let index = self.evaluate_recursive(index)?;
                subscript(value, &index)
            }
            Expression::Call(_, _) => Err(EvaluationError::Forbidden(format!(
                "function call '{}'",
                expr
            ))),

            // --- Leaf nodes ---
            Expression::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.evaluate_recursive(item).map(Cow::into_owned))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Cow::Owned(Value::Array(values)))
            }
            Expression::Literal(value) => Ok(Cow::Borrowed(value)),
            Expression::Name(name) => self
                .scope
                .lookup(name)
                .ok_or_else(|| EvaluationError::UndefinedVariable(name.clone())),
        }
    }

    fn contains(
        &self,
        needle: &'a Expression,
        haystack: &'a Expression,
        op: &str,
    ) -> Result<bool, EvaluationError> {
        let needle = self.evaluate_recursive(needle)?;
        let haystack = self.evaluate_recursive(haystack)?;
        match (needle.as_ref(), haystack.as_ref()) {
            (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
            (n, Value::Array(items)) => Ok(items.iter().any(|item| values_equal(item, n))),
            (Value::String(n), Value::Object(map)) => Ok(map.contains_key(n)),
            (n, h) => Err(pair_mismatch(op, "a string, array or object container", n, h)),
        }
    }

    fn string_pair(
        &self,
        l: &'a Expression,
        r: &'a Expression,
        op: &str,
    ) -> Result<(String, String), EvaluationError> {
        let left = self.evaluate_recursive(l)?;
        let right = self.evaluate_recursive(r)?;
        match (left.as_ref(), right.as_ref()) {
            (Value::String(a), Value::String(b)) => Ok((a.clone(), b.clone())),
            (a, b) => Err(pair_mismatch(op, "two strings", a, b)),
        }
    }
}

/// Reads `key` from an object value, keeping borrows where possible.
/// `Ok(None)` means the object has no such key.
fn field<'a>(value: Cow<'a, Value>, key: &str) -> Result<Option<Cow<'a, Value>>, EvaluationError> {
    match value {
        Cow::Borrowed(Value::Object(map)) => Ok(map.get(key).map(Cow::Borrowed)),
        Cow::Owned(Value::Object(mut map)) => Ok(map.remove(key).map(Cow::Owned)),
        other => Err(mismatch("attribute access", "object", &other)),
    }
}

fn subscript<'a>(value: Cow<'a, Value>, index: &Value) -> Result<Cow<'a, Value>, EvaluationError> {
    match (ValueKind::of(&value), index) {
        (ValueKind::Object, Value::String(key)) => {
            field(value, key)?.ok_or_else(|| EvaluationError::KeyNotFound(key.clone()))
        }
        (ValueKind::Array, Value::Number(n)) => {
            let len = value.as_array().map_or(0, Vec::len);
            let position = normalize_index(Num::from_number(n), len)?;
            match value {
                Cow::Borrowed(Value::Array(items)) => Ok(Cow::Borrowed(&items[position])),
                Cow::Owned(Value::Array(mut items)) => Ok(Cow::Owned(items.swap_remove(position))),
                other => Err(mismatch("[]", "array", &other)),
            }
        }
        (ValueKind::String, Value::Number(n)) => {
            let chars: Vec<char> = value.as_str().unwrap_or_default().chars().collect();
            let position = normalize_index(Num::from_number(n), chars.len())?;
            Ok(Cow::Owned(Value::String(chars[position].to_string())))
        }
        _ => Err(pair_mismatch(
            "[]",
            "an object with a string key, or an array or string with an integer index",
            &value,
            index,
        )),
    }
}

/// Resolves a possibly negative index against `len`.
fn normalize_index(index: Num, len: usize) -> Result<usize, EvaluationError> {
    let Num::Int(i) = index else {
        return Err(EvaluationError::TypeMismatch {
            operation: "[]".to_string(),
            expected: "integer index".to_string(),
            found: format!("number {}", index),
        });
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvaluationError::IndexOutOfRange { index: i, len });
    }
    Ok(resolved as usize)
}

fn numbers(op: &str, left: &Value, right: &Value) -> Result<(Num, Num), EvaluationError> {
    match (Num::from_value(left), Num::from_value(right)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(pair_mismatch(op, "two numbers", left, right)),
    }
}

/// Integer arithmetic stays integral (overflow is an error); anything
/// involving a float is computed in floating point.
fn numeric(
    op: &str,
    left: &Value,
    right: &Value,
    int_fn: fn(i64, i64) -> Option<i64>,
    float_fn: fn(f64, f64) -> f64,
) -> Result<Value, EvaluationError> {
    match numbers(op, left, right)? {
        (Num::Int(a), Num::Int(b)) => int_fn(a, b)
            .map(Value::from)
            .ok_or_else(|| EvaluationError::Overflow(op.to_string())),
        (a, b) => Num::Float(float_fn(a.as_f64(), b.as_f64())).into_value(op),
    }
}

fn power(base: Num, exp: Num) -> Result<Value, EvaluationError> {
    match (base, exp) {
        (Num::Int(b), Num::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| EvaluationError::Overflow("**".to_string()))?;
            b.checked_pow(e)
                .map(Value::from)
                .ok_or_else(|| EvaluationError::Overflow("**".to_string()))
        }
        (b, e) => {
            if b.is_zero() && e.as_f64() < 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Num::Float(b.as_f64().powf(e.as_f64())).into_value("**")
        }
    }
}

fn repeat(sequence: &Value, count: &Value) -> Result<Value, EvaluationError> {
    let times = match Num::from_value(count) {
        Some(Num::Int(n)) => n.max(0) as usize,
        _ => return Err(pair_mismatch("*", "a sequence and an integer", sequence, count)),
    };
    match sequence {
        Value::String(s) => {
            check_length("*", s.len().saturating_mul(times))?;
            Ok(Value::String(s.repeat(times)))
        }
        Value::Array(items) => {
            check_length("*", items.len().saturating_mul(times))?;
            Ok(Value::Array(
                std::iter::repeat_n(items.iter(), times)
                    .flatten()
                    .cloned()
                    .collect(),
            ))
        }
        other => Err(mismatch("*", "string or array", other)),
    }
}

fn check_length(op: &str, len: usize) -> Result<(), EvaluationError> {
    if len > MAX_SEQUENCE_LENGTH {
        return Err(EvaluationError::Overflow(op.to_string()));
    }
    Ok(())
}

fn mismatch(op: &str, expected: &str, found: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        operation: op.to_string(),
        expected: expected.to_string(),
        found: crate::ast::describe(found),
    }
}

fn pair_mismatch(op: &str, expected: &str, left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        operation: op.to_string(),
        expected: expected.to_string(),
        found: format!("{} and {}", ValueKind::of(left), ValueKind::of(right)),
    }
}
