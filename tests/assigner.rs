//! Tests for typed assignment operators.
mod common;
use common::*;
use nagare::assigner::apply_operation;
use nagare::prelude::*;
use serde_json::{Value, json};

fn item(selector: &str, operation: AssignmentOperation, value: Value) -> AssignmentItem {
    AssignmentItem::new(VariableSelector::from_string(selector).unwrap(), operation, value)
}

#[test]
fn test_repeated_add_then_divide_by_zero() {
    let mut state = state_with("hi", json!({ "count": 0 }));
    let mut pool = VariablePool::new(&mut state);
    let add = item("conv.count", AssignmentOperation::Add, json!(5));
    for _ in 0..3 {
        add.apply(&mut pool).unwrap();
    }
    assert_eq!(pool.get(&VariableSelector::from_string("conv.count").unwrap()).unwrap(), json!(15));

    let divide = item("conv.count", AssignmentOperation::Divide, json!(0));
    assert_eq!(
        divide.apply(&mut pool),
        Err(WorkflowError::OperatorType(OperatorTypeError::DivisionByZero))
    );
    assert_eq!(state.variables.conv["count"], json!(15));
}

#[test]
fn test_number_operator_on_string_slot_is_rejected() {
    for operation in [
        AssignmentOperation::Add,
        AssignmentOperation::Subtract,
        AssignmentOperation::Multiply,
        AssignmentOperation::Divide,
    ] {
        assert!(matches!(
            apply_operation(&json!("text"), operation, &json!(1)),
            Err(OperatorTypeError::UnsupportedOperation { .. })
        ));
    }
}

#[test]
fn test_append_then_remove_last_restores_array() {
    let mut state = state_with("hi", json!({ "items": [] }));
    let mut pool = VariablePool::new(&mut state);
    item("conv.items", AssignmentOperation::Append, json!({ "id": 1 }))
        .apply(&mut pool)
        .unwrap();
    let restored = item("conv.items", AssignmentOperation::RemoveLast, Value::Null)
        .apply(&mut pool)
        .unwrap();
    assert_eq!(restored, json!([]));
    assert_eq!(state.variables.conv["items"], json!([]));
}

#[test]
fn test_number_operations() {
    let n = |current: Value, op, value: Value| apply_operation(&current, op, &value).unwrap();
    assert_eq!(n(json!(2), AssignmentOperation::Add, json!(3)), json!(5));
    assert_eq!(n(json!(2), AssignmentOperation::Subtract, json!(3)), json!(-1));
    assert_eq!(n(json!(2), AssignmentOperation::Multiply, json!(1.5)), json!(3.0));
    assert_eq!(n(json!(9), AssignmentOperation::Divide, json!(3)), json!(3.0));
    assert_eq!(n(json!(9), AssignmentOperation::Assign, json!(1)), json!(1));
    assert_eq!(n(json!(9), AssignmentOperation::Clear, Value::Null), json!(0));

    assert!(matches!(
        apply_operation(&json!(1), AssignmentOperation::Add, &json!("1")),
        Err(OperatorTypeError::TypeMismatch { role: "value", .. })
    ));
    assert!(matches!(
        apply_operation(&json!(i64::MAX), AssignmentOperation::Add, &json!(1)),
        Err(OperatorTypeError::NumericRange(_))
    ));
    assert!(matches!(
        apply_operation(&json!(1), AssignmentOperation::Append, &json!(1)),
        Err(OperatorTypeError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_array_operations() {
    let a = |current: Value, op, value: Value| apply_operation(&current, op, &value);
    assert_eq!(a(json!([1]), AssignmentOperation::Append, json!(2)).unwrap(), json!([1, 2]));
    assert_eq!(a(json!([1]), AssignmentOperation::Extend, json!([2, 3])).unwrap(), json!([1, 2, 3]));
    assert_eq!(a(json!([1, 2, 3]), AssignmentOperation::RemoveFirst, Value::Null).unwrap(), json!([2, 3]));
    assert_eq!(a(json!([1, 2, 3]), AssignmentOperation::Clear, Value::Null).unwrap(), json!([]));
    assert_eq!(
        a(json!([]), AssignmentOperation::RemoveFirst, Value::Null),
        Err(OperatorTypeError::EmptyArray("remove_first".into()))
    );
    assert!(matches!(
        a(json!([1]), AssignmentOperation::Extend, json!(2)),
        Err(OperatorTypeError::TypeMismatch { .. })
    ));
    assert!(matches!(
        a(json!([1]), AssignmentOperation::Assign, json!("no")),
        Err(OperatorTypeError::TypeMismatch { .. })
    ));
}

#[test]
fn test_scalar_and_object_operations() {
    assert_eq!(
        apply_operation(&json!("a"), AssignmentOperation::Assign, &json!("b")).unwrap(),
        json!("b")
    );
    assert_eq!(
        apply_operation(&json!("a"), AssignmentOperation::Clear, &Value::Null).unwrap(),
        json!("")
    );
    assert!(apply_operation(&json!("a"), AssignmentOperation::Assign, &json!(1)).is_err());
    assert_eq!(
        apply_operation(&json!(true), AssignmentOperation::Clear, &Value::Null).unwrap(),
        json!(false)
    );
    assert!(apply_operation(&json!(true), AssignmentOperation::Add, &json!(true)).is_err());
    assert_eq!(
        apply_operation(&json!({ "a": 1 }), AssignmentOperation::Clear, &Value::Null).unwrap(),
        json!({})
    );
    assert!(apply_operation(&json!({}), AssignmentOperation::Append, &json!(1)).is_err());
}

#[test]
fn test_unset_slot_accepts_only_assign() {
    assert_eq!(
        apply_operation(&Value::Null, AssignmentOperation::Assign, &json!([1])).unwrap(),
        json!([1])
    );
    assert!(apply_operation(&Value::Null, AssignmentOperation::Add, &json!(1)).is_err());
}

#[test]
fn test_expression_values_are_evaluated() {
    let mut state = state_with_outputs(json!({ "total": 10 }), json!({ "calc": { "output": 4 } }));
    let mut pool = VariablePool::new(&mut state);
    let updated = item("conv.total", AssignmentOperation::Add, json!("{{ calc.output * 2 }}"))
        .apply(&mut pool)
        .unwrap();
    assert_eq!(updated, json!(18));

    // A plain string is a literal, even if it looks like a selector.
    let updated = item("conv.label", AssignmentOperation::Assign, json!("calc.output"))
        .apply(&mut pool)
        .unwrap();
    assert_eq!(updated, json!("calc.output"));
}

#[test]
fn test_non_conversation_targets_are_rejected() {
    let mut state = state_with_outputs(json!({}), json!({ "calc": { "output": 1 } }));
    let mut pool = VariablePool::new(&mut state);
    let result = item("calc.output", AssignmentOperation::Assign, json!(2)).apply(&mut pool);
    assert!(matches!(
        result,
        Err(WorkflowError::Selector(SelectorError::InvalidWrite { .. }))
    ));
}

#[test]
fn test_operation_spellings() {
    let parse = |s: &str| serde_json::from_value::<AssignmentOperation>(json!(s)).unwrap();
    assert_eq!(parse("over-write"), AssignmentOperation::Assign);
    assert_eq!(parse("set"), AssignmentOperation::Assign);
    assert_eq!(parse("+="), AssignmentOperation::Add);
    assert_eq!(parse("/="), AssignmentOperation::Divide);
    assert_eq!(parse("remove-last"), AssignmentOperation::RemoveLast);
    assert_eq!(parse("remove_first"), AssignmentOperation::RemoveFirst);
    assert_eq!(AssignmentOperation::RemoveFirst.to_string(), "remove_first");
    assert!(!AssignmentOperation::Clear.takes_value());
    assert!(AssignmentOperation::Extend.takes_value());
}
