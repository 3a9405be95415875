//! Compilation of declarative if/else cases into expression trees.
//!
//! Each case is a list of comparisons joined by `and`/`or`. Cases are lowered
//! directly into [`Expression`] trees and an always-true fallback is appended,
//! so evaluating the cases in order always selects exactly one label.

use crate::ast::Expression;
use crate::error::{ConfigError, EvaluationError};
use crate::expression::parser::MAX_OPERATOR_COUNT;
use crate::expression::{ExpressionEvaluator, Scope, strip_braces};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of routing labels: `CASE1`, `CASE2`, ...
pub const CASE_LABEL_PREFIX: &str = "CASE";

pub fn case_label(index: usize) -> String {
    format!("{}{}", CASE_LABEL_PREFIX, index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// `{left, comparison_operator, right}`. Operands are expressions when given
/// as strings and literals otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Value,
    pub comparison_operator: String,
    #[serde(default)]
    pub right: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDefinition {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// Generates the operator table and the lowering function.
macro_rules! define_comparison_operators {
    ( $( ($name:expr, Unary, $build:expr) ),* $(,)? ; $( ($bi_name:expr, Binary, $bi_build:expr) ),* $(,)? ) => {
        /// Every accepted `comparison_operator` spelling.
        pub const COMPARISON_OPERATORS: &[&str] = &[ $( $name, )* $( $bi_name, )* ];

        fn lower_comparison(
            operator: &str,
            left: Expression,
            right: Expression,
        ) -> Option<Expression> {
            match operator {
                $( $name => {
                    let build: fn(Box<Expression>) -> Expression = $build;
                    Some(build(Box::new(left)))
                } )*
                $( $bi_name => {
                    let build: fn(Box<Expression>, Box<Expression>) -> Expression = $bi_build;
                    Some(build(Box::new(left), Box::new(right)))
                } )*
                _ => None,
            }
        }
    };
}

define_comparison_operators! {
    ("empty", Unary, Expression::IsEmpty),
    ("not_empty", Unary, |l| Expression::Not(Box::new(Expression::IsEmpty(l)))),
    ("not empty", Unary, |l| Expression::Not(Box::new(Expression::IsEmpty(l)))),

    ;

    // `contains` tests the right operand for membership in the left one.
    ("contains", Binary, |l, r| Expression::In(r, l)),
    ("not_contains", Binary, |l, r| Expression::NotIn(r, l)),
    ("not contains", Binary, |l, r| Expression::NotIn(r, l)),
    ("startwith", Binary, Expression::StartsWith),
    ("start with", Binary, Expression::StartsWith),
    ("endwith", Binary, Expression::EndsWith),
    ("end with", Binary, Expression::EndsWith),
    ("eq", Binary, Expression::Equal),
    ("is", Binary, Expression::Equal),
    ("ne", Binary, Expression::NotEqual),
    ("is not", Binary, Expression::NotEqual),
    ("lt", Binary, Expression::SmallerThan),
    ("le", Binary, Expression::SmallerThanOrEqual),
    ("gt", Binary, Expression::GreaterThan),
    ("ge", Binary, Expression::GreaterThanOrEqual),
}

/// One compiled case and the label it routes to.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBranch {
    pub label: String,
    pub expression: Expression,
}

/// The ordered branch list of an if/else node. The last entry is the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBranches {
    branches: Vec<CompiledBranch>,
}

impl CompiledBranches {
    /// Compiles `cases` for the node `node_id`.
    pub fn compile(node_id: &str, cases: &[CaseDefinition]) -> Result<Self, ConfigError> {
        let mut branches = Vec::with_capacity(cases.len() + 1);

        for (index, case) in cases.iter().enumerate() {
            // Conditions chain left to right, one tree level each.
            if case.conditions.len() > MAX_OPERATOR_COUNT {
                return Err(ConfigError::InvalidCondition {
                    node_id: node_id.to_string(),
                    message: format!(
                        "case {} has {} conditions, more than the limit of {}",
                        index + 1,
                        case.conditions.len(),
                        MAX_OPERATOR_COUNT
                    ),
                });
            }
            let mut comparisons = case
                .conditions
                .iter()
                .map(|condition| compile_condition(node_id, condition));

            let first = comparisons.next().ok_or_else(|| ConfigError::EmptyBranch {
                node_id: node_id.to_string(),
                case: index + 1,
            })??;

            let expression = comparisons.try_fold(first, |acc, next| {
                let next = Box::new(next?);
                Ok::<_, ConfigError>(match case.logical_operator {
                    LogicalOperator::And => Expression::And(Box::new(acc), next),
                    LogicalOperator::Or => Expression::Or(Box::new(acc), next),
                })
            })?;

            branches.push(CompiledBranch {
                label: case_label(index),
                expression,
            });
        }

        branches.push(CompiledBranch {
            label: case_label(cases.len()),
            expression: Expression::literal(true),
        });

        Ok(Self { branches })
    }

    pub fn branches(&self) -> &[CompiledBranch] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn fallback_label(&self) -> &str {
        self.branches
            .last()
            .map(|b| b.label.as_str())
            .unwrap_or(CASE_LABEL_PREFIX)
    }

    /// Returns the label of the first branch that evaluates truthy.
    /// Evaluation errors are returned, never treated as a false branch.
    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<&str, EvaluationError> {
        for branch in &self.branches {
            if ExpressionEvaluator::evaluate_ast_bool(&branch.expression, scope)? {
                return Ok(&branch.label);
            }
        }
        Ok(self.fallback_label())
    }
}

fn compile_condition(node_id: &str, condition: &Condition) -> Result<Expression, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidCondition {
        node_id: node_id.to_string(),
        message,
    };
    let left = compile_operand(&condition.left).map_err(|e| invalid(e.to_string()))?;
    let right = compile_operand(&condition.right).map_err(|e| invalid(e.to_string()))?;
    lower_comparison(condition.comparison_operator.trim(), left, right).ok_or_else(|| {
        invalid(format!(
            "unknown comparison operator '{}'",
            condition.comparison_operator
        ))
    })
}

fn compile_operand(operand: &Value) -> Result<Expression, EvaluationError> {
    match operand {
        Value::String(source) if strip_braces(source).is_empty() => Ok(Expression::literal("")),
        Value::String(source) => ExpressionEvaluator::parse(source),
        other => Ok(Expression::Literal(other.clone())),
    }
}
