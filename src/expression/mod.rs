//! Sandboxed evaluation of workflow expressions.
//!
//! Expressions are parsed into an [`Expression`] tree and walked against a
//! [`Scope`]. The language has no calls, no imports and no assignment, so a
//! configured expression can only read the run's variables.

mod engine;
pub mod parser;

use crate::ast::{Expression, is_truthy};
use crate::error::{ConfigError, EvaluationError};
use crate::state::WorkflowState;
use ahash::AHashMap;
use engine::AstEngine;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Names bound by the evaluator itself. User variables may not use them.
pub const RESERVED_NAMESPACES: [&str; 4] = ["var", "node", "sys", "nodes"];

/// The namespaces an expression is evaluated against.
///
/// Qualified access goes through `var` (also spelled `conv`, as in
/// selectors), `node`/`nodes` and `sys`. Bare names
/// resolve against node outputs and conversation variables, with
/// conversation variables winning on collision.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    conversation: &'a Map<String, Value>,
    nodes: &'a AHashMap<String, Value>,
    system: &'a Map<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(
        conversation: &'a Map<String, Value>,
        nodes: &'a AHashMap<String, Value>,
        system: &'a Map<String, Value>,
    ) -> Self {
        Self {
            conversation,
            nodes,
            system,
        }
    }

    pub fn from_state(state: &'a WorkflowState) -> Self {
        Self::new(
            &state.variables.conv,
            &state.runtime_vars,
            &state.variables.sys,
        )
    }

    pub fn conversation(&self) -> &'a Map<String, Value> {
        self.conversation
    }

    pub fn nodes(&self) -> &'a AHashMap<String, Value> {
        self.nodes
    }

    pub fn system(&self) -> &'a Map<String, Value> {
        self.system
    }

    /// Resolves `namespace.key` without materialising the namespace.
    /// Returns `None` when `namespace` is not a reserved name.
    pub(crate) fn qualified(&self, namespace: &str, key: &str) -> Option<Option<&'a Value>> {
        match namespace {
            "var" | "conv" => Some(self.conversation.get(key)),
            "node" | "nodes" => Some(self.nodes.get(key)),
            "sys" => Some(self.system.get(key)),
            _ => None,
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Cow<'a, Value>> {
        match name {
            "var" | "conv" => Some(Cow::Owned(Value::Object(self.conversation.clone()))),
            "node" | "nodes" => Some(Cow::Owned(Value::Object(
                self.nodes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ))),
            "sys" => Some(Cow::Owned(Value::Object(self.system.clone()))),
            _ => self
                .conversation
                .get(name)
                .or_else(|| self.nodes.get(name))
                .map(Cow::Borrowed),
        }
    }
}

/// Entry point for evaluating expression strings.
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    /// Parses an expression, stripping one pair of `{{ }}` if present.
    pub fn parse(source: &str) -> Result<Expression, EvaluationError> {
        parser::parse(strip_braces(source))
    }

    pub fn evaluate(source: &str, scope: &Scope<'_>) -> Result<Value, EvaluationError> {
        let expression = Self::parse(source)?;
        Self::evaluate_ast(&expression, scope)
    }

    /// Evaluates and coerces the result to a boolean by truthiness.
    pub fn evaluate_bool(source: &str, scope: &Scope<'_>) -> Result<bool, EvaluationError> {
        Self::evaluate(source, scope).map(|v| is_truthy(&v))
    }

    pub fn evaluate_ast(expression: &Expression, scope: &Scope<'_>) -> Result<Value, EvaluationError> {
        AstEngine::new(expression, scope).evaluate()
    }

    pub fn evaluate_ast_bool(expression: &Expression, scope: &Scope<'_>) -> Result<bool, EvaluationError> {
        Self::evaluate_ast(expression, scope).map(|v| is_truthy(&v))
    }
}

/// Removes surrounding whitespace and one enclosing `{{ }}` pair.
pub fn strip_braces(source: &str) -> &str {
    let trimmed = source.trim();
    match trimmed
        .strip_prefix("{{")
        .and_then(|inner| inner.strip_suffix("}}"))
    {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

/// True when `source` is exactly one `{{ ... }}` placeholder.
pub fn is_wrapped(source: &str) -> bool {
    let trimmed = source.trim();
    trimmed.len() >= 4
        && trimmed.starts_with("{{")
        && trimmed.ends_with("}}")
        && !trimmed[2..trimmed.len() - 2].contains("{{")
}

/// Checks a user-declared variable name: an identifier that does not shadow
/// a reserved namespace.
pub fn validate_variable_name(name: &str) -> Result<(), ConfigError> {
    if RESERVED_NAMESPACES.contains(&name) {
        return Err(ConfigError::ReservedVariableName(name.to_string()));
    }
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ConfigError::InvalidVariableName(name.to_string()));
    }
    Ok(())
}
