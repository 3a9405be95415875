use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::ast::Expression;
use crate::error::{ConfigError, WorkflowError};
use crate::expression::{ExpressionEvaluator, Scope, validate_variable_name};
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct TransformEntry {
    name: String,
    expression: String,
}

#[derive(Debug, Deserialize)]
struct TransformPayload {
    #[serde(default)]
    mapping: Vec<TransformEntry>,
}

/// Computes named values from expressions.
pub struct TransformNode {
    id: String,
    mapping: Vec<(String, Expression)>,
}

impl TransformNode {
    pub fn from_config(config: &NodeConfig, _ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: TransformPayload = config.payload()?;
        let mapping = payload
            .mapping
            .into_iter()
            .map(|entry| {
                validate_variable_name(&entry.name)?;
                let expression = ExpressionEvaluator::parse(&entry.expression).map_err(|e| {
                    config.invalid(format!("output '{}': {}", entry.name, e))
                })?;
                Ok((entry.name, expression))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            id: config.id.clone(),
            mapping,
        })
    }
}

impl Node for TransformNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::Transform.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let scope = Scope::from_state(state);
            let mut output = Map::new();
            for (name, expression) in &self.mapping {
                output.insert(name.clone(), ExpressionEvaluator::evaluate_ast(expression, &scope)?);
            }
            Ok(NodeOutput::new(Value::Object(output)))
        })
    }
}
