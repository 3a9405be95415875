use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::ast::{ValueKind, describe};
use crate::error::{ConfigError, EvaluationError, SelectorError, WorkflowError};
use crate::expression::validate_variable_name;
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputType {
    #[serde(alias = "text-input", alias = "paragraph", alias = "select")]
    String,
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Array,
    Object,
}

impl InputType {
    fn kind(self) -> ValueKind {
        match self {
            InputType::String => ValueKind::String,
            InputType::Number => ValueKind::Number,
            InputType::Boolean => ValueKind::Boolean,
            InputType::Array => ValueKind::Array,
            InputType::Object => ValueKind::Object,
        }
    }

    /// Accepts the value as-is, or converts from a string where that is unambiguous.
    fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (InputType::Number, Value::String(s)) => {
                let s = s.trim();
                s.parse::<i64>().map(Value::from).ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                })
            }
            (InputType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ty, value) if ValueKind::of(&value) == ty.kind() => Some(value),
            _ => None,
        }
    }
}

/// A declared input of the workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct InputVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub input_type: Option<InputType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    #[serde(default)]
    variables: Vec<InputVariable>,
}

/// Entry node: validates the run's inputs and publishes them with the message.
pub struct StartNode {
    id: String,
    variables: Vec<InputVariable>,
}

impl StartNode {
    pub fn from_config(config: &NodeConfig, _ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: StartPayload = config.payload()?;
        for variable in &payload.variables {
            validate_variable_name(&variable.name)?;
        }
        Ok(Self {
            id: config.id.clone(),
            variables: payload.variables,
        })
    }

    fn collect_inputs(&self, state: &WorkflowState) -> Result<Map<String, Value>, WorkflowError> {
        let provided = state
            .variables
            .sys
            .get("input_variables")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut inputs = provided.clone();
        for variable in &self.variables {
            let value = provided
                .get(&variable.name)
                .filter(|v| !v.is_null())
                .cloned()
                .or_else(|| variable.default.clone());

            let Some(value) = value else {
                if variable.required {
                    return Err(SelectorError::NotFound(format!(
                        "sys.input_variables.{}",
                        variable.name
                    ))
                    .into());
                }
                inputs.insert(variable.name.clone(), Value::Null);
                continue;
            };

            let value = match variable.input_type {
                Some(ty) => ty.coerce(value.clone()).ok_or_else(|| EvaluationError::TypeMismatch {
                    operation: format!("input '{}'", variable.name),
                    expected: ty.kind().to_string(),
                    found: describe(&value),
                })?,
                None => value,
            };
            inputs.insert(variable.name.clone(), value);
        }
        Ok(inputs)
    }
}

impl Node for StartNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::Start.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let mut output = self.collect_inputs(state)?;
            let message = state
                .variables
                .sys
                .get("message")
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            output.insert("message".to_string(), message);
            Ok(NodeOutput::new(Value::Object(output)))
        })
    }
}
