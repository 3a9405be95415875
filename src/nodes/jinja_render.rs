use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::error::{ConfigError, WorkflowError};
use crate::expression::{ExpressionEvaluator, Scope, is_wrapped, validate_variable_name};
use crate::state::WorkflowState;
use crate::template::{RenderMode, TemplateRenderer};
use crate::variable::{VariablePool, VariableSelector};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};

/// A named input of the template.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    pub name: String,
    /// A selector (`"llm.output"` or `["llm", "output"]`), an expression in
    /// `{{ }}`, or a literal.
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
struct JinjaRenderPayload {
    template: String,
    #[serde(default)]
    mapping: Vec<MappingEntry>,
}

/// Renders a free-form template. Undefined values render as nothing.
pub struct JinjaRenderNode {
    id: String,
    template: String,
    mapping: Vec<MappingEntry>,
}

impl JinjaRenderNode {
    pub fn from_config(config: &NodeConfig, _ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: JinjaRenderPayload = config.payload()?;
        if let Some(problem) = TemplateRenderer::validate(&payload.template).into_iter().next() {
            return Err(config.invalid(problem));
        }
        for entry in &payload.mapping {
            validate_variable_name(&entry.name)?;
        }
        Ok(Self {
            id: config.id.clone(),
            template: payload.template,
            mapping: payload.mapping,
        })
    }

    fn resolve(&self, entry: &MappingEntry, state: &mut WorkflowState) -> Result<Value, WorkflowError> {
        match &entry.value {
            Value::String(source) if is_wrapped(source) => {
                Ok(ExpressionEvaluator::evaluate(source, &Scope::from_state(state))?)
            }
            Value::String(source) if looks_like_selector(source) => {
                match VariableSelector::from_string(source) {
                    Ok(selector) => Ok(VariablePool::new(state).get_or(&selector, Value::Null)?),
                    Err(_) => Ok(entry.value.clone()),
                }
            }
            Value::Array(segments) if segments.iter().all(Value::is_string) => {
                let path = segments.iter().filter_map(Value::as_str);
                let selector = VariableSelector::new(path)?;
                Ok(VariablePool::new(state).get_or(&selector, Value::Null)?)
            }
            other => Ok(other.clone()),
        }
    }
}

impl Node for JinjaRenderNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::JinjaRender.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            // Mapped names shadow conversation variables of the same name.
            let mut variables = state.variables.conv.clone();
            for entry in &self.mapping {
                let value = self.resolve(entry, state)?;
                variables.insert(entry.name.clone(), value);
            }
            let rendered = TemplateRenderer::shared().render(
                &self.template,
                &variables,
                &state.runtime_vars,
                &state.variables.sys,
                RenderMode::Lenient,
            )?;
            Ok(NodeOutput::new(json!({ "output": rendered })))
        })
    }
}

fn looks_like_selector(source: &str) -> bool {
    source.contains('.') && !source.contains(char::is_whitespace)
}
