use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType, render_input, tool_failure};
use crate::error::{ConfigError, UpstreamToolError, WorkflowError};
use crate::expression::validate_variable_name;
use crate::services::{LlmClient, LlmRequest};
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

const TOOL: &str = "parameter-extractor";

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

fn default_type() -> String {
    "string".to_string()
}

#[derive(Debug, Deserialize)]
struct ExtractorPayload {
    #[serde(default = "super::default_query")]
    query: String,
    parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Asks the LLM to pull typed parameters out of the query as JSON.
pub struct ParameterExtractorNode {
    id: String,
    payload: ExtractorPayload,
    client: Arc<dyn LlmClient>,
}

impl ParameterExtractorNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let client = ctx.services.llm.clone().ok_or_else(|| ConfigError::MissingService {
            node_id: config.id.clone(),
            service: "llm".to_string(),
        })?;
        let payload: ExtractorPayload = config.payload()?;
        if payload.parameters.is_empty() {
            return Err(config.invalid("no parameters declared"));
        }
        for parameter in &payload.parameters {
            validate_variable_name(&parameter.name)?;
        }
        Ok(Self {
            id: config.id.clone(),
            payload,
            client,
        })
    }

    fn system_prompt(&self) -> String {
        let fields = self
            .payload
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "- {} ({}{}): {}",
                    p.name,
                    p.param_type,
                    if p.required { ", required" } else { "" },
                    p.description
                )
            })
            .join("\n");
        let mut prompt = format!(
            "Extract the following parameters from the user input and answer with a single JSON object only.\n{}",
            fields
        );
        if let Some(instruction) = &self.payload.instruction {
            prompt.push_str("\n\n");
            prompt.push_str(instruction);
        }
        prompt
    }

    /// Reads the declared parameters out of the model's answer.
    fn extract(&self, answer: &str) -> Result<Map<String, Value>, UpstreamToolError> {
        let object = parse_json_object(answer)
            .ok_or_else(|| UpstreamToolError::new(TOOL, "response is not a JSON object"))?;
        let mut extracted = Map::new();
        for parameter in &self.payload.parameters {
            let value = object.get(&parameter.name).cloned().unwrap_or(Value::Null);
            if parameter.required && value.is_null() {
                return Err(UpstreamToolError::new(
                    TOOL,
                    format!("required parameter '{}' was not extracted", parameter.name),
                ));
            }
            extracted.insert(parameter.name.clone(), value);
        }
        Ok(extracted)
    }
}

/// Parses the first `{...}` span of `text`, tolerating surrounding prose or code fences.
fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str(&text[start..=end]).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

impl Node for ParameterExtractorNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::ParameterExtractor.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let request = LlmRequest {
                model: self.payload.model.clone(),
                system_prompt: Some(self.system_prompt()),
                prompt: render_input(&self.payload.query, state)?,
                temperature: Some(0.0),
            };
            let result = self
                .client
                .complete(request)
                .await
                .and_then(|answer| self.extract(&answer));
            let output = match result {
                Ok(extracted) => Value::Object(extracted),
                Err(e) => tool_failure(state, &self.id, &e),
            };
            Ok(NodeOutput::new(output))
        })
    }
}
