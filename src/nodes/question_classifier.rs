use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType, render_input, tool_failure};
use crate::branch::case_label;
use crate::error::{ConfigError, WorkflowError};
use crate::services::{LlmClient, LlmRequest};
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct ClassDefinition {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ClassifierPayload {
    #[serde(default = "super::default_query")]
    query: String,
    classes: Vec<ClassDefinition>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Classifies the query into one of its classes and routes to `CASE{n}`.
///
/// An answer naming no class, or a failed call, routes to the first class.
pub struct QuestionClassifierNode {
    id: String,
    payload: ClassifierPayload,
    client: Arc<dyn LlmClient>,
}

impl QuestionClassifierNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let client = ctx.services.llm.clone().ok_or_else(|| ConfigError::MissingService {
            node_id: config.id.clone(),
            service: "llm".to_string(),
        })?;
        let payload: ClassifierPayload = config.payload()?;
        if payload.classes.is_empty() {
            return Err(config.invalid("no classes declared"));
        }
        Ok(Self {
            id: config.id.clone(),
            payload,
            client,
        })
    }

    fn system_prompt(&self) -> String {
        let classes = self
            .payload
            .classes
            .iter()
            .enumerate()
            .map(|(i, class)| format!("{}. {}", i + 1, class.name))
            .join("\n");
        let mut prompt = format!(
            "Classify the user input into exactly one of these categories and answer with the category name only.\n{}",
            classes
        );
        if let Some(instruction) = &self.payload.instruction {
            prompt.push_str("\n\n");
            prompt.push_str(instruction);
        }
        prompt
    }

    /// Index of the class the answer names. Exact matches win over mentions.
    fn match_class(&self, answer: &str) -> Option<usize> {
        let answer = answer.trim().to_lowercase();
        let classes = &self.payload.classes;
        classes
            .iter()
            .position(|c| c.name.to_lowercase() == answer)
            .or_else(|| {
                classes.iter().position(|c| {
                    c.id.as_deref().is_some_and(|id| id.to_lowercase() == answer)
                })
            })
            .or_else(|| classes.iter().position(|c| answer.contains(&c.name.to_lowercase())))
    }
}

impl Node for QuestionClassifierNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::QuestionClassifier.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let request = LlmRequest {
                model: self.payload.model.clone(),
                system_prompt: Some(self.system_prompt()),
                prompt: render_input(&self.payload.query, state)?,
                temperature: Some(0.0),
            };
            match self.client.complete(request).await {
                Ok(answer) => {
                    let index = self.match_class(&answer).unwrap_or_else(|| {
                        tracing::warn!(node_id = %self.id, answer = %answer, "answer names no class; using the first");
                        0
                    });
                    let class = &self.payload.classes[index];
                    let output = json!({
                        "output": class.name,
                        "class_id": class.id,
                        "class_index": index + 1,
                    });
                    Ok(NodeOutput::routed(output, case_label(index)))
                }
                Err(e) => Ok(NodeOutput::routed(tool_failure(state, &self.id, &e), case_label(0))),
            }
        })
    }
}
