use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType, render_input, tool_failure};
use crate::error::{ConfigError, UpstreamToolError, WorkflowError};
use crate::services::{LlmClient, LlmRequest};
use crate::state::WorkflowState;
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct LlmPayload {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default = "super::default_query")]
    prompt: String,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    stream: bool,
}

/// Calls the configured LLM with a rendered prompt, optionally streaming.
pub struct LlmNode {
    id: String,
    payload: LlmPayload,
    client: Arc<dyn LlmClient>,
}

impl LlmNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let client = ctx.services.llm.clone().ok_or_else(|| ConfigError::MissingService {
            node_id: config.id.clone(),
            service: "llm".to_string(),
        })?;
        Ok(Self {
            id: config.id.clone(),
            payload: config.payload()?,
            client,
        })
    }

    fn request(&self, state: &WorkflowState) -> Result<LlmRequest, WorkflowError> {
        let system_prompt = match &self.payload.system_prompt {
            Some(template) => Some(render_input(template, state)?),
            None => None,
        };
        Ok(LlmRequest {
            model: self.payload.model.clone(),
            system_prompt,
            prompt: render_input(&self.payload.prompt, state)?,
            temperature: self.payload.temperature,
        })
    }

    /// Streams into the node's buffer. On a mid-stream failure the text
    /// received so far is kept alongside the error.
    async fn stream_completion(
        &self,
        request: LlmRequest,
        state: &mut WorkflowState,
    ) -> Result<String, (String, UpstreamToolError)> {
        // The buffer exists even if no chunk arrives, marking that this node streamed.
        state.streaming_buffer.entry(self.id.clone()).or_default();
        let mut stream = self
            .client
            .stream(request)
            .await
            .map_err(|e| (String::new(), e))?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(delta) => {
                    text.push_str(&delta);
                    state.push_chunk(&self.id, delta);
                }
                Err(e) => return Err((text, e)),
            }
        }
        Ok(text)
    }
}

impl Node for LlmNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::Llm.as_str()
    }

    fn streams(&self) -> bool {
        self.payload.stream
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let request = self.request(state)?;
            let result = if self.payload.stream {
                self.stream_completion(request, state).await
            } else {
                self.client.complete(request).await.map_err(|e| (String::new(), e))
            };
            match result {
                Ok(text) => Ok(NodeOutput::new(json!({ "output": text }))),
                Err((partial, error)) => {
                    let mut payload = tool_failure(state, &self.id, &error);
                    payload["output"] = json!(partial);
                    Ok(NodeOutput::new(payload))
                }
            }
        })
    }
}
