use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType, render_input, tool_failure};
use crate::error::{ConfigError, WorkflowError};
use crate::services::{KnowledgeRetriever, RetrievalRequest};
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct RetrievalPayload {
    #[serde(default = "super::default_query")]
    query: String,
    #[serde(default)]
    knowledge_ids: Vec<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

/// Searches the configured knowledge bases with a rendered query.
pub struct KnowledgeRetrievalNode {
    id: String,
    payload: RetrievalPayload,
    retriever: Arc<dyn KnowledgeRetriever>,
}

impl KnowledgeRetrievalNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let retriever = ctx.services.retriever.clone().ok_or_else(|| ConfigError::MissingService {
            node_id: config.id.clone(),
            service: "knowledge retriever".to_string(),
        })?;
        let payload: RetrievalPayload = config.payload()?;
        if payload.top_k == 0 {
            return Err(config.invalid("top_k must be at least 1"));
        }
        Ok(Self {
            id: config.id.clone(),
            payload,
            retriever,
        })
    }
}

impl Node for KnowledgeRetrievalNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::KnowledgeRetrieval.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let request = RetrievalRequest {
                query: render_input(&self.payload.query, state)?,
                knowledge_ids: self.payload.knowledge_ids.clone(),
                top_k: self.payload.top_k,
            };
            let output = match self.retriever.retrieve(request).await {
                Ok(chunks) => {
                    let chunks = chunks
                        .into_iter()
                        .sorted_by(|a, b| b.score.total_cmp(&a.score))
                        .take(self.payload.top_k)
                        .collect_vec();
                    let text = chunks.iter().map(|c| c.content.as_str()).join("\n\n");
                    json!({ "output": chunks, "text": text })
                }
                Err(e) => tool_failure(state, &self.id, &e),
            };
            Ok(NodeOutput::new(output))
        })
    }
}
