//! Collaborators that nodes call out to.
//!
//! Concrete clients live outside this crate. Nodes receive them through a
//! [`Services`] bundle owned by whoever builds the workflow, never through
//! process globals.

use crate::error::UpstreamToolError;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ToolResult<T> = Result<T, UpstreamToolError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: Option<f64>,
}

/// Text generation.
pub trait LlmClient: Send + Sync + 'static {
    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, ToolResult<String>>;

    /// Streams the completion as text deltas. Defaults to a single chunk
    /// holding the whole completion.
    fn stream(&self, request: LlmRequest) -> BoxFuture<'_, ToolResult<BoxStream<'_, ToolResult<String>>>> {
        Box::pin(async move {
            let text = self.complete(request).await?;
            Ok(futures::stream::once(async move { Ok(text) }).boxed())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_id: Option<String>,
    pub message: String,
    pub variables: Value,
}

/// A conversational agent that answers a message end to end.
pub trait AgentRunner: Send + Sync + 'static {
    fn run(&self, request: AgentRequest) -> BoxFuture<'_, ToolResult<String>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub knowledge_ids: Vec<String>,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub source: Option<String>,
}

/// Knowledge-base search.
pub trait KnowledgeRetriever: Send + Sync + 'static {
    fn retrieve(&self, request: RetrievalRequest) -> BoxFuture<'_, ToolResult<Vec<RetrievedChunk>>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Outbound HTTP.
pub trait HttpClient: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, ToolResult<HttpResponse>>;
}

/// Handles to the collaborators available to a workflow.
#[derive(Clone, Default)]
pub struct Services {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub agent: Option<Arc<dyn AgentRunner>>,
    pub retriever: Option<Arc<dyn KnowledgeRetriever>>,
    pub http: Option<Arc<dyn HttpClient>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentRunner>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("llm", &self.llm.is_some())
            .field("agent", &self.agent.is_some())
            .field("retriever", &self.retriever.is_some())
            .field("http", &self.http.is_some())
            .finish()
    }
}
