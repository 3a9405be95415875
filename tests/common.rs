//! Common test utilities: state builders and in-memory collaborators.
#![allow(dead_code)]

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use nagare::error::UpstreamToolError;
use nagare::prelude::*;
use nagare::services::{
    AgentRequest, AgentRunner, HttpClient, HttpRequest, HttpResponse, KnowledgeRetriever, LlmClient,
    LlmRequest, RetrievalRequest, RetrievedChunk, ToolResult,
};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Converts a `json!` object literal into a variable map.
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// A state with `sys.message` set and the given conversation variables.
pub fn state_with(message: &str, conversation: Value) -> WorkflowState {
    WorkflowState::new(SystemVariables::new(message), object(conversation))
}

/// A state whose node outputs are already populated.
pub fn state_with_outputs(conversation: Value, outputs: Value) -> WorkflowState {
    let mut state = state_with("hello", conversation);
    for (id, output) in object(outputs) {
        state.runtime_vars.insert(id, output);
    }
    state
}

pub fn build(workflow: Value, services: &Services) -> WorkflowExecutor {
    build_with_config(workflow, services, EngineConfig::default())
}

pub fn build_with_config(workflow: Value, services: &Services, config: EngineConfig) -> WorkflowExecutor {
    WorkflowExecutor::from_json_str(&workflow.to_string(), &NodeFactory::with_defaults(), services, config)
        .expect("workflow should build")
}

/// Builds a single node outside of any graph.
pub fn build_node(config: Value, services: &Services) -> Result<Box<dyn Node>, ConfigError> {
    build_node_with_predecessors(config, services, &[])
}

pub fn build_node_with_predecessors(
    config: Value,
    services: &Services,
    predecessors: &[String],
) -> Result<Box<dyn Node>, ConfigError> {
    let config: NodeConfig = serde_json::from_value(config).expect("node config should deserialize");
    let engine = EngineConfig::default();
    let ctx = BuildContext {
        services,
        config: &engine,
        predecessors,
    };
    NodeFactory::with_defaults()
        .create(&config, &ctx)
        .map(|node| node.expect("not a condition node"))
}

/// An LLM that answers with canned text, optionally in chunks, after a delay, or not at all.
#[derive(Default)]
pub struct FakeLlm {
    pub reply: String,
    pub chunks: Vec<String>,
    pub fail_with: Option<String>,
    /// Stream this many chunks, then fail.
    pub fail_after: Option<usize>,
    pub delay: Option<Duration>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl FakeLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            reply: chunks.concat(),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl LlmClient for FakeLlm {
    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, ToolResult<String>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(message) => Err(UpstreamToolError::new("llm", message.clone())),
                None => Ok(self.reply.clone()),
            }
        })
    }

    fn stream(&self, request: LlmRequest) -> BoxFuture<'_, ToolResult<BoxStream<'_, ToolResult<String>>>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            if let Some(message) = &self.fail_with {
                return Err(UpstreamToolError::new("llm", message.clone()));
            }
            let limit = self.fail_after.unwrap_or(usize::MAX);
            let mut items: Vec<ToolResult<String>> =
                self.chunks.iter().take(limit).cloned().map(Ok).collect();
            if self.fail_after.is_some() {
                items.push(Err(UpstreamToolError::new("llm", "stream interrupted")));
            }
            Ok(futures::stream::iter(items).boxed())
        })
    }
}

#[derive(Default)]
pub struct FakeAgent {
    pub reply: String,
    pub requests: Mutex<Vec<AgentRequest>>,
}

impl AgentRunner for FakeAgent {
    fn run(&self, request: AgentRequest) -> BoxFuture<'_, ToolResult<String>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        })
    }
}

#[derive(Default)]
pub struct FakeRetriever {
    pub chunks: Vec<RetrievedChunk>,
    pub requests: Mutex<Vec<RetrievalRequest>>,
}

impl FakeRetriever {
    pub fn with_chunks(chunks: &[(&str, f64)]) -> Self {
        Self {
            chunks: chunks
                .iter()
                .map(|(content, score)| RetrievedChunk {
                    content: content.to_string(),
                    score: *score,
                    source: None,
                })
                .collect(),
            ..Self::default()
        }
    }
}

impl KnowledgeRetriever for FakeRetriever {
    fn retrieve(&self, request: RetrievalRequest) -> BoxFuture<'_, ToolResult<Vec<RetrievedChunk>>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            Ok(self.chunks.clone())
        })
    }
}

pub struct FakeHttp {
    pub status: u16,
    pub body: String,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl HttpClient for FakeHttp {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, ToolResult<HttpResponse>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                headers: Default::default(),
                body: self.body.clone(),
            })
        })
    }
}

pub fn llm_services(llm: Arc<FakeLlm>) -> Services {
    Services::new().with_llm(llm)
}
