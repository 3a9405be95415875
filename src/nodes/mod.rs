//! The node contract, node configuration and the built-in node types.

pub mod agent;
pub mod assigner;
pub mod end;
pub mod factory;
pub mod http_request;
pub mod if_else;
pub mod jinja_render;
pub mod knowledge_retrieval;
pub mod llm;
pub mod parameter_extractor;
pub mod question_classifier;
pub mod start;
pub mod transform;
pub mod variable_aggregator;

pub use factory::{BuildContext, NodeConstructor, NodeFactory};

use crate::error::{ConfigError, EvaluationError, UpstreamToolError, WorkflowError};
use crate::expression::Scope;
use crate::state::WorkflowState;
use crate::template::{RenderMode, TemplateRenderer};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

/// The result of one node execution.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Stored as `runtime_vars[node_id]`.
    pub output: Value,
    /// Routing label for branching nodes.
    pub route: Option<String>,
}

impl NodeOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            route: None,
        }
    }

    pub fn routed(output: Value, route: impl Into<String>) -> Self {
        Self {
            output,
            route: Some(route.into()),
        }
    }
}

/// A runnable workflow step.
///
/// `execute` may read any namespace, write `conv.*` through a
/// [`VariablePool`](crate::variable::VariablePool) and push streaming chunks.
/// Everything else it produces goes into the returned output.
pub trait Node: Send + Sync {
    fn id(&self) -> &str;

    fn node_type(&self) -> &str;

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>>;

    /// Whether this node streams partial text while executing.
    fn streams(&self) -> bool {
        false
    }

    /// Text to surface before the predecessor `upstream` starts streaming.
    fn stream_prefix(&self, upstream: &str, state: &WorkflowState) -> Result<Option<String>, WorkflowError> {
        let _ = (upstream, state);
        Ok(None)
    }
}

/// Built-in node type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Start,
    End,
    Llm,
    Agent,
    IfElse,
    Transform,
    KnowledgeRetrieval,
    Assigner,
    HttpRequest,
    JinjaRender,
    ParameterExtractor,
    QuestionClassifier,
    VariableAggregator,
    /// Routed by the graph layer; never instantiated.
    Condition,
}

impl NodeType {
    pub const ALL: [NodeType; 14] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Llm,
        NodeType::Agent,
        NodeType::IfElse,
        NodeType::Transform,
        NodeType::KnowledgeRetrieval,
        NodeType::Assigner,
        NodeType::HttpRequest,
        NodeType::JinjaRender,
        NodeType::ParameterExtractor,
        NodeType::QuestionClassifier,
        NodeType::VariableAggregator,
        NodeType::Condition,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Llm => "llm",
            NodeType::Agent => "agent",
            NodeType::IfElse => "if-else",
            NodeType::Transform => "transform",
            NodeType::KnowledgeRetrieval => "knowledge-retrieval",
            NodeType::Assigner => "assigner",
            NodeType::HttpRequest => "http-request",
            NodeType::JinjaRender => "jinja-render",
            NodeType::ParameterExtractor => "parameter-extractor",
            NodeType::QuestionClassifier => "question-classifier",
            NodeType::VariableAggregator => "variable-aggregator",
            NodeType::Condition => "condition",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

/// One node as declared in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Type-specific fields.
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: None,
            description: None,
            tags: Vec::new(),
            config: match config {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    /// Deserializes the type-specific fields.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object(self.config.clone())).map_err(|e| self.invalid(e.to_string()))
    }

    pub fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidNodeConfig {
            node_id: self.id.clone(),
            message: message.into(),
        }
    }

    pub fn builtin_type(&self) -> Option<NodeType> {
        self.node_type.parse().ok()
    }
}

/// Renders a node's templated input in lenient mode.
pub(crate) fn render_input(template: &str, state: &WorkflowState) -> Result<String, EvaluationError> {
    TemplateRenderer::shared().render_scope(template, &Scope::from_state(state), RenderMode::Lenient)
}

/// Records a collaborator failure and returns the error payload the node
/// outputs in place of a result.
pub(crate) fn tool_failure(state: &mut WorkflowState, node_id: &str, error: &UpstreamToolError) -> Value {
    tracing::warn!(node_id = %node_id, tool = %error.tool, error = %error.message, "tool call failed");
    state.record_error(&error.tool, node_id, error.to_string());
    json!({ "output": "", "error": error.to_string() })
}

pub(crate) fn default_query() -> String {
    "{{ sys.message }}".to_string()
}
