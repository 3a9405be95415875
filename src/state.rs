use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;

/// A piece of text surfaced to the caller before the run completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamChunk {
    pub node_id: String,
    pub content: String,
}

/// Partial output accumulated by a streaming node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingBuffer {
    pub chunks: Vec<String>,
    pub full_content: String,
}

/// A non-fatal failure recorded by a node that called an external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub tool: String,
    pub node_id: String,
    pub error: String,
}

/// System facts for one run. Converted into `variables.sys` at run start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemVariables {
    pub execution_id: String,
    pub conversation_id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub message: String,
    pub input_variables: Map<String, Value>,
}

impl SystemVariables {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("execution_id".into(), Value::String(self.execution_id));
        map.insert("conversation_id".into(), Value::String(self.conversation_id));
        map.insert("workspace_id".into(), Value::String(self.workspace_id));
        map.insert("user_id".into(), Value::String(self.user_id));
        map.insert("message".into(), Value::String(self.message));
        map.insert("input_variables".into(), Value::Object(self.input_variables));
        map
    }
}

/// The `sys` and `conv` namespaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Variables {
    pub sys: Map<String, Value>,
    pub conv: Map<String, Value>,
}

/// Mutable context of one workflow run.
///
/// Nodes never touch this directly for variable access; they go through
/// [`VariablePool`](crate::variable::VariablePool), which enforces that only
/// `conv` is writable.
#[derive(Debug, Default, Serialize)]
pub struct WorkflowState {
    pub variables: Variables,
    pub runtime_vars: AHashMap<String, Value>,
    pub streaming_buffer: AHashMap<String, StreamingBuffer>,
    pub errors: Vec<ErrorRecord>,
    #[serde(skip)]
    chunk_sink: Option<UnboundedSender<StreamChunk>>,
}

impl WorkflowState {
    pub fn new(system: SystemVariables, conversation: Map<String, Value>) -> Self {
        Self {
            variables: Variables {
                sys: system.into_map(),
                conv: conversation,
            },
            ..Self::default()
        }
    }

    /// Routes emitted chunks to `sink` as well as into the buffers.
    pub fn with_chunk_sink(mut self, sink: UnboundedSender<StreamChunk>) -> Self {
        self.chunk_sink = Some(sink);
        self
    }

    pub fn set_chunk_sink(&mut self, sink: Option<UnboundedSender<StreamChunk>>) {
        self.chunk_sink = sink;
    }

    /// Appends a chunk to the node's streaming buffer and forwards it to the sink.
    pub fn push_chunk(&mut self, node_id: &str, content: impl Into<String>) {
        let content = content.into();
        if content.is_empty() {
            return;
        }
        let buffer = self.streaming_buffer.entry(node_id.to_string()).or_default();
        buffer.full_content.push_str(&content);
        buffer.chunks.push(content.clone());
        self.emit(node_id, content);
    }

    /// Forwards text to the sink without buffering it under any node.
    pub fn emit(&self, node_id: &str, content: String) {
        if content.is_empty() {
            return;
        }
        if let Some(sink) = &self.chunk_sink {
            // A dropped receiver only means nobody is listening any more.
            let _ = sink.send(StreamChunk {
                node_id: node_id.to_string(),
                content,
            });
        }
    }

    pub fn record_error(&mut self, tool: &str, node_id: &str, error: impl Into<String>) {
        self.errors.push(ErrorRecord {
            tool: tool.to_string(),
            node_id: node_id.to_string(),
            error: error.into(),
        });
    }

    /// Text a node has streamed so far, if any.
    pub fn streamed_content(&self, node_id: &str) -> Option<&str> {
        self.streaming_buffer
            .get(node_id)
            .map(|b| b.full_content.as_str())
    }
}
