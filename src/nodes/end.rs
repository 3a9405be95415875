use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::error::{ConfigError, WorkflowError};
use crate::expression::Scope;
use crate::state::WorkflowState;
use crate::streaming::{self, Reconciliation};
use crate::template::{RenderMode, TemplateRenderer};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct EndPayload {
    #[serde(default)]
    output: String,
}

/// Terminal node: renders the final answer without repeating streamed text.
pub struct EndNode {
    id: String,
    template: String,
    predecessors: Vec<String>,
    mode: RenderMode,
}

impl EndNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: EndPayload = config.payload()?;
        if let Some(problem) = TemplateRenderer::validate(&payload.output).into_iter().next() {
            return Err(config.invalid(problem));
        }
        Ok(Self {
            id: config.id.clone(),
            template: payload.output,
            predecessors: ctx.predecessors.to_vec(),
            mode: RenderMode::from_strict(ctx.config.strict_end_templates),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders the template and reports what is left to stream.
    pub fn reconcile(&self, state: &WorkflowState) -> Result<Reconciliation, WorkflowError> {
        let scope = Scope::from_state(state);
        Ok(streaming::reconcile(&self.template, &self.predecessors, &scope, self.mode)?)
    }
}

impl Node for EndNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::End.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let result = self.reconcile(state)?;
            // The suffix is only meaningful if the anchor actually streamed;
            // otherwise the caller takes the full result from the output.
            if let Some(anchor) = &result.anchor {
                if state.streaming_buffer.contains_key(anchor) {
                    tracing::debug!(node_id = %self.id, anchor = %anchor, "emitting reconciled suffix");
                    state.push_chunk(&self.id, result.suffix.clone());
                }
            }
            Ok(NodeOutput::new(json!({ "output": result.full })))
        })
    }

    fn stream_prefix(&self, upstream: &str, state: &WorkflowState) -> Result<Option<String>, WorkflowError> {
        let scope = Scope::from_state(state);
        Ok(streaming::prefix_for(
            &self.template,
            &self.predecessors,
            upstream,
            &scope,
            self.mode,
        )?)
    }
}
