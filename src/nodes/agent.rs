use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType, render_input, tool_failure};
use crate::error::{ConfigError, WorkflowError};
use crate::services::{AgentRequest, AgentRunner};
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct AgentPayload {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default = "super::default_query")]
    message: String,
}

/// Hands the rendered message to an agent and publishes its answer.
pub struct AgentNode {
    id: String,
    payload: AgentPayload,
    runner: Arc<dyn AgentRunner>,
}

impl AgentNode {
    pub fn from_config(config: &NodeConfig, ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let runner = ctx.services.agent.clone().ok_or_else(|| ConfigError::MissingService {
            node_id: config.id.clone(),
            service: "agent".to_string(),
        })?;
        Ok(Self {
            id: config.id.clone(),
            payload: config.payload()?,
            runner,
        })
    }
}

impl Node for AgentNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::Agent.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let request = AgentRequest {
                agent_id: self.payload.agent_id.clone(),
                message: render_input(&self.payload.message, state)?,
                variables: Value::Object(state.variables.conv.clone()),
            };
            let output = match self.runner.run(request).await {
                Ok(answer) => json!({ "output": answer }),
                Err(e) => tool_failure(state, &self.id, &e),
            };
            Ok(NodeOutput::new(output))
        })
    }
}
