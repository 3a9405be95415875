use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::branch::{CaseDefinition, CompiledBranches};
use crate::error::{ConfigError, WorkflowError};
use crate::expression::Scope;
use crate::state::WorkflowState;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct IfElsePayload {
    #[serde(default)]
    cases: Vec<CaseDefinition>,
}

/// Routes to the first matching case, or to the fallback label.
pub struct IfElseNode {
    id: String,
    branches: CompiledBranches,
}

impl IfElseNode {
    pub fn from_config(config: &NodeConfig, _ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: IfElsePayload = config.payload()?;
        Ok(Self {
            id: config.id.clone(),
            branches: CompiledBranches::compile(&config.id, &payload.cases)?,
        })
    }

    pub fn branches(&self) -> &CompiledBranches {
        &self.branches
    }
}

impl Node for IfElseNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::IfElse.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let label = self.branches.evaluate(&Scope::from_state(state))?.to_string();
            tracing::debug!(node_id = %self.id, route = %label, "branch selected");
            Ok(NodeOutput::routed(json!({ "output": label }), label))
        })
    }
}
