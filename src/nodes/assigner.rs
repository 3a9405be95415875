use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::assigner::AssignmentItem;
use crate::error::{ConfigError, WorkflowError};
use crate::state::WorkflowState;
use crate::variable::VariablePool;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct AssignerPayload {
    #[serde(default)]
    assignments: Vec<AssignmentItem>,
}

/// Applies its assignments to conversation variables, in order.
pub struct AssignerNode {
    id: String,
    assignments: Vec<AssignmentItem>,
}

impl AssignerNode {
    pub fn from_config(config: &NodeConfig, _ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: AssignerPayload = config.payload()?;
        for item in &payload.assignments {
            let selector = &item.variable_selector;
            if !selector.is_conversation() || selector.path().len() != 2 {
                return Err(config.invalid(format!(
                    "assignment target '{}' is not a conversation variable",
                    selector
                )));
            }
        }
        Ok(Self {
            id: config.id.clone(),
            assignments: payload.assignments,
        })
    }
}

impl Node for AssignerNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::Assigner.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let mut pool = VariablePool::new(state);
            let mut updated = Map::new();
            for item in &self.assignments {
                let value = item.apply(&mut pool)?;
                tracing::debug!(
                    node_id = %self.id,
                    selector = %item.variable_selector,
                    operation = %item.operation,
                    "variable assigned"
                );
                updated.insert(item.variable_selector.to_string(), value);
            }
            Ok(NodeOutput::new(Value::Object(updated)))
        })
    }
}
