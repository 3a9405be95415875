use super::{BuildContext, Node, NodeConfig, NodeOutput, NodeType};
use crate::error::{ConfigError, WorkflowError};
use crate::state::WorkflowState;
use crate::variable::{VariablePool, VariableSelector};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Deserialize)]
struct AggregatorPayload {
    #[serde(default)]
    group: bool,
    #[serde(default)]
    group_names: Vec<String>,
    #[serde(default)]
    group_variables: Value,
}

/// Picks the first non-null value among candidate variables, typically the
/// outputs of mutually exclusive branches.
pub struct VariableAggregatorNode {
    id: String,
    /// `None` when ungrouped.
    group_names: Option<Vec<String>>,
    groups: Vec<Vec<VariableSelector>>,
}

impl VariableAggregatorNode {
    pub fn from_config(config: &NodeConfig, _ctx: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let payload: AggregatorPayload = config.payload()?;
        let raw = if payload.group_variables.is_null() {
            Value::Array(Vec::new())
        } else {
            payload.group_variables
        };

        if !payload.group {
            let selectors: Vec<VariableSelector> =
                serde_json::from_value(raw).map_err(|e| config.invalid(e.to_string()))?;
            return Ok(Self {
                id: config.id.clone(),
                group_names: None,
                groups: vec![selectors],
            });
        }

        let groups: Vec<Vec<VariableSelector>> =
            serde_json::from_value(raw).map_err(|e| config.invalid(e.to_string()))?;
        if groups.len() != payload.group_names.len() {
            return Err(config.invalid(format!(
                "{} group names for {} variable groups",
                payload.group_names.len(),
                groups.len()
            )));
        }
        Ok(Self {
            id: config.id.clone(),
            group_names: Some(payload.group_names),
            groups,
        })
    }

    fn first_present(pool: &VariablePool<'_>, selectors: &[VariableSelector]) -> Result<Value, WorkflowError> {
        for selector in selectors {
            let value = pool.get_or(selector, Value::Null)?;
            if !value.is_null() {
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }
}

impl Node for VariableAggregatorNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        NodeType::VariableAggregator.as_str()
    }

    fn execute<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<NodeOutput, WorkflowError>> {
        Box::pin(async move {
            let pool = VariablePool::new(state);
            let output = match &self.group_names {
                None => {
                    let selectors = self.groups.first().map(Vec::as_slice).unwrap_or_default();
                    json!({ "output": Self::first_present(&pool, selectors)? })
                }
                Some(names) => {
                    let mut grouped = Map::new();
                    for (name, selectors) in names.iter().zip(&self.groups) {
                        grouped.insert(name.clone(), Self::first_present(&pool, selectors)?);
                    }
                    Value::Object(grouped)
                }
            };
            Ok(NodeOutput::new(output))
        })
    }
}
