use super::selector::VariableSelector;
use crate::error::SelectorError;
use crate::state::WorkflowState;
use ahash::AHashMap;
use serde_json::{Map, Value};

/// Read/write access to a run's variables.
///
/// The pool holds no data of its own; every call goes to the live state,
/// so two pools over the same state see each other's writes. Only the
/// `conv` namespace is writable.
pub struct VariablePool<'a> {
    state: &'a mut WorkflowState,
}

impl<'a> VariablePool<'a> {
    pub fn new(state: &'a mut WorkflowState) -> Self {
        Self { state }
    }

    /// Reads a variable. Missing `sys`/`conv` keys read as `null`; missing
    /// node paths are an error.
    pub fn get(&self, selector: &VariableSelector) -> Result<Value, SelectorError> {
        self.resolve(selector, None)
    }

    /// Like [`get`](Self::get), but a missing node path yields `default`.
    pub fn get_or(&self, selector: &VariableSelector, default: Value) -> Result<Value, SelectorError> {
        self.resolve(selector, Some(default))
    }

    pub fn has(&self, selector: &VariableSelector) -> bool {
        match selector.namespace() {
            "sys" | "conv" => {
                let map = self.namespace_map(selector);
                match selector.key() {
                    None => true,
                    Some(key) => walk(map.get(key), &selector.rest()[1..]).is_some(),
                }
            }
            node_id => walk(self.state.runtime_vars.get(node_id), selector.rest()).is_some(),
        }
    }

    /// Writes a conversation variable. Any other namespace, or a selector
    /// that is not exactly `conv.<key>`, is rejected.
    pub fn set(&mut self, selector: &VariableSelector, value: Value) -> Result<(), SelectorError> {
        if !selector.is_conversation() {
            return Err(SelectorError::InvalidWrite {
                selector: selector.to_string(),
                reason: format!(
                    "namespace '{}' is read-only; only 'conv' may be written",
                    selector.namespace()
                ),
            });
        }
        let key = match selector.path() {
            [_, key] => key,
            [_] => {
                return Err(SelectorError::InvalidWrite {
                    selector: selector.to_string(),
                    reason: "a variable key is required".to_string(),
                });
            }
            _ => {
                return Err(SelectorError::InvalidWrite {
                    selector: selector.to_string(),
                    reason: "nested writes are not supported".to_string(),
                });
            }
        };
        tracing::trace!(selector = %selector, "conversation variable written");
        self.state.variables.conv.insert(key.clone(), value);
        Ok(())
    }

    pub fn get_all_system_vars(&self) -> &Map<String, Value> {
        &self.state.variables.sys
    }

    pub fn get_all_conversation_vars(&self) -> &Map<String, Value> {
        &self.state.variables.conv
    }

    pub fn get_all_node_outputs(&self) -> &AHashMap<String, Value> {
        &self.state.runtime_vars
    }

    pub fn get_node_output(&self, node_id: &str) -> Option<&Value> {
        self.state.runtime_vars.get(node_id)
    }

    /// The state this pool reads from.
    pub fn state(&self) -> &WorkflowState {
        self.state
    }

    fn namespace_map(&self, selector: &VariableSelector) -> &Map<String, Value> {
        if selector.is_system() {
            &self.state.variables.sys
        } else {
            &self.state.variables.conv
        }
    }

    fn resolve(&self, selector: &VariableSelector, default: Option<Value>) -> Result<Value, SelectorError> {
        match selector.namespace() {
            "sys" | "conv" => {
                let map = self.namespace_map(selector);
                let Some(key) = selector.key() else {
                    return Ok(Value::Object(map.clone()));
                };
                match walk(map.get(key), &selector.rest()[1..]) {
                    Some(value) => Ok(value.clone()),
                    None => Ok(default.unwrap_or(Value::Null)),
                }
            }
            node_id => match walk(self.state.runtime_vars.get(node_id), selector.rest()) {
                Some(value) => Ok(value.clone()),
                None => default.ok_or_else(|| SelectorError::NotFound(selector.to_string())),
            },
        }
    }
}

/// Follows `segments` through nested objects (and arrays, by numeric segment).
fn walk<'v>(start: Option<&'v Value>, segments: &[String]) -> Option<&'v Value> {
    segments.iter().try_fold(start?, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
