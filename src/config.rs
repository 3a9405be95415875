use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_STEPS: usize = 256;

/// Engine-wide settings shared by every node of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-node execution timeout. `None` disables it.
    pub node_timeout_secs: Option<u64>,
    /// Upper bound on node executions in one run.
    pub max_steps: usize,
    /// Render the end node's template in strict mode.
    pub strict_end_templates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: None,
            max_steps: DEFAULT_MAX_STEPS,
            strict_end_templates: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::JsonParseError(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::JsonParseError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_node_timeout(mut self, timeout_secs: u64) -> Self {
        self.node_timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_strict_end_templates(mut self, strict: bool) -> Self {
        self.strict_end_templates = strict;
        self
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}
