//! Workflow definitions and their validated graph form.

use crate::error::ConfigError;
use crate::nodes::{NodeConfig, NodeType};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

/// A directed connection. `source_handle` names the routing label that
/// selects this edge when the source is a branching node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl EdgeDefinition {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// A workflow as authored: nodes plus edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl WorkflowDefinition {
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
}

/// A validated workflow: unique ids, known edge endpoints, one start node
/// and no cycles.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: Vec<NodeConfig>,
    edges: Vec<EdgeDefinition>,
    index: AHashMap<String, usize>,
    incoming: AHashMap<String, Vec<usize>>,
    outgoing: AHashMap<String, Vec<usize>>,
    start: String,
    order: Vec<String>,
}

impl WorkflowGraph {
    pub fn build(definition: WorkflowDefinition) -> Result<Self, ConfigError> {
        let WorkflowDefinition { nodes, edges } = definition;

        let mut index = AHashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateNode(node.id.clone()));
            }
        }

        let mut incoming: AHashMap<String, Vec<usize>> = AHashMap::new();
        let mut outgoing: AHashMap<String, Vec<usize>> = AHashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            for (endpoint, other) in [(&edge.source, &edge.target), (&edge.target, &edge.source)] {
                if !index.contains_key(endpoint) {
                    return Err(ConfigError::NodeNotFound {
                        missing_node_id: endpoint.clone(),
                        source_node_id: other.clone(),
                    });
                }
            }
            outgoing.entry(edge.source.clone()).or_default().push(i);
            incoming.entry(edge.target.clone()).or_default().push(i);
        }

        let starts: Vec<String> = nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Start.as_str())
            .map(|n| n.id.clone())
            .collect();
        let start = match starts.as_slice() {
            [] => return Err(ConfigError::MissingStartNode),
            [only] => only.clone(),
            _ => return Err(ConfigError::MultipleStartNodes(starts)),
        };

        let mut graph = Self {
            nodes,
            edges,
            index,
            incoming,
            outgoing,
            start,
            order: Vec::new(),
        };
        graph.order = graph.topological_sort()?;
        Ok(graph)
    }

    /// Kahn's algorithm, keeping declaration order among ready nodes.
    fn topological_sort(&self) -> Result<Vec<String>, ConfigError> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.incoming.get(&n.id).map_or(0, Vec::len))
            .collect();
        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_front() {
            let id = &self.nodes[i].id;
            order.push(id.clone());
            for &edge in self.outgoing.get(id).map(Vec::as_slice).unwrap_or_default() {
                let Some(&target) = self.index.get(&self.edges[edge].target) else {
                    continue;
                };
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push_back(target);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = in_degree
                .iter()
                .position(|d| *d > 0)
                .map(|i| self.nodes[i].id.clone())
                .unwrap_or_default();
            return Err(ConfigError::CycleDetected(stuck));
        }
        Ok(order)
    }

    pub fn start_id(&self) -> &str {
        &self.start
    }

    pub fn nodes(&self) -> &[NodeConfig] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn edges(&self) -> &[EdgeDefinition] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> &EdgeDefinition {
        &self.edges[index]
    }

    /// Indices of the edges entering `id`.
    pub fn incoming_edges(&self, id: &str) -> &[usize] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Indices of the edges leaving `id`.
    pub fn outgoing_edges(&self, id: &str) -> &[usize] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Direct predecessors of `id`, without duplicates.
    pub fn predecessors(&self, id: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for &edge in self.incoming_edges(id) {
            let source = &self.edges[edge].source;
            if !ids.contains(source) {
                ids.push(source.clone());
            }
        }
        ids
    }

    /// Direct successors of `id`, without duplicates.
    pub fn successors(&self, id: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for &edge in self.outgoing_edges(id) {
            let target = &self.edges[edge].target;
            if !ids.contains(target) {
                ids.push(target.clone());
            }
        }
        ids
    }

    /// Node ids such that every edge goes from an earlier to a later id.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }
}
