//! Runs a workflow graph against one [`WorkflowState`].

use crate::config::EngineConfig;
use crate::error::{ConfigError, WorkflowError};
use crate::graph::{WorkflowDefinition, WorkflowGraph};
use crate::nodes::{BuildContext, Node, NodeFactory, NodeType};
use crate::services::Services;
use crate::state::WorkflowState;
use ahash::AHashMap;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeStatus {
    Taken,
    Skipped,
}

/// How a node ended up in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    /// Every incoming edge was skipped.
    Skipped,
    /// A `condition` node that only forwarded its edges.
    Forwarded,
}

/// One entry per node, in the order nodes were visited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub node_type: String,
    pub status: NodeStatus,
    pub route: Option<String>,
    pub elapsed_ms: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub records: Vec<NodeRecord>,
    /// The `output` field of the last end node that ran, or null.
    pub output: Value,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn executed(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| r.status == NodeStatus::Succeeded)
            .map(|r| r.node_id.as_str())
    }
}

/// A built workflow, ready to run any number of times.
///
/// Nodes run one at a time in dependency order. An edge is taken when its
/// source ran and either produced no route or produced the route the edge's
/// `source_handle` names; other edges are skipped. A node runs when at least
/// one incoming edge was taken and is skipped otherwise, which propagates.
pub struct WorkflowExecutor {
    graph: WorkflowGraph,
    nodes: AHashMap<String, Box<dyn Node>>,
    config: EngineConfig,
}

impl WorkflowExecutor {
    pub fn build(
        definition: WorkflowDefinition,
        factory: &NodeFactory,
        services: &Services,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let graph = WorkflowGraph::build(definition)?;
        let mut nodes = AHashMap::with_capacity(graph.nodes().len());
        for node_config in graph.nodes() {
            let predecessors = graph.predecessors(&node_config.id);
            let ctx = BuildContext {
                services,
                config: &config,
                predecessors: &predecessors,
            };
            if let Some(node) = factory.create(node_config, &ctx)? {
                nodes.insert(node_config.id.clone(), node);
            }
        }
        info!(nodes = nodes.len(), edges = graph.edges().len(), "workflow built");
        Ok(Self {
            graph,
            nodes,
            config,
        })
    }

    pub fn from_json_str(
        json: &str,
        factory: &NodeFactory,
        services: &Services,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        Self::build(WorkflowDefinition::from_json_str(json)?, factory, services, config)
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn node(&self, id: &str) -> Option<&dyn Node> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the workflow. On failure the state keeps every change made
    /// before the failing node.
    pub async fn run(&self, state: &mut WorkflowState) -> Result<ExecutionResult, WorkflowError> {
        let started = Instant::now();
        let mut edges: Vec<Option<EdgeStatus>> = vec![None; self.graph.edges().len()];
        let mut records = Vec::new();
        let mut output = Value::Null;
        let mut steps = 0usize;

        for id in self.graph.topological_order() {
            let incoming = self.graph.incoming_edges(id);
            let reachable = id == self.graph.start_id()
                || incoming
                    .iter()
                    .any(|&e| edges[e] == Some(EdgeStatus::Taken));
            let node_type = self
                .graph
                .node(id)
                .map(|c| c.node_type.clone())
                .unwrap_or_default();

            if !reachable {
                debug!(node_id = %id, "node skipped");
                self.decide_outgoing(id, None, false, &mut edges);
                records.push(NodeRecord {
                    node_id: id.clone(),
                    node_type,
                    status: NodeStatus::Skipped,
                    route: None,
                    elapsed_ms: 0,
                });
                continue;
            }

            let Some(node) = self.nodes.get(id) else {
                // Condition nodes are routed here rather than run.
                debug!(node_id = %id, "forwarding condition node");
                self.decide_outgoing(id, None, true, &mut edges);
                records.push(NodeRecord {
                    node_id: id.clone(),
                    node_type,
                    status: NodeStatus::Forwarded,
                    route: None,
                    elapsed_ms: 0,
                });
                continue;
            };

            steps += 1;
            if steps > self.config.max_steps {
                error!(node_id = %id, max_steps = self.config.max_steps, "step limit exceeded");
                return Err(WorkflowError::StepLimitExceeded(self.config.max_steps));
            }

            if node.streams() {
                self.emit_stream_prefixes(id, state)?;
            }

            info!(node_id = %id, node_type = %node.node_type(), "executing node");
            let node_started = Instant::now();
            let result = self.execute_node(node.as_ref(), state).await.map_err(|e| {
                error!(node_id = %id, error = %e, "node failed");
                match e {
                    timeout @ WorkflowError::NodeTimeout { .. } => timeout,
                    other => WorkflowError::NodeFailed {
                        node_id: id.clone(),
                        source: Box::new(other),
                    },
                }
            })?;
            let elapsed_ms = node_started.elapsed().as_millis() as u64;
            debug!(node_id = %id, elapsed_ms, route = ?result.route, "node complete");

            if node.node_type() == NodeType::End.as_str() {
                output = result.output.get("output").cloned().unwrap_or(Value::Null);
            }
            state.runtime_vars.insert(id.clone(), result.output);
            self.decide_outgoing(id, result.route.as_deref(), true, &mut edges);
            records.push(NodeRecord {
                node_id: id.clone(),
                node_type: node.node_type().to_string(),
                status: NodeStatus::Succeeded,
                route: result.route,
                elapsed_ms,
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(elapsed_ms, steps, errors = state.errors.len(), "workflow finished");
        Ok(ExecutionResult {
            records,
            output,
            elapsed_ms,
        })
    }

    async fn execute_node(
        &self,
        node: &dyn Node,
        state: &mut WorkflowState,
    ) -> Result<crate::nodes::NodeOutput, WorkflowError> {
        match self.config.node_timeout() {
            Some(limit) => tokio::time::timeout(limit, node.execute(state))
                .await
                .map_err(|_| WorkflowError::NodeTimeout {
                    node_id: node.id().to_string(),
                    timeout_secs: limit.as_secs(),
                })?,
            None => node.execute(state).await,
        }
    }

    /// Lets successors that embed `upstream`'s stream surface their leading text first.
    fn emit_stream_prefixes(&self, upstream: &str, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        for successor in self.graph.successors(upstream) {
            let Some(node) = self.nodes.get(&successor) else {
                continue;
            };
            if let Some(prefix) = node.stream_prefix(upstream, state)? {
                debug!(node_id = %successor, upstream = %upstream, "emitting stream prefix");
                state.emit(&successor, prefix);
            }
        }
        Ok(())
    }

    fn decide_outgoing(&self, id: &str, route: Option<&str>, ran: bool, edges: &mut [Option<EdgeStatus>]) {
        for &e in self.graph.outgoing_edges(id) {
            let edge = self.graph.edge(e);
            let taken = ran
                && match route {
                    None => true,
                    Some(route) => edge.source_handle.as_deref() == Some(route),
                };
            edges[e] = Some(if taken { EdgeStatus::Taken } else { EdgeStatus::Skipped });
        }
    }
}
