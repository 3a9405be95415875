//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the nagare crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//!
//! # fn run_example() -> Result<(), Box<dyn std::error::Error>> {
//! let definition = WorkflowDefinition::from_file("path/to/workflow.json")?;
//! let config = EngineConfig::default().with_node_timeout(30);
//! let executor = WorkflowExecutor::build(
//!     definition,
//!     &NodeFactory::with_defaults(),
//!     &Services::new(),
//!     config,
//! )?;
//! println!("{} nodes", executor.graph().nodes().len());
//! # Ok(())
//! # }
//! ```

// Execution
pub use crate::config::EngineConfig;
pub use crate::executor::{ExecutionResult, NodeRecord, NodeStatus, WorkflowExecutor};
pub use crate::graph::{EdgeDefinition, WorkflowDefinition, WorkflowGraph};

// Nodes
pub use crate::nodes::{BuildContext, Node, NodeConfig, NodeFactory, NodeOutput, NodeType};
pub use crate::services::Services;

// State and variables
pub use crate::state::{StreamChunk, SystemVariables, WorkflowState};
pub use crate::variable::{VariablePool, VariableSelector};

// Evaluation
pub use crate::assigner::{AssignmentItem, AssignmentOperation};
pub use crate::ast::{Expression, ValueKind};
pub use crate::branch::{CaseDefinition, CompiledBranches, Condition, LogicalOperator};
pub use crate::expression::{ExpressionEvaluator, Scope};
pub use crate::template::{RenderMode, TemplateRenderer};

// Error types
pub use crate::error::{
    ConfigError, EvaluationError, OperatorTypeError, SelectorError, UpstreamToolError, WorkflowError,
};
