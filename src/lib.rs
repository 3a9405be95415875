//! # Nagare - Workflow Interpreter
//!
//! **Nagare** executes node-based conversational workflows: a directed graph of
//! typed steps (LLM calls, retrieval, HTTP calls, branching, variable updates,
//! templated output) run once per conversation turn against a shared
//! [`WorkflowState`](state::WorkflowState).
//!
//! ## Core Pieces
//!
//! 1.  **Variables**: [`VariableSelector`](variable::VariableSelector) names a value
//!     (`sys.message`, `conv.count`, `llm.output`), and
//!     [`VariablePool`](variable::VariablePool) reads and writes them. Only `conv.*` is writable.
//! 2.  **Expressions and templates**: a sandboxed expression language (no calls, no
//!     imports) evaluated by tree-walking, and `{{ }}` templates rendered in strict or
//!     lenient mode.
//! 3.  **Branching**: if/else cases compile straight into expression trees with an
//!     always-true fallback, so every run picks exactly one `CASE{n}` label.
//! 4.  **Assignment**: type-checked operators over conversation variables, dispatched on
//!     the type of the value currently stored.
//! 5.  **Nodes and execution**: a [`NodeFactory`](nodes::NodeFactory) builds nodes from
//!     JSON config, and a [`WorkflowExecutor`](executor::WorkflowExecutor) runs them in
//!     dependency order, following branch routes and streaming text to the caller
//!     without repeating it at the end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = json!({
//!     "nodes": [
//!         { "id": "start", "type": "start" },
//!         { "id": "greet", "type": "jinja-render", "template": "Hello {{ sys.message }}!" },
//!         { "id": "end", "type": "end", "output": "{{ greet.output }}" }
//!     ],
//!     "edges": [
//!         { "source": "start", "target": "greet" },
//!         { "source": "greet", "target": "end" }
//!     ]
//! });
//!
//! let executor = WorkflowExecutor::from_json_str(
//!     &workflow.to_string(),
//!     &NodeFactory::with_defaults(),
//!     &Services::new(),
//!     EngineConfig::default(),
//! )?;
//!
//! let mut state = WorkflowState::new(SystemVariables::new("World"), Default::default());
//! let result = executor.run(&mut state).await?;
//! assert_eq!(result.output, json!("Hello World!"));
//! # Ok(())
//! # }
//! ```

pub mod assigner;
pub mod ast;
pub mod branch;
pub mod config;
pub mod error;
pub mod executor;
pub mod expression;
pub mod graph;
pub mod nodes;
pub mod prelude;
pub mod services;
pub mod state;
pub mod streaming;
pub mod template;
pub mod variable;
