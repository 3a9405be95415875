//! End-to-end tests for running workflows.
mod common;
use common::*;
use nagare::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn run(executor: &WorkflowExecutor, state: &mut WorkflowState) -> Result<ExecutionResult, WorkflowError> {
    tokio_test::block_on(executor.run(state))
}

fn statuses(result: &ExecutionResult) -> Vec<(String, NodeStatus)> {
    result
        .records
        .iter()
        .map(|r| (r.node_id.clone(), r.status))
        .collect()
}

fn branching_workflow() -> Value {
    json!({
        "nodes": [
            { "id": "start", "type": "start" },
            {
                "id": "branch",
                "type": "if-else",
                "cases": [{ "conditions": [{ "left": "conv.is_vip", "comparison_operator": "is", "right": true }] }]
            },
            { "id": "vip", "type": "jinja-render", "template": "Welcome back, {{ conv.name }}" },
            { "id": "regular", "type": "jinja-render", "template": "Hello" },
            { "id": "after_regular", "type": "jinja-render", "template": "{{ regular.output }}!" },
            { "id": "end", "type": "end", "output": "{{ vip.output }}{{ after_regular.output }}" }
        ],
        "edges": [
            { "source": "start", "target": "branch" },
            { "source": "branch", "target": "vip", "source_handle": "CASE1" },
            { "source": "branch", "target": "regular", "source_handle": "CASE2" },
            { "source": "regular", "target": "after_regular" },
            { "source": "vip", "target": "end" },
            { "source": "after_regular", "target": "end" }
        ]
    })
}

#[test]
fn test_linear_workflow() {
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "greet", "type": "jinja-render", "template": "Hello {{ sys.message }}!" },
                { "id": "end", "type": "end", "output": "{{ greet.output }}" }
            ],
            "edges": [
                { "source": "start", "target": "greet" },
                { "source": "greet", "target": "end" }
            ]
        }),
        &Services::new(),
    );
    let mut state = state_with("World", json!({}));
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("Hello World!"));
    assert_eq!(result.executed().collect::<Vec<_>>(), vec!["start", "greet", "end"]);
    assert_eq!(state.runtime_vars["greet"], json!({ "output": "Hello World!" }));
    assert_eq!(state.runtime_vars["start"]["message"], json!("World"));
}

#[test]
fn test_routing_takes_the_matching_branch_only() {
    let executor = build(branching_workflow(), &Services::new());

    let mut state = state_with("hi", json!({ "is_vip": true, "name": "Ada" }));
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("Welcome back, Ada"));
    assert_eq!(
        statuses(&result),
        vec![
            ("start".to_string(), NodeStatus::Succeeded),
            ("branch".to_string(), NodeStatus::Succeeded),
            ("vip".to_string(), NodeStatus::Succeeded),
            ("regular".to_string(), NodeStatus::Skipped),
            ("after_regular".to_string(), NodeStatus::Skipped),
            ("end".to_string(), NodeStatus::Succeeded),
        ]
    );
    assert_eq!(result.records[1].route.as_deref(), Some("CASE1"));
    assert!(!state.runtime_vars.contains_key("regular"));

    let mut state = state_with("hi", json!({ "is_vip": false }));
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("Hello!"));
    assert!(!state.runtime_vars.contains_key("vip"));
}

#[test]
fn test_condition_nodes_forward_every_edge() {
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "gate", "type": "condition" },
                { "id": "end", "type": "end", "output": "through" }
            ],
            "edges": [
                { "source": "start", "target": "gate" },
                { "source": "gate", "target": "end", "source_handle": "anything" }
            ]
        }),
        &Services::new(),
    );
    let mut state = state_with("", json!({}));
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.records[1].status, NodeStatus::Forwarded);
    assert_eq!(result.output, json!("through"));
}

#[test]
fn test_question_classifier_routes_graph() {
    let llm = Arc::new(FakeLlm::replying("refund"));
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "qc", "type": "question-classifier", "classes": [{ "name": "sales" }, { "name": "refund" }] },
                { "id": "sales", "type": "end", "output": "sales team" },
                { "id": "refund", "type": "end", "output": "refund team" }
            ],
            "edges": [
                { "source": "start", "target": "qc" },
                { "source": "qc", "target": "sales", "source_handle": "CASE1" },
                { "source": "qc", "target": "refund", "source_handle": "CASE2" }
            ]
        }),
        &llm_services(llm),
    );
    let mut state = state_with("money back please", json!({}));
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("refund team"));
    assert_eq!(result.executed().collect::<Vec<_>>(), vec!["start", "qc", "refund"]);
}

#[test]
fn test_streaming_emits_each_piece_once() {
    let llm = Arc::new(FakeLlm::streaming(&["Hel", "lo"]));
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "llm", "type": "llm", "prompt": "{{ sys.message }}", "stream": true },
                { "id": "end", "type": "end", "output": "Answer: {{ llm.output }}!" }
            ],
            "edges": [
                { "source": "start", "target": "llm" },
                { "source": "llm", "target": "end" }
            ]
        }),
        &llm_services(llm),
    );

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let mut state = state_with("hi", json!({})).with_chunk_sink(sender);
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("Answer: Hello!"));

    state.set_chunk_sink(None);
    let mut chunks = Vec::new();
    while let Ok(chunk) = receiver.try_recv() {
        chunks.push((chunk.node_id, chunk.content));
    }
    assert_eq!(
        chunks,
        vec![
            ("end".to_string(), "Answer: ".to_string()),
            ("llm".to_string(), "Hel".to_string()),
            ("llm".to_string(), "lo".to_string()),
            ("end".to_string(), "!".to_string()),
        ]
    );
    let streamed: String = chunks.iter().map(|(_, c)| c.as_str()).collect();
    assert_eq!(Value::String(streamed), result.output);
}

#[test]
fn test_non_streaming_run_emits_nothing() {
    let llm = Arc::new(FakeLlm::replying("plain"));
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "llm", "type": "llm" },
                { "id": "end", "type": "end", "output": "{{ llm.output }}" }
            ],
            "edges": [
                { "source": "start", "target": "llm" },
                { "source": "llm", "target": "end" }
            ]
        }),
        &llm_services(llm),
    );
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let mut state = state_with("hi", json!({})).with_chunk_sink(sender);
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("plain"));
    assert!(receiver.try_recv().is_err());
}

#[test]
fn test_tool_errors_do_not_abort_the_run() {
    let llm = Arc::new(FakeLlm::failing("model offline"));
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "llm", "type": "llm" },
                { "id": "end", "type": "end", "output": "[{{ llm.output }}]" }
            ],
            "edges": [
                { "source": "start", "target": "llm" },
                { "source": "llm", "target": "end" }
            ]
        }),
        &llm_services(llm),
    );
    let mut state = state_with("hi", json!({}));
    let result = run(&executor, &mut state).unwrap();
    assert_eq!(result.output, json!("[]"));
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].node_id, "llm");
}

#[test]
fn test_node_errors_abort_with_context() {
    let executor = build_with_config(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "end", "type": "end", "output": "{{ conv.missing }}" }
            ],
            "edges": [{ "source": "start", "target": "end" }]
        }),
        &Services::new(),
        EngineConfig::default().with_strict_end_templates(true),
    );
    let mut state = state_with("hi", json!({}));
    let error = run(&executor, &mut state).unwrap_err();
    assert!(matches!(&error, WorkflowError::NodeFailed { node_id, .. } if node_id == "end"));
    assert!(matches!(
        error.root_cause(),
        WorkflowError::Evaluation(EvaluationError::UndefinedVariable(_))
    ));
    // Work done before the failure is kept.
    assert!(state.runtime_vars.contains_key("start"));
}

#[test]
fn test_node_timeout() {
    let llm = Arc::new(FakeLlm::replying("late").with_delay(Duration::from_secs(3)));
    let executor = build_with_config(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "llm", "type": "llm" }
            ],
            "edges": [{ "source": "start", "target": "llm" }]
        }),
        &llm_services(llm),
        EngineConfig::default().with_node_timeout(1),
    );
    let mut state = state_with("hi", json!({}));
    assert_eq!(
        run(&executor, &mut state).unwrap_err(),
        WorkflowError::NodeTimeout {
            node_id: "llm".into(),
            timeout_secs: 1
        }
    );
}

#[test]
fn test_step_limit() {
    let executor = build_with_config(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "a", "type": "jinja-render", "template": "a" },
                { "id": "b", "type": "jinja-render", "template": "b" }
            ],
            "edges": [
                { "source": "start", "target": "a" },
                { "source": "a", "target": "b" }
            ]
        }),
        &Services::new(),
        EngineConfig::default().with_max_steps(2),
    );
    let mut state = state_with("", json!({}));
    assert_eq!(
        run(&executor, &mut state).unwrap_err(),
        WorkflowError::StepLimitExceeded(2)
    );
}

#[test]
fn test_conversation_state_carries_across_turns() {
    let executor = build(
        json!({
            "nodes": [
                { "id": "start", "type": "start" },
                {
                    "id": "count",
                    "type": "assigner",
                    "assignments": [
                        { "variable_selector": "conv.turns", "operation": "add", "value": 1 },
                        { "variable_selector": "conv.history", "operation": "append", "value": "{{ sys.message }}" }
                    ]
                },
                { "id": "end", "type": "end", "output": "turn {{ conv.turns }}" }
            ],
            "edges": [
                { "source": "start", "target": "count" },
                { "source": "count", "target": "end" }
            ]
        }),
        &Services::new(),
    );

    let mut conversation = object(json!({ "turns": 0, "history": [] }));
    for (turn, message) in ["first", "second"].into_iter().enumerate() {
        let mut state = WorkflowState::new(SystemVariables::new(message), conversation);
        let result = run(&executor, &mut state).unwrap();
        assert_eq!(result.output, json!(format!("turn {}", turn + 1)));
        conversation = state.variables.conv;
    }
    assert_eq!(conversation["history"], json!(["first", "second"]));
}
