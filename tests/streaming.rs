//! Tests for reconciling a terminal template with streamed output.
mod common;
use common::*;
use nagare::prelude::*;
use nagare::streaming::{TemplatePart, find_anchor, prefix_for, reconcile, split_template};
use serde_json::json;

fn preds(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_suffix_after_streamed_predecessor() {
    let state = state_with_outputs(
        json!({}),
        json!({ "start": { "a": "A" }, "llm": { "output": "streamed text" } }),
    );
    let scope = Scope::from_state(&state);
    let template = "{{start.a}}X {{llm.output}} Y";

    let result = reconcile(template, &preds(&["llm"]), &scope, RenderMode::Lenient).unwrap();
    assert_eq!(result.anchor.as_deref(), Some("llm"));
    assert_eq!(result.prefix, "AX ");
    assert_eq!(result.suffix, " Y");
    assert_eq!(result.full, format!("{}{}{}", result.prefix, "streamed text", result.suffix));
}

#[test]
fn test_no_anchor_without_streaming_predecessor() {
    let state = state_with_outputs(json!({}), json!({ "llm": { "output": "x" } }));
    let scope = Scope::from_state(&state);
    let result = reconcile("Answer: {{ llm.output }}", &preds(&["other"]), &scope, RenderMode::Lenient).unwrap();
    assert_eq!(result.anchor, None);
    assert_eq!(result.prefix, "");
    assert_eq!(result.suffix, "Answer: x");
    assert_eq!(result.full, "Answer: x");
}

#[test]
fn test_first_predecessor_reference_is_the_anchor() {
    let state = state_with_outputs(
        json!({}),
        json!({ "a": { "output": "1" }, "b": { "output": "2" } }),
    );
    let scope = Scope::from_state(&state);
    let result = reconcile(
        "<{{ node.b.output }}|{{ a.output }}>",
        &preds(&["a", "b"]),
        &scope,
        RenderMode::Strict,
    )
    .unwrap();
    assert_eq!(result.anchor.as_deref(), Some("b"));
    assert_eq!(result.prefix, "<");
    assert_eq!(result.suffix, "|1>");
}

#[test]
fn test_split_template_parts() {
    let parts = split_template("Hi {{ sys.message }}, {{ llm.output }}!");
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0], TemplatePart::Static("Hi ".into()));
    assert_eq!(parts[1].node_id(), None);
    assert_eq!(parts[3].node_id(), Some("llm"));
    assert_eq!(parts[3].raw(), "{{ llm.output }}");
    assert_eq!(parts[4].raw(), "!");

    // Only plain references identify a node.
    let parts = split_template("{{ llm.output | upper }}{{ conv.x }}{{ nodes.kb.text }}");
    assert_eq!(parts[0].node_id(), None);
    assert_eq!(parts[1].node_id(), None);
    assert_eq!(parts[2].node_id(), Some("kb"));
    assert_eq!(find_anchor(&parts, &["kb"]), Some(2));
    assert_eq!(find_anchor(&parts, &["llm"]), None);
}

#[test]
fn test_prefix_only_for_the_anchor() {
    let state = state_with_outputs(json!({ "who": "Ada" }), json!({ "llm": { "output": "" } }));
    let scope = Scope::from_state(&state);
    let template = "Dear {{ conv.who }}, {{ llm.output }}";
    let predecessors = preds(&["llm", "start"]);
    assert_eq!(
        prefix_for(template, &predecessors, "llm", &scope, RenderMode::Lenient).unwrap(),
        Some("Dear Ada, ".to_string())
    );
    assert_eq!(
        prefix_for(template, &predecessors, "start", &scope, RenderMode::Lenient).unwrap(),
        None
    );
}

#[test]
fn test_reference_inside_block_is_not_an_anchor() {
    let state = state_with_outputs(json!({}), json!({ "llm": { "output": "streamed" } }));
    let scope = Scope::from_state(&state);
    let template = "{% if sys.message %}Q: {{ llm.output }}{% endif %} done";
    let predecessors = preds(&["llm"]);

    let result = reconcile(template, &predecessors, &scope, RenderMode::Strict).unwrap();
    assert_eq!(result.anchor, None);
    assert_eq!(result.full, "Q: streamed done");
    assert_eq!(result.suffix, result.full);
    assert_eq!(
        prefix_for(template, &predecessors, "llm", &scope, RenderMode::Strict).unwrap(),
        None
    );

    let parts = split_template(template);
    assert_eq!(parts[0], TemplatePart::Static("{% if sys.message %}Q: ".into()));
    assert!(parts[1].in_block());
    assert_eq!(parts[2].raw(), "{% endif %} done");
}

#[test]
fn test_anchor_after_closed_block() {
    let state = state_with_outputs(
        json!({ "items": ["a", "b"] }),
        json!({ "llm": { "output": "streamed" } }),
    );
    let scope = Scope::from_state(&state);
    let template = "{% for i in conv.items %}{{ i }},{% endfor %} {{ llm.output }}{# note #} end";
    let predecessors = preds(&["llm"]);

    let result = reconcile(template, &predecessors, &scope, RenderMode::Strict).unwrap();
    assert_eq!(result.anchor.as_deref(), Some("llm"));
    assert_eq!(result.prefix, "a,b, ");
    assert_eq!(result.suffix, " end");
    assert_eq!(result.full, format!("{}streamed{}", result.prefix, result.suffix));
    assert_eq!(
        prefix_for(template, &predecessors, "llm", &scope, RenderMode::Strict).unwrap(),
        Some("a,b, ".to_string())
    );
}

#[test]
fn test_set_without_block_keeps_depth() {
    let parts = split_template("{% set x = 1 %}{{ llm.output }}{% set y %}v{% endset %}{{ llm.text }}");
    assert!(!parts[1].in_block());
    assert!(!parts[3].in_block());
    assert_eq!(find_anchor(&parts, &["llm"]), Some(1));
}
