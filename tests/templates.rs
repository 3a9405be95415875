//! Tests for template rendering.
mod common;
use common::*;
use nagare::prelude::*;
use serde_json::json;

fn render(template: &str, state: &WorkflowState, mode: RenderMode) -> Result<String, EvaluationError> {
    TemplateRenderer::shared().render_scope(template, &Scope::from_state(state), mode)
}

#[test]
fn test_renders_conversation_variable() {
    let state = state_with("hi", json!({ "name": "World" }));
    assert_eq!(render("Hello {{var.name}}!", &state, RenderMode::Lenient).unwrap(), "Hello World!");
    assert_eq!(render("Hello {{ conv.name }}!", &state, RenderMode::Strict).unwrap(), "Hello World!");
    assert_eq!(render("Hello {{ name }}!", &state, RenderMode::Lenient).unwrap(), "Hello World!");
}

#[test]
fn test_missing_variable_depends_on_mode() {
    let state = state_with("hi", json!({}));
    assert!(render("Hello {{var.name}}!", &state, RenderMode::Strict).is_err());
    assert_eq!(render("Hello {{var.name}}!", &state, RenderMode::Lenient).unwrap(), "Hello !");
    assert_eq!(
        render("[{{ ghost.output.text }}]", &state, RenderMode::Lenient).unwrap(),
        "[]"
    );
}

#[test]
fn test_node_outputs_and_system_variables() {
    let state = state_with_outputs(
        json!({}),
        json!({ "llm": { "output": "generated" }, "search": { "output": [{ "content": "doc" }] } }),
    );
    let template = "{{ sys.message }}: {{ llm.output }} / {{ node.llm.output }} / {{ nodes.search.output[0].content }}";
    assert_eq!(
        render(template, &state, RenderMode::Strict).unwrap(),
        "hello: generated / generated / doc"
    );
}

#[test]
fn test_conversation_variables_override_node_ids_at_top_level() {
    let state = state_with_outputs(json!({ "llm": "from conv" }), json!({ "llm": { "output": "x" } }));
    assert_eq!(render("{{ llm }}", &state, RenderMode::Strict).unwrap(), "from conv");
    assert_eq!(render("{{ node.llm.output }}", &state, RenderMode::Strict).unwrap(), "x");
}

#[test]
fn test_sys_object_in_variables_is_merged() {
    let renderer = TemplateRenderer::new();
    let variables = object(json!({ "sys": { "locale": "ja" } }));
    let system = object(json!({ "message": "hi" }));
    let rendered = renderer
        .render(
            "{{ sys.message }}/{{ sys.locale }}",
            &variables,
            &Default::default(),
            &system,
            RenderMode::Strict,
        )
        .unwrap();
    assert_eq!(rendered, "hi/ja");
}

#[test]
fn test_control_flow_and_trailing_newline() {
    let state = state_with("hi", json!({ "items": ["a", "b"] }));
    let template = "{% for item in conv.items %}{{ item }};{% endfor %}\n";
    assert_eq!(render(template, &state, RenderMode::Strict).unwrap(), "a;b;\n");
}

#[test]
fn test_syntax_errors() {
    let state = state_with("hi", json!({}));
    assert!(matches!(
        render("{{ unclosed", &state, RenderMode::Lenient),
        Err(EvaluationError::InvalidExpression { .. })
    ));
    assert!(!TemplateRenderer::validate("{% if %}").is_empty());
    assert!(TemplateRenderer::validate("Hello {{ name }}").is_empty());
}

#[test]
fn test_render_mode_from_flag() {
    assert_eq!(RenderMode::from_strict(true), RenderMode::Strict);
    assert_eq!(RenderMode::from_strict(false), RenderMode::Lenient);
    assert_eq!(RenderMode::default(), RenderMode::Lenient);
}
