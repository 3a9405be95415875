//! Text templates with `{{ expr }}` placeholders, rendered with minijinja.

use crate::error::EvaluationError;
use crate::expression::Scope;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// How undefined lookups behave during rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Undefined access is an error.
    Strict,
    /// Undefined access renders as nothing, including chained attribute access.
    #[default]
    Lenient,
}

impl RenderMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict { RenderMode::Strict } else { RenderMode::Lenient }
    }
}

static SHARED: LazyLock<TemplateRenderer> = LazyLock::new(TemplateRenderer::new);

/// Renders templates against the run's namespaces.
pub struct TemplateRenderer {
    strict: Environment<'static>,
    lenient: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            strict: environment(UndefinedBehavior::Strict),
            lenient: environment(UndefinedBehavior::Chainable),
        }
    }

    /// A process-wide renderer. Environments hold no run data, so sharing is safe.
    pub fn shared() -> &'static TemplateRenderer {
        &SHARED
    }

    /// Renders `template`.
    ///
    /// `variables` are the conversation variables; a `sys` object among them
    /// is merged into the system namespace.
    pub fn render(
        &self,
        template: &str,
        variables: &Map<String, Value>,
        node_outputs: &ahash::AHashMap<String, Value>,
        system: &Map<String, Value>,
        mode: RenderMode,
    ) -> Result<String, EvaluationError> {
        let context = build_context(variables, node_outputs, system);
        let env = match mode {
            RenderMode::Strict => &self.strict,
            RenderMode::Lenient => &self.lenient,
        };
        env.render_str(template, minijinja::Value::from_serialize(&context))
            .map_err(|e| map_error(template, e))
    }

    pub fn render_scope(
        &self,
        template: &str,
        scope: &Scope<'_>,
        mode: RenderMode,
    ) -> Result<String, EvaluationError> {
        self.render(
            template,
            scope.conversation(),
            scope.nodes(),
            scope.system(),
            mode,
        )
    }

    /// Syntax-only check. Returns the problems found; empty means valid.
    pub fn validate(template: &str) -> Vec<String> {
        let env = Environment::new();
        match env.template_from_str(template) {
            Ok(_) => Vec::new(),
            Err(e) => vec![e.to_string()],
        }
    }
}

fn environment(undefined: UndefinedBehavior) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(undefined);
    env.set_keep_trailing_newline(true);
    env
}

fn build_context(
    variables: &Map<String, Value>,
    node_outputs: &ahash::AHashMap<String, Value>,
    system: &Map<String, Value>,
) -> Map<String, Value> {
    let mut sys = system.clone();
    if let Some(Value::Object(extra)) = variables.get("sys") {
        sys.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    let nodes: Map<String, Value> = node_outputs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    // Unqualified access: node outputs first, conversation variables override.
    let mut context = nodes.clone();
    context.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));

    context.insert("conv".into(), Value::Object(variables.clone()));
    context.insert("var".into(), Value::Object(variables.clone()));
    context.insert("node".into(), Value::Object(nodes.clone()));
    context.insert("nodes".into(), Value::Object(nodes));
    context.insert("sys".into(), Value::Object(sys));
    context
}

fn map_error(template: &str, e: minijinja::Error) -> EvaluationError {
    match e.kind() {
        ErrorKind::UndefinedError => EvaluationError::UndefinedVariable(
            e.detail().map(str::to_string).unwrap_or_else(|| e.to_string()),
        ),
        ErrorKind::SyntaxError => EvaluationError::InvalidExpression {
            expression: template.to_string(),
            message: e.to_string(),
        },
        _ => EvaluationError::Render(e.to_string()),
    }
}
