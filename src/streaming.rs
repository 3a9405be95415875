//! Reconciliation of a terminal template with upstream streamed output.
//!
//! When the end node's template references a node that streamed its text,
//! the caller has already seen everything up to and including that
//! reference. Only the remainder is emitted at the end; the full render is
//! still the node's result.

use crate::error::EvaluationError;
use crate::expression::Scope;
use crate::template::{RenderMode, TemplateRenderer};
use regex::Regex;
use std::sync::LazyLock;

// Placeholders, block tags and comments, in that order of alternatives.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\{\{\s*(?P<expr>.*?)\s*\}\}|\{%-?\s*(?P<tag>\w+)(?P<args>.*?)-?%\}|\{#.*?#\}",
    )
    .expect("token pattern is a valid regex")
});

/// Tags that open a block closed by a matching `end*` tag.
const BLOCK_TAGS: [&str; 9] = [
    "if", "for", "macro", "call", "filter", "block", "with", "raw", "autoescape",
];

static SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*$")
        .expect("selector pattern is a valid regex")
});

/// A span of a template, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Static(String),
    Dynamic {
        /// The placeholder as written, braces included.
        raw: String,
        /// The expression between the braces.
        expression: String,
        /// The node a plain `node_id.field` reference points at.
        node_id: Option<String>,
        /// Whether the placeholder sits inside a `{% %}` block, where it may
        /// render zero or several times.
        in_block: bool,
    },
}

impl TemplatePart {
    pub fn raw(&self) -> &str {
        match self {
            TemplatePart::Static(text) => text,
            TemplatePart::Dynamic { raw, .. } => raw,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            TemplatePart::Static(_) => None,
            TemplatePart::Dynamic { node_id, .. } => node_id.as_deref(),
        }
    }

    pub fn in_block(&self) -> bool {
        matches!(self, TemplatePart::Dynamic { in_block: true, .. })
    }
}

/// Splits a template into static text and `{{ }}` placeholders. Block tags
/// and comments stay in the static text around them.
pub fn split_template(template: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;
    let mut last = 0;
    for captures in TOKEN.captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        text.push_str(&template[last..whole.start()]);
        last = whole.end();

        if let Some(inner) = captures.name("expr") {
            if !text.is_empty() {
                parts.push(TemplatePart::Static(std::mem::take(&mut text)));
            }
            let expression = inner.as_str().to_string();
            parts.push(TemplatePart::Dynamic {
                raw: whole.as_str().to_string(),
                node_id: referenced_node(&expression),
                expression,
                in_block: depth > 0,
            });
            continue;
        }

        if let Some(tag) = captures.name("tag") {
            let args = captures.name("args").map_or("", |a| a.as_str());
            depth = block_depth(depth, tag.as_str(), args);
        }
        text.push_str(whole.as_str());
    }
    text.push_str(&template[last..]);
    if !text.is_empty() {
        parts.push(TemplatePart::Static(text));
    }
    parts
}

fn block_depth(depth: usize, tag: &str, args: &str) -> usize {
    if tag.starts_with("end") {
        depth.saturating_sub(1)
    } else if BLOCK_TAGS.contains(&tag) || (tag == "set" && !args.contains('=')) {
        // `{% set x %}...{% endset %}` is a block, `{% set x = 1 %}` is not.
        depth + 1
    } else {
        depth
    }
}

/// The node id a placeholder reads from, for plain dotted references only.
/// `node.x.y` and `nodes.x.y` point at `x`.
fn referenced_node(expression: &str) -> Option<String> {
    if !SELECTOR.is_match(expression) {
        return None;
    }
    let mut segments = expression.split('.');
    let first = segments.next()?;
    match first {
        "node" | "nodes" => segments.next().map(str::to_string),
        "var" | "conv" | "sys" => None,
        _ => Some(first.to_string()),
    }
}

/// Index of the first placeholder that reads from one of `predecessors`.
/// Placeholders inside blocks are never anchors: the text around them does
/// not render on its own.
pub fn find_anchor<S: AsRef<str>>(parts: &[TemplatePart], predecessors: &[S]) -> Option<usize> {
    parts.iter().position(|part| {
        !part.in_block()
            && part
                .node_id()
                .is_some_and(|id| predecessors.iter().any(|p| p.as_ref() == id))
    })
}

/// Outcome of rendering a terminal template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The complete render: the node's canonical result.
    pub full: String,
    /// The node whose streamed output the template embeds, if any.
    pub anchor: Option<String>,
    /// Render of the parts before the anchor. Empty without an anchor.
    pub prefix: String,
    /// Render of the parts after the anchor. Without an anchor this is the
    /// full render.
    pub suffix: String,
}

/// Renders `template` and works out which part is still unseen by the caller.
pub fn reconcile<S: AsRef<str>>(
    template: &str,
    predecessors: &[S],
    scope: &Scope<'_>,
    mode: RenderMode,
) -> Result<Reconciliation, EvaluationError> {
    let renderer = TemplateRenderer::shared();
    let full = renderer.render_scope(template, scope, mode)?;
    let parts = split_template(template);

    let Some(index) = find_anchor(&parts, predecessors) else {
        return Ok(Reconciliation {
            suffix: full.clone(),
            full,
            anchor: None,
            prefix: String::new(),
        });
    };

    let prefix = renderer.render_scope(&join_raw(&parts[..index]), scope, mode)?;
    let suffix = renderer.render_scope(&join_raw(&parts[index + 1..]), scope, mode)?;
    Ok(Reconciliation {
        full,
        anchor: parts[index].node_id().map(str::to_string),
        prefix,
        suffix,
    })
}

/// The text to surface before `upstream` starts streaming. `Some` only when
/// `upstream` is the template's anchor among `predecessors`.
pub fn prefix_for<S: AsRef<str>>(
    template: &str,
    predecessors: &[S],
    upstream: &str,
    scope: &Scope<'_>,
    mode: RenderMode,
) -> Result<Option<String>, EvaluationError> {
    let parts = split_template(template);
    match find_anchor(&parts, predecessors) {
        Some(index) if parts[index].node_id() == Some(upstream) => TemplateRenderer::shared()
            .render_scope(&join_raw(&parts[..index]), scope, mode)
            .map(Some),
        _ => Ok(None),
    }
}

fn join_raw(parts: &[TemplatePart]) -> String {
    parts.iter().map(TemplatePart::raw).collect()
}
