use super::{
    Node, NodeConfig, NodeType, agent::AgentNode, assigner::AssignerNode, end::EndNode,
    http_request::HttpRequestNode, if_else::IfElseNode, jinja_render::JinjaRenderNode,
    knowledge_retrieval::KnowledgeRetrievalNode, llm::LlmNode,
    parameter_extractor::ParameterExtractorNode, question_classifier::QuestionClassifierNode,
    start::StartNode, transform::TransformNode, variable_aggregator::VariableAggregatorNode,
};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::services::Services;
use ahash::AHashMap;
use std::sync::Arc;

/// What a constructor may consult besides the node's own configuration.
pub struct BuildContext<'a> {
    pub services: &'a Services,
    pub config: &'a EngineConfig,
    /// Ids of the nodes with an edge into this one.
    pub predecessors: &'a [String],
}

pub type NodeConstructor =
    Arc<dyn Fn(&NodeConfig, &BuildContext<'_>) -> Result<Box<dyn Node>, ConfigError> + Send + Sync>;

// Registers the built-in node types with their constructors.
macro_rules! register_builtin_nodes {
    ( $registry:expr ; $( ($tag:expr, $node:ty) ),* $(,)? ) => {
        $(
            $registry.insert(
                $tag.as_str().to_string(),
                Arc::new(|config: &NodeConfig, ctx: &BuildContext<'_>| {
                    <$node>::from_config(config, ctx).map(|node| Box::new(node) as Box<dyn Node>)
                }) as NodeConstructor,
            );
        )*
    };
}

/// Maps type tags to node constructors.
#[derive(Clone, Default)]
pub struct NodeFactory {
    constructors: AHashMap<String, NodeConstructor>,
    aliases: AHashMap<String, String>,
}

impl NodeFactory {
    /// A factory with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory with every built-in node type registered.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        register_builtin_nodes! { factory.constructors;
            (NodeType::Start, StartNode),
            (NodeType::End, EndNode),
            (NodeType::Llm, LlmNode),
            (NodeType::Agent, AgentNode),
            (NodeType::IfElse, IfElseNode),
            (NodeType::Transform, TransformNode),
            (NodeType::KnowledgeRetrieval, KnowledgeRetrievalNode),
            (NodeType::Assigner, AssignerNode),
            (NodeType::HttpRequest, HttpRequestNode),
            (NodeType::JinjaRender, JinjaRenderNode),
            (NodeType::ParameterExtractor, ParameterExtractorNode),
            (NodeType::QuestionClassifier, QuestionClassifierNode),
            (NodeType::VariableAggregator, VariableAggregatorNode),
        }
        factory
    }

    /// Registers (or replaces) the constructor for `tag`.
    pub fn with_constructor<F>(mut self, tag: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&NodeConfig, &BuildContext<'_>) -> Result<Box<dyn Node>, ConfigError> + Send + Sync + 'static,
    {
        self.register(tag, constructor);
        self
    }

    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&NodeConfig, &BuildContext<'_>) -> Result<Box<dyn Node>, ConfigError> + Send + Sync + 'static,
    {
        self.constructors.insert(tag.into(), Arc::new(constructor));
    }

    /// Makes `alias` build the same node as `target`.
    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// Resolves aliases to the registered tag.
    pub fn resolve_tag<'t>(&'t self, tag: &'t str) -> &'t str {
        self.aliases.get(tag).map(String::as_str).unwrap_or(tag)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        let tag = self.resolve_tag(tag);
        tag == NodeType::Condition.as_str() || self.constructors.contains_key(tag)
    }

    /// Instantiates a node. `Ok(None)` for `condition` nodes, which the graph
    /// routes without running anything.
    pub fn create(
        &self,
        config: &NodeConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Option<Box<dyn Node>>, ConfigError> {
        let tag = self.resolve_tag(&config.node_type);
        if tag == NodeType::Condition.as_str() {
            return Ok(None);
        }
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| ConfigError::UnknownNodeType {
                node_id: config.id.clone(),
                type_name: config.node_type.clone(),
            })?;
        tracing::debug!(node_id = %config.id, node_type = %tag, "building node");
        constructor(config, ctx).map(Some)
    }
}
