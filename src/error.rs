use thiserror::Error;

/// Errors raised while loading or validating a workflow graph.
///
/// These are surfaced at graph-build time and are never silently ignored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse workflow JSON: {0}")]
    JsonParseError(String),

    #[error("Node '{node_id}' has an invalid configuration: {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    #[error("Node '{node_id}' has an unregistered or invalid node type: '{type_name}'")]
    UnknownNodeType { node_id: String, type_name: String },

    #[error(
        "Node '{missing_node_id}' not found, which is required by a connection from node '{source_node_id}'"
    )]
    NodeNotFound {
        missing_node_id: String,
        source_node_id: String,
    },

    #[error("Node id '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("Workflow has no start node")]
    MissingStartNode,

    #[error("Workflow declares more than one start node: {0:?}")]
    MultipleStartNodes(Vec<String>),

    #[error("Workflow graph contains a cycle through node '{0}'")]
    CycleDetected(String),

    #[error("Variable name '{0}' is reserved")]
    ReservedVariableName(String),

    #[error("Variable name '{0}' is not a valid identifier")]
    InvalidVariableName(String),

    #[error("Branch {case} of node '{node_id}' has no comparisons")]
    EmptyBranch { node_id: String, case: usize },

    #[error("Node '{node_id}' has an invalid condition: {message}")]
    InvalidCondition { node_id: String, message: String },

    #[error("Node '{node_id}' requires the '{service}' service, which is not configured")]
    MissingService { node_id: String, service: String },
}

/// Errors raised while evaluating an expression or rendering a template.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Invalid expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("Disallowed construct in expression: {0}")]
    Forbidden(String),

    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found {found}"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Key '{0}' not found")]
    KeyNotFound(String),

    #[error("Index {index} out of range for a sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Arithmetic overflow during operation '{0}'")]
    Overflow(String),

    #[error("Operation '{0}' produced a non-finite number")]
    NonFinite(String),

    #[error("Template rendering failed: {0}")]
    Render(String),
}

/// Errors raised when an assignment operator meets a value of the wrong runtime type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorTypeError {
    #[error(
        "Operation '{operation}' expects a {expected} {role}, but found {found}"
    )]
    TypeMismatch {
        operation: String,
        role: &'static str,
        expected: String,
        found: String,
    },

    #[error("Operation '{operation}' is not supported for {kind} variables")]
    UnsupportedOperation { operation: String, kind: String },

    #[error("Division by zero while applying 'divide'")]
    DivisionByZero,

    #[error("Operation '{0}' cannot be applied to an empty array")]
    EmptyArray(String),

    #[error("Operation '{0}' produced a number that cannot be stored")]
    NumericRange(String),
}

/// Errors raised by variable selectors and the variable pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectorError {
    #[error("Invalid variable selector '{0}'")]
    Invalid(String),

    #[error("Cannot write to '{selector}': {reason}")]
    InvalidWrite { selector: String, reason: String },

    #[error("Variable '{0}' not found")]
    NotFound(String),
}

/// A failure reported by an external collaborator (LLM, HTTP, retrieval, agent).
///
/// This is the only recoverable error class: nodes convert it into an
/// `errors` entry plus an error payload instead of aborting the run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{tool} call failed: {message}")]
pub struct UpstreamToolError {
    pub tool: String,
    pub message: String,
}

impl UpstreamToolError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Any error that aborts a workflow run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    OperatorType(#[from] OperatorTypeError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Node '{node_id}' timed out after {timeout_secs}s")]
    NodeTimeout { node_id: String, timeout_secs: u64 },

    #[error("Workflow exceeded the limit of {0} node executions")]
    StepLimitExceeded(usize),

    #[error("Node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: Box<WorkflowError>,
    },
}

impl WorkflowError {
    /// Strips `NodeFailed` wrappers and returns the underlying cause.
    pub fn root_cause(&self) -> &WorkflowError {
        match self {
            WorkflowError::NodeFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
