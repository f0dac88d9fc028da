// src/error.rs
//! Error types for nodes, providers, tools, guardrails and graph execution.

use thiserror::Error;

/// Errors raised by a tool or the tool registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("A tool with name '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool execution error: {0}")]
    Execution(String),
}

/// Errors raised by guardrails and the guardrail registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardrailError {
    #[error("A guardrail with name '{0}' is already registered")]
    DuplicateGuardrail(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Guardrail fix failed: {0}")]
    FixFailed(String),
}

/// Errors raised while resolving or constructing a model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Cannot determine provider for model: {0}")]
    UnknownModel(String),

    #[error("Provider '{provider}' is not registered. Available providers: {available:?}")]
    UnregisteredProvider {
        provider: String,
        available: Vec<String>,
    },

    #[error("Unknown provider name: {0}")]
    UnknownProviderName(String),

    #[error("Provider construction failed: {0}")]
    Construction(String),
}

/// Errors raised by prompt templates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("Missing template variable '{variable}' in prompt '{prompt}'")]
    MissingVariable { prompt: String, variable: String },

    #[error("Unclosed placeholder in prompt '{0}'")]
    UnclosedPlaceholder(String),
}

/// Top-level error for LLM calls and agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{operation} is not supported by provider '{provider}'")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    #[error("Model still requesting tools after {0} rounds")]
    ToolRoundLimit(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Guardrail error: {0}")]
    Guardrail(#[from] GuardrailError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
}

impl AgentError {
    pub fn unsupported(provider: impl Into<String>, operation: &'static str) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            operation,
        }
    }
}

/// Failure inside a node's validation or processing.
///
/// `AgentNode::action` never lets these escape; they are folded into the
/// state's error field.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("{0}")]
    Other(String),
}

impl NodeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<ToolError> for NodeError {
    fn from(err: ToolError) -> Self {
        Self::Agent(err.into())
    }
}

impl From<GuardrailError> for NodeError {
    fn from(err: GuardrailError) -> Self {
        Self::Agent(err.into())
    }
}

impl From<PromptError> for NodeError {
    fn from(err: PromptError) -> Self {
        Self::Agent(err.into())
    }
}

/// Errors from building or running a state graph and the workflows on top of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph entry point not set")]
    NoEntryPoint,

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("Node with name '{0}' already exists")]
    DuplicateNode(String),

    #[error("Node with name '{0}' does not exist")]
    MissingNode(String),

    #[error("Source node '{0}' does not exist")]
    MissingSource(String),

    #[error("node '{0}' already has outgoing edges")]
    DuplicateEdges(String),

    #[error("reserved node name: {0}")]
    ReservedName(String),

    #[error("router for node '{node}' returned '{branch}' which has no destination")]
    UnknownBranch { node: String, branch: String },

    #[error("recursion limit of {0} steps reached without hitting END")]
    RecursionLimit(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_tool_message_names_tool() {
        let err = ToolError::DuplicateTool("search".to_string());
        assert_eq!(
            err.to_string(),
            "A tool with name 'search' is already registered"
        );
    }

    #[test]
    fn test_unregistered_provider_lists_available() {
        let err = ProviderError::UnregisteredProvider {
            provider: "mistral".to_string(),
            available: vec!["anthropic".to_string(), "openai".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("'mistral'"));
        assert!(text.contains("anthropic"));
    }

    #[test]
    fn test_node_error_from_tool_error() {
        let err: NodeError = ToolError::ToolNotFound("calc".to_string()).into();
        assert!(matches!(err, NodeError::Agent(AgentError::Tool(_))));
        assert_eq!(err.to_string(), "Tool error: Tool not found: calc");
    }

    #[test]
    fn test_unsupported_display() {
        let err = AgentError::unsupported("mock", "tool calling");
        assert_eq!(
            err.to_string(),
            "tool calling is not supported by provider 'mock'"
        );
    }
}
