//! Agent workflow framework
//!
//! Multi-step LLM pipelines built from nodes wired into a state graph.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ workflow: AgentWorkflow / ConditionalWorkflow            │
//! │   builds ─▶ graph: StateGraph ─compile─▶ CompiledGraph   │
//! ├──────────────────────────────────────────────────────────┤
//! │ node: AgentNode::action(state) -> state                  │
//! │   AgentCore = Llm + instruction + tools + guardrails     │
//! ├───────────────┬──────────────────┬───────────────────────┤
//! │ tools         │ guardrails       │ prompts               │
//! ├───────────────┴──────────────────┴───────────────────────┤
//! │ providers: model name ─▶ provider ─▶ Arc<dyn Llm>        │
//! │ llm: rig-core (OpenAI, Anthropic, Gemini), LM Studio     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Nodes never fail a run by themselves: a failing node writes its error into
//! the state, and the workflow's error-check edges end the run.

pub mod error;
pub mod graph;
pub mod guardrails;
pub mod llm;
pub mod node;
pub mod prompts;
pub mod providers;
pub mod schema;
pub mod state;
pub mod tools;
pub mod workflow;

pub use error::{AgentError, GraphError, GuardrailError, NodeError, PromptError, ProviderError, ToolError};
pub use graph::{CompiledGraph, GraphRun, StateGraph, END, START};
pub use guardrails::{Guardrail, GuardrailRegistry, RegexGuardrail, SchemaGuardrail, ValidationResult};
pub use llm::{Llm, LlmConfig, ProviderSettings};
pub use node::{AgentCore, AgentNode, DynNode, FnNode, InstructionNode, MultiStepNode};
pub use prompts::{PromptManager, PromptTemplate};
pub use providers::{get_provider, ModelFactory, ProviderKind};
pub use state::{BaseState, NodeState};
pub use tools::{FunctionTool, Tool, ToolDefinition, ToolRegistry};
pub use workflow::{check_error, AgentWorkflow, ConditionalEdge, ConditionalWorkflow};
