//! Shared machinery behind LLM-backed nodes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AgentError, GuardrailError, ToolError};
use crate::guardrails::{DynGuardrail, GuardrailRegistry};
use crate::llm::{Llm, Message, ToolCall, ToolCallResponse};
use crate::state::NodeState;
use crate::tools::{DynTool, ToolRegistry};

/// Ordered key/value pairs rendered into the prompt's context section.
pub type PromptContext = Vec<(String, String)>;

/// Outcome of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call: ToolCall,
    pub output: Value,
}

impl ToolResult {
    /// String outputs unquoted, anything else as compact JSON.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool(self.output_text(), self.call.id.clone())
    }
}

/// Tool rounds allowed in [`AgentCore::run_with_tool_execution`].
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// LLM handle, instruction, tools and guardrails of a node.
///
/// Context flags default to on: the state's context is rendered into every
/// prompt and nodes may write their results back into it.
#[derive(Clone)]
pub struct AgentCore {
    llm: Arc<dyn Llm>,
    instruction: String,
    tools: ToolRegistry,
    guardrails: GuardrailRegistry,
    use_context: bool,
    share_context: bool,
    output_schema: Option<Value>,
    max_tool_rounds: usize,
}

impl AgentCore {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self {
            llm,
            instruction: String::new(),
            tools: ToolRegistry::new(),
            guardrails: GuardrailRegistry::new(),
            use_context: true,
            share_context: true,
            output_schema: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_use_context(mut self, enabled: bool) -> Self {
        self.use_context = enabled;
        self
    }

    pub fn with_share_context(mut self, enabled: bool) -> Self {
        self.share_context = enabled;
        self
    }

    /// Makes [`AgentCore::run_with_schema`] available.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Clamped to at least one round.
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_tool(mut self, tool: DynTool) -> Result<Self, ToolError> {
        self.register_tool(tool)?;
        Ok(self)
    }

    pub fn with_guardrail(mut self, guardrail: DynGuardrail) -> Result<Self, GuardrailError> {
        self.register_guardrail(guardrail)?;
        Ok(self)
    }

    pub fn register_tool(&mut self, tool: DynTool) -> Result<(), ToolError> {
        self.tools.register(tool)
    }

    pub fn register_guardrail(&mut self, guardrail: DynGuardrail) -> Result<(), GuardrailError> {
        self.guardrails.register(guardrail)
    }

    pub fn llm(&self) -> &Arc<dyn Llm> {
        &self.llm
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn guardrails(&self) -> &GuardrailRegistry {
        &self.guardrails
    }

    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Instruction, optional context block, then the input.
    pub fn build_prompt(&self, input: &str, context: &[(String, String)]) -> String {
        let mut context_block = String::new();
        if !context.is_empty() {
            context_block.push_str("\nContext:\n");
            for (key, value) in context {
                context_block.push_str(&format!("{}: {}\n", key, value));
            }
        }
        format!(
            "{}\n{}\nInput:\n{}\n",
            self.instruction.trim(),
            context_block,
            input
        )
    }

    /// The state's context entries sorted by key, or nothing when context
    /// use is switched off.
    pub fn state_context<S: NodeState>(&self, state: &S) -> PromptContext {
        if !self.use_context {
            return Vec::new();
        }
        let mut entries: PromptContext = state
            .base()
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Write `value` into the state's context when sharing is enabled.
    pub fn share<S: NodeState>(&self, state: &mut S, key: impl Into<String>, value: impl Into<String>) {
        if self.share_context {
            state.add_to_context(key, value);
        }
    }

    /// Prompt the model and pass the reply through every guardrail.
    pub async fn run_with_instruction(
        &self,
        input: &str,
        context: &[(String, String)],
    ) -> Result<String, AgentError> {
        let prompt = self.build_prompt(input, context);
        debug!(model = self.llm.model_name(), prompt_len = prompt.len(), "Invoking model");
        let response = self.llm.invoke(&prompt).await?;
        Ok(self.guardrails.apply_all(&response).await?)
    }

    /// Prompt the model with the registered tools on offer.
    pub async fn run_with_tools(
        &self,
        input: &str,
        context: &[(String, String)],
    ) -> Result<ToolCallResponse, AgentError> {
        let prompt = self.build_prompt(input, context);
        self.llm
            .invoke_with_tools(&prompt, &self.tools.definitions())
            .await
    }

    /// Run every requested tool call in order.
    pub async fn execute_tool_calls(
        &self,
        response: &ToolCallResponse,
    ) -> Result<Vec<ToolResult>, AgentError> {
        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            info!(tool = %call.name, call_id = %call.id, "Executing tool call");
            let output = self.tools.call(&call.name, call.arguments.clone()).await?;
            results.push(ToolResult {
                call: call.clone(),
                output,
            });
        }
        Ok(results)
    }

    /// Offer tools, execute whatever the model asks for and send the results
    /// back as tool messages, until the model answers without tool calls.
    ///
    /// Returns the guarded final answer. Gives up with
    /// [`AgentError::ToolRoundLimit`] once `max_tool_rounds` rounds have all
    /// requested tools.
    pub async fn run_with_tool_execution(
        &self,
        input: &str,
        context: &[(String, String)],
    ) -> Result<String, AgentError> {
        let definitions = self.tools.definitions();
        let mut messages = vec![Message::user(self.build_prompt(input, context))];

        for round in 1..=self.max_tool_rounds {
            let response = self.llm.chat_with_tools(&messages, &definitions).await?;
            if !response.has_tool_calls() {
                debug!(round, "Model answered without tool calls");
                return Ok(self.guardrails.apply_all(&response.response).await?);
            }

            let results = self.execute_tool_calls(&response).await?;
            messages.push(Message::assistant_with_tool_calls(
                response.response,
                response.tool_calls,
            ));
            messages.extend(results.iter().map(ToolResult::to_message));
        }

        Err(AgentError::ToolRoundLimit(self.max_tool_rounds))
    }

    /// Prompt for a JSON value conforming to the configured output schema.
    pub async fn run_with_schema(
        &self,
        input: &str,
        context: &[(String, String)],
    ) -> Result<Value, AgentError> {
        let schema = self
            .output_schema
            .as_ref()
            .ok_or_else(|| AgentError::Config("no output schema configured".to_string()))?;
        let prompt = self.build_prompt(input, context);
        self.llm.invoke_with_structured_output(&prompt, schema).await
    }
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("model", &self.llm.model_name())
            .field("instruction", &self.instruction)
            .field("tools", &self.tools)
            .field("guardrails", &self.guardrails)
            .field("use_context", &self.use_context)
            .field("share_context", &self.share_context)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}
