use std::sync::Arc;

use async_trait::async_trait;

use super::agent_core::{AgentCore, PromptContext};
use super::AgentNode;
use crate::error::NodeError;
use crate::state::NodeState;

type InputFn<S> = dyn Fn(&S) -> String + Send + Sync;
type OutputFn<S> = dyn Fn(&mut S, String) + Send + Sync;
type ContextFn<S> = dyn Fn(&S) -> PromptContext + Send + Sync;
type ValidateFn<S> = dyn Fn(&S) -> Result<(), NodeError> + Send + Sync;

/// How an [`InstructionNode`] talks to its model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Plain prompt, reply passed through guardrails
    #[default]
    Text,
    /// Offer the registered tools, run the calls, then ask for the answer
    Tools,
    /// Structured output against the core's schema, written as JSON text
    Structured,
}

/// Node that reads one field of the state, prompts the model with its
/// instruction and writes the reply back.
///
/// ```
/// use std::sync::Arc;
/// use agent_workflow::llm::ScriptedLlm;
/// use agent_workflow::node::{AgentCore, InstructionNode};
/// use agent_workflow::{BaseState, NodeState};
///
/// let core = AgentCore::new(Arc::new(ScriptedLlm::new("m")))
///     .with_instruction("Summarize the document.");
/// let node = InstructionNode::new(
///     "summarizer",
///     core,
///     |s: &BaseState| s.get_from_context_or("document", ""),
///     |s: &mut BaseState, reply| s.add_to_context("summary", reply),
/// );
/// ```
pub struct InstructionNode<S: NodeState> {
    name: String,
    core: AgentCore,
    mode: OutputMode,
    input: Arc<InputFn<S>>,
    output: Arc<OutputFn<S>>,
    extra_context: Option<Arc<ContextFn<S>>>,
    validator: Option<Arc<ValidateFn<S>>>,
    require_input: bool,
    share_key: Option<String>,
}

impl<S: NodeState> InstructionNode<S> {
    pub fn new<I, O>(name: impl Into<String>, core: AgentCore, input: I, output: O) -> Self
    where
        I: Fn(&S) -> String + Send + Sync + 'static,
        O: Fn(&mut S, String) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            core,
            mode: OutputMode::Text,
            input: Arc::new(input),
            output: Arc::new(output),
            extra_context: None,
            validator: None,
            require_input: false,
            share_key: None,
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Extra prompt context derived from the state, rendered after the
    /// state's shared context.
    pub fn with_context<F>(mut self, context: F) -> Self
    where
        F: Fn(&S) -> PromptContext + Send + Sync + 'static,
    {
        self.extra_context = Some(Arc::new(context));
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&S) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Reject states whose selected input is blank.
    pub fn require_input(mut self) -> Self {
        self.require_input = true;
        self
    }

    /// Also publish the reply into the shared context under `key`.
    pub fn share_as(mut self, key: impl Into<String>) -> Self {
        self.share_key = Some(key.into());
        self
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn prompt_context(&self, state: &S) -> PromptContext {
        let mut context = self.core.state_context(state);
        if let Some(extra) = &self.extra_context {
            context.extend(extra(state));
        }
        context
    }
}

#[async_trait]
impl<S: NodeState> AgentNode<S> for InstructionNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, state: &S) -> Result<(), NodeError> {
        if self.require_input && (self.input)(state).trim().is_empty() {
            return Err(NodeError::validation(format!(
                "Input for node '{}' is empty",
                self.name
            )));
        }
        match &self.validator {
            Some(validator) => validator(state),
            None => Ok(()),
        }
    }

    async fn proc(&self, mut state: S) -> Result<S, NodeError> {
        let input = (self.input)(&state);
        let context = self.prompt_context(&state);

        let reply = match self.mode {
            OutputMode::Text => self.core.run_with_instruction(&input, &context).await?,
            OutputMode::Tools => self.core.run_with_tool_execution(&input, &context).await?,
            OutputMode::Structured => self
                .core
                .run_with_schema(&input, &context)
                .await?
                .to_string(),
        };

        if let Some(key) = &self.share_key {
            self.core.share(&mut state, key.clone(), reply.clone());
        }
        (self.output)(&mut state, reply);
        Ok(state)
    }
}
