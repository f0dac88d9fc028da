//! Workflow nodes
//!
//! A node transforms a workflow state. [`AgentNode::action`] is what the
//! graph executes: it validates, runs [`AgentNode::proc`] and converts any
//! failure into the state's error field, so a failing node never aborts the
//! graph by itself. The error-checking edges of
//! [`crate::workflow::AgentWorkflow`] decide what happens next.

mod agent_core;
mod function;
mod instruction;
mod multi_step;

pub use self::agent_core::{AgentCore, PromptContext, ToolResult};
pub use self::function::FnNode;
pub use self::instruction::{InstructionNode, OutputMode};
pub use self::multi_step::MultiStepNode;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::NodeError;
use crate::state::NodeState;

#[async_trait]
pub trait AgentNode<S: NodeState>: Send + Sync {
    /// Human-readable name; may contain spaces.
    fn name(&self) -> &str;

    /// Graph identifier derived from the name.
    fn node_name(&self) -> String {
        self.name().replace(' ', "_")
    }

    /// Precondition check run before `proc`.
    fn validate(&self, _state: &S) -> Result<(), NodeError> {
        Ok(())
    }

    async fn proc(&self, state: S) -> Result<S, NodeError>;

    /// Validate and process, folding any failure into the state.
    ///
    /// On failure the returned state is the input state with its error set to
    /// `An error occurred in node '<name>': <error>`.
    async fn action(&self, state: S) -> S {
        let name = self.name();

        let result = match self.validate(&state) {
            Ok(()) => {
                info!(node = name, "Node starting");
                self.proc(state.clone()).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(next) => {
                info!(node = name, "Node completed");
                next
            }
            Err(err) => {
                error!(node = name, error = %err, "Node failed");
                state.emit_error(format!("An error occurred in node '{}': {}", name, err))
            }
        }
    }
}

pub type DynNode<S> = Arc<dyn AgentNode<S>>;
