// src/state.rs
//! Workflow state shared between nodes.
//!
//! Every workflow state carries an error slot and a string context map.
//! Concrete states embed a [`BaseState`] and implement [`NodeState`] by
//! pointing at it:
//!
//! ```
//! use agent_workflow::{BaseState, NodeState};
//!
//! #[derive(Debug, Clone, Default)]
//! struct DocumentState {
//!     base: BaseState,
//!     content: String,
//!     summary: String,
//! }
//!
//! impl NodeState for DocumentState {
//!     fn base(&self) -> &BaseState { &self.base }
//!     fn base_mut(&mut self) -> &mut BaseState { &mut self.base }
//! }
//!
//! let state = DocumentState::default().emit_error("boom");
//! assert!(state.has_error());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::error;

/// Error slot and shared context embedded in every workflow state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseState {
    /// Error message, empty when the workflow is healthy
    #[serde(default)]
    pub error: String,
    /// Context shared between nodes
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// State flowing through a workflow graph.
pub trait NodeState: Clone + Send + Sync + 'static {
    fn base(&self) -> &BaseState;

    fn base_mut(&mut self) -> &mut BaseState;

    fn error(&self) -> &str {
        &self.base().error
    }

    fn has_error(&self) -> bool {
        !self.base().error.is_empty()
    }

    /// Copy of this state with the error field set.
    fn emit_error(&self, error_str: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        let error_str = error_str.into();
        error!(error = %error_str, "Node error");
        let mut next = self.clone();
        next.base_mut().error = error_str;
        next
    }

    fn add_to_context(&mut self, key: impl Into<String>, value: impl Into<String>)
    where
        Self: Sized,
    {
        self.base_mut().context.insert(key.into(), value.into());
    }

    fn get_from_context(&self, key: &str) -> Option<&str> {
        self.base().context.get(key).map(String::as_str)
    }

    fn get_from_context_or(&self, key: &str, default: &str) -> String {
        self.get_from_context(key).unwrap_or(default).to_string()
    }
}

impl NodeState for BaseState {
    fn base(&self) -> &BaseState {
        self
    }

    fn base_mut(&mut self) -> &mut BaseState {
        self
    }
}
