use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{error, info};

use super::AgentNode;
use crate::error::NodeError;
use crate::state::NodeState;

type StepFn<S> = dyn Fn(S) -> BoxFuture<'static, Result<S, NodeError>> + Send + Sync;

/// Node made of named steps run in order.
///
/// The first failing step stops the node; the state it received is returned
/// with `Error in step '<step>': <error>` in its error field.
pub struct MultiStepNode<S: NodeState> {
    name: String,
    steps: Vec<(String, Arc<StepFn<S>>)>,
}

impl<S: NodeState> MultiStepNode<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step<F, Fut>(mut self, name: impl Into<String>, step: F) -> Self
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, NodeError>> + Send + 'static,
    {
        let boxed: Arc<StepFn<S>> = Arc::new(move |state| step(state).boxed());
        self.steps.push((name.into(), boxed));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[async_trait]
impl<S: NodeState> AgentNode<S> for MultiStepNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn proc(&self, state: S) -> Result<S, NodeError> {
        let mut current = state;

        for (step_name, step) in &self.steps {
            info!(node = %self.name, step = %step_name, "Running step");
            match step(current.clone()).await {
                Ok(next) => current = next,
                Err(err) => {
                    error!(node = %self.name, step = %step_name, error = %err, "Step failed");
                    return Ok(current.emit_error(format!("Error in step '{}': {}", step_name, err)));
                }
            }
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BaseState;

    fn append(marker: &'static str) -> impl Fn(BaseState) -> futures::future::Ready<Result<BaseState, NodeError>> {
        move |mut state: BaseState| {
            let trail = state.get_from_context_or("trail", "");
            state.add_to_context("trail", format!("{}{}", trail, marker));
            futures::future::ready(Ok(state))
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let node = MultiStepNode::new("pipeline")
            .step("first", append("a"))
            .step("second", append("b"))
            .step("third", append("c"));

        assert_eq!(node.step_names(), vec!["first", "second", "third"]);
        let state = node.action(BaseState::default()).await;
        assert_eq!(state.get_from_context("trail"), Some("abc"));
        assert!(!state.has_error());
    }

    #[tokio::test]
    async fn test_failing_step_keeps_progress_and_stops() {
        let node = MultiStepNode::new("pipeline")
            .step("first", append("a"))
            .step("parse", |_state: BaseState| async {
                Err(NodeError::other("unexpected token"))
            })
            .step("never", append("z"));

        let state = node.action(BaseState::default()).await;

        assert_eq!(state.error(), "Error in step 'parse': unexpected token");
        assert_eq!(state.get_from_context("trail"), Some("a"));
    }
}
