use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::AgentNode;
use crate::error::NodeError;
use crate::state::NodeState;

type ProcFn<S> = dyn Fn(S) -> BoxFuture<'static, Result<S, NodeError>> + Send + Sync;

/// Node whose processing is a closure.
pub struct FnNode<S: NodeState> {
    name: String,
    func: Arc<ProcFn<S>>,
}

impl<S: NodeState> FnNode<S> {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, NodeError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |state| func(state).boxed()),
        }
    }

    /// Node from a synchronous state transform.
    pub fn sync<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(S) -> Result<S, NodeError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, move |state| {
            let func = Arc::clone(&func);
            async move { func(state) }
        })
    }
}

#[async_trait]
impl<S: NodeState> AgentNode<S> for FnNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn proc(&self, state: S) -> Result<S, NodeError> {
        (self.func)(state).await
    }
}
