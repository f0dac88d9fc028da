//! Tools a node can offer to its model
//!
//! A tool is a named callable with a JSON-schema parameter description.
//! [`FunctionTool`] wraps a closure; anything more involved implements
//! [`Tool`] directly.

mod registry;

pub use registry::ToolRegistry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::schema;

/// Name, description and parameter schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Plain JSON form handed to providers that take tool lists as data.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

pub type DynTool = Arc<dyn Tool>;

type ToolFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// Tool backed by a closure.
///
/// Arguments are checked against the parameter schema before the closure
/// runs, so the closure can deserialize them without re-validating.
#[derive(Clone)]
pub struct FunctionTool {
    definition: ToolDefinition,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition::new(name, description, parameters),
            func: Arc::new(move |args| func(args).boxed()),
        }
    }

    /// Tool from a synchronous closure.
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, description, parameters, move |args| {
            let func = Arc::clone(&func);
            async move { func(args) }
        })
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.definition.name)
            .finish()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        schema::check_instance(&args, &self.definition.parameters).map_err(|message| {
            ToolError::InvalidArguments {
                tool: self.definition.name.clone(),
                message,
            }
        })?;

        debug!(tool = %self.definition.name, "Calling tool");
        (self.func)(args).await
    }
}
