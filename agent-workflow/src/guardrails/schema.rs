use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Guardrail, Issue, ValidationResult};
use crate::error::GuardrailError;
use crate::llm::{strip_think, Llm};
use crate::schema;

/// Repairs output that failed schema validation.
#[async_trait]
pub trait SchemaFixer: Send + Sync {
    async fn fix(
        &self,
        output: &str,
        result: &ValidationResult,
        schema: &Value,
    ) -> Result<String, GuardrailError>;
}

/// Asks a model to rewrite the output so it conforms to the schema.
pub struct LlmSchemaFixer {
    llm: Arc<dyn Llm>,
}

impl LlmSchemaFixer {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SchemaFixer for LlmSchemaFixer {
    async fn fix(
        &self,
        output: &str,
        result: &ValidationResult,
        schema: &Value,
    ) -> Result<String, GuardrailError> {
        let problems = result
            .issues
            .iter()
            .map(|issue| format!("- {}", issue.message))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "The following output does not match the required JSON schema.\n\n\
             Output:\n{}\n\nProblems:\n{}\n\nSchema:\n{}\n\n\
             Rewrite the output as JSON that satisfies the schema. Reply with the JSON only.",
            output,
            problems,
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
        );

        let reply = self
            .llm
            .invoke(&prompt)
            .await
            .map_err(|e| GuardrailError::FixFailed(e.to_string()))?;
        Ok(strip_think(&reply))
    }
}

/// Requires the output to be JSON that validates against a schema.
pub struct SchemaGuardrail {
    name: String,
    description: String,
    schema: Value,
    fixer: Option<Arc<dyn SchemaFixer>>,
}

impl SchemaGuardrail {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            fixer: None,
        }
    }

    pub fn with_fixer(mut self, fixer: Arc<dyn SchemaFixer>) -> Self {
        self.fixer = Some(fixer);
        self
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

#[async_trait]
impl Guardrail for SchemaGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, output: &str) -> ValidationResult {
        let instance: Value = match serde_json::from_str(output) {
            Ok(value) => value,
            Err(e) => {
                return ValidationResult::from_issues(vec![Issue::new(format!("Invalid JSON: {}", e))])
            }
        };

        let issues = schema::validate(&instance, &self.schema)
            .into_iter()
            .map(|violation| Issue::new(violation.to_string()))
            .collect();
        ValidationResult::from_issues(issues)
    }

    async fn fix(&self, output: &str, result: &ValidationResult) -> Result<String, GuardrailError> {
        if result.valid {
            return Ok(output.to_string());
        }
        match &self.fixer {
            Some(fixer) => {
                debug!(guardrail = %self.name, "Repairing output with schema fixer");
                fixer.fix(output, result, &self.schema).await
            }
            None => {
                warn!(guardrail = %self.name, "Output violates schema and no fixer is configured");
                Ok(output.to_string())
            }
        }
    }
}
