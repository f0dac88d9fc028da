//! Output guardrails
//!
//! A guardrail inspects a node's model output and, when it finds a problem,
//! produces a corrected version. [`GuardrailRegistry::apply_all`] runs every
//! registered guardrail in order, feeding each the previous one's output.

mod regex;
mod registry;
mod schema;

pub use self::regex::{RegexGuardrail, RegexRule, RuleAction};
pub use self::registry::GuardrailRegistry;
pub use self::schema::{LlmSchemaFixer, SchemaFixer, SchemaGuardrail};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GuardrailError;

/// A single problem found in an output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    /// Valid exactly when `issues` is empty.
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }
}

#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn validate(&self, output: &str) -> ValidationResult;

    /// Corrected output for a failed validation.
    async fn fix(&self, output: &str, result: &ValidationResult) -> Result<String, GuardrailError>;
}

pub type DynGuardrail = Arc<dyn Guardrail>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_result_from_issues() {
        assert!(ValidationResult::from_issues(vec![]).valid);
        let failed = ValidationResult::from_issues(vec![Issue::new("bad")]);
        assert!(!failed.valid);
        assert_eq!(failed.issues[0].message, "bad");
    }

    #[test]
    fn test_issue_serialization_skips_empty() {
        let json = serde_json::to_value(Issue::new("Invalid JSON")).unwrap();
        assert_eq!(json, serde_json::json!({"message": "Invalid JSON"}));
    }
}
