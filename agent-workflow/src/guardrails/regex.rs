use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Guardrail, Issue, ValidationResult};
use crate::error::GuardrailError;

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Block,
}

/// Pattern rule as configured by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRule {
    pub pattern: String,
    pub action: RuleAction,
    pub message: String,
}

impl RegexRule {
    pub fn block(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: RuleAction::Block,
            message: message.into(),
        }
    }

    pub fn allow(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: RuleAction::Allow,
            message: message.into(),
        }
    }
}

struct CompiledRule {
    rule: RegexRule,
    regex: Regex,
}

/// Flags case-insensitive matches of blocked patterns and redacts them.
///
/// ```
/// use agent_workflow::guardrails::{Guardrail, RegexGuardrail, RegexRule};
///
/// let guardrail = RegexGuardrail::new(
///     "no_emails",
///     "Strip e-mail addresses",
///     vec![RegexRule::block(r"[\w.+-]+@[\w-]+\.[\w.]+", "E-mail address found")],
/// )
/// .unwrap();
///
/// assert!(!guardrail.validate("mail me at kim@example.com").valid);
/// ```
pub struct RegexGuardrail {
    name: String,
    description: String,
    rules: Vec<CompiledRule>,
}

impl RegexGuardrail {
    /// Fails when any pattern does not compile.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rules: Vec<RegexRule>,
    ) -> Result<Self, GuardrailError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = compile(&rule.pattern)?;
                Ok(CompiledRule { rule, regex })
            })
            .collect::<Result<Vec<_>, GuardrailError>>()?;

        Ok(Self {
            name: name.into(),
            description: description.into(),
            rules,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &RegexRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }
}

fn compile(pattern: &str) -> Result<Regex, GuardrailError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| GuardrailError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl Guardrail for RegexGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, output: &str) -> ValidationResult {
        let issues = self
            .rules
            .iter()
            .filter(|compiled| compiled.rule.action == RuleAction::Block)
            .filter_map(|compiled| {
                let matches: Vec<String> = compiled
                    .regex
                    .find_iter(output)
                    .map(|m| m.as_str().to_string())
                    .collect();
                (!matches.is_empty()).then(|| Issue {
                    message: compiled.rule.message.clone(),
                    pattern: Some(compiled.rule.pattern.clone()),
                    matches,
                })
            })
            .collect();

        ValidationResult::from_issues(issues)
    }

    async fn fix(&self, output: &str, result: &ValidationResult) -> Result<String, GuardrailError> {
        if result.valid {
            return Ok(output.to_string());
        }

        let mut fixed = output.to_string();
        for pattern in result.issues.iter().filter_map(|issue| issue.pattern.as_deref()) {
            let regex = match self.rules.iter().find(|c| c.rule.pattern == pattern) {
                Some(compiled) => compiled.regex.clone(),
                None => compile(pattern)?,
            };
            fixed = regex.replace_all(&fixed, REDACTED).into_owned();
        }

        debug!(guardrail = %self.name, issues = result.issues.len(), "Redacted blocked content");
        Ok(fixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profanity() -> RegexGuardrail {
        RegexGuardrail::new(
            "profanity",
            "Blocks rude words",
            vec![
                RegexRule::block(r"\bdarn\b", "Mild profanity"),
                RegexRule::allow(r"\bplease\b", "Politeness is fine"),
                RegexRule::block(r"\d{3}-\d{4}", "Phone number"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_clean_output_is_valid() {
        assert_eq!(profanity().validate("please continue"), ValidationResult::ok());
    }

    #[test]
    fn test_block_rules_case_insensitive() {
        let result = profanity().validate("DARN it, call 555-1234 or darn");
        assert!(!result.valid);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].matches, vec!["DARN", "darn"]);
        assert_eq!(result.issues[1].message, "Phone number");
    }

    #[tokio::test]
    async fn test_fix_redacts_every_match() {
        let guardrail = profanity();
        let output = "Darn, call 555-1234.";
        let result = guardrail.validate(output);
        let fixed = guardrail.fix(output, &result).await.unwrap();
        assert_eq!(fixed, "[REDACTED], call [REDACTED].");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = RegexGuardrail::new("bad", "", vec![RegexRule::block("(unclosed", "x")])
            .err()
            .unwrap();
        assert!(matches!(err, GuardrailError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
