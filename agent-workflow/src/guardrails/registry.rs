use std::collections::HashMap;

use tracing::info;

use super::DynGuardrail;
use crate::error::GuardrailError;

/// Ordered, name-keyed guardrail collection.
#[derive(Default, Clone)]
pub struct GuardrailRegistry {
    guardrails: Vec<DynGuardrail>,
    index: HashMap<String, usize>,
}

impl GuardrailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, guardrail: DynGuardrail) -> Result<(), GuardrailError> {
        let name = guardrail.name().to_string();
        if self.index.contains_key(&name) {
            return Err(GuardrailError::DuplicateGuardrail(name));
        }
        self.index.insert(name, self.guardrails.len());
        self.guardrails.push(guardrail);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DynGuardrail> {
        self.index.get(name).map(|&i| &self.guardrails[i])
    }

    pub fn list(&self) -> &[DynGuardrail] {
        &self.guardrails
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// Validate `output` with each guardrail in registration order, replacing
    /// it with the fixed version whenever validation fails.
    pub async fn apply_all(&self, output: &str) -> Result<String, GuardrailError> {
        let mut current = output.to_string();
        for guardrail in &self.guardrails {
            let result = guardrail.validate(&current);
            if !result.valid {
                info!(
                    guardrail = guardrail.name(),
                    issues = result.issues.len(),
                    "Guardrail rejected output, applying fix"
                );
                current = guardrail.fix(&current, &result).await?;
            }
        }
        Ok(current)
    }
}

impl std::fmt::Debug for GuardrailRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.guardrails.iter().map(|g| g.name()).collect();
        f.debug_struct("GuardrailRegistry")
            .field("guardrails", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::{RegexGuardrail, RegexRule, SchemaGuardrail};
    use serde_json::json;
    use std::sync::Arc;

    fn redactor(name: &str, pattern: &str) -> DynGuardrail {
        Arc::new(RegexGuardrail::new(name, "", vec![RegexRule::block(pattern, "blocked")]).unwrap())
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = GuardrailRegistry::new();
        registry.register(redactor("secrets", "sk-[a-z0-9]+")).unwrap();

        assert!(registry.contains("secrets"));
        assert_eq!(registry.get("secrets").unwrap().name(), "secrets");
        assert!(registry.get("other").is_none());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = GuardrailRegistry::new();
        registry.register(redactor("secrets", "a")).unwrap();
        let err = registry.register(redactor("secrets", "b")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A guardrail with name 'secrets' is already registered"
        );
    }

    #[tokio::test]
    async fn test_apply_all_chains_fixes_in_order() {
        let mut registry = GuardrailRegistry::new();
        registry.register(redactor("keys", "sk-[a-z0-9]+")).unwrap();
        registry.register(redactor("words", r"\btoken\b")).unwrap();

        let output = registry.apply_all("token sk-abc123 leaked").await.unwrap();
        assert_eq!(output, "[REDACTED] [REDACTED] leaked");
    }

    #[tokio::test]
    async fn test_apply_all_leaves_valid_output() {
        let mut registry = GuardrailRegistry::new();
        registry
            .register(Arc::new(SchemaGuardrail::new("json", "", json!({"type": "object"}))))
            .unwrap();

        assert_eq!(registry.apply_all(r#"{"ok": true}"#).await.unwrap(), r#"{"ok": true}"#);
    }
}
