//! Prompt templates with per-provider overrides.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.
//!
//! ```
//! use std::collections::HashMap;
//! use agent_workflow::prompts::PromptManager;
//!
//! let mut prompts = PromptManager::new("summarize", "Summarize {topic} briefly.");
//! prompts.set("anthropic", "<task>Summarize {topic} briefly.</task>");
//!
//! let vars = HashMap::from([("topic", "the report")]);
//! assert_eq!(prompts.render("openai", &vars).unwrap(), "Summarize the report briefly.");
//! assert_eq!(
//!     prompts.render("anthropic", &vars).unwrap(),
//!     "<task>Summarize the report briefly.</task>"
//! );
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::error::PromptError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Var(String),
}

/// Parsed `{name}` template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `source`. An opening brace without its closing brace is an error.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Result<Self, PromptError> {
        let name = name.into();
        let source = source.into();
        let segments = parse(&name, &source)?;
        Ok(Self {
            name,
            source,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if let Segment::Var(var) = segment {
                if !seen.contains(&var.as_str()) {
                    seen.push(var.as_str());
                }
            }
        }
        seen
    }

    pub fn render<K, V>(&self, vars: &HashMap<K, V>) -> Result<String, PromptError>
    where
        K: std::borrow::Borrow<str> + std::hash::Hash + Eq,
        V: AsRef<str>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(var) => {
                    let value = vars.get(var.as_str()).ok_or_else(|| PromptError::MissingVariable {
                        prompt: self.name.clone(),
                        variable: var.clone(),
                    })?;
                    out.push_str(value.as_ref());
                }
            }
        }
        Ok(out)
    }
}

fn parse(name: &str, source: &str) -> Result<Vec<Segment>, PromptError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut var = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    var.push(c);
                }
                if !closed {
                    return Err(PromptError::UnclosedPlaceholder(name.to_string()));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Var(var.trim().to_string()));
            }
            _ => text.push(c),
        }
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

/// One named prompt: a default template plus overrides keyed by provider
/// name (`"openai"`, `"anthropic"`, ...).
#[derive(Debug, Clone)]
pub struct PromptManager {
    name: String,
    default: String,
    overrides: HashMap<String, String>,
}

impl PromptManager {
    pub fn new(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&mut self, provider: impl Into<String>, template: impl Into<String>) -> &mut Self {
        self.overrides.insert(provider.into(), template.into());
        self
    }

    /// Template text used for `provider`.
    pub fn template_for(&self, provider: &str) -> &str {
        self.overrides
            .get(provider)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn render<K, V>(&self, provider: &str, vars: &HashMap<K, V>) -> Result<String, PromptError>
    where
        K: std::borrow::Borrow<str> + std::hash::Hash + Eq,
        V: AsRef<str>,
    {
        let overridden = self.overrides.contains_key(provider);
        debug!(prompt = %self.name, provider, overridden, "Rendering prompt");
        PromptTemplate::new(self.name.clone(), self.template_for(provider))?.render(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_escapes() {
        let template = PromptTemplate::new("json", "Return {{\"city\": \"{city}\"}} for {city}").unwrap();
        let vars = HashMap::from([("city", "Oslo")]);
        assert_eq!(template.render(&vars).unwrap(), "Return {\"city\": \"Oslo\"} for Oslo");
        assert_eq!(template.variables(), vec!["city"]);
    }

    #[test]
    fn test_missing_variable() {
        let template = PromptTemplate::new("greet", "Hello {name}, from {place}").unwrap();
        let vars = HashMap::from([("name".to_string(), "Ada".to_string())]);
        assert_eq!(
            template.render(&vars).unwrap_err(),
            PromptError::MissingVariable {
                prompt: "greet".into(),
                variable: "place".into()
            }
        );
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert_eq!(
            PromptTemplate::new("broken", "Hello {name").unwrap_err(),
            PromptError::UnclosedPlaceholder("broken".into())
        );
    }

    #[test]
    fn test_manager_falls_back_to_default() {
        let mut prompts = PromptManager::new("verdict", "Is {weather} good for hiking?");
        prompts.set("lmstudio", "/no_think Is {weather} good for hiking?");

        assert_eq!(prompts.template_for("google"), "Is {weather} good for hiking?");
        let vars = HashMap::from([("weather", "rain")]);
        assert_eq!(
            prompts.render("lmstudio", &vars).unwrap(),
            "/no_think Is rain good for hiking?"
        );
    }
}
