//! # Demo Workflows
//!
//! Three bundled pipelines exercising the framework:
//! - `document`: topic extraction, summary with a redaction guardrail, formatting
//! - `conditional`: a classifier routing to a short or a detailed answer
//! - `hiking`: a tool-calling node checking weather and temperature for a city
//!
//! Each demo also has a scripted model so it runs without API keys.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::{json, Value};

use agent_workflow::guardrails::{RegexGuardrail, RegexRule};
use agent_workflow::llm::{strip_think, Llm, ScriptedLlm, ToolCall};
use agent_workflow::node::{AgentCore, DynNode, FnNode, InstructionNode, OutputMode};
use agent_workflow::prompts::PromptManager;
use agent_workflow::tools::FunctionTool;
use agent_workflow::{
    AgentWorkflow, BaseState, ConditionalEdge, ConditionalWorkflow, NodeError, NodeState, END,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    Document,
    Conditional,
    Hiking,
}

impl Demo {
    pub fn default_input(&self) -> &'static str {
        match self {
            Demo::Document => {
                "Artificial intelligence research has accelerated. Machine learning models, \
                 especially neural networks, now power search, translation and code tools."
            }
            Demo::Conditional => "Design a multi-region architecture for a payment service.",
            Demo::Hiking => "Kyoto",
        }
    }
}

/// Outcome of one demo run.
#[derive(Debug, Clone)]
pub struct DemoRun {
    pub path: Vec<String>,
    pub output: String,
    pub error: Option<String>,
}

fn finish<S: NodeState>(path: Vec<String>, state: &S, output: String) -> DemoRun {
    DemoRun {
        path,
        output,
        error: state.has_error().then(|| state.error().to_string()),
    }
}

pub async fn run(demo: Demo, llm: Arc<dyn Llm>, input: &str) -> Result<DemoRun> {
    match demo {
        Demo::Document => {
            let app = document_workflow(llm)?.compile()?;
            let state = DocumentState {
                content: input.to_string(),
                ..Default::default()
            };
            let run = app.run(state).await?;
            Ok(finish(run.path, &run.state, run.state.formatted.clone()))
        }
        Demo::Conditional => {
            let app = conditional_workflow(llm).compile()?;
            let state = RequestState {
                request: input.to_string(),
                ..Default::default()
            };
            let run = app.run(state).await?;
            Ok(finish(run.path, &run.state, run.state.answer.clone()))
        }
        Demo::Hiking => {
            let app = hiking_workflow(llm, input)?.compile()?;
            let state = HikingState {
                city: input.to_string(),
                ..Default::default()
            };
            let run = app.run(state).await?;
            Ok(finish(run.path, &run.state, run.state.check_result.clone()))
        }
    }
}

/// Mermaid rendering of a demo's graph.
pub fn mermaid(demo: Demo) -> Result<String> {
    let llm = mock_llm(demo, demo.default_input());
    let rendered = match demo {
        Demo::Document => document_workflow(llm)?.compile()?.to_mermaid(),
        Demo::Conditional => conditional_workflow(llm).compile()?.to_mermaid(),
        Demo::Hiking => hiking_workflow(llm, demo.default_input())?.compile()?.to_mermaid(),
    };
    Ok(rendered)
}

/// Scripted model answering the prompts of `demo`.
pub fn mock_llm(demo: Demo, input: &str) -> Arc<dyn Llm> {
    let llm = match demo {
        Demo::Document => ScriptedLlm::new("mock-llm")
            .on(
                "Extract the main topics",
                "The main topics are: AI, Machine Learning, Neural Networks",
            )
            .on(
                "Summarize the following",
                "AI research is moving fast; machine learning and neural networks drive most \
                 applications. Questions: research-desk@example.com",
            )
            .on(
                "Format the following",
                "# Summary\n\nAI research is moving fast; machine learning and neural networks drive \
                 most applications.",
            ),
        Demo::Conditional => ScriptedLlm::new("mock-llm")
            .on("Answer the request briefly", "Use a managed database with read replicas.")
            .on(
                "Answer the request in detail",
                "1. Active-active regions\n2. Idempotent payment API\n3. Per-region ledgers with async reconciliation",
            )
            .on("architecture", "COMPLEX")
            .with_default("SIMPLE"),
        Demo::Hiking => ScriptedLlm::new("mock-llm")
            .on_tools(
                "suitable for hiking",
                vec![
                    ToolCall {
                        id: "call_weather".into(),
                        name: "get_weather".into(),
                        arguments: json!({ "city": input }),
                    },
                    ToolCall {
                        id: "call_temperature".into(),
                        name: "get_temperature".into(),
                        arguments: json!({ "city": input }),
                    },
                ],
            )
            .on(
                "25°C",
                "<think>Clear sky and mild temperature.</think>\nSunny and 25°C: a good day for hiking.",
            ),
    };
    Arc::new(llm)
}

// =============================================================================
// DOCUMENT DEMO
// =============================================================================
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    base: BaseState,
    pub content: String,
    pub topics: String,
    pub summary: String,
    pub formatted: String,
}

impl NodeState for DocumentState {
    fn base(&self) -> &BaseState {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseState {
        &mut self.base
    }
}

fn document_workflow(llm: Arc<dyn Llm>) -> Result<AgentWorkflow<DocumentState>> {
    let redaction = RegexGuardrail::new(
        "redaction",
        "Redact email addresses and API keys",
        vec![
            RegexRule::block(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+", "Email address in output"),
            RegexRule::block(r"sk-[a-z0-9]{8,}", "API key in output"),
        ],
    )?;

    let extractor = InstructionNode::new(
        "content extractor",
        AgentCore::new(llm.clone())
            .with_instruction("Extract the main topics from the following content."),
        |s: &DocumentState| s.content.clone(),
        |s: &mut DocumentState, reply| s.topics = reply,
    )
    .require_input()
    .share_as("topics");

    let summarizer = InstructionNode::new(
        "summarizer",
        AgentCore::new(llm.clone())
            .with_instruction("Summarize the following topics in one paragraph.")
            .with_use_context(false)
            .with_guardrail(Arc::new(redaction))?,
        |s: &DocumentState| s.topics.clone(),
        |s: &mut DocumentState, reply| s.summary = reply,
    );

    let formatter = InstructionNode::new(
        "formatter",
        AgentCore::new(llm)
            .with_instruction("Format the following summary as Markdown.")
            .with_use_context(false),
        |s: &DocumentState| s.summary.clone(),
        |s: &mut DocumentState, reply| s.formatted = reply,
    );

    let nodes: Vec<DynNode<DocumentState>> =
        vec![Arc::new(extractor), Arc::new(summarizer), Arc::new(formatter)];
    Ok(AgentWorkflow::new(nodes))
}

// =============================================================================
// CONDITIONAL DEMO
// =============================================================================
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    base: BaseState,
    pub request: String,
    pub complexity: String,
    pub answer: String,
}

impl NodeState for RequestState {
    fn base(&self) -> &BaseState {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseState {
        &mut self.base
    }
}

fn route_by_complexity(state: &RequestState) -> String {
    if state.has_error() {
        "error".to_string()
    } else if state.complexity.to_uppercase().contains("COMPLEX") {
        "complex".to_string()
    } else {
        "simple".to_string()
    }
}

fn conditional_workflow(llm: Arc<dyn Llm>) -> ConditionalWorkflow<RequestState> {
    let analyzer = InstructionNode::new(
        "analyzer",
        AgentCore::new(llm.clone())
            .with_instruction("Classify the request as SIMPLE or COMPLEX. Answer with one word."),
        |s: &RequestState| s.request.clone(),
        |s: &mut RequestState, reply| s.complexity = reply.trim().to_string(),
    )
    .require_input();

    let simple = InstructionNode::new(
        "simple processor",
        AgentCore::new(llm.clone()).with_instruction("Answer the request briefly."),
        |s: &RequestState| s.request.clone(),
        |s: &mut RequestState, reply| s.answer = reply,
    );

    let complex = InstructionNode::new(
        "complex processor",
        AgentCore::new(llm).with_instruction("Answer the request in detail, step by step."),
        |s: &RequestState| s.request.clone(),
        |s: &mut RequestState, reply| s.answer = reply,
    );

    let formatter = FnNode::sync("formatter", |mut s: RequestState| {
        s.answer = format!("[{}]\n{}", s.complexity.to_lowercase(), s.answer.trim());
        Ok(s)
    });

    let nodes: Vec<DynNode<RequestState>> = vec![
        Arc::new(analyzer),
        Arc::new(simple),
        Arc::new(complex),
        Arc::new(formatter),
    ];
    let edges = vec![
        (
            "analyzer".to_string(),
            ConditionalEdge::new(
                route_by_complexity,
                HashMap::from([
                    ("simple".to_string(), "simple_processor".to_string()),
                    ("complex".to_string(), "complex_processor".to_string()),
                    ("error".to_string(), END.to_string()),
                ]),
            ),
        ),
        (
            "simple_processor".to_string(),
            ConditionalWorkflow::error_check("formatter"),
        ),
    ];
    ConditionalWorkflow::new(nodes, edges)
}

// =============================================================================
// HIKING DEMO
// =============================================================================
#[derive(Debug, Clone, Default)]
pub struct HikingState {
    base: BaseState,
    pub city: String,
    pub check_result: String,
}

impl NodeState for HikingState {
    fn base(&self) -> &BaseState {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseState {
        &mut self.base
    }
}

fn hiking_prompt() -> PromptManager {
    let mut prompts = PromptManager::new(
        "hiking_check_prompt",
        "You decide whether the weather and temperature are suitable for hiking.\n\
         Answer based on the information you are given.\n\
         The city to check is {city}.",
    );
    prompts.set(
        "lmstudio",
        "/no_think You decide whether the weather and temperature are suitable for hiking.\n\
         Call the tools before answering.\n\
         The city to check is {city}.",
    );
    prompts
}

fn city_argument(args: &Value) -> String {
    args["city"].as_str().unwrap_or_default().to_string()
}

fn hiking_tools() -> [FunctionTool; 2] {
    let parameters = json!({
        "type": "object",
        "properties": { "city": { "type": "string", "description": "City name" } },
        "required": ["city"]
    });

    [
        FunctionTool::from_fn(
            "get_weather",
            "Return the weather for a city",
            parameters.clone(),
            |args| {
                tracing::debug!(city = %city_argument(&args), "Weather lookup");
                Ok(json!("Sunny"))
            },
        ),
        FunctionTool::from_fn(
            "get_temperature",
            "Return the temperature for a city",
            parameters,
            |args| {
                tracing::debug!(city = %city_argument(&args), "Temperature lookup");
                Ok(json!("25°C"))
            },
        ),
    ]
}

fn hiking_workflow(llm: Arc<dyn Llm>, city: &str) -> Result<AgentWorkflow<HikingState>> {
    let instruction = hiking_prompt()
        .render(llm.provider_name(), &HashMap::from([("city", city)]))
        .context("rendering hiking prompt")?;

    let mut core = AgentCore::new(llm).with_instruction(instruction);
    for tool in hiking_tools() {
        core.register_tool(Arc::new(tool))?;
    }

    let check = InstructionNode::new(
        "hiking check",
        core,
        |s: &HikingState| s.city.clone(),
        |s: &mut HikingState, reply| s.check_result = strip_think(&reply),
    )
    .with_mode(OutputMode::Tools)
    .with_validator(|s: &HikingState| {
        if s.city.trim().is_empty() {
            Err(NodeError::validation("city is not set"))
        } else {
            Ok(())
        }
    });

    let nodes: Vec<DynNode<HikingState>> = vec![Arc::new(check)];
    Ok(AgentWorkflow::new(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_document_demo_with_mock() {
        let demo = Demo::Document;
        let run = run(demo, mock_llm(demo, demo.default_input()), demo.default_input())
            .await
            .unwrap();

        assert_eq!(run.path, vec!["content_extractor", "summarizer", "formatter"]);
        assert!(run.error.is_none());
        assert!(run.output.starts_with("# Summary"));
    }

    #[tokio::test]
    async fn test_document_demo_rejects_empty_input() {
        let run = run(Demo::Document, mock_llm(Demo::Document, ""), "").await.unwrap();
        assert_eq!(run.path, vec!["content_extractor"]);
        assert!(run.error.unwrap().contains("is empty"));
    }

    #[tokio::test]
    async fn test_conditional_demo_routes_complex_request() {
        let demo = Demo::Conditional;
        let run = run(demo, mock_llm(demo, demo.default_input()), demo.default_input())
            .await
            .unwrap();

        assert_eq!(run.path, vec!["analyzer", "complex_processor", "formatter"]);
        assert!(run.output.starts_with("[complex]\n1. Active-active regions"));
    }

    #[tokio::test]
    async fn test_conditional_demo_routes_simple_request() {
        let input = "Which database should I use for a blog?";
        let run = run(Demo::Conditional, mock_llm(Demo::Conditional, input), input)
            .await
            .unwrap();

        assert_eq!(run.path, vec!["analyzer", "simple_processor", "formatter"]);
    }

    #[tokio::test]
    async fn test_hiking_demo_calls_tools() {
        let run = run(Demo::Hiking, mock_llm(Demo::Hiking, "Kyoto"), "Kyoto").await.unwrap();

        assert!(run.error.is_none());
        assert_eq!(run.output, "Sunny and 25°C: a good day for hiking.");
    }

    #[test]
    fn test_every_demo_renders() {
        for demo in [Demo::Document, Demo::Conditional, Demo::Hiking] {
            assert!(mermaid(demo).unwrap().starts_with("graph TD"));
        }
    }
}
