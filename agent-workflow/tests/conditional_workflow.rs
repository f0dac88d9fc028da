//! Conditional routing driven by a model's classification.

use std::collections::HashMap;
use std::sync::Arc;

use agent_workflow::llm::ScriptedLlm;
use agent_workflow::node::{AgentCore, DynNode, FnNode, InstructionNode};
use agent_workflow::{BaseState, ConditionalEdge, ConditionalWorkflow, GraphError, NodeState, END};

#[derive(Debug, Clone, Default)]
struct TicketState {
    base: BaseState,
    text: String,
    complexity: String,
    answer: String,
}

impl NodeState for TicketState {
    fn base(&self) -> &BaseState {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseState {
        &mut self.base
    }
}

fn route(state: &TicketState) -> String {
    if state.has_error() {
        "error".into()
    } else if state.complexity.trim().eq_ignore_ascii_case("complex") {
        "complex".into()
    } else {
        "simple".into()
    }
}

fn ticket_workflow(llm: Arc<ScriptedLlm>) -> ConditionalWorkflow<TicketState> {
    let analyzer = InstructionNode::new(
        "analyzer",
        AgentCore::new(llm.clone()).with_instruction("Classify the ticket as simple or complex."),
        |s: &TicketState| s.text.clone(),
        |s: &mut TicketState, reply| s.complexity = reply,
    );
    let simple = InstructionNode::new(
        "simple processor",
        AgentCore::new(llm.clone()).with_instruction("Answer briefly."),
        |s: &TicketState| s.text.clone(),
        |s: &mut TicketState, reply| s.answer = reply,
    );
    let complex = InstructionNode::new(
        "complex processor",
        AgentCore::new(llm).with_instruction("Answer step by step."),
        |s: &TicketState| s.text.clone(),
        |s: &mut TicketState, reply| s.answer = reply,
    );
    let formatter = FnNode::sync("formatter", |mut s: TicketState| {
        s.answer = format!("[{}] {}", s.complexity.trim(), s.answer);
        Ok(s)
    });

    let nodes: Vec<DynNode<TicketState>> = vec![
        Arc::new(analyzer),
        Arc::new(simple),
        Arc::new(complex),
        Arc::new(formatter),
    ];
    let edges = vec![
        (
            "analyzer".to_string(),
            ConditionalEdge::new(
                route,
                HashMap::from([
                    ("simple".to_string(), "simple_processor".to_string()),
                    ("complex".to_string(), "complex_processor".to_string()),
                    ("error".to_string(), END.to_string()),
                ]),
            ),
        ),
        ("simple_processor".to_string(), ConditionalWorkflow::error_check("formatter")),
    ];
    ConditionalWorkflow::new(nodes, edges)
}

fn ticket(text: &str) -> TicketState {
    TicketState {
        text: text.into(),
        ..Default::default()
    }
}

fn scripted() -> Arc<ScriptedLlm> {
    Arc::new(
        ScriptedLlm::new("scripted")
            .on("Classify the ticket as simple or complex.\n\nInput:\nreset password", "simple")
            .on("Classify the ticket", "complex")
            .on("Answer briefly.", "Use the reset link.")
            .on("Answer step by step.", "1. Export data 2. Migrate"),
    )
}

#[tokio::test]
async fn test_simple_ticket_takes_short_path() {
    let app = ticket_workflow(scripted()).compile().unwrap();
    let run = app.run(ticket("reset password")).await.unwrap();

    assert_eq!(run.path, vec!["analyzer", "simple_processor", "formatter"]);
    assert_eq!(run.state.answer, "[simple] Use the reset link.");
}

#[tokio::test]
async fn test_complex_ticket_takes_long_path() {
    let app = ticket_workflow(scripted()).compile().unwrap();
    let run = app.run(ticket("migrate the cluster")).await.unwrap();

    assert_eq!(run.path, vec!["analyzer", "complex_processor", "formatter"]);
    assert_eq!(run.state.answer, "[complex] 1. Export data 2. Migrate");
}

#[tokio::test]
async fn test_analyzer_error_routes_to_end() {
    let llm = Arc::new(ScriptedLlm::new("scripted").fail_on("Classify", "model offline"));
    let run = ticket_workflow(llm).compile().unwrap().run(ticket("anything")).await.unwrap();

    assert_eq!(run.path, vec!["analyzer"]);
    assert!(run.state.error().contains("model offline"));
}

#[tokio::test]
async fn test_retry_loop_hits_recursion_limit() {
    let again = FnNode::sync("again", |s: BaseState| Ok(s));
    let workflow = ConditionalWorkflow::new(
        vec![Arc::new(again) as DynNode<BaseState>],
        vec![(
            "again".to_string(),
            ConditionalEdge::new(
                |_: &BaseState| "retry".to_string(),
                HashMap::from([("retry".to_string(), "again".to_string())]),
            ),
        )],
    )
    .with_recursion_limit(4);

    let err = workflow.compile().unwrap().invoke(BaseState::default()).await.unwrap_err();
    assert_eq!(err, GraphError::RecursionLimit(4));
}

#[test]
fn test_unknown_destination_rejected_at_compile() {
    let mut workflow = ticket_workflow(scripted());
    workflow
        .add_conditional_edge(
            "formatter",
            |_: &TicketState| "next".to_string(),
            HashMap::from([("next".to_string(), "archiver".to_string())]),
        )
        .unwrap();

    assert_eq!(
        workflow.compile().err(),
        Some(GraphError::UnknownNode("archiver".to_string()))
    );
}

#[test]
fn test_mermaid_shows_branches() {
    let mermaid = ticket_workflow(scripted()).compile().unwrap().to_mermaid();

    assert!(mermaid.contains("analyzer -->|complex| complex_processor"));
    assert!(mermaid.contains("analyzer -->|simple| simple_processor"));
    assert!(mermaid.contains("complex_processor -->|continue| formatter"));
    assert!(mermaid.contains("formatter --> __end__"));
}
