//! Sequential and conditional workflows over [`StateGraph`].
//!
//! An [`AgentWorkflow`] runs its nodes in order. Between consecutive nodes it
//! routes through [`check_error`]: a state carrying an error goes straight to
//! [`END`], anything else continues to the next node.
//!
//! ```text
//! START -> extract -(continue)-> summarize -(continue)-> format -> END
//!             |                      |
//!          (error)                (error)
//!             v                      v
//!            END                    END
//! ```

mod conditional;

pub use self::conditional::{ConditionalEdge, ConditionalWorkflow};

use std::collections::HashMap;

use tracing::{debug, error};

use crate::error::GraphError;
use crate::graph::{CompiledGraph, StateGraph, DEFAULT_RECURSION_LIMIT, END};
use crate::node::DynNode;
use crate::state::NodeState;

/// Branch taken when the state carries an error.
pub const ERROR_BRANCH: &str = "error";
/// Branch taken when the state is healthy.
pub const CONTINUE_BRANCH: &str = "continue";

/// Router used between consecutive nodes.
pub fn check_error<S: NodeState>(state: &S) -> String {
    if state.has_error() {
        error!(error = %state.error(), "Workflow error");
        ERROR_BRANCH.to_string()
    } else {
        CONTINUE_BRANCH.to_string()
    }
}

/// `error -> END`, `continue -> next`.
pub(crate) fn error_routes(next: &str) -> HashMap<String, String> {
    HashMap::from([
        (ERROR_BRANCH.to_string(), END.to_string()),
        (CONTINUE_BRANCH.to_string(), next.to_string()),
    ])
}

/// Wire `nodes[index]` to its successor through [`check_error`], or to END
/// when it is the last node.
pub(crate) fn connect_sequential<S: NodeState>(graph: &mut StateGraph<S>, nodes: &[DynNode<S>], index: usize) {
    let name = nodes[index].node_name();
    match nodes.get(index + 1) {
        Some(next) => {
            graph.add_conditional_edges(name, check_error::<S>, error_routes(&next.node_name()));
        }
        None => {
            graph.add_edge(name, END);
        }
    }
}

pub(crate) fn add_nodes<S: NodeState>(graph: &mut StateGraph<S>, nodes: &[DynNode<S>]) {
    for node in nodes {
        graph.add_node(node.node_name(), node.clone());
    }
    if let Some(first) = nodes.first() {
        graph.set_entry_point(first.node_name());
    }
}

/// Insert `node` after the node named `after`, or append it.
pub(crate) fn insert_node<S: NodeState>(
    nodes: &mut Vec<DynNode<S>>,
    node: DynNode<S>,
    after: Option<&str>,
) -> Result<(), GraphError> {
    let name = node.node_name();
    if nodes.iter().any(|n| n.node_name() == name) {
        return Err(GraphError::DuplicateNode(name));
    }

    match after {
        Some(after) => {
            let index = nodes
                .iter()
                .position(|n| n.node_name() == after)
                .ok_or_else(|| GraphError::MissingNode(after.to_string()))?;
            nodes.insert(index + 1, node);
        }
        None => nodes.push(node),
    }
    Ok(())
}

/// Nodes run in sequence, stopping at the first error.
pub struct AgentWorkflow<S: NodeState> {
    nodes: Vec<DynNode<S>>,
    graph: StateGraph<S>,
    recursion_limit: usize,
}

impl<S: NodeState> AgentWorkflow<S> {
    pub fn new(nodes: Vec<DynNode<S>>) -> Self {
        let mut workflow = Self {
            nodes,
            graph: StateGraph::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        };
        workflow.setup();
        workflow
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self.setup();
        self
    }

    fn setup(&mut self) {
        let mut graph = StateGraph::new();
        graph.with_recursion_limit(self.recursion_limit);
        add_nodes(&mut graph, &self.nodes);
        for index in 0..self.nodes.len() {
            connect_sequential(&mut graph, &self.nodes, index);
        }
        debug!(nodes = self.nodes.len(), "Workflow graph rebuilt");
        self.graph = graph;
    }

    /// Compile the current graph. Fails with [`GraphError::NoEntryPoint`]
    /// when the workflow has no nodes.
    pub fn compile(&self) -> Result<CompiledGraph<S>, GraphError> {
        self.graph.compile()
    }

    /// Alias for [`compile`](Self::compile).
    pub fn app(&self) -> Result<CompiledGraph<S>, GraphError> {
        self.compile()
    }

    /// Add a node after the node named `after`, or at the end, and rebuild.
    pub fn add_node(&mut self, node: DynNode<S>, after: Option<&str>) -> Result<(), GraphError> {
        insert_node(&mut self.nodes, node, after)?;
        self.setup();
        Ok(())
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.node_name()).collect()
    }

    pub fn nodes(&self) -> &[DynNode<S>] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::NodeError;
    use crate::node::FnNode;
    use crate::state::BaseState;

    fn stamp(name: &str) -> DynNode<BaseState> {
        let key = name.to_string();
        Arc::new(FnNode::sync(name, move |mut s: BaseState| {
            let trail = s.get_from_context_or("trail", "");
            s.add_to_context("trail", format!("{}{};", trail, key));
            Ok(s)
        }))
    }

    fn broken(name: &str) -> DynNode<BaseState> {
        Arc::new(FnNode::sync(name, |_: BaseState| Err(NodeError::other("no data"))))
    }

    #[test]
    fn test_check_error() {
        assert_eq!(check_error(&BaseState::default()), "continue");
        assert_eq!(check_error(&BaseState::default().emit_error("x")), "error");
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let workflow = AgentWorkflow::new(vec![stamp("a"), stamp("b"), stamp("c")]);
        let run = workflow.compile().unwrap().run(BaseState::default()).await.unwrap();

        assert_eq!(run.path, vec!["a", "b", "c"]);
        assert_eq!(run.state.get_from_context("trail"), Some("a;b;c;"));
    }

    #[tokio::test]
    async fn test_error_short_circuits() {
        let workflow = AgentWorkflow::new(vec![stamp("a"), broken("b"), stamp("c")]);
        let run = workflow.app().unwrap().run(BaseState::default()).await.unwrap();

        assert_eq!(run.path, vec!["a", "b"]);
        assert_eq!(run.state.error(), "An error occurred in node 'b': no data");
        assert_eq!(run.state.get_from_context("trail"), Some("a;"));
    }

    #[test]
    fn test_empty_workflow_fails_to_compile() {
        let workflow: AgentWorkflow<BaseState> = AgentWorkflow::new(Vec::new());
        assert_eq!(workflow.compile().err(), Some(GraphError::NoEntryPoint));
    }

    #[test]
    fn test_node_names_use_underscores() {
        let workflow = AgentWorkflow::new(vec![stamp("load file"), stamp("parse")]);
        assert_eq!(workflow.node_names(), vec!["load_file", "parse"]);
    }

    #[tokio::test]
    async fn test_add_node_after_and_append() {
        let mut workflow = AgentWorkflow::new(vec![stamp("a"), stamp("c")]);
        workflow.add_node(stamp("b"), Some("a")).unwrap();
        workflow.add_node(stamp("d"), None).unwrap();
        assert_eq!(workflow.node_names(), vec!["a", "b", "c", "d"]);

        let state = workflow.compile().unwrap().invoke(BaseState::default()).await.unwrap();
        assert_eq!(state.get_from_context("trail"), Some("a;b;c;d;"));
    }

    #[test]
    fn test_add_node_rejections() {
        let mut workflow = AgentWorkflow::new(vec![stamp("a")]);

        let err = workflow.add_node(stamp("a"), None).unwrap_err();
        assert_eq!(err.to_string(), "Node with name 'a' already exists");

        let err = workflow.add_node(stamp("b"), Some("zzz")).unwrap_err();
        assert_eq!(err.to_string(), "Node with name 'zzz' does not exist");
        assert_eq!(workflow.node_names(), vec!["a"]);
    }
}
