//! State-graph executor
//!
//! [`StateGraph`] collects nodes and edges; [`StateGraph::compile`] checks
//! the wiring and produces a [`CompiledGraph`] that runs one node at a time,
//! following direct edges or asking a router which branch to take.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::sync::Arc;
//! use agent_workflow::graph::{StateGraph, END};
//! use agent_workflow::node::FnNode;
//! use agent_workflow::{BaseState, NodeState};
//!
//! let mut graph = StateGraph::new();
//! graph
//!     .add_node("greet", Arc::new(FnNode::sync("greet", |mut s: BaseState| {
//!         s.add_to_context("greeting", "hello");
//!         Ok(s)
//!     })))
//!     .set_entry_point("greet")
//!     .add_edge("greet", END);
//!
//! let app = graph.compile().unwrap();
//! let state = app.invoke(BaseState::default()).await.unwrap();
//! assert_eq!(state.get_from_context("greeting"), Some("hello"));
//! # }
//! ```

mod mermaid;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::GraphError;
use crate::node::DynNode;
use crate::state::NodeState;

/// Virtual node preceding the entry point.
pub const START: &str = "__start__";
/// Virtual node that terminates a run.
pub const END: &str = "__end__";
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Picks a branch key from the state.
pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

pub(crate) enum Edge<S> {
    Direct(String),
    Conditional {
        router: Router<S>,
        destinations: HashMap<String, String>,
    },
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Direct(to) => Edge::Direct(to.clone()),
            Edge::Conditional {
                router,
                destinations,
            } => Edge::Conditional {
                router: Arc::clone(router),
                destinations: destinations.clone(),
            },
        }
    }
}

/// Graph under construction.
pub struct StateGraph<S: NodeState> {
    nodes: Vec<(String, DynNode<S>)>,
    edges: Vec<(String, Edge<S>)>,
    entry_point: Option<String>,
    recursion_limit: usize,
}

impl<S: NodeState> Default for StateGraph<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            entry_point: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl<S: NodeState> StateGraph<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: DynNode<S>) -> &mut Self {
        self.nodes.push((name.into(), node));
        self
    }

    pub fn set_entry_point(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry_point = Some(name.into());
        self
    }

    /// Unconditional edge. An edge out of [`START`] sets the entry point.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let from = from.into();
        let to = to.into();
        if from == START {
            self.entry_point = Some(to);
        } else {
            self.edges.push((from, Edge::Direct(to)));
        }
        self
    }

    /// Route out of `from` by the key `router` returns; `destinations` maps
    /// keys to node names or [`END`].
    pub fn add_conditional_edges<F>(
        &mut self,
        from: impl Into<String>,
        router: F,
        destinations: HashMap<String, String>,
    ) -> &mut Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.edges.push((
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                destinations,
            },
        ));
        self
    }

    pub fn with_recursion_limit(&mut self, limit: usize) -> &mut Self {
        self.recursion_limit = limit;
        self
    }

    /// Check the wiring and freeze the graph.
    pub fn compile(&self) -> Result<CompiledGraph<S>, GraphError> {
        let mut nodes = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for (name, node) in &self.nodes {
            if name == START || name == END {
                return Err(GraphError::ReservedName(name.clone()));
            }
            if nodes.insert(name.clone(), Arc::clone(node)).is_some() {
                return Err(GraphError::DuplicateNode(name.clone()));
            }
            order.push(name.clone());
        }

        let entry_point = self.entry_point.clone().ok_or(GraphError::NoEntryPoint)?;
        if !nodes.contains_key(&entry_point) {
            return Err(GraphError::UnknownNode(entry_point));
        }

        let known = |target: &str| target == END || nodes.contains_key(target);
        let mut edges = HashMap::new();
        let mut seen = HashSet::new();
        for (from, edge) in &self.edges {
            if !nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            if !seen.insert(from.clone()) {
                return Err(GraphError::DuplicateEdges(from.clone()));
            }
            match edge {
                Edge::Direct(to) if !known(to) => return Err(GraphError::UnknownNode(to.clone())),
                Edge::Conditional { destinations, .. } => {
                    if let Some(target) = destinations.values().find(|target| !known(target)) {
                        return Err(GraphError::UnknownNode(target.clone()));
                    }
                }
                _ => {}
            }
            edges.insert(from.clone(), edge.clone());
        }

        Ok(CompiledGraph {
            nodes,
            order,
            edges,
            entry_point,
            recursion_limit: self.recursion_limit,
        })
    }
}

/// Final state of a run plus the nodes it visited.
#[derive(Debug, Clone)]
pub struct GraphRun<S> {
    pub state: S,
    pub path: Vec<String>,
    pub steps: usize,
}

/// Executable graph.
pub struct CompiledGraph<S: NodeState> {
    nodes: HashMap<String, DynNode<S>>,
    order: Vec<String>,
    edges: HashMap<String, Edge<S>>,
    entry_point: String,
    recursion_limit: usize,
}

impl<S: NodeState> CompiledGraph<S> {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Run to completion and return the final state.
    pub async fn invoke(&self, state: S) -> Result<S, GraphError> {
        Ok(self.run(state).await?.state)
    }

    /// Run to completion, recording the visited nodes.
    ///
    /// A node without an outgoing edge ends the run, as does reaching
    /// [`END`]. Exceeding the recursion limit is an error.
    pub async fn run(&self, state: S) -> Result<GraphRun<S>, GraphError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("graph_run", run_id = %run_id, entry = %self.entry_point);
        self.run_inner(state).instrument(span).await
    }

    async fn run_inner(&self, mut state: S) -> Result<GraphRun<S>, GraphError> {
        let mut current = self.entry_point.clone();
        let mut path = Vec::new();

        loop {
            if path.len() >= self.recursion_limit {
                return Err(GraphError::RecursionLimit(self.recursion_limit));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;
            state = node.action(state).await;
            path.push(current.clone());

            let next = match self.edges.get(&current) {
                None => {
                    debug!(node = %current, "No outgoing edge, stopping");
                    break;
                }
                Some(Edge::Direct(to)) => to.clone(),
                Some(Edge::Conditional {
                    router,
                    destinations,
                }) => {
                    let branch = router(&state);
                    debug!(node = %current, branch = %branch, "Routing");
                    destinations
                        .get(&branch)
                        .cloned()
                        .ok_or_else(|| GraphError::UnknownBranch {
                            node: current.clone(),
                            branch,
                        })?
                }
            };

            if next == END {
                break;
            }
            current = next;
        }

        info!(steps = path.len(), "Graph run finished");
        Ok(GraphRun {
            state,
            steps: path.len(),
            path,
        })
    }

    /// Mermaid flowchart of the graph.
    pub fn to_mermaid(&self) -> String {
        mermaid::render(&self.order, &self.entry_point, &self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;
    use crate::node::FnNode;
    use crate::state::BaseState;

    fn counter(name: &str) -> DynNode<BaseState> {
        let key = name.to_string();
        Arc::new(FnNode::sync(name, move |mut state: BaseState| {
            let visits: u32 = state.get_from_context_or("visits", "0").parse().unwrap_or(0);
            state.add_to_context("visits", (visits + 1).to_string());
            state.add_to_context("last", key.clone());
            Ok(state)
        }))
    }

    fn failing(name: &str) -> DynNode<BaseState> {
        Arc::new(FnNode::sync(name, |_state: BaseState| Err(NodeError::other("broken"))))
    }

    fn routes(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_linear_run() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", counter("a"))
            .add_node("b", counter("b"))
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END);

        let run = graph.compile().unwrap().run(BaseState::default()).await.unwrap();

        assert_eq!(run.path, vec!["a", "b"]);
        assert_eq!(run.steps, 2);
        assert_eq!(run.state.get_from_context("visits"), Some("2"));
    }

    #[tokio::test]
    async fn test_conditional_routing() {
        let mut graph = StateGraph::new();
        graph
            .add_node("check", failing("check"))
            .add_node("recover", counter("recover"))
            .set_entry_point("check")
            .add_conditional_edges(
                "check",
                |s: &BaseState| if s.has_error() { "bad".into() } else { "good".into() },
                routes(&[("bad", "recover"), ("good", END)]),
            );

        let run = graph.compile().unwrap().run(BaseState::default()).await.unwrap();
        assert_eq!(run.path, vec!["check", "recover"]);
        assert_eq!(run.state.get_from_context("last"), Some("recover"));
    }

    #[tokio::test]
    async fn test_node_without_edge_ends_run() {
        let mut graph = StateGraph::new();
        graph.add_node("only", counter("only")).set_entry_point("only");

        let run = graph.compile().unwrap().run(BaseState::default()).await.unwrap();
        assert_eq!(run.path, vec!["only"]);
    }

    #[tokio::test]
    async fn test_unknown_branch() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", counter("a"))
            .set_entry_point("a")
            .add_conditional_edges("a", |_: &BaseState| "sideways".into(), routes(&[("next", END)]));

        let err = graph.compile().unwrap().invoke(BaseState::default()).await.unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownBranch {
                node: "a".into(),
                branch: "sideways".into()
            }
        );
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let mut graph = StateGraph::new();
        graph
            .add_node("loop", counter("loop"))
            .set_entry_point("loop")
            .add_edge("loop", "loop")
            .with_recursion_limit(5);

        let err = graph.compile().unwrap().invoke(BaseState::default()).await.unwrap_err();
        assert_eq!(err, GraphError::RecursionLimit(5));
    }

    #[test]
    fn test_compile_errors() {
        let mut graph: StateGraph<BaseState> = StateGraph::new();
        graph.add_node("a", counter("a"));
        assert_eq!(graph.compile().err(), Some(GraphError::NoEntryPoint));

        graph.set_entry_point("missing");
        assert_eq!(graph.compile().err(), Some(GraphError::UnknownNode("missing".into())));

        graph.set_entry_point("a").add_edge("a", "ghost");
        assert_eq!(graph.compile().err(), Some(GraphError::UnknownNode("ghost".into())));

        let mut dup: StateGraph<BaseState> = StateGraph::new();
        dup.add_node("a", counter("a")).add_node("a", counter("a")).set_entry_point("a");
        assert_eq!(dup.compile().err(), Some(GraphError::DuplicateNode("a".into())));

        let mut twice: StateGraph<BaseState> = StateGraph::new();
        twice
            .add_node("a", counter("a"))
            .set_entry_point("a")
            .add_edge("a", END)
            .add_edge("a", END);
        assert_eq!(twice.compile().err(), Some(GraphError::DuplicateEdges("a".into())));

        let mut reserved: StateGraph<BaseState> = StateGraph::new();
        reserved.add_node(END, counter("x")).set_entry_point(END);
        assert_eq!(reserved.compile().err(), Some(GraphError::ReservedName(END.into())));
    }
}
