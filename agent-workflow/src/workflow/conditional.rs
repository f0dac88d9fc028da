use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{add_nodes, check_error, connect_sequential, error_routes, insert_node};
use crate::error::GraphError;
use crate::graph::{CompiledGraph, Router, StateGraph, DEFAULT_RECURSION_LIMIT, END};
use crate::node::DynNode;
use crate::state::NodeState;

/// Outgoing routing for one node of a [`ConditionalWorkflow`].
///
/// With both a condition and destinations the node routes by the condition.
/// With neither it falls back to the sequential error check. Any other
/// combination is reported as a warning and leaves the node without an
/// outgoing edge.
pub struct ConditionalEdge<S> {
    pub condition: Option<Router<S>>,
    pub destinations: HashMap<String, String>,
}

impl<S> ConditionalEdge<S> {
    pub fn new<F>(condition: F, destinations: HashMap<String, String>) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        Self {
            condition: Some(Arc::new(condition)),
            destinations,
        }
    }

    /// No condition and no destinations.
    pub fn sequential() -> Self {
        Self {
            condition: None,
            destinations: HashMap::new(),
        }
    }
}

impl<S> Clone for ConditionalEdge<S> {
    fn clone(&self) -> Self {
        Self {
            condition: self.condition.clone(),
            destinations: self.destinations.clone(),
        }
    }
}

/// Workflow whose nodes may branch on the state.
///
/// Nodes without an entry in the edge map are wired sequentially, exactly
/// like [`AgentWorkflow`](super::AgentWorkflow).
pub struct ConditionalWorkflow<S: NodeState> {
    nodes: Vec<DynNode<S>>,
    edges: Vec<(String, ConditionalEdge<S>)>,
    graph: StateGraph<S>,
    warnings: Vec<String>,
    recursion_limit: usize,
}

impl<S: NodeState> ConditionalWorkflow<S> {
    pub fn new(nodes: Vec<DynNode<S>>, edges: Vec<(String, ConditionalEdge<S>)>) -> Self {
        let mut workflow = Self {
            nodes,
            edges: Vec::new(),
            graph: StateGraph::new(),
            warnings: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        };
        for (source, edge) in edges {
            workflow.put_edge(source, edge);
        }
        workflow.setup();
        workflow
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self.setup();
        self
    }

    fn put_edge(&mut self, source: String, edge: ConditionalEdge<S>) {
        match self.edges.iter_mut().find(|(name, _)| *name == source) {
            Some(slot) => slot.1 = edge,
            None => self.edges.push((source, edge)),
        }
    }

    fn setup(&mut self) {
        let mut graph = StateGraph::new();
        graph.with_recursion_limit(self.recursion_limit);
        add_nodes(&mut graph, &self.nodes);

        let mut warnings = Vec::new();
        for (source, edge) in &self.edges {
            match (&edge.condition, edge.destinations.is_empty()) {
                (Some(condition), false) => {
                    let condition = Arc::clone(condition);
                    graph.add_conditional_edges(
                        source.clone(),
                        move |state: &S| condition(state),
                        edge.destinations.clone(),
                    );
                }
                (None, true) => match self.nodes.iter().position(|n| n.node_name() == *source) {
                    Some(index) => connect_sequential(&mut graph, &self.nodes, index),
                    None => warnings.push(format!("Node '{}' not found in nodes list", source)),
                },
                _ => warnings.push(format!(
                    "Invalid conditional edge specification for node '{}'",
                    source
                )),
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let name = node.node_name();
            if !self.edges.iter().any(|(source, _)| *source == name) {
                connect_sequential(&mut graph, &self.nodes, index);
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        debug!(
            nodes = self.nodes.len(),
            conditional = self.edges.len(),
            "Conditional workflow graph rebuilt"
        );
        self.graph = graph;
        self.warnings = warnings;
    }

    pub fn compile(&self) -> Result<CompiledGraph<S>, GraphError> {
        self.graph.compile()
    }

    pub fn app(&self) -> Result<CompiledGraph<S>, GraphError> {
        self.compile()
    }

    pub fn add_node(&mut self, node: DynNode<S>, after: Option<&str>) -> Result<(), GraphError> {
        insert_node(&mut self.nodes, node, after)?;
        self.setup();
        Ok(())
    }

    /// Route out of `source` by `condition`, replacing any previous routing
    /// for that node.
    pub fn add_conditional_edge<F>(
        &mut self,
        source: &str,
        condition: F,
        destinations: HashMap<String, String>,
    ) -> Result<(), GraphError>
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        if !self.nodes.iter().any(|n| n.node_name() == source) {
            return Err(GraphError::MissingSource(source.to_string()));
        }
        self.put_edge(source.to_string(), ConditionalEdge::new(condition, destinations));
        self.setup();
        Ok(())
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.node_name()).collect()
    }

    /// Problems found while wiring the edge map on the last rebuild.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Error-check routing to `next`, for use in edge maps.
    pub fn error_check(next: &str) -> ConditionalEdge<S> {
        ConditionalEdge::new(check_error::<S>, error_routes(next))
    }

    /// Route that always ends the run.
    pub fn terminal() -> ConditionalEdge<S> {
        ConditionalEdge::new(|_: &S| "end".to_string(), HashMap::from([("end".to_string(), END.to_string())]))
    }
}
