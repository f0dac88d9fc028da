//! Mermaid rendering for compiled graphs.
//!
//! ```text
//! graph TD
//!     __start__([START])
//!     extract[extract]
//!     summarize[summarize]
//!     __end__([END])
//!
//!     __start__ --> extract
//!     extract -->|continue| summarize
//!     extract -->|error| __end__
//!     summarize --> __end__
//! ```

use std::collections::HashMap;
use std::fmt::Write;

use super::{Edge, END, START};

pub(super) fn render<S>(order: &[String], entry_point: &str, edges: &HashMap<String, Edge<S>>) -> String {
    let mut output = String::from("graph TD\n");

    let _ = writeln!(output, "    {}([START])", START);
    for name in order {
        let _ = writeln!(output, "    {}[{}]", name, name);
    }
    let _ = writeln!(output, "    {}([END])", END);
    output.push('\n');

    let _ = writeln!(output, "    {} --> {}", START, entry_point);
    for name in order {
        match edges.get(name) {
            Some(Edge::Direct(to)) => {
                let _ = writeln!(output, "    {} --> {}", name, to);
            }
            Some(Edge::Conditional { destinations, .. }) => {
                let mut branches: Vec<_> = destinations.iter().collect();
                branches.sort();
                for (branch, to) in branches {
                    let _ = writeln!(output, "    {} -->|{}| {}", name, branch, to);
                }
            }
            None => {}
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::StateGraph;
    use super::*;
    use crate::node::FnNode;
    use crate::state::BaseState;

    #[test]
    fn test_render_sequential_with_error_edges() {
        let noop = |name: &str| Arc::new(FnNode::sync(name, |s: BaseState| Ok(s)));

        let mut graph: StateGraph<BaseState> = StateGraph::new();
        graph
            .add_node("extract", noop("extract"))
            .add_node("summarize", noop("summarize"))
            .set_entry_point("extract")
            .add_conditional_edges(
                "extract",
                |_: &BaseState| "continue".into(),
                HashMap::from([
                    ("continue".to_string(), "summarize".to_string()),
                    ("error".to_string(), END.to_string()),
                ]),
            )
            .add_edge("summarize", END);

        let mermaid = graph.compile().unwrap().to_mermaid();

        assert!(mermaid.starts_with("graph TD\n"));
        assert!(mermaid.contains("    __start__ --> extract\n"));
        assert!(mermaid.contains("    extract -->|continue| summarize\n    extract -->|error| __end__\n"));
        assert!(mermaid.contains("    summarize --> __end__\n"));
    }
}
