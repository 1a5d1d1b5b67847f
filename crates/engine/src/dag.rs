//! Topological ordering of a workflow graph.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Connections whose source or target is not a node of the workflow are
//!    ignored.
//! 3. The directed graph must be acyclic; a self-loop counts as a cycle.
//!
//! Nodes without any ordering constraint between them keep their input
//! order, so re-running an unchanged graph yields the same sequence.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::models::{Connection, NodeDefinition};
use crate::EngineError;

/// Return the nodes in an order where every connection's source precedes
/// its target.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn topological_sort<'a>(
    nodes: &'a [NodeDefinition],
    connections: &[Connection],
) -> Result<Vec<&'a NodeDefinition>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    if connections.is_empty() {
        return Ok(nodes.iter().collect());
    }

    // -----------------------------------------------------------------------
    // 2. Build adjacency over known endpoints
    // -----------------------------------------------------------------------
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

    for conn in connections {
        let (Some(&from), Some(&to)) = (
            index.get(conn.from_node_id.as_str()),
            index.get(conn.to_node_id.as_str()),
        ) else {
            debug!(from = %conn.from_node_id, to = %conn.to_node_id, "ignoring connection to unknown node");
            continue;
        };
        // Parallel connections on different ports order the same pair once.
        if seen_edges.insert((from, to)) {
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
    }

    // -----------------------------------------------------------------------
    // 3. Kahn's algorithm, always releasing the earliest ready node
    // -----------------------------------------------------------------------
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted: Vec<&NodeDefinition> = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_first() {
        sorted.push(&nodes[i]);
        for &next in &adjacency[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

/// Node ids in execution order.
pub fn execution_order(
    nodes: &[NodeDefinition],
    connections: &[Connection],
) -> Result<Vec<String>, EngineError> {
    Ok(topological_sort(nodes, connections)?
        .into_iter()
        .map(|n| n.id.clone())
        .collect())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn make_node(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, "MANUAL_TRIGGER", Value::Null)
    }

    fn nodes(ids: &[&str]) -> Vec<NodeDefinition> {
        ids.iter().map(|id| make_node(id)).collect()
    }

    fn edge(from: &str, to: &str) -> Connection {
        Connection::new(from, to)
    }

    /// Every connection between known nodes is respected by `order`.
    fn respects_edges(order: &[String], connections: &[Connection]) -> bool {
        let pos = |id: &str| order.iter().position(|o| o == id);
        connections.iter().all(|c| match (pos(&c.from_node_id), pos(&c.to_node_id)) {
            (Some(a), Some(b)) => a < b,
            _ => true,
        })
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // C → B → A, declared in reverse.
        let sorted = execution_order(
            &nodes(&["a", "b", "c"]),
            &[edge("c", "b"), edge("b", "a")],
        )
        .expect("should be valid");
        assert_eq!(sorted, vec!["c", "b", "a"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let conns = [edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")];
        let sorted = execution_order(&nodes(&["d", "c", "b", "a"]), &conns).expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        // B and C are unconstrained, so input order (c before b) wins.
        assert_eq!(sorted, vec!["a", "c", "b", "d"]);
        assert!(respects_edges(&sorted, &conns));
    }

    #[test]
    fn no_connections_keeps_input_order() {
        let sorted = execution_order(&nodes(&["z", "a", "m"]), &[]).unwrap();
        assert_eq!(sorted, vec!["z", "a", "m"]);
    }

    #[test]
    fn isolated_nodes_are_included() {
        let sorted = execution_order(&nodes(&["solo", "a", "b"]), &[edge("a", "b")]).unwrap();
        assert_eq!(sorted, vec!["solo", "a", "b"]);
    }

    #[test]
    fn connections_to_unknown_nodes_are_ignored() {
        let sorted = execution_order(
            &nodes(&["a", "b"]),
            &[edge("a", "b"), edge("b", "ghost"), edge("ghost", "a")],
        )
        .unwrap();
        assert_eq!(sorted, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        assert!(matches!(
            execution_order(&nodes(&["a", "a"]), &[]),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A  (cycle!)
        let result = execution_order(
            &nodes(&["a", "b", "c", "free"]),
            &[edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(result, Err(EngineError::CycleDetected)));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let result = execution_order(&nodes(&["a"]), &[edge("a", "a")]);
        assert!(matches!(result, Err(EngineError::CycleDetected)));
    }

    #[test]
    fn parallel_port_connections_are_ordered_once() {
        let mut second = edge("a", "b");
        second.from_output = "alt".into();
        let sorted = execution_order(&nodes(&["b", "a"]), &[edge("a", "b"), second]).unwrap();
        assert_eq!(sorted, vec!["a", "b"]);
    }

    #[test]
    fn layered_graph_respects_every_edge() {
        let ids = ["n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7"];
        let conns: Vec<Connection> = (0..ids.len())
            .flat_map(|i| ((i + 1)..ids.len()).map(move |j| (i, j)))
            .filter(|(i, j)| (i * 7 + j * 3) % 4 == 0)
            .map(|(i, j)| edge(ids[j], ids[i]))
            .collect();

        let sorted = execution_order(&nodes(&ids), &conns).unwrap();
        assert_eq!(sorted.len(), ids.len());
        assert!(respects_edges(&sorted, &conns));
    }
}
