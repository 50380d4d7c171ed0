//! Graph diffing by stable identity.

use std::collections::HashMap;

use crate::{Edge, EdgeDiffs, Graph, Node, NodeDiffs, Transaction};

/// Compare two graph snapshots, keyed on node/edge ids.
///
/// Ephemeral UI fields are stripped before comparison, so selection and drag
/// churn never registers as a change. Returns `None` when the graphs are
/// equivalent. Output is sorted by id, making the function deterministic for
/// a given input pair. Pure: no side effects, no clocks.
pub fn diff_graphs(old: &Graph, new: &Graph) -> Option<(NodeDiffs, EdgeDiffs)> {
    let old = old.stripped();
    let new = new.stripped();

    let old_nodes: HashMap<&str, &Node> = old.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let new_nodes: HashMap<&str, &Node> = new.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut node_diffs = NodeDiffs::default();
    for node in &new.nodes {
        match old_nodes.get(node.id.as_str()) {
            None => node_diffs.added.push(node.clone()),
            Some(prev) if **prev != *node => node_diffs.updated.push(node.clone()),
            Some(_) => {}
        }
    }
    for node in &old.nodes {
        if !new_nodes.contains_key(node.id.as_str()) {
            node_diffs.removed.push(node.id.clone());
        }
    }
    node_diffs.added.sort_by(|a, b| a.id.cmp(&b.id));
    node_diffs.updated.sort_by(|a, b| a.id.cmp(&b.id));
    node_diffs.removed.sort();

    let old_edges: HashMap<&str, &Edge> = old.edges.iter().map(|e| (e.id.as_str(), e)).collect();
    let new_edges: HashMap<&str, &Edge> = new.edges.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut edge_diffs = EdgeDiffs::default();
    for edge in &new.edges {
        match old_edges.get(edge.id.as_str()) {
            None => edge_diffs.added.push(edge.clone()),
            Some(prev) if **prev != *edge => edge_diffs.updated.push(edge.clone()),
            Some(_) => {}
        }
    }
    for edge in &old.edges {
        if !new_edges.contains_key(edge.id.as_str()) {
            edge_diffs.removed.push(edge.id.clone());
        }
    }
    edge_diffs.added.sort_by(|a, b| a.id.cmp(&b.id));
    edge_diffs.updated.sort_by(|a, b| a.id.cmp(&b.id));
    edge_diffs.removed.sort();

    if node_diffs.is_empty() && edge_diffs.is_empty() {
        None
    } else {
        Some((node_diffs, edge_diffs))
    }
}

/// Wrap a non-empty diff in a freshly-identified transaction.
pub fn diff_transaction(old: &Graph, new: &Graph) -> Option<Transaction> {
    diff_graphs(old, new).map(|(nodes, edges)| Transaction::new(nodes, edges))
}
