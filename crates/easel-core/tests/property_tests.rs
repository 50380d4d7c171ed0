//! Property tests for the diff and merge engines.

use std::collections::BTreeMap;

use easel_core::merge::MergeOutcome;
use easel_core::{
    diff_transaction, merge_states, CanvasState, Edge, EdgeDiffs, Graph, Node, NodeDiffs,
    Position, Transaction,
};
use proptest::prelude::*;

fn arb_graph() -> impl Strategy<Value = Graph> {
    let nodes = prop::collection::btree_map(
        0u8..8,
        ((-50i16..50), (-50i16..50), prop::bool::ANY),
        0..6,
    );
    let edges = prop::collection::btree_map(0u8..8, (0u8..8, 0u8..8), 0..4);

    (nodes, edges).prop_map(|(nodes, edges)| {
        let nodes: Vec<Node> = nodes
            .into_iter()
            .map(|(id, (x, y, flagged))| {
                let mut node = Node::new(format!("n{id}"), "note");
                node.position = Position {
                    x: f64::from(x),
                    y: f64::from(y),
                };
                if flagged {
                    node.data = serde_json::json!({ "flagged": true });
                }
                node
            })
            .collect();
        let edges: Vec<Edge> = edges
            .into_iter()
            .map(|(id, (s, t))| Edge::new(format!("e{id}"), format!("n{s}"), format!("n{t}")))
            .collect();
        Graph::new(nodes, edges)
    })
}

fn by_id(graph: &Graph) -> (BTreeMap<String, Node>, BTreeMap<String, Edge>) {
    (
        graph
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.stripped()))
            .collect(),
        graph
            .edges
            .iter()
            .map(|e| (e.id.clone(), e.stripped()))
            .collect(),
    )
}

fn tx_adding(node_id: &str, offset_secs: i64) -> Transaction {
    let mut tx = Transaction::new(
        NodeDiffs {
            added: vec![Node::new(node_id, "note")],
            ..Default::default()
        },
        EdgeDiffs::default(),
    );
    tx.created_at = tx.created_at + chrono::Duration::seconds(offset_secs);
    tx
}

proptest! {
    /// Applying `diff(old, new)` to `old` reproduces `new` (id-keyed,
    /// modulo ephemeral fields and ordering).
    #[test]
    fn diff_then_apply_round_trips(old in arb_graph(), new in arb_graph()) {
        let mut patched = old.clone();
        if let Some(tx) = diff_transaction(&old, &new) {
            patched.apply(&tx);
        }
        prop_assert_eq!(by_id(&patched), by_id(&new));
    }

    /// Re-applying a captured transaction never duplicates its effect.
    #[test]
    fn reapplying_a_diff_is_idempotent(old in arb_graph(), new in arb_graph()) {
        if let Some(tx) = diff_transaction(&old, &new) {
            let mut once = old.clone();
            once.apply(&tx);
            let mut twice = once.clone();
            twice.apply(&tx);
            prop_assert_eq!(once, twice);
        }
    }

    /// Diffing a graph against itself is always empty.
    #[test]
    fn self_diff_is_empty(graph in arb_graph()) {
        prop_assert!(diff_transaction(&graph, &graph.clone()).is_none());
    }

    /// Same-version merge of logs with disjoint ids is the full union in
    /// `created_at` order, losing none.
    #[test]
    fn same_version_merge_is_lossless_union(
        local_offsets in prop::collection::vec(0i64..1000, 0..5),
        remote_offsets in prop::collection::vec(0i64..1000, 0..5),
    ) {
        let mut local = CanvasState::new("v1");
        for (i, off) in local_offsets.iter().enumerate() {
            local.transactions.push(tx_adding(&format!("l{i}"), *off));
        }
        let mut remote = CanvasState::new("v1");
        for (i, off) in remote_offsets.iter().enumerate() {
            remote.transactions.push(tx_adding(&format!("r{i}"), *off));
        }

        match merge_states(&local, &remote) {
            MergeOutcome::Merged(merged) => {
                prop_assert_eq!(
                    merged.transactions.len(),
                    local.transactions.len() + remote.transactions.len()
                );
                for pair in merged.transactions.windows(2) {
                    prop_assert!(pair[0].created_at <= pair[1].created_at);
                }
            }
            MergeOutcome::Conflict(_) => prop_assert!(false, "same-version merge conflicted"),
        }
    }
}
