//! Transaction-log operations over a canvas state: materialization, log
//! merging, acknowledgement stamping, and the undo/redo scans.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::{CanvasState, Edge, Graph, Node, Transaction};

impl Graph {
    /// Apply one transaction's diffs to this graph.
    ///
    /// Adds and updates are id-keyed upserts and removals are id-keyed, so
    /// applying a transaction that has already taken effect changes nothing.
    pub fn apply(&mut self, tx: &Transaction) {
        for node in &tx.node_diffs.added {
            upsert_node(&mut self.nodes, node.clone());
        }
        for node in &tx.node_diffs.updated {
            upsert_node(&mut self.nodes, node.clone());
        }
        for id in &tx.node_diffs.removed {
            self.nodes.retain(|n| n.id != *id);
        }
        for edge in &tx.edge_diffs.added {
            upsert_edge(&mut self.edges, edge.clone());
        }
        for edge in &tx.edge_diffs.updated {
            upsert_edge(&mut self.edges, edge.clone());
        }
        for id in &tx.edge_diffs.removed {
            self.edges.retain(|e| e.id != *id);
        }
    }
}

fn upsert_node(nodes: &mut Vec<Node>, node: Node) {
    if let Some(slot) = nodes.iter_mut().find(|n| n.id == node.id) {
        *slot = node;
    } else {
        nodes.push(node);
    }
}

fn upsert_edge(edges: &mut Vec<Edge>, edge: Edge) {
    if let Some(slot) = edges.iter_mut().find(|e| e.id == edge.id) {
        *slot = edge;
    } else {
        edges.push(edge);
    }
}

impl CanvasState {
    /// Fresh state at the given version: empty baseline, empty log.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            transactions: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Replay every non-revoked transaction, in `created_at` order, over the
    /// baseline nodes/edges.
    pub fn materialize(&self) -> Graph {
        let mut graph = Graph {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };
        let mut live: Vec<&Transaction> = self.transactions.iter().filter(|t| !t.revoked).collect();
        live.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.tx_id.cmp(&b.tx_id))
        });
        for tx in live {
            graph.apply(tx);
        }
        graph
    }

    pub fn known_tx_ids(&self) -> HashSet<Uuid> {
        self.transactions.iter().map(|t| t.tx_id).collect()
    }

    /// Un-synced, non-revoked transactions: what the push loop sends.
    pub fn pending_transactions(&self) -> Vec<&Transaction> {
        self.transactions.iter().filter(|t| t.is_pending()).collect()
    }

    /// Whether any transaction (revoked or not) still awaits the server.
    pub fn has_unsynced(&self) -> bool {
        self.transactions.iter().any(|t| t.synced_at.is_none())
    }

    /// Merge transactions into the log, ignoring ids already present, then
    /// restore `created_at` order. Returns how many were appended.
    pub fn merge_transactions(&mut self, incoming: impl IntoIterator<Item = Transaction>) -> usize {
        let mut known = self.known_tx_ids();
        let mut appended = 0;
        for tx in incoming {
            if known.insert(tx.tx_id) {
                self.transactions.push(tx);
                appended += 1;
            }
        }
        if appended > 0 {
            self.sort_log();
        }
        appended
    }

    /// Restore `created_at` order (ties broken by id for determinism).
    pub fn sort_log(&mut self) {
        self.transactions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.tx_id.cmp(&b.tx_id))
        });
    }

    /// Stamp acknowledged transactions with their server-assigned
    /// `synced_at`, leaving diffs and `revoked` untouched. Returns how many
    /// were stamped.
    pub fn stamp_synced(&mut self, acks: &[Transaction]) -> usize {
        let mut stamped = 0;
        for ack in acks {
            let Some(at) = ack.synced_at else { continue };
            if let Some(tx) = self.transactions.iter_mut().find(|t| t.tx_id == ack.tx_id) {
                tx.synced_at = Some(at);
                stamped += 1;
            }
        }
        stamped
    }

    /// Revoke the most recent non-revoked transaction and clear its
    /// `synced_at` so the revocation syncs again. Returns the revoked id.
    pub fn undo(&mut self) -> Option<Uuid> {
        let tx = self.transactions.iter_mut().rev().find(|t| !t.revoked)?;
        tx.revoked = true;
        tx.synced_at = None;
        let id = tx.tx_id;
        self.updated_at = Utc::now();
        Some(id)
    }

    /// Restore the earliest revoked transaction (the most recent undo, as
    /// long as the log order stays stable between calls). Returns its id.
    pub fn redo(&mut self) -> Option<Uuid> {
        let tx = self.transactions.iter_mut().find(|t| t.revoked)?;
        tx.revoked = false;
        tx.synced_at = None;
        let id = tx.tx_id;
        self.updated_at = Utc::now();
        Some(id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
