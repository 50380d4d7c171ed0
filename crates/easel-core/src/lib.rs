//! Easel core: the canvas data model and the pure engines over it.
//!
//! A canvas is a node-and-edge graph document. Edits are captured as
//! [`Transaction`]s (identified, timestamped node/edge diffs); a
//! [`CanvasState`] is a server-assigned baseline version plus the transaction
//! log applied on top of it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CanvasState                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  version: "v3"                                              │
//! │  nodes/edges ─────────── baseline graph                     │
//! │  transactions ────────── ordered log of diffs               │
//! │                                                             │
//! │  materialize() = baseline ∘ replay(non-revoked log)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything in this crate is pure data and pure functions: no I/O, no
//! clocks beyond stamping, no async. The sync engine (`easel-sync`) drives
//! these types against a local store and a remote backend.

pub mod diff;
pub mod merge;
pub mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use diff::{diff_graphs, diff_transaction};
pub use merge::{merge_states, MergeOutcome};

// ============================================================================
// Graph Model
// ============================================================================

fn is_false(v: &bool) -> bool {
    !*v
}

/// 2D placement of a node on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in the canvas graph, identity-keyed on `id`.
///
/// `selected` and `dragging` are per-session UI state. They are stripped
/// before diffing, merging, and persistence so pointer churn never turns
/// into transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    /// Opaque node payload owned by the editing surface.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dragging: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: Position::default(),
            data: Value::Null,
            selected: false,
            dragging: false,
        }
    }

    /// Copy with ephemeral UI fields cleared.
    pub fn stripped(&self) -> Node {
        Node {
            selected: false,
            dragging: false,
            ..self.clone()
        }
    }
}

/// A directed connection between two nodes, identity-keyed on `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            data: Value::Null,
            selected: false,
        }
    }

    /// Copy with ephemeral UI fields cleared.
    pub fn stripped(&self) -> Edge {
        Edge {
            selected: false,
            ..self.clone()
        }
    }
}

/// A snapshot of the canvas graph as the editing surface sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Copy with ephemeral UI fields cleared from every node and edge.
    pub fn stripped(&self) -> Graph {
        Graph {
            nodes: self.nodes.iter().map(Node::stripped).collect(),
            edges: self.edges.iter().map(Edge::stripped).collect(),
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Node-level changes carried by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDiffs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl NodeDiffs {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Edge-level changes carried by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeDiffs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl EdgeDiffs {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// One captured edit: the unit of sync, merge, and undo/redo.
///
/// Invariant: once `synced_at` is set the transaction is server-acknowledged
/// and its diffs must not be mutated. Only `revoked` may later toggle (undo/
/// redo), and toggling it clears `synced_at` so the change syncs again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub node_diffs: NodeDiffs,
    #[serde(default)]
    pub edge_diffs: EdgeDiffs,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Freshly-identified, un-synced transaction stamped with the current time.
    pub fn new(node_diffs: NodeDiffs, edge_diffs: EdgeDiffs) -> Self {
        Self {
            tx_id: Uuid::new_v4(),
            created_at: Utc::now(),
            node_diffs,
            edge_diffs,
            revoked: false,
            synced_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_diffs.is_empty() && self.edge_diffs.is_empty()
    }

    /// Awaiting server acknowledgement and not revoked: the push set.
    pub fn is_pending(&self) -> bool {
        self.synced_at.is_none() && !self.revoked
    }
}

// ============================================================================
// Canvas State
// ============================================================================

/// The durable per-canvas record: a versioned baseline plus the transaction
/// log applied on top of it. See [`state`] for the operations over the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasState {
    /// Server-assigned baseline identifier.
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub updated_at: DateTime<Utc>,
}

/// Two states that diverged in a way the merge engine cannot reconcile on
/// its own. Routed to a conflict resolver; exactly one side becomes canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConflict {
    pub local: CanvasState,
    pub remote: CanvasState,
}
