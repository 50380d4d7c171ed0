//! The editing-surface port.
//!
//! The engine does not own rendering or editing; it reads the current
//! in-memory graph before a capture and writes the materialized graph back
//! after a merge ("rehydrate").

use std::sync::Arc;

use easel_core::Graph;
use parking_lot::RwLock;

pub trait GraphPort: Send + Sync {
    fn current_graph(&self) -> Graph;
    fn set_graph(&self, graph: Graph);
}

/// In-process graph surface: an `Arc`-shared graph behind a lock. The real
/// editor binds its document model to this; tests drive it directly.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<RwLock<Graph>>,
}

impl SharedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the graph in place, as the editing surface does on user input.
    pub fn update(&self, f: impl FnOnce(&mut Graph)) {
        let mut graph = self.inner.write();
        f(&mut graph);
    }
}

impl GraphPort for SharedGraph {
    fn current_graph(&self) -> Graph {
        self.inner.read().clone()
    }

    fn set_graph(&self, graph: Graph) {
        *self.inner.write() = graph;
    }
}
