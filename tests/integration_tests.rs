//! Integration tests for the complete Easel sync stack.
//!
//! These tests verify end-to-end functionality across crates:
//! - capture → store → push → backend
//! - backend → poll → store → surface
//! - two independent sessions converging on one canvas
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;
use std::time::Duration;

use easel_core::Node;
use easel_store::LocalStore;
use easel_sync::testing::MemoryBackend;
use easel_sync::{GraphPort, PollOutcome, PushOutcome, SharedGraph, SyncConfig, SyncEngine};
use tempfile::tempdir;

fn fast_config() -> SyncConfig {
    SyncConfig {
        debounce_window: Duration::from_millis(20),
        warmup: Duration::ZERO,
        push_interval: Duration::from_millis(50),
        poll_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

struct Session {
    engine: SyncEngine,
    surface: SharedGraph,
    store: LocalStore,
    _dir: tempfile::TempDir,
}

fn session(backend: &Arc<MemoryBackend>, canvas_id: &str) -> Session {
    let dir = tempdir().unwrap();
    let store = LocalStore::open(dir.path()).unwrap();
    let surface = SharedGraph::new();
    let engine = SyncEngine::new(
        canvas_id,
        backend.clone(),
        store.clone(),
        Arc::new(surface.clone()),
        fast_config(),
    );
    Session {
        engine,
        surface,
        store,
        _dir: dir,
    }
}

// ============================================================================
// Capture → persist → rehydrate round-trip
// ============================================================================

#[tokio::test]
async fn captured_edit_round_trips_through_the_store() {
    let backend = Arc::new(MemoryBackend::new());
    let s = session(&backend, "board");
    s.engine.bootstrap().await.unwrap();

    s.surface.update(|g| {
        let mut node = Node::new("a", "note");
        node.selected = true; // ephemeral, must not persist
        node.data = serde_json::json!({"label": "hello"});
        g.nodes.push(node);
        g.nodes.push(Node::new("b", "note"));
    });
    let before = s.surface.current_graph().stripped();
    s.engine.capture_now().await.unwrap();

    // Rehydrate purely from the persisted record.
    let state = s.store.load("board").unwrap().unwrap();
    assert_eq!(state.materialize(), before);
}

// ============================================================================
// Two sessions, one canvas
// ============================================================================

#[tokio::test]
async fn two_sessions_converge_on_one_canvas() {
    let backend = Arc::new(MemoryBackend::new());
    let alice = session(&backend, "shared");
    let bob = session(&backend, "shared");

    alice.engine.bootstrap().await.unwrap();
    alice
        .surface
        .update(|g| g.nodes.push(Node::new("from-alice", "note")));
    alice.engine.capture_now().await.unwrap();
    assert_eq!(
        alice.engine.push_once().await,
        PushOutcome::Pushed { count: 1 }
    );

    // Bob opens after Alice pushed; bootstrap hands him her edit.
    bob.engine.bootstrap().await.unwrap();
    assert!(bob.surface.current_graph().node("from-alice").is_some());

    bob.surface
        .update(|g| g.nodes.push(Node::new("from-bob", "note")));
    bob.engine.capture_now().await.unwrap();
    assert_eq!(bob.engine.push_once().await, PushOutcome::Pushed { count: 1 });

    // Alice's poll picks Bob's edit up.
    assert_eq!(
        alice.engine.poll_once().await,
        PollOutcome::Merged {
            new_transactions: 1
        }
    );
    assert!(alice.surface.current_graph().node("from-bob").is_some());

    // Both materialized graphs agree.
    let a = alice.store.load("shared").unwrap().unwrap().materialize();
    let b = bob.store.load("shared").unwrap().unwrap().materialize();
    let mut a_ids: Vec<String> = a.nodes.iter().map(|n| n.id.clone()).collect();
    let mut b_ids: Vec<String> = b.nodes.iter().map(|n| n.id.clone()).collect();
    a_ids.sort();
    b_ids.sort();
    assert_eq!(a_ids, b_ids);
}

// ============================================================================
// Offline capture, later recovery
// ============================================================================

#[tokio::test]
async fn offline_capture_is_never_dropped() {
    let backend = Arc::new(MemoryBackend::new());
    let s = session(&backend, "board");
    s.engine.bootstrap().await.unwrap();

    s.surface
        .update(|g| g.nodes.push(Node::new("offline-edit", "note")));
    s.engine.capture_now().await.unwrap();

    // Push attempts fail while the link is down; nothing is lost.
    backend.fail_next(2);
    assert_eq!(s.engine.push_once().await, PushOutcome::Failed);
    assert_eq!(s.engine.push_once().await, PushOutcome::Failed);
    assert_eq!(s.engine.stats().unwrap().pending_transactions, 1);
    assert_eq!(s.engine.stats().unwrap().consecutive_failures, 2);

    // Transport recovers; the next cycle delivers the same transaction.
    assert_eq!(s.engine.push_once().await, PushOutcome::Pushed { count: 1 });
    let server = backend.state_of("board").unwrap();
    assert_eq!(server.transactions.len(), 1);
    assert_eq!(s.engine.stats().unwrap().consecutive_failures, 0);
}

// ============================================================================
// Interval loops drive convergence end to end
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn started_loops_converge_without_manual_ticks() {
    let backend = Arc::new(MemoryBackend::new());
    let alice = session(&backend, "shared");
    let bob = session(&backend, "shared");

    alice.engine.open().await.unwrap();
    bob.engine.open().await.unwrap();

    alice
        .surface
        .update(|g| g.nodes.push(Node::new("looped", "note")));
    alice.engine.notify_change();

    // debounce (20ms) + push tick (50ms) + poll tick (50ms), with slack.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(
        bob.surface.current_graph().node("looped").is_some(),
        "bob's poll loop should pick up alice's pushed edit"
    );

    alice.engine.teardown().await;
    bob.engine.teardown().await;
}
