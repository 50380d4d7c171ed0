//! Easel CLI
//!
//! Operator tooling over the local canvas store:
//! - list and summarize persisted canvas records
//! - print transaction logs and export materialized graphs
//! - offline undo/redo against the local record (the engine re-syncs the
//!   toggled transactions on its next cycle)

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use easel_core::{CanvasState, Transaction};
use easel_store::LocalStore;

#[derive(Parser)]
#[command(name = "easel")]
#[command(author, version, about = "Inspect and repair local canvas records")]
struct Cli {
    /// Root directory of the local canvas store.
    #[arg(long, default_value = ".easel")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List canvases with a persisted record.
    List,

    /// Summarize one canvas record (version, counts, sync health).
    Inspect { canvas_id: String },

    /// Print the transaction log.
    Log {
        canvas_id: String,
        /// Include revoked transactions.
        #[arg(long)]
        all: bool,
    },

    /// Write the materialized graph as JSON.
    Export {
        canvas_id: String,
        /// Output path; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Revoke the most recent live transaction.
    Undo { canvas_id: String },

    /// Restore the earliest revoked transaction.
    Redo { canvas_id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let store = LocalStore::open(&cli.store)?;

    match cli.command {
        Commands::List => cmd_list(&store),
        Commands::Inspect { canvas_id } => cmd_inspect(&store, &canvas_id),
        Commands::Log { canvas_id, all } => cmd_log(&store, &canvas_id, all),
        Commands::Export { canvas_id, out } => cmd_export(&store, &canvas_id, out.as_deref()),
        Commands::Undo { canvas_id } => cmd_undo(&store, &canvas_id),
        Commands::Redo { canvas_id } => cmd_redo(&store, &canvas_id),
    }
}

fn load_required(store: &LocalStore, canvas_id: &str) -> Result<CanvasState> {
    store
        .load(canvas_id)?
        .ok_or_else(|| anyhow!("no record for canvas `{canvas_id}`"))
}

fn cmd_list(store: &LocalStore) -> Result<()> {
    let ids = store.list_canvases()?;
    if ids.is_empty() {
        println!("{}", "no canvases in store".yellow());
        return Ok(());
    }
    for id in ids {
        println!("  {} {}", "→".cyan(), id);
    }
    Ok(())
}

fn cmd_inspect(store: &LocalStore, canvas_id: &str) -> Result<()> {
    let state = load_required(store, canvas_id)?;
    let graph = state.materialize();
    let pending = state.pending_transactions().len();
    let revoked = state.transactions.iter().filter(|t| t.revoked).count();

    println!("{} {}", "Canvas".green().bold(), canvas_id);
    println!("  version      {}", state.version);
    println!("  updated_at   {}", state.updated_at);
    println!(
        "  baseline     {} nodes, {} edges",
        state.nodes.len(),
        state.edges.len()
    );
    println!(
        "  log          {} transactions ({} pending, {} revoked)",
        state.transactions.len(),
        pending,
        revoked
    );
    println!(
        "  materialized {} nodes, {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );
    if pending > 0 {
        println!(
            "  {} {} transaction(s) not yet acknowledged by the server",
            "!".yellow().bold(),
            pending
        );
    }
    Ok(())
}

fn describe(tx: &Transaction) -> String {
    let flag = if tx.revoked {
        "revoked".red().to_string()
    } else if tx.synced_at.is_some() {
        "synced".green().to_string()
    } else {
        "pending".yellow().to_string()
    };
    format!(
        "{}  {}  nodes +{}/~{}/-{}  edges +{}/~{}/-{}  [{}]",
        tx.created_at,
        tx.tx_id,
        tx.node_diffs.added.len(),
        tx.node_diffs.updated.len(),
        tx.node_diffs.removed.len(),
        tx.edge_diffs.added.len(),
        tx.edge_diffs.updated.len(),
        tx.edge_diffs.removed.len(),
        flag
    )
}

fn cmd_log(store: &LocalStore, canvas_id: &str, all: bool) -> Result<()> {
    let state = load_required(store, canvas_id)?;
    let mut shown = 0;
    for tx in &state.transactions {
        if tx.revoked && !all {
            continue;
        }
        println!("  {}", describe(tx));
        shown += 1;
    }
    if shown == 0 {
        println!("{}", "empty log".yellow());
    }
    Ok(())
}

fn cmd_export(store: &LocalStore, canvas_id: &str, out: Option<&std::path::Path>) -> Result<()> {
    let state = load_required(store, canvas_id)?;
    let json = serde_json::to_string_pretty(&state.materialize())?;
    match out {
        Some(path) => {
            fs::write(path, &json)?;
            println!("  {} {}", "→".cyan(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_undo(store: &LocalStore, canvas_id: &str) -> Result<()> {
    let mut state = load_required(store, canvas_id)?;
    match state.undo() {
        Some(tx_id) => {
            store.save(canvas_id, &state)?;
            println!("  {} revoked {}", "→".cyan(), tx_id);
        }
        None => println!("{}", "nothing to undo".yellow()),
    }
    Ok(())
}

fn cmd_redo(store: &LocalStore, canvas_id: &str) -> Result<()> {
    let mut state = load_required(store, canvas_id)?;
    match state.redo() {
        Some(tx_id) => {
            store.save(canvas_id, &state)?;
            println!("  {} restored {}", "→".cyan(), tx_id);
        }
        None => println!("{}", "nothing to redo".yellow()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{EdgeDiffs, Node, NodeDiffs};
    use tempfile::tempdir;

    fn seeded_store() -> (LocalStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut state = CanvasState::new("v1");
        state.transactions.push(Transaction::new(
            NodeDiffs {
                added: vec![Node::new("a", "note")],
                ..Default::default()
            },
            EdgeDiffs::default(),
        ));
        store.save("board", &state).unwrap();
        (store, dir)
    }

    #[test]
    fn undo_then_redo_round_trips_the_record() {
        let (store, _dir) = seeded_store();

        cmd_undo(&store, "board").unwrap();
        assert!(store.load("board").unwrap().unwrap().transactions[0].revoked);

        cmd_redo(&store, "board").unwrap();
        assert!(!store.load("board").unwrap().unwrap().transactions[0].revoked);
    }

    #[test]
    fn export_writes_materialized_graph() {
        let (store, dir) = seeded_store();
        let out = dir.path().join("graph.json");

        cmd_export(&store, "board", Some(&out)).unwrap();
        let graph: easel_core::Graph =
            serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn missing_record_is_an_error() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(cmd_inspect(&store, "ghost").is_err());
    }
}
