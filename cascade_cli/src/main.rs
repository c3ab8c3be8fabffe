use cascade_core::{
    CompletionStore, FileStore, GraphConfig, NodeState, WorkflowCatalog, WorkflowController,
    WorkflowEvent,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "cascade", version)]
struct Cli {
    /// Path of the completion ledger file
    #[arg(long, default_value = "cascade-ledger.json")]
    ledger: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a workflow simulation to completion
    Run {
        /// Built-in workflow kind to run
        #[arg(long, conflicts_with = "config")]
        kind: Option<String>,

        /// Graph configuration file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instance id; defaults to a fresh one per invocation
        #[arg(long)]
        instance: Option<String>,

        /// Playback speed factor (2.0 halves every duration)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Clear any persisted completion for this instance and re-run
        #[arg(long)]
        fresh: bool,
    },
    /// List the built-in workflow kinds
    Kinds,
    /// Inspect or prune the completion ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Debug, Subcommand)]
enum LedgerAction {
    /// List completed instance ids
    List,
    /// Forget one instance so it re-runs next time
    Clear {
        #[arg(long)]
        instance: String,
    },
    /// Forget every completed instance
    ClearAll,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store = Arc::new(FileStore::new(&cli.ledger));

    match cli.command {
        Commands::Run {
            kind,
            config,
            instance,
            speed,
            fresh,
        } => run(store, kind, config, instance, speed, fresh).await,
        Commands::Kinds => {
            println!("Built-in workflow kinds:");
            for kind in WorkflowCatalog::builtin().kinds() {
                println!("  {kind}");
            }
        }
        Commands::Ledger { action } => match action {
            LedgerAction::List => {
                let ids = store.all();
                if ids.is_empty() {
                    println!("No completed instances recorded.");
                } else {
                    println!("Completed instances:");
                    for id in ids {
                        println!("  {id}");
                    }
                }
            }
            LedgerAction::Clear { instance } => {
                store.clear(&instance);
                println!("Cleared {instance}");
            }
            LedgerAction::ClearAll => {
                store.clear_all();
                println!("Cleared all completed instances");
            }
        },
    }
}

async fn run(
    store: Arc<FileStore>,
    kind: Option<String>,
    config: Option<PathBuf>,
    instance: Option<String>,
    speed: f64,
    fresh: bool,
) {
    let config = match (kind, config) {
        (Some(kind), None) => match WorkflowCatalog::builtin().resolve(&kind) {
            Some(config) => config.clone(),
            None => {
                error!("unknown workflow kind: {}", kind);
                eprintln!("Error: unknown workflow kind '{kind}' (see `cascade kinds`)");
                std::process::exit(1);
            }
        },
        (None, Some(path)) => match GraphConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load config: {}", e);
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        _ => {
            eprintln!("Error: exactly one of --kind or --config is required");
            std::process::exit(1);
        }
    };

    let graph = match config.with_speed(speed).build() {
        Ok(graph) => graph,
        Err(e) => {
            error!("invalid graph configuration: {}", e);
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let instance_id = instance.unwrap_or_else(|| format!("chat-{}", Uuid::new_v4()));
    let replaying = !fresh && store.contains(&instance_id);

    let controller = WorkflowController::new(graph, &instance_id, store);
    let mut events = controller.subscribe();

    if fresh {
        controller.force_restart();
    } else {
        controller.start();
    }

    if replaying {
        println!("Instance {instance_id} already completed; terminal state:");
        print_snapshot(&controller);
        return;
    }

    loop {
        match events.recv().await {
            Ok(WorkflowEvent::NodeStateChanged { node_id, state, .. }) => {
                println!("  {node_id} -> {}", state_name(state));
            }
            Ok(WorkflowEvent::WorkflowCompleted { .. }) => {
                println!("Workflow {instance_id} completed");
                break;
            }
            Ok(WorkflowEvent::WorkflowReset { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                error!("event stream lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    let stats = controller.log().stats();
    println!(
        "{} node transitions, {} completion event(s)",
        stats.node_transitions, stats.completions
    );
}

fn print_snapshot(controller: &WorkflowController) {
    let snapshot = controller.snapshot();
    let mut ids: Vec<&String> = snapshot.keys().collect();
    ids.sort();
    for id in ids {
        if let Some(state) = snapshot.get(id) {
            println!("  {id}: {}", state_name(*state));
        }
    }
}

fn state_name(state: NodeState) -> &'static str {
    match state {
        NodeState::Idle => "idle",
        NodeState::Processing => "processing",
        NodeState::Completed => "completed",
        NodeState::Error => "error",
    }
}
