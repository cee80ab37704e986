use marcus_core::ai::TemplateInstructionEngine;
use marcus_core::config::Config;
use marcus_core::engine::AssignmentEngine;
use marcus_core::error::Result;
use marcus_core::lease::LeaseManager;
use marcus_core::monitors::Monitors;
use marcus_core::persistence::AssignmentPersistence;
use marcus_core::registry::AgentRegistry;
use marcus_core::store::{FakeKanban, KanbanProvider, TaskStore};
use marcus_core::transport::{ApiServer, AppState};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "marcus-core", version, about = "Multi-agent task assignment server")]
struct Cli {
    /// Serve the line-delimited JSON tool protocol over stdio instead of HTTP.
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    info!("starting marcus-core");

    // No concrete kanban backend ships with this crate (spec.md §1's
    // Non-goals: "implementing a kanban backend" is out of scope). Real
    // deployments wire a `KanbanProvider` for Planka/GitHub/Linear here;
    // `FakeKanban` keeps the binary runnable standalone.
    let kanban: Arc<dyn KanbanProvider> = Arc::new(FakeKanban::new());

    let store = Arc::new(TaskStore::new(kanban.clone()));
    store.refresh().await?;

    let assignments_path = std::path::Path::new(&config.state_dir).join("assignments.json");
    let persistence = Arc::new(AssignmentPersistence::load(&assignments_path).await?);
    let reconciliation = persistence.reconcile(kanban.as_ref()).await?;
    if !reconciliation.purged.is_empty() || !reconciliation.orphaned_in_progress.is_empty() {
        info!(
            purged = ?reconciliation.purged,
            orphaned_in_progress = ?reconciliation.orphaned_in_progress,
            "startup reconciliation"
        );
    }

    let lease = Arc::new(LeaseManager::new(config.lease.clone()));
    let registry = Arc::new(AgentRegistry::new());
    let ai = Arc::new(TemplateInstructionEngine);

    let engine = Arc::new(AssignmentEngine::new(
        store,
        kanban.clone(),
        persistence.clone(),
        lease.clone(),
        registry,
        ai,
        config.clone(),
    ));

    let monitors = Monitors::start(
        engine.clone(),
        lease.clone(),
        persistence.clone(),
        kanban,
        config.lease.warning_hours,
    );

    let tool_state = AppState { engine };

    if cli.stdio {
        marcus_core::transport::stdio::run(tool_state).await?;
    } else {
        let server = ApiServer::new(config, tool_state);
        if let Err(e) = server.run().await {
            error!(error = %e, "HTTP transport failed");
        }
    }

    monitors.abort();
    persistence.cleanup().await?;
    Ok(())
}
