//! Contract Worker
//!
//! Runs the orchestration core against process-local collaborators: loads
//! the core plugin, seeds an optional contract bundle, then ticks recurring
//! triggers and drains the action queue until interrupted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use worker_core::common::{ContractDraft, ContractId, Session, VersionedSlug};
use worker_core::domains::actions::core_plugin;
use worker_core::domains::commit::CommitOptions;
use worker_core::domains::transformers::Transformer;
use worker_core::domains::triggers::{TriggeredAction, TRIGGERED_ACTION_TYPE};
use worker_core::kernel::{PluginRegistry, QueryOptions};
use worker_core::{Worker, WorkerConfig, WorkerDeps};

const WORKER_USER: &str = "user-worker";

#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Run the contract worker")]
struct Cli {
    /// JSON file with a `contracts` array to seed before starting
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Run a single tick and drain the queue, then exit
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Deserialize)]
struct Bundle {
    #[serde(default)]
    contracts: Vec<ContractDraft>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("Failed to load configuration")?;
    info!(worker_id = %config.worker_id, "Starting contract worker");

    let deps = WorkerDeps::in_memory();
    let plugins = PluginRegistry::load(vec![core_plugin()])?;

    // Types must exist before any session can act on the store.
    let bootstrap_session = Session::new("bootstrap", ContractId::nil());
    plugins.bootstrap(deps.store.as_ref(), &bootstrap_session).await?;
    let actor = ensure_worker_user(&deps, &bootstrap_session).await?;
    let session = Session::new(format!("session-{}", config.worker_id), actor);

    let worker = Worker::new(deps, plugins, config, session.clone());

    if let Some(path) = &cli.bundle {
        seed_bundle(&worker, &session, path).await?;
    }
    load_registries(&worker, &session).await?;

    if cli.once {
        worker.tick(&session, Utc::now()).await;
        drain(&worker, &session).await;
        info!(stats = ?worker.reaction_stats(), "Finished single pass");
        return Ok(());
    }

    let mut tick = tokio::time::interval(worker.config().tick_interval);
    let mut poll = tokio::time::interval(worker.config().poll_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let enqueued = worker.tick(&session, Utc::now()).await;
                debug!(count = enqueued.len(), "Tick finished");
            }
            _ = poll.tick() => {
                drain(&worker, &session).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(stats = ?worker.reaction_stats(), "Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn ensure_worker_user(deps: &WorkerDeps, session: &Session) -> Result<ContractId> {
    let draft = ContractDraft::builder()
        .slug(WORKER_USER)
        .type_ref("user@1.0.0")
        .name("Worker".to_string())
        .build();
    deps.store
        .replace(session, &json!({ "type": "object" }), draft)
        .await?;

    let user = deps
        .store
        .get_by_slug(session, &VersionedSlug::latest(WORKER_USER))
        .await?
        .context("Worker user was not stored")?;
    Ok(user.id)
}

async fn seed_bundle(worker: &Worker, session: &Session, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle {}", path.display()))?;
    let bundle: Bundle = serde_json::from_str(&raw).context("Failed to parse bundle")?;

    let mut seeded = 0;
    for draft in bundle.contracts {
        let type_contract = worker.get_type(session, &draft.type_ref).await?;
        let options = CommitOptions::builder()
            .actor(session.actor)
            .reason("bundle")
            .build();
        if worker
            .replace_card(session, &type_contract, &options, draft)
            .await?
            .is_some()
        {
            seeded += 1;
        }
    }

    info!(seeded, path = %path.display(), "Seeded bundle");
    Ok(())
}

async fn load_registries(worker: &Worker, session: &Session) -> Result<()> {
    let store = &worker.deps().store;

    let triggers = store
        .query(
            session,
            &json!({
                "type": "object",
                "required": ["type", "active"],
                "properties": {
                    "type": { "const": TRIGGERED_ACTION_TYPE },
                    "active": { "const": true }
                }
            }),
            QueryOptions::default(),
        )
        .await?;
    let triggers = triggers
        .iter()
        .filter_map(|contract| match TriggeredAction::from_contract(contract) {
            Ok(trigger) => Some(trigger),
            Err(e) => {
                warn!(slug = %contract.slug, error = %e, "Skipping malformed trigger");
                None
            }
        })
        .collect();
    worker.set_triggers(triggers);

    let transformers = store
        .query(
            session,
            &json!({
                "type": "object",
                "required": ["type"],
                "properties": { "type": { "const": "transformer@1.0.0" } }
            }),
            QueryOptions::default(),
        )
        .await?;
    worker.set_transformers(transformers.iter().map(Transformer::from).collect());

    Ok(())
}

async fn drain(worker: &Worker, session: &Session) {
    loop {
        match worker.process_next(session).await {
            Ok(Some(result)) => {
                debug!(error = result.error, "Processed request");
            }
            Ok(None) => break,
            Err(e) if e.is_expected() => {
                warn!(error = %e, "Request rejected");
            }
            Err(e) => {
                error!(error = %e, "Request failed");
            }
        }
    }
}
