// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Orchestrator process entry point (§4.8).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use orchestrator_core::adapter::AdapterRegistry;
use orchestrator_core::config::Settings;
use orchestrator_core::dag::validate_acyclic;
use orchestrator_core::model::Workflow;
use orchestrator_core::queue::JobQueue;
use orchestrator_core::recovery::RecoveryManager;
use orchestrator_core::state::{FileStateStore, StateStore};
use orchestrator_core::worker::Worker;
use std::fs;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "DAG workflow orchestration engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the recovery pass, then the worker loop and (unless --worker-only) the HTTP edge
    Serve {
        /// Run only the worker loop, without starting the HTTP server
        #[arg(long)]
        worker_only: bool,
    },

    /// Parse and validate a standalone workflow document (schema + acyclicity)
    Validate {
        /// Path to a workflow JSON document
        #[arg(value_name = "FILE")]
        file: String,
    },
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("orchestrator={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { worker_only } => serve(worker_only).await,
        Commands::Validate { file } => validate(&file),
    }
}

async fn serve(worker_only: bool) -> Result<()> {
    let settings = Settings::from_env();
    init_tracing(&settings.log_level);
    info!(?settings.http_bind_addr, worker_only, "starting orchestrator");

    let state: Arc<dyn StateStore> = Arc::new(FileStateStore::new(settings.workflows_dir.clone()));
    let queue = Arc::new(JobQueue::load(settings.queue_state_file.clone()).await?);

    RecoveryManager::new(state.clone(), queue.clone())
        .recover()
        .await
        .context("crash recovery failed")?;

    let mut registry = AdapterRegistry::new();
    orchestrator_adapters::register_available(&mut registry, &settings);
    let adapters = Arc::new(registry);

    let worker = Worker::new(state.clone(), queue.clone(), adapters);

    if worker_only {
        worker.run().await;
    }

    let settings = Arc::new(settings);
    let app_state = orchestrator_api::AppState::new(state, queue, settings.clone());
    let app = orchestrator_api::router(app_state);

    info!(addr = %settings.http_bind_addr, "HTTP edge listening");

    tokio::select! {
        _ = worker.run() => {}
        result = orchestrator_api::serve(&settings.http_bind_addr, app) => {
            result.context("HTTP server failed")?;
        }
    }

    Ok(())
}

fn validate(file_path: &str) -> Result<()> {
    println!("{} {}", "Validating workflow:".cyan().bold(), file_path);

    let content = fs::read_to_string(file_path)
        .with_context(|| format!("failed to read workflow file: {file_path}"))?;

    let workflow: Workflow = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse workflow document: {file_path}"))?;

    validate_acyclic(&workflow).context("workflow validation failed")?;

    println!("{}", "Workflow is valid".green().bold());
    println!("  Name: {}", workflow.name);
    println!("  Steps: {}", workflow.steps.len());

    Ok(())
}
