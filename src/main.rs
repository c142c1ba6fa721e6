//! smsrelay CLI entry point.
//!
//! `serve` runs the HTTP API and the dispatch worker in one process;
//! `worker` runs the worker alone. The remaining subcommands operate on the
//! same database directly.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use smsrelay::api::{self, ApiState};
use smsrelay::config::Config;
use smsrelay::context::ServiceContext;
use smsrelay::gateway::{split_numbers, Gateway};
use smsrelay::logging::{self, LoggingGuard};
use smsrelay::worker::DispatchWorker;

/// SMS ingestion with asynchronous, blacklist-filtered dispatch.
#[derive(Parser)]
#[command(name = "smsrelay", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the dispatch worker.
    Serve,
    /// Run only the dispatch worker.
    Worker,
    /// Submit a message for delivery.
    Submit {
        /// Destination phone number.
        #[arg(long)]
        phone: String,
        /// Message body.
        #[arg(long)]
        message: String,
    },
    /// Show the status of a request.
    Status {
        /// Request id returned by `submit`.
        request_id: String,
    },
    /// Manage the blacklist.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },
    /// Re-enqueue requests stuck in Pending.
    Reconcile {
        /// Only requests older than this many seconds.
        #[arg(long, default_value_t = 60)]
        older_than_secs: u64,
        /// Maximum requests to re-enqueue in one pass.
        #[arg(long, default_value_t = 500)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum BlacklistAction {
    /// List blacklisted numbers.
    List,
    /// Add one or more numbers (comma- or space-separated).
    Add {
        /// Numbers to add.
        #[arg(required = true)]
        numbers: Vec<String>,
    },
    /// Remove a number.
    Remove {
        /// Number to remove.
        number: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Command::Serve => {
            let _guard = init_service_logging(&config)?;
            handle_serve(&config).await
        }
        Command::Worker => {
            let _guard = init_service_logging(&config)?;
            handle_worker(&config).await
        }
        Command::Submit { phone, message } => {
            logging::init_cli(&config.logging.level);
            let receipt = gateway(&config).await?.submit(&phone, &message).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Command::Status { request_id } => {
            logging::init_cli(&config.logging.level);
            let record = gateway(&config).await?.get_status(&request_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Blacklist { action } => {
            logging::init_cli(&config.logging.level);
            handle_blacklist(&config, action).await
        }
        Command::Reconcile {
            older_than_secs,
            limit,
        } => {
            logging::init_cli(&config.logging.level);
            let republished = gateway(&config)
                .await?
                .reconcile(Duration::from_secs(older_than_secs), limit)
                .await?;
            println!("re-enqueued {republished} request(s)");
            Ok(())
        }
    }
}

fn init_service_logging(config: &Config) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.logging.dir {
        Some(dir) => logging::init_production(dir, &config.logging.level).map(Some),
        None => {
            logging::init_cli(&config.logging.level);
            Ok(None)
        }
    }
}

async fn gateway(config: &Config) -> anyhow::Result<Gateway> {
    let ctx = ServiceContext::connect(config).await?;
    Ok(Gateway::new(ctx, &config.limits))
}

/// Run API and worker until SIGINT/SIGTERM.
async fn handle_serve(config: &Config) -> anyhow::Result<()> {
    let ctx = ServiceContext::connect(config).await?;
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let worker = DispatchWorker::new(ctx.clone(), config.worker.message_deadline());
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let addr = format!("{}:{}", config.api.bind, config.api.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let state = ApiState::new(Gateway::new(ctx, &config.limits), config.api.auth_token.clone());

    let served = api::serve(listener, state, cancel.clone()).await;
    // The API may stop on its own error; take the worker down with it.
    cancel.cancel();
    join_worker(worker_handle, config.worker.shutdown_timeout()).await;
    served
}

/// Run only the worker until SIGINT/SIGTERM.
async fn handle_worker(config: &Config) -> anyhow::Result<()> {
    let ctx = ServiceContext::connect(config).await?;
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let worker = DispatchWorker::new(ctx, config.worker.message_deadline());
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    cancel.cancelled().await;
    join_worker(handle, config.worker.shutdown_timeout()).await;
    Ok(())
}

async fn join_worker(handle: tokio::task::JoinHandle<anyhow::Result<()>>, grace: Duration) {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(Ok(()))) => info!("worker shut down cleanly"),
        Ok(Ok(Err(e))) => warn!(error = %e, "worker exited with error"),
        Ok(Err(e)) => warn!(error = %e, "worker task panicked"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "worker did not stop within grace period"),
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, using Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn handle_blacklist(config: &Config, action: BlacklistAction) -> anyhow::Result<()> {
    let gateway = gateway(config).await?;
    match action {
        BlacklistAction::List => {
            for number in gateway.list_blacklist().await? {
                println!("{number}");
            }
        }
        BlacklistAction::Add { numbers } => {
            let numbers: Vec<String> = numbers.iter().flat_map(|n| split_numbers(n)).collect();
            let added = gateway.add_to_blacklist(&numbers).await?;
            println!("added {added} new number(s)");
        }
        BlacklistAction::Remove { number } => {
            if gateway.remove_from_blacklist(&number).await? {
                println!("removed {number}");
            } else {
                println!("{number} was not blacklisted");
            }
        }
    }
    Ok(())
}
