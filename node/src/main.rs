// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lendbook Devnet Node
//!
//! Entry point for the `lendbook-node` binary. Parses CLI arguments,
//! initializes logging and metrics, ticks the block height, and serves the
//! loan module over HTTP.
//!
//! - `init`    — create the data directory and credit genesis balances
//! - `run`     — start the node
//! - `loans`   — dump stored loans as JSON lines
//! - `version` — print build version information

mod api;
mod cli;
mod genesis;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use lendbook_contracts::{LoanKeeper, LoanState, SledLoanStore};
use lendbook_protocol::config::PROTOCOL_VERSION;
use lendbook_protocol::storage::LedgerDb;
use lendbook_protocol::vault::Ledger;

use cli::{Commands, LendbookCli};
use genesis::Genesis;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LendbookCli::parse();

    match cli.command {
        Commands::Init(args) => init_node(args),
        Commands::Run(args) => run_node(args).await,
        Commands::Loans(args) => list_loans(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

/// Starts the node: API server, metrics endpoint, and block ticker.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_DIRECTIVE,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        block_time_ms = args.block_time_ms,
        data_dir = %args.data_dir.display(),
        "starting lendbook-node"
    );

    // --- Persistent storage ---
    let db_path = db_path(&args.data_dir);
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = Arc::new(
        LedgerDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), height = db.current_height(), "database opened");

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.block_height.set(db.current_height() as i64);

    // --- Application state ---
    let app_state = api::AppState::new(
        format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        Arc::clone(&db),
        Arc::clone(&node_metrics),
    )
    .context("failed to open loan store")?;

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Block ticker ---
    let ticker_db = Arc::clone(&db);
    let ticker_metrics = Arc::clone(&node_metrics);
    let block_time = Duration::from_millis(args.block_time_ms.max(1));
    let block_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match ticker_db.advance_height() {
                Ok(height) => {
                    ticker_metrics.block_height.set(height as i64);
                    tracing::debug!(height, "block height advanced");
                }
                Err(e) => tracing::error!(error = %e, "failed to advance block height"),
            }
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    block_loop.abort();
    db.flush().context("failed to flush database")?;
    tracing::info!(height = db.current_height(), "lendbook-node stopped");
    Ok(())
}

/// Creates the data directory and applies the genesis file, if any.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_DIRECTIVE, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let db_path = db_path(data_dir);
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let genesis = match &args.genesis {
        Some(path) => Genesis::load(path)?,
        None => Genesis::default(),
    };
    genesis.apply(&db)?;

    println!("Node initialized successfully.");
    println!("  Data directory   : {}", data_dir.display());
    println!("  Genesis accounts : {}", genesis.accounts.len());
    Ok(())
}

/// Prints stored loans, one JSON object per line.
fn list_loans(args: cli::LoansArgs) -> Result<()> {
    let filter = args
        .state
        .as_deref()
        .map(str::parse::<LoanState>)
        .transpose()?;

    let db_path = db_path(&args.data_dir);
    let db = Arc::new(
        LedgerDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    let store = SledLoanStore::new(&db)?;
    let keeper = LoanKeeper::new(db, store);

    for loan in keeper.loans(filter)? {
        println!("{}", serde_json::to_string(&loan)?);
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("lendbook-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {PROTOCOL_VERSION}");
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
