//! # CLI Interface
//!
//! Defines the command-line argument structure for `lendbook-node` using
//! `clap` derive. Supports four subcommands: `init`, `run`, `loans`, and
//! `version`. Every flag that a deployment would set has an environment
//! fallback.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lendbook_protocol::config::{BLOCK_TIME_MS, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

/// Lendbook devnet node.
///
/// Keeps balances and loans in a local sled database, advances the block
/// height on a timer, and serves the loan module over a REST API with
/// Prometheus metrics alongside.
#[derive(Parser, Debug)]
#[command(
    name = "lendbook-node",
    about = "Lendbook collateralized lending devnet node",
    version,
    propagate_version = true
)]
pub struct LendbookCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and credit genesis balances.
    Init(InitArgs),
    /// Start the node: REST API, metrics, and block ticker.
    Run(RunArgs),
    /// Print stored loans as JSON lines. Works on a stopped node.
    Loans(LoansArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "LENDBOOK_DATA_DIR", default_value = ".lendbook")]
    pub data_dir: PathBuf,

    /// Genesis file (JSON) listing initial account balances.
    ///
    /// Format: `{"accounts":[{"address":"alice","balance":"1000stake"}]}`
    #[arg(long, short = 'g', env = "LENDBOOK_GENESIS")]
    pub genesis: Option<PathBuf>,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "LENDBOOK_DATA_DIR", default_value = ".lendbook")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "LENDBOOK_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "LENDBOOK_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Milliseconds between block heights.
    #[arg(long, env = "LENDBOOK_BLOCK_TIME_MS", default_value_t = BLOCK_TIME_MS)]
    pub block_time_ms: u64,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "LENDBOOK_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `loans` subcommand.
#[derive(Parser, Debug)]
pub struct LoansArgs {
    /// Path to the node data directory.
    #[arg(long, short = 'd', env = "LENDBOOK_DATA_DIR", default_value = ".lendbook")]
    pub data_dir: PathBuf,

    /// Only print loans in this state (requested, approved, repaid,
    /// cancelled, liquidated).
    #[arg(long)]
    pub state: Option<String>,
}
