//! # Storage Module
//!
//! Persistent state for a lendbook node. One sled database holds the
//! balances, the block height, and whatever trees higher-level stores
//! open through [`LedgerDb::open_tree`].
//!
//! ```text
//! db.rs — LedgerDb: sled-backed Ledger + named trees
//! ```
//!
//! Bincode for on-disk values. JSON is for APIs and debugging; bincode is
//! for storage.

pub mod db;

pub use db::{DbError, DbResult, LedgerDb};
