//! # Vault Module — Accounts, Coins & the Bank
//!
//! The vault is where money lives. Loans never touch a balance directly;
//! they describe transfers, and a [`Ledger`] carries them out.
//!
//! ## Architecture
//!
//! ```text
//! address.rs  — Opaque account addresses and module (escrow) accounts
//! coins.rs    — Multi-asset values with a canonical text form
//! ledger.rs   — The Ledger trait and Transfer batches
//! bank.rs     — In-memory Ledger implementation
//! ```
//!
//! The sled-backed ledger lives in [`crate::storage::db`] next to the rest
//! of the on-disk layout.

pub mod address;
pub mod bank;
pub mod coins;
pub mod ledger;

pub use address::{Address, AddressError};
pub use bank::Bank;
pub use coins::{Coin, Coins, CoinsError};
pub use ledger::{Ledger, LedgerError, Transfer};
