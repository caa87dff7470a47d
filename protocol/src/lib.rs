// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lendbook Protocol — Money & Ledger Collaborators
//!
//! Everything the loan module needs from the outside world, and nothing
//! about loans themselves. The loan state machine lives in
//! `lendbook-contracts`; this crate owns the pieces it moves around.
//!
//! ## Architecture
//!
//! - **vault** — Account addresses, multi-asset `Coins`, the `Ledger`
//!   trait and an in-memory `Bank`. Where money lives.
//! - **storage** — `LedgerDb`, a sled-backed ledger that also hands out
//!   named trees to higher-level stores (the loan store uses it).
//! - **config** — Protocol constants: module name, denom limits, block time.
//!
//! ## Design Philosophy
//!
//! 1. Amounts are integers. No floats, no wrapping arithmetic.
//! 2. A transfer batch either lands in full or not at all.
//! 3. The height is a number someone else hands us. We never read a clock.

pub mod config;
pub mod storage;
pub mod vault;

pub use vault::{Address, Bank, Coin, Coins, CoinsError, Ledger, LedgerError, Transfer};
