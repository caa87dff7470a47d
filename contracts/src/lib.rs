// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lendbook Loan Module
//!
//! Collateralized lending over a multi-asset ledger. A borrower locks
//! collateral in the module escrow and asks for a principal; any account
//! may fund it and become the lender. From there the borrower repays
//! principal plus fee to get the collateral back, or the lender seizes it
//! once the deadline height has passed. An unfunded request can be
//! cancelled by its borrower.
//!
//! - [`loan`] — the record, its states, and the command messages.
//! - [`machine`] — pure transition logic: record in, record plus transfers out.
//! - [`store`] — the [`LoanStore`] trait with in-memory and sled backends.
//! - [`keeper`] — the executor tying the machine to a ledger and a store.
//!
//! ## Design Principles
//!
//! 1. Deciding and doing are separate. The machine never touches a ledger,
//!    so every rule is testable with plain values.
//! 2. The clock is an argument. Nothing reads wall time.
//! 3. Funds move before records change, and a command's transfers land
//!    together or not at all.
//! 4. Bad stored data is an error, never a panic.

pub mod error;
pub mod keeper;
pub mod loan;
pub mod machine;
pub mod store;

pub use error::LoanError;
pub use keeper::LoanKeeper;
pub use loan::{Loan, LoanId, LoanMsg, LoanRequest, LoanResponse, LoanState, Operation};
pub use machine::Transition;
pub use store::{LoanStore, MemoryLoanStore, SledLoanStore, StoreError};
