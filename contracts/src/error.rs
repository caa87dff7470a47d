//! Errors returned by the loan module.

use thiserror::Error;

use lendbook_protocol::vault::{Address, CoinsError, LedgerError};

use crate::loan::{LoanId, LoanState, Operation};
use crate::store::StoreError;

/// Every way a loan command can fail.
///
/// Validation failures (`NotFound` through `DeadlineNotReached`, plus
/// `TransferFailed` and `InvalidRequest`) leave the record and balances
/// untouched. `CorruptRecord` means stored data is broken and someone
/// should be paged.
#[derive(Debug, Error)]
pub enum LoanError {
    #[error("loan {0} not found")]
    NotFound(LoanId),

    #[error("{actor} is not authorized to {op} loan {id}")]
    Unauthorized {
        op: Operation,
        id: LoanId,
        actor: Address,
    },

    /// The loan is not in the state the operation requires.
    #[error("cannot {op} loan {id}: loan is {actual}, expected {expected}")]
    InvalidState {
        op: Operation,
        id: LoanId,
        actual: LoanState,
        expected: LoanState,
    },

    /// A stored monetary field does not parse.
    #[error("loan {id} has a malformed {field}: {source}")]
    MalformedAmount {
        id: LoanId,
        field: &'static str,
        #[source]
        source: CoinsError,
    },

    #[error("loan {id} cannot be liquidated before height {deadline} (current height {height})")]
    DeadlineNotReached { id: LoanId, deadline: u64, height: u64 },

    /// The ledger rejected a required transfer.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] LedgerError),

    #[error("invalid loan request: {0}")]
    InvalidRequest(String),

    /// Stored data violates an invariant the module relies on.
    #[error("loan {id} record is corrupt: {detail}")]
    CorruptRecord { id: LoanId, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoanError {
    /// `true` when the error points at corrupted state, not at the caller.
    pub fn is_internal_fault(&self) -> bool {
        matches!(self, LoanError::CorruptRecord { .. })
    }

    /// Stable snake_case label for logs, metrics, and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            LoanError::NotFound(_) => "not_found",
            LoanError::Unauthorized { .. } => "unauthorized",
            LoanError::InvalidState { .. } => "invalid_state",
            LoanError::MalformedAmount { .. } => "malformed_amount",
            LoanError::DeadlineNotReached { .. } => "deadline_not_reached",
            LoanError::TransferFailed(_) => "transfer_failed",
            LoanError::InvalidRequest(_) => "invalid_request",
            LoanError::CorruptRecord { .. } => "corrupt_record",
            LoanError::Store(_) => "store",
        }
    }
}
