//! # Loan Records
//!
//! The [`Loan`] is the only entity the module stores. Its lifecycle:
//!
//! ```text
//!             approve              repay
//! Requested ──────────▶ Approved ─────────▶ Repaid
//!     │                     │
//!     │ cancel              │ liquidate (height >= deadline)
//!     ▼                     ▼
//! Cancelled             Liquidated
//! ```
//!
//! Monetary fields and the deadline are persisted as text, the same way
//! the request message carried them, and parsed when a transition needs
//! them. A record built through [`Loan::requested`] always parses; a
//! record that doesn't was corrupted somewhere upstream, and the typed
//! accessors say so with a dedicated error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use lendbook_protocol::vault::{Address, Coins};

use crate::error::LoanError;

// ---------------------------------------------------------------------------
// LoanId
// ---------------------------------------------------------------------------

/// Store-assigned loan identifier. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl LoanId {
    /// Big-endian key bytes, so sled's lexicographic order is id order.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LoanId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// LoanState
// ---------------------------------------------------------------------------

/// Where a loan is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    /// Collateral is in escrow; waiting for a lender.
    Requested,
    /// Principal has been paid out; waiting for repayment or the deadline.
    Approved,
    /// Borrower paid principal + fee and got the collateral back.
    Repaid,
    /// Borrower withdrew the request before anyone funded it.
    Cancelled,
    /// Lender seized the collateral after the deadline.
    Liquidated,
}

impl LoanState {
    pub const ALL: [LoanState; 5] = [
        LoanState::Requested,
        LoanState::Approved,
        LoanState::Repaid,
        LoanState::Cancelled,
        LoanState::Liquidated,
    ];

    /// `true` for states no operation accepts.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoanState::Repaid | LoanState::Cancelled | LoanState::Liquidated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanState::Requested => "requested",
            LoanState::Approved => "approved",
            LoanState::Repaid => "repaid",
            LoanState::Cancelled => "cancelled",
            LoanState::Liquidated => "liquidated",
        }
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a state or operation label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownLabel {
    kind: &'static str,
    value: String,
}

impl FromStr for LoanState {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoanState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLabel {
                kind: "loan state",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The four transitions a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Approve,
    Cancel,
    Repay,
    Liquidate,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Approve,
        Operation::Cancel,
        Operation::Repay,
        Operation::Liquidate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Approve => "approve",
            Operation::Cancel => "cancel",
            Operation::Repay => "repay",
            Operation::Liquidate => "liquidate",
        }
    }

    /// The only state this operation accepts.
    pub fn required_state(self) -> LoanState {
        match self {
            Operation::Approve | Operation::Cancel => LoanState::Requested,
            Operation::Repay | Operation::Liquidate => LoanState::Approved,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLabel {
                kind: "operation",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Loan
// ---------------------------------------------------------------------------

/// A persisted loan record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: Address,
    /// Unset until the loan is approved.
    pub lender: Option<Address>,
    /// Principal, canonical coin text.
    pub amount: String,
    /// Canonical coin text. May be empty.
    pub fee: String,
    /// Canonical coin text.
    pub collateral: String,
    /// Absolute block height, decimal text.
    pub deadline: String,
    pub state: LoanState,
}

impl Loan {
    /// A fresh record in `Requested` with no lender.
    pub fn requested(
        id: LoanId,
        borrower: Address,
        amount: &Coins,
        fee: &Coins,
        collateral: &Coins,
        deadline: u64,
    ) -> Self {
        Self {
            id,
            borrower,
            lender: None,
            amount: amount.to_string(),
            fee: fee.to_string(),
            collateral: collateral.to_string(),
            deadline: deadline.to_string(),
            state: LoanState::Requested,
        }
    }

    /// Parsed principal.
    pub fn principal(&self) -> Result<Coins, LoanError> {
        self.parse_coins("amount", &self.amount)
    }

    /// Parsed fee.
    pub fn fee(&self) -> Result<Coins, LoanError> {
        self.parse_coins("fee", &self.fee)
    }

    /// Parsed collateral.
    pub fn collateral(&self) -> Result<Coins, LoanError> {
        self.parse_coins("collateral", &self.collateral)
    }

    /// Parsed deadline height.
    ///
    /// A deadline that does not parse means the stored record is corrupt,
    /// which is an internal fault rather than a caller error.
    pub fn deadline_height(&self) -> Result<u64, LoanError> {
        self.deadline
            .parse::<u64>()
            .map_err(|e| LoanError::CorruptRecord {
                id: self.id,
                detail: format!("deadline {:?} is not a height: {e}", self.deadline),
            })
    }

    fn parse_coins(&self, field: &'static str, raw: &str) -> Result<Coins, LoanError> {
        raw.parse().map_err(|source| LoanError::MalformedAmount {
            id: self.id,
            field,
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A transition command: which loan, which operation, who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanMsg {
    pub op: Operation,
    pub loan_id: LoanId,
    pub actor: Address,
}

impl LoanMsg {
    pub fn new(op: Operation, loan_id: LoanId, actor: Address) -> Self {
        Self { op, loan_id, actor }
    }
}

/// Terms for a new loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub borrower: Address,
    pub amount: Coins,
    #[serde(default)]
    pub fee: Coins,
    pub collateral: Coins,
    pub deadline: u64,
}

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanResponse {
    pub loan_id: LoanId,
    pub state: LoanState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Loan {
        Loan::requested(
            LoanId(1),
            Address::new("borrower").unwrap(),
            &"100denomx".parse().unwrap(),
            &"5denomx".parse().unwrap(),
            &"50denomy".parse().unwrap(),
            1000,
        )
    }

    #[test]
    fn requested_loan_has_no_lender() {
        let loan = sample();
        assert_eq!(loan.state, LoanState::Requested);
        assert!(loan.lender.is_none());
        assert_eq!(loan.amount, "100denomx");
        assert_eq!(loan.deadline, "1000");
    }

    #[test]
    fn accessors_parse_stored_text() {
        let loan = sample();
        assert_eq!(loan.principal().unwrap().amount_of("denomx"), 100);
        assert_eq!(loan.fee().unwrap().amount_of("denomx"), 5);
        assert_eq!(loan.collateral().unwrap().amount_of("denomy"), 50);
        assert_eq!(loan.deadline_height().unwrap(), 1000);
    }

    #[test]
    fn corrupt_amount_is_malformed_amount() {
        let mut loan = sample();
        loan.amount = "-100denomx".into();
        let err = loan.principal().unwrap_err();
        assert!(matches!(
            err,
            LoanError::MalformedAmount { field: "amount", .. }
        ));
        assert!(!err.is_internal_fault());
    }

    #[test]
    fn corrupt_deadline_is_internal_fault() {
        let mut loan = sample();
        loan.deadline = "soon".into();
        let err = loan.deadline_height().unwrap_err();
        assert!(err.is_internal_fault());
    }

    #[test]
    fn state_labels_round_trip() {
        for state in LoanState::ALL {
            assert_eq!(state.as_str().parse::<LoanState>().unwrap(), state);
        }
        assert_eq!("APPROVED".parse::<LoanState>().unwrap(), LoanState::Approved);
        assert!("pending".parse::<LoanState>().is_err());
    }

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = LoanState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![LoanState::Repaid, LoanState::Cancelled, LoanState::Liquidated]
        );
    }

    #[test]
    fn operations_require_one_state_each() {
        assert_eq!(Operation::Approve.required_state(), LoanState::Requested);
        assert_eq!(Operation::Cancel.required_state(), LoanState::Requested);
        assert_eq!(Operation::Repay.required_state(), LoanState::Approved);
        assert_eq!(Operation::Liquidate.required_state(), LoanState::Approved);
        assert_eq!("liquidate".parse::<Operation>().unwrap(), Operation::Liquidate);
    }

    #[test]
    fn loan_serializes_state_as_lowercase_label() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["state"], "requested");
        assert_eq!(json["lender"], serde_json::Value::Null);
        assert_eq!(json["id"], 1);
    }

    #[test]
    fn request_fee_defaults_to_empty() {
        let req: LoanRequest = serde_json::from_str(
            r#"{"borrower":"b","amount":"10stake","collateral":"20atom1","deadline":5}"#,
        )
        .unwrap();
        assert!(req.fee.is_empty());
    }
}
