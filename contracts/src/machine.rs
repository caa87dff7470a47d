//! # Loan State Machine
//!
//! Pure decision logic. Given a loan record, an operation, the acting
//! account, and the current height, [`apply`] either returns the updated
//! record together with the ledger transfers that must succeed for it to
//! stand, or rejects the command with a [`LoanError`].
//!
//! Nothing here touches a ledger or a store. The keeper submits
//! `transfers` as one batch and persists `loan` only if the batch lands.
//!
//! Check order matters because it decides which error a caller sees when
//! several preconditions fail at once:
//!
//! | Operation | Checks, in order |
//! |-----------|------------------|
//! | approve   | state, amount |
//! | cancel    | actor is borrower, state, collateral |
//! | repay     | state, actor is borrower, amount + fee, lender, collateral |
//! | liquidate | actor is lender, state, deadline, height, collateral |

use lendbook_protocol::vault::{Address, Transfer};

use crate::error::LoanError;
use crate::loan::{Loan, LoanState, Operation};

/// The outcome of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The record as it should be persisted.
    pub loan: Loan,
    /// Every movement the ledger must apply, all or nothing.
    pub transfers: Vec<Transfer>,
}

/// Dispatches `op` to its transition.
pub fn apply(
    loan: &Loan,
    op: Operation,
    actor: &Address,
    height: u64,
) -> Result<Transition, LoanError> {
    match op {
        Operation::Approve => approve(loan, actor),
        Operation::Cancel => cancel(loan, actor),
        Operation::Repay => repay(loan, actor),
        Operation::Liquidate => liquidate(loan, actor, height),
    }
}

/// `Requested -> Approved`. The actor funds the principal and becomes the
/// lender. Any account may approve.
pub fn approve(loan: &Loan, actor: &Address) -> Result<Transition, LoanError> {
    require_state(loan, Operation::Approve)?;
    let principal = loan.principal()?;

    let mut next = loan.clone();
    next.lender = Some(actor.clone());
    next.state = LoanState::Approved;

    Ok(Transition {
        loan: next,
        transfers: vec![Transfer::Send {
            from: actor.clone(),
            to: loan.borrower.clone(),
            amount: principal,
        }],
    })
}

/// `Requested -> Cancelled`. Borrower only; collateral comes back.
pub fn cancel(loan: &Loan, actor: &Address) -> Result<Transition, LoanError> {
    require_actor(loan, Operation::Cancel, actor, Some(&loan.borrower))?;
    require_state(loan, Operation::Cancel)?;
    let collateral = loan.collateral()?;

    let mut next = loan.clone();
    next.state = LoanState::Cancelled;

    Ok(Transition {
        loan: next,
        transfers: vec![Transfer::FromEscrow {
            to: loan.borrower.clone(),
            amount: collateral,
        }],
    })
}

/// `Approved -> Repaid`. Borrower pays principal plus fee to the lender and
/// the collateral is released, in a single batch.
pub fn repay(loan: &Loan, actor: &Address) -> Result<Transition, LoanError> {
    require_state(loan, Operation::Repay)?;
    require_actor(loan, Operation::Repay, actor, Some(&loan.borrower))?;

    let owed = loan
        .principal()?
        .checked_add(&loan.fee()?)
        .map_err(|source| LoanError::MalformedAmount {
            id: loan.id,
            field: "fee",
            source,
        })?;
    let lender = approved_lender(loan)?;
    let collateral = loan.collateral()?;

    let mut next = loan.clone();
    next.state = LoanState::Repaid;

    Ok(Transition {
        loan: next,
        transfers: vec![
            Transfer::Send {
                from: actor.clone(),
                to: lender,
                amount: owed,
            },
            Transfer::FromEscrow {
                to: loan.borrower.clone(),
                amount: collateral,
            },
        ],
    })
}

/// `Approved -> Liquidated`. Lender only, once `height >= deadline`.
pub fn liquidate(loan: &Loan, actor: &Address, height: u64) -> Result<Transition, LoanError> {
    require_actor(loan, Operation::Liquidate, actor, loan.lender.as_ref())?;
    require_state(loan, Operation::Liquidate)?;

    let deadline = loan.deadline_height()?;
    if height < deadline {
        return Err(LoanError::DeadlineNotReached {
            id: loan.id,
            deadline,
            height,
        });
    }
    let collateral = loan.collateral()?;

    let mut next = loan.clone();
    next.state = LoanState::Liquidated;

    Ok(Transition {
        loan: next,
        transfers: vec![Transfer::FromEscrow {
            to: actor.clone(),
            amount: collateral,
        }],
    })
}

fn require_state(loan: &Loan, op: Operation) -> Result<(), LoanError> {
    let expected = op.required_state();
    if loan.state != expected {
        return Err(LoanError::InvalidState {
            op,
            id: loan.id,
            actual: loan.state,
            expected,
        });
    }
    Ok(())
}

/// An unset party never matches.
fn require_actor(
    loan: &Loan,
    op: Operation,
    actor: &Address,
    party: Option<&Address>,
) -> Result<(), LoanError> {
    match party {
        Some(party) if party == actor => Ok(()),
        _ => Err(LoanError::Unauthorized {
            op,
            id: loan.id,
            actor: actor.clone(),
        }),
    }
}

fn approved_lender(loan: &Loan) -> Result<Address, LoanError> {
    loan.lender.clone().ok_or_else(|| LoanError::CorruptRecord {
        id: loan.id,
        detail: format!("loan is {} but has no lender", loan.state),
    })
}
