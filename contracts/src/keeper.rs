//! # Loan Keeper
//!
//! Wires the state machine to a [`Ledger`] and a [`LoanStore`]. For each
//! command the keeper loads the record, reads the height, asks
//! [`machine::apply`] what should happen, submits the transfer batch, and
//! writes the new record last. A rejected batch leaves both balances and
//! record exactly as they were.
//!
//! The keeper does not serialize commands itself. Callers that share one
//! keeper across tasks put it behind a lock (the node uses a tokio mutex).

use tracing::{error, info, warn};

use lendbook_protocol::vault::{Address, Ledger};

use crate::error::LoanError;
use crate::loan::{Loan, LoanId, LoanMsg, LoanRequest, LoanResponse, LoanState, Operation};
use crate::machine;
use crate::store::LoanStore;

/// Executes loan commands against a ledger and a store.
#[derive(Debug)]
pub struct LoanKeeper<L, S> {
    ledger: L,
    store: S,
}

impl<L: Ledger, S: LoanStore> LoanKeeper<L, S> {
    pub fn new(ledger: L, store: S) -> Self {
        Self { ledger, store }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -- Commands ------------------------------------------------------------

    /// Locks the borrower's collateral in escrow and records a new loan.
    pub fn request_loan(&self, request: LoanRequest) -> Result<LoanResponse, LoanError> {
        let borrower = request.borrower.clone();
        match self.try_request(request) {
            Ok(response) => {
                info!(
                    loan_id = %response.loan_id,
                    borrower = %borrower,
                    state = %response.state,
                    "loan requested"
                );
                Ok(response)
            }
            Err(e) => {
                self.log_failure("request", None, &borrower, &e);
                Err(e)
            }
        }
    }

    fn try_request(&self, request: LoanRequest) -> Result<LoanResponse, LoanError> {
        if request.borrower.is_module() {
            return Err(LoanError::InvalidRequest(format!(
                "borrower {} is a module account",
                request.borrower
            )));
        }
        if request.amount.is_empty() {
            return Err(LoanError::InvalidRequest("amount must not be empty".into()));
        }
        if request.collateral.is_empty() {
            return Err(LoanError::InvalidRequest(
                "collateral must not be empty".into(),
            ));
        }
        let height = self.ledger.current_height();
        if request.deadline <= height {
            return Err(LoanError::InvalidRequest(format!(
                "deadline {} must be after current height {height}",
                request.deadline
            )));
        }

        // An id burned by a rejected deposit leaves a gap; collateral must
        // never sit in escrow without a record.
        let id = self.store.next_id()?;
        self.ledger
            .transfer_to_escrow(&request.borrower, &request.collateral)?;

        let loan = Loan::requested(
            id,
            request.borrower,
            &request.amount,
            &request.fee,
            &request.collateral,
            request.deadline,
        );
        self.persist(&loan)?;

        Ok(LoanResponse {
            loan_id: id,
            state: loan.state,
        })
    }

    /// Runs one transition.
    pub fn execute(&self, msg: &LoanMsg) -> Result<LoanResponse, LoanError> {
        match self.try_execute(msg) {
            Ok(response) => {
                info!(
                    loan_id = %msg.loan_id,
                    op = %msg.op,
                    actor = %msg.actor,
                    state = %response.state,
                    terminal = response.state.is_terminal(),
                    "loan transition applied"
                );
                Ok(response)
            }
            Err(e) => {
                self.log_failure(msg.op.as_str(), Some(msg.loan_id), &msg.actor, &e);
                Err(e)
            }
        }
    }

    fn try_execute(&self, msg: &LoanMsg) -> Result<LoanResponse, LoanError> {
        let loan = self.loan(msg.loan_id)?;
        let height = self.ledger.current_height();

        let transition = machine::apply(&loan, msg.op, &msg.actor, height)?;
        self.ledger.execute(&transition.transfers)?;
        self.persist(&transition.loan)?;

        Ok(LoanResponse {
            loan_id: transition.loan.id,
            state: transition.loan.state,
        })
    }

    /// The last step of a command. Funds have already moved when this
    /// fails, so it is always logged as an error.
    fn persist(&self, loan: &Loan) -> Result<(), LoanError> {
        self.store.put(loan).map_err(|e| {
            error!(loan_id = %loan.id, state = %loan.state, error = %e, "loan write failed after transfers");
            LoanError::from(e)
        })
    }

    fn log_failure(&self, op: &str, loan_id: Option<LoanId>, actor: &Address, e: &LoanError) {
        let loan_id = loan_id.map(|id| id.0);
        if e.is_internal_fault() {
            error!(?loan_id, op, actor = %actor, kind = e.kind(), error = %e, "loan record is corrupt");
        } else if matches!(e, LoanError::Store(_)) {
            error!(?loan_id, op, actor = %actor, error = %e, "loan store failed");
        } else {
            warn!(?loan_id, op, actor = %actor, kind = e.kind(), error = %e, "loan command rejected");
        }
    }

    pub fn approve(&self, id: LoanId, actor: &Address) -> Result<LoanResponse, LoanError> {
        self.execute(&LoanMsg::new(Operation::Approve, id, actor.clone()))
    }

    pub fn cancel(&self, id: LoanId, actor: &Address) -> Result<LoanResponse, LoanError> {
        self.execute(&LoanMsg::new(Operation::Cancel, id, actor.clone()))
    }

    pub fn repay(&self, id: LoanId, actor: &Address) -> Result<LoanResponse, LoanError> {
        self.execute(&LoanMsg::new(Operation::Repay, id, actor.clone()))
    }

    pub fn liquidate(&self, id: LoanId, actor: &Address) -> Result<LoanResponse, LoanError> {
        self.execute(&LoanMsg::new(Operation::Liquidate, id, actor.clone()))
    }

    // -- Queries -------------------------------------------------------------

    pub fn loan(&self, id: LoanId) -> Result<Loan, LoanError> {
        self.store.get(id)?.ok_or(LoanError::NotFound(id))
    }

    /// All loans ordered by id, optionally only those in `state`.
    pub fn loans(&self, state: Option<LoanState>) -> Result<Vec<Loan>, LoanError> {
        let mut loans = self.store.list()?;
        if let Some(state) = state {
            loans.retain(|loan| loan.state == state);
        }
        Ok(loans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryLoanStore, StoreError};
    use lendbook_protocol::vault::{Bank, Coins};

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn keeper() -> LoanKeeper<Bank, MemoryLoanStore> {
        let bank = Bank::new();
        bank.mint(&addr("borrower"), &coins("50denomy")).unwrap();
        bank.mint(&addr("lender"), &coins("100denomx")).unwrap();
        LoanKeeper::new(bank, MemoryLoanStore::new())
    }

    fn request(deadline: u64) -> LoanRequest {
        LoanRequest {
            borrower: addr("borrower"),
            amount: coins("100denomx"),
            fee: coins("5denomx"),
            collateral: coins("50denomy"),
            deadline,
        }
    }

    #[test]
    fn request_escrows_collateral() {
        let k = keeper();
        let resp = k.request_loan(request(100)).unwrap();
        assert_eq!(resp.loan_id, LoanId(0));
        assert_eq!(resp.state, LoanState::Requested);
        assert_eq!(k.ledger().balance(&Address::escrow()).unwrap(), coins("50denomy"));
        assert!(k.ledger().balance(&addr("borrower")).unwrap().is_empty());

        let loan = k.loan(LoanId(0)).unwrap();
        assert_eq!(loan.collateral, "50denomy");
        assert_eq!(loan.fee, "5denomx");
    }

    #[test]
    fn request_rejects_past_deadline() {
        let k = keeper();
        k.ledger().set_height(10);
        let err = k.request_loan(request(10)).unwrap_err();
        assert!(matches!(err, LoanError::InvalidRequest(_)));
        assert!(k.store().is_empty());
    }

    #[test]
    fn request_rejects_empty_amount_or_collateral() {
        let k = keeper();
        let mut req = request(100);
        req.amount = Coins::empty();
        assert!(matches!(k.request_loan(req), Err(LoanError::InvalidRequest(_))));

        let mut req = request(100);
        req.collateral = Coins::empty();
        assert!(matches!(k.request_loan(req), Err(LoanError::InvalidRequest(_))));
    }

    #[test]
    fn request_without_collateral_funds_persists_nothing() {
        let k = keeper();
        let mut req = request(100);
        req.collateral = coins("51denomy");
        let err = k.request_loan(req).unwrap_err();
        assert!(matches!(err, LoanError::TransferFailed(_)));
        assert!(k.store().is_empty());
        assert_eq!(k.ledger().balance(&addr("borrower")).unwrap(), coins("50denomy"));
    }

    #[test]
    fn module_borrower_is_rejected() {
        let k = keeper();
        let mut req = request(100);
        req.borrower = Address::escrow();
        let err = k.request_loan(req).unwrap_err();
        assert!(matches!(err, LoanError::InvalidRequest(_)));
        assert!(k.store().is_empty());
    }

    /// Hands out no ids at all.
    struct ExhaustedStore(MemoryLoanStore);

    impl LoanStore for ExhaustedStore {
        fn get(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
            self.0.get(id)
        }

        fn put(&self, loan: &Loan) -> Result<(), StoreError> {
            self.0.put(loan)
        }

        fn next_id(&self) -> Result<LoanId, StoreError> {
            Err(StoreError::IdsExhausted)
        }

        fn list(&self) -> Result<Vec<Loan>, StoreError> {
            self.0.list()
        }
    }

    #[test]
    fn exhausted_ids_leave_collateral_with_borrower() {
        let bank = Bank::new();
        bank.mint(&addr("borrower"), &coins("50denomy")).unwrap();
        let k = LoanKeeper::new(bank, ExhaustedStore(MemoryLoanStore::new()));

        let err = k.request_loan(request(100)).unwrap_err();
        assert!(matches!(err, LoanError::Store(StoreError::IdsExhausted)));
        assert_eq!(k.ledger().balance(&addr("borrower")).unwrap(), coins("50denomy"));
        assert!(k.ledger().balance(&Address::escrow()).unwrap().is_empty());
    }

    #[test]
    fn unknown_loan_is_not_found() {
        let k = keeper();
        let err = k.approve(LoanId(42), &addr("lender")).unwrap_err();
        assert!(matches!(err, LoanError::NotFound(LoanId(42))));
    }

    #[test]
    fn loans_filter_by_state() {
        let k = keeper();
        k.ledger().mint(&addr("borrower"), &coins("50denomy")).unwrap();
        k.request_loan(request(100)).unwrap();
        k.request_loan(request(100)).unwrap();
        k.approve(LoanId(1), &addr("lender")).unwrap();

        assert_eq!(k.loans(None).unwrap().len(), 2);
        let approved = k.loans(Some(LoanState::Approved)).unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, LoanId(1));
        assert!(k.loans(Some(LoanState::Repaid)).unwrap().is_empty());
    }
}
