//! # In-Memory Bank
//!
//! A [`Ledger`] that keeps balances in a `HashMap` behind a
//! `parking_lot::RwLock`. Used by tests, benches, and anywhere the chain
//! state does not need to survive a restart.
//!
//! Batches are staged on copies of the touched balances and committed
//! under the same write lock, so concurrent readers never observe half a
//! batch.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::address::Address;
use super::coins::Coins;
use super::ledger::{credit_balance, Ledger, LedgerError, Staged, Transfer};

/// In-memory balances plus a block height counter.
#[derive(Debug, Default)]
pub struct Bank {
    balances: RwLock<HashMap<Address, Coins>>,
    height: AtomicU64,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bank whose height starts at `height`.
    pub fn at_height(height: u64) -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            height: AtomicU64::new(height),
        }
    }

    /// Credits coins out of thin air. Genesis and test funding only.
    pub fn mint(&self, account: &Address, amount: &Coins) -> Result<(), LedgerError> {
        let mut balances = self.balances.write();
        let current = balances.entry(account.clone()).or_default();
        *current = credit_balance(current, account, amount)?;
        Ok(())
    }

    /// Moves the height forward. Lower values are ignored so the clock
    /// never runs backwards.
    pub fn set_height(&self, height: u64) {
        self.height.fetch_max(height, Ordering::SeqCst);
    }

    /// Advances the height by one block and returns the new height.
    pub fn advance_height(&self) -> u64 {
        self.height.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Snapshot of every non-empty balance. Handy for conservation checks.
    pub fn balances(&self) -> HashMap<Address, Coins> {
        self.balances
            .read()
            .iter()
            .filter(|(_, coins)| !coins.is_empty())
            .map(|(a, c)| (a.clone(), c.clone()))
            .collect()
    }
}

impl Ledger for Bank {
    fn execute(&self, batch: &[Transfer]) -> Result<(), LedgerError> {
        let mut balances = self.balances.write();

        let mut staged = Staged::load(batch, |account| {
            Ok(balances.get(account).cloned().unwrap_or_default())
        })?;
        if let Err(e) = staged.apply(batch) {
            tracing::debug!(error = %e, transfers = batch.len(), "transfer batch rejected");
            return Err(e);
        }

        for (account, coins) in staged.into_balances() {
            balances.insert(account, coins);
        }
        tracing::trace!(transfers = batch.len(), "transfer batch committed");
        Ok(())
    }

    fn balance(&self, account: &Address) -> Result<Coins, LedgerError> {
        Ok(self
            .balances
            .read()
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    fn current_height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn funded_bank() -> Bank {
        let bank = Bank::new();
        bank.mint(&addr("alice"), &coins("100denomx,50denomy")).unwrap();
        bank.mint(&addr("bob"), &coins("10denomx")).unwrap();
        bank
    }

    #[test]
    fn unknown_account_has_empty_balance() {
        let bank = Bank::new();
        assert!(bank.balance(&addr("nobody")).unwrap().is_empty());
    }

    #[test]
    fn transfer_moves_funds() {
        let bank = funded_bank();
        bank.transfer(&addr("alice"), &addr("bob"), &coins("40denomx"))
            .unwrap();
        assert_eq!(bank.balance(&addr("alice")).unwrap().to_string(), "60denomx,50denomy");
        assert_eq!(bank.balance(&addr("bob")).unwrap().to_string(), "50denomx");
    }

    #[test]
    fn escrow_round_trip() {
        let bank = funded_bank();
        bank.transfer_to_escrow(&addr("alice"), &coins("50denomy"))
            .unwrap();
        assert_eq!(bank.balance(&Address::escrow()).unwrap().to_string(), "50denomy");

        bank.transfer_from_escrow(&addr("alice"), &coins("50denomy"))
            .unwrap();
        assert!(bank.balance(&Address::escrow()).unwrap().is_empty());
        assert_eq!(bank.balance(&addr("alice")).unwrap().to_string(), "100denomx,50denomy");
    }

    #[test]
    fn failed_batch_leaves_balances_untouched() {
        let bank = funded_bank();
        let before = bank.balances();

        // First leg succeeds on its own, second leg cannot.
        let batch = vec![
            Transfer::Send {
                from: addr("alice"),
                to: addr("bob"),
                amount: coins("100denomx"),
            },
            Transfer::FromEscrow {
                to: addr("alice"),
                amount: coins("1denomy"),
            },
        ];
        let err = bank.execute(&batch).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(bank.balances(), before);
    }

    #[test]
    fn height_is_monotonic() {
        let bank = Bank::at_height(10);
        assert_eq!(bank.current_height(), 10);
        bank.set_height(5);
        assert_eq!(bank.current_height(), 10);
        bank.set_height(1000);
        assert_eq!(bank.advance_height(), 1001);
    }
}
