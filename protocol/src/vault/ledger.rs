//! # Ledger Capability
//!
//! The [`Ledger`] trait is the bank the loan module talks to. It holds
//! balances, moves coins between accounts and the module escrow, and
//! reports the current block height.
//!
//! The only primitive an implementation must provide is
//! [`Ledger::execute`]: apply a batch of [`Transfer`]s all-or-nothing.
//! The single-transfer helpers are one-item batches. A loan transition
//! that needs two movements (repay: pay the lender, release collateral)
//! submits them as one batch so a failure in the second undoes the first.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::address::Address;
use super::coins::{Coins, CoinsError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors a ledger can report for a transfer batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The source account does not hold enough of a denom.
    #[error("insufficient funds in {account}: required {required}{denom}, available {available}{denom}")]
    InsufficientFunds {
        account: Address,
        denom: String,
        required: u128,
        available: u128,
    },

    /// Crediting would overflow the destination balance.
    #[error("balance overflow in {account} for denom {denom}")]
    Overflow { account: Address, denom: String },

    /// A send or escrow deposit named a module account as its source.
    #[error("module account {0} can only be debited through escrow transfers")]
    ModuleAccountDebit(Address),

    /// The backing store failed or returned unreadable data.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// One coin movement within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transfer {
    /// Account to account.
    Send {
        from: Address,
        to: Address,
        amount: Coins,
    },
    /// Module escrow to account.
    FromEscrow { to: Address, amount: Coins },
    /// Account to module escrow.
    ToEscrow { from: Address, amount: Coins },
}

impl Transfer {
    /// The debited account.
    pub fn source(&self) -> Address {
        match self {
            Transfer::Send { from, .. } | Transfer::ToEscrow { from, .. } => from.clone(),
            Transfer::FromEscrow { .. } => Address::escrow(),
        }
    }

    /// The credited account.
    pub fn destination(&self) -> Address {
        match self {
            Transfer::Send { to, .. } | Transfer::FromEscrow { to, .. } => to.clone(),
            Transfer::ToEscrow { .. } => Address::escrow(),
        }
    }

    pub fn amount(&self) -> &Coins {
        match self {
            Transfer::Send { amount, .. }
            | Transfer::FromEscrow { amount, .. }
            | Transfer::ToEscrow { amount, .. } => amount,
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.source(),
            self.destination(),
            self.amount()
        )
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The bank capability consumed by the loan keeper.
///
/// Methods take `&self`: implementations own their synchronization, so a
/// ledger can be shared behind an `Arc` by the API and the block ticker.
pub trait Ledger: Send + Sync {
    /// Applies every transfer in order, or none of them.
    fn execute(&self, batch: &[Transfer]) -> Result<(), LedgerError>;

    /// Current balance of an account. Unknown accounts hold nothing.
    fn balance(&self, account: &Address) -> Result<Coins, LedgerError>;

    /// The latest block height. Never decreases.
    fn current_height(&self) -> u64;

    fn transfer(&self, from: &Address, to: &Address, amount: &Coins) -> Result<(), LedgerError> {
        self.execute(&[Transfer::Send {
            from: from.clone(),
            to: to.clone(),
            amount: amount.clone(),
        }])
    }

    fn transfer_from_escrow(&self, to: &Address, amount: &Coins) -> Result<(), LedgerError> {
        self.execute(&[Transfer::FromEscrow {
            to: to.clone(),
            amount: amount.clone(),
        }])
    }

    fn transfer_to_escrow(&self, from: &Address, amount: &Coins) -> Result<(), LedgerError> {
        self.execute(&[Transfer::ToEscrow {
            from: from.clone(),
            amount: amount.clone(),
        }])
    }
}

impl<L: Ledger + ?Sized> Ledger for std::sync::Arc<L> {
    fn execute(&self, batch: &[Transfer]) -> Result<(), LedgerError> {
        (**self).execute(batch)
    }

    fn balance(&self, account: &Address) -> Result<Coins, LedgerError> {
        (**self).balance(account)
    }

    fn current_height(&self) -> u64 {
        (**self).current_height()
    }
}

// ---------------------------------------------------------------------------
// Batch application
// ---------------------------------------------------------------------------

/// Working set of balances touched by a batch.
///
/// Backends load the accounts a batch touches into a `Staged`, run
/// [`Staged::apply`], and write back [`Staged::into_balances`] only if
/// every transfer succeeded. Keeps the debit/credit rules in one place for
/// the in-memory and on-disk ledgers.
pub(crate) struct Staged {
    balances: HashMap<Address, Coins>,
}

impl Staged {
    /// Loads the current balance of every account the batch touches.
    pub(crate) fn load<F>(batch: &[Transfer], mut read: F) -> Result<Self, LedgerError>
    where
        F: FnMut(&Address) -> Result<Coins, LedgerError>,
    {
        let mut balances = HashMap::new();
        for account in touched_accounts(batch) {
            let balance = read(&account)?;
            balances.insert(account, balance);
        }
        Ok(Self { balances })
    }

    /// Wraps balances the caller already loaded for this batch.
    pub(crate) fn from_balances(balances: HashMap<Address, Coins>) -> Self {
        Self { balances }
    }

    pub(crate) fn apply(&mut self, batch: &[Transfer]) -> Result<(), LedgerError> {
        for transfer in batch {
            match transfer {
                Transfer::Send { from, .. } | Transfer::ToEscrow { from, .. }
                    if from.is_module() =>
                {
                    return Err(LedgerError::ModuleAccountDebit(from.clone()));
                }
                _ => {}
            }
            self.debit(&transfer.source(), transfer.amount())?;
            self.credit(&transfer.destination(), transfer.amount())?;
        }
        Ok(())
    }

    fn debit(&mut self, account: &Address, amount: &Coins) -> Result<(), LedgerError> {
        let current = self.balances.entry(account.clone()).or_default();
        *current = debit_balance(current, account, amount)?;
        Ok(())
    }

    fn credit(&mut self, account: &Address, amount: &Coins) -> Result<(), LedgerError> {
        let current = self.balances.entry(account.clone()).or_default();
        *current = credit_balance(current, account, amount)?;
        Ok(())
    }

    pub(crate) fn into_balances(self) -> HashMap<Address, Coins> {
        self.balances
    }
}

/// Every account a batch debits or credits, each listed once.
pub(crate) fn touched_accounts(batch: &[Transfer]) -> Vec<Address> {
    let mut seen = Vec::new();
    for transfer in batch {
        for account in [transfer.source(), transfer.destination()] {
            if !seen.contains(&account) {
                seen.push(account);
            }
        }
    }
    seen
}

/// `current - amount`, naming the account on a shortfall.
pub(crate) fn debit_balance(
    current: &Coins,
    account: &Address,
    amount: &Coins,
) -> Result<Coins, LedgerError> {
    current.checked_sub(amount).map_err(|e| match e {
        CoinsError::Insufficient {
            denom,
            required,
            available,
        } => LedgerError::InsufficientFunds {
            account: account.clone(),
            denom,
            required,
            available,
        },
        other => LedgerError::Storage(other.to_string()),
    })
}

/// `current + amount`, naming the account on overflow.
pub(crate) fn credit_balance(
    current: &Coins,
    account: &Address,
    amount: &Coins,
) -> Result<Coins, LedgerError> {
    current.checked_add(amount).map_err(|e| match e {
        CoinsError::Overflow { denom } => LedgerError::Overflow {
            account: account.clone(),
            denom,
        },
        other => LedgerError::Storage(other.to_string()),
    })
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

    fn staged(initial: &[(&str, &str)], batch: &[Transfer]) -> Result<Staged, LedgerError> {
        let initial: HashMap<Address, Coins> = initial
            .iter()
            .map(|(a, c)| (Address::from_stored(a.to_string()).unwrap(), coins(c)))
            .collect();
        Staged::load(batch, |a| Ok(initial.get(a).cloned().unwrap_or_default()))
    }

    #[test]
    fn transfer_endpoints() {
        let t = Transfer::FromEscrow {
            to: addr("bob"),
            amount: coins("5stake"),
        };
        assert_eq!(t.source(), Address::escrow());
        assert_eq!(t.destination(), addr("bob"));
        assert_eq!(t.to_string(), "module:loan -> bob: 5stake");
    }

    #[test]
    fn staged_apply_moves_every_denom() {
        let batch = vec![Transfer::Send {
            from: addr("alice"),
            to: addr("bob"),
            amount: coins("10denomx,3denomy"),
        }];
        let mut s = staged(&[("alice", "10denomx,5denomy")], &batch).unwrap();
        s.apply(&batch).unwrap();
        let balances = s.into_balances();
        assert_eq!(balances[&addr("alice")].to_string(), "2denomy");
        assert_eq!(balances[&addr("bob")].to_string(), "10denomx,3denomy");
    }

    #[test]
    fn staged_apply_reports_short_denom() {
        let batch = vec![Transfer::ToEscrow {
            from: addr("alice"),
            amount: coins("10denomx,9denomy"),
        }];
        let mut s = staged(&[("alice", "10denomx,5denomy")], &batch).unwrap();
        let err = s.apply(&batch).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: addr("alice"),
                denom: "denomy".into(),
                required: 9,
                available: 5,
            }
        );
    }

    #[test]
    fn plain_send_from_module_account_rejected() {
        let batch = vec![Transfer::Send {
            from: Address::escrow(),
            to: addr("mallory"),
            amount: coins("1stake"),
        }];
        let mut s = staged(&[("module:loan", "100stake")], &batch).unwrap();
        assert_eq!(
            s.apply(&batch),
            Err(LedgerError::ModuleAccountDebit(Address::escrow()))
        );
    }

    #[test]
    fn escrow_cannot_deposit_into_itself() {
        let batch = vec![Transfer::ToEscrow {
            from: Address::escrow(),
            amount: coins("50denomy"),
        }];
        let mut s = staged(&[("module:loan", "50denomy")], &batch).unwrap();
        assert_eq!(
            s.apply(&batch),
            Err(LedgerError::ModuleAccountDebit(Address::escrow()))
        );
    }

    #[test]
    fn transfer_serializes_with_kind_tag() {
        let t = Transfer::ToEscrow {
            from: addr("alice"),
            amount: coins("50denomy"),
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["kind"], "to_escrow");
        assert_eq!(json["amount"], "50denomy");
    }
}
