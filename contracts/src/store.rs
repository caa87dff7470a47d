//! # Loan Stores
//!
//! Where loan records live between commands. The keeper only needs
//! read-your-writes within one command, so both stores are simple: a map
//! behind a lock, or two sled trees in the node's database.
//!
//! ## Sled Layout
//!
//! | Tree        | Key              | Value            |
//! |-------------|------------------|------------------|
//! | `loans`     | id (u64, BE)     | `bincode(Loan)`  |
//! | `loan_meta` | `next_id`        | u64, BE          |
//!
//! Big-endian ids keep sled's key order equal to id order, so listing is a
//! plain tree scan.

use parking_lot::RwLock;
use sled::Tree;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lendbook_protocol::storage::{DbError, LedgerDb};

use crate::loan::{Loan, LoanId};

const LOANS_TREE: &str = "loans";
const META_TREE: &str = "loan_meta";
const META_NEXT_ID: &[u8] = b"next_id";

/// Errors from a loan store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("loan id space exhausted")]
    IdsExhausted,
}

/// Persistence for loan records.
pub trait LoanStore: Send + Sync {
    fn get(&self, id: LoanId) -> Result<Option<Loan>, StoreError>;

    /// Inserts or replaces the record under `loan.id`.
    fn put(&self, loan: &Loan) -> Result<(), StoreError>;

    /// Hands out the next unused id. Ids start at 0 and are never reused.
    fn next_id(&self) -> Result<LoanId, StoreError>;

    /// Every record, ordered by id.
    fn list(&self) -> Result<Vec<Loan>, StoreError>;
}

impl<S: LoanStore + ?Sized> LoanStore for Arc<S> {
    fn get(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        (**self).get(id)
    }

    fn put(&self, loan: &Loan) -> Result<(), StoreError> {
        (**self).put(loan)
    }

    fn next_id(&self) -> Result<LoanId, StoreError> {
        (**self).next_id()
    }

    fn list(&self) -> Result<Vec<Loan>, StoreError> {
        (**self).list()
    }
}

// ---------------------------------------------------------------------------
// MemoryLoanStore
// ---------------------------------------------------------------------------

/// Loan records in a map. Used by tests and benches.
#[derive(Debug, Default)]
pub struct MemoryLoanStore {
    loans: RwLock<BTreeMap<LoanId, Loan>>,
    next_id: AtomicU64,
}

impl MemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.loans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.read().is_empty()
    }
}

impl LoanStore for MemoryLoanStore {
    fn get(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        Ok(self.loans.read().get(&id).cloned())
    }

    fn put(&self, loan: &Loan) -> Result<(), StoreError> {
        self.loans.write().insert(loan.id, loan.clone());
        Ok(())
    }

    fn next_id(&self) -> Result<LoanId, StoreError> {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map(LoanId)
            .map_err(|_| StoreError::IdsExhausted)
    }

    fn list(&self) -> Result<Vec<Loan>, StoreError> {
        Ok(self.loans.read().values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// SledLoanStore
// ---------------------------------------------------------------------------

/// Loan records in the node's sled database, next to the balances.
#[derive(Debug, Clone)]
pub struct SledLoanStore {
    loans: Tree,
    meta: Tree,
}

impl SledLoanStore {
    /// Opens (or creates) the loan trees inside `db`.
    pub fn new(db: &LedgerDb) -> Result<Self, StoreError> {
        Ok(Self {
            loans: db.open_tree(LOANS_TREE)?,
            meta: db.open_tree(META_TREE)?,
        })
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }
}

impl LoanStore for SledLoanStore {
    fn get(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        self.loans
            .get(id.to_key())?
            .map(|bytes| decode_loan(&bytes))
            .transpose()
    }

    fn put(&self, loan: &Loan) -> Result<(), StoreError> {
        self.loans.insert(loan.id.to_key(), encode_loan(loan)?)?;
        Ok(())
    }

    fn next_id(&self) -> Result<LoanId, StoreError> {
        // Compare-and-swap so two writers never draw the same id.
        loop {
            let current = self.meta.get(META_NEXT_ID)?;
            let id = match &current {
                Some(bytes) => decode_u64(bytes)?,
                None => 0,
            };
            let next = id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
            let swapped = self.meta.compare_and_swap(
                META_NEXT_ID,
                current,
                Some(next.to_be_bytes().to_vec()),
            )?;
            if swapped.is_ok() {
                return Ok(LoanId(id));
            }
        }
    }

    fn list(&self) -> Result<Vec<Loan>, StoreError> {
        self.loans
            .iter()
            .values()
            .map(|value| decode_loan(&value?))
            .collect()
    }
}

fn encode_loan(loan: &Loan) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(loan).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_loan(bytes: &[u8]) -> Result<Loan, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Serialization("next_id must be 8 bytes".into()))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::LoanState;
    use lendbook_protocol::vault::Address;

    fn loan(id: u64) -> Loan {
        Loan::requested(
            LoanId(id),
            Address::new("borrower").unwrap(),
            &"100denomx".parse().unwrap(),
            &"".parse().unwrap(),
            &"50denomy".parse().unwrap(),
            1000,
        )
    }

    fn exercise(store: &dyn LoanStore) {
        assert_eq!(store.next_id().unwrap(), LoanId(0));
        assert_eq!(store.next_id().unwrap(), LoanId(1));
        assert!(store.get(LoanId(0)).unwrap().is_none());

        store.put(&loan(1)).unwrap();
        store.put(&loan(0)).unwrap();

        let mut updated = loan(1);
        updated.state = LoanState::Cancelled;
        store.put(&updated).unwrap();

        assert_eq!(store.get(LoanId(1)).unwrap(), Some(updated));
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![LoanId(0), LoanId(1)]);
    }

    #[test]
    fn memory_store_basics() {
        let store = MemoryLoanStore::new();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sled_store_basics() {
        let db = LedgerDb::open_temporary().unwrap();
        let store = SledLoanStore::new(&db).unwrap();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sled_list_orders_past_one_byte() {
        let db = LedgerDb::open_temporary().unwrap();
        let store = SledLoanStore::new(&db).unwrap();
        for id in [300, 2, 256, 1] {
            store.put(&loan(id)).unwrap();
        }
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![1, 2, 256, 300]);
    }

    #[test]
    fn memory_ids_exhaust() {
        let store = MemoryLoanStore::new();
        store.next_id.store(u64::MAX, Ordering::SeqCst);
        assert!(matches!(store.next_id(), Err(StoreError::IdsExhausted)));
    }

    #[test]
    fn corrupt_next_id_is_an_error() {
        let db = LedgerDb::open_temporary().unwrap();
        let store = SledLoanStore::new(&db).unwrap();
        store.meta.insert(META_NEXT_ID, &b"bad"[..]).unwrap();
        assert!(matches!(store.next_id(), Err(StoreError::Serialization(_))));
    }
}
