//! # LedgerDb — Persistent Ledger
//!
//! A [`Ledger`] built on sled's embedded key-value store. Balances and the
//! block height survive restarts, and other stores (the loan store) can
//! open their own trees in the same database.
//!
//! ## Tree Layout
//!
//! | Tree       | Key               | Value                       |
//! |------------|-------------------|-----------------------------|
//! | `accounts` | address (UTF-8)   | `bincode(Coins)`            |
//! | `metadata` | key (UTF-8)       | value (bytes)               |
//!
//! The height is stored under `block_height` as a big-endian u64.
//!
//! ## Atomicity
//!
//! A transfer batch runs inside one sled transaction on `accounts`: every
//! touched balance is read, staged, and written back in the same
//! transaction, or the transaction aborts and nothing changes.

use sled::transaction::{abort, TransactionError};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::vault::coins::Coins;
use crate::vault::ledger::{credit_balance, touched_accounts, Staged};
use crate::vault::{Address, Ledger, LedgerError, Transfer};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the current block height.
const META_BLOCK_HEIGHT: &[u8] = b"block_height";

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent ledger backed by sled.
///
/// sled trees are safe to share across threads, so `LedgerDb` can sit
/// behind an `Arc` and serve the API, the block ticker, and the keeper
/// at once. The height is cached in memory and written through.
#[derive(Debug)]
pub struct LedgerDb {
    db: Db,
    accounts: Tree,
    metadata: Tree,
    height: AtomicU64,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// In-memory database for tests. Nothing touches the filesystem.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let metadata = db.open_tree("metadata")?;

        let height = match metadata.get(META_BLOCK_HEIGHT)? {
            Some(bytes) => decode_height(&bytes)?,
            None => 0,
        };

        Ok(Self {
            db,
            accounts,
            metadata,
            height: AtomicU64::new(height),
        })
    }

    /// Open a named sled tree from the underlying database.
    ///
    /// Used by higher-level stores (the loan store) that keep their own
    /// keyspace next to the balances. Created if it doesn't exist.
    pub fn open_tree(&self, name: &str) -> DbResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    // -- Balances ------------------------------------------------------------

    /// Credits coins to an account outside of any transfer. Genesis only.
    pub fn mint(&self, account: &Address, amount: &Coins) -> DbResult<()> {
        let current = self.read_balance(account)?;
        let updated = credit_balance(&current, account, amount)?;
        self.accounts
            .insert(account.as_bytes(), encode_coins(&updated)?)?;
        Ok(())
    }

    fn read_balance(&self, account: &Address) -> DbResult<Coins> {
        match self.accounts.get(account.as_bytes())? {
            Some(bytes) => decode_coins(&bytes),
            None => Ok(Coins::empty()),
        }
    }

    /// Every stored balance, in address order.
    pub fn balances(&self) -> DbResult<Vec<(Address, Coins)>> {
        let mut out = Vec::new();
        for entry in self.accounts.iter() {
            let (key, value) = entry?;
            let address = String::from_utf8(key.to_vec())
                .ok()
                .and_then(Address::from_stored)
                .ok_or_else(|| DbError::Serialization("invalid account key".into()))?;
            out.push((address, decode_coins(&value)?));
        }
        Ok(out)
    }

    // -- Height --------------------------------------------------------------

    /// Moves the height forward to `height`. Lower values are ignored.
    pub fn set_height(&self, height: u64) -> DbResult<u64> {
        let previous = self.height.fetch_max(height, Ordering::SeqCst);
        let current = previous.max(height);
        self.metadata
            .insert(META_BLOCK_HEIGHT, &current.to_be_bytes())?;
        Ok(current)
    }

    /// Advances the height by one block and returns the new height.
    pub fn advance_height(&self) -> DbResult<u64> {
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        self.metadata
            .insert(META_BLOCK_HEIGHT, &height.to_be_bytes())?;
        Ok(height)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Ledger for LedgerDb {
    fn execute(&self, batch: &[Transfer]) -> Result<(), LedgerError> {
        let accounts = touched_accounts(batch);

        let result = self.accounts.transaction(|tx| {
            let mut loaded = HashMap::with_capacity(accounts.len());
            for account in &accounts {
                let balance = match tx.get(account.as_bytes())? {
                    Some(bytes) => decode_coins(&bytes)
                        .map_err(|e| LedgerError::Storage(e.to_string()))
                        .or_else(abort)?,
                    None => Coins::empty(),
                };
                loaded.insert(account.clone(), balance);
            }

            let mut staged = Staged::from_balances(loaded);
            staged.apply(batch).or_else(abort)?;

            for (account, coins) in staged.into_balances() {
                let bytes = encode_coins(&coins)
                    .map_err(|e| LedgerError::Storage(e.to_string()))
                    .or_else(abort)?;
                tx.insert(account.as_bytes(), bytes)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => {
                tracing::debug!(error = %e, transfers = batch.len(), "transfer batch rejected");
                Err(e)
            }
            Err(TransactionError::Storage(e)) => Err(LedgerError::Storage(e.to_string())),
        }
    }

    fn balance(&self, account: &Address) -> Result<Coins, LedgerError> {
        self.read_balance(account)
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn current_height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn encode_coins(coins: &Coins) -> DbResult<Vec<u8>> {
    bincode::serialize(coins).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_coins(bytes: &[u8]) -> DbResult<Coins> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_height(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("block height must be 8 bytes".into()))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
