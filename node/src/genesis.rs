//! Genesis balances for a fresh data directory.
//!
//! ```json
//! {"accounts":[{"address":"alice","balance":"1000stake,50atom"}]}
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use lendbook_protocol::storage::LedgerDb;
use lendbook_protocol::vault::{Address, Coins};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Coins,
}

impl Genesis {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read genesis file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid genesis file {}", path.display()))
    }

    /// Credits every account of a fresh database and records height zero.
    /// A database that already holds balances is left untouched.
    pub fn apply(&self, db: &LedgerDb) -> Result<()> {
        let existing = db.balances().context("failed to read existing balances")?;
        if !existing.is_empty() {
            bail!(
                "database already holds {} account(s); genesis applies only to a fresh data directory",
                existing.len()
            );
        }
        for account in &self.accounts {
            db.mint(&account.address, &account.balance)
                .with_context(|| format!("failed to credit genesis account {}", account.address))?;
            tracing::info!(address = %account.address, balance = %account.balance, "genesis account credited");
        }
        db.set_height(0).context("failed to pin genesis height")?;
        db.flush().context("failed to flush genesis state")?;
        Ok(())
    }
}
