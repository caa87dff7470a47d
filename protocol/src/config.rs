//! # Protocol Configuration & Constants
//!
//! Every magic number in the loan module lives here. Runtime knobs (ports,
//! data directories) belong to the node's CLI; these are the values that
//! define what a valid loan, coin, and escrow look like.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Module Accounts
// ---------------------------------------------------------------------------

/// Name of the loan module. Also the name of its escrow account.
pub const MODULE_NAME: &str = "loan";

/// Prefix that marks an address as module-owned rather than user-owned.
/// Module accounts can only be debited through escrow transfers.
pub const MODULE_ADDRESS_PREFIX: &str = "module:";

// ---------------------------------------------------------------------------
// Coin Parameters
// ---------------------------------------------------------------------------

/// Shortest accepted denomination, e.g. `"atom"` passes, `"ab"` does not.
pub const MIN_DENOM_LENGTH: usize = 3;

/// Longest accepted denomination. Long enough for IBC-style paths.
pub const MAX_DENOM_LENGTH: usize = 128;

/// Non-alphanumeric characters allowed after the first denom character.
pub const DENOM_EXTRA_CHARS: &[char] = &['/', ':', '.', '_', '-'];

/// Separator between items in the canonical coin text form.
pub const COIN_SEPARATOR: char = ',';

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Default interval between block heights on the devnet ticker, in
/// milliseconds.
pub const BLOCK_TIME_MS: u64 = 2_000;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the REST API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denom_bounds_are_sane() {
        assert!(MIN_DENOM_LENGTH >= 1);
        assert!(MIN_DENOM_LENGTH < MAX_DENOM_LENGTH);
        assert!(MODULE_NAME.len() >= MIN_DENOM_LENGTH);
    }
}
