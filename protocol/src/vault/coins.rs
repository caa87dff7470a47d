//! # Multi-Asset Coins
//!
//! A [`Coins`] value is a set of `(denom, amount)` pairs, one per
//! denomination. Loans carry three of them (principal, fee, collateral),
//! and every ledger transfer moves one atomically.
//!
//! ## Canonical Text Form
//!
//! ```text
//! 100denomx,5denomy
//! ```
//!
//! Items are `<digits><denom>`, comma-separated. Parsing tolerates spaces,
//! drops zero-amount items, and sorts by denom, so `"5denomy, 100denomx"`
//! and `"100denomx,0other,5denomy"` both print back as the line above.
//! Negative amounts, decimals, and repeated denoms are rejected. The empty
//! string is the empty value.
//!
//! Amounts are `u128`. Arithmetic is checked: an overflow is an error,
//! an underflow is an [`CoinsError::Insufficient`] naming the short denom.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{COIN_SEPARATOR, DENOM_EXTRA_CHARS, MAX_DENOM_LENGTH, MIN_DENOM_LENGTH};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing or combining coin values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoinsError {
    /// The item does not start with an amount, or is otherwise unreadable.
    #[error("malformed coin {0:?}")]
    Malformed(String),

    /// The item carries a minus sign. Balances never go below zero.
    #[error("negative amount in coin {0:?}")]
    NegativeAmount(String),

    /// The amount does not fit in 128 bits.
    #[error("amount too large in coin {0:?}")]
    AmountTooLarge(String),

    /// The denomination violates the length or character rules.
    #[error("invalid denom {0:?}")]
    InvalidDenom(String),

    /// The same denomination appears twice in one value.
    #[error("duplicate denom {0:?}")]
    DuplicateDenom(String),

    /// Adding would exceed `u128::MAX` for this denom.
    #[error("amount overflow in denom {denom}")]
    Overflow { denom: String },

    /// Subtracting would take this denom below zero.
    #[error("insufficient {denom}: required {required}, available {available}")]
    Insufficient {
        denom: String,
        required: u128,
        available: u128,
    },
}

// ---------------------------------------------------------------------------
// Coin
// ---------------------------------------------------------------------------

/// A single denomination and amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coin {
    denom: String,
    amount: u128,
}

impl Coin {
    /// Builds a coin, validating the denom.
    pub fn new(amount: u128, denom: impl Into<String>) -> Result<Self, CoinsError> {
        let denom = denom.into();
        validate_denom(&denom)?;
        Ok(Self { denom, amount })
    }

    pub fn denom(&self) -> &str {
        &self.denom
    }

    pub fn amount(&self) -> u128 {
        self.amount
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = CoinsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let item = s.trim();
        if item.starts_with('-') {
            return Err(CoinsError::NegativeAmount(item.to_string()));
        }

        let split = item
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(item.len());
        let (digits, rest) = item.split_at(split);
        if digits.is_empty() || rest.starts_with('.') {
            return Err(CoinsError::Malformed(item.to_string()));
        }

        let amount = digits
            .parse::<u128>()
            .map_err(|_| CoinsError::AmountTooLarge(item.to_string()))?;

        Coin::new(amount, rest.trim_start())
    }
}

/// Checks a denomination against the protocol rules.
///
/// First character must be an ASCII letter; the rest alphanumeric or one
/// of [`DENOM_EXTRA_CHARS`].
pub fn validate_denom(denom: &str) -> Result<(), CoinsError> {
    let invalid = || CoinsError::InvalidDenom(denom.to_string());

    if denom.len() < MIN_DENOM_LENGTH || denom.len() > MAX_DENOM_LENGTH {
        return Err(invalid());
    }

    let mut chars = denom.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }

    if chars.all(|c| c.is_ascii_alphanumeric() || DENOM_EXTRA_CHARS.contains(&c)) {
        Ok(())
    } else {
        Err(invalid())
    }
}

// ---------------------------------------------------------------------------
// Coins
// ---------------------------------------------------------------------------

/// A normalized multi-asset value: sorted by denom, no zero amounts,
/// no repeated denoms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// The empty value.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Normalizes a list of coins. Zero amounts are dropped; duplicates
    /// are an error rather than silently merged.
    pub fn new(coins: Vec<Coin>) -> Result<Self, CoinsError> {
        let mut by_denom = BTreeMap::new();
        for coin in coins {
            if by_denom.contains_key(&coin.denom) {
                return Err(CoinsError::DuplicateDenom(coin.denom));
            }
            by_denom.insert(coin.denom, coin.amount);
        }
        Ok(Self::from_map(by_denom))
    }

    /// Shorthand for a single-denom value.
    pub fn single(amount: u128, denom: impl Into<String>) -> Result<Self, CoinsError> {
        Self::new(vec![Coin::new(amount, denom)?])
    }

    fn from_map(map: BTreeMap<String, u128>) -> Self {
        Self(
            map.into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    fn to_map(&self) -> BTreeMap<String, u128> {
        self.0
            .iter()
            .map(|c| (c.denom.clone(), c.amount))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct denoms.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    /// Amount held in `denom`, zero if absent.
    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    /// Per-denom sum.
    pub fn checked_add(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut merged = self.to_map();
        for coin in &other.0 {
            let slot = merged.entry(coin.denom.clone()).or_insert(0);
            *slot = slot
                .checked_add(coin.amount)
                .ok_or_else(|| CoinsError::Overflow {
                    denom: coin.denom.clone(),
                })?;
        }
        Ok(Self::from_map(merged))
    }

    /// Per-denom difference. Fails on the first denom that would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut remaining = self.to_map();
        for coin in &other.0 {
            let available = remaining.get(&coin.denom).copied().unwrap_or(0);
            let left = available
                .checked_sub(coin.amount)
                .ok_or_else(|| CoinsError::Insufficient {
                    denom: coin.denom.clone(),
                    required: coin.amount,
                    available,
                })?;
            remaining.insert(coin.denom.clone(), left);
        }
        Ok(Self::from_map(remaining))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, coin) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{COIN_SEPARATOR}")?;
            }
            write!(f, "{coin}")?;
        }
        Ok(())
    }
}

impl FromStr for Coins {
    type Err = CoinsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::empty());
        }
        let coins = s
            .split(COIN_SEPARATOR)
            .map(str::parse::<Coin>)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(coins)
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// Coins travel as their canonical text, both in JSON and on disk.

impl Serialize for Coins {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    #[test]
    fn parse_sorts_and_drops_zeros() {
        let c = coins(" 5denomy, 0other ,100denomx");
        assert_eq!(c.to_string(), "100denomx,5denomy");
        assert_eq!(c.len(), 2);
        assert_eq!(c.amount_of("denomx"), 100);
        assert_eq!(c.amount_of("other"), 0);
    }

    #[test]
    fn empty_string_is_empty_value() {
        assert!(coins("").is_empty());
        assert!(coins("   ").is_empty());
        assert_eq!(Coins::empty().to_string(), "");
    }

    #[test]
    fn space_between_amount_and_denom_is_tolerated() {
        assert_eq!(coins("10 stake").to_string(), "10stake");
    }

    #[test]
    fn negative_amount_rejected() {
        assert_eq!(
            "-5stake".parse::<Coins>(),
            Err(CoinsError::NegativeAmount("-5stake".into()))
        );
    }

    #[test]
    fn decimal_amount_rejected() {
        assert!(matches!(
            "1.5stake".parse::<Coins>(),
            Err(CoinsError::Malformed(_))
        ));
    }

    #[test]
    fn missing_amount_rejected() {
        assert!(matches!(
            "stake".parse::<Coins>(),
            Err(CoinsError::Malformed(_))
        ));
        assert!(matches!(
            "10stake,,5atom".parse::<Coins>(),
            Err(CoinsError::Malformed(_))
        ));
    }

    #[test]
    fn bad_denoms_rejected() {
        for bad in ["10ab", "10 1abc", "10st@ke", "10"] {
            assert!(
                matches!(bad.parse::<Coins>(), Err(CoinsError::InvalidDenom(_))),
                "{bad} should be rejected"
            );
        }
        assert!("10ibc/27A6".parse::<Coins>().is_ok());
    }

    #[test]
    fn duplicate_denom_rejected() {
        assert_eq!(
            "1stake,2stake".parse::<Coins>(),
            Err(CoinsError::DuplicateDenom("stake".into()))
        );
    }

    #[test]
    fn oversized_amount_rejected() {
        let huge = format!("{}0stake", u128::MAX);
        assert!(matches!(
            huge.parse::<Coins>(),
            Err(CoinsError::AmountTooLarge(_))
        ));
    }

    #[test]
    fn add_is_per_denom() {
        let principal = coins("100denomx");
        let fee = coins("5denomx,1denomz");
        assert_eq!(
            principal.checked_add(&fee).unwrap().to_string(),
            "105denomx,1denomz"
        );
    }

    #[test]
    fn add_overflow_is_error() {
        let max = Coins::single(u128::MAX, "stake").unwrap();
        let one = Coins::single(1, "stake").unwrap();
        assert_eq!(
            max.checked_add(&one),
            Err(CoinsError::Overflow {
                denom: "stake".into()
            })
        );
    }

    #[test]
    fn sub_reports_short_denom() {
        let have = coins("50denomy,10denomx");
        let want = coins("5denomx,60denomy");
        assert_eq!(
            have.checked_sub(&want),
            Err(CoinsError::Insufficient {
                denom: "denomy".into(),
                required: 60,
                available: 50,
            })
        );
    }

    #[test]
    fn sub_to_zero_removes_denom() {
        let have = coins("50denomy,10denomx");
        let left = have.checked_sub(&coins("10denomx")).unwrap();
        assert_eq!(left.to_string(), "50denomy");
    }

    #[test]
    fn serde_uses_canonical_text() {
        let c = coins("5denomy,100denomx");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"100denomx,5denomy\"");
        let back: Coins = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<Coins>("\"-1stake\"").is_err());
    }
}
