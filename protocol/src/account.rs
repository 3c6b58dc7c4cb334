//! # Account Identifiers
//!
//! Every party in the sale -- token holders, role holders, and the
//! component instances themselves -- is addressed by an [`AccountId`].
//! The host environment authenticates callers; this crate only compares
//! identifiers.
//!
//! Identifiers are 32 bytes. Human accounts used by tooling are derived
//! from a label, component instances from their creator and a nonce, both
//! with domain-separated BLAKE3 so the two spaces never collide.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Amounts are expressed in the smallest unit (18 decimals).
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

const LABEL_DOMAIN: &[u8] = b"thinkcoin/account/v1";
const CONTRACT_DOMAIN: &[u8] = b"thinkcoin/contract/v1";

/// Errors produced when parsing an [`AccountId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountIdError {
    /// The input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded input was not 32 bytes long.
    #[error("invalid length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; 32]);

impl AccountId {
    /// The null account. Never a valid transfer recipient or owner.
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 32-byte identifier.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns `true` for [`AccountId::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Returns the lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded identifier. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self, AccountIdError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AccountIdError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(AccountIdError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Derives the identifier of a human-named account.
    ///
    /// Deterministic: the same label always maps to the same account.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(LABEL_DOMAIN);
        hasher.update(&[0x00]);
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Derives the address of a component instance.
    ///
    /// The preimage is `domain || 0x00 || creator || 0x00 || kind || 0x00 || nonce_be`.
    /// The separators keep `kind` from bleeding into the nonce.
    pub fn derive_contract(creator: &AccountId, kind: &str, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONTRACT_DOMAIN);
        hasher.update(&[0x00]);
        hasher.update(&creator.0);
        hasher.update(&[0x00]);
        hasher.update(kind.as_bytes());
        hasher.update(&[0x00]);
        hasher.update(&nonce.to_be_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl std::str::FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Hex strings rather than byte arrays, so identifiers can key JSON maps.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccountId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn label_derivation_is_deterministic() {
        assert_eq!(AccountId::from_label("alice"), AccountId::from_label("alice"));
        assert_ne!(AccountId::from_label("alice"), AccountId::from_label("bob"));
    }

    #[test]
    fn contract_derivation_depends_on_every_input() {
        let creator = AccountId::from_label("deployer");
        let base = AccountId::derive_contract(&creator, "ledger", 0);
        assert_ne!(base, AccountId::derive_contract(&creator, "ledger", 1));
        assert_ne!(base, AccountId::derive_contract(&creator, "crowdsale", 0));
        assert_ne!(
            base,
            AccountId::derive_contract(&AccountId::from_label("other"), "ledger", 0)
        );
    }

    #[test]
    fn label_and_contract_spaces_differ() {
        let creator = AccountId::ZERO;
        assert_ne!(
            AccountId::from_label("ledger"),
            AccountId::derive_contract(&creator, "ledger", 0)
        );
    }

    #[test]
    fn hex_round_trip_accepts_prefix() {
        let id = AccountId::from_label("carol");
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(AccountId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn malformed_hex_rejected() {
        assert!(matches!(
            AccountId::from_hex("zz"),
            Err(AccountIdError::InvalidHex(_))
        ));
        assert_eq!(
            AccountId::from_hex("abcd"),
            Err(AccountIdError::InvalidLength(2))
        );
    }

    #[test]
    fn serializes_as_json_map_key() {
        let mut balances: HashMap<AccountId, Amount> = HashMap::new();
        balances.insert(AccountId::from_label("dave"), 42);
        let json = serde_json::to_string(&balances).unwrap();
        let back: HashMap<AccountId, Amount> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, balances);
    }

    #[test]
    fn zero_account_is_zero() {
        assert!(AccountId::ZERO.is_zero());
        assert!(!AccountId::from_label("erin").is_zero());
    }
}
