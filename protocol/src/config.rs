//! # Sale Configuration & Constants
//!
//! Every number that shaped the ThinkCoin sale lives here: the token's
//! identity, the two caps, the lock duration, and the sale window. The
//! deployment loader reads a [`SaleConfig`] (JSON) and falls back to these
//! constants for anything it does not override.
//!
//! The contracts themselves trust their construction parameters only as
//! far as their own checks go, so [`SaleConfig::validate`] is the place to
//! catch a fat-fingered timestamp before it becomes immutable.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::{AccountId, Amount, Timestamp};
use crate::clock::DAY;

// ---------------------------------------------------------------------------
// Token Identity
// ---------------------------------------------------------------------------

/// Token name as reported by the ledger.
pub const TOKEN_NAME: &str = "ThinkCoin";

/// Ticker symbol.
pub const TOKEN_SYMBOL: &str = "TCO";

/// Display precision. Arithmetic never divides by this.
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole token in smallest units.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Supply Parameters
// ---------------------------------------------------------------------------

/// Hard cap on the ledger's total supply: 500M TCO.
pub const TOKEN_CAP: Amount = 500_000_000 * ONE_TOKEN;

/// Ceiling on the cumulative amount proposed through the sale: 225M TCO.
pub const SALE_CAP: Amount = 225_000_000 * ONE_TOKEN;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How long locked allocations stay in the vault: three 30-day months.
pub const LOCKING_PERIOD_SECS: i64 = 3 * 30 * DAY;

/// 2018-03-26 12:00:00 UTC.
pub const SALE_START_TIME: Timestamp = 1_522_065_600;

/// 2018-04-27 12:00:00 UTC.
pub const SALE_END_TIME: Timestamp = 1_524_830_400;

// ---------------------------------------------------------------------------
// Deployment Parameters
// ---------------------------------------------------------------------------

/// Errors produced while loading or validating a [`SaleConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A parameter is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Construction parameters for one sale deployment.
///
/// Missing fields in a JSON document fall back to the defaults above.
/// `proposer` and `approver` default to the deployer, which is how the
/// 2018 sale was launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleConfig {
    /// Ledger hard cap in smallest units.
    pub token_cap: Amount,
    /// Sale cap in smallest units. Must not exceed `token_cap`.
    pub sale_cap: Amount,
    /// Vault lock duration, counted from sale construction.
    pub locking_period_secs: i64,
    /// First second of the sale window.
    pub sale_start_time: Timestamp,
    /// First second after the sale window.
    pub sale_end_time: Timestamp,
    /// Initial proposer. `None` means the deployer.
    pub proposer: Option<AccountId>,
    /// Initial approver. `None` means the deployer.
    pub approver: Option<AccountId>,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            token_cap: TOKEN_CAP,
            sale_cap: SALE_CAP,
            locking_period_secs: LOCKING_PERIOD_SECS,
            sale_start_time: SALE_START_TIME,
            sale_end_time: SALE_END_TIME,
            proposer: None,
            approver: None,
        }
    }
}

impl SaleConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: SaleConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks the parameters for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_cap == 0 {
            return Err(ConfigError::Invalid("token cap must be positive".into()));
        }
        if self.sale_cap == 0 {
            return Err(ConfigError::Invalid("sale cap must be positive".into()));
        }
        if self.sale_cap > self.token_cap {
            return Err(ConfigError::Invalid(format!(
                "sale cap {} exceeds token cap {}",
                self.sale_cap, self.token_cap
            )));
        }
        if self.sale_start_time >= self.sale_end_time {
            return Err(ConfigError::Invalid(format!(
                "sale start {} is not before sale end {}",
                self.sale_start_time, self.sale_end_time
            )));
        }
        if self.locking_period_secs < 0 {
            return Err(ConfigError::Invalid(
                "locking period must not be negative".into(),
            ));
        }
        Ok(())
    }
}
