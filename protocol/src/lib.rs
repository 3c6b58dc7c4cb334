// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ThinkCoin Protocol: Shared Primitives
//!
//! The pieces every sale component leans on but none of them owns:
//!
//! - **account**: 32-byte account identifiers, amount and timestamp types.
//! - **clock**: the time oracle. Injected, never ambient.
//! - **config**: token identity, caps, sale window, deployment parameters.
//! - **logging**: `tracing` subscriber setup for host tools and tests.
//!
//! The contracts themselves live in `thinkcoin-contracts`.

pub mod account;
pub mod clock;
pub mod config;
pub mod logging;

pub use account::{AccountId, AccountIdError, Amount, Timestamp};
pub use clock::{Clock, ClockError, ManualClock, SystemClock};
pub use config::{ConfigError, SaleConfig};
