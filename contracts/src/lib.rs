// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ThinkCoin Sale Contracts
//!
//! The authorization and accounting core of the ThinkCoin token sale:
//!
//! - **Ledger**: a capped, mintable balance table. Transfers stay closed
//!   until minting is finished.
//! - **Crowdsale**: a time-windowed sale controller. Minting goes through
//!   a propose/approve protocol run by two distinct roles, bounded by a
//!   sale cap.
//! - **Locking Vault**: holds locked allocations until a deadline, then
//!   releases them once.
//! - **Runtime**: an in-process host that serializes calls and supplies
//!   caller identity and time.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow; caps are enforced before
//!    any balance moves.
//! 2. Every operation validates fully before mutating. A failed call leaves
//!    state exactly as it was.
//! 3. Time is an input, never ambient. Phases are derived per call.
//! 4. Every stateful type is serializable (serde) for snapshots.

pub mod context;
pub mod crowdsale;
pub mod error;
pub mod ledger;
pub mod locking_vault;
pub mod runtime;

pub use context::CallContext;
pub use crowdsale::{Crowdsale, SaleParams, SalePhase};
pub use error::{ContractError, ContractResult};
pub use ledger::Ledger;
pub use locking_vault::LockingVault;
pub use runtime::SaleRuntime;
