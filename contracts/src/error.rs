//! Error types shared by the ledger, the locking vault and the crowdsale.
//!
//! One enum for all three components: the crowdsale surfaces ledger and
//! vault failures to its caller unchanged, so they must share a type.
//! Every variant is a rejected operation except [`ContractError::CorruptState`],
//! which reports restored state that breaks an accounting invariant.

use thinkcoin_protocol::{AccountId, Amount, Timestamp};
use thiserror::Error;

use crate::crowdsale::SalePhase;

/// Errors that can occur during contract operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The caller does not hold the role this operation requires.
    #[error("unauthorized: {caller} is not the {role}")]
    Unauthorized {
        /// The account that attempted the operation.
        caller: AccountId,
        /// The role that was required.
        role: &'static str,
    },

    /// Minting has been finished; no more supply can be created.
    #[error("minting is closed")]
    MintingClosed,

    /// Transfers and releases are disabled until minting is finished.
    #[error("minting is not finished")]
    MintingNotFinished,

    /// `finish_minting` was called twice.
    #[error("minting already finished")]
    AlreadyFinished,

    /// The ledger's hard cap would be exceeded.
    #[error("cap exceeded: requested {requested}, remaining {remaining}")]
    CapExceeded {
        /// Amount the caller tried to mint.
        requested: Amount,
        /// Headroom left under the cap.
        remaining: Amount,
    },

    /// The sale's cumulative proposal cap would be exceeded.
    #[error("sale cap exceeded: requested {requested}, remaining {remaining}")]
    SaleCapExceeded {
        /// Amount the caller tried to propose.
        requested: Amount,
        /// Headroom left under the sale cap.
        remaining: Amount,
    },

    /// The source account holds less than the transfer amount.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Current balance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// The spender's allowance is below the transfer amount.
    #[error("insufficient allowance: available {available}, requested {requested}")]
    InsufficientAllowance {
        /// Current allowance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// A proposal of the same kind is already pending for the beneficiary.
    #[error("duplicate proposal: {beneficiary} already has {pending} pending")]
    DuplicateProposal {
        /// The beneficiary named in the proposal.
        beneficiary: AccountId,
        /// Amount already pending.
        pending: Amount,
    },

    /// No proposal of this kind is pending for the beneficiary.
    #[error("no matching proposal for {beneficiary}")]
    NoMatchingProposal {
        /// The beneficiary named in the approval.
        beneficiary: AccountId,
    },

    /// The approved amount differs from the proposed amount.
    #[error("amount mismatch: proposed {proposed}, approved {approved}")]
    AmountMismatch {
        /// Amount pending in the proposal.
        proposed: Amount,
        /// Amount passed to the approval.
        approved: Amount,
    },

    /// A zero amount was supplied where a positive one is required.
    #[error("amount must be positive")]
    ZeroAmount,

    /// The operation is not allowed in the current sale phase.
    #[error("wrong phase: sale is {current}, operation requires {required}")]
    WrongPhase {
        /// Phase derived from the current time.
        current: SalePhase,
        /// Phase the operation requires.
        required: SalePhase,
    },

    /// The vault has unlocked; no more tokens can be noted.
    #[error("vault is unlocked")]
    VaultUnlocked,

    /// The vault is still locked; tokens cannot be released yet.
    #[error("vault is locked until {unlock_time}")]
    StillLocked {
        /// The current unlock deadline.
        unlock_time: Timestamp,
    },

    /// The unlock deadline may only move earlier.
    #[error("cannot extend lock: current unlock {current}, requested {requested}")]
    CannotExtendLock {
        /// The current unlock deadline.
        current: Timestamp,
        /// The requested deadline.
        requested: Timestamp,
    },

    /// The vault's ledger balance does not cover what it has noted.
    #[error("insufficient backing: vault holds {held}, noted total would be {required}")]
    InsufficientBacking {
        /// Tokens the vault holds on the ledger.
        held: Amount,
        /// Noted total after the operation.
        required: Amount,
    },

    /// The null account was given as recipient or owner.
    #[error("the zero account is not a valid {0}")]
    ZeroAddress(&'static str),

    /// A component was wired to or constructed with inconsistent parameters.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,

    /// Loaded state breaks an accounting invariant.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// The operation is not supported by this component.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

/// Shorthand used throughout the crate.
pub type ContractResult<T> = Result<T, ContractError>;
