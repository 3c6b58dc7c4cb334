//! # Locking Vault
//!
//! Holds locked allocations. The vault owns a ledger balance under its own
//! address and keeps a per-beneficiary note of how much of that balance is
//! theirs. Until the unlock deadline nothing leaves; after it, and once the
//! ledger has finished minting, anyone can push a beneficiary's noted
//! amount out to them.
//!
//! ## Lifecycle
//!
//! 1. **Create**: the owner (the crowdsale) creates the vault with a lock
//!    duration counted from creation.
//! 2. **Note**: while locked, the owner notes tokens it has just minted
//!    into the vault. Notes for the same beneficiary accumulate.
//! 3. **Shorten**: the owner may pull the deadline earlier, never later.
//! 4. **Release**: once unlocked and minting is finished, any caller may
//!    release a beneficiary's notes. A second release is a no-op.
//!
//! The noted total never exceeds what the vault holds on the ledger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thinkcoin_protocol::clock::format_timestamp;
use thinkcoin_protocol::{AccountId, Amount, Timestamp};
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::error::{ContractError, ContractResult};
use crate::ledger::Ledger;

/// Time-locked holding account for allocations on a [`Ledger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingVault {
    /// The vault's own address; its ledger balance backs all notes.
    address: AccountId,
    /// Address of the ledger this vault holds tokens on.
    token: AccountId,
    /// Account allowed to note tokens and shorten the lock.
    owner: AccountId,
    /// Deadline after which the vault is unlocked.
    unlock_time: Timestamp,
    /// Cumulative noted amount per beneficiary.
    noted: HashMap<AccountId, Amount>,
    /// Sum of `noted`.
    total_noted: Amount,
}

impl LockingVault {
    /// Creates a vault locked for `locking_period` seconds from `ctx.now`.
    /// The caller becomes owner.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidParameters`] if `locking_period` is negative.
    pub fn new(
        ctx: &CallContext,
        address: AccountId,
        token: &Ledger,
        locking_period: i64,
    ) -> ContractResult<Self> {
        if locking_period < 0 {
            return Err(ContractError::InvalidParameters(
                "locking period must not be negative".into(),
            ));
        }
        let unlock_time = ctx
            .now
            .checked_add(locking_period)
            .ok_or(ContractError::Overflow)?;

        info!(
            vault = %address,
            token = %token.address(),
            owner = %ctx.caller,
            unlock_time = %format_timestamp(unlock_time),
            "locking vault created"
        );

        Ok(Self {
            address,
            token: token.address(),
            owner: ctx.caller,
            unlock_time,
            noted: HashMap::new(),
            total_noted: 0,
        })
    }

    /// The vault's own address.
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Address of the backing ledger.
    pub fn token(&self) -> AccountId {
        self.token
    }

    /// Account allowed to note tokens.
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// Current unlock deadline.
    pub fn unlock_time(&self) -> Timestamp {
        self.unlock_time
    }

    /// `true` while `now < unlock_time`.
    pub fn is_locked(&self, now: Timestamp) -> bool {
        now < self.unlock_time
    }

    /// Locked balance noted for `beneficiary`.
    pub fn balance_of(&self, beneficiary: &AccountId) -> Amount {
        self.noted.get(beneficiary).copied().unwrap_or(0)
    }

    /// Sum of all notes still held.
    pub fn total_noted(&self) -> Amount {
        self.total_noted
    }

    fn ensure_owner(&self, ctx: &CallContext) -> ContractResult<()> {
        if ctx.caller != self.owner {
            warn!(vault = %self.address, caller = %ctx.caller, "rejected non-owner call");
            return Err(ContractError::Unauthorized {
                caller: ctx.caller,
                role: "vault owner",
            });
        }
        Ok(())
    }

    fn ensure_token(&self, ledger: &Ledger) -> ContractResult<()> {
        if ledger.address() != self.token {
            return Err(ContractError::InvalidParameters(format!(
                "vault is bound to ledger {}, got {}",
                self.token,
                ledger.address()
            )));
        }
        Ok(())
    }

    /// Verifies that the notes add up and are backed by `ledger`.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::CorruptState`] on any mismatch, or
    /// [`ContractError::InvalidParameters`] for the wrong ledger.
    pub fn check_invariants(&self, ledger: &Ledger) -> ContractResult<()> {
        self.ensure_token(ledger)?;
        let summed = self
            .noted
            .values()
            .try_fold(0, |acc: Amount, n| acc.checked_add(*n))
            .ok_or(ContractError::Overflow)?;
        if summed != self.total_noted {
            return Err(ContractError::CorruptState(format!(
                "vault notes sum to {summed}, total is {}",
                self.total_noted
            )));
        }
        let held = ledger.balance_of(&self.address);
        if self.total_noted > held {
            return Err(ContractError::CorruptState(format!(
                "vault notes {} exceed its ledger balance {held}",
                self.total_noted
            )));
        }
        Ok(())
    }

    /// Checks everything [`note_tokens`](Self::note_tokens) checks, given
    /// what the vault will hold on the ledger at the time of noting.
    pub fn ensure_notable(
        &self,
        ctx: &CallContext,
        held: Amount,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_owner(ctx)?;
        if !self.is_locked(ctx.now) {
            return Err(ContractError::VaultUnlocked);
        }
        if amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        let required = self
            .total_noted
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        if required > held {
            return Err(ContractError::InsufficientBacking { held, required });
        }
        Ok(())
    }

    /// Credits `amount` of the vault's ledger balance to `beneficiary`.
    ///
    /// The tokens must already sit on the ledger under the vault's address.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Unauthorized`] if the caller is not the owner.
    /// - [`ContractError::VaultUnlocked`] once the deadline has passed.
    /// - [`ContractError::ZeroAmount`] for a zero note.
    /// - [`ContractError::InsufficientBacking`] if the vault's ledger
    ///   balance does not cover the new noted total.
    pub fn note_tokens(
        &mut self,
        ctx: &CallContext,
        ledger: &Ledger,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_token(ledger)?;
        self.ensure_notable(ctx, ledger.balance_of(&self.address), amount)?;

        let updated = self
            .balance_of(&beneficiary)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        self.noted.insert(beneficiary, updated);
        self.total_noted += amount;

        debug!(vault = %self.address, beneficiary = %beneficiary, amount, noted = updated, "tokens noted");
        Ok(())
    }

    /// Moves the unlock deadline to `new_unlock_time`, which must not be
    /// later than the current one. A time at or before now unlocks
    /// immediately.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Unauthorized`] if the caller is not the owner.
    /// - [`ContractError::CannotExtendLock`] if the new time is later.
    pub fn reduce_locking_time(
        &mut self,
        ctx: &CallContext,
        new_unlock_time: Timestamp,
    ) -> ContractResult<()> {
        self.ensure_owner(ctx)?;
        if new_unlock_time > self.unlock_time {
            return Err(ContractError::CannotExtendLock {
                current: self.unlock_time,
                requested: new_unlock_time,
            });
        }
        info!(
            vault = %self.address,
            from = %format_timestamp(self.unlock_time),
            to = %format_timestamp(new_unlock_time),
            "locking time reduced"
        );
        self.unlock_time = new_unlock_time;
        Ok(())
    }

    /// Pays out everything noted for `beneficiary` and returns the amount.
    ///
    /// Open to any caller. Releasing a beneficiary with nothing noted
    /// succeeds and moves nothing.
    ///
    /// # Errors
    ///
    /// - [`ContractError::StillLocked`] before the deadline.
    /// - [`ContractError::MintingNotFinished`] while the ledger still mints.
    pub fn release_tokens(
        &mut self,
        ctx: &CallContext,
        ledger: &mut Ledger,
        beneficiary: AccountId,
    ) -> ContractResult<Amount> {
        self.ensure_token(ledger)?;
        if self.is_locked(ctx.now) {
            return Err(ContractError::StillLocked {
                unlock_time: self.unlock_time,
            });
        }
        if !ledger.minting_finished() {
            return Err(ContractError::MintingNotFinished);
        }

        let amount = self.balance_of(&beneficiary);
        if amount == 0 {
            debug!(vault = %self.address, beneficiary = %beneficiary, "nothing to release");
            return Ok(0);
        }

        // Clear the note before paying out; restore it if the payout fails.
        self.noted.remove(&beneficiary);
        self.total_noted -= amount;

        if let Err(e) = ledger.transfer(&ctx.as_contract(self.address), beneficiary, amount) {
            self.noted.insert(beneficiary, amount);
            self.total_noted += amount;
            return Err(e);
        }

        info!(
            vault = %self.address,
            beneficiary = %beneficiary,
            released_by = %ctx.caller,
            amount,
            "locked tokens released"
        );
        Ok(amount)
    }
}
