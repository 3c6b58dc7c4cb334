//! # Capped Ledger
//!
//! The balance table for ThinkCoin. Supply is created only by the
//! administrator, only until minting is finished, and never beyond the cap
//! fixed at creation. Holders cannot move tokens until minting is finished,
//! so nobody can trade a balance that is still being allocated.
//!
//! ## Invariants
//!
//! - `total_supply <= cap`, always.
//! - The sum of all balances equals `total_supply`.
//! - `minting_finished` only ever goes `false -> true`.
//!
//! Every operation validates fully before touching state, so a rejected
//! call leaves the ledger exactly as it was.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thinkcoin_protocol::config::{TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use thinkcoin_protocol::{AccountId, Amount};
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::error::{ContractError, ContractResult};

/// A capped, mintable, transfer-gated token ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    /// This ledger's own address.
    address: AccountId,
    /// Human-readable name.
    name: String,
    /// Ticker symbol.
    symbol: String,
    /// Display precision.
    decimals: u8,
    /// Immutable maximum total supply.
    cap: Amount,
    /// Running sum of all minted units.
    total_supply: Amount,
    /// Per-account balances. Absent means zero.
    balances: HashMap<AccountId, Amount>,
    /// `owner -> (spender -> allowance)`.
    allowances: HashMap<AccountId, HashMap<AccountId, Amount>>,
    /// One-way switch from the minting phase to the trading phase.
    minting_finished: bool,
    /// Account allowed to mint and finish minting.
    administrator: AccountId,
}

impl Ledger {
    /// Creates a ledger with the given cap. The caller becomes administrator.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidParameters`] if `cap` is zero.
    pub fn new(ctx: &CallContext, address: AccountId, cap: Amount) -> ContractResult<Self> {
        if cap == 0 {
            return Err(ContractError::InvalidParameters(
                "ledger cap must be positive".into(),
            ));
        }

        info!(ledger = %address, administrator = %ctx.caller, cap, "ledger created");

        Ok(Self {
            address,
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            cap,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            minting_finished: false,
            administrator: ctx.caller,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// This ledger's address.
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Token name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Display precision.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Maximum total supply.
    pub fn cap(&self) -> Amount {
        self.cap
    }

    /// Units minted so far.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Units that can still be minted before hitting the cap.
    pub fn remaining_mintable(&self) -> Amount {
        self.cap.saturating_sub(self.total_supply)
    }

    /// Balance of `account`, or 0.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Amount `spender` may still move out of `owner`'s balance.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Whether minting has been closed for good.
    pub fn minting_finished(&self) -> bool {
        self.minting_finished
    }

    /// Current administrator.
    pub fn administrator(&self) -> AccountId {
        self.administrator
    }

    /// Verifies the supply invariants on state loaded from outside, such
    /// as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::CorruptState`] if the supply exceeds the cap
    /// or the balances do not add up to it.
    pub fn check_invariants(&self) -> ContractResult<()> {
        if self.total_supply > self.cap {
            return Err(ContractError::CorruptState(format!(
                "ledger supply {} exceeds cap {}",
                self.total_supply, self.cap
            )));
        }
        let summed = self
            .balances
            .values()
            .try_fold(0, |acc: Amount, b| acc.checked_add(*b))
            .ok_or(ContractError::Overflow)?;
        if summed != self.total_supply {
            return Err(ContractError::CorruptState(format!(
                "ledger balances sum to {summed}, supply is {}",
                self.total_supply
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    fn ensure_administrator(&self, ctx: &CallContext) -> ContractResult<()> {
        if ctx.caller != self.administrator {
            warn!(ledger = %self.address, caller = %ctx.caller, "rejected non-administrator call");
            return Err(ContractError::Unauthorized {
                caller: ctx.caller,
                role: "ledger administrator",
            });
        }
        Ok(())
    }

    /// Checks everything [`mint`](Self::mint) checks, without minting.
    ///
    /// Lets callers that pair a mint with another mutation validate both
    /// halves before committing either.
    pub fn ensure_mintable(
        &self,
        ctx: &CallContext,
        to: &AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_administrator(ctx)?;
        if self.minting_finished {
            return Err(ContractError::MintingClosed);
        }
        if to.is_zero() {
            return Err(ContractError::ZeroAddress("recipient"));
        }
        let remaining = self.remaining_mintable();
        if amount > remaining {
            return Err(ContractError::CapExceeded {
                requested: amount,
                remaining,
            });
        }
        Ok(())
    }

    /// Mints `amount` new units to `to`.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Unauthorized`] if the caller is not the administrator.
    /// - [`ContractError::MintingClosed`] if minting is finished.
    /// - [`ContractError::ZeroAddress`] if `to` is the null account.
    /// - [`ContractError::CapExceeded`] if `total_supply + amount > cap`.
    pub fn mint(&mut self, ctx: &CallContext, to: AccountId, amount: Amount) -> ContractResult<()> {
        self.ensure_mintable(ctx, &to, amount)?;

        let new_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;

        // Cap check above bounds both additions.
        self.total_supply += amount;
        self.balances.insert(to, new_balance);

        debug!(ledger = %self.address, to = %to, amount, total_supply = self.total_supply, "minted");
        Ok(())
    }

    /// Closes minting permanently and opens transfers.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Unauthorized`] if the caller is not the administrator.
    /// - [`ContractError::AlreadyFinished`] on a second call.
    pub fn finish_minting(&mut self, ctx: &CallContext) -> ContractResult<()> {
        self.ensure_administrator(ctx)?;
        if self.minting_finished {
            return Err(ContractError::AlreadyFinished);
        }
        self.minting_finished = true;
        info!(ledger = %self.address, total_supply = self.total_supply, "minting finished");
        Ok(())
    }

    /// Hands the administrator role to `new_administrator`.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Unauthorized`] if the caller is not the administrator.
    /// - [`ContractError::ZeroAddress`] if the new administrator is the null account.
    pub fn transfer_ownership(
        &mut self,
        ctx: &CallContext,
        new_administrator: AccountId,
    ) -> ContractResult<()> {
        self.ensure_administrator(ctx)?;
        if new_administrator.is_zero() {
            return Err(ContractError::ZeroAddress("administrator"));
        }
        info!(
            ledger = %self.address,
            from = %self.administrator,
            to = %new_administrator,
            "ledger ownership transferred"
        );
        self.administrator = new_administrator;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Moves `amount` from the caller to `to`.
    ///
    /// # Errors
    ///
    /// - [`ContractError::MintingNotFinished`] while minting is open.
    /// - [`ContractError::ZeroAddress`] if `to` is the null account.
    /// - [`ContractError::InsufficientBalance`] if the caller holds too little.
    pub fn transfer(&mut self, ctx: &CallContext, to: AccountId, amount: Amount) -> ContractResult<()> {
        self.ensure_transfer(&ctx.caller, &to, amount)?;
        self.move_balance(ctx.caller, to, amount);
        debug!(ledger = %self.address, from = %ctx.caller, to = %to, amount, "transfer");
        Ok(())
    }

    /// Moves `amount` from `from` to `to`, spending the caller's allowance.
    ///
    /// # Errors
    ///
    /// Everything [`transfer`](Self::transfer) rejects, plus
    /// [`ContractError::InsufficientAllowance`].
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_transfer(&from, &to, amount)?;

        let allowed = self.allowance(&from, &ctx.caller);
        if amount > allowed {
            return Err(ContractError::InsufficientAllowance {
                available: allowed,
                requested: amount,
            });
        }

        self.set_allowance(from, ctx.caller, allowed - amount);
        self.move_balance(from, to, amount);
        debug!(
            ledger = %self.address,
            spender = %ctx.caller,
            from = %from,
            to = %to,
            amount,
            "transfer_from"
        );
        Ok(())
    }

    fn ensure_transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> ContractResult<()> {
        if !self.minting_finished {
            return Err(ContractError::MintingNotFinished);
        }
        if to.is_zero() {
            return Err(ContractError::ZeroAddress("recipient"));
        }
        let available = self.balance_of(from);
        if amount > available {
            return Err(ContractError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    // Caller has already checked the source balance.
    fn move_balance(&mut self, from: AccountId, to: AccountId, amount: Amount) {
        let from_balance = self.balance_of(&from) - amount;
        self.balances.insert(from, from_balance);
        // Sum of balances equals total_supply <= cap, so this cannot overflow.
        let to_balance = self.balance_of(&to) + amount;
        self.balances.insert(to, to_balance);
    }

    // -----------------------------------------------------------------------
    // Allowances
    // -----------------------------------------------------------------------

    /// Sets the caller's allowance for `spender` to exactly `amount`.
    ///
    /// Allowed in any minting state; only spending is gated.
    pub fn approve(&mut self, ctx: &CallContext, spender: AccountId, amount: Amount) -> ContractResult<()> {
        if spender.is_zero() {
            return Err(ContractError::ZeroAddress("spender"));
        }
        self.set_allowance(ctx.caller, spender, amount);
        debug!(ledger = %self.address, owner = %ctx.caller, spender = %spender, amount, "approve");
        Ok(())
    }

    /// Raises the caller's allowance for `spender` by `added`.
    pub fn increase_allowance(
        &mut self,
        ctx: &CallContext,
        spender: AccountId,
        added: Amount,
    ) -> ContractResult<()> {
        let current = self.allowance(&ctx.caller, &spender);
        let updated = current.checked_add(added).ok_or(ContractError::Overflow)?;
        self.approve(ctx, spender, updated)
    }

    /// Lowers the caller's allowance for `spender` by `subtracted`,
    /// stopping at zero.
    pub fn decrease_allowance(
        &mut self,
        ctx: &CallContext,
        spender: AccountId,
        subtracted: Amount,
    ) -> ContractResult<()> {
        let current = self.allowance(&ctx.caller, &spender);
        self.approve(ctx, spender, current.saturating_sub(subtracted))
    }

    fn set_allowance(&mut self, owner: AccountId, spender: AccountId, amount: Amount) {
        self.allowances.entry(owner).or_default().insert(spender, amount);
    }

    // -----------------------------------------------------------------------
    // Native value
    // -----------------------------------------------------------------------

    /// Entry point for native value sent to the ledger. Always rejected.
    pub fn receive_native(&self, ctx: &CallContext, value: Amount) -> ContractResult<()> {
        warn!(ledger = %self.address, sender = %ctx.caller, value, "rejected native value transfer");
        Err(ContractError::UnsupportedOperation(
            "the ledger does not accept native value",
        ))
    }
}
