//! # Crowdsale Controller
//!
//! Drives the ThinkCoin sale. The crowdsale administers the ledger (it is
//! the ledger's administrator for the duration of the sale) and owns the
//! locking vault it creates at construction.
//!
//! ## Phases
//!
//! The phase is never stored. Each call derives it from the oracle time:
//!
//! ```text
//!   now < start           PreSale
//!   start <= now < end    Active
//!   end <= now            PostSale
//! ```
//!
//! ## Two-step minting
//!
//! During `Active`, the proposer proposes an amount for a beneficiary,
//! either as a direct mint or as a locked mint. The approver must then
//! approve that exact amount before anything is minted. Approvals have no
//! time gate, so proposals made late in the sale can be approved after it.
//!
//! - Direct and locked proposals live in separate maps; a beneficiary may
//!   have one of each pending.
//! - Every proposal counts against the sale cap at proposal time and is
//!   never refunded, even after approval.
//! - Approval clears the proposal, so a replayed approval finds nothing.
//!
//! ## After the sale
//!
//! The owner can mint allocations outside the proposal flow (bounded only
//! by the ledger cap), finish minting, and take back administration of
//! the ledger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thinkcoin_protocol::clock::format_timestamp;
use thinkcoin_protocol::{AccountId, Amount, Timestamp};
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::error::{ContractError, ContractResult};
use crate::ledger::Ledger;
use crate::locking_vault::LockingVault;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sale phase, derived from the current time and the fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalePhase {
    /// Before the sale window opens.
    PreSale,
    /// Inside the sale window.
    Active,
    /// After the sale window closes.
    PostSale,
}

impl SalePhase {
    /// Derives the phase at `now` for the window `[start, end)`.
    pub fn at(now: Timestamp, start: Timestamp, end: Timestamp) -> Self {
        if now < start {
            SalePhase::PreSale
        } else if now < end {
            SalePhase::Active
        } else {
            SalePhase::PostSale
        }
    }
}

impl std::fmt::Display for SalePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SalePhase::PreSale => write!(f, "PreSale"),
            SalePhase::Active => write!(f, "Active"),
            SalePhase::PostSale => write!(f, "PostSale"),
        }
    }
}

/// Which proposal map an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProposalKind {
    Direct,
    Locked,
}

/// Construction parameters for a [`Crowdsale`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    /// Vault lock duration, counted from construction.
    pub locking_period: i64,
    /// Initial proposer.
    pub proposer: AccountId,
    /// Initial approver.
    pub approver: AccountId,
    /// Ceiling on the cumulative proposed amount.
    pub sale_cap: Amount,
    /// First second of the sale window.
    pub sale_start_time: Timestamp,
    /// First second after the sale window.
    pub sale_end_time: Timestamp,
}

/// The sale controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crowdsale {
    /// The crowdsale's own address. Becomes the ledger administrator.
    address: AccountId,
    /// Account that created the sale.
    owner: AccountId,
    /// The ledger this sale administers.
    token: Ledger,
    /// The vault created for locked allocations.
    locking_vault: LockingVault,
    /// Account allowed to propose mints.
    proposer: AccountId,
    /// Account allowed to approve mints.
    approver: AccountId,
    /// Ceiling on `cumulative_proposed`.
    sale_cap: Amount,
    /// Sum of every amount ever proposed, direct and locked.
    cumulative_proposed: Amount,
    /// Pending direct proposals. Absent means none.
    mint_proposals: HashMap<AccountId, Amount>,
    /// Pending locked proposals. Absent means none.
    mint_locked_proposals: HashMap<AccountId, Amount>,
    /// First second of the sale window.
    sale_start_time: Timestamp,
    /// First second after the sale window.
    sale_end_time: Timestamp,
}

impl Crowdsale {
    /// Creates the sale and its locking vault. The caller becomes owner.
    ///
    /// The sale only works once the ledger's administration has been
    /// handed to [`address`](Self::address); construction does not do
    /// this because only the current administrator can.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidParameters`] if the window is empty
    /// or inverted, the sale cap is zero or above the ledger cap, or a role
    /// is the null account.
    pub fn new(
        ctx: &CallContext,
        address: AccountId,
        token: Ledger,
        params: SaleParams,
    ) -> ContractResult<Self> {
        if params.sale_start_time >= params.sale_end_time {
            return Err(ContractError::InvalidParameters(format!(
                "sale start {} is not before sale end {}",
                params.sale_start_time, params.sale_end_time
            )));
        }
        if params.sale_cap == 0 || params.sale_cap > token.cap() {
            return Err(ContractError::InvalidParameters(format!(
                "sale cap {} must be positive and at most the token cap {}",
                params.sale_cap,
                token.cap()
            )));
        }
        if params.proposer.is_zero() || params.approver.is_zero() {
            return Err(ContractError::ZeroAddress("role holder"));
        }

        let vault_address = AccountId::derive_contract(&address, "locking-vault", 0);
        let locking_vault = LockingVault::new(
            &ctx.as_contract(address),
            vault_address,
            &token,
            params.locking_period,
        )?;

        info!(
            sale = %address,
            owner = %ctx.caller,
            token = %token.address(),
            vault = %vault_address,
            sale_cap = params.sale_cap,
            start = %format_timestamp(params.sale_start_time),
            end = %format_timestamp(params.sale_end_time),
            "crowdsale created"
        );

        Ok(Self {
            address,
            owner: ctx.caller,
            token,
            locking_vault,
            proposer: params.proposer,
            approver: params.approver,
            sale_cap: params.sale_cap,
            cumulative_proposed: 0,
            mint_proposals: HashMap::new(),
            mint_locked_proposals: HashMap::new(),
            sale_start_time: params.sale_start_time,
            sale_end_time: params.sale_end_time,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The sale's own address.
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Sale owner.
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// Current proposer.
    pub fn proposer(&self) -> AccountId {
        self.proposer
    }

    /// Current approver.
    pub fn approver(&self) -> AccountId {
        self.approver
    }

    /// The administered ledger.
    pub fn token(&self) -> &Ledger {
        &self.token
    }

    /// Mutable access for holder-level ledger operations (transfers,
    /// allowances). Authorization is still enforced per call context.
    pub fn token_mut(&mut self) -> &mut Ledger {
        &mut self.token
    }

    /// The locking vault.
    pub fn locking_vault(&self) -> &LockingVault {
        &self.locking_vault
    }

    /// Sale cap.
    pub fn sale_cap(&self) -> Amount {
        self.sale_cap
    }

    /// Sum of all proposals ever made.
    pub fn cumulative_proposed(&self) -> Amount {
        self.cumulative_proposed
    }

    /// Headroom left under the sale cap.
    pub fn remaining_sale_cap(&self) -> Amount {
        self.sale_cap.saturating_sub(self.cumulative_proposed)
    }

    /// First second of the sale window.
    pub fn sale_start_time(&self) -> Timestamp {
        self.sale_start_time
    }

    /// First second after the sale window.
    pub fn sale_end_time(&self) -> Timestamp {
        self.sale_end_time
    }

    /// Phase at `now`.
    pub fn phase(&self, now: Timestamp) -> SalePhase {
        SalePhase::at(now, self.sale_start_time, self.sale_end_time)
    }

    /// Pending direct proposal for `beneficiary`, or 0.
    pub fn mint_proposal(&self, beneficiary: &AccountId) -> Amount {
        self.mint_proposals.get(beneficiary).copied().unwrap_or(0)
    }

    /// Pending locked proposal for `beneficiary`, or 0.
    pub fn mint_locked_proposal(&self, beneficiary: &AccountId) -> Amount {
        self.mint_locked_proposals
            .get(beneficiary)
            .copied()
            .unwrap_or(0)
    }

    /// Verifies the sale, its ledger and its vault against their
    /// accounting invariants. Used when state is loaded from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::CorruptState`] for the first violation found.
    pub fn check_invariants(&self) -> ContractResult<()> {
        self.token.check_invariants()?;
        self.locking_vault.check_invariants(&self.token)?;

        if self.sale_cap > self.token.cap() {
            return Err(ContractError::CorruptState(format!(
                "sale cap {} exceeds token cap {}",
                self.sale_cap,
                self.token.cap()
            )));
        }
        if self.cumulative_proposed > self.sale_cap {
            return Err(ContractError::CorruptState(format!(
                "cumulative proposed {} exceeds sale cap {}",
                self.cumulative_proposed, self.sale_cap
            )));
        }

        let mut pending: Amount = 0;
        for (beneficiary, amount) in self.mint_proposals.iter().chain(&self.mint_locked_proposals) {
            if beneficiary.is_zero() || *amount == 0 {
                return Err(ContractError::CorruptState(format!(
                    "invalid pending proposal {amount} for {beneficiary}"
                )));
            }
            pending = pending.checked_add(*amount).ok_or(ContractError::Overflow)?;
        }
        if pending > self.cumulative_proposed {
            return Err(ContractError::CorruptState(format!(
                "pending proposals {pending} exceed cumulative proposed {}",
                self.cumulative_proposed
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    fn ensure_role(
        &self,
        ctx: &CallContext,
        holder: AccountId,
        role: &'static str,
    ) -> ContractResult<()> {
        if ctx.caller != holder {
            warn!(sale = %self.address, caller = %ctx.caller, role, "rejected unauthorized call");
            return Err(ContractError::Unauthorized {
                caller: ctx.caller,
                role,
            });
        }
        Ok(())
    }

    fn ensure_owner(&self, ctx: &CallContext) -> ContractResult<()> {
        self.ensure_role(ctx, self.owner, "sale owner")
    }

    fn ensure_phase(&self, ctx: &CallContext, required: SalePhase) -> ContractResult<()> {
        let current = self.phase(ctx.now);
        if current != required {
            return Err(ContractError::WrongPhase { current, required });
        }
        Ok(())
    }

    fn proposals(&self, kind: ProposalKind) -> &HashMap<AccountId, Amount> {
        match kind {
            ProposalKind::Direct => &self.mint_proposals,
            ProposalKind::Locked => &self.mint_locked_proposals,
        }
    }

    fn proposals_mut(&mut self, kind: ProposalKind) -> &mut HashMap<AccountId, Amount> {
        match kind {
            ProposalKind::Direct => &mut self.mint_proposals,
            ProposalKind::Locked => &mut self.mint_locked_proposals,
        }
    }

    // -----------------------------------------------------------------------
    // Role management
    // -----------------------------------------------------------------------

    /// Replaces the proposer. Owner only, any phase.
    pub fn change_proposer(&mut self, ctx: &CallContext, new_proposer: AccountId) -> ContractResult<()> {
        self.ensure_owner(ctx)?;
        if new_proposer.is_zero() {
            return Err(ContractError::ZeroAddress("proposer"));
        }
        info!(sale = %self.address, from = %self.proposer, to = %new_proposer, "proposer changed");
        self.proposer = new_proposer;
        Ok(())
    }

    /// Replaces the approver. Owner only, any phase.
    pub fn change_approver(&mut self, ctx: &CallContext, new_approver: AccountId) -> ContractResult<()> {
        self.ensure_owner(ctx)?;
        if new_approver.is_zero() {
            return Err(ContractError::ZeroAddress("approver"));
        }
        info!(sale = %self.address, from = %self.approver, to = %new_approver, "approver changed");
        self.approver = new_approver;
        Ok(())
    }

    /// Hands ownership of the sale itself to `new_owner`. Owner only, any phase.
    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: AccountId) -> ContractResult<()> {
        self.ensure_owner(ctx)?;
        if new_owner.is_zero() {
            return Err(ContractError::ZeroAddress("owner"));
        }
        info!(sale = %self.address, from = %self.owner, to = %new_owner, "sale ownership transferred");
        self.owner = new_owner;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Proposing
    // -----------------------------------------------------------------------

    /// Proposes minting `amount` directly to `beneficiary`.
    ///
    /// # Errors
    ///
    /// - [`ContractError::WrongPhase`] outside `Active`.
    /// - [`ContractError::Unauthorized`] unless the caller is the proposer.
    /// - [`ContractError::ZeroAmount`] for a zero amount.
    /// - [`ContractError::ZeroAddress`] if `beneficiary` is the null account.
    /// - [`ContractError::DuplicateProposal`] if one is already pending.
    /// - [`ContractError::SaleCapExceeded`] past the sale cap.
    pub fn propose_mint(
        &mut self,
        ctx: &CallContext,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.propose(ctx, ProposalKind::Direct, beneficiary, amount)
    }

    /// Proposes minting `amount` into the vault on behalf of `beneficiary`.
    ///
    /// Same rules as [`propose_mint`](Self::propose_mint), checked against
    /// the locked proposal map.
    pub fn propose_mint_locked(
        &mut self,
        ctx: &CallContext,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.propose(ctx, ProposalKind::Locked, beneficiary, amount)
    }

    fn propose(
        &mut self,
        ctx: &CallContext,
        kind: ProposalKind,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_phase(ctx, SalePhase::Active)?;
        self.ensure_role(ctx, self.proposer, "proposer")?;
        if amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        if beneficiary.is_zero() {
            return Err(ContractError::ZeroAddress("beneficiary"));
        }

        let pending = self.proposals(kind).get(&beneficiary).copied().unwrap_or(0);
        if pending != 0 {
            return Err(ContractError::DuplicateProposal {
                beneficiary,
                pending,
            });
        }

        let remaining = self.remaining_sale_cap();
        if amount > remaining {
            return Err(ContractError::SaleCapExceeded {
                requested: amount,
                remaining,
            });
        }

        self.proposals_mut(kind).insert(beneficiary, amount);
        self.cumulative_proposed += amount;

        info!(
            sale = %self.address,
            beneficiary = %beneficiary,
            amount,
            locked = (kind == ProposalKind::Locked),
            cumulative_proposed = self.cumulative_proposed,
            "mint proposed"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Approving
    // -----------------------------------------------------------------------

    fn ensure_approvable(
        &self,
        ctx: &CallContext,
        kind: ProposalKind,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_role(ctx, self.approver, "approver")?;
        if amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        let proposed = self.proposals(kind).get(&beneficiary).copied().unwrap_or(0);
        if proposed == 0 {
            return Err(ContractError::NoMatchingProposal { beneficiary });
        }
        if proposed != amount {
            return Err(ContractError::AmountMismatch {
                proposed,
                approved: amount,
            });
        }
        Ok(())
    }

    /// Approves a pending direct proposal and mints to the beneficiary.
    ///
    /// No time gate. `amount` must equal the proposed amount exactly.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Unauthorized`] unless the caller is the approver.
    /// - [`ContractError::ZeroAmount`] for a zero amount.
    /// - [`ContractError::NoMatchingProposal`] if nothing is pending.
    /// - [`ContractError::AmountMismatch`] if the amounts differ.
    /// - Any ledger mint error, unchanged.
    pub fn approve_mint(
        &mut self,
        ctx: &CallContext,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_approvable(ctx, ProposalKind::Direct, beneficiary, amount)?;

        // mint validates before mutating, so a failure here leaves the
        // proposal in place.
        self.token
            .mint(&ctx.as_contract(self.address), beneficiary, amount)?;
        self.mint_proposals.remove(&beneficiary);

        info!(sale = %self.address, beneficiary = %beneficiary, amount, "mint approved");
        Ok(())
    }

    /// Approves a pending locked proposal: mints into the vault and notes
    /// the amount for the beneficiary, as one step.
    ///
    /// Both halves are validated before either is applied.
    ///
    /// # Errors
    ///
    /// Same as [`approve_mint`](Self::approve_mint), plus any vault note
    /// error (e.g. [`ContractError::VaultUnlocked`]), unchanged.
    pub fn approve_mint_locked(
        &mut self,
        ctx: &CallContext,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_approvable(ctx, ProposalKind::Locked, beneficiary, amount)?;

        let sale_ctx = ctx.as_contract(self.address);
        let vault_address = self.locking_vault.address();
        self.token.ensure_mintable(&sale_ctx, &vault_address, amount)?;
        let held_after = self
            .token
            .balance_of(&vault_address)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        self.locking_vault
            .ensure_notable(&sale_ctx, held_after, amount)?;

        self.token.mint(&sale_ctx, vault_address, amount)?;
        self.locking_vault
            .note_tokens(&sale_ctx, &self.token, beneficiary, amount)?;
        self.mint_locked_proposals.remove(&beneficiary);

        info!(
            sale = %self.address,
            beneficiary = %beneficiary,
            vault = %vault_address,
            amount,
            "locked mint approved"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Post-sale administration
    // -----------------------------------------------------------------------

    /// Mints an allocation outside the proposal flow. Owner only, `PostSale`
    /// only. Not counted against the sale cap.
    pub fn mint_allocation(
        &mut self,
        ctx: &CallContext,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.ensure_phase(ctx, SalePhase::PostSale)?;
        self.ensure_owner(ctx)?;
        self.token
            .mint(&ctx.as_contract(self.address), beneficiary, amount)?;
        info!(sale = %self.address, beneficiary = %beneficiary, amount, "allocation minted");
        Ok(())
    }

    /// Finishes minting on the ledger. Owner only, `PostSale` only.
    pub fn finish_minting(&mut self, ctx: &CallContext) -> ContractResult<()> {
        self.ensure_phase(ctx, SalePhase::PostSale)?;
        self.ensure_owner(ctx)?;
        self.token.finish_minting(&ctx.as_contract(self.address))
    }

    /// Hands ledger administration back to the caller (the owner).
    /// Owner only, `PostSale` only.
    pub fn transfer_token_ownership(&mut self, ctx: &CallContext) -> ContractResult<()> {
        self.ensure_phase(ctx, SalePhase::PostSale)?;
        self.ensure_owner(ctx)?;
        self.token
            .transfer_ownership(&ctx.as_contract(self.address), ctx.caller)
    }

    // -----------------------------------------------------------------------
    // Vault passthroughs
    // -----------------------------------------------------------------------

    /// Pulls the vault's unlock deadline earlier. Owner only, any phase.
    pub fn reduce_locking_time(
        &mut self,
        ctx: &CallContext,
        new_unlock_time: Timestamp,
    ) -> ContractResult<()> {
        self.ensure_owner(ctx)?;
        self.locking_vault
            .reduce_locking_time(&ctx.as_contract(self.address), new_unlock_time)
    }

    /// Releases `beneficiary`'s locked tokens. Open to any caller.
    pub fn release_locked(
        &mut self,
        ctx: &CallContext,
        beneficiary: AccountId,
    ) -> ContractResult<Amount> {
        let released = self
            .locking_vault
            .release_tokens(ctx, &mut self.token, beneficiary)?;
        debug!(sale = %self.address, beneficiary = %beneficiary, released, "release requested");
        Ok(released)
    }
}
