//! # Sale Runtime
//!
//! The contracts assume a host that runs one operation at a time and hands
//! each one a caller and a trustworthy timestamp. [`SaleRuntime`] is that
//! host for in-process use: all state sits behind a single mutex, every
//! operation runs entirely inside it, and the clock reading is taken inside
//! the same critical section so time and state can never disagree.
//!
//! Check-then-mutate sequences (cap checks, proposal checks, mint-then-note)
//! therefore cannot interleave, whichever threads call in.
//!
//! Clock readings that go backwards are clamped to the last reading seen;
//! phase and lock checks only ever observe time moving forward.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thinkcoin_protocol::{AccountId, Amount, Clock, SaleConfig, Timestamp};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::CallContext;
use crate::crowdsale::{Crowdsale, SaleParams, SalePhase};
use crate::error::{ContractError, ContractResult};
use crate::ledger::Ledger;

/// Everything guarded by the runtime lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuntimeState {
    sale: Crowdsale,
    last_now: Timestamp,
}

/// Serialized form produced by [`SaleRuntime::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    deployment_id: Uuid,
    state: RuntimeState,
}

/// A deployed sale plus the machinery to call it safely.
pub struct SaleRuntime {
    deployment_id: Uuid,
    clock: Arc<dyn Clock>,
    state: Mutex<RuntimeState>,
}

impl std::fmt::Debug for SaleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleRuntime")
            .field("deployment_id", &self.deployment_id)
            .finish_non_exhaustive()
    }
}

impl SaleRuntime {
    // -----------------------------------------------------------------------
    // Deployment
    // -----------------------------------------------------------------------

    /// Deploys a ledger and a crowdsale and wires them together.
    ///
    /// Follows the usual launch sequence:
    ///
    /// 1. The deployer creates the ledger and is its first administrator.
    /// 2. The deployer creates the crowdsale, which creates its vault.
    /// 3. The deployer hands ledger administration to the crowdsale.
    ///
    /// Unset roles in `config` default to the deployer.
    pub fn deploy(
        config: &SaleConfig,
        deployer: AccountId,
        clock: Arc<dyn Clock>,
    ) -> ContractResult<Self> {
        config
            .validate()
            .map_err(|e| ContractError::InvalidParameters(e.to_string()))?;

        let deployment_id = Uuid::new_v4();
        let ctx = CallContext::at(deployer, clock.as_ref());

        let ledger_address = AccountId::derive_contract(&deployer, "ledger", 0);
        let ledger = Ledger::new(&ctx, ledger_address, config.token_cap)?;

        let sale_address = AccountId::derive_contract(&deployer, "crowdsale", 1);
        let params = SaleParams {
            locking_period: config.locking_period_secs,
            proposer: config.proposer.unwrap_or(deployer),
            approver: config.approver.unwrap_or(deployer),
            sale_cap: config.sale_cap,
            sale_start_time: config.sale_start_time,
            sale_end_time: config.sale_end_time,
        };
        let mut sale = Crowdsale::new(&ctx, sale_address, ledger, params)?;
        sale.token_mut().transfer_ownership(&ctx, sale_address)?;

        info!(
            deployment = %deployment_id,
            deployer = %deployer,
            ledger = %ledger_address,
            sale = %sale_address,
            vault = %sale.locking_vault().address(),
            "sale deployed"
        );

        Ok(Self {
            deployment_id,
            clock,
            state: Mutex::new(RuntimeState {
                sale,
                last_now: ctx.now,
            }),
        })
    }

    /// Loads a JSON [`SaleConfig`] from `path` and deploys it.
    pub fn deploy_from_file(
        path: impl AsRef<Path>,
        deployer: AccountId,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = SaleConfig::load(path)
            .with_context(|| format!("failed to load sale config from {}", path.display()))?;
        Self::deploy(&config, deployer, clock).context("sale deployment failed")
    }

    /// Serializes the full state to JSON.
    pub fn snapshot(&self) -> Result<String, serde_json::Error> {
        let state = self.state.lock();
        serde_json::to_string(&Snapshot {
            deployment_id: self.deployment_id,
            state: state.clone(),
        })
    }

    /// Rebuilds a runtime from [`snapshot`](Self::snapshot) output.
    ///
    /// The restored sale is checked against its accounting invariants
    /// before it is accepted.
    pub fn restore(json: &str, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).context("failed to parse sale snapshot")?;
        snapshot.state.sale.check_invariants().with_context(|| {
            format!("snapshot {} failed validation", snapshot.deployment_id)
        })?;
        info!(deployment = %snapshot.deployment_id, "sale restored from snapshot");
        Ok(Self {
            deployment_id: snapshot.deployment_id,
            clock,
            state: Mutex::new(snapshot.state),
        })
    }

    /// Identifier attached to this deployment's log events.
    pub fn deployment_id(&self) -> Uuid {
        self.deployment_id
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn observe_time(&self, state: &mut RuntimeState) -> Timestamp {
        let reading = self.clock.now();
        if reading < state.last_now {
            warn!(
                deployment = %self.deployment_id,
                reading,
                last = state.last_now,
                "clock moved backwards; holding last reading"
            );
        } else {
            state.last_now = reading;
        }
        state.last_now
    }

    /// Runs `op` as `caller` inside the critical section.
    pub fn execute<R>(
        &self,
        caller: AccountId,
        op: impl FnOnce(&mut Crowdsale, &CallContext) -> ContractResult<R>,
    ) -> ContractResult<R> {
        let span = tracing::debug_span!("sale_call", deployment = %self.deployment_id, caller = %caller);
        let _entered = span.enter();

        let mut state = self.state.lock();
        let now = self.observe_time(&mut state);
        let ctx = CallContext::new(caller, now);
        op(&mut state.sale, &ctx)
    }

    /// Reads state at the current time.
    pub fn query<R>(&self, f: impl FnOnce(&Crowdsale, Timestamp) -> R) -> R {
        let mut state = self.state.lock();
        let now = self.observe_time(&mut state);
        f(&state.sale, now)
    }

    // -----------------------------------------------------------------------
    // Sale operations
    // -----------------------------------------------------------------------

    /// See [`Crowdsale::change_proposer`].
    pub fn change_proposer(&self, caller: AccountId, new_proposer: AccountId) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.change_proposer(ctx, new_proposer))
    }

    /// See [`Crowdsale::change_approver`].
    pub fn change_approver(&self, caller: AccountId, new_approver: AccountId) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.change_approver(ctx, new_approver))
    }

    /// See [`Crowdsale::propose_mint`].
    pub fn propose_mint(&self, caller: AccountId, beneficiary: AccountId, amount: Amount) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.propose_mint(ctx, beneficiary, amount))
    }

    /// See [`Crowdsale::propose_mint_locked`].
    pub fn propose_mint_locked(
        &self,
        caller: AccountId,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| {
            sale.propose_mint_locked(ctx, beneficiary, amount)
        })
    }

    /// See [`Crowdsale::approve_mint`].
    pub fn approve_mint(&self, caller: AccountId, beneficiary: AccountId, amount: Amount) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.approve_mint(ctx, beneficiary, amount))
    }

    /// See [`Crowdsale::approve_mint_locked`].
    pub fn approve_mint_locked(
        &self,
        caller: AccountId,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| {
            sale.approve_mint_locked(ctx, beneficiary, amount)
        })
    }

    /// See [`Crowdsale::mint_allocation`].
    pub fn mint_allocation(
        &self,
        caller: AccountId,
        beneficiary: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.mint_allocation(ctx, beneficiary, amount))
    }

    /// See [`Crowdsale::finish_minting`].
    pub fn finish_minting(&self, caller: AccountId) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.finish_minting(ctx))
    }

    /// See [`Crowdsale::transfer_token_ownership`].
    pub fn transfer_token_ownership(&self, caller: AccountId) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.transfer_token_ownership(ctx))
    }

    /// See [`Crowdsale::reduce_locking_time`].
    pub fn reduce_locking_time(&self, caller: AccountId, new_unlock_time: Timestamp) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.reduce_locking_time(ctx, new_unlock_time))
    }

    /// See [`Crowdsale::release_locked`].
    pub fn release_tokens(&self, caller: AccountId, beneficiary: AccountId) -> ContractResult<Amount> {
        self.execute(caller, |sale, ctx| sale.release_locked(ctx, beneficiary))
    }

    // -----------------------------------------------------------------------
    // Holder operations on the ledger
    // -----------------------------------------------------------------------

    /// See [`Ledger::transfer`].
    pub fn transfer(&self, caller: AccountId, to: AccountId, amount: Amount) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.token_mut().transfer(ctx, to, amount))
    }

    /// See [`Ledger::transfer_from`].
    pub fn transfer_from(
        &self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| {
            sale.token_mut().transfer_from(ctx, from, to, amount)
        })
    }

    /// See [`Ledger::approve`].
    pub fn approve_spender(&self, caller: AccountId, spender: AccountId, amount: Amount) -> ContractResult<()> {
        self.execute(caller, |sale, ctx| sale.token_mut().approve(ctx, spender, amount))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Sale phase right now.
    pub fn phase(&self) -> SalePhase {
        self.query(|sale, now| sale.phase(now))
    }

    /// Ledger balance of `account`.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.query(|sale, _| sale.token().balance_of(account))
    }

    /// Amount noted in the vault for `beneficiary`.
    pub fn locked_balance_of(&self, beneficiary: &AccountId) -> Amount {
        self.query(|sale, _| sale.locking_vault().balance_of(beneficiary))
    }

    /// Whether the vault is locked right now.
    pub fn is_locked(&self) -> bool {
        self.query(|sale, now| sale.locking_vault().is_locked(now))
    }

    /// Pending direct proposal for `beneficiary`.
    pub fn mint_proposal(&self, beneficiary: &AccountId) -> Amount {
        self.query(|sale, _| sale.mint_proposal(beneficiary))
    }

    /// Pending locked proposal for `beneficiary`.
    pub fn mint_locked_proposal(&self, beneficiary: &AccountId) -> Amount {
        self.query(|sale, _| sale.mint_locked_proposal(beneficiary))
    }

    /// Ledger total supply.
    pub fn total_supply(&self) -> Amount {
        self.query(|sale, _| sale.token().total_supply())
    }

    /// Sum of all proposals made through the sale.
    pub fn cumulative_proposed(&self) -> Amount {
        self.query(|sale, _| sale.cumulative_proposed())
    }
}
