//! Integration tests for the crowdsale controller.
//!
//! Every test deploys a fresh ledger and sale, hands ledger administration
//! to the sale, and then drives calls at explicit timestamps inside or
//! around the sale window.

use thinkcoin_contracts::{CallContext, ContractError, Crowdsale, Ledger, SaleParams, SalePhase};
use thinkcoin_protocol::clock::{DAY, WEEK};
use thinkcoin_protocol::config::ONE_TOKEN;
use thinkcoin_protocol::{AccountId, Amount, Timestamp};

const DEPLOYED_AT: Timestamp = 1_600_000_000;
const START: Timestamp = DEPLOYED_AT + DAY;
const END: Timestamp = START + 30 * DAY;
const DURING: Timestamp = START + DAY;
const BEFORE: Timestamp = START - 1;
const AFTER: Timestamp = END + DAY;

const TOKEN_CAP: Amount = 500_000_000 * ONE_TOKEN;
const SALE_CAP: Amount = 225_000_000 * ONE_TOKEN;

fn id(label: &str) -> AccountId {
    AccountId::from_label(label)
}

fn at(label: &str, now: Timestamp) -> CallContext {
    CallContext::new(id(label), now)
}

/// Helper: a deployed sale whose owner is `owner`, with `proposer` and
/// `approver` in their roles and ledger administration already handed over.
fn deploy() -> Crowdsale {
    let owner = at("owner", DEPLOYED_AT);
    let ledger = Ledger::new(&owner, id("ledger"), TOKEN_CAP).unwrap();
    let params = SaleParams {
        locking_period: 90 * DAY,
        proposer: id("proposer"),
        approver: id("approver"),
        sale_cap: SALE_CAP,
        sale_start_time: START,
        sale_end_time: END,
    };
    let mut sale = Crowdsale::new(&owner, id("sale"), ledger, params).unwrap();
    sale.token_mut()
        .transfer_ownership(&owner, id("sale"))
        .unwrap();
    sale
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn properly_created() {
    let sale = deploy();
    assert_eq!(sale.owner(), id("owner"));
    assert_eq!(sale.proposer(), id("proposer"));
    assert_eq!(sale.approver(), id("approver"));
    assert_eq!(sale.sale_cap(), SALE_CAP);
    assert_eq!(sale.cumulative_proposed(), 0);
    assert_eq!(sale.token().administrator(), id("sale"));
    assert_eq!(sale.locking_vault().owner(), sale.address());
    assert_eq!(sale.locking_vault().unlock_time(), DEPLOYED_AT + 90 * DAY);
}

#[test]
fn phases_follow_the_window() {
    let sale = deploy();
    assert_eq!(sale.phase(BEFORE), SalePhase::PreSale);
    assert_eq!(sale.phase(START), SalePhase::Active);
    assert_eq!(sale.phase(END - 1), SalePhase::Active);
    assert_eq!(sale.phase(END), SalePhase::PostSale);
}

#[test]
fn zero_role_rejected_at_construction() {
    let owner = at("owner", DEPLOYED_AT);
    let ledger = Ledger::new(&owner, id("ledger"), TOKEN_CAP).unwrap();
    let params = SaleParams {
        locking_period: DAY,
        proposer: AccountId::ZERO,
        approver: id("approver"),
        sale_cap: SALE_CAP,
        sale_start_time: START,
        sale_end_time: END,
    };
    assert!(matches!(
        Crowdsale::new(&owner, id("sale"), ledger, params),
        Err(ContractError::ZeroAddress(_))
    ));
}

// ---------------------------------------------------------------------------
// Role management
// ---------------------------------------------------------------------------

#[test]
fn owner_changes_roles_in_every_phase() {
    let mut sale = deploy();
    for (i, now) in [BEFORE, DURING, AFTER].into_iter().enumerate() {
        let proposer = id(&format!("proposer-{i}"));
        let approver = id(&format!("approver-{i}"));
        sale.change_proposer(&at("owner", now), proposer).unwrap();
        sale.change_approver(&at("owner", now), approver).unwrap();
        assert_eq!(sale.proposer(), proposer);
        assert_eq!(sale.approver(), approver);
    }
}

#[test]
fn third_party_cannot_change_roles() {
    let mut sale = deploy();
    assert!(matches!(
        sale.change_proposer(&at("intruder", DURING), id("intruder")),
        Err(ContractError::Unauthorized { .. })
    ));
    assert!(matches!(
        sale.change_approver(&at("proposer", DURING), id("proposer")),
        Err(ContractError::Unauthorized { .. })
    ));
    assert_eq!(sale.proposer(), id("proposer"));
    assert_eq!(sale.approver(), id("approver"));
}

#[test]
fn new_proposer_takes_effect_immediately() {
    let mut sale = deploy();
    sale.change_proposer(&at("owner", DURING), id("new-proposer"))
        .unwrap();
    assert!(matches!(
        sale.propose_mint(&at("proposer", DURING), id("client"), 10),
        Err(ContractError::Unauthorized { .. })
    ));
    sale.propose_mint(&at("new-proposer", DURING), id("client"), 10)
        .unwrap();
}

#[test]
fn sale_ownership_handoff() {
    let mut sale = deploy();
    sale.transfer_ownership(&at("owner", DURING), id("new-owner"))
        .unwrap();
    assert_eq!(sale.owner(), id("new-owner"));
    assert!(sale
        .change_proposer(&at("owner", DURING), id("x"))
        .is_err());
}

// ---------------------------------------------------------------------------
// Proposing
// ---------------------------------------------------------------------------

#[test]
fn proposals_only_while_active() {
    let mut sale = deploy();
    for (now, phase) in [(BEFORE, SalePhase::PreSale), (AFTER, SalePhase::PostSale)] {
        assert_eq!(
            sale.propose_mint(&at("proposer", now), id("client"), 10),
            Err(ContractError::WrongPhase {
                current: phase,
                required: SalePhase::Active,
            })
        );
        assert_eq!(
            sale.propose_mint_locked(&at("proposer", now), id("client"), 10),
            Err(ContractError::WrongPhase {
                current: phase,
                required: SalePhase::Active,
            })
        );
    }
    assert_eq!(sale.mint_proposal(&id("client")), 0);
    assert_eq!(sale.cumulative_proposed(), 0);
}

#[test]
fn only_proposer_proposes() {
    let mut sale = deploy();
    for who in ["owner", "approver", "client"] {
        assert!(matches!(
            sale.propose_mint(&at(who, DURING), id("client"), 10),
            Err(ContractError::Unauthorized { role: "proposer", .. })
        ));
    }
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    assert_eq!(sale.mint_proposal(&id("client")), 10);
}

#[test]
fn sale_cap_is_exact() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("a"), SALE_CAP - 1)
        .unwrap();
    assert_eq!(
        sale.propose_mint_locked(&at("proposer", DURING), id("b"), 2),
        Err(ContractError::SaleCapExceeded {
            requested: 2,
            remaining: 1,
        })
    );
    sale.propose_mint_locked(&at("proposer", DURING), id("b"), 1)
        .unwrap();
    assert_eq!(sale.cumulative_proposed(), SALE_CAP);
    assert_eq!(sale.remaining_sale_cap(), 0);
}

#[test]
fn approvals_do_not_refund_the_sale_cap() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("a"), SALE_CAP)
        .unwrap();
    sale.approve_mint(&at("approver", DURING), id("a"), SALE_CAP)
        .unwrap();
    assert!(matches!(
        sale.propose_mint(&at("proposer", DURING), id("a"), 1),
        Err(ContractError::SaleCapExceeded { .. })
    ));
}

#[test]
fn duplicate_proposal_rejected() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    assert_eq!(
        sale.propose_mint(&at("proposer", DURING), id("client"), 20),
        Err(ContractError::DuplicateProposal {
            beneficiary: id("client"),
            pending: 10,
        })
    );
    assert_eq!(sale.mint_proposal(&id("client")), 10);
    assert_eq!(sale.cumulative_proposed(), 10);
}

#[test]
fn direct_and_locked_proposals_coexist() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    sale.propose_mint_locked(&at("proposer", DURING), id("client"), 20)
        .unwrap();
    assert_eq!(sale.mint_proposal(&id("client")), 10);
    assert_eq!(sale.mint_locked_proposal(&id("client")), 20);
    assert_eq!(sale.cumulative_proposed(), 30);
}

#[test]
fn zero_beneficiary_rejected_for_direct_proposal() {
    let mut sale = deploy();
    assert_eq!(
        sale.propose_mint(&at("proposer", DURING), AccountId::ZERO, 5),
        Err(ContractError::ZeroAddress("beneficiary"))
    );
    assert_eq!(sale.mint_proposal(&AccountId::ZERO), 0);
    assert_eq!(sale.cumulative_proposed(), 0);
    assert!(matches!(
        sale.approve_mint(&at("approver", DURING), AccountId::ZERO, 5),
        Err(ContractError::NoMatchingProposal { .. })
    ));
    assert_eq!(sale.token().total_supply(), 0);
}

#[test]
fn zero_beneficiary_rejected_for_locked_proposal() {
    let mut sale = deploy();
    assert_eq!(
        sale.propose_mint_locked(&at("proposer", DURING), AccountId::ZERO, 50),
        Err(ContractError::ZeroAddress("beneficiary"))
    );
    assert_eq!(sale.mint_locked_proposal(&AccountId::ZERO), 0);
    assert!(matches!(
        sale.approve_mint_locked(&at("approver", DURING), AccountId::ZERO, 50),
        Err(ContractError::NoMatchingProposal { .. })
    ));
    let vault = sale.locking_vault().address();
    assert_eq!(sale.token().balance_of(&vault), 0);
    assert_eq!(sale.locking_vault().total_noted(), 0);
}

// ---------------------------------------------------------------------------
// Approving
// ---------------------------------------------------------------------------

#[test]
fn approve_mints_and_clears() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    sale.approve_mint(&at("approver", DURING), id("client"), 10)
        .unwrap();
    assert_eq!(sale.token().balance_of(&id("client")), 10);
    assert_eq!(sale.mint_proposal(&id("client")), 0);
}

#[test]
fn approve_requires_exact_amount() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    assert_eq!(
        sale.approve_mint(&at("approver", DURING), id("client"), 9),
        Err(ContractError::AmountMismatch {
            proposed: 10,
            approved: 9,
        })
    );
    assert_eq!(sale.token().balance_of(&id("client")), 0);
    assert_eq!(sale.mint_proposal(&id("client")), 10);
}

#[test]
fn only_approver_approves() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    assert!(matches!(
        sale.approve_mint(&at("proposer", DURING), id("client"), 10),
        Err(ContractError::Unauthorized { role: "approver", .. })
    ));
    assert_eq!(sale.token().total_supply(), 0);
}

#[test]
fn approving_twice_rejected() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    sale.approve_mint(&at("approver", DURING), id("client"), 10)
        .unwrap();
    assert_eq!(
        sale.approve_mint(&at("approver", DURING), id("client"), 10),
        Err(ContractError::NoMatchingProposal {
            beneficiary: id("client"),
        })
    );
    assert_eq!(sale.token().balance_of(&id("client")), 10);
}

#[test]
fn approve_without_proposal_rejected() {
    let mut sale = deploy();
    assert_eq!(
        sale.approve_mint(&at("approver", DURING), id("client"), 10),
        Err(ContractError::NoMatchingProposal {
            beneficiary: id("client"),
        })
    );
    assert_eq!(
        sale.approve_mint(&at("approver", DURING), id("client"), 0),
        Err(ContractError::ZeroAmount)
    );
}

#[test]
fn approval_after_sale_end() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", END - 1), id("client"), 10)
        .unwrap();
    sale.approve_mint(&at("approver", AFTER), id("client"), 10)
        .unwrap();
    assert_eq!(sale.token().balance_of(&id("client")), 10);
}

#[test]
fn approve_locked_mints_into_vault() {
    let mut sale = deploy();
    sale.propose_mint_locked(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    sale.approve_mint_locked(&at("approver", DURING), id("client"), 10)
        .unwrap();
    let vault = sale.locking_vault().address();
    assert_eq!(sale.token().balance_of(&vault), 10);
    assert_eq!(sale.token().balance_of(&id("client")), 0);
    assert_eq!(sale.locking_vault().balance_of(&id("client")), 10);
    assert_eq!(sale.mint_locked_proposal(&id("client")), 0);
}

#[test]
fn direct_approval_does_not_touch_locked_proposal() {
    let mut sale = deploy();
    sale.propose_mint_locked(&at("proposer", DURING), id("client"), 10)
        .unwrap();
    assert!(matches!(
        sale.approve_mint(&at("approver", DURING), id("client"), 10),
        Err(ContractError::NoMatchingProposal { .. })
    ));
    assert_eq!(sale.mint_locked_proposal(&id("client")), 10);
}

// ---------------------------------------------------------------------------
// Post-sale administration
// ---------------------------------------------------------------------------

#[test]
fn allocations_only_after_sale() {
    let mut sale = deploy();
    for (now, phase) in [(BEFORE, SalePhase::PreSale), (DURING, SalePhase::Active)] {
        assert_eq!(
            sale.mint_allocation(&at("owner", now), id("team"), 10),
            Err(ContractError::WrongPhase {
                current: phase,
                required: SalePhase::PostSale,
            })
        );
    }
    sale.mint_allocation(&at("owner", AFTER), id("team"), 10)
        .unwrap();
    assert_eq!(sale.token().balance_of(&id("team")), 10);
}

#[test]
fn allocations_bounded_by_token_cap_only() {
    let mut sale = deploy();
    sale.propose_mint(&at("proposer", DURING), id("a"), SALE_CAP)
        .unwrap();
    sale.approve_mint(&at("approver", DURING), id("a"), SALE_CAP)
        .unwrap();
    sale.mint_allocation(&at("owner", AFTER), id("team"), TOKEN_CAP - SALE_CAP)
        .unwrap();
    assert_eq!(sale.token().total_supply(), TOKEN_CAP);
    assert!(matches!(
        sale.mint_allocation(&at("owner", AFTER), id("team"), 1),
        Err(ContractError::CapExceeded { .. })
    ));
}

#[test]
fn allocation_to_zero_account_rejected() {
    let mut sale = deploy();
    assert_eq!(
        sale.mint_allocation(&at("owner", AFTER), AccountId::ZERO, 10),
        Err(ContractError::ZeroAddress("recipient"))
    );
    assert_eq!(sale.token().total_supply(), 0);
}

#[test]
fn only_owner_mints_allocations() {
    let mut sale = deploy();
    assert!(matches!(
        sale.mint_allocation(&at("proposer", AFTER), id("team"), 10),
        Err(ContractError::Unauthorized { role: "sale owner", .. })
    ));
}

#[test]
fn finish_minting_only_after_sale() {
    let mut sale = deploy();
    assert!(matches!(
        sale.finish_minting(&at("owner", DURING)),
        Err(ContractError::WrongPhase { .. })
    ));
    assert!(matches!(
        sale.finish_minting(&at("approver", AFTER)),
        Err(ContractError::Unauthorized { .. })
    ));
    sale.finish_minting(&at("owner", AFTER)).unwrap();
    assert!(sale.token().minting_finished());
}

#[test]
fn token_ownership_returns_to_owner_after_sale() {
    let mut sale = deploy();
    assert!(matches!(
        sale.transfer_token_ownership(&at("owner", DURING)),
        Err(ContractError::WrongPhase { .. })
    ));
    assert!(matches!(
        sale.transfer_token_ownership(&at("intruder", AFTER)),
        Err(ContractError::Unauthorized { .. })
    ));
    assert_eq!(sale.token().administrator(), id("sale"));

    sale.transfer_token_ownership(&at("owner", AFTER)).unwrap();
    assert_eq!(sale.token().administrator(), id("owner"));

    // The sale can no longer mint.
    assert!(matches!(
        sale.mint_allocation(&at("owner", AFTER), id("team"), 1),
        Err(ContractError::Unauthorized { .. })
    ));
}

// ---------------------------------------------------------------------------
// Locked allocations end to end
// ---------------------------------------------------------------------------

#[test]
fn locked_allocation_released_after_unlock() {
    let mut sale = deploy();
    sale.propose_mint_locked(&at("proposer", DURING), id("client"), 50)
        .unwrap();
    sale.approve_mint_locked(&at("approver", DURING), id("client"), 50)
        .unwrap();
    sale.finish_minting(&at("owner", AFTER)).unwrap();

    let unlock = sale.locking_vault().unlock_time();
    assert!(matches!(
        sale.release_locked(&at("client", unlock - 1), id("client")),
        Err(ContractError::StillLocked { .. })
    ));
    assert_eq!(sale.release_locked(&at("anyone", unlock), id("client")), Ok(50));
    assert_eq!(sale.token().balance_of(&id("client")), 50);
    assert_eq!(sale.release_locked(&at("anyone", unlock), id("client")), Ok(0));
}

#[test]
fn owner_can_unlock_early() {
    let mut sale = deploy();
    sale.propose_mint_locked(&at("proposer", DURING), id("client"), 50)
        .unwrap();
    sale.approve_mint_locked(&at("approver", DURING), id("client"), 50)
        .unwrap();
    sale.finish_minting(&at("owner", AFTER)).unwrap();

    assert!(matches!(
        sale.reduce_locking_time(&at("proposer", AFTER), AFTER),
        Err(ContractError::Unauthorized { .. })
    ));
    sale.reduce_locking_time(&at("owner", AFTER), AFTER).unwrap();
    assert_eq!(sale.release_locked(&at("client", AFTER), id("client")), Ok(50));
}

#[test]
fn locked_approval_after_unlock_fails_atomically() {
    let mut sale = deploy();
    sale.propose_mint_locked(&at("proposer", DURING), id("client"), 50)
        .unwrap();
    let late = sale.locking_vault().unlock_time() + WEEK;
    assert_eq!(
        sale.approve_mint_locked(&at("approver", late), id("client"), 50),
        Err(ContractError::VaultUnlocked)
    );
    assert_eq!(sale.token().total_supply(), 0);
    assert_eq!(sale.mint_locked_proposal(&id("client")), 50);
}

// ---------------------------------------------------------------------------
// Whole sale
// ---------------------------------------------------------------------------

#[test]
fn full_sale_lifecycle() {
    let mut sale = deploy();

    sale.change_proposer(&at("owner", BEFORE), id("desk"))
        .unwrap();
    sale.propose_mint(&at("desk", DURING), id("buyer"), ONE_TOKEN)
        .unwrap();
    sale.propose_mint_locked(&at("desk", DURING), id("buyer"), 2 * ONE_TOKEN)
        .unwrap();
    sale.approve_mint(&at("approver", DURING), id("buyer"), ONE_TOKEN)
        .unwrap();
    sale.approve_mint_locked(&at("approver", DURING), id("buyer"), 2 * ONE_TOKEN)
        .unwrap();

    sale.mint_allocation(&at("owner", AFTER), id("team"), 7 * ONE_TOKEN)
        .unwrap();
    sale.finish_minting(&at("owner", AFTER)).unwrap();
    sale.transfer_token_ownership(&at("owner", AFTER)).unwrap();

    assert_eq!(sale.token().total_supply(), 10 * ONE_TOKEN);
    assert_eq!(sale.cumulative_proposed(), 3 * ONE_TOKEN);
    assert_eq!(sale.token().administrator(), id("owner"));

    sale.token_mut()
        .transfer(&at("buyer", AFTER), id("friend"), ONE_TOKEN / 2)
        .unwrap();
    assert_eq!(sale.token().balance_of(&id("friend")), ONE_TOKEN / 2);
    assert_eq!(sale.locking_vault().balance_of(&id("buyer")), 2 * ONE_TOKEN);
}
