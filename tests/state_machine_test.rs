mod helpers;

use helpers::*;
use raffle_sync::error::{LimitKind, RaffleError};
use raffle_sync::models::{CampaignConfig, Contact, TicketState};
use raffle_sync::state_manager::{RaffleState, RESERVATION_TTL_MS};

/// Uniqueness and ownership completeness across a mixed workload
#[test]
fn test_invariants_hold_through_workload() {
    let mut state = RaffleState::new(policy(2, 2));

    for n in 0..20 {
        state.reserve(t(n), 0).unwrap();
    }
    state.purchase(&[t(0), t(1)], &ana(), 10).unwrap();
    state.purchase(&[t(2)], &bruno(), 10).unwrap();
    state.cancel(t(3));
    state.sweep_expired(RESERVATION_TTL_MS);
    for n in 0..5 {
        let _ = state.reserve(t(n), RESERVATION_TTL_MS);
    }

    assert!(state.check_invariants().is_ok());
    for ticket in state.shared().sold() {
        assert!(!state.reservations().contains_key(ticket));
        assert!(state.shared().owner_of(*ticket).is_some());
    }
}

/// Contact cap rejection leaves every map unchanged
#[test]
fn test_phone_cap_rejects_without_mutation() {
    let mut state = RaffleState::new(policy(1, 1));
    state.reserve(t(1), 0).unwrap();
    state.purchase(&[t(1)], &ana(), 0).unwrap();
    state.reserve(t(2), 0).unwrap();

    let before = fingerprint(&state);
    let same_phone = Contact::new("Outra", "11 99999-8888", "other@x.com");
    assert_eq!(
        state.purchase(&[t(2)], &same_phone, 0),
        Err(RaffleError::LimitExceeded {
            kind: LimitKind::Phone,
            limit: 1
        })
    );
    assert_eq!(fingerprint(&state), before);
}

/// Validation failure is atomic
#[test]
fn test_failed_validation_is_atomic() {
    let mut state = RaffleState::new(CampaignConfig::default());
    state.reserve(t(3), 0).unwrap();
    let before = fingerprint(&state);

    let result = state.purchase(&[t(3)], &Contact::new("Ana", "119", "  "), 0);
    assert!(matches!(result, Err(RaffleError::ValidationFailed(_))));
    assert_eq!(fingerprint(&state), before);
    assert!(!state.is_sold(t(3)));
}

/// A multi-ticket purchase with one bad ticket commits none of them
#[test]
fn test_partial_ticket_failure_is_atomic() {
    let mut state = RaffleState::new(policy(5, 5));
    state.reserve(t(1), 0).unwrap();
    let before = fingerprint(&state);

    assert_eq!(
        state.purchase(&[t(1), t(2)], &ana(), 0),
        Err(RaffleError::NotReserved(t(2)))
    );
    assert_eq!(fingerprint(&state), before);
}

/// Sweep is idempotent and uses an inclusive deadline
#[test]
fn test_sweep_idempotence() {
    let mut state = RaffleState::new(CampaignConfig::default());
    let now = 1_000_000;
    // expires at now - 1
    state.reserve(t(1), now - 1 - RESERVATION_TTL_MS).unwrap();
    // expires at now + 1
    state.reserve(t(2), now + 1 - RESERVATION_TTL_MS).unwrap();

    let released = state.sweep_expired(now);
    assert!(released.contains(&t(1)));
    assert!(!released.contains(&t(2)));
    assert!(state.reservations().contains_key(&t(2)));

    assert!(state.sweep_expired(now).is_empty());
}

/// Remote snapshot overwrites a conflicting local sale (last writer wins)
#[test]
fn test_remote_snapshot_overwrites_owner() {
    let mut local = RaffleState::new(CampaignConfig::default());
    local.reserve(t(5), 0).unwrap();
    let a = local.purchase(&[t(5)], &ana(), 0).unwrap();

    let mut remote = RaffleState::new(CampaignConfig::default());
    remote.reserve(t(5), 0).unwrap();
    let b = remote.purchase(&[t(5)], &bruno(), 0).unwrap();

    let outcome = local.apply_remote_snapshot(remote.snapshot());
    assert_eq!(outcome.overwritten, vec![t(5)]);
    assert_eq!(local.shared().owner_of(t(5)), Some(&b.participant_id));
    assert_ne!(a.participant_id, b.participant_id);
    assert!(local.shared().participant(&a.participant_id).is_none());
    assert!(local.check_invariants().is_ok());
}

/// Remote snapshots keep local reservations except for tickets now sold
#[test]
fn test_remote_snapshot_keeps_private_reservations() {
    let mut local = RaffleState::new(CampaignConfig::default());
    local.reserve(t(8), 0).unwrap();
    local.reserve(t(9), 0).unwrap();

    let mut remote = RaffleState::new(CampaignConfig::default());
    remote.reserve(t(9), 0).unwrap();
    remote.purchase(&[t(9)], &bruno(), 0).unwrap();

    let outcome = local.apply_remote_snapshot(remote.snapshot());
    assert_eq!(outcome.preempted, vec![t(9)]);
    assert!(local.reservations().contains_key(&t(8)));
    assert!(!local.reservations().contains_key(&t(9)));
    assert!(local.check_invariants().is_ok());
}

/// Reserve at t=0, sweep at t=301s, ticket is available again
#[test]
fn test_reservation_expires_after_ttl() {
    let mut state = RaffleState::new(CampaignConfig::default());
    state.reserve(t(42), 0).unwrap();

    let released = state.sweep_expired(301_000);
    assert!(released.contains(&t(42)));
    assert!(!state.reservations().contains_key(&t(42)));
    assert_eq!(state.ticket_state(t(42), 301_000), Ok(TicketState::Available));
}

/// Purchase of ticket 7 populates every index
#[test]
fn test_purchase_populates_indexes() {
    let mut state = RaffleState::new(CampaignConfig::default());
    state.reserve(t(7), 0).unwrap();
    let receipt = state.purchase(&[t(7)], &ana(), 1).unwrap();

    let shared = state.shared();
    assert_eq!(shared.owner_of(t(7)), Some(&receipt.participant_id));
    assert_eq!(shared.tickets_for_phone("11999998888"), &[t(7)]);
    assert_eq!(shared.tickets_for_email("ana@x.com"), &[t(7)]);
    assert_eq!(shared.tickets_for_participant(&receipt.participant_id), &[t(7)]);
    assert!(shared.sold().contains(&t(7)));
    assert!(!state.reservations().contains_key(&t(7)));
}

/// Sold tickets cannot be reserved again, by anyone
#[test]
fn test_sold_is_terminal() {
    let mut state = RaffleState::new(CampaignConfig::default());
    state.reserve(t(7), 0).unwrap();
    state.purchase(&[t(7)], &ana(), 0).unwrap();

    assert_eq!(state.reserve(t(7), 1), Err(RaffleError::AlreadyTaken(t(7))));
    assert!(!state.cancel(t(7)));
    assert!(matches!(state.ticket_state(t(7), 1), Ok(TicketState::Sold { .. })));
}

/// Contact indexes append; earlier entries are never overwritten
#[test]
fn test_indexes_append() {
    let mut state = RaffleState::new(policy(3, 1));
    for n in [1, 2] {
        state.reserve(t(n), 0).unwrap();
        state.purchase(&[t(n)], &ana(), 0).unwrap();
    }
    assert_eq!(state.shared().tickets_for_phone("11999998888"), &[t(1), t(2)]);
    assert_eq!(state.shared().participants().count(), 2);
}
