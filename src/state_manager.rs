//! Raffle state machine.
//!
//! Tickets move `Available -> Reserved -> Sold`, with `Reserved -> Available`
//! on expiry or cancel. `Sold` is terminal. Every operation validates first
//! and mutates second, so a rejected call never leaves partial state behind.

use crate::error::{LimitKind, RaffleError};
use crate::models::{
    normalize_email, normalize_phone, ActivityEvent, ActivityKind, CampaignConfig, Contact,
    Participant, ParticipantId, Reservation, TicketNumber, TicketState, Timestamp,
};
use crate::snapshot::RaffleSnapshot;
use rand::Rng;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};
use tracing::{debug, info, warn};

/// Reservation lifetime: 5 minutes
pub const RESERVATION_TTL_MS: i64 = 5 * 60 * 1000;

/// Attempts made by `reserve_random` before giving up
const RANDOM_DRAW_ATTEMPTS: usize = 32;

/// Committed campaign state, the part that is persisted and shared across
/// instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedState {
    pub(crate) sold: BTreeSet<TicketNumber>,
    pub(crate) owners: BTreeMap<TicketNumber, ParticipantId>,
    pub(crate) participants: BTreeMap<ParticipantId, Participant>,
    pub(crate) phone_index: BTreeMap<String, Vec<TicketNumber>>,
    pub(crate) email_index: BTreeMap<String, Vec<TicketNumber>>,
    pub(crate) participant_index: BTreeMap<ParticipantId, Vec<TicketNumber>>,
}

impl SharedState {
    pub fn sold(&self) -> &BTreeSet<TicketNumber> {
        &self.sold
    }

    pub fn owner_of(&self, ticket: TicketNumber) -> Option<&ParticipantId> {
        self.owners.get(&ticket)
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn tickets_for_phone(&self, phone: &str) -> &[TicketNumber] {
        self.phone_index
            .get(&normalize_phone(phone))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn tickets_for_email(&self, email: &str) -> &[TicketNumber] {
        self.email_index
            .get(&normalize_email(email))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn tickets_for_participant(&self, id: &ParticipantId) -> &[TicketNumber] {
        self.participant_index
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Ownership must cover exactly the sold set, and every indexed ticket
    /// must be sold.
    pub fn check_invariants(&self) -> Result<(), String> {
        let owned: BTreeSet<TicketNumber> = self.owners.keys().copied().collect();
        if owned != self.sold {
            return Err("ownership index does not match sold set".to_string());
        }

        for (ticket, id) in &self.owners {
            if !self.participants.contains_key(id) {
                return Err(format!("ticket {} owned by unknown participant {}", ticket, id));
            }
        }

        let indexed = self
            .phone_index
            .values()
            .chain(self.email_index.values())
            .chain(self.participant_index.values())
            .flatten();
        for ticket in indexed {
            if !self.sold.contains(ticket) {
                return Err(format!("contact index references unsold ticket {}", ticket));
            }
        }

        Ok(())
    }
}

/// Result of a committed purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub participant_id: ParticipantId,
    pub tickets: Vec<TicketNumber>,
    pub activity: ActivityEvent,
}

/// What a remote snapshot merge changed locally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Tickets whose owner differed locally and was replaced
    pub overwritten: Vec<TicketNumber>,
    /// Local reservations released because the ticket is now sold
    pub preempted: Vec<TicketNumber>,
}

/// Per-instance raffle state machine
#[derive(Debug, Clone)]
pub struct RaffleState {
    config: CampaignConfig,
    reservation_ttl_ms: i64,
    shared: SharedState,
    reservations: BTreeMap<TicketNumber, Timestamp>,
    /// Min-heap by expiry. Entries whose deadline no longer matches
    /// `reservations` are stale and skipped.
    expiry_queue: BinaryHeap<Reverse<(Timestamp, TicketNumber)>>,
}

impl RaffleState {
    pub fn new(config: CampaignConfig) -> Self {
        Self {
            config,
            reservation_ttl_ms: RESERVATION_TTL_MS,
            shared: SharedState::default(),
            reservations: BTreeMap::new(),
            expiry_queue: BinaryHeap::new(),
        }
    }

    /// Set reservation lifetime
    pub fn with_reservation_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.reservation_ttl_ms = ttl_ms;
        self
    }

    /// Rebuild from a decoded snapshot. Reservations start empty.
    pub fn from_snapshot(snapshot: RaffleSnapshot) -> Self {
        let (config, shared) = snapshot.into_parts();
        Self {
            shared,
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CampaignConfig) {
        self.config = config;
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn reservations(&self) -> &BTreeMap<TicketNumber, Timestamp> {
        &self.reservations
    }

    pub fn reservation_ttl_ms(&self) -> i64 {
        self.reservation_ttl_ms
    }

    pub fn is_sold(&self, ticket: TicketNumber) -> bool {
        self.shared.sold.contains(&ticket)
    }

    pub fn sold_count(&self) -> usize {
        self.shared.sold.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Observable state of `ticket`, `OutOfRange` outside the pool
    pub fn ticket_state(
        &self,
        ticket: TicketNumber,
        now: Timestamp,
    ) -> Result<TicketState, RaffleError> {
        self.check_range(ticket)?;
        if let Some(owner) = self.shared.owners.get(&ticket) {
            return Ok(TicketState::Sold {
                owner: owner.clone(),
            });
        }
        let state = match self.reservations.get(&ticket) {
            Some(&expires_at) if expires_at > now => TicketState::Reserved { expires_at },
            _ => TicketState::Available,
        };
        Ok(state)
    }

    fn check_range(&self, ticket: TicketNumber) -> Result<(), RaffleError> {
        if ticket.value() >= self.config.total_numbers {
            return Err(RaffleError::OutOfRange(u64::from(ticket.value())));
        }
        Ok(())
    }

    fn has_active_reservation(&self, ticket: TicketNumber, now: Timestamp) -> bool {
        matches!(self.reservations.get(&ticket), Some(&expires_at) if expires_at > now)
    }

    /// Hold a ticket for the reservation TTL.
    ///
    /// An expired hold that the sweep has not collected yet counts as free.
    pub fn reserve(&mut self, ticket: TicketNumber, now: Timestamp) -> Result<Reservation, RaffleError> {
        self.check_range(ticket)?;

        if self.is_sold(ticket) || self.has_active_reservation(ticket, now) {
            return Err(RaffleError::AlreadyTaken(ticket));
        }

        let expires_at = now.saturating_add(self.reservation_ttl_ms);
        self.reservations.insert(ticket, expires_at);
        self.expiry_queue.push(Reverse((expires_at, ticket)));

        debug!("Reserved ticket {} until {}", ticket, expires_at);
        Ok(Reservation { ticket, expires_at })
    }

    /// Reserve a uniformly random ticket from the pool
    pub fn reserve_random<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: Timestamp,
    ) -> Result<Reservation, RaffleError> {
        let mut last = TicketNumber::new(0);
        for _ in 0..RANDOM_DRAW_ATTEMPTS {
            last = TicketNumber::new(rng.gen_range(0..self.config.total_numbers));
            match self.reserve(last, now) {
                Err(RaffleError::AlreadyTaken(_)) => continue,
                other => return other,
            }
        }
        warn!("Random draw gave up after {} collisions", RANDOM_DRAW_ATTEMPTS);
        Err(RaffleError::AlreadyTaken(last))
    }

    /// Drop a held reservation. Returns whether one existed.
    pub fn cancel(&mut self, ticket: TicketNumber) -> bool {
        let removed = self.reservations.remove(&ticket).is_some();
        if removed {
            debug!("Cancelled reservation for ticket {}", ticket);
        }
        removed
    }

    /// Convert held reservations into a confirmed purchase.
    ///
    /// Checks run in order: contact fields, phone cap, email cap, per-purchase
    /// cap, then each ticket's availability and reservation. Nothing is
    /// written until all of them pass.
    pub fn purchase(
        &mut self,
        tickets: &[TicketNumber],
        contact: &Contact,
        now: Timestamp,
    ) -> Result<PurchaseReceipt, RaffleError> {
        if let Some(field) = contact.missing_field() {
            return Err(RaffleError::ValidationFailed(format!("{} is required", field)));
        }
        if tickets.is_empty() {
            return Err(RaffleError::ValidationFailed("no tickets selected".to_string()));
        }
        let mut seen = HashSet::with_capacity(tickets.len());
        if !tickets.iter().all(|t| seen.insert(*t)) {
            return Err(RaffleError::ValidationFailed("duplicate tickets in purchase".to_string()));
        }

        let phone = normalize_phone(&contact.phone);
        if phone.is_empty() {
            return Err(RaffleError::ValidationFailed("phone must contain digits".to_string()));
        }
        let email = normalize_email(&contact.email);

        let cap = self.config.max_entries_per_phone as usize;
        let phone_count = self.shared.phone_index.get(&phone).map_or(0, Vec::len);
        if phone_count + tickets.len() > cap {
            return Err(RaffleError::LimitExceeded {
                kind: LimitKind::Phone,
                limit: self.config.max_entries_per_phone,
            });
        }
        let email_count = self.shared.email_index.get(&email).map_or(0, Vec::len);
        if email_count + tickets.len() > cap {
            return Err(RaffleError::LimitExceeded {
                kind: LimitKind::Email,
                limit: self.config.max_entries_per_phone,
            });
        }
        if tickets.len() > self.config.max_purchase_limit as usize {
            return Err(RaffleError::LimitExceeded {
                kind: LimitKind::PerPurchase,
                limit: self.config.max_purchase_limit,
            });
        }

        for &ticket in tickets {
            self.check_range(ticket)?;
            if self.is_sold(ticket) {
                return Err(RaffleError::AlreadyTaken(ticket));
            }
            if !self.has_active_reservation(ticket, now) {
                return Err(RaffleError::NotReserved(ticket));
            }
        }

        let participant_id = ParticipantId::generate();
        let participant = Participant::from_contact(participant_id.clone(), contact);

        for &ticket in tickets {
            self.shared.sold.insert(ticket);
            self.shared.owners.insert(ticket, participant_id.clone());
            self.reservations.remove(&ticket);
        }
        self.shared
            .participants
            .insert(participant_id.clone(), participant);
        self.shared
            .phone_index
            .entry(phone)
            .or_default()
            .extend_from_slice(tickets);
        self.shared
            .email_index
            .entry(email)
            .or_default()
            .extend_from_slice(tickets);
        self.shared
            .participant_index
            .entry(participant_id.clone())
            .or_default()
            .extend_from_slice(tickets);

        info!(
            "Purchase committed: participant={}, tickets={:?}",
            participant_id, tickets
        );

        let activity = ActivityEvent::new(
            contact.first_name(),
            tickets[0],
            now,
            ActivityKind::Purchase,
        );

        Ok(PurchaseReceipt {
            participant_id,
            tickets: tickets.to_vec(),
            activity,
        })
    }

    /// Release every reservation with `expires_at <= now`.
    ///
    /// Idempotent: a second call with the same `now` returns an empty set.
    pub fn sweep_expired(&mut self, now: Timestamp) -> BTreeSet<TicketNumber> {
        let mut released = BTreeSet::new();

        while let Some(Reverse((expires_at, ticket))) = self.expiry_queue.peek().copied() {
            if expires_at > now {
                break;
            }
            self.expiry_queue.pop();

            if self.reservations.get(&ticket) == Some(&expires_at) {
                self.reservations.remove(&ticket);
                released.insert(ticket);
            }
        }

        if !released.is_empty() {
            info!("Released {} expired reservations", released.len());
        }
        released
    }

    /// Last-writer-wins merge of another instance's committed state.
    ///
    /// Replaces sold set, owners, participants and contact indexes wholesale.
    /// Local reservations stay private, except those whose ticket the
    /// snapshot now reports as sold.
    pub fn apply_remote_snapshot(&mut self, snapshot: RaffleSnapshot) -> MergeOutcome {
        let (_, incoming) = snapshot.into_parts();

        let overwritten: Vec<TicketNumber> = self
            .shared
            .owners
            .iter()
            .filter(|(ticket, owner)| {
                incoming
                    .owners
                    .get(*ticket)
                    .map_or(true, |remote| remote != *owner)
            })
            .map(|(ticket, _)| *ticket)
            .collect();

        for ticket in &overwritten {
            warn!("Remote snapshot overwrote local owner of ticket {}", ticket);
        }

        let preempted: Vec<TicketNumber> = self
            .reservations
            .keys()
            .filter(|ticket| incoming.sold.contains(*ticket))
            .copied()
            .collect();
        for ticket in &preempted {
            self.reservations.remove(ticket);
        }

        self.shared = incoming;
        debug!(
            "Merged remote snapshot: {} sold, {} preempted reservations",
            self.shared.sold.len(),
            preempted.len()
        );

        MergeOutcome {
            overwritten,
            preempted,
        }
    }

    /// Serialize committed state for persistence and broadcast
    pub fn snapshot(&self) -> RaffleSnapshot {
        RaffleSnapshot::from_state(&self.config, &self.shared)
    }

    /// Forget everything, keeping the campaign policy
    pub fn reset(&mut self) {
        self.shared = SharedState::default();
        self.reservations.clear();
        self.expiry_queue.clear();
    }

    /// Check all global invariants, including sold/reserved disjointness
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(ticket) = self.reservations.keys().find(|t| self.shared.sold.contains(*t)) {
            return Err(format!("ticket {} is both sold and reserved", ticket));
        }
        self.shared.check_invariants()
    }
}
