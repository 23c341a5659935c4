use crate::models::{TicketNumber, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Reservation,
    Purchase,
}

/// Entry of the live activity feed. Display-only, never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub user_first_name: String,
    pub ticket: TicketNumber,
    pub timestamp: Timestamp,
    pub kind: ActivityKind,
}

impl ActivityEvent {
    pub fn new(
        user_first_name: impl Into<String>,
        ticket: TicketNumber,
        timestamp: Timestamp,
        kind: ActivityKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_first_name: user_first_name.into(),
            ticket,
            timestamp,
            kind,
        }
    }
}
