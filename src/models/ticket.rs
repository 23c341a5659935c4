use crate::models::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the default number pool
pub const TOTAL_NUMBERS: u32 = 1_000_000;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// A raffle ticket number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Display label, zero-padded to six digits (`#000042`)
    pub fn label(self) -> String {
        format!("#{:06}", self.0)
    }
}

impl From<u32> for TicketNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of one ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketState {
    Available,
    Reserved { expires_at: Timestamp },
    Sold { owner: ParticipantId },
}

impl TicketState {
    pub fn is_available(&self) -> bool {
        matches!(self, TicketState::Available)
    }
}
