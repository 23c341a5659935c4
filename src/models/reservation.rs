use crate::models::{TicketNumber, Timestamp};
use serde::{Deserialize, Serialize};

/// Time-boxed hold on a ticket, private to the instance that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub ticket: TicketNumber,
    pub expires_at: Timestamp,
}
