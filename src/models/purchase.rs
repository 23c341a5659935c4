use crate::models::{TicketNumber, Timestamp};
use serde::{Deserialize, Serialize};

/// Local receipt for one ticket bought from this instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub ticket: TicketNumber,
    pub timestamp: Timestamp,
    pub prize_label: String,
}
