//! Domain models for the raffle engine.
//!
//! Plain data carried between the state machine, the snapshot codec and
//! the instance controller.

pub mod activity;
pub mod campaign;
pub mod participant;
pub mod purchase;
pub mod reservation;
pub mod ticket;

// Re-export all models for convenient access
pub use activity::{ActivityEvent, ActivityKind};
pub use campaign::{CampaignConfig, CampaignMetadata};
pub use participant::{normalize_email, normalize_phone, Contact, Participant, ParticipantId};
pub use purchase::PurchaseRecord;
pub use reservation::Reservation;
pub use ticket::{TicketNumber, TicketState, Timestamp, TOTAL_NUMBERS};
