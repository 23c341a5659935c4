use crate::models::TicketNumber;
use std::fmt;
use thiserror::Error;

/// Which contact cap a purchase ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Phone,
    Email,
    /// Too many tickets in a single purchase
    PerPurchase,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LimitKind::Phone => "phone",
            LimitKind::Email => "email",
            LimitKind::PerPurchase => "per-purchase",
        };
        f.write_str(label)
    }
}

/// Business-rule errors raised by the raffle state machine.
///
/// Every variant is returned before any map is touched, so a failed call
/// leaves the state exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Ticket is sold or actively reserved
    #[error("Ticket {0} is already taken")]
    AlreadyTaken(TicketNumber),

    /// Missing or malformed purchase input
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Phone, email or per-purchase cap reached
    #[error("{kind} limit of {limit} tickets exceeded")]
    LimitExceeded { kind: LimitKind, limit: u32 },

    /// Purchase attempted without an active reservation held by this instance
    #[error("Ticket {0} has no active reservation")]
    NotReserved(TicketNumber),

    /// Ticket outside `[0, total_numbers)`
    #[error("Ticket {0} is out of range")]
    OutOfRange(u64),
}

/// Snapshot decode and shape validation errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Malformed snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Persistence store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be opened, read or written
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    /// Saved data exists but cannot be trusted
    #[error("Saved data is corrupt: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SnapshotError> for StoreError {
    fn from(err: SnapshotError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl StoreError {
    /// Check if the saved data should be discarded in favour of defaults
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt(_) | StoreError::Serialization(_))
    }
}

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Business rule violations
    #[error("Raffle error: {0}")]
    Raffle(#[from] RaffleError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Admin gate rejected the passphrase
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Generator or relay failures
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The instance task has stopped
    #[error("Instance is shut down")]
    InstanceClosed,

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a business-rule rejection
    pub fn is_rejection(&self) -> bool {
        matches!(self, AppError::Raffle(_))
    }

    /// Borrow the underlying business-rule error, if any
    pub fn as_raffle(&self) -> Option<&RaffleError> {
        match self {
            AppError::Raffle(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_message() {
        let err = RaffleError::LimitExceeded {
            kind: LimitKind::Phone,
            limit: 1,
        };
        assert_eq!(err.to_string(), "phone limit of 1 tickets exceeded");
    }

    #[test]
    fn test_snapshot_error_maps_to_corrupt() {
        let err: StoreError = SnapshotError::UnsupportedVersion {
            found: 9,
            expected: 1,
        }
        .into();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_app_error_rejection() {
        let err = AppError::from(RaffleError::AlreadyTaken(TicketNumber::new(3)));
        assert!(err.is_rejection());
        assert_eq!(
            err.as_raffle(),
            Some(&RaffleError::AlreadyTaken(TicketNumber::new(3)))
        );
        assert!(!AppError::InstanceClosed.is_rejection());
    }
}
