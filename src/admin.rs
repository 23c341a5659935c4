//! Admin surface: passphrase gate, campaign metadata edits and backups.
//!
//! The gate is a plaintext comparison against one shared passphrase. It only
//! hides admin controls from casual users and is not a security boundary.

use crate::config::AdminConfig;
use crate::error::{AppError, AppResult};
use crate::models::CampaignMetadata;
use crate::snapshot::RaffleSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Proof that the admin passphrase was entered
#[derive(Debug, Clone)]
pub struct AdminToken {
    _private: (),
}

pub struct AdminGate {
    passphrase: String,
}

impl AdminGate {
    pub fn new(config: &AdminConfig) -> Self {
        Self {
            passphrase: config.passphrase.clone(),
        }
    }

    pub fn login(&self, input: &str) -> AppResult<AdminToken> {
        if input.trim() != self.passphrase {
            warn!("Admin login rejected");
            return Err(AppError::Unauthorized("wrong admin passphrase".to_string()));
        }
        info!("Admin login accepted");
        Ok(AdminToken { _private: () })
    }
}

/// Partial edit of the campaign metadata; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub prize_name: Option<String>,
    pub prize_image: Option<String>,
    pub description: Option<String>,
}

impl MetadataUpdate {
    pub fn description(text: impl Into<String>) -> Self {
        Self {
            description: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn prize_image(image: impl Into<String>) -> Self {
        Self {
            prize_image: Some(image.into()),
            ..Self::default()
        }
    }

    /// Apply onto `current`, returning the edited copy
    pub fn apply(&self, current: &CampaignMetadata) -> AppResult<CampaignMetadata> {
        let mut next = current.clone();
        if let Some(name) = &self.prize_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Message("prize name must not be empty".to_string()));
            }
            next.prize_name = name.to_string();
        }
        if let Some(image) = &self.prize_image {
            next.prize_image = image.clone();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        Ok(next)
    }
}

/// Downloadable full-state backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub exported_at: DateTime<Utc>,
    /// Hex SHA-256 of the serialized snapshot
    pub checksum: String,
    pub metadata: CampaignMetadata,
    pub snapshot: RaffleSnapshot,
}

fn checksum(snapshot: &RaffleSnapshot) -> AppResult<String> {
    let bytes = serde_json::to_vec(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

impl BackupDocument {
    pub fn export(
        snapshot: RaffleSnapshot,
        metadata: CampaignMetadata,
        exported_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            exported_at,
            checksum: checksum(&snapshot)?,
            metadata,
            snapshot,
        })
    }

    /// Check the checksum and snapshot invariants
    pub fn verify(&self) -> AppResult<()> {
        if checksum(&self.snapshot)? != self.checksum {
            return Err(AppError::Message("backup checksum mismatch".to_string()));
        }
        self.snapshot
            .validate()
            .map_err(|e| AppError::Message(format!("backup snapshot invalid: {}", e)))
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignConfig, TicketNumber};

    #[test]
    fn test_gate() {
        let gate = AdminGate::new(&AdminConfig {
            passphrase: "198830cb".to_string(),
        });
        assert!(gate.login(" 198830cb ").is_ok());
        assert!(matches!(gate.login("guess"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_metadata_update_is_partial() {
        let current = CampaignMetadata::default();
        let next = MetadataUpdate::description("Nova descrição").apply(&current).unwrap();
        assert_eq!(next.description, "Nova descrição");
        assert_eq!(next.prize_name, current.prize_name);
    }

    #[test]
    fn test_metadata_update_rejects_blank_name() {
        let update = MetadataUpdate {
            prize_name: Some("  ".to_string()),
            ..MetadataUpdate::default()
        };
        assert!(update.apply(&CampaignMetadata::default()).is_err());
    }

    #[test]
    fn test_backup_checksum_detects_tampering() {
        let snapshot = RaffleSnapshot::empty(CampaignConfig::default());
        let mut backup =
            BackupDocument::export(snapshot, CampaignMetadata::default(), Utc::now()).unwrap();
        assert_eq!(backup.checksum.len(), 64);
        assert!(backup.verify().is_ok());

        backup.snapshot.sold_numbers.push(TicketNumber::new(1));
        assert!(backup.verify().is_err());
    }
}
