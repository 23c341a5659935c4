//! Versioned snapshot of committed campaign state.
//!
//! Maps and sets are written as plain arrays of entries. `decode` checks the
//! version and the cross-index invariants before anything is trusted.

use crate::error::SnapshotError;
use crate::models::{
    normalize_email, normalize_phone, CampaignConfig, Participant, ParticipantId, TicketNumber,
};
use crate::state_manager::SharedState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaffleSnapshot {
    pub version: u32,
    pub config: CampaignConfig,
    pub sold_numbers: Vec<TicketNumber>,
    pub number_owners: Vec<(TicketNumber, ParticipantId)>,
    pub participants: Vec<Participant>,
    pub phone_to_numbers: Vec<(String, Vec<TicketNumber>)>,
    pub email_to_numbers: Vec<(String, Vec<TicketNumber>)>,
    pub participant_to_numbers: Vec<(ParticipantId, Vec<TicketNumber>)>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: Option<u32>,
}

impl RaffleSnapshot {
    pub fn from_state(config: &CampaignConfig, shared: &SharedState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            config: config.clone(),
            sold_numbers: shared.sold.iter().copied().collect(),
            number_owners: shared
                .owners
                .iter()
                .map(|(ticket, id)| (*ticket, id.clone()))
                .collect(),
            participants: shared.participants.values().cloned().collect(),
            phone_to_numbers: shared
                .phone_index
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            email_to_numbers: shared
                .email_index
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            participant_to_numbers: shared
                .participant_index
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Empty snapshot for the given policy
    pub fn empty(config: CampaignConfig) -> Self {
        Self::from_state(&config, &SharedState::default())
    }

    /// Split into policy and committed state
    pub fn into_parts(self) -> (CampaignConfig, SharedState) {
        let shared = SharedState {
            sold: self.sold_numbers.into_iter().collect(),
            owners: self.number_owners.into_iter().collect(),
            participants: self
                .participants
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            phone_index: self.phone_to_numbers.into_iter().collect(),
            email_index: self.email_to_numbers.into_iter().collect(),
            participant_index: self.participant_to_numbers.into_iter().collect(),
        };
        (self.config, shared)
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate untrusted bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let header: VersionHeader = serde_json::from_slice(bytes)?;
        let version = header.version.unwrap_or(0);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let snapshot: RaffleSnapshot = serde_json::from_slice(bytes)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check shape and invariants of a snapshot built elsewhere
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let inconsistent = |msg: String| Err(SnapshotError::Inconsistent(msg));

        self.config.validate().map_err(SnapshotError::Inconsistent)?;

        let sold: BTreeSet<TicketNumber> = self.sold_numbers.iter().copied().collect();
        if sold.len() != self.sold_numbers.len() {
            return inconsistent("duplicate entries in sold numbers".to_string());
        }
        if let Some(ticket) = sold.iter().find(|t| t.value() >= self.config.total_numbers) {
            return inconsistent(format!("sold ticket {} is out of range", ticket));
        }

        let owned: BTreeSet<TicketNumber> = self.number_owners.iter().map(|(t, _)| *t).collect();
        if owned.len() != self.number_owners.len() {
            return inconsistent("duplicate ticket in ownership entries".to_string());
        }
        if owned != sold {
            return inconsistent("ownership entries do not match sold numbers".to_string());
        }

        let participant_ids: BTreeSet<&ParticipantId> =
            self.participants.iter().map(|p| &p.id).collect();
        if let Some((ticket, id)) = self
            .number_owners
            .iter()
            .find(|(_, id)| !participant_ids.contains(id))
        {
            return inconsistent(format!("ticket {} owned by unknown participant {}", ticket, id));
        }

        if let Some(key) = duplicate_key(&self.phone_to_numbers) {
            return inconsistent(format!("duplicate phone index entry {}", key));
        }
        if let Some(key) = duplicate_key(&self.email_to_numbers) {
            return inconsistent(format!("duplicate email index entry {}", key));
        }
        if let Some(key) = duplicate_key(&self.participant_to_numbers) {
            return inconsistent(format!("duplicate participant index entry {}", key));
        }
        if let Some((key, _)) = self
            .phone_to_numbers
            .iter()
            .find(|(key, _)| key.is_empty() || normalize_phone(key) != *key)
        {
            return inconsistent(format!("phone index key {:?} is not normalized", key));
        }
        if let Some((key, _)) = self
            .email_to_numbers
            .iter()
            .find(|(key, _)| key.is_empty() || normalize_email(key) != *key)
        {
            return inconsistent(format!("email index key {:?} is not normalized", key));
        }
        if let Some((id, _)) = self
            .participant_to_numbers
            .iter()
            .find(|(id, _)| !participant_ids.contains(id))
        {
            return inconsistent(format!("participant index references unknown {}", id));
        }

        let indexed = self
            .phone_to_numbers
            .iter()
            .map(|(_, v)| v)
            .chain(self.email_to_numbers.iter().map(|(_, v)| v))
            .chain(self.participant_to_numbers.iter().map(|(_, v)| v))
            .flatten();
        for ticket in indexed {
            if !sold.contains(ticket) {
                return inconsistent(format!("contact index references unsold ticket {}", ticket));
            }
        }

        Ok(())
    }
}

/// First key that appears more than once in an entry list
fn duplicate_key<K: Ord, V>(entries: &[(K, V)]) -> Option<&K> {
    let mut seen = BTreeSet::new();
    entries
        .iter()
        .map(|(key, _)| key)
        .find(|key| !seen.insert(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;
    use crate::state_manager::RaffleState;

    fn sold_snapshot() -> RaffleSnapshot {
        let mut state = RaffleState::new(CampaignConfig::default());
        let ticket = TicketNumber::new(5);
        state.reserve(ticket, 0).unwrap();
        state
            .purchase(&[ticket], &Contact::new("Bia", "119", "bia@x.com"), 0)
            .unwrap();
        state.snapshot()
    }

    #[test]
    fn test_decode_accepts_encoded_snapshot() {
        let snapshot = sold_snapshot();
        let bytes = snapshot.encode().unwrap();
        let decoded = RaffleSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_entries_are_plain_arrays() {
        let json = serde_json::to_value(sold_snapshot()).unwrap();
        assert_eq!(json["soldNumbers"], serde_json::json!([5]));
        assert_eq!(json["phoneToNumbers"], serde_json::json!([["119", [5]]]));
        assert_eq!(json["config"]["pricePerNumber"], serde_json::json!("0"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            RaffleSnapshot::decode(b"{not json"),
            Err(SnapshotError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_version() {
        let result = RaffleSnapshot::decode(br#"{"soldNumbers": []}"#);
        assert!(matches!(
            result,
            Err(SnapshotError::UnsupportedVersion { found: 0, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_owner_mismatch() {
        let mut snapshot = sold_snapshot();
        snapshot.number_owners.clear();
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        assert!(matches!(
            RaffleSnapshot::decode(&bytes),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_decode_rejects_duplicate_index_keys() {
        let mut snapshot = sold_snapshot();
        snapshot.phone_to_numbers.push(("119".to_string(), Vec::new()));
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        assert!(matches!(
            RaffleSnapshot::decode(&bytes),
            Err(SnapshotError::Inconsistent(_))
        ));

        let mut snapshot = sold_snapshot();
        snapshot.email_to_numbers.push(("bia@x.com".to_string(), Vec::new()));
        assert!(snapshot.validate().is_err());

        let mut snapshot = sold_snapshot();
        let entry = snapshot.participant_to_numbers[0].clone();
        snapshot.participant_to_numbers.push((entry.0, Vec::new()));
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_decode_rejects_unnormalized_index_keys() {
        let mut snapshot = sold_snapshot();
        snapshot.phone_to_numbers[0].0 = "(11) 9".to_string();
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        assert!(matches!(
            RaffleSnapshot::decode(&bytes),
            Err(SnapshotError::Inconsistent(_))
        ));

        let mut snapshot = sold_snapshot();
        snapshot.email_to_numbers[0].0 = "Bia@X.com".to_string();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_decode_rejects_unsold_index_entry() {
        let mut snapshot = sold_snapshot();
        snapshot.email_to_numbers[0].1.push(TicketNumber::new(6));
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::Inconsistent(_))
        ));
    }
}
