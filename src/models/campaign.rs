use crate::models::TOTAL_NUMBERS;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Static campaign policy. Admin-editable, never mutated by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignConfig {
    pub total_numbers: u32,
    pub price_per_number: Decimal,
    /// Maximum tickets in a single purchase
    pub max_purchase_limit: u32,
    /// Maximum tickets per normalized phone, and per normalized email
    pub max_entries_per_phone: u32,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            total_numbers: TOTAL_NUMBERS,
            price_per_number: Decimal::ZERO,
            max_purchase_limit: 1,
            max_entries_per_phone: 1,
        }
    }
}

impl CampaignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.total_numbers == 0 {
            return Err("total_numbers must be greater than 0".to_string());
        }
        if self.price_per_number < Decimal::ZERO {
            return Err("price_per_number must not be negative".to_string());
        }
        if self.max_purchase_limit == 0 {
            return Err("max_purchase_limit must be greater than 0".to_string());
        }
        if self.max_entries_per_phone == 0 {
            return Err("max_entries_per_phone must be greater than 0".to_string());
        }
        Ok(())
    }
}

pub const DEFAULT_PRIZE_NAME: &str = "RIFA GRÁTIS! R$500 NO PIX ou CAPACETE";

pub const DEFAULT_DESCRIPTION: &str = "🔥 RIFA 100% GRÁTIS! 🔥
Para participar e validar seu bilhete, você precisa:
✅ Siga todos os nossos patrocinadores.
✅ Compartilhe esta rifa nos seus Stories e marque nossa página.
✅ Curta a foto oficial no Instagram!";

/// Presentation metadata edited by the admin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetadata {
    pub prize_name: String,
    /// Data URL or remote URL, empty when unset
    #[serde(default)]
    pub prize_image: String,
    pub description: String,
}

impl Default for CampaignMetadata {
    fn default() -> Self {
        Self {
            prize_name: DEFAULT_PRIZE_NAME.to_string(),
            prize_image: String::new(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let config = CampaignConfig::default();
        assert_eq!(config.total_numbers, 1_000_000);
        assert_eq!(config.max_entries_per_phone, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let config = CampaignConfig {
            max_purchase_limit: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
