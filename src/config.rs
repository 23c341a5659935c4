use crate::models::CampaignConfig;
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `RAFFLE_RESERVATION_TTL_SECS`: one day
pub const MAX_RESERVATION_TTL_SECS: u64 = 24 * 60 * 60;

/// Reservation and sweep timing
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    pub ttl_secs: u64,
    pub sweep_interval_ms: u64,
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

/// Cross-instance sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Port the WebSocket relay listens on, if any
    pub relay_port: Option<u16>,
    /// Relays to connect to as a client
    pub relay_peers: Vec<String>,
    pub broadcast_capacity: usize,
}

/// Admin gate configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub passphrase: String,
}

/// Prize content generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub campaign: CampaignConfig,
    pub reservation: ReservationConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub admin: AdminConfig,
    pub generator: GeneratorConfig,
    pub log_level: String,
    pub log_json: bool,
    pub environment: String,
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("Invalid {}: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

impl ReservationConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let ttl_secs = parse_var("RAFFLE_RESERVATION_TTL_SECS")?.unwrap_or(defaults.ttl_secs);
        let sweep_interval_ms =
            parse_var("RAFFLE_SWEEP_INTERVAL_MS")?.unwrap_or(defaults.sweep_interval_ms);

        let config = Self {
            ttl_secs,
            sweep_interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 || self.ttl_secs > MAX_RESERVATION_TTL_SECS {
            return Err(format!(
                "RAFFLE_RESERVATION_TTL_SECS must be between 1 and {}",
                MAX_RESERVATION_TTL_SECS
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err("RAFFLE_SWEEP_INTERVAL_MS must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_ms: 2000,
        }
    }
}

fn campaign_from_env() -> Result<CampaignConfig, String> {
    let defaults = CampaignConfig::default();
    let config = CampaignConfig {
        total_numbers: parse_var("RAFFLE_TOTAL_NUMBERS")?.unwrap_or(defaults.total_numbers),
        price_per_number: parse_var::<Decimal>("RAFFLE_PRICE_PER_NUMBER")?
            .unwrap_or(defaults.price_per_number),
        max_purchase_limit: parse_var("RAFFLE_MAX_PURCHASE_LIMIT")?
            .unwrap_or(defaults.max_purchase_limit),
        max_entries_per_phone: parse_var("RAFFLE_MAX_ENTRIES_PER_PHONE")?
            .unwrap_or(defaults.max_entries_per_phone),
    };
    config.validate()?;
    Ok(config)
}

/// Split a comma-separated list of relay URLs, rejecting non-WebSocket entries
fn parse_relay_peers(raw: &str) -> Result<Vec<String>, String> {
    let peers: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if let Some(peer) = peers
        .iter()
        .find(|p| !p.starts_with("ws://") && !p.starts_with("wss://"))
    {
        return Err(format!("Invalid RELAY_PEERS entry: {}", peer));
    }
    Ok(peers)
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, String> {
        let relay_port = parse_var("RELAY_PORT")?;
        let relay_peers = match env::var("RELAY_PEERS") {
            Ok(raw) => parse_relay_peers(&raw)?,
            Err(_) => Vec::new(),
        };
        let broadcast_capacity = parse_var("BROADCAST_CAPACITY")?.unwrap_or(1000);

        if broadcast_capacity == 0 {
            return Err("BROADCAST_CAPACITY must be greater than 0".to_string());
        }

        Ok(Self {
            relay_port,
            relay_peers,
            broadcast_capacity,
        })
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_port: None,
            relay_peers: Vec::new(),
            broadcast_capacity: 1000,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            passphrase: "admin".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let campaign = campaign_from_env()?;
        let reservation = ReservationConfig::from_env()?;
        let sync = SyncConfig::from_env()?;

        let store = StoreConfig {
            data_dir: env::var("RAFFLE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        };

        let admin = AdminConfig {
            passphrase: env::var("ADMIN_PASSPHRASE")
                .unwrap_or_else(|_| AdminConfig::default().passphrase),
        };
        if admin.passphrase.is_empty() {
            return Err("ADMIN_PASSPHRASE must not be empty".to_string());
        }

        let generator = GeneratorConfig {
            url: env::var("GENERATOR_URL").ok().filter(|s| !s.trim().is_empty()),
            timeout_secs: parse_var("GENERATOR_TIMEOUT_SECS")?.unwrap_or(10),
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = parse_var("LOG_JSON")?.unwrap_or(false);
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            campaign,
            reservation,
            store,
            sync,
            admin,
            generator,
            log_level: log_level.to_lowercase(),
            log_json,
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            campaign: CampaignConfig::default(),
            reservation: ReservationConfig::default(),
            store: StoreConfig {
                data_dir: PathBuf::from("./data"),
            },
            sync: SyncConfig::default(),
            admin: AdminConfig::default(),
            generator: GeneratorConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_config_default() {
        let config = ReservationConfig::default();
        assert_eq!(config.ttl_ms(), 300_000);
        assert_eq!(config.sweep_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_reservation_ttl_is_bounded() {
        let huge = ReservationConfig {
            ttl_secs: u64::MAX,
            sweep_interval_ms: 2000,
        };
        assert!(huge.validate().is_err());
        assert_eq!(huge.ttl_ms(), i64::MAX);

        let day = ReservationConfig {
            ttl_secs: MAX_RESERVATION_TTL_SECS,
            sweep_interval_ms: 2000,
        };
        assert!(day.validate().is_ok());
        assert!(ReservationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_relay_peers() {
        let peers = parse_relay_peers(" ws://a:9000, ,wss://b/relay ").unwrap();
        assert_eq!(peers, vec!["ws://a:9000".to_string(), "wss://b/relay".to_string()]);
        assert!(parse_relay_peers("").unwrap().is_empty());
        assert!(parse_relay_peers("ws://a, http://b").is_err());
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.campaign.total_numbers, 1_000_000);
        assert_eq!(config.sync.broadcast_capacity, 1000);
        assert!(config.is_development());
        assert!(!config.is_production());
    }
}
