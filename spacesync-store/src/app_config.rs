use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking_rules: BookingRules,
    #[serde(default)]
    pub timetable: TimetableConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    /// Enables per-IP rate limiting when set.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_duration")]
    pub default_duration_minutes: i64,
    #[serde(default = "default_max_duration")]
    pub max_duration_minutes: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_duration() -> i64 { spacesync_core::booking::DEFAULT_DURATION_MINUTES }
fn default_max_duration() -> i64 { 480 }
fn default_sweep_interval() -> u64 { 60 }

/// One week. Also keeps expiry arithmetic far from `chrono` overflow.
pub const MAX_BOOKING_MINUTES: i64 = 7 * 24 * 60;

impl BookingRules {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_BOOKING_MINUTES).contains(&self.max_duration_minutes) {
            return Err(format!(
                "booking_rules.max_duration_minutes must be between 1 and {}",
                MAX_BOOKING_MINUTES
            ));
        }
        if !(1..=self.max_duration_minutes).contains(&self.default_duration_minutes) {
            return Err(format!(
                "booking_rules.default_duration_minutes must be between 1 and max_duration_minutes ({})",
                self.max_duration_minutes
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err("booking_rules.sweep_interval_seconds must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            default_duration_minutes: default_duration(),
            max_duration_minutes: default_max_duration(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimetableConfig {
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

fn default_model() -> String { "gemini-2.5-flash".to_string() }
fn default_endpoint() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_max_upload() -> usize { 10 * 1024 * 1024 }

impl Default for TimetableConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SPACESYNC_AUTH__JWT_SECRET=...` sets `auth.jwt_secret`
            .add_source(config::Environment::with_prefix("SPACESYNC").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config
            .booking_rules
            .validate()
            .map_err(config::ConfigError::Message)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg = parse(
            r#"
            [server]
            port = 8081

            [storage]
            backend = "memory"

            [auth]
            jwt_secret = "dev"
            "#,
        );

        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.storage.max_connections, 5);
        assert_eq!(cfg.redis.url, None);
        assert_eq!(cfg.booking_rules.default_duration_minutes, 30);
        assert_eq!(cfg.booking_rules.sweep_interval_seconds, 60);
        assert_eq!(cfg.timetable.model, "gemini-2.5-flash");
        assert_eq!(cfg.timetable.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_booking_rules_override() {
        let cfg = parse(
            r#"
            [server]
            port = 9000
            cors_origins = ["http://localhost:5173"]

            [storage]
            backend = "postgres"
            database_url = "postgres://localhost/spacesync"

            [auth]
            jwt_secret = "dev"

            [booking_rules]
            max_duration_minutes = 120
            sweep_interval_seconds = 15
            "#,
        );

        assert_eq!(cfg.server.cors_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(cfg.booking_rules.default_duration_minutes, 30);
        assert_eq!(cfg.booking_rules.max_duration_minutes, 120);
        assert_eq!(cfg.booking_rules.sweep_interval_seconds, 15);
    }

    #[test]
    fn test_booking_rules_validation() {
        assert!(BookingRules::default().validate().is_ok());

        let inverted = BookingRules {
            default_duration_minutes: 90,
            max_duration_minutes: 60,
            sweep_interval_seconds: 60,
        };
        assert!(inverted.validate().unwrap_err().contains("default_duration_minutes"));

        let huge = BookingRules {
            default_duration_minutes: 30,
            max_duration_minutes: i64::MAX,
            sweep_interval_seconds: 60,
        };
        assert!(huge.validate().unwrap_err().contains("max_duration_minutes"));

        let zero_default = BookingRules {
            default_duration_minutes: 0,
            ..BookingRules::default()
        };
        assert!(zero_default.validate().is_err());

        let no_interval = BookingRules {
            sweep_interval_seconds: 0,
            ..BookingRules::default()
        };
        assert!(no_interval.validate().is_err());
    }
}
