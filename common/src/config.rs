// Process configuration with layered sources (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure for the scheduler daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the WhatsApp bridge service
    pub base_url: String,
    /// Connect and read timeout applied to every gateway call
    #[serde(default = "default_gateway_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_gateway_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone the daily trigger is evaluated in
    #[serde(default = "default_timezone_name")]
    pub timezone: String,
    /// Pause between consecutive sends within a batch
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

fn default_timezone_name() -> String {
    "America/La_Paz".to_string()
}

fn default_send_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides, not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.gateway.base_url.is_empty() {
            return Err("Gateway base_url cannot be empty".to_string());
        }
        if self.gateway.timeout_seconds == 0 {
            return Err("Gateway timeout_seconds must be greater than 0".to_string());
        }
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!("Unknown timezone: {}", self.scheduler.timezone));
        }
        Ok(())
    }
}
