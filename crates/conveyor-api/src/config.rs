//! Configuration management for the conveyor service.
//!
//! Configuration is loaded in priority order: environment variables
//! (prefixed `CONVEYOR_`), then `config.toml`, then built-in defaults. The
//! service runs out of the box with no configuration at all.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use conveyor_delivery::{
    client::ClientConfig,
    engine::DeliveryConfig,
    retry::BackoffSchedule,
};
use conveyor_report::GeneratorConfig;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "CONVEYOR_";

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite connection URL.
    ///
    /// Environment variable: `CONVEYOR_DATABASE_URL`
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Server bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory where generated report files are written.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Simulated generator cost per transaction, in milliseconds.
    #[serde(default = "default_transaction_cost_ms")]
    pub report_transaction_cost_ms: u64,

    /// Upper bound on transactions per report.
    #[serde(default = "default_max_transactions")]
    pub report_max_transactions: u64,

    /// Webhook request timeout in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,

    /// Webhook attempt budget (initial attempt included).
    #[serde(default = "default_delivery_attempts")]
    pub delivery_max_attempts: i64,

    /// Delays between webhook attempts, in seconds.
    #[serde(default = "default_backoff_seconds")]
    pub delivery_backoff_seconds: Vec<u64>,

    /// Log filter, forwarded to the tracing subscriber.
    ///
    /// Environment variable: `CONVEYOR_RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `config.toml`, and the environment.
    ///
    /// # Errors
    ///
    /// Returns error if a source fails to parse or validation rejects the
    /// merged result.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the report generator's configuration.
    pub fn to_generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            reports_dir: self.reports_dir.clone(),
            transaction_cost: Duration::from_millis(self.report_transaction_cost_ms),
            max_transactions: self.report_max_transactions,
        }
    }

    /// Converts to the delivery engine's configuration.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            client: ClientConfig {
                timeout: Duration::from_secs(self.delivery_timeout_seconds),
                ..ClientConfig::default()
            },
            backoff: BackoffSchedule::new(
                self.delivery_max_attempts,
                self.delivery_backoff_seconds.iter().map(|s| Duration::from_secs(*s)).collect(),
            ),
        }
    }

    /// Parses the server socket address from host and port.
    ///
    /// # Errors
    ///
    /// Returns error if the combination is not a valid socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&format!("{}:{}", self.host, self.port))
            .context("invalid server address")
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_url.trim().is_empty() {
            anyhow::bail!("database_url must not be empty");
        }

        if self.delivery_max_attempts < 1 {
            anyhow::bail!("delivery_max_attempts must be at least 1");
        }

        let retries = usize::try_from(self.delivery_max_attempts - 1).unwrap_or(usize::MAX);
        if self.delivery_backoff_seconds.len() < retries {
            anyhow::bail!(
                "delivery_backoff_seconds must cover {} retries, got {}",
                retries,
                self.delivery_backoff_seconds.len()
            );
        }

        if self.report_max_transactions == 0 {
            anyhow::bail!("report_max_transactions must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            host: default_host(),
            port: default_port(),
            reports_dir: default_reports_dir(),
            report_transaction_cost_ms: default_transaction_cost_ms(),
            report_max_transactions: default_max_transactions(),
            delivery_timeout_seconds: default_delivery_timeout(),
            delivery_max_attempts: default_delivery_attempts(),
            delivery_backoff_seconds: default_backoff_seconds(),
            rust_log: default_log_filter(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://conveyor.db".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("data/reports")
}

fn default_transaction_cost_ms() -> u64 {
    10
}

fn default_max_transactions() -> u64 {
    100_000
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_delivery_attempts() -> i64 {
    3
}

fn default_backoff_seconds() -> Vec<u64> {
    vec![2, 4, 8]
}

fn default_log_filter() -> String {
    "info,conveyor=debug".to_string()
}
