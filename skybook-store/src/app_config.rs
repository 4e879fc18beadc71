use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub saga: SagaConfig,
    #[serde(default)]
    pub dictionaries: DictionariesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_poll_timeout_ms() -> u64 { 1000 }
fn default_retry_backoff_ms() -> u64 { 1000 }

impl KafkaConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Pending-ticket reconciliation. An interval of 0 disables the sweep.
#[derive(Debug, Deserialize, Clone)]
pub struct SagaConfig {
    pub pending_timeout_secs: u64,
    pub reconcile_interval_secs: u64,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            pending_timeout_secs: 300,
            reconcile_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DictionariesConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for DictionariesConfig {
    fn default() -> Self {
        Self {
            url: "http://dictionaries:8004".to_string(),
            timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load settings for `service` ("booking" or "order").
    pub fn load(service: &str) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Settings shared by every service
            .add_source(config::File::with_name("config/default"))
            // Per-service settings (port, database)
            .add_source(config::File::with_name(&format!("config/{}", service)))
            // Optional environment file, defaults to 'development'
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `SKYBOOK__KAFKA__BROKERS=kafka:9092`
            .add_source(config::Environment::with_prefix("SKYBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
