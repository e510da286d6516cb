//! Configuration management for the bridge.

use crate::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::env;

/// Main configuration for the bridge
///
/// # Structure
/// - **Mandatory fields** (from environment): broker credentials and host, sink URL
/// - **Optional fields** (from config file or defaults): binding, timeouts, `retry`, `processing`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge name, used as a metrics label and consumer tag prefix
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,

    /// Broker connection settings
    pub broker: BrokerSettings,

    /// Queue binding settings (optional, defaults match the sensor deployment)
    #[serde(default)]
    pub binding: BindingSettings,

    /// HTTP sink settings
    pub sink: SinkSettings,

    /// Retry settings (optional, from config file or defaults)
    #[serde(default)]
    pub retry: RetrySettings,

    /// Processing and runtime settings (optional, from config file or defaults)
    #[serde(default)]
    pub processing: ProcessingSettings,
}

impl BridgeConfig {
    /// Load mandatory configuration from environment variables
    ///
    /// Only reads mandatory fields:
    /// - `userRabbit`: broker user (required)
    /// - `passwordRabbit`: broker password (required)
    /// - `INSTANCE_IP`: broker host, optionally `host:port` (required)
    /// - `SINK_URL`: HTTP endpoint receiving the readings (required)
    /// - `RABBIT_VHOST`: virtual host (optional, defaults to `/`)
    ///
    /// Everything else uses defaults.
    pub fn from_env() -> BridgeResult<Self> {
        let user = required_env("userRabbit")?;
        let password = required_env("passwordRabbit")?;
        let host = required_env("INSTANCE_IP")?;
        let url = required_env("SINK_URL")?;

        let mut broker = BrokerSettings::new(host, user, password);
        if let Ok(vhost) = env::var("RABBIT_VHOST") {
            broker.vhost = vhost;
        }

        Ok(Self {
            bridge_name: default_bridge_name(),
            broker,
            binding: BindingSettings::default(),
            sink: SinkSettings::new(url),
            retry: RetrySettings::default(),
            processing: ProcessingSettings::default(),
        })
    }

    /// Load configuration the way the binary does
    ///
    /// If `BRIDGE_CONFIG_FILE` is set, the TOML file it names is read and the
    /// environment overrides its mandatory fields. Otherwise everything comes
    /// from [`BridgeConfig::from_env`].
    pub fn load() -> BridgeResult<Self> {
        match env::var("BRIDGE_CONFIG_FILE") {
            Ok(path) => {
                let mut config = Self::from_file(&path)?;
                config.apply_env_overrides();
                Ok(config)
            }
            Err(_) => Self::from_env(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            BridgeError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides to mandatory fields only
    ///
    /// Credentials, host and sink URL may be kept out of config files and
    /// supplied by the environment instead.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("userRabbit") {
            self.broker.user = val;
        }
        if let Ok(val) = env::var("passwordRabbit") {
            self.broker.password = val;
        }
        if let Ok(val) = env::var("INSTANCE_IP") {
            self.broker.host = val;
        }
        if let Ok(val) = env::var("RABBIT_VHOST") {
            self.broker.vhost = val;
        }
        if let Ok(val) = env::var("SINK_URL") {
            self.sink.url = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> BridgeResult<()> {
        if self.bridge_name.is_empty() {
            return Err(BridgeError::config("bridge_name cannot be empty"));
        }

        if self.broker.host.is_empty() {
            return Err(BridgeError::config("broker host cannot be empty"));
        }

        if self.broker.user.is_empty() || self.broker.password.is_empty() {
            return Err(BridgeError::config("broker credentials cannot be empty"));
        }

        if self.binding.queue.is_empty() {
            return Err(BridgeError::config("binding queue cannot be empty"));
        }

        if !(self.sink.url.starts_with("http://") || self.sink.url.starts_with("https://")) {
            return Err(BridgeError::config(format!(
                "sink url must be http(s), got '{}'",
                self.sink.url
            )));
        }

        if self.sink.request_timeout_ms == 0 {
            return Err(BridgeError::config("sink request_timeout_ms must be > 0"));
        }

        if self.retry.max_retries > 100 {
            return Err(BridgeError::config("max_retries too high (max 100)"));
        }

        if self.processing.workers == 0 || self.processing.workers > 256 {
            return Err(BridgeError::config("workers must be between 1 and 256"));
        }

        Ok(())
    }
}

fn required_env(name: &str) -> BridgeResult<String> {
    match env::var(name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BridgeError::config(format!("{} is required", name))),
    }
}

fn default_bridge_name() -> String {
    "sensor-bridge".to_string()
}

/// Broker connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Broker host, optionally with `:port`
    pub host: String,

    /// Broker user
    #[serde(default)]
    pub user: String,

    /// Broker password
    #[serde(default)]
    pub password: String,

    /// Virtual host
    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            vhost: default_vhost(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

fn default_vhost() -> String {
    "/".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Acknowledgment policy for broker deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Broker auto-ack: acknowledged on receipt, lost if the bridge crashes (at-most-once)
    #[default]
    OnReceipt,
    /// Manual ack after `Delivered`; failures are rejected without requeue
    AfterDelivery,
}

/// Queue binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSettings {
    /// Queue to declare and consume from
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Exchange the queue is bound to
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Routing key of the binding
    #[serde(default = "default_routing_key")]
    pub routing_key: String,

    /// Declare the queue as durable
    #[serde(default)]
    pub durable: bool,

    /// Dead-letter exchange set on the queue (receives rejected messages)
    #[serde(default)]
    pub dead_letter_exchange: Option<String>,

    /// Delivery acknowledgment policy
    #[serde(default)]
    pub ack_mode: AckMode,

    /// Channel prefetch count (0 = unlimited)
    #[serde(default)]
    pub prefetch: u16,
}

fn default_queue() -> String {
    "orange_queue".to_string()
}
fn default_exchange() -> String {
    "amq.topic".to_string()
}
fn default_routing_key() -> String {
    "test".to_string()
}

impl Default for BindingSettings {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            exchange: default_exchange(),
            routing_key: default_routing_key(),
            durable: false,
            dead_letter_exchange: None,
            ack_mode: AckMode::default(),
            prefetch: 0,
        }
    }
}

/// HTTP sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Endpoint receiving one POST per reading
    pub url: String,

    /// Upper bound for a whole request, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound for establishing the TCP connection, in milliseconds
    #[serde(default = "default_sink_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Characters of a rejected response body kept for diagnostics
    #[serde(default = "default_max_body_excerpt")]
    pub max_body_excerpt: usize,
}

impl SinkSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_sink_connect_timeout_ms(),
            max_body_excerpt: default_max_body_excerpt(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_sink_connect_timeout_ms() -> u64 {
    3_000
}
fn default_max_body_excerpt() -> usize {
    512
}

/// Retry configuration settings
///
/// Applies to transient sink outcomes only. The default of zero retries
/// forwards each reading exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum number of retries for a transient delivery failure
    #[serde(default)]
    pub max_retries: u32,

    /// Base backoff duration in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Processing and runtime configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Messages processed concurrently (1 keeps broker order)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Characters of a raw payload included in failure logs
    #[serde(default = "default_payload_excerpt")]
    pub payload_excerpt: usize,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_workers() -> usize {
    1
}
fn default_payload_excerpt() -> usize {
    256
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            payload_excerpt: 256,
            log_level: "info".to_string(),
        }
    }
}
