//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tripwire_api::ApiConfig;
use tripwire_engine::{EngineConfig, LogNotifier, Notifier, SmsConfig, SmsNotifier, DEFAULT_SMS_URL};
use tripwire_exchange::{VenueEndpoints, VenueKind};
use tripwire_ws::ReconnectConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Control API.
    #[serde(default)]
    pub server: ApiConfig,

    /// Operator notifications.
    #[serde(default)]
    pub sms: SmsSettings,

    /// One pipeline per entry.
    #[serde(default)]
    pub exchanges: Vec<ExchangeSettings>,
}

/// SMS gateway settings. Credentials come from the named environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sms_url")]
    pub url: String,
    #[serde(default = "default_sms_login_env")]
    pub login_env: String,
    #[serde(default = "default_sms_password_env")]
    pub password_env: String,
    #[serde(default)]
    pub phones: Vec<String>,
}

fn default_sms_url() -> String {
    DEFAULT_SMS_URL.to_string()
}

fn default_sms_login_env() -> String {
    "TRIPWIRE_SMS_LOGIN".to_string()
}

fn default_sms_password_env() -> String {
    "TRIPWIRE_SMS_PASSWORD".to_string()
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_sms_url(),
            login_env: default_sms_login_env(),
            password_env: default_sms_password_env(),
            phones: Vec::new(),
        }
    }
}

impl SmsSettings {
    /// SMS notifier when enabled, log-only otherwise.
    pub fn notifier(&self) -> AppResult<Arc<dyn Notifier>> {
        if !self.enabled {
            return Ok(Arc::new(LogNotifier));
        }
        if self.phones.is_empty() {
            return Err(AppError::Config("sms.enabled requires at least one phone".to_string()));
        }
        let login = read_env(&self.login_env)?;
        let password = read_env(&self.password_env)?;
        Ok(Arc::new(SmsNotifier::new(SmsConfig {
            url: self.url.clone(),
            login,
            password,
            phones: self.phones.clone(),
        })))
    }
}

fn read_env(var: &str) -> AppResult<String> {
    std::env::var(var).map_err(|_| AppError::Config(format!("{var} is not set")))
}

/// Where trigger prices come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    #[default]
    Stream,
    Poll,
}

/// Stream reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSettings {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60000
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

impl From<WsSettings> for ReconnectConfig {
    fn from(cfg: WsSettings) -> Self {
        Self {
            max_attempts: cfg.max_reconnect_attempts,
            base_delay_ms: cfg.reconnect_base_delay_ms,
            max_delay_ms: cfg.reconnect_max_delay_ms,
        }
    }
}

/// One exchange pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    /// Pipeline name, also the `{exchange}` path segment of the control API.
    /// Defaults to the venue kind.
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_kind")]
    pub kind: VenueKind,

    /// REST base override.
    #[serde(default)]
    pub rest_url: Option<String>,

    /// Stream endpoint override.
    #[serde(default)]
    pub stream_url: Option<String>,

    /// Env var holding the API key (default `{NAME}_API_KEY`).
    #[serde(default)]
    pub key_env: Option<String>,

    /// Env var holding the API secret (default `{NAME}_API_SECRET`).
    #[serde(default)]
    pub secret_env: Option<String>,

    /// Parallel stream connections.
    #[serde(default = "default_connections")]
    pub connections: usize,

    #[serde(default)]
    pub price_source: PriceSource,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Track fills through the venue's order stream.
    #[serde(default = "default_order_updates")]
    pub order_updates: bool,

    /// Binance listen-key refresh period.
    #[serde(default = "default_listen_key_keepalive_secs")]
    pub listen_key_keepalive_secs: u64,

    /// Quotes accepted for new orders (empty = any).
    #[serde(default = "default_allowed_quotes")]
    pub allowed_quotes: Vec<String>,

    /// JSON snapshot file. Unset keeps everything in memory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub ws: WsSettings,

    #[serde(flatten)]
    pub engine: EngineConfig,
}

fn default_kind() -> VenueKind {
    VenueKind::Ascendex
}

fn default_connections() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_order_updates() -> bool {
    true
}

fn default_listen_key_keepalive_secs() -> u64 {
    30 * 60
}

fn default_allowed_quotes() -> Vec<String> {
    vec!["USDT".to_string()]
}

impl ExchangeSettings {
    pub fn name(&self) -> String {
        if self.name.is_empty() {
            self.kind.to_string()
        } else {
            self.name.clone()
        }
    }

    pub fn key_var(&self) -> String {
        self.key_env
            .clone()
            .unwrap_or_else(|| format!("{}_API_KEY", self.name().to_uppercase()))
    }

    pub fn secret_var(&self) -> String {
        self.secret_env
            .clone()
            .unwrap_or_else(|| format!("{}_API_SECRET", self.name().to_uppercase()))
    }

    pub fn endpoints(&self) -> VenueEndpoints {
        VenueEndpoints {
            rest_url: self.rest_url.clone(),
            stream_url: self.stream_url.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn listen_key_keepalive(&self) -> Duration {
        Duration::from_secs(self.listen_key_keepalive_secs)
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        let mut names = HashSet::new();
        for exchange in &self.exchanges {
            let name = exchange.name();
            if !names.insert(name.clone()) {
                return Err(AppError::Config(format!("duplicate exchange name {name}")));
            }
            if exchange.connections == 0 {
                return Err(AppError::Config(format!("{name}: connections must be at least 1")));
            }
            if exchange.poll_interval_ms == 0 {
                return Err(AppError::Config(format!("{name}: poll_interval_ms must be positive")));
            }
        }
        Ok(())
    }
}
