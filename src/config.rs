use crate::{
    client::DEFAULT_API_URL,
    error::{MaldoError, Result},
    x402::DeliveryPoller,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub payment: PaymentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Principal whose criteria govern hires made with this config.
    pub principal: Option<String>,
    pub client_address: Option<String>,
    /// Upper bound for x402 payments, USDC atomic units.
    pub max_price_usdc: Option<u64>,
    pub poll_interval_seconds: u64,
    pub poll_max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Layout of log lines written by the binaries.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_seconds: Some(30),
            user_agent: None,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            principal: None,
            client_address: None,
            max_price_usdc: None,
            poll_interval_seconds: 2,
            poll_max_attempts: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}

impl ClientConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| MaldoError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ClientConfig = toml::from_str(&config_str)
            .map_err(|e| MaldoError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MALDO_API") {
            self.api.base_url = url;
        }

        if let Some(principal) = lookup("PRINCIPAL") {
            self.payment.principal = Some(principal);
        }

        if let Some(max_price) = lookup("MALDO_MAX_PRICE") {
            let max_price = max_price
                .trim()
                .parse()
                .map_err(|_| MaldoError::Config(format!("MALDO_MAX_PRICE must be an integer, got '{}'", max_price)))?;
            self.payment.max_price_usdc = Some(max_price);
        }

        if let Some(log_level) = lookup("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            return Err(MaldoError::Config("API base URL cannot be empty".to_string()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(MaldoError::Config(format!(
                "API base URL must start with http:// or https://, got '{}'",
                url
            )));
        }

        if self.api.timeout_seconds == Some(0) {
            return Err(MaldoError::Config("Request timeout cannot be 0".to_string()));
        }

        if self.payment.poll_max_attempts == 0 {
            return Err(MaldoError::Config("poll_max_attempts must be at least 1".to_string()));
        }

        Ok(())
    }

    pub fn delivery_poller(&self) -> DeliveryPoller {
        DeliveryPoller::new(
            Duration::from_secs(self.payment.poll_interval_seconds),
            self.payment.poll_max_attempts,
        )
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let default_config = ClientConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| MaldoError::Config(format!("Failed to serialize default config: {}", e)))?;

    std::fs::write(path, toml_str)
        .map_err(|e| MaldoError::Config(format!("Failed to write default config file: {}", e)))?;

    Ok(())
}
