//! Configuration management for the keepalive service
//!
//! Loads configuration from a TOML file with environment variable substitution.
//! Every section is optional; missing values fall back to the defaults used in
//! production against Metis Andromeda.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub keepalive: KeepaliveConfig,
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub gas: GasConfig,
    pub monitor: MonitorConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Interval between self-transfers; 0 issues on every tick
    pub interval_secs: u64,
    /// Budget for all chain reads of a single tick
    pub tick_timeout_secs: u64,
    /// Informational only
    pub start_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Name of the environment variable holding the raw hex private key
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub bump_wei: u64,
    pub base_gas_limit: u64,
    pub gas_limit_jitter: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub resend_interval_secs: u64,
    pub timeout_secs: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub refresh_interval_secs: u64,
    pub max_block_age_secs: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            tick_timeout_secs: 10,
            start_height: None,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://andromeda.metis.io".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "KEEPALIVE_PRIVATE_KEY".to_string(),
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            bump_wei: 1_000_000_000,
            base_gas_limit: 200_000,
            gas_limit_jitter: 1_000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            resend_interval_secs: 60,
            timeout_secs: 120,
            call_timeout_secs: 3,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
            refresh_interval_secs: 5,
            max_block_age_secs: 300,
            call_timeout_secs: 3,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl KeepaliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }
}

impl ChainConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl WalletConfig {
    /// Read the private key from the configured environment variable
    pub fn private_key(&self) -> Result<String> {
        env::var(&self.private_key_env)
            .with_context(|| format!("Private key variable {} is not set", self.private_key_env))
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn resend_interval(&self) -> Duration {
        Duration::from_secs(self.resend_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl ApiConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn max_block_age(&self) -> Duration {
        Duration::from_secs(self.max_block_age_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Settings {
    /// Load settings from the configuration file named by `KEEPALIVE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("KEEPALIVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        if !config_path.exists() {
            tracing::warn!("Config file {:?} not found, using defaults", config_path);
            let settings = Settings::default();
            settings.validate()?;
            return Ok(settings);
        }

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.trim().is_empty() {
            anyhow::bail!("chain.rpc_url must not be empty");
        }
        if self.wallet.private_key_env.is_empty() {
            anyhow::bail!("wallet.private_key_env must not be empty");
        }
        if self.gas.base_gas_limit == 0 {
            anyhow::bail!("gas.base_gas_limit must be positive");
        }
        if self.monitor.poll_interval_secs == 0
            || self.monitor.resend_interval_secs == 0
            || self.monitor.timeout_secs == 0
            || self.monitor.call_timeout_secs == 0
        {
            anyhow::bail!("monitor intervals and timeouts must be positive");
        }
        if self.keepalive.tick_timeout_secs == 0 || self.chain.connect_timeout_secs == 0 {
            anyhow::bail!("tick and connect timeouts must be positive");
        }
        if self.api.enabled && (self.api.refresh_interval_secs == 0 || self.api.call_timeout_secs == 0)
        {
            anyhow::bail!("api refresh interval and call timeout must be positive");
        }
        if self.keepalive.interval_secs == 0 {
            tracing::warn!("keepalive.interval_secs is 0, a tx will be sent on every tick");
        }

        Ok(())
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("KEEPALIVE_TEST_VAR", "test_value");
        let input = "rpc_url = \"https://rpc.example.com/${KEEPALIVE_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "rpc_url = \"https://rpc.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_match_andromeda_setup() {
        let settings = Settings::default();
        assert_eq!(settings.keepalive.interval(), Duration::from_secs(30));
        assert_eq!(settings.chain.rpc_url, "https://andromeda.metis.io");
        assert_eq!(settings.gas.bump_wei, 1_000_000_000);
        assert_eq!(settings.monitor.timeout(), Duration::from_secs(120));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        env::set_var("KEEPALIVE_TEST_RPC", "http://127.0.0.1:8545");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[keepalive]
interval_secs = 60
start_height = 1200

[chain]
rpc_url = "${{KEEPALIVE_TEST_RPC}}"

[api]
enabled = false
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.keepalive.interval_secs, 60);
        assert_eq!(settings.keepalive.start_height, Some(1200));
        assert_eq!(settings.keepalive.tick_timeout_secs, 10);
        assert_eq!(settings.chain.rpc_url, "http://127.0.0.1:8545");
        assert!(!settings.api.enabled);
        assert_eq!(settings.monitor.poll_interval_secs, 3);
    }

    #[test]
    fn test_rejects_zero_monitor_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\ntimeout_secs = 0").unwrap();
        assert!(Settings::load_from(file.path()).is_err());
    }
}
