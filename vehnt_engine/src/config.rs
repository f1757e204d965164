//! Engine configuration with validation
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables (a `.env` file is honoured).

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use url::Url;

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::engine::AggregationMode;

pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_STATS_API_URL: &str = "https://hnt-explorer.herokuapp.com/v1";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Solana JSON-RPC endpoint
    pub rpc_endpoint: String,

    /// Provider API key, sent as the `api-key` query parameter
    pub api_key: Option<String>,

    /// DAS endpoint for NFT ownership lookups. Falls back to the RPC endpoint.
    pub das_endpoint: Option<String>,

    /// Upstream delegation statistics API
    pub stats_api_url: String,

    /// Keys per `getMultipleAccounts` request
    pub batch_size: usize,

    pub commitment: String,

    pub aggregation: AggregationMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            api_key: None,
            das_endpoint: None,
            stats_api_url: DEFAULT_STATS_API_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            commitment: "confirmed".to_string(),
            aggregation: AggregationMode::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let config = Self::default().apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// TOML file overridden by environment variables
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let config = Self::parse_toml(path)?.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn parse_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::FileError(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("VEHNT_RPC_ENDPOINT") {
            self.rpc_endpoint = endpoint;
        }
        if let Some(key) = lookup("HELIUS_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("VEHNT_DAS_ENDPOINT") {
            self.das_endpoint = Some(endpoint);
        }
        if let Some(url) = lookup("VEHNT_STATS_API_URL") {
            self.stats_api_url = url;
        }
        if let Some(size) = lookup("VEHNT_BATCH_SIZE") {
            self.batch_size = size
                .parse()
                .map_err(|_| ConfigError::EnvError(format!("VEHNT_BATCH_SIZE={}", size)))?;
        }
        if let Some(commitment) = lookup("VEHNT_COMMITMENT") {
            self.commitment = commitment;
        }
        if let Some(mode) = lookup("VEHNT_AGGREGATION") {
            self.aggregation = mode
                .parse()
                .map_err(|_| ConfigError::EnvError(format!("VEHNT_AGGREGATION={}", mode)))?;
        }
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue("batch_size must be greater than 0".to_string()));
        }
        if self.rpc_endpoint.is_empty() {
            return Err(ConfigError::MissingRequired("rpc_endpoint".to_string()));
        }

        self.rpc_url()?;
        self.das_url()?;
        self.commitment_config()?;
        Url::parse(&self.stats_api_url)
            .map_err(|e| ConfigError::InvalidValue(format!("stats_api_url: {}", e)))?;

        Ok(())
    }

    /// RPC endpoint with the API key attached
    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        self.with_api_key("rpc_endpoint", &self.rpc_endpoint)
    }

    pub fn das_url(&self) -> Result<Url, ConfigError> {
        match &self.das_endpoint {
            Some(endpoint) => self.with_api_key("das_endpoint", endpoint),
            None => self.rpc_url(),
        }
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig, ConfigError> {
        CommitmentConfig::from_str(&self.commitment)
            .map_err(|_| ConfigError::InvalidValue(format!("commitment: {}", self.commitment)))
    }

    fn with_api_key(&self, field: &str, endpoint: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", field, e)))?;
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("api-key", key);
        }
        Ok(url)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Configuration file error: {0}")]
    FileError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 99);
        assert_eq!(config.aggregation, AggregationMode::GenesisFlat);
    }

    #[test]
    fn test_api_key_is_appended_to_endpoints() {
        let config = EngineConfig::default()
            .apply_overrides(lookup(&[
                ("VEHNT_RPC_ENDPOINT", "https://rpc.helius.xyz/"),
                ("HELIUS_API_KEY", "secret"),
            ]))
            .unwrap();

        assert_eq!(config.rpc_url().unwrap().as_str(), "https://rpc.helius.xyz/?api-key=secret");
        assert_eq!(config.das_url().unwrap(), config.rpc_url().unwrap());
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let err = EngineConfig::default()
            .apply_overrides(lookup(&[("VEHNT_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));

        let config = EngineConfig::default()
            .apply_overrides(lookup(&[("VEHNT_BATCH_SIZE", "0")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = EngineConfig::default()
            .apply_overrides(lookup(&[("VEHNT_COMMITMENT", "eventually")]))
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_aggregation_override() {
        let config = EngineConfig::default()
            .apply_overrides(lookup(&[("VEHNT_AGGREGATION", "lockup_weighted")]))
            .unwrap();
        assert_eq!(config.aggregation, AggregationMode::LockupWeighted);
    }

    #[test]
    fn test_parse_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
rpc_endpoint = "http://localhost:8899"
batch_size = 50
aggregation = "lockup_weighted"
"#
        )
        .unwrap();

        let config = EngineConfig::parse_toml(file.path()).unwrap();
        assert_eq!(config.rpc_endpoint, "http://localhost:8899");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.aggregation, AggregationMode::LockupWeighted);
        assert_eq!(config.stats_api_url, DEFAULT_STATS_API_URL);
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let err = EngineConfig::parse_toml(Path::new("/nonexistent/vehnt.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileError(_)));
    }
}
