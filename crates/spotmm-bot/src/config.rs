//! Application configuration.
//!
//! Loaded from a TOML file; credentials come from the environment only and
//! are never written to config.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use spotmm_exchange::Credentials;
use spotmm_strategy::StrategyConfig;

use crate::error::{AppError, AppResult};

const API_KEY_ENV: &str = "SPOTMM_API_KEY";
const API_SECRET_ENV: &str = "SPOTMM_API_SECRET";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// REST API base URL.
    pub rest_url: String,
    /// Strategy tunables.
    pub strategy: StrategyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.mexc.com/api/v3".to_string(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file, falling back to defaults when it does not
    /// exist.
    pub fn load(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            warn!(path, "Config file not found; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| AppError::Config(format!("failed to parse {path}: {err}")))
    }

    /// API credentials from the environment.
    pub fn credentials() -> AppResult<Credentials> {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        let api_secret = std::env::var(API_SECRET_ENV).unwrap_or_default();
        let credentials = Credentials::new(api_key, api_secret);
        if !credentials.is_complete() {
            return Err(AppError::Config(format!(
                "missing API credentials; set {API_KEY_ENV} and {API_SECRET_ENV}"
            )));
        }
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/spotmm.toml").unwrap();
        assert_eq!(config.rest_url, "https://api.mexc.com/api/v3");
        assert_eq!(config.strategy.symbol, "SPYXUSDT");
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
rest_url = "https://api.example.test/api/v3"

[strategy]
symbol = "ABCUSDT"
quote_budget = 5.0
"#
        )
        .unwrap();

        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.rest_url, "https://api.example.test/api/v3");
        assert_eq!(config.strategy.symbol, "ABCUSDT");
        // Unset strategy fields keep defaults.
        assert_eq!(config.strategy.refresh_interval_ms, 1_000);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        let result = AppConfig::load(path.to_str().unwrap());
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
