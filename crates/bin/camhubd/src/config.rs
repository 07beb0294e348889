//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `camhub.toml` in the working directory. Every field except
//! the credential encryption key has a sensible default so the file can
//! stay small. Environment variables take precedence over file values.

use serde::Deserialize;

use camhub_adapter_surveillance::TransportConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Public callback endpoint settings.
    pub callback: CallbackConfig,
    /// Recorder transport settings.
    pub api: TransportConfig,
    /// Credential encryption settings.
    pub crypto: CryptoConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Public callback endpoint configuration.
///
/// The recorder's rules target URLs under this base, so it must be an
/// address the recorder can reach — not the bind address.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Public base URL, e.g. `https://hub.example.net`.
    pub base_url: String,
}

/// Credential encryption configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Secret the credential cipher derives its key from. Changing it
    /// invalidates every stored credential.
    pub key: String,
}

impl Config {
    /// Load configuration from `camhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("camhub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAMHUB_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("CAMHUB_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("CAMHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("CAMHUB_CALLBACK_BASE") {
            self.callback.base_url = val;
        }
        if let Ok(val) = std::env::var("CAMHUB_CRYPTO_KEY") {
            self.crypto.key = val;
        }
        if let Ok(val) = std::env::var("CAMHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.callback.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "callback.base_url must be set; the recorder's rules target it".to_string(),
            ));
        }
        if self.crypto.key.is_empty() {
            return Err(ConfigError::Validation(
                "crypto.key must be set; stored credentials are encrypted with it".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:camhub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "camhubd=info,camhub=info,tower_http=debug".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.callback.base_url = "https://hub.example.net".to_string();
        config.crypto.key = "operator-secret".to_string();
        config
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:camhub.db?mode=rwc");
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [callback]
            base_url = 'https://hub.example.net'

            [api]
            timeout_secs = 10
            accept_invalid_certs = false

            [crypto]
            key = 'operator-secret'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.callback.base_url, "https://hub.example.net");
        assert_eq!(config.api.timeout_secs, 10);
        assert!(!config.api.accept_invalid_certs);
        assert_eq!(config.crypto.key, "operator-secret");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_missing_callback_base() {
        let mut config = valid_config();
        config.callback.base_url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_missing_crypto_key() {
        let mut config = valid_config();
        config.crypto.key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_accept_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn should_format_bind_addr() {
        let config = valid_config();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
