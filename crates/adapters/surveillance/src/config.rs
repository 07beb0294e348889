//! Transport configuration.

use serde::Deserialize;

/// Configuration for the recorder transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Accept self-signed certificates. Recorders on a LAN rarely carry
    /// a trusted chain, so this defaults to on.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            accept_invalid_certs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r"
            timeout_secs = 10
            accept_invalid_certs = false
        ";
        let config: TransportConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let config: TransportConfig = toml::from_str("timeout_secs = 5").unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert!(config.accept_invalid_certs);
    }
}
