//! Global configuration types for fns.
//!
//! `FnsConfig` represents the top-level `config.toml` that controls dev mode,
//! event signing, user log capture, and the HTTP listener.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.fns/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct FnsConfig {
    /// Dev mode skips signature verification and mirrors user logs to tracing.
    #[serde(default)]
    pub dev: bool,

    /// Shared secret used to verify inbound event signatures.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub signing_key: Option<SecretString>,

    /// Maximum accepted age of a signature timestamp, in milliseconds.
    #[serde(default = "default_signature_tolerance_ms")]
    pub signature_tolerance_ms: u64,

    #[serde(default)]
    pub logs: LogLimits,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_signature_tolerance_ms() -> u64 {
    30_000
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Default for FnsConfig {
    fn default() -> Self {
        Self {
            dev: false,
            signing_key: None,
            signature_tolerance_ms: default_signature_tolerance_ms(),
            logs: LogLimits::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Bounds on the per-invocation user log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLimits {
    /// Oldest entries are evicted beyond this count.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Messages longer than this are truncated with a `...` suffix.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_max_entries() -> usize {
    100
}

fn default_max_message_len() -> usize {
    2048
}

impl Default for LogLimits {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_message_len: default_max_message_len(),
        }
    }
}

/// HTTP listener settings for `fns serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_fns_config_default_values() {
        let config = FnsConfig::default();
        assert!(!config.dev);
        assert!(config.signing_key.is_none());
        assert_eq!(config.signature_tolerance_ms, 30_000);
        assert_eq!(config.logs.max_entries, 100);
        assert_eq!(config.logs.max_message_len, 2048);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_fns_config_deserialize_with_defaults() {
        let config: FnsConfig = toml::from_str("").unwrap();
        assert!(!config.dev);
        assert_eq!(config.signature_tolerance_ms, 30_000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_fns_config_deserialize_with_values() {
        let toml_str = r#"
dev = true
signing_key = "whsec_test"
signature_tolerance_ms = 5000

[logs]
max_entries = 10

[server]
host = "0.0.0.0"
port = 8080
"#;
        let config: FnsConfig = toml::from_str(toml_str).unwrap();
        assert!(config.dev);
        assert_eq!(
            config.signing_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("whsec_test".to_string())
        );
        assert_eq!(config.signature_tolerance_ms, 5000);
        assert_eq!(config.logs.max_entries, 10);
        assert_eq!(config.logs.max_message_len, 2048);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_empty_signing_key_is_none() {
        let config: FnsConfig = toml::from_str(r#"signing_key = """#).unwrap();
        assert!(config.signing_key.is_none());
    }
}
