//! Global configuration loader for fns.
//!
//! Reads `config.toml` (`~/.fns/config.toml` unless a path is given) and
//! deserializes it into [`FnsConfig`]. Falls back to defaults when the file
//! is missing or malformed.

use std::path::{Path, PathBuf};

use fns_types::config::FnsConfig;

/// Directory holding fns configuration: `~/.fns`.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fns")
}

/// `~/.fns/config.toml`.
pub fn default_config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Load configuration from `path`.
///
/// - Missing file: [`FnsConfig::default()`].
/// - Unreadable or unparseable file: logs a warning, returns the default.
pub async fn load_config(path: &Path) -> FnsConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return FnsConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return FnsConfig::default();
        }
    };

    match toml::from_str::<FnsConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            FnsConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).await;
        assert!(!config.dev);
        assert!(config.signing_key.is_none());
        assert_eq!(config.signature_tolerance_ms, 30_000);
        assert_eq!(config.server.port, 3000);
    }

    #[tokio::test]
    async fn test_valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
dev = true
signing_key = "whsec_abc"

[logs]
max_entries = 10

[server]
port = 8080
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await;
        assert!(config.dev);
        assert_eq!(config.signing_key.unwrap().expose_secret(), "whsec_abc");
        assert_eq!(config.logs.max_entries, 10);
        assert_eq!(config.logs.max_message_len, 2048);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!").await.unwrap();

        let config = load_config(&path).await;
        assert!(!config.dev);
        assert_eq!(config.logs.max_entries, 100);
    }

    #[test]
    fn test_default_path_lives_under_data_dir() {
        let path = default_config_path();
        assert!(path.ends_with(".fns/config.toml"));
    }
}
