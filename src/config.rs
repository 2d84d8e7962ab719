//! Configuration management for session-vault.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::handler::HandlerOptions;
use crate::session::SessionConfig;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session configuration.
    pub session: SessionSection,
    /// Storage backend options.
    pub handler: HandlerOptions,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Session name.
    pub name: String,
    /// Expiry in minutes.
    pub expire: u64,
    /// Storage backend name.
    pub backend: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            name: "VAULTSID".to_string(),
            expire: 15,
            backend: "file".to_string(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(backend) = std::env::var("SESSION_VAULT_BACKEND") {
            self.session.backend = backend;
        }

        if let Ok(path) = std::env::var("SESSION_VAULT_PATH") {
            if !path.is_empty() {
                self.handler.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(prefix) = std::env::var("SESSION_VAULT_PREFIX") {
            self.handler.prefix = prefix;
        }

        if let Ok(ttl) = std::env::var("SESSION_VAULT_TTL") {
            self.handler.ttl = ttl
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SESSION_VAULT_TTL", ttl))?;
        }

        if let Ok(level) = std::env::var("SESSION_VAULT_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref backend) = args.backend {
            self.session.backend = backend.clone();
        }

        if let Some(ref path) = args.path {
            self.handler.path = Some(path.clone());
        }

        if let Some(ref prefix) = args.prefix {
            self.handler.prefix = prefix.clone();
        }

        if let Some(ttl) = args.ttl {
            self.handler.ttl = ttl;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject settings no backend can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.backend.is_empty() {
            return Err(ConfigError::InvalidValue("session.backend", String::new()));
        }
        if self.session.name.is_empty() {
            return Err(ConfigError::InvalidValue("session.name", String::new()));
        }
        Ok(())
    }

    /// Session configuration for a controller.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            name: self.session.name.clone(),
            expire: self.session.expire,
            id: None,
            save_path: self
                .handler
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Setting with an unusable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(key, value) => write!(f, "invalid value for {}: '{}'", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.backend, "file");
        assert_eq!(config.session.expire, 15);
        assert_eq!(config.handler.prefix, "vault_");
        assert_eq!(config.handler.ttl, 1440);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "session": {
                "name": "APPSID",
                "expire": 30,
                "backend": "database"
            },
            "handler": {
                "prefix": "app_",
                "ttl": 600,
                "path": "/var/lib/app/sessions.db",
                "servers": ["ignored"]
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session.name, "APPSID");
        assert_eq!(config.session.expire, 30);
        assert_eq!(config.session.backend, "database");
        assert_eq!(config.handler.prefix, "app_");
        assert_eq!(config.handler.ttl, 600);
        assert_eq!(
            config.handler.path,
            Some(PathBuf::from("/var/lib/app/sessions.db"))
        );
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{ "handler": { "ttl": 90 } }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.handler.prefix, "vault_"); // Default
        assert_eq!(config.handler.ttl, 90);
        assert_eq!(config.session.backend, "file");
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            backend: Some("memory".to_string()),
            path: Some(PathBuf::from("/srv/sessions")),
            prefix: Some("cli_".to_string()),
            ttl: Some(120),
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.session.backend, "memory");
        assert_eq!(config.handler.path, Some(PathBuf::from("/srv/sessions")));
        assert_eq!(config.handler.prefix, "cli_");
        assert_eq!(config.handler.ttl, 120);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_validate_rejects_empty_backend() {
        let mut config = Config::default();
        config.session.backend.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_session_config() {
        let mut config = Config::default();
        config.session.expire = 45;
        config.handler.path = Some(PathBuf::from("/srv/sessions"));

        let session = config.to_session_config();
        assert_eq!(session.name, "VAULTSID");
        assert_eq!(session.expire, 45);
        assert_eq!(session.save_path, "/srv/sessions");
        assert!(session.id.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"backend\""));
        assert!(json.contains("\"prefix\""));
    }
}
