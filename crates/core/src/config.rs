//! Station configuration for device personalization.
//!
//! Loaded from TOML. Every field has a default so an empty file (or no file
//! at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Current export bundle format version.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub personalization: PersonalizationConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// What a session does when it finds the secret partition unlocked but
/// already fully programmed (a reset hit between the writes and the lock).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ResumePolicy {
    /// Refuse and report the unit for quarantine.
    #[default]
    FailSafe,
    /// Re-issue only the lock command.
    LockOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonalizationConfig {
    #[serde(default)]
    pub resume_policy: ResumePolicy,
    /// Hex SEC1 P-256 public key of the manufacturing HSM. The RMA unlock
    /// token is only exported (wrapped to this key) when it is set.
    #[serde(default)]
    pub host_public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportConfig {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format_version() -> u32 {
    EXPORT_FORMAT_VERSION
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
        }
    }
}

impl PersonalizationConfig {
    /// Decoded host public key bytes, if one is configured.
    pub fn host_public_key_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.host_public_key {
            None => Ok(None),
            Some(encoded) => {
                let bytes = hex::decode(encoded.trim()).map_err(|e| Error::InvalidConfig {
                    field: "personalization.host_public_key".to_string(),
                    reason: e.to_string(),
                })?;
                // SEC1 compressed or uncompressed P-256 point
                if bytes.len() != 33 && bytes.len() != 65 {
                    return Err(Error::InvalidConfig {
                        field: "personalization.host_public_key".to_string(),
                        reason: format!("expected 33 or 65 bytes, got {}", bytes.len()),
                    });
                }
                Ok(Some(bytes))
            }
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.logging.level).map_err(|e| Error::InvalidConfig {
            field: "logging.level".to_string(),
            reason: e.to_string(),
        })?;

        self.personalization.host_public_key_bytes()?;

        if self.export.format_version == 0 || self.export.format_version > EXPORT_FORMAT_VERSION {
            return Err(Error::InvalidConfig {
                field: "export.format_version".to_string(),
                reason: format!(
                    "unsupported version {} (max {})",
                    self.export.format_version, EXPORT_FORMAT_VERSION
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.personalization.resume_policy, ResumePolicy::FailSafe);
        assert_eq!(config.export.format_version, EXPORT_FORMAT_VERSION);
    }

    #[test]
    fn test_full_file() {
        let key = format!("02{}", "11".repeat(32));
        let content = format!(
            r#"
            [logging]
            level = "debug"
            json = true

            [personalization]
            resume_policy = "lock-only"
            host_public_key = "{key}"
            "#
        );

        let config = Config::from_toml_str(&content).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.personalization.resume_policy, ResumePolicy::LockOnly);
        assert_eq!(
            config.personalization.host_public_key_bytes().unwrap().unwrap().len(),
            33
        );
    }

    #[test]
    fn test_rejects_bad_host_key() {
        let err = Config::from_toml_str(
            r#"
            [personalization]
            host_public_key = "zz"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let err = Config::from_toml_str(
            r#"
            [personalization]
            host_public_key = "0102"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected 33 or 65 bytes"));
    }

    #[test]
    fn test_rejects_unknown_resume_policy() {
        let err = Config::from_toml_str(
            r#"
            [personalization]
            resume_policy = "rewrite"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_rejects_future_format_version() {
        let err = Config::from_toml_str("[export]\nformat_version = 9\n").unwrap_err();
        assert!(err.to_string().contains("export.format_version"));
    }
}
