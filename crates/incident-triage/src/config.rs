//! Runtime configuration for the ticketing system and the model provider.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by the binary)
//! 2. TOML file passed via `--config`
//! 3. Environment variables (`TRIAGE_*`)
//! 4. Built-in defaults
//!
//! ## Environment variables
//!
//! | Variable                     | Field                  | Default                                   |
//! |------------------------------|------------------------|-------------------------------------------|
//! | `TRIAGE_ITSM_URL`            | `itsm.base_url`        | `https://your-instance.service-now.com`   |
//! | `TRIAGE_ITSM_USERNAME`       | `itsm.username`        | (empty)                                   |
//! | `TRIAGE_ITSM_PASSWORD`       | `itsm.password`        | (empty)                                   |
//! | `TRIAGE_ITSM_VERIFY_TLS`     | `itsm.verify_tls`      | `true`                                    |
//! | `TRIAGE_ITSM_TIMEOUT_SECS`   | `itsm.timeout_secs`    | `30`                                      |
//! | `TRIAGE_MODEL_URL`           | `model.base_url`       | Gemini OpenAI-compatible endpoint         |
//! | `TRIAGE_MODEL_API_KEY`       | `model.api_key`        | falls back to `GEMINI_API_KEY`            |
//! | `TRIAGE_MODEL_NAME`          | `model.model`          | `gemini-2.0-flash-001`                    |
//! | `TRIAGE_MODEL_TEMPERATURE`   | `model.temperature`    | `0.2`                                     |
//! | `TRIAGE_MODEL_TIMEOUT_SECS`  | `model.timeout_secs`   | `120`                                     |

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::{TriageError, TriageResult};

const DEFAULT_ITSM_URL: &str = "https://your-instance.service-now.com";
const DEFAULT_ITSM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MODEL_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;

const ENV_ITSM_URL: &str = "TRIAGE_ITSM_URL";
const ENV_ITSM_USERNAME: &str = "TRIAGE_ITSM_USERNAME";
const ENV_ITSM_PASSWORD: &str = "TRIAGE_ITSM_PASSWORD";
const ENV_ITSM_VERIFY_TLS: &str = "TRIAGE_ITSM_VERIFY_TLS";
const ENV_ITSM_TIMEOUT_SECS: &str = "TRIAGE_ITSM_TIMEOUT_SECS";
const ENV_MODEL_URL: &str = "TRIAGE_MODEL_URL";
const ENV_MODEL_API_KEY: &str = "TRIAGE_MODEL_API_KEY";
const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
const ENV_MODEL_NAME: &str = "TRIAGE_MODEL_NAME";
const ENV_MODEL_TEMPERATURE: &str = "TRIAGE_MODEL_TEMPERATURE";
const ENV_MODEL_TIMEOUT_SECS: &str = "TRIAGE_MODEL_TIMEOUT_SECS";

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// ServiceNow Table API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItsmConfig {
    /// Instance root, e.g. `https://acme.service-now.com`. A trailing `/` is ignored.
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Verify the server's TLS certificate. Disable only for lab instances.
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

impl Default for ItsmConfig {
    fn default() -> Self {
        Self {
            base_url: env::var(ENV_ITSM_URL).unwrap_or_else(|_| DEFAULT_ITSM_URL.to_string()),
            username: env::var(ENV_ITSM_USERNAME).unwrap_or_default(),
            password: env::var(ENV_ITSM_PASSWORD).unwrap_or_default(),
            verify_tls: env_bool(ENV_ITSM_VERIFY_TLS).unwrap_or(true),
            timeout_secs: env_parse(ENV_ITSM_TIMEOUT_SECS).unwrap_or(DEFAULT_ITSM_TIMEOUT_SECS),
        }
    }
}

impl ItsmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("itsm.base_url must not be empty".to_string());
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "itsm.base_url must start with http:// or https://, got {}",
                self.base_url
            ));
        }
        if self.username.trim().is_empty() {
            return Err(format!(
                "itsm.username must not be empty (set {ENV_ITSM_USERNAME})"
            ));
        }
        if self.timeout_secs == 0 {
            return Err("itsm.timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Generative-model endpoint settings (any OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: env::var(ENV_MODEL_URL).unwrap_or_else(|_| DEFAULT_MODEL_URL.to_string()),
            api_key: env::var(ENV_MODEL_API_KEY)
                .or_else(|_| env::var(ENV_GEMINI_API_KEY))
                .unwrap_or_default(),
            model: env::var(ENV_MODEL_NAME).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: env_parse(ENV_MODEL_TEMPERATURE).unwrap_or(DEFAULT_TEMPERATURE),
            timeout_secs: env_parse(ENV_MODEL_TIMEOUT_SECS).unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("model.base_url must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("model.model must not be empty".to_string());
        }
        // Keyless local endpoints take any placeholder, e.g. "not-needed".
        if self.api_key.trim().is_empty() {
            return Err(format!(
                "model.api_key must not be empty (set {ENV_MODEL_API_KEY} or {ENV_GEMINI_API_KEY})"
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(format!(
                "model.temperature must be in [0, 1], got {}",
                self.temperature
            ));
        }
        if self.timeout_secs == 0 {
            return Err("model.timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Top-level triage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub itsm: ItsmConfig,
    pub model: ModelConfig,
}

impl TriageConfig {
    /// Defaults overlaid with `TRIAGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Load a TOML file. Keys absent from the file keep their env/default value.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> TriageResult<()> {
        self.itsm.validate().map_err(TriageError::Configuration)?;
        self.model.validate().map_err(TriageError::Configuration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid() -> TriageConfig {
        let mut cfg = TriageConfig::default();
        cfg.itsm.base_url = "https://acme.service-now.com".into();
        cfg.itsm.username = "svc-triage".into();
        cfg.itsm.timeout_secs = 30;
        cfg.model.base_url = DEFAULT_MODEL_URL.into();
        cfg.model.model = DEFAULT_MODEL.into();
        cfg.model.api_key = "test-key".into();
        cfg.model.temperature = 0.2;
        cfg.model.timeout_secs = 60;
        cfg
    }

    #[test]
    fn populated_config_validates() {
        valid().validate().expect("populated config should be valid");
    }

    #[test]
    fn empty_username_rejected() {
        let mut cfg = valid();
        cfg.itsm.username = "  ".into();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TriageError::Configuration(_)));
    }

    #[test]
    fn non_http_url_rejected() {
        let mut cfg = valid();
        cfg.itsm.base_url = "acme.service-now.com".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_api_key_is_configuration_error() {
        let mut cfg = valid();
        cfg.model.api_key = String::new();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.exit_code(), crate::errors::EXIT_CONFIGURATION);
        assert!(err.to_string().contains("TRIAGE_MODEL_API_KEY"), "{err}");

        cfg.model.api_key = "not-needed".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut cfg = valid();
        cfg.model.temperature = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut cfg = valid();
        cfg.model.timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.itsm.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_file_overrides_selected_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[itsm]
base_url = "https://lab.service-now.com"
username = "lab-user"
verify_tls = false

[model]
model = "gemini-2.5-flash"
temperature = 0.0
"#
        )
        .unwrap();

        let cfg = TriageConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.itsm.base_url, "https://lab.service-now.com");
        assert_eq!(cfg.itsm.username, "lab-user");
        assert!(!cfg.itsm.verify_tls);
        assert_eq!(cfg.model.model, "gemini-2.5-flash");
        assert_eq!(cfg.model.temperature, 0.0);
        assert!(cfg.model.timeout_secs > 0);
    }

    #[test]
    fn malformed_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[itsm\nbase_url = ").unwrap();
        let err = TriageConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn password_is_not_serialized() {
        let mut cfg = valid();
        cfg.itsm.password = "hunter2".into();
        cfg.model.api_key = "secret-key".into();
        let rendered = toml::to_string(&cfg).unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-key"));
    }
}
