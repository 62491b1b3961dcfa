use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PolicyError, Result};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Tunables for the policy engine.
///
/// Deserializing runs the same checks as [`PolicyConfigBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "PolicyConfigFields")]
pub struct PolicyConfig {
    /// Usage percentage (inclusive) at which status warnings are raised.
    pub warning_threshold_percent: u8,
    /// Usage percentage (inclusive) at which upgrade suggestions become `recommended`.
    pub suggestion_threshold_percent: u8,
    /// Days before the end date at which an expiry warning is raised.
    pub expiry_warning_days: u32,
    pub enforcement: EnforcementMode,
    pub logging: LoggingConfig,
}

/// Unvalidated wire form of [`PolicyConfig`].
#[derive(Deserialize)]
struct PolicyConfigFields {
    #[serde(default = "default_threshold_percent")]
    warning_threshold_percent: u8,
    #[serde(default = "default_threshold_percent")]
    suggestion_threshold_percent: u8,
    #[serde(default = "default_expiry_warning_days")]
    expiry_warning_days: u32,
    #[serde(default)]
    enforcement: EnforcementMode,
    #[serde(default)]
    logging: LoggingConfig,
}

impl TryFrom<PolicyConfigFields> for PolicyConfig {
    type Error = PolicyError;

    fn try_from(fields: PolicyConfigFields) -> Result<Self> {
        let config = Self {
            warning_threshold_percent: fields.warning_threshold_percent,
            suggestion_threshold_percent: fields.suggestion_threshold_percent,
            expiry_warning_days: fields.expiry_warning_days,
            enforcement: fields.enforcement,
            logging: fields.logging,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// How strictly limit-gated creations are enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Check, then let the caller create. Concurrent requests can overshoot.
    #[default]
    Soft,
    /// Serialize check-and-create per company within this process.
    Serialized,
}

impl EnforcementMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Serialized => "serialized",
        }
    }
}

impl FromStr for EnforcementMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "serialized" | "strict" => Ok(Self::Serialized),
            other => Err(PolicyError::Config(format!(
                "Invalid enforcement mode: {}. Must be one of: soft, serialized",
                other
            ))),
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            warning_threshold_percent: default_threshold_percent(),
            suggestion_threshold_percent: default_threshold_percent(),
            expiry_warning_days: default_expiry_warning_days(),
            enforcement: EnforcementMode::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_threshold_percent() -> u8 {
    80
}

fn default_expiry_warning_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

impl PolicyConfig {
    pub fn builder() -> PolicyConfigBuilder {
        PolicyConfigBuilder::new()
    }

    /// Check that every setting is in range.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Config` if:
    /// - A threshold percentage is outside 1..=100
    /// - The log level is unknown
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("warning_threshold_percent", self.warning_threshold_percent),
            ("suggestion_threshold_percent", self.suggestion_threshold_percent),
        ] {
            if !(1..=100).contains(&value) {
                return Err(PolicyError::Config(format!(
                    "{} must be between 1 and 100, got {}",
                    name, value
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(PolicyError::Config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }
        Ok(())
    }
}

/// Builder for PolicyConfig with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct PolicyConfigBuilder {
    config: PolicyConfig,
}

impl PolicyConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PolicyConfig::default(),
        }
    }

    pub fn with_warning_threshold_percent(mut self, percent: u8) -> Self {
        self.config.warning_threshold_percent = percent;
        self
    }

    pub fn with_suggestion_threshold_percent(mut self, percent: u8) -> Self {
        self.config.suggestion_threshold_percent = percent;
        self
    }

    pub fn with_expiry_warning_days(mut self, days: u32) -> Self {
        self.config.expiry_warning_days = days;
        self
    }

    pub fn with_enforcement(mut self, mode: EnforcementMode) -> Self {
        self.config.enforcement = mode;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    /// Load configuration from environment variables with WAYMARK_ prefix
    ///
    /// Unparseable values are ignored and the current value kept.
    pub fn from_env(mut self) -> Self {
        if let Some(pct) = parse_env_with_prefix("WARNING_THRESHOLD_PERCENT") {
            self.config.warning_threshold_percent = pct;
        }
        if let Some(pct) = parse_env_with_prefix("SUGGESTION_THRESHOLD_PERCENT") {
            self.config.suggestion_threshold_percent = pct;
        }
        if let Some(days) = parse_env_with_prefix("EXPIRY_WARNING_DAYS") {
            self.config.expiry_warning_days = days;
        }
        if let Some(mode) = get_env_with_prefix("ENFORCEMENT") {
            match mode.parse() {
                Ok(mode) => self.config.enforcement = mode,
                Err(e) => tracing::warn!(error = %e, "Ignoring WAYMARK_ENFORCEMENT"),
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// See [`PolicyConfig::validate`].
    pub fn build(self) -> Result<PolicyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PolicyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
