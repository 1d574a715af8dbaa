//! Runtime configuration
//!
//! Precedence, lowest first: built-in defaults, a TOML file, `THECHAIN_*`
//! environment variables. The merged result must pass `validate()` before the
//! engine is built from it.
//!
//! Environment keys use `__` between section and field, for example
//! `THECHAIN_RULES__MAX_ATTEMPTS=5` or `THECHAIN_SIGNING_SECRET=...`.

use crate::errors::{ChainError, ChainResult};
use crate::rules::ChainRule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "THECHAIN_";

/// Minimum signing secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Expiration sweeper settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Max tickets expired per sweep
    pub batch_limit: usize,
    /// Hours-before-deadline at which owners are warned
    pub warning_windows_hours: Vec<u32>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_limit: 500,
            warning_windows_hours: vec![1, 12],
        }
    }
}

impl SweeperConfig {
    /// Sweep interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Removal cascade settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Upper bound on ancestors walked by one cascade
    pub max_depth: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self { max_depth: 100_000 }
    }
}

/// Top-level configuration
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// HMAC key for ticket signatures
    pub signing_secret: String,
    /// Fallback rule when no rule version is in force
    pub rules: ChainRule,
    /// Sweeper settings
    pub sweeper: SweeperConfig,
    /// Cascade settings
    pub cascade: CascadeConfig,
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("signing_secret", &"<redacted>")
            .field("rules", &self.rules)
            .field("sweeper", &self.sweeper)
            .field("cascade", &self.cascade)
            .finish()
    }
}

impl ChainConfig {
    /// Defaults, then `path` if given, then the process environment; validated
    pub fn load(path: Option<&Path>) -> ChainResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ChainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChainError::invalid(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ChainResult<Self> {
        toml::from_str(content).map_err(|e| ChainError::invalid(format!("Invalid TOML: {}", e)))
    }

    /// Apply `THECHAIN_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> ChainResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `THECHAIN_*` overrides from an explicit variable list.
    ///
    /// Variables without the prefix are ignored; prefixed keys that name no
    /// setting are logged and skipped.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> ChainResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(raw) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let config_key = raw.to_lowercase().replace("__", ".");
            if !Self::is_known_key(&config_key) {
                tracing::warn!(key = key.as_ref(), "Ignoring unknown configuration variable");
                continue;
            }
            self.set_from_string(&config_key, value.as_ref())?;
        }
        Ok(())
    }

    fn is_known_key(key: &str) -> bool {
        matches!(
            key,
            "signing_secret"
                | "rules.ticket_duration_hours"
                | "rules.max_attempts"
                | "sweeper.interval_secs"
                | "sweeper.batch_limit"
                | "sweeper.warning_windows_hours"
                | "cascade.max_depth"
        )
    }

    /// Set one value by dotted key (`section.field`)
    pub fn set_from_string(&mut self, key: &str, value: &str) -> ChainResult<()> {
        match key {
            "signing_secret" => self.signing_secret = value.to_string(),
            "rules.ticket_duration_hours" => {
                self.rules.ticket_duration_hours = parse_number(key, value)?;
            }
            "rules.max_attempts" => self.rules.max_attempts = parse_number(key, value)?,
            "sweeper.interval_secs" => self.sweeper.interval_secs = parse_number(key, value)?,
            "sweeper.batch_limit" => self.sweeper.batch_limit = parse_number(key, value)?,
            "sweeper.warning_windows_hours" => {
                self.sweeper.warning_windows_hours = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_number(key, s))
                    .collect::<ChainResult<Vec<u32>>>()?;
            }
            "cascade.max_depth" => self.cascade.max_depth = parse_number(key, value)?,
            _ => {
                return Err(ChainError::invalid(format!(
                    "Unknown configuration key: {}",
                    key
                )))
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ChainResult<()> {
        if self.signing_secret.len() < MIN_SECRET_LEN {
            return Err(ChainError::invalid(format!(
                "signing_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        self.rules.validate()?;
        if self.sweeper.interval_secs == 0 {
            return Err(ChainError::invalid("sweeper.interval_secs cannot be 0"));
        }
        if self.sweeper.batch_limit == 0 {
            return Err(ChainError::invalid("sweeper.batch_limit cannot be 0"));
        }
        if self.sweeper.warning_windows_hours.contains(&0) {
            return Err(ChainError::invalid(
                "sweeper.warning_windows_hours entries must be positive",
            ));
        }
        if self.cascade.max_depth == 0 {
            return Err(ChainError::invalid("cascade.max_depth cannot be 0"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ChainResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChainError::invalid(format!("Invalid number for {}: '{}'", key, value)))
}
