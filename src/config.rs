//! Layered configuration: an optional TOML file, then `PETTRAK_*`
//! environment variables.
//!
//! ```toml
//! [cloud]
//! endpoint = "https://alphatrakapi.zoetis.com/api"
//! request_timeout = "30s"
//!
//! [poll]
//! base_interval = "5m"
//! max_interval = "1h"
//! call_timeout = "30s"
//!
//! [[accounts]]
//! username = "owner@example.com"
//! password = "secret"
//! pets = [42]   # empty polls every pet on the account
//! ```
//!
//! Nested keys use `__` in the environment, e.g.
//! `PETTRAK_POLL__BASE_INTERVAL=10m`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use pettrak_client::alphatrak::DEFAULT_ENDPOINT;
use pettrak_client::Credential;
use pettrak_coordinator::{
    BackoffPolicy, DEFAULT_BASE_INTERVAL, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_INTERVAL,
};
use pettrak_types::PetId;

const ENV_PREFIX: &str = "PETTRAK";

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no accounts configured")]
    NoAccounts,

    #[error("account #{0} has an empty username")]
    EmptyUsername(usize),

    #[error("account {0} has an empty password")]
    EmptyPassword(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cloud: CloudSettings,
    pub poll: PollSettings,
    pub accounts: Vec<AccountSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CloudSettings {
    pub endpoint: String,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub base_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub max_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub call_timeout: Duration,
}

#[derive(Clone, PartialEq, Deserialize)]
pub struct AccountSettings {
    pub username: String,
    pub password: String,
    /// Pet ids to poll. Empty means every pet on the account.
    #[serde(default)]
    pub pets: Vec<u64>,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_BASE_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], reading variables from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if account.username.trim().is_empty() {
                return Err(ConfigError::EmptyUsername(i));
            }
            if account.password.is_empty() {
                return Err(ConfigError::EmptyPassword(account.username.clone()));
            }
        }
        if self.poll.base_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll.base_interval"));
        }
        if self.poll.call_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("poll.call_timeout"));
        }
        if self.cloud.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("cloud.request_timeout"));
        }
        Ok(())
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.poll.base_interval, self.poll.max_interval)
    }
}

impl AccountSettings {
    pub fn credential(&self) -> Credential {
        Credential::new(self.username.clone(), self.password.clone())
    }

    /// Whether a discovered pet should be polled.
    pub fn wants(&self, pet: PetId) -> bool {
        self.pets.is_empty() || self.pets.contains(&pet.0)
    }
}

impl std::fmt::Debug for AccountSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pets", &self.pets)
            .finish()
    }
}
