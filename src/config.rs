//! Configuration loading via `ortho-config`.
//!
//! [`KloudConfig`] carries the orchestrator's polling budget and event
//! history size; [`OpenstackConfig`] carries the defaults of the Rackspace
//! provider. Both merge defaults, `kloud.toml` discovery and environment
//! variables.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::waitstate::WaitConfig;

/// Rackspace identity endpoint used when no other URL is configured.
pub const DEFAULT_AUTH_URL: &str = "https://identity.api.rackspacecloud.com/v2.0";

/// Ubuntu 14.04 LTS (Trusty Tahr) (PVHVM).
pub const DEFAULT_IMAGE_ID: &str = "bb02b1a3-bc77-4d17-ab5b-421d89850fca";

/// 512MB Standard Instance.
pub const DEFAULT_FLAVOR_ID: &str = "2";

/// Key pair installed on every machine built by the OpenStack provider.
pub const DEFAULT_KEY_NAME: &str = "kloud-deployment";

/// Orchestrator settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "KLOUD",
    discovery(
        app_name = "kloud",
        env_var = "KLOUD_CONFIG_PATH",
        config_file_name = "kloud.toml",
        dotfile_name = ".kloud.toml",
        project_file_name = "kloud.toml"
    )
)]
pub struct KloudConfig {
    /// Pause between two status probes, in milliseconds.
    #[ortho_config(default = 3_000)]
    pub poll_interval_ms: u64,
    /// Maximum number of status probes per polling phase.
    #[ortho_config(default = 100)]
    pub wait_max_attempts: u32,
    /// Wall-clock budget per polling phase, in seconds.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Number of progress events retained per operation.
    #[ortho_config(default = 256)]
    pub event_capacity: usize,
}

impl Default for KloudConfig {
    fn default() -> Self {
        let wait = WaitConfig::default();
        Self {
            poll_interval_ms: u64::try_from(wait.poll_interval.as_millis()).unwrap_or(u64::MAX),
            wait_max_attempts: wait.max_attempts,
            wait_timeout_secs: wait.timeout.as_secs(),
            event_capacity: crate::eventer::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }

    fn hint(&self) -> String {
        format!(
            "set {} or add {} to [{}] in kloud.toml",
            self.env_var, self.toml_key, self.section
        )
    }

    fn require(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                self.description,
                self.hint()
            )));
        }
        Ok(())
    }

    fn require_positive(&self, value: u64) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: {}",
                self.description,
                self.hint()
            )));
        }
        Ok(())
    }
}

impl KloudConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("kloud")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects zero budgets, which would make every wait fail immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new(
            "poll interval",
            "KLOUD_POLL_INTERVAL_MS",
            "poll_interval_ms",
            "kloud",
        )
        .require_positive(self.poll_interval_ms)?;
        FieldMetadata::new(
            "wait attempt budget",
            "KLOUD_WAIT_MAX_ATTEMPTS",
            "wait_max_attempts",
            "kloud",
        )
        .require_positive(u64::from(self.wait_max_attempts))?;
        FieldMetadata::new(
            "wait timeout",
            "KLOUD_WAIT_TIMEOUT_SECS",
            "wait_timeout_secs",
            "kloud",
        )
        .require_positive(self.wait_timeout_secs)?;
        FieldMetadata::new(
            "event capacity",
            "KLOUD_EVENT_CAPACITY",
            "event_capacity",
            "kloud",
        )
        .require_positive(u64::try_from(self.event_capacity).unwrap_or(u64::MAX))?;
        Ok(())
    }

    /// Polling budget handed to every provider phase.
    #[must_use]
    pub const fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.wait_max_attempts,
            timeout: Duration::from_secs(self.wait_timeout_secs),
        }
    }
}

/// Defaults for the OpenStack (Rackspace) provider.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "KLOUD_OPENSTACK",
    discovery(
        app_name = "kloud",
        env_var = "KLOUD_CONFIG_PATH",
        config_file_name = "kloud.toml",
        dotfile_name = ".kloud.toml",
        project_file_name = "kloud.toml"
    )
)]
pub struct OpenstackConfig {
    /// Name the provider is registered under.
    #[ortho_config(default = "rackspace".to_owned())]
    pub provider_name: String,
    /// Identity endpoint handed to the compute connector.
    #[ortho_config(default = DEFAULT_AUTH_URL.to_owned())]
    pub auth_url: String,
    /// Image used when neither the request nor the builder names one.
    #[ortho_config(default = DEFAULT_IMAGE_ID.to_owned())]
    pub default_image_id: String,
    /// Flavor used when the builder does not name one.
    #[ortho_config(default = DEFAULT_FLAVOR_ID.to_owned())]
    pub default_flavor_id: String,
    /// Name of the deployment key pair.
    #[ortho_config(default = DEFAULT_KEY_NAME.to_owned())]
    pub key_name: String,
    /// Public half of the deployment key pair. This value is required.
    pub public_key: String,
}

impl OpenstackConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("kloud")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new(
            "provider name",
            "KLOUD_OPENSTACK_PROVIDER_NAME",
            "provider_name",
            "openstack",
        )
        .require(&self.provider_name)?;
        FieldMetadata::new(
            "identity endpoint",
            "KLOUD_OPENSTACK_AUTH_URL",
            "auth_url",
            "openstack",
        )
        .require(&self.auth_url)?;
        FieldMetadata::new(
            "default image",
            "KLOUD_OPENSTACK_DEFAULT_IMAGE_ID",
            "default_image_id",
            "openstack",
        )
        .require(&self.default_image_id)?;
        FieldMetadata::new(
            "default flavor",
            "KLOUD_OPENSTACK_DEFAULT_FLAVOR_ID",
            "default_flavor_id",
            "openstack",
        )
        .require(&self.default_flavor_id)?;
        FieldMetadata::new(
            "deployment key name",
            "KLOUD_OPENSTACK_KEY_NAME",
            "key_name",
            "openstack",
        )
        .require(&self.key_name)?;
        FieldMetadata::new(
            "deployment public key",
            "KLOUD_OPENSTACK_PUBLIC_KEY",
            "public_key",
            "openstack",
        )
        .require(&self.public_key)?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
