//! OpenStack (Rackspace) implementation of the machine lifecycle.

mod api;
mod lifecycle;
mod status;
mod types;

use std::sync::Arc;

use serde::Deserialize;

use crate::config::{ConfigError, OpenstackConfig};
use crate::machine_state::MachineState;
use crate::protocol::{
    InfoArtifact, MachineOptions, Provider, ProviderArtifact, ProviderError, ProviderFuture,
};
use crate::waitstate::{WaitConfig, WaitState};

pub use api::{ApiError, ApiFuture, ComputeApi, ComputeConnector};
pub use status::{NOVA_VOCABULARY, nova_state};
pub use types::{Flavor, Image, KeyPair, NewServer, Server};

/// Builder parameters understood by the OpenStack provider.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct BuilderSettings {
    /// Image id overriding both the request image and the default.
    pub source_image: String,
    /// Flavor id overriding the default.
    pub flavor: String,
}

impl BuilderSettings {
    /// Parses the opaque builder map of a request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when a known key holds a
    /// value of the wrong type.
    pub fn from_options(options: &MachineOptions) -> Result<Self, ProviderError> {
        serde_json::from_value(serde_json::Value::Object(options.builder.clone())).map_err(
            |err| ProviderError::Configuration(format!("invalid builder parameters: {err}")),
        )
    }
}

/// Provider driving an OpenStack compute API.
#[derive(Clone)]
pub struct OpenstackProvider {
    config: OpenstackConfig,
    connector: Arc<dyn ComputeConnector>,
    wait: WaitConfig,
}

impl OpenstackProvider {
    /// Constructs a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation.
    pub fn new(
        config: OpenstackConfig,
        connector: Arc<dyn ComputeConnector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            wait: WaitConfig::default(),
        })
    }

    /// Replaces the polling budget used by every phase.
    #[must_use]
    pub const fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Configuration this provider was built with.
    #[must_use]
    pub const fn config(&self) -> &OpenstackConfig {
        &self.config
    }

    fn phase(&self, desired: MachineState, start: u8, finish: u8) -> WaitState {
        WaitState::new(desired, start, finish).with_config(self.wait)
    }

    async fn connect(&self, options: &MachineOptions) -> Result<Box<dyn ComputeApi>, ProviderError> {
        self.connector
            .connect(&self.config.auth_url, &options.credential)
            .await
            .map_err(ProviderError::from)
    }
}

impl std::fmt::Debug for OpenstackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenstackProvider")
            .field("name", &self.config.provider_name)
            .field("auth_url", &self.config.auth_url)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl Provider for OpenstackProvider {
    fn name(&self) -> &str {
        &self.config.provider_name
    }

    fn build<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ProviderArtifact> {
        Box::pin(async move { self.build_machine(options).await })
    }

    fn start<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ProviderArtifact> {
        Box::pin(async move { self.start_machine(options).await })
    }

    fn stop<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.stop_machine(options).await })
    }

    fn restart<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.restart_machine(options).await })
    }

    fn destroy<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.destroy_machine(options).await })
    }

    fn info<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, InfoArtifact> {
        Box::pin(async move { self.machine_info(options).await })
    }
}
