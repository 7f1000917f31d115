//! Provider abstraction for machine lifecycle backends.
//!
//! A [`Provider`] drives one cloud API through the Build, Start, Stop,
//! Restart, Destroy and Info operations. Every operation receives a
//! [`MachineOptions`] bundle owned by the caller and reports progress through
//! the [`Eventer`] attached to it.

mod error;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::eventer::{Eventer, Reporter};
use crate::machine_state::MachineState;

pub use error::ProviderError;

/// Opaque key/value parameters forwarded to a backend untouched.
pub type Parameters = Map<String, Value>;

/// Inputs shared by every provider operation.
#[derive(Clone, Debug, Default)]
pub struct MachineOptions {
    /// Stable identifier of the machine record; used for locking.
    pub machine_id: String,
    /// Remote instance identifier, once the machine has been built.
    pub instance_id: Option<String>,
    /// Name given to the remote instance.
    pub instance_name: String,
    /// Owner of the machine.
    pub username: String,
    /// Image requested by the caller; empty selects the provider default.
    pub image_name: String,
    /// Credentials used to authenticate against the remote API.
    pub credential: Parameters,
    /// Backend specific build parameters (image, flavor, ...).
    pub builder: Parameters,
    /// Progress channel for this operation.
    pub eventer: Option<Arc<Eventer>>,
}

impl MachineOptions {
    /// Starts a builder for [`MachineOptions`].
    #[must_use]
    pub fn builder() -> MachineOptionsBuilder {
        MachineOptionsBuilder::default()
    }

    /// Returns a reporter pushing to this operation's eventer.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when no eventer is attached.
    pub fn reporter(&self) -> Result<Reporter<'_>, ProviderError> {
        let eventer = self
            .eventer
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration(String::from("eventer is not defined")))?;
        Ok(Reporter::new(eventer, &self.machine_id, &self.username))
    }

    /// Returns the remote instance id.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when the id is absent or blank.
    pub fn require_instance_id(&self) -> Result<&str, ProviderError> {
        self.instance_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Validation(String::from("instance_id")))
    }

    /// Returns the instance name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when the name is blank.
    pub fn require_instance_name(&self) -> Result<&str, ProviderError> {
        let name = self.instance_name.trim();
        if name.is_empty() {
            return Err(ProviderError::Validation(String::from("instance_name")));
        }
        Ok(name)
    }

    /// Returns a copy of these options wired to `eventer`.
    #[must_use]
    pub fn with_eventer(mut self, eventer: Arc<Eventer>) -> Self {
        self.eventer = Some(eventer);
        self
    }
}

/// Builder for [`MachineOptions`] that trims string inputs.
#[derive(Clone, Debug, Default)]
pub struct MachineOptionsBuilder {
    machine_id: String,
    instance_id: Option<String>,
    instance_name: String,
    username: String,
    image_name: String,
    credential: Parameters,
    builder: Parameters,
    eventer: Option<Arc<Eventer>>,
}

impl MachineOptionsBuilder {
    /// Sets the machine id.
    #[must_use]
    pub fn machine_id(mut self, value: impl Into<String>) -> Self {
        self.machine_id = value.into();
        self
    }

    /// Sets the remote instance id.
    #[must_use]
    pub fn instance_id(mut self, value: Option<String>) -> Self {
        self.instance_id = value;
        self
    }

    /// Sets the instance name.
    #[must_use]
    pub fn instance_name(mut self, value: impl Into<String>) -> Self {
        self.instance_name = value.into();
        self
    }

    /// Sets the username.
    #[must_use]
    pub fn username(mut self, value: impl Into<String>) -> Self {
        self.username = value.into();
        self
    }

    /// Sets the image name.
    #[must_use]
    pub fn image_name(mut self, value: impl Into<String>) -> Self {
        self.image_name = value.into();
        self
    }

    /// Adds a credential entry.
    #[must_use]
    pub fn credential(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.credential.insert(key.into(), value.into());
        self
    }

    /// Adds a builder parameter.
    #[must_use]
    pub fn builder_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.builder.insert(key.into(), value.into());
        self
    }

    /// Attaches the eventer.
    #[must_use]
    pub fn eventer(mut self, value: Arc<Eventer>) -> Self {
        self.eventer = Some(value);
        self
    }

    /// Builds the options.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when the machine id is blank.
    pub fn build(self) -> Result<MachineOptions, ProviderError> {
        let machine_id = self.machine_id.trim().to_owned();
        if machine_id.is_empty() {
            return Err(ProviderError::Validation(String::from("machine_id")));
        }
        Ok(MachineOptions {
            machine_id,
            instance_id: self
                .instance_id
                .map(|id| id.trim().to_owned())
                .filter(|id| !id.is_empty()),
            instance_name: self.instance_name.trim().to_owned(),
            username: self.username.trim().to_owned(),
            image_name: self.image_name.trim().to_owned(),
            credential: self.credential,
            builder: self.builder,
            eventer: self.eventer,
        })
    }
}

/// Durable result of a successful Build or Start.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProviderArtifact {
    /// Remote instance identifier.
    pub instance_id: String,
    /// Remote instance name.
    pub instance_name: String,
    /// Public address of the instance.
    pub ip_address: String,
    /// Owner of the machine.
    pub username: String,
}

/// Snapshot returned by Info.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct InfoArtifact {
    /// Current machine state.
    pub state: MachineState,
    /// Remote instance name.
    pub name: String,
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Capability set implemented by every cloud backend.
pub trait Provider: Send + Sync {
    /// Name under which the provider is registered.
    fn name(&self) -> &str;

    /// Creates a new machine and waits until it runs.
    fn build<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ProviderArtifact>;

    /// Brings a stopped machine back up.
    fn start<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ProviderArtifact>;

    /// Stops a running machine.
    fn stop<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()>;

    /// Reboots a running machine.
    fn restart<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()>;

    /// Destroys the machine. Destroying an absent machine succeeds.
    fn destroy<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()>;

    /// Samples the current machine state once.
    fn info<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, InfoArtifact>;
}

/// Failure reported by a post-operation hook.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{hook} failed: {message}")]
pub struct HookError {
    /// Hook that failed (`storage`, `deployer`).
    pub hook: String,
    /// Description of the failure.
    pub message: String,
}

impl HookError {
    /// Creates a hook error.
    #[must_use]
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// Future returned by hooks.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'a>>;

/// Persists machine records keyed by machine id.
pub trait Storage: Send + Sync {
    /// Stores the artifact produced by a Build or Start.
    fn update<'a>(&'a self, machine_id: &'a str, artifact: &'a ProviderArtifact) -> HookFuture<'a>;

    /// Records the state a machine ended up in.
    fn update_state<'a>(&'a self, machine_id: &'a str, state: MachineState) -> HookFuture<'a>;
}

/// Post-provisioning setup run after a successful Build.
pub trait Deployer: Send + Sync {
    /// Deploys onto the freshly built machine.
    fn deploy<'a>(&'a self, artifact: &'a ProviderArtifact, reporter: Reporter<'a>) -> HookFuture<'a>;
}
