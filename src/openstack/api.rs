//! Boundary to a credential-scoped OpenStack compute client.
//!
//! The provider only depends on these traits; the HTTP client that talks to
//! Nova and Glance lives outside this crate. Calls that look up a single
//! resource fail with [`ApiError::NotFound`] when it does not exist, which the
//! provider treats as an expected outcome during Stop, Destroy and Info.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::protocol::{Parameters, ProviderError};

use super::types::{Flavor, Image, KeyPair, NewServer, Server};

/// Future returned by compute API calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Errors returned by the compute API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The addressed resource does not exist.
    #[error("{resource} not found")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },
    /// Any other remote failure.
    #[error("{action} failed: {message}")]
    Remote {
        /// Remote call that failed.
        action: String,
        /// Message returned by the remote side.
        message: String,
    },
}

impl ApiError {
    /// Shorthand for a [`ApiError::NotFound`] error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Shorthand for a [`ApiError::Remote`] error.
    #[must_use]
    pub fn remote(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for [`ApiError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ApiError> for ProviderError {
    fn from(value: ApiError) -> Self {
        match value {
            ApiError::NotFound { resource } => Self::RemoteNotFound { resource },
            ApiError::Remote { action, message } => Self::RemoteApi { action, message },
        }
    }
}

/// Operations the OpenStack provider needs from the compute API.
pub trait ComputeApi: Send + Sync {
    /// Fetches an image by id.
    fn image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Image>;

    /// Lists every image visible to the account.
    fn images(&self) -> ApiFuture<'_, Vec<Image>>;

    /// Snapshots `server_id` into an image called `name`; returns the image id.
    fn create_image<'a>(&'a self, server_id: &'a str, name: &'a str) -> ApiFuture<'a, String>;

    /// Deletes an image by id.
    fn delete_image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()>;

    /// Lists available flavors.
    fn flavors(&self) -> ApiFuture<'_, Vec<Flavor>>;

    /// Fetches a key pair by name; `None` when it is not registered.
    fn key_pair<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Option<KeyPair>>;

    /// Registers a key pair.
    fn create_key_pair<'a>(&'a self, name: &'a str, public_key: &'a str)
    -> ApiFuture<'a, KeyPair>;

    /// Removes a key pair.
    fn delete_key_pair<'a>(&'a self, name: &'a str) -> ApiFuture<'a, ()>;

    /// Creates a server; the returned record may not carry an address yet.
    fn create_server<'a>(&'a self, request: &'a NewServer) -> ApiFuture<'a, Server>;

    /// Fetches a server by id.
    fn server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Server>;

    /// Deletes a server by id.
    fn delete_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()>;

    /// Reboots a server; `hard` requests a power cycle.
    fn reboot_server<'a>(&'a self, id: &'a str, hard: bool) -> ApiFuture<'a, ()>;
}

/// Opens a compute client scoped to one operation's credentials.
pub trait ComputeConnector: Send + Sync {
    /// Authenticates against `auth_url` with `credential`.
    fn connect<'a>(
        &'a self,
        auth_url: &'a str,
        credential: &'a Parameters,
    ) -> ApiFuture<'a, Box<dyn ComputeApi>>;
}
