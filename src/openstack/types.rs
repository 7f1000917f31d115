//! Compute API records exchanged with the OpenStack provider.

use serde::{Deserialize, Serialize};

/// A server as reported by the compute API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Server {
    /// Server identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Nova status string (`ACTIVE`, `BUILD`, ...).
    pub status: String,
    /// Extended task state (`image_snapshot`, `deleting`, ...), if any.
    pub task_state: Option<String>,
    /// Public IPv4 address; empty until assigned.
    pub access_ipv4: String,
}

impl Server {
    /// Task state, or an empty string when the server is idle.
    #[must_use]
    pub fn task_state(&self) -> &str {
        self.task_state.as_deref().unwrap_or_default()
    }

    /// Returns `true` while a task such as a snapshot upload is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !self.task_state().trim().is_empty()
    }
}

/// An image known to the compute API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Image {
    /// Image identifier.
    pub id: String,
    /// Image name.
    pub name: String,
    /// Image status (`ACTIVE`, `SAVING`, ...).
    pub status: String,
}

/// A server flavor.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Flavor {
    /// Flavor identifier.
    pub id: String,
    /// Human readable flavor name.
    pub name: String,
}

/// An SSH key pair registered with the compute API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeyPair {
    /// Key pair name.
    pub name: String,
    /// Public key material.
    pub public_key: String,
}

/// Parameters for a server creation call.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NewServer {
    /// Name of the new server.
    pub name: String,
    /// Image the server boots from.
    pub image_ref: String,
    /// Flavor of the server.
    pub flavor_ref: String,
    /// Key pair injected into the server.
    pub key_pair_name: String,
}

/// Returns `true` when `flavors` lists `id`.
#[must_use]
pub fn has_flavor(flavors: &[Flavor], id: &str) -> bool {
    flavors.iter().any(|flavor| flavor.id == id)
}

/// Finds the image named `name`.
#[must_use]
pub fn image_by_name<'a>(images: &'a [Image], name: &str) -> Option<&'a Image> {
    images.iter().find(|image| image.name == name)
}
