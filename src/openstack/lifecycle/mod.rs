//! Lifecycle operations of the OpenStack provider.
//!
//! Each operation validates its inputs, opens a compute client for the
//! request's credentials, performs its setup calls and then drives one or
//! more [`WaitState`](crate::waitstate::WaitState) phases whose progress
//! windows never overlap.

mod build;
mod destroy;
mod info;
mod restart;
mod start;
mod stop;

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::eventer::Reporter;
use crate::machine_state::MachineState;
use crate::protocol::{MachineOptions, ProviderError};

use super::api::{ApiError, ComputeApi};
use super::status::nova_state;
use super::types::{KeyPair, Server, has_flavor};
use super::{BuilderSettings, OpenstackProvider};

impl OpenstackProvider {
    /// Image to boot from: builder override, then request image, then default.
    pub(super) fn image_id<'a>(
        &'a self,
        options: &'a MachineOptions,
        settings: &'a BuilderSettings,
    ) -> &'a str {
        [settings.source_image.as_str(), options.image_name.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or(self.config.default_image_id.as_str())
    }

    pub(super) async fn ensure_key_pair(
        &self,
        api: &dyn ComputeApi,
    ) -> Result<KeyPair, ProviderError> {
        if let Some(key) = api.key_pair(&self.config.key_name).await? {
            return Ok(key);
        }
        debug!(key_name = %self.config.key_name, "deployment key pair missing, creating it");
        Ok(api
            .create_key_pair(&self.config.key_name, &self.config.public_key)
            .await?)
    }

    pub(super) async fn resolve_flavor<'a>(
        &'a self,
        api: &dyn ComputeApi,
        settings: &'a BuilderSettings,
    ) -> Result<&'a str, ProviderError> {
        let flavor = match settings.flavor.trim() {
            "" => self.config.default_flavor_id.as_str(),
            requested => requested,
        };
        let flavors = api.flavors().await?;
        if !has_flavor(&flavors, flavor) {
            return Err(ProviderError::FlavorNotFound {
                flavor: flavor.to_owned(),
            });
        }
        Ok(flavor)
    }

    /// Polls `created` until it runs and returns the record seen by the
    /// final probe.
    pub(super) async fn wait_until_running(
        &self,
        api: &dyn ComputeApi,
        created: Server,
        reporter: Reporter<'_>,
        reported: MachineState,
        (start, finish): (u8, u8),
    ) -> Result<Server, ProviderError> {
        let last_seen = Mutex::new(None);
        let seen = &last_seen;
        let server_id = created.id.as_str();
        let name = created.name.as_str();
        self.phase(MachineState::Running, start, finish)
            .wait(move |percentage| async move {
                let server = api.server(server_id).await?;
                reporter.push(
                    format!(
                        "Starting server '{name}', current task state: '{}'",
                        server.task_state()
                    ),
                    percentage,
                    reported,
                );
                let state = nova_state(&server.status);
                *seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(server);
                Ok::<_, ProviderError>(state)
            })
            .await?;

        let observed = last_seen
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(observed.unwrap_or(created))
    }
}

/// Maps a lookup failure for `image` to [`ProviderError::ImageNotFound`].
fn image_lookup_error(image: &str, err: ApiError) -> ProviderError {
    if err.is_not_found() {
        ProviderError::ImageNotFound {
            image: image.to_owned(),
        }
    } else {
        err.into()
    }
}
