//! Info: one status sample, no polling.

use tracing::debug;

use crate::machine_state::MachineState;
use crate::protocol::{InfoArtifact, MachineOptions, ProviderError};

use super::super::OpenstackProvider;
use super::super::status::nova_state;
use super::super::types::image_by_name;

impl OpenstackProvider {
    /// A missing server whose backup image exists is reported as stopped;
    /// without a backup it is terminated.
    pub(in crate::openstack) async fn machine_info(
        &self,
        options: &MachineOptions,
    ) -> Result<InfoArtifact, ProviderError> {
        options.reporter()?;
        let instance_id = options.require_instance_id()?;
        let api = self.connect(options).await?;

        debug!(instance_id, "checking server info");
        let server = match api.server(instance_id).await {
            Ok(server) => server,
            Err(err) if err.is_not_found() => {
                let images = api.images().await?;
                let state = if image_by_name(&images, &options.instance_name).is_some() {
                    MachineState::Stopped
                } else {
                    MachineState::Terminated
                };
                debug!(instance_id, %state, "server does not exist");
                return Ok(InfoArtifact {
                    state,
                    name: options.instance_name.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        Ok(InfoArtifact {
            state: nova_state(&server.status),
            name: server.name,
        })
    }
}
