//! Build: boot a new server and wait until it runs.

use crate::machine_state::MachineState;
use crate::protocol::{MachineOptions, ProviderArtifact, ProviderError};

use super::super::types::NewServer;
use super::super::{BuilderSettings, OpenstackProvider};
use super::image_lookup_error;

impl OpenstackProvider {
    pub(in crate::openstack) async fn build_machine(
        &self,
        options: &MachineOptions,
    ) -> Result<ProviderArtifact, ProviderError> {
        let reporter = options.reporter()?;
        let instance_name = options.require_instance_name()?;
        let settings = BuilderSettings::from_options(options)?;
        let api = self.connect(options).await?;
        let client = api.as_ref();

        let image_id = self.image_id(options, &settings);
        reporter.push(
            format!("Checking for image availability {image_id}"),
            10,
            MachineState::Building,
        );
        client
            .image(image_id)
            .await
            .map_err(|err| image_lookup_error(image_id, err))?;

        let key = self.ensure_key_pair(client).await?;
        let flavor = self.resolve_flavor(client, &settings).await?;

        reporter.push(
            format!("Creating server {instance_name}"),
            20,
            MachineState::Building,
        );
        let request = NewServer {
            name: instance_name.to_owned(),
            image_ref: image_id.to_owned(),
            flavor_ref: flavor.to_owned(),
            key_pair_name: key.name,
        };
        let created = client.create_server(&request).await?;

        let server = self
            .wait_until_running(client, created, reporter, MachineState::Building, (25, 60))
            .await?;
        reporter.push(
            format!("Server is created {instance_name}"),
            70,
            MachineState::Building,
        );
        Ok(ProviderArtifact {
            instance_id: server.id,
            instance_name: server.name,
            ip_address: server.access_ipv4,
            username: options.username.clone(),
        })
    }
}
