//! Start: boot a server from the backup image taken by Stop.

use crate::machine_state::MachineState;
use crate::protocol::{MachineOptions, ProviderArtifact, ProviderError};

use super::super::types::{NewServer, image_by_name};
use super::super::{BuilderSettings, OpenstackProvider};

impl OpenstackProvider {
    pub(in crate::openstack) async fn start_machine(
        &self,
        options: &MachineOptions,
    ) -> Result<ProviderArtifact, ProviderError> {
        let reporter = options.reporter()?;
        let instance_name = options.require_instance_name()?;
        let settings = BuilderSettings::from_options(options)?;
        let api = self.connect(options).await?;
        let client = api.as_ref();

        reporter.push("Starting machine", 10, MachineState::Starting);
        let key = self.ensure_key_pair(client).await?;

        reporter.push(
            format!("Checking if backup image '{instance_name}' exists"),
            20,
            MachineState::Starting,
        );
        let images = client.images().await?;
        let image = image_by_name(&images, instance_name)
            .cloned()
            .ok_or_else(|| ProviderError::ImageNotFound {
                image: instance_name.to_owned(),
            })?;
        let flavor = self.resolve_flavor(client, &settings).await?;

        reporter.push(
            format!(
                "Starting server '{instance_name}' from backup image '{}'",
                image.id
            ),
            30,
            MachineState::Starting,
        );
        let request = NewServer {
            name: instance_name.to_owned(),
            image_ref: image.id.clone(),
            flavor_ref: flavor.to_owned(),
            key_pair_name: key.name,
        };
        let created = client.create_server(&request).await?;

        let server = self
            .wait_until_running(client, created, reporter, MachineState::Starting, (35, 60))
            .await?;
        reporter.push(
            format!("Deleting backup image {} - {}", image.name, image.id),
            80,
            MachineState::Starting,
        );
        client.delete_image(&image.id).await?;

        Ok(ProviderArtifact {
            instance_id: server.id,
            instance_name: server.name,
            ip_address: server.access_ipv4,
            username: options.username.clone(),
        })
    }
}
