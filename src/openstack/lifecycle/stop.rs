//! Stop: snapshot the server into a backup image, then delete it.

use tracing::debug;

use crate::machine_state::MachineState;
use crate::protocol::{MachineOptions, ProviderError};

use super::super::OpenstackProvider;
use super::super::status::nova_state;

impl OpenstackProvider {
    pub(in crate::openstack) async fn stop_machine(
        &self,
        options: &MachineOptions,
    ) -> Result<(), ProviderError> {
        let reporter = options.reporter()?;
        let instance_id = options.require_instance_id()?;
        let instance_name = options.require_instance_name()?;
        let api = self.connect(options).await?;
        let client = api.as_ref();

        reporter.push("Stopping machine", 10, MachineState::Stopping);
        reporter.push(
            format!("Creating a backup image with name: {instance_name} for id: {instance_id}"),
            20,
            MachineState::Stopping,
        );
        let image_id = client.create_image(instance_id, instance_name).await?;

        // An empty task state means the snapshot has been uploaded. A server
        // that vanished meanwhile is settled by the deletion phase.
        let image = image_id.as_str();
        self.phase(MachineState::Stopping, 30, 50)
            .wait(move |percentage| async move {
                let server = match client.server(instance_id).await {
                    Ok(server) => server,
                    Err(err) if err.is_not_found() => {
                        debug!(instance_id, "server vanished while taking the backup image");
                        return Ok(MachineState::Stopping);
                    }
                    Err(err) => return Err(ProviderError::from(err)),
                };
                if !server.is_busy() {
                    return Ok(MachineState::Stopping);
                }
                reporter.push(
                    format!(
                        "Taking image '{image}' of machine, current task state: '{}'",
                        server.task_state()
                    ),
                    percentage,
                    MachineState::Stopping,
                );
                Ok(nova_state(&server.status))
            })
            .await?;

        reporter.push(
            format!("Deleting server: {instance_id}"),
            55,
            MachineState::Stopping,
        );
        match client.delete_server(instance_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(instance_id, "server already gone before deletion");
            }
            Err(err) => return Err(err.into()),
        }

        self.phase(MachineState::Stopped, 60, 80)
            .wait(move |percentage| async move {
                match client.server(instance_id).await {
                    Err(err) if err.is_not_found() => Ok(MachineState::Stopped),
                    Err(err) => Err(ProviderError::from(err)),
                    Ok(server) => {
                        reporter.push(
                            format!(
                                "Deleting server '{}', current task state: '{}'",
                                server.name,
                                server.task_state()
                            ),
                            percentage,
                            MachineState::Stopping,
                        );
                        Ok(nova_state(&server.status))
                    }
                }
            })
            .await
    }
}
