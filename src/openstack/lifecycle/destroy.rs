//! Destroy: delete the server and wait until the API no longer knows it.

use tracing::debug;

use crate::machine_state::MachineState;
use crate::protocol::{MachineOptions, ProviderError};

use super::super::OpenstackProvider;
use super::super::status::nova_state;

impl OpenstackProvider {
    pub(in crate::openstack) async fn destroy_machine(
        &self,
        options: &MachineOptions,
    ) -> Result<(), ProviderError> {
        let reporter = options.reporter()?;
        let instance_id = options.require_instance_id()?;
        let api = self.connect(options).await?;
        let client = api.as_ref();

        reporter.push("Terminating machine", 10, MachineState::Terminating);
        match client.delete_server(instance_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(instance_id, "server already absent, nothing to delete");
            }
            Err(err) => return Err(err.into()),
        }

        self.phase(MachineState::Terminated, 30, 70)
            .wait(move |percentage| async move {
                match client.server(instance_id).await {
                    Err(err) if err.is_not_found() => Ok(MachineState::Terminated),
                    Err(err) => Err(ProviderError::from(err)),
                    Ok(server) => {
                        reporter.push(
                            format!(
                                "Deleting server '{}', current task state: '{}'",
                                server.name,
                                server.task_state()
                            ),
                            percentage,
                            MachineState::Terminating,
                        );
                        Ok(nova_state(&server.status))
                    }
                }
            })
            .await
    }
}
