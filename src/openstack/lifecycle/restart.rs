//! Restart: soft reboot and wait for the server to come back.

use crate::machine_state::MachineState;
use crate::protocol::{MachineOptions, ProviderError};

use super::super::OpenstackProvider;
use super::super::status::nova_state;

impl OpenstackProvider {
    pub(in crate::openstack) async fn restart_machine(
        &self,
        options: &MachineOptions,
    ) -> Result<(), ProviderError> {
        let reporter = options.reporter()?;
        let instance_id = options.require_instance_id()?;
        let api = self.connect(options).await?;
        let client = api.as_ref();

        reporter.push("Rebooting machine", 10, MachineState::Rebooting);
        client.reboot_server(instance_id, false).await?;

        self.phase(MachineState::Running, 30, 70)
            .wait(move |percentage| async move {
                let server = client.server(instance_id).await?;
                reporter.push(
                    format!(
                        "Rebooting server '{}', current task state: '{}'",
                        server.name,
                        server.task_state()
                    ),
                    percentage,
                    MachineState::Rebooting,
                );
                Ok::<_, ProviderError>(nova_state(&server.status))
            })
            .await
    }
}
