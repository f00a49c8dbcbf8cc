use ovs_backup_schemas::handlers::CommandResult;
use crate::error::{OvsBackupError, Result};
use crate::orchestration::{classify_output, Credential, RemoteExecutor, SwitchTarget};
use crate::snapshot::restore::RestorePlan;

/// Run a restore plan against a target, strictly in order. A command the tool rejects is recorded
/// and the rest of the plan still runs, every command is safe to run against a partially restored
/// switch. A transport failure stops the restore and is returned.
pub async fn apply_plan(
    executor: &dyn RemoteExecutor,
    plan: &RestorePlan,
    target: &SwitchTarget,
    credential: &Credential,
) -> Result<Vec<CommandResult>> {
    tracing::info!("restoring {} steps onto {}", plan.steps.len(), &target.host);
    let mut results = Vec::with_capacity(plan.steps.len());
    for command in plan.commands() {
        tracing::debug!("running on {}: {}", &target.host, &command);
        let output = match executor.execute(&command, target, credential).await {
            Ok(output) => output,
            Err(err) => {
                tracing::error!("restore onto {} aborted after {} commands: {err}", &target.host, results.len());
                return Err(err);
            }
        };
        // classify a copy, the result keeps the raw output either way
        let error = match classify_output(&command, output.clone()) {
            Ok(_) => None,
            Err(OvsBackupError::ToolReportedFailure { message, .. }) => {
                tracing::warn!("restore command `{}` on {} failed: {}", &command, &target.host, &message);
                Some(message)
            }
            Err(err) => return Err(err),
        };
        results.push(CommandResult {
            command: command.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            success: error.is_none(),
            error,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ovs_backup_schemas::topology::{Bridge, Interface, Port, Snapshot};
    use super::*;
    use crate::orchestration::scripted::ScriptedExecutor;
    use crate::snapshot::restore::RestorePlanner;

    fn plan() -> RestorePlan {
        let mut snapshot = Snapshot::new("switch_a".into(), "10.0.0.5".into(), Utc::now());
        let mut bridge = Bridge::new("br0".into());
        for name in ["eth0", "eth1"] {
            let mut interface = Interface::new(name.into());
            interface.iface_type = Some("internal".into());
            let mut port = Port::new(name.into());
            port.interfaces.push(interface);
            bridge.ports.push(port);
        }
        snapshot.bridges.push(bridge);
        RestorePlanner::default().plan(&snapshot, "10.0.0.9")
    }

    fn target() -> SwitchTarget {
        SwitchTarget::new("10.0.0.9", "ovsadmin", 22)
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let executor = ScriptedExecutor::new();
        let plan = plan();
        let results = apply_plan(&executor, &plan, &target(), &Credential::Agent).await.unwrap();
        assert_eq!(executor.executed().await, plan.command_lines());
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_tool_failure_is_recorded_and_continues() {
        let executor = ScriptedExecutor::new()
            .with_output("ovs-vsctl set Interface eth0 type=internal", "ovs-vsctl: no interface named eth0");
        let plan = plan();
        let results = apply_plan(&executor, &plan, &target(), &Credential::Agent).await.unwrap();
        assert_eq!(results.len(), 5);
        let failed: Vec<&CommandResult> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].command, "ovs-vsctl set Interface eth0 type=internal");
        assert_eq!(failed[0].error.as_deref(), Some("ovs-vsctl: no interface named eth0"));
        assert_eq!(failed[0].stdout, "ovs-vsctl: no interface named eth0");
        assert_eq!(executor.executed().await.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_command_keeps_raw_output() {
        let executor = ScriptedExecutor::new()
            .with_output("ovs-vsctl --may-exist add-port br0 eth0", "warning: context line\novs-vsctl: no bridge named br0\n")
            .with_failure("ovs-vsctl --may-exist add-port br0 eth1", "ovs-vsctl: no bridge named br0\nsee ovs-vsctl(8)\n", 1);
        let results = apply_plan(&executor, &plan(), &target(), &Credential::Agent).await.unwrap();

        let eth0 = &results[1];
        assert!(!eth0.success);
        assert_eq!(eth0.stdout, "warning: context line\novs-vsctl: no bridge named br0\n");
        assert_eq!(eth0.stderr, "");
        assert_eq!(eth0.error.as_deref(), Some("ovs-vsctl: no bridge named br0"));

        let eth1 = &results[3];
        assert_eq!(eth1.command, "ovs-vsctl --may-exist add-port br0 eth1");
        assert!(!eth1.success);
        assert_eq!(eth1.stderr, "ovs-vsctl: no bridge named br0\nsee ovs-vsctl(8)\n");
        assert!(results.iter().filter(|r| r.success).all(|r| r.error.is_none()));
    }

    #[tokio::test]
    async fn test_transport_failure_aborts() {
        let executor = ScriptedExecutor::new()
            .with_unreachable("ovs-vsctl --may-exist add-port br0 eth0", "connection closed");
        let result = apply_plan(&executor, &plan(), &target(), &Credential::Agent).await;
        assert!(matches!(result, Err(OvsBackupError::Transport { .. })));
        assert_eq!(executor.executed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reapplying_is_harmless() {
        // existence tolerant commands succeed against a switch that already matches
        let executor = ScriptedExecutor::new();
        let plan = plan();
        let first = apply_plan(&executor, &plan, &target(), &Credential::Agent).await.unwrap();
        let second = apply_plan(&executor, &plan, &target(), &Credential::Agent).await.unwrap();
        assert_eq!(first, second);
        assert!(plan.command_lines().iter().filter(|l| l.contains("add-")).all(|l| l.contains("--may-exist")));
    }
}
