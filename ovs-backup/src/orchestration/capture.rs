use chrono::Utc;
use ovs_backup_schemas::settings::DenylistPolicy;
use ovs_backup_schemas::topology::{is_unset_value, Bridge, Interface, Port, Snapshot};
use crate::error::{OvsBackupError, Result};
use crate::orchestration::{run_ovs_command, Credential, OvsCommand, RemoteExecutor, SwitchTarget};
use crate::parsing::records::{strip_quotes, RecordParser};
use crate::parsing::sanitizer::OutputSanitizer;
use crate::parsing::topology::TopologyBuilder;
use crate::vec_of_strings;

/// A snapshot fresh from a switch, not yet stored
#[derive(Debug)]
pub struct CaptureOutcome {
    pub snapshot: Snapshot,
    pub diagnostics: Vec<OvsBackupError>,
}

/// Reads the topology of one switch through a `RemoteExecutor`. Nothing is written to the switch.
pub struct SwitchCapture<'a> {
    executor: &'a dyn RemoteExecutor,
    policy: DenylistPolicy,
}

impl<'a> SwitchCapture<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, policy: DenylistPolicy) -> Self {
        Self {
            executor,
            policy,
        }
    }

    /// Capture every bridge on the host from the bridge, port and interface tables. A failure on
    /// any of the three listings aborts the capture.
    pub async fn capture_full(
        &self,
        target: &SwitchTarget,
        credential: &Credential,
        label: Option<&str>,
    ) -> Result<CaptureOutcome> {
        let label = label.map(String::from).unwrap_or_else(|| target.default_label());
        tracing::info!("capturing full topology of {} as {}", &target.host, &label);

        let mut diagnostics = Vec::new();
        let mut tables = Vec::new();
        for table in ["bridge", "port", "interface"] {
            let text = self.run(vec_of_strings!["list", table], target, credential).await?;
            let parsed = RecordParser::new(table).parse(&text);
            diagnostics.extend(parsed.skipped);
            tables.push(parsed.records);
        }

        let outcome = TopologyBuilder::new(label, target.host.clone())
            .build(&tables[0], &tables[1], &tables[2], Utc::now());
        diagnostics.extend(outcome.diagnostics);
        for diagnostic in &diagnostics {
            tracing::warn!("capture of {}: {diagnostic}", &target.host);
        }
        Ok(CaptureOutcome {
            snapshot: outcome.snapshot,
            diagnostics,
        })
    }

    /// Capture a single bridge by asking for its ports by name. Every port gets one interface of
    /// the same name, whose type is left unset if it could not be read.
    pub async fn capture_bridge(
        &self,
        target: &SwitchTarget,
        credential: &Credential,
        bridge_name: &str,
        label: Option<&str>,
    ) -> Result<CaptureOutcome> {
        let label = label.unwrap_or(bridge_name).to_string();
        tracing::info!("capturing bridge {} of {} as {}", bridge_name, &target.host, &label);

        match self.run(vec_of_strings!["br-exists", bridge_name], target, credential).await {
            Ok(_) => {}
            Err(OvsBackupError::ToolReportedFailure { command, .. }) => {
                return Err(OvsBackupError::ToolReportedFailure {
                    command,
                    message: format!("bridge {bridge_name} does not exist"),
                });
            }
            Err(err) => return Err(err),
        }

        let listing = self.run(vec_of_strings!["list-ports", bridge_name], target, credential).await?;
        let port_names: Vec<String> = listing.lines()
            .map(|l| strip_quotes(l.trim()).to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let mut bridge = Bridge::new(bridge_name.to_string());
        let mut registry = Vec::new();
        for port_name in port_names {
            let iface_type = self.get_column(vec_of_strings!["get", "Interface", &port_name, "type"], target, credential).await?;
            let interface = Interface {
                name: port_name.clone(),
                iface_type,
                tag: None,
            };
            let mut port = Port::new(port_name);
            port.interfaces.push(interface.clone());
            bridge.ports.push(port);
            registry.push(interface);
        }
        bridge.datapath_id = self.get_column(vec_of_strings!["get", "Bridge", bridge_name, "datapath_id"], target, credential).await?;

        let mut snapshot = Snapshot::new(label, target.host.clone(), Utc::now());
        snapshot.bridges.push(bridge);
        snapshot.interfaces = registry;
        Ok(CaptureOutcome {
            snapshot,
            diagnostics: Vec::new(),
        })
    }

    /// The sanitized output of `ovs-vsctl show`
    pub async fn inspect(&self, target: &SwitchTarget, credential: &Credential) -> Result<String> {
        self.run(vec_of_strings!["show"], target, credential).await
    }

    /// A single column value, `None` if it is unset or the tool refused the lookup
    async fn get_column(
        &self,
        args: Vec<String>,
        target: &SwitchTarget,
        credential: &Credential,
    ) -> Result<Option<String>> {
        match self.run(args, target, credential).await {
            Ok(text) => {
                let value = strip_quotes(text.trim());
                Ok(if is_unset_value(value) { None } else { Some(value.to_string()) })
            }
            Err(err @ OvsBackupError::ToolReportedFailure { .. }) => {
                tracing::warn!("{err}, leaving it unset");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn run(&self, args: Vec<String>, target: &SwitchTarget, credential: &Credential) -> Result<String> {
        let command = OvsCommand::ovs_vsctl(args);
        let output = run_ovs_command(self.executor, &command, target, credential).await?;
        self.sanitizer(target, credential)
            .sanitize(&output.stdout)
            .into_result(&command.to_string())
    }

    fn sanitizer(&self, target: &SwitchTarget, credential: &Credential) -> OutputSanitizer {
        let sanitizer = OutputSanitizer::new(self.policy).with_principal(target.username.clone());
        match credential.password() {
            Some(password) => sanitizer.with_secret(password),
            None => sanitizer,
        }
    }
}
