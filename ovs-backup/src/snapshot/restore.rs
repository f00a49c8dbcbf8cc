use std::collections::HashSet;
use ovs_backup_schemas::topology::{Port, Snapshot};
use crate::orchestration::OvsCommand;
use crate::vec_of_strings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// also restore the datapath id of each bridge, off by default since two bridges with the same
    /// datapath id confuse an OpenFlow controller
    pub preserve_datapath_id: bool,
}

/// One idempotent change to a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStep {
    CreateBridge {
        bridge: String,
    },
    SetDatapathId {
        bridge: String,
        datapath_id: String,
    },
    AttachPort {
        bridge: String,
        port: String,
    },
    SetInterfaceType {
        interface: String,
        iface_type: String,
    },
    SetPortTag {
        port: String,
        tag: String,
    },
}

impl RestoreStep {
    pub fn command(&self) -> OvsCommand {
        let args = match self {
            RestoreStep::CreateBridge { bridge } => vec_of_strings!["--may-exist", "add-br", bridge],
            RestoreStep::SetDatapathId { bridge, datapath_id } => {
                vec_of_strings!["set", "Bridge", bridge, format!("other-config:datapath-id={datapath_id}")]
            }
            RestoreStep::AttachPort { bridge, port } => vec_of_strings!["--may-exist", "add-port", bridge, port],
            RestoreStep::SetInterfaceType { interface, iface_type } => {
                vec_of_strings!["set", "Interface", interface, format!("type={iface_type}")]
            }
            RestoreStep::SetPortTag { port, tag } => vec_of_strings!["set", "Port", port, format!("tag={tag}")],
        };
        OvsCommand::ovs_vsctl(args)
    }
}

/// The ordered steps that rebuild a snapshot on a target host. Order is load bearing: a bridge
/// comes before its ports and a port before the settings of its interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    pub target_host: String,
    pub steps: Vec<RestoreStep>,
}

impl RestorePlan {
    pub fn commands(&self) -> Vec<OvsCommand> {
        self.steps.iter().map(|s| s.command()).collect()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.command().to_string()).collect()
    }
}

/// Synthesizes restore plans. Planning is pure, nothing is executed here.
#[derive(Debug, Default)]
pub struct RestorePlanner {
    options: PlanOptions,
}

impl RestorePlanner {
    pub fn new(options: PlanOptions) -> Self {
        Self {
            options,
        }
    }

    pub fn plan(&self, snapshot: &Snapshot, target_host: &str) -> RestorePlan {
        let mut steps = Vec::new();
        let mut typed_interfaces = HashSet::new();

        for bridge in &snapshot.bridges {
            steps.push(RestoreStep::CreateBridge {
                bridge: bridge.name.clone(),
            });
            if self.options.preserve_datapath_id {
                if let Some(datapath_id) = bridge.effective_datapath_id() {
                    steps.push(RestoreStep::SetDatapathId {
                        bridge: bridge.name.clone(),
                        datapath_id: datapath_id.to_string(),
                    });
                }
            }

            for port in &bridge.ports {
                steps.push(RestoreStep::AttachPort {
                    bridge: bridge.name.clone(),
                    port: port.name.clone(),
                });
                for (interface, iface_type) in interface_types(port) {
                    if typed_interfaces.insert(interface.clone()) {
                        steps.push(RestoreStep::SetInterfaceType {
                            interface,
                            iface_type,
                        });
                    }
                }
                if let Some(tag) = port_tag(port) {
                    steps.push(RestoreStep::SetPortTag {
                        port: port.name.clone(),
                        tag: tag.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            "planned {} steps to restore {} onto {}",
            steps.len(), &snapshot.switch_name, target_host,
        );
        RestorePlan {
            target_host: target_host.to_string(),
            steps,
        }
    }
}

/// Interface name and type pairs that need a type set. Older bridge scoped backups stored the
/// type on the port, it belongs to the interface of the same name.
fn interface_types(port: &Port) -> Vec<(String, String)> {
    if port.interfaces.is_empty() {
        return port.effective_type()
            .map(|t| vec![(port.name.clone(), t.to_string())])
            .unwrap_or_default();
    }
    port.interfaces.iter()
        .filter_map(|i| Some((i.name.clone(), i.effective_type()?.to_string())))
        .collect()
}

fn port_tag(port: &Port) -> Option<&str> {
    port.effective_tag().or_else(|| {
        port.interfaces.iter()
            .find(|i| i.name.eq(&port.name))
            .and_then(|i| i.effective_tag())
    })
}
