use std::collections::HashMap;
use chrono::{DateTime, Utc};
use ovs_backup_schemas::topology::{is_unset_value, Bridge, Interface, Port, Snapshot};
use crate::error::OvsBackupError;
use crate::parsing::records::{parse_identifier_list, RawRecord};

const UUID_COLUMN: &str = "_uuid";
const NAME_COLUMN: &str = "name";
const PORTS_COLUMN: &str = "ports";
const INTERFACES_COLUMN: &str = "interfaces";
const TYPE_COLUMN: &str = "type";
const TAG_COLUMN: &str = "tag";
const DATAPATH_ID_COLUMN: &str = "datapath_id";

/// A built snapshot and the problems that made it smaller or less precise than the listings
#[derive(Debug)]
pub struct BuildOutcome {
    pub snapshot: Snapshot,
    pub diagnostics: Vec<OvsBackupError>,
}

/// Correlates the bridge, port and interface listings of one host into a `Snapshot`.
///
/// Bridges list their ports by row id. A port's name is resolved from, in order, the port row with
/// that id, the interface row with that id, and finally the id itself. The id is kept rather than
/// dropped so that the restore plan still has a slot for the port.
///
/// Ports and their interfaces usually share a name. Interfaces are attached to the port of the
/// same name when the port's own row did not list them, and that is only a heuristic: an
/// interface with no such port is still kept in the flat registry of the snapshot.
pub struct TopologyBuilder {
    switch_name: String,
    switch_ip: String,
}

impl TopologyBuilder {
    pub fn new(switch_name: String, switch_ip: String) -> Self {
        Self {
            switch_name,
            switch_ip,
        }
    }

    pub fn build(
        &self,
        bridges: &[RawRecord],
        ports: &[RawRecord],
        interfaces: &[RawRecord],
        captured_at: DateTime<Utc>,
    ) -> BuildOutcome {
        let mut diagnostics = Vec::new();

        // row id lookups
        let port_rows: HashMap<&str, &RawRecord> = ports.iter()
            .filter_map(|r| r.get(UUID_COLUMN).map(|id| (id.as_str(), r)))
            .collect();
        let interface_names: HashMap<&str, &str> = interfaces.iter()
            .filter_map(|r| Some((r.get(UUID_COLUMN)?.as_str(), column(r, NAME_COLUMN)?)))
            .collect();

        let registry: Vec<Interface> = interfaces.iter()
            .filter_map(|r| {
                let name = column(r, NAME_COLUMN)?;
                Some(Interface {
                    name: name.to_string(),
                    iface_type: column(r, TYPE_COLUMN).map(String::from),
                    tag: column(r, TAG_COLUMN).map(String::from),
                })
            })
            .collect();
        let registry_by_name: HashMap<&str, &Interface> = registry.iter()
            .map(|i| (i.name.as_str(), i))
            .collect();

        let mut snapshot = Snapshot::new(self.switch_name.clone(), self.switch_ip.clone(), captured_at);

        for (index, bridge_row) in bridges.iter().enumerate() {
            let Some(bridge_name) = column(bridge_row, NAME_COLUMN) else {
                tracing::warn!("bridge record {index} on {} has no name, skipping", &self.switch_name);
                diagnostics.push(OvsBackupError::UnnamedBridge { index });
                continue;
            };
            let mut bridge = Bridge::new(bridge_name.to_string());
            bridge.datapath_id = column(bridge_row, DATAPATH_ID_COLUMN).map(String::from);

            let port_ids = bridge_row.get(PORTS_COLUMN)
                .map(|v| parse_identifier_list(v))
                .unwrap_or_default();
            for port_id in port_ids {
                let port_row = port_rows.get(port_id.as_str()).copied();
                let port_name = port_row
                    .and_then(|r| column(r, NAME_COLUMN))
                    .or_else(|| interface_names.get(port_id.as_str()).copied());
                let port_name = match port_name {
                    Some(name) => name.to_string(),
                    None => {
                        tracing::warn!("port {} on bridge {} did not resolve to a name", &port_id, bridge_name);
                        diagnostics.push(OvsBackupError::UnresolvedReference {
                            owner: format!("bridge {bridge_name}"),
                            identifier: port_id.clone(),
                        });
                        port_id.clone()
                    }
                };

                let mut port = Port::new(port_name);
                if let Some(port_row) = port_row {
                    port.tag = column(port_row, TAG_COLUMN).map(String::from);
                    let interface_ids = port_row.get(INTERFACES_COLUMN)
                        .map(|v| parse_identifier_list(v))
                        .unwrap_or_default();
                    for interface_id in interface_ids {
                        let interface = match interface_names.get(interface_id.as_str()) {
                            Some(name) => registry_by_name.get(name)
                                .map(|i| (*i).clone())
                                .unwrap_or_else(|| Interface::new(name.to_string())),
                            None => {
                                tracing::warn!("interface {} on port {} did not resolve to a name", &interface_id, &port.name);
                                diagnostics.push(OvsBackupError::UnresolvedReference {
                                    owner: format!("port {}", &port.name),
                                    identifier: interface_id.clone(),
                                });
                                Interface::new(interface_id)
                            }
                        };
                        port.interfaces.push(interface);
                    }
                }
                bridge.ports.push(port);
            }
            snapshot.bridges.push(bridge);
        }

        // name aligned interfaces
        for interface in &registry {
            for bridge in snapshot.bridges.iter_mut() {
                for port in bridge.ports.iter_mut().filter(|p| p.name.eq(&interface.name)) {
                    if !port.interfaces.iter().any(|i| i.name.eq(&interface.name)) {
                        port.interfaces.push(interface.clone());
                    }
                    if port.tag.is_none() {
                        port.tag = interface.tag.clone();
                    }
                }
            }
        }

        snapshot.interfaces = registry;

        tracing::debug!(
            "built snapshot of {} with {} bridges and {} ports, {} diagnostics",
            &self.switch_name, snapshot.bridges.len(), snapshot.port_count(), diagnostics.len(),
        );
        BuildOutcome {
            snapshot,
            diagnostics,
        }
    }
}

/// A column value that carries data, `[]`, `{}` and `""` read as absent
fn column<'a>(record: &'a RawRecord, key: &str) -> Option<&'a str> {
    record.get(key)
        .map(|v| v.trim())
        .filter(|v| !is_unset_value(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::records::RecordParser;

    fn records(table: &str, text: &str) -> Vec<RawRecord> {
        RecordParser::new(table).parse(text).records
    }

    fn builder() -> TopologyBuilder {
        TopologyBuilder::new("switch_10_0_0_5".into(), "10.0.0.5".into())
    }

    #[test]
    fn test_two_bridges_one_port() {
        let bridges = records("bridge", "name: \"br0\"\nports: [abcd-1]\n\nname: \"br1\"\nports: []\n");
        let ports = records("port", "_uuid: abcd-1\nname: eth0\n");
        let outcome = builder().build(&bridges, &ports, &[], Utc::now());
        let snapshot = outcome.snapshot;
        assert_eq!(snapshot.bridges.len(), 2);
        assert_eq!(snapshot.bridges[0].name, "br0");
        assert_eq!(snapshot.bridges[0].ports.len(), 1);
        assert_eq!(snapshot.bridges[0].ports[0].name, "eth0");
        assert_eq!(snapshot.bridges[1].name, "br1");
        assert!(snapshot.bridges[1].ports.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_port_name_from_interface_registry() {
        let bridges = records("bridge", "name: br0\nports: [xyz-2]");
        let ports = records("port", "_uuid: xyz-2\ntag: []");
        let interfaces = records("interface", "_uuid: xyz-2\nname: ens4\ntype: \"\"");
        let outcome = builder().build(&bridges, &ports, &interfaces, Utc::now());
        assert_eq!(outcome.snapshot.bridges[0].ports[0].name, "ens4");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_unresolved_port_keeps_identifier() {
        let bridges = records("bridge", "name: br0\nports: [qrs-3]");
        let outcome = builder().build(&bridges, &[], &[], Utc::now());
        assert_eq!(outcome.snapshot.bridges[0].ports[0].name, "qrs-3");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(matches!(
            &outcome.diagnostics[0],
            OvsBackupError::UnresolvedReference { identifier, .. } if identifier == "qrs-3"
        ));
    }

    #[test]
    fn test_every_port_slot_is_named() {
        let bridges = records("bridge", "name: br0\nports: [p1, p2, p3]\nname: br1\nports: [p4]");
        let ports = records("port", "_uuid: p1\nname: eth0\n_uuid: p2\n_uuid: p4\nname: \"\"");
        let interfaces = records("interface", "_uuid: p2\nname: eth1");
        let outcome = builder().build(&bridges, &ports, &interfaces, Utc::now());
        let names: Vec<&str> = outcome.snapshot.bridges.iter()
            .flat_map(|b| b.ports.iter().map(|p| p.name.as_str()))
            .collect();
        assert_eq!(names, vec!["eth0", "eth1", "p3", "p4"]);
        assert!(names.iter().all(|n| !n.is_empty()));
    }

    #[test]
    fn test_unnamed_bridge_is_skipped() {
        let bridges = records("bridge", "_uuid: b1\nports: []\n\nname: br1\nports: []");
        let outcome = builder().build(&bridges, &[], &[], Utc::now());
        assert_eq!(outcome.snapshot.bridges.len(), 1);
        assert_eq!(outcome.snapshot.bridges[0].name, "br1");
        assert!(matches!(outcome.diagnostics[0], OvsBackupError::UnnamedBridge { index: 0 }));
    }

    #[test]
    fn test_ovs_vsctl_listing() {
        let bridges = records("bridge", "_uuid               : b-1\n\
datapath_id         : \"0000aabbccddeeff\"\n\
name                : br-int\n\
ports               : [p-1, p-2]");
        let ports = records("port", "_uuid               : p-1\n\
interfaces          : [i-1]\n\
name                : br-int\n\
tag                 : []\n\
_uuid               : p-2\n\
interfaces          : [i-2]\n\
name                : vm1\n\
tag                 : 20");
        let interfaces = records("interface", "_uuid               : i-1\n\
name                : br-int\n\
type                : internal\n\
_uuid               : i-2\n\
name                : vm1\n\
type                : \"\"");
        let outcome = builder().build(&bridges, &ports, &interfaces, Utc::now());
        assert!(outcome.diagnostics.is_empty());
        let bridge = outcome.snapshot.bridge("br-int").unwrap();
        assert_eq!(bridge.datapath_id.as_deref(), Some("0000aabbccddeeff"));
        let br_int = bridge.port("br-int").unwrap();
        assert_eq!(br_int.tag, None);
        assert_eq!(br_int.interfaces.len(), 1);
        assert_eq!(br_int.interfaces[0].iface_type.as_deref(), Some("internal"));
        let vm1 = bridge.port("vm1").unwrap();
        assert_eq!(vm1.tag.as_deref(), Some("20"));
        assert_eq!(vm1.interfaces.len(), 1);
        assert_eq!(vm1.interfaces[0].iface_type, None);
        assert_eq!(outcome.snapshot.interfaces.len(), 2);
    }

    #[test]
    fn test_name_aligned_interface_attached() {
        // the port row does not list interfaces, the interface row shares its name
        let bridges = records("bridge", "name: br0\nports: [p-1]");
        let ports = records("port", "_uuid: p-1\nname: tap0");
        let interfaces = records("interface", "_uuid: i-9\nname: tap0\ntype: tap\ntag: 30\n_uuid: i-10\nname: orphan0");
        let outcome = builder().build(&bridges, &ports, &interfaces, Utc::now());
        let port = outcome.snapshot.bridges[0].port("tap0").unwrap();
        assert_eq!(port.interfaces.len(), 1);
        assert_eq!(port.interfaces[0].iface_type.as_deref(), Some("tap"));
        assert_eq!(port.tag.as_deref(), Some("30"));
        // no port of that name, still in the registry
        assert!(outcome.snapshot.interface("orphan0").is_some());
    }
}
