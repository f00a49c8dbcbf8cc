use std::fmt;
use std::fmt::Formatter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current version of the persisted snapshot document. Documents written by older tooling carry
/// no version and are read as version 1.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Values that `ovs-vsctl` prints for a column that has not been set. The literal `""` arrives
/// both quoted and, after quote stripping, as an empty string.
const UNSET_SENTINELS: [&str; 4] = ["", "\"\"", "[]", "{}"];

/// Returns true if a raw column value means "not set" rather than carrying data.
pub fn is_unset_value(value: &str) -> bool {
    UNSET_SENTINELS.contains(&value.trim())
}

/// Filter an optional column value down to one that actually carries data.
pub fn effective(value: &Option<String>) -> Option<&str> {
    match value {
        Some(v) if !is_unset_value(v) => Some(v.trim()),
        _ => None,
    }
}

/// A captured, immutable representation of the Open vSwitch topology of one host at one point in
/// time. This is the document persisted in the backup folder, the field order here is the field
/// order of the document.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Snapshot {
    /// label of the switch that was captured, used to name the backup file
    #[serde(default)]
    pub switch_name: String,
    /// host the snapshot was captured from
    #[serde(default = "default_switch_ip")]
    pub switch_ip: String,
    /// optional so that backups written before timestamps were recorded can still be loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub bridges: Vec<Bridge>,
    /// flat registry of every interface seen at capture time, used to resolve port names when the
    /// port's own record is incomplete
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

fn default_switch_ip() -> String {"localhost".to_string()}
fn default_format_version() -> u32 {SNAPSHOT_FORMAT_VERSION}

impl Snapshot {
    pub fn new(
        switch_name: String,
        switch_ip: String,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            switch_name,
            switch_ip,
            captured_at: Some(captured_at),
            format_version: SNAPSHOT_FORMAT_VERSION,
            bridges: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    pub fn bridge(&self, name: &str) -> Option<&Bridge> {
        self.bridges.iter().find(|b| b.name.eq(name))
    }

    /// Look up an interface in the flat registry by name
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name.eq(name))
    }

    pub fn port_count(&self) -> usize {
        self.bridges.iter().map(|b| b.ports.len()).sum()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string_pretty(&self).unwrap())
            .expect("snapshot to json via serde failed");
        Ok(())
    }
}

/// A virtual switch instance. Ports keep the order in which the bridge listed them so that two
/// captures of the same host produce identical documents.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Bridge {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapath_id: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl Bridge {
    pub fn new(name: String) -> Self {
        Self {
            name,
            datapath_id: None,
            ports: Vec::new(),
        }
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name.eq(name))
    }

    pub fn effective_datapath_id(&self) -> Option<&str> {
        effective(&self.datapath_id)
    }
}

/// An attachment point on a bridge. Most ports carry a single interface of the same name, bonds
/// carry several.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Port {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// only written by the bridge scoped capture of older tooling, where the type of the
    /// name-aligned interface was stored on the port
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub port_type: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

impl Port {
    pub fn new(name: String) -> Self {
        Self {
            name,
            tag: None,
            port_type: None,
            interfaces: Vec::new(),
        }
    }

    pub fn effective_tag(&self) -> Option<&str> {
        effective(&self.tag)
    }

    pub fn effective_type(&self) -> Option<&str> {
        effective(&self.port_type)
    }
}

/// The lowest level network endpoint bound to a port. An unset type is a system interface.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Interface {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub iface_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Interface {
    pub fn new(name: String) -> Self {
        Self {
            name,
            iface_type: None,
            tag: None,
        }
    }

    pub fn effective_type(&self) -> Option<&str> {
        effective(&self.iface_type)
    }

    pub fn effective_tag(&self) -> Option<&str> {
        effective(&self.tag)
    }
}
