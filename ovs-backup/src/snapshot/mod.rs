pub mod restore;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use ovs_backup_schemas::topology::{Snapshot, SNAPSHOT_FORMAT_VERSION};
use crate::error::{OvsBackupError, Result};

const SNAPSHOT_EXTENSION: &str = "yaml";

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Render a snapshot as the persisted YAML document
pub fn to_document(snapshot: &Snapshot) -> Result<String> {
    serde_yaml::to_string(snapshot).map_err(|err| OvsBackupError::MalformedSnapshot {
        source_name: snapshot.switch_name.clone(),
        message: format!("could not render: {err}"),
    })
}

/// Parse a persisted YAML document. A document with no bridges is a valid empty snapshot, one
/// without a `bridges` key is not.
pub fn from_document(source_name: &str, text: &str) -> Result<Snapshot> {
    let snapshot: Snapshot = serde_yaml::from_str(text).map_err(|err| OvsBackupError::MalformedSnapshot {
        source_name: source_name.to_string(),
        message: err.to_string(),
    })?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(OvsBackupError::MalformedSnapshot {
            source_name: source_name.to_string(),
            message: format!(
                "format version {} is not supported, expected {}",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION,
            ),
        });
    }
    Ok(snapshot)
}

/// Make a switch label safe to use in a file name
pub fn sanitize_label(label: &str) -> String {
    // replace awkward characters with "-"
    let label = label.trim().replace(&['(', ')', ',', '\"', '.', ';', ':', '\'', ' ', '/', '\\'][..], "-");
    if label.is_empty() {
        "switch".to_string()
    } else {
        label
    }
}

/// Snapshot documents in a folder, one file per capture. Files are only ever created whole and
/// never rewritten.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    backup_folder: PathBuf,
}

impl SnapshotStore {
    pub fn new(backup_folder: PathBuf) -> Self {
        Self {
            backup_folder,
        }
    }

    pub fn backup_folder(&self) -> &Path {
        &self.backup_folder
    }

    /// `<label>_backup_<YYYYmmdd_HHMMSS_micros>.yaml`, microseconds so that back to back captures of
    /// the same switch get different names
    pub fn file_name_for(label: &str, captured_at: DateTime<Utc>) -> String {
        format!(
            "{}_backup_{}.{SNAPSHOT_EXTENSION}",
            sanitize_label(label),
            captured_at.format("%Y%m%d_%H%M%S_%6f"),
        )
    }

    /// Write the snapshot and return its file name. The document is rendered and written to a
    /// hidden temp file first, then linked into place, so readers never see a partial file and an
    /// existing snapshot is never replaced.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<String> {
        let captured_at = snapshot.captured_at.unwrap_or_else(Utc::now);
        let name = Self::file_name_for(&snapshot.switch_name, captured_at);
        let document = to_document(snapshot)?;

        tokio::fs::create_dir_all(&self.backup_folder).await
            .map_err(|err| OvsBackupError::io(&self.backup_folder, err))?;

        let final_path = self.backup_folder.join(&name);
        let temp_path = self.backup_folder.join(format!(
            ".{name}.{}.{}.partial",
            std::process::id(),
            TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed),
        ));
        tokio::fs::write(&temp_path, document.as_bytes()).await
            .map_err(|err| OvsBackupError::io(&temp_path, err))?;

        let linked = tokio::fs::hard_link(&temp_path, &final_path).await;
        if let Err(err) = tokio::fs::remove_file(&temp_path).await {
            tracing::warn!("could not remove temp file {:?}: {err:#}", &temp_path);
        }
        match linked {
            Ok(_) => {
                tracing::info!("saved snapshot {} with {} bridges", &name, snapshot.bridges.len());
                Ok(name)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(OvsBackupError::SnapshotExists { name }),
            Err(err) => Err(OvsBackupError::io(&final_path, err)),
        }
    }

    pub async fn load(&self, name: &str) -> Result<Snapshot> {
        let path = self.path_for(name)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(OvsBackupError::SnapshotNotFound { name: name.to_string() });
            }
            Err(err) => return Err(OvsBackupError::io(&path, err)),
        };
        from_document(name, &text)
    }

    /// Snapshot file names, sorted. A backup folder that does not exist yet holds no snapshots.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut paths = match tokio::fs::read_dir(&self.backup_folder).await {
            Ok(paths) => paths,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(OvsBackupError::io(&self.backup_folder, err)),
        };

        let mut names = Vec::new();
        loop {
            let entry = paths.next_entry().await
                .map_err(|err| OvsBackupError::io(&self.backup_folder, err))?;
            let Some(entry) = entry else {
                break;
            };
            let file = entry.path();
            let is_snapshot = file.extension().is_some_and(|e| e == SNAPSHOT_EXTENSION);
            if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
                // ignore temp files
                if is_snapshot && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(_) => {
                tracing::info!("deleted snapshot {}", name);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(OvsBackupError::SnapshotNotFound { name: name.to_string() }),
            Err(err) => Err(OvsBackupError::io(&path, err)),
        }
    }

    /// Names come from requests, anything that could leave the backup folder is rejected
    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let invalid = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.contains("..");
        if invalid {
            return Err(OvsBackupError::InvalidSnapshotName { name: name.to_string() });
        }
        Ok(self.backup_folder.join(name))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use ovs_backup_schemas::topology::{Bridge, Interface, Port};
    use super::*;

    fn sample_snapshot() -> Snapshot {
        let captured_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let mut snapshot = Snapshot::new("switch_10.0.0.5".into(), "10.0.0.5".into(), captured_at);
        let mut interface = Interface::new("eth0".into());
        interface.iface_type = Some("internal".into());
        let mut port = Port::new("eth0".into());
        port.tag = Some("10".into());
        port.interfaces.push(interface.clone());
        let mut bridge = Bridge::new("br0".into());
        bridge.datapath_id = Some("0000aabbccddeeff".into());
        bridge.ports.push(port);
        snapshot.bridges.push(bridge);
        snapshot.bridges.push(Bridge::new("br1".into()));
        snapshot.interfaces.push(interface);
        snapshot
    }

    #[test]
    fn test_document_round_trip() {
        let snapshot = sample_snapshot();
        let document = to_document(&snapshot).unwrap();
        assert_eq!(from_document("sample", &document).unwrap(), snapshot);
    }

    #[test]
    fn test_document_field_order() {
        let document = to_document(&sample_snapshot()).unwrap();
        let position = |key: &str| document.find(key).unwrap();
        assert!(position("switch_name") < position("switch_ip"));
        assert!(position("switch_ip") < position("captured_at"));
        assert!(position("captured_at") < position("bridges"));
        assert!(position("bridges") < position("\ninterfaces"));
    }

    #[test]
    fn test_malformed_documents() {
        let missing_bridges = "switch_name: sw\nswitch_ip: 10.0.0.5\n";
        assert!(matches!(from_document("a", missing_bridges), Err(OvsBackupError::MalformedSnapshot { .. })));
        let wrong_type = "switch_name: sw\nbridges: not-a-list\n";
        assert!(matches!(from_document("b", wrong_type), Err(OvsBackupError::MalformedSnapshot { .. })));
        let future_version = "switch_name: sw\nformat_version: 2\nbridges: []\n";
        assert!(matches!(from_document("c", future_version), Err(OvsBackupError::MalformedSnapshot { .. })));
    }

    #[test]
    fn test_empty_bridges_is_valid() {
        let snapshot = from_document("empty", "switch_name: sw\nbridges: []\n").unwrap();
        assert!(snapshot.bridges.is_empty());
        assert_eq!(snapshot.switch_ip, "localhost");
    }

    #[test]
    fn test_file_name() {
        let captured_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            SnapshotStore::file_name_for("switch_10.0.0.5", captured_at),
            "switch_10-0-0-5_backup_20240301_123005_000000.yaml"
        );
        assert_eq!(sanitize_label("../etc"), "---etc");
        assert_eq!(sanitize_label("  "), "switch");
    }

    #[tokio::test]
    async fn test_save_load_list_delete() {
        let folder = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(folder.path().join("backup"));
        assert!(store.list().await.unwrap().is_empty());

        let snapshot = sample_snapshot();
        let name = store.save(&snapshot).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![name.clone()]);
        assert_eq!(store.load(&name).await.unwrap(), snapshot);

        store.delete(&name).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(store.load(&name).await, Err(OvsBackupError::SnapshotNotFound { .. })));
        assert!(matches!(store.delete(&name).await, Err(OvsBackupError::SnapshotNotFound { .. })));
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let folder = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(folder.path().to_path_buf());
        let snapshot = sample_snapshot();
        let name = store.save(&snapshot).await.unwrap();

        let mut changed = snapshot.clone();
        changed.bridges.clear();
        assert!(matches!(store.save(&changed).await, Err(OvsBackupError::SnapshotExists { .. })));
        assert_eq!(store.load(&name).await.unwrap(), snapshot);
        // no temp files left behind
        let entries = std::fs::read_dir(folder.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_back_to_back_saves_differ() {
        let folder = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(folder.path().to_path_buf());
        let mut first = sample_snapshot();
        first.captured_at = Some(Utc::now());
        let mut second = sample_snapshot();
        second.captured_at = Some(first.captured_at.unwrap() + chrono::Duration::microseconds(1));
        let a = store.save(&first).await.unwrap();
        let b = store.save(&second).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let folder = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(folder.path().to_path_buf());
        for name in ["../server.json", "a/b.yaml", "..", "", ".hidden.yaml"] {
            assert!(matches!(store.load(name).await, Err(OvsBackupError::InvalidSnapshotName { .. })));
            assert!(matches!(store.delete(name).await, Err(OvsBackupError::InvalidSnapshotName { .. })));
        }
    }

    #[tokio::test]
    async fn test_list_ignores_other_files() {
        let folder = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("notes.txt"), "x").unwrap();
        std::fs::write(folder.path().join("b_backup_1.yaml"), "bridges: []\n").unwrap();
        std::fs::write(folder.path().join("a_backup_1.yaml"), "bridges: []\n").unwrap();
        let store = SnapshotStore::new(folder.path().to_path_buf());
        assert_eq!(store.list().await.unwrap(), vec!["a_backup_1.yaml", "b_backup_1.yaml"]);
    }
}
