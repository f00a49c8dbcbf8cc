use std::fmt::Formatter;
use tokio::fs::File;
use std::path::{Path, PathBuf};
use std::fmt;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use crate::OVS_BACKUP_SETTINGS_FOLDER;

/// This is the configuration of the backup server. Every field has a default so a partially filled
/// `server.json` is valid, and a missing file means the server runs on the defaults.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// address the http server listens on
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// folder the snapshot documents are written to
    #[serde(default = "default_backup_folder")]
    pub backup_folder: PathBuf,
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub sanitizer: SanitizerSettings,
    /// action log files older than this are removed by the cleanup job
    #[serde(default = "default_action_log_retention_days")]
    pub action_log_retention_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            listen_port: default_listen_port(),
            backup_folder: default_backup_folder(),
            ssh: SshSettings::default(),
            sanitizer: SanitizerSettings::default(),
            action_log_retention_days: default_action_log_retention_days(),
        }
    }
}

fn default_listen_ip() -> String {"0.0.0.0".to_string()}
fn default_listen_port() -> u16 {3356}
fn default_backup_folder() -> PathBuf {PathBuf::from(format!("{OVS_BACKUP_SETTINGS_FOLDER}backup/"))}
fn default_action_log_retention_days() -> i64 {30}

/// How the server reaches a switch. Nothing here names a host: the target is always part of the
/// request.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SshSettings {
    /// user for requests that do not name one
    #[serde(default)]
    pub username: Option<String>,
    /// private key used when the request carries no password
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            username: None,
            identity_file: None,
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_ssh_port() -> u16 {22}
fn default_connect_timeout_secs() -> u64 {10}

/// Whether telemetry columns in the denylist are dropped only when they are empty, or always.
/// Historical backups were captured with both behaviours.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenylistPolicy {
    #[default]
    DropIfEmpty,
    DropAlways,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SanitizerSettings {
    #[serde(default)]
    pub denylist_policy: DenylistPolicy,
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string_pretty(&self).unwrap())
            .expect("server config to json via serde failed");
        Ok(())
    }
}

impl ServerConfig {
    pub fn default_location() -> PathBuf {
        PathBuf::from(format!("{OVS_BACKUP_SETTINGS_FOLDER}config/server.json"))
    }

    pub async fn write(&self, path: &Path) -> anyhow::Result<()> {
        let mut output = File::create(path).await?;
        output.write_all(format!("{self}").as_bytes()).await?;
        Ok(())
    }

    /// Read the config from the given location. If the file does not exist the defaults are
    /// returned, a file that exists but does not parse is an error.
    pub async fn read(path: &Path) -> anyhow::Result<ServerConfig> {
        tracing::trace!("expected server config json location: {:?}", path);
        if path.is_file() {
            let text = tokio::fs::read_to_string(path).await?;
            let config: ServerConfig = serde_json::from_str(&text)
                .context(format!("parsing server config at {path:?}"))?;
            Ok(config)
        } else {
            tracing::warn!("no server config at {:?}, using defaults", path);
            Ok(ServerConfig::default())
        }
    }

    pub fn action_log_folder() -> PathBuf {
        PathBuf::from(format!("{OVS_BACKUP_SETTINGS_FOLDER}log/actions/"))
    }
}
