use serde::{Deserialize, Serialize};

/// Helper model to support the pretty=true query string to return configuration as pretty JSON
#[derive(Serialize, Deserialize)]
pub struct PrettyQueryParams {
    pub pretty: Option<bool>,
}

/// Query string for the plan endpoint
#[derive(Serialize, Deserialize, Default)]
pub struct PlanQueryParams {
    pub preserve_datapath_id: Option<bool>,
}

/// Request to capture the topology of a switch. If `bridge` is given only that bridge is captured.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct CaptureRequest {
    /// hostname or ip of the switch
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// label used in the backup file name, defaults to a label derived from the host
    pub label: Option<String>,
    pub bridge: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct CaptureResponse {
    pub file: String,
    pub bridges: usize,
    pub ports: usize,
    /// non fatal problems found while building the snapshot
    pub diagnostics: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct BackupList {
    pub files: Vec<String>,
}

/// Request to restore a stored snapshot onto a host, which does not need to be the host it was
/// captured from.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct RestoreRequest {
    pub file: String,
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub preserve_datapath_id: bool,
}

/// The outcome of running one command of a restore plan
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// why the command counts as failed, the raw output is kept in `stdout` and `stderr`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct RestoreResponse {
    pub results: Vec<CommandResult>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct RestorePlanResponse {
    pub file: String,
    pub commands: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct InspectRequest {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
}
