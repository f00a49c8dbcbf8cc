use std::collections::HashMap;
use std::sync::Arc;
use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use tokio::sync::Mutex;
use ovs_backup_lib::OvsBackupError;
use ovs_backup_lib::orchestration::{is_safe_ssh_name, Credential, RemoteExecutor, SwitchTarget};
use ovs_backup_lib::snapshot::SnapshotStore;
use ovs_backup_schemas::settings::ServerConfig;
use crate::actions::{add_action_handlers, ActionLog};
use crate::backups::add_backup_handlers;
use crate::config::add_config_handlers;

pub mod actions;
pub mod backups;
pub mod config;
pub mod logging;

/// Store a version of the backup server when compiled
pub const PROJECT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Store some state for the handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub store: SnapshotStore,
    pub executor: Arc<dyn RemoteExecutor>,
    pub action_log: Arc<ActionLog>,
    /// one lock per snapshot label, so two captures of the same switch do not run at once
    capture_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        executor: Arc<dyn RemoteExecutor>,
        action_log: Arc<ActionLog>,
    ) -> Self {
        Self {
            store: SnapshotStore::new(config.backup_folder.clone()),
            config,
            executor,
            action_log,
            capture_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn capture_lock(&self, label: &str) -> Arc<Mutex<()>> {
        let mut locks = self.capture_locks.lock().await;
        locks.entry(label.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Hand back a lock taken with `capture_lock`, the entry is dropped once no other capture of
    /// the label holds or waits on it
    pub async fn release_capture_lock(&self, label: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.capture_locks.lock().await;
        // the map and this caller hold the last two references
        if Arc::strong_count(&lock) == 2 {
            locks.remove(label);
        }
    }

    /// The target for a request, the username falls back to the one in the server config
    pub fn switch_target(&self, host: &str, username: Option<&str>) -> Result<SwitchTarget, RequestError> {
        let username = username
            .or(self.config.ssh.username.as_deref())
            .ok_or_else(|| RequestError::MissingUsername { host: host.to_string() })?;
        if !is_safe_ssh_name(host) {
            return Err(RequestError::InvalidTarget { field: "host", value: host.to_string() });
        }
        if !is_safe_ssh_name(username) {
            return Err(RequestError::InvalidTarget { field: "username", value: username.to_string() });
        }
        Ok(SwitchTarget::new(host, username, self.config.ssh.port))
    }

    /// A password in the request wins, then the configured key, then the ssh agent
    pub fn credential(&self, password: Option<String>) -> Credential {
        match (password, &self.config.ssh.identity_file) {
            (Some(password), _) => Credential::Password(password),
            (None, Some(identity_file)) => Credential::IdentityFile(identity_file.clone()),
            (None, None) => Credential::Agent,
        }
    }
}

/// Problems with a request that are caught before any switch is contacted
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("no username given for {host} and none configured for the server")]
    MissingUsername { host: String },
    #[error("invalid {field} {value:?}, it must not be empty, start with '-' or contain '@' or whitespace")]
    InvalidTarget { field: &'static str, value: String },
    #[error("invalid date {0}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// This is a generic error handling struct to be used by the handlers. Errors from the backup
/// library are mapped to a status code, anything else is a 500.
pub struct AppError(anyhow::Error);

impl AppError {
    fn status_code(&self) -> StatusCode {
        if self.0.downcast_ref::<RequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<OvsBackupError>() {
            Some(OvsBackupError::MalformedSnapshot { .. })
            | Some(OvsBackupError::InvalidSnapshotName { .. }) => StatusCode::BAD_REQUEST,
            Some(OvsBackupError::SnapshotNotFound { .. }) => StatusCode::NOT_FOUND,
            Some(OvsBackupError::SnapshotExists { .. }) => StatusCode::CONFLICT,
            Some(OvsBackupError::Transport { .. })
            | Some(OvsBackupError::ToolReportedFailure { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:#}", self.0);
            return (status, format!("Something went wrong: {}", self.0)).into_response();
        }
        tracing::warn!("request failed with {status}: {:#}", self.0);
        (status, format!("{:#}", self.0)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Produce the app in a separate function to allow for testing without creating an http server.
pub fn backup_app(app_state: Arc<AppState>) -> Router {
    let api = add_backup_handlers()
        .merge(add_action_handlers())
        .merge(add_config_handlers());
    Router::new()
        .nest("/api", api)
        .with_state(app_state)
}
