use std::sync::Arc;
use axum::Router;
use axum::routing::*;
use crate::AppState;
use crate::backups::handlers::*;

pub mod handlers;

pub fn add_backup_handlers() -> Router<Arc<AppState>> {
    Router::new()
        .route("/backups", get(list_backups).post(capture_backup))
        .route("/backups/:name", get(get_backup).delete(delete_backup))
        .route("/backups/:name/plan", get(get_restore_plan))
        .route("/restore", post(restore_backup))
        .route("/inspect", post(inspect_switch))
}
