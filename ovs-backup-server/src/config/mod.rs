use std::sync::Arc;
use axum::Router;
use axum::routing::get;
use crate::AppState;
use crate::config::handlers::get_server_config;

pub mod handlers;

pub fn add_config_handlers() -> Router<Arc<AppState>> {
    Router::new()
        .route("/config", get(get_server_config))
}
