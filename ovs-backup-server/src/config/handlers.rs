use std::sync::Arc;
use crate::{AppError, AppState};
use axum::response::IntoResponse;
use axum::extract::{Query, State};
use axum_extra::response::ErasedJson;
use ovs_backup_schemas::handlers::PrettyQueryParams;

/// The configuration the server was started with
pub async fn get_server_config(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<PrettyQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    // format json with pretty formatting if query parameter present and true
    if let Some(true) = params.pretty {
        return Ok(ErasedJson::pretty(&app_state.config));
    }
    Ok(ErasedJson::new(&app_state.config))
}
