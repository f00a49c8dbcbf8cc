use std::sync::Arc;
use axum::extract::{Query, State};
use axum::{Json, response::IntoResponse};
use chrono::NaiveDate;
use ovs_backup_schemas::action_models::{ActionEntry, ActionQueryParams};
use crate::{AppError, AppState, RequestError};

/// Record an action taken by a client
pub async fn post_action(
    State(app_state): State<Arc<AppState>>,
    Json(entry): Json<ActionEntry>,
) -> Result<impl IntoResponse, AppError> {
    app_state.action_log.append(&entry).await?;
    Ok(())
}

/// Entries of one day, newest first, today if no date is given
pub async fn get_actions(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ActionQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let date = match &params.date {
        Some(date) => Some(
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| RequestError::InvalidDate(date.clone()))?,
        ),
        None => None,
    };
    let entries = app_state.action_log.get_entries(date, params.limit).await?;
    Ok(Json(entries))
}

pub async fn get_action_stats(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let stats = app_state.action_log.stats().await?;
    Ok(Json(stats))
}
