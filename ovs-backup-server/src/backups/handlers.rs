use std::sync::Arc;
use axum::extract::{Path, Query, State};
use axum::{Json, response::IntoResponse};
use axum_extra::response::ErasedJson;
use ovs_backup_lib::orchestration::capture::{CaptureOutcome, SwitchCapture};
use ovs_backup_lib::orchestration::restore::apply_plan;
use ovs_backup_lib::orchestration::{Credential, SwitchTarget};
use ovs_backup_lib::snapshot::restore::{PlanOptions, RestorePlanner};
use ovs_backup_schemas::action_models::{ActionEntry, ActionStatus};
use ovs_backup_schemas::handlers::{
    BackupList, CaptureRequest, CaptureResponse, InspectRequest, PlanQueryParams, PrettyQueryParams,
    RestorePlanResponse, RestoreRequest, RestoreResponse,
};
use crate::{AppError, AppState};

fn action_status<T, E>(result: &Result<T, E>) -> ActionStatus {
    match result {
        Ok(_) => ActionStatus::Success,
        Err(_) => ActionStatus::Error,
    }
}

/// Capture a switch and store the snapshot. Captures of the same switch label are serialized so
/// they cannot race for the same file name.
pub async fn capture_backup(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CaptureRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = run_capture(&app_state, &request).await;

    let mut entry = ActionEntry::new(format!("capture {}", &request.host), action_status(&result))
        .with_metadata("host", request.host.clone());
    match &result {
        Ok(response) => entry = entry.with_metadata("file", response.file.clone()),
        Err(err) => entry = entry.with_metadata("error", format!("{err:#}")),
    }
    app_state.action_log.record(entry).await;

    Ok(Json(result?))
}

async fn run_capture(
    app_state: &AppState,
    request: &CaptureRequest,
) -> anyhow::Result<CaptureResponse> {
    let target = app_state.switch_target(&request.host, request.username.as_deref())?;
    let credential = app_state.credential(request.password.clone());
    let label = request.label.clone()
        .or_else(|| request.bridge.clone())
        .unwrap_or_else(|| target.default_label());

    let lock = app_state.capture_lock(&label).await;
    let outcome = {
        let _guard = lock.lock().await;
        capture_and_save(app_state, &target, &credential, request.bridge.as_deref(), &label).await
    };
    app_state.release_capture_lock(&label, lock).await;
    outcome
}

async fn capture_and_save(
    app_state: &AppState,
    target: &SwitchTarget,
    credential: &Credential,
    bridge: Option<&str>,
    label: &str,
) -> anyhow::Result<CaptureResponse> {
    let capture = SwitchCapture::new(app_state.executor.as_ref(), app_state.config.sanitizer.denylist_policy);
    let CaptureOutcome { snapshot, diagnostics } = match bridge {
        Some(bridge) => capture.capture_bridge(target, credential, bridge, Some(label)).await?,
        None => capture.capture_full(target, credential, Some(label)).await?,
    };
    let file = app_state.store.save(&snapshot).await?;

    Ok(CaptureResponse {
        file,
        bridges: snapshot.bridges.len(),
        ports: snapshot.port_count(),
        diagnostics: diagnostics.iter().map(|d| d.to_string()).collect(),
    })
}

pub async fn list_backups(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let files = app_state.store.list().await?;
    Ok(Json(BackupList { files }))
}

pub async fn get_backup(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<PrettyQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = app_state.store.load(&name).await?;
    // format json with pretty formatting if query parameter present and true
    if let Some(true) = params.pretty {
        return Ok(ErasedJson::pretty(snapshot));
    }
    Ok(ErasedJson::new(snapshot))
}

pub async fn delete_backup(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = app_state.store.delete(&name).await;
    let entry = ActionEntry::new(format!("delete {name}"), action_status(&result))
        .with_metadata("file", name.clone());
    app_state.action_log.record(entry).await;
    result?;
    Ok(())
}

/// The commands a restore of the backup would run, nothing is executed
pub async fn get_restore_plan(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<PlanQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = app_state.store.load(&name).await?;
    let planner = RestorePlanner::new(PlanOptions {
        preserve_datapath_id: params.preserve_datapath_id.unwrap_or(false),
    });
    let plan = planner.plan(&snapshot, &snapshot.switch_ip);
    Ok(Json(RestorePlanResponse {
        file: name,
        commands: plan.command_lines(),
    }))
}

pub async fn restore_backup(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<RestoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = run_restore(&app_state, &request).await;

    let mut entry = ActionEntry::new(format!("restore {}", &request.host), action_status(&result))
        .with_metadata("host", request.host.clone())
        .with_metadata("file", request.file.clone());
    match &result {
        Ok(response) => {
            let failed = response.results.iter().filter(|r| !r.success).count();
            entry = entry.with_metadata("failed_commands", failed.to_string());
        }
        Err(err) => entry = entry.with_metadata("error", format!("{err:#}")),
    }
    app_state.action_log.record(entry).await;

    Ok(Json(result?))
}

async fn run_restore(
    app_state: &AppState,
    request: &RestoreRequest,
) -> anyhow::Result<RestoreResponse> {
    let target = app_state.switch_target(&request.host, request.username.as_deref())?;
    let credential = app_state.credential(request.password.clone());
    let snapshot = app_state.store.load(&request.file).await?;
    let plan = RestorePlanner::new(PlanOptions {
        preserve_datapath_id: request.preserve_datapath_id,
    }).plan(&snapshot, &target.host);
    let results = apply_plan(app_state.executor.as_ref(), &plan, &target, &credential).await?;
    Ok(RestoreResponse { results })
}

/// The sanitized `ovs-vsctl show` output of a switch
pub async fn inspect_switch(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<InspectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = app_state.switch_target(&request.host, request.username.as_deref())?;
    let credential = app_state.credential(request.password.clone());
    let capture = SwitchCapture::new(app_state.executor.as_ref(), app_state.config.sanitizer.denylist_policy);
    let text = capture.inspect(&target, &credential).await?;
    Ok(text)
}
