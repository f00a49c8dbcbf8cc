use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::level_filters;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_appender::non_blocking::WorkerGuard;
use crate::actions::ActionLog;

pub async fn configure_logging(
    log_folder: &Path,
) -> WorkerGuard {
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_thread_names(true);

    match tokio::fs::create_dir_all(log_folder).await {
        Ok(_) => {}
        Err(err) => match err.kind() {
            ErrorKind::PermissionDenied => {
                panic!("permission denied creating log folder {log_folder:?}, is the server running as root?");
            }
            _ => eprintln!("could not create log folder {log_folder:?}: {err:#}"),
        },
    }

    let file_appender = tracing_appender::rolling::daily(log_folder, "server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    #[cfg(debug_assertions)]
    let log_level = level_filters::LevelFilter::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = level_filters::LevelFilter::INFO;

    let file_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(log_level);

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(log_level)
                .and_then(file_log),
        )
        .init();
    guard
}

/// Every action taken by the server is appended to a daily file under `<root>/log/actions/`. This
/// cron job removes the files older than the configured retention, once a day.
pub async fn setup_action_log_cleanup(
    action_log: Arc<ActionLog>,
    retention_days: i64,
) -> anyhow::Result<()> {
    let sched = JobScheduler::new().await?;
    sched.add(
        Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let action_log = action_log.clone();
            Box::pin(async move {
                tracing::debug!("running action log cleanup");
                match action_log.cleanup(retention_days, Utc::now().date_naive()).await {
                    Ok(deleted) => tracing::info!("action log cleanup removed {} files", deleted.len()),
                    Err(err) => tracing::error!("action log cleanup error: {err:#}"),
                }
            })
        })?
    ).await?;
    sched.start().await?;
    Ok(())
}
