use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use axum::Router;
use axum::routing::*;
use chrono::{Duration, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use ovs_backup_schemas::action_models::{ActionEntry, ActionStats, ActionStatus};
use crate::AppState;
use crate::actions::handlers::*;

pub mod handlers;

pub fn add_action_handlers() -> Router<Arc<AppState>> {
    Router::new()
        .route("/actions", get(get_actions).post(post_action))
        .route("/actions/stats", get(get_action_stats))
}

lazy_static! {
    static ref ACTION_LOG_FILE: Regex = Regex::new(r"^actions_(\d{4}-\d{2}-\d{2})\.log$").unwrap();
}

/// Number of entries the stats are computed over
const STATS_WINDOW: usize = 100;
const STATS_RECENT: usize = 5;

/// Append only log of the actions taken by the server, one JSON document per line and one file per
/// day under `<root>/log/actions/`.
pub struct ActionLog {
    folder: PathBuf,
    write_lock: Mutex<()>,
}

impl ActionLog {
    pub fn new(folder: PathBuf) -> Self {
        Self {
            folder,
            write_lock: Mutex::new(()),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.folder.join(format!("actions_{}.log", date.format("%Y-%m-%d")))
    }

    pub async fn append(&self, entry: &ActionEntry) -> anyhow::Result<()> {
        let line = format!("{}\n", serde_json::to_string(entry)?);
        let path = self.file_for(entry.timestamp.date_naive());
        // keep concurrent writers from interleaving lines
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.folder).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Append, logging rather than returning a failure. A broken action log must not fail the
    /// action it describes.
    pub async fn record(&self, entry: ActionEntry) {
        tracing::info!("{entry}");
        if let Err(err) = self.append(&entry).await {
            tracing::error!("could not write to action log at {:?}: {err:#}", &self.folder);
        }
    }

    /// Entries of one day, newest first. Lines that do not parse are skipped.
    pub async fn get_entries(&self, date: Option<NaiveDate>, limit: Option<usize>) -> anyhow::Result<Vec<ActionEntry>> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let mut entries = self.read_file(&self.file_for(date)).await?;
        entries.reverse();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Summary over the most recent entries across all days
    pub async fn stats(&self) -> anyhow::Result<ActionStats> {
        let mut recent = Vec::new();
        for (_, file_name) in self.log_files().await?.into_iter().rev() {
            let mut entries = self.read_file(&self.folder.join(file_name)).await?;
            entries.reverse();
            recent.extend(entries);
            if recent.len() >= STATS_WINDOW {
                break;
            }
        }
        recent.truncate(STATS_WINDOW);

        let mut action_types = BTreeMap::new();
        for entry in &recent {
            let action_type = entry.action.split_whitespace().next().unwrap_or("unknown").to_string();
            *action_types.entry(action_type).or_insert(0) += 1;
        }
        let success_count = recent.iter().filter(|e| e.status == ActionStatus::Success).count();
        Ok(ActionStats {
            total_actions: recent.len(),
            success_count,
            error_count: recent.len() - success_count,
            action_types,
            recent_actions: recent.iter().take(STATS_RECENT).cloned().collect(),
        })
    }

    /// Delete the log files of days older than the retention, returns the deleted file names
    pub async fn cleanup(&self, retention_days: i64, today: NaiveDate) -> anyhow::Result<Vec<String>> {
        let cutoff = today - Duration::days(retention_days);
        let mut deleted = Vec::new();
        for (date, file_name) in self.log_files().await? {
            if date < cutoff {
                tracing::info!("action log {} older than {} days, deleting", &file_name, retention_days);
                match tokio::fs::remove_file(self.folder.join(&file_name)).await {
                    Ok(_) => deleted.push(file_name),
                    Err(err) => tracing::error!("could not delete {file_name} with err: {err:#}"),
                }
            } else {
                tracing::debug!("action log {} within retention, will not delete", &file_name);
            }
        }
        Ok(deleted)
    }

    /// Action log files with the date in their name, oldest first
    async fn log_files(&self) -> anyhow::Result<Vec<(NaiveDate, String)>> {
        let mut paths = match tokio::fs::read_dir(&self.folder).await {
            Ok(paths) => paths,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = paths.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            // if it does not have a date in the name, ignore it
            let Some(captures) = ACTION_LOG_FILE.captures(&file_name) else {
                tracing::warn!("action log file did not match regex: {}", &file_name);
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d") {
                files.push((date, file_name));
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<ActionEntry>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(text.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str::<ActionEntry>(l) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!("skipping malformed action log line in {:?}: {err}", path);
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use super::*;

    fn entry_on(day: u32, action: &str, status: ActionStatus) -> ActionEntry {
        let mut entry = ActionEntry::new(action.to_string(), status);
        entry.timestamp = Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap();
        entry
    }

    #[tokio::test]
    async fn test_entries_newest_first() {
        let folder = tempfile::tempdir().unwrap();
        let log = ActionLog::new(folder.path().join("actions"));
        for action in ["capture sw1", "restore sw1", "delete sw1"] {
            log.append(&entry_on(1, action, ActionStatus::Success)).await.unwrap();
        }
        let date = NaiveDate::from_ymd_opt(2024, 3, 1);
        let entries = log.get_entries(date, None).await.unwrap();
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["delete sw1", "restore sw1", "capture sw1"]);
        assert_eq!(log.get_entries(date, Some(1)).await.unwrap().len(), 1);
        assert!(log.get_entries(NaiveDate::from_ymd_opt(2024, 3, 2), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let folder = tempfile::tempdir().unwrap();
        let log = ActionLog::new(folder.path().to_path_buf());
        log.append(&entry_on(1, "capture sw1", ActionStatus::Success)).await.unwrap();
        let path = folder.path().join("actions_2024-03-01.log");
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("not json\n");
        std::fs::write(&path, text).unwrap();
        let entries = log.get_entries(NaiveDate::from_ymd_opt(2024, 3, 1), None).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let folder = tempfile::tempdir().unwrap();
        let log = ActionLog::new(folder.path().to_path_buf());
        log.append(&entry_on(1, "capture sw1", ActionStatus::Success)).await.unwrap();
        log.append(&entry_on(2, "capture sw2", ActionStatus::Error)).await.unwrap();
        log.append(&entry_on(2, "restore sw1", ActionStatus::Success)).await.unwrap();
        let stats = log.stats().await.unwrap();
        assert_eq!(stats.total_actions, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.action_types.get("capture"), Some(&2));
        assert_eq!(stats.action_types.get("restore"), Some(&1));
        assert_eq!(stats.recent_actions[0].action, "restore sw1");
    }

    #[tokio::test]
    async fn test_cleanup() {
        let folder = tempfile::tempdir().unwrap();
        let log = ActionLog::new(folder.path().to_path_buf());
        log.append(&entry_on(1, "capture sw1", ActionStatus::Success)).await.unwrap();
        log.append(&entry_on(20, "capture sw1", ActionStatus::Success)).await.unwrap();
        std::fs::write(folder.path().join("unrelated.txt"), "x").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 25).unwrap();
        let deleted = log.cleanup(14, today).await.unwrap();
        assert_eq!(deleted, vec!["actions_2024-03-01.log"]);
        assert!(folder.path().join("actions_2024-03-20.log").exists());
        assert!(folder.path().join("unrelated.txt").exists());
    }
}
