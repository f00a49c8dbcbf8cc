use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use chrono::{DateTime, Utc};

/// Outcome recorded for an action
#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    #[default]
    Success,
    Error,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Success => f.write_str("SUCCESS"),
            ActionStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// One line of the action log. Actions are written by the server for every capture, restore and
/// delete, and can be posted by clients.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ActionEntry {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ActionEntry {
    pub fn new(action: String, status: ActionStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            status,
            metadata: Default::default(),
        }
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ActionEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.timestamp.to_rfc3339(), self.status, self.action)
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct ActionQueryParams {
    /// YYYY-MM-DD, defaults to today
    pub date: Option<String>,
    pub limit: Option<usize>,
}

/// Summary over the most recent actions
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ActionStats {
    pub total_actions: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// keyed by the first word of the action
    pub action_types: BTreeMap<String, usize>,
    pub recent_actions: Vec<ActionEntry>,
}
