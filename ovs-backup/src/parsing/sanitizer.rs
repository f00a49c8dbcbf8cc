use ovs_backup_schemas::settings::DenylistPolicy;
use ovs_backup_schemas::topology::is_unset_value;
use crate::error::{OvsBackupError, Result};

/// Error text printed by `ovs-vsctl`. A line carrying one of these is a failure whichever output
/// channel delivered it.
pub const TOOL_ERROR_MARKERS: [&str; 5] = [
    "no bridge named",
    "no port named",
    "no interface named",
    "does not exist",
    "does not contain a column",
];

/// Operational and telemetry columns that have no value when rebuilding a topology
pub const DENYLISTED_KEYS: [&str; 24] = [
    "statistics",
    "status",
    "link_state",
    "link_speed",
    "link_resets",
    "admin_state",
    "duplex",
    "ifindex",
    "mtu",
    "mtu_request",
    "lacp",
    "lacp_current",
    "bond_active_slave",
    "cfm_fault",
    "cfm_fault_status",
    "cfm_flap_count",
    "cfm_health",
    "cfm_mpid",
    "cfm_remote_mpids",
    "cfm_remote_opstate",
    "bfd",
    "bfd_status",
    "rstp_statistics",
    "rstp_status",
];

const PRIVILEGE_PROMPT_MARKER: &str = "[sudo]";

/// Returns true if the line carries `ovs-vsctl` error text. Marker phrases inside `key : value`
/// column data are values stored in the database, not errors.
pub fn is_tool_error_line(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    if lower.starts_with("ovs-vsctl:") {
        return true;
    }
    !is_column_line(&lower) && TOOL_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// A `column : value` line as printed by `ovs-vsctl list`
fn is_column_line(line: &str) -> bool {
    match line.split_once(':') {
        Some((key, _)) => {
            let key = key.trim();
            !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        None => false,
    }
}

/// The ids of rows in the OVS database printed on a line of their own, e.g. by `list-ports` on
/// some versions. These have no meaning on another host.
fn is_bare_identifier(line: &str) -> bool {
    line.len() == 36
        && line.contains('-')
        && line.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// Sanitized text plus the tool error lines that were taken out of it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedOutput {
    pub text: String,
    pub failures: Vec<String>,
}

impl SanitizedOutput {
    /// The text, or a `ToolReportedFailure` naming the command if any error line was found
    pub fn into_result(self, command: &str) -> Result<String> {
        if self.failures.is_empty() {
            return Ok(self.text);
        }
        Err(OvsBackupError::ToolReportedFailure {
            command: command.to_string(),
            message: self.failures.join("; "),
        })
    }
}

/// Strips session noise from the raw output of one command. The sanitizer is a pure line filter:
/// kept lines are returned unchanged and in order, so sanitizing sanitized text changes nothing.
/// Tool error lines never reach the text, they are reported as failures instead.
#[derive(Clone, Default)]
pub struct OutputSanitizer {
    policy: DenylistPolicy,
    principal: Option<String>,
    secret: Option<String>,
}

impl OutputSanitizer {
    pub fn new(policy: DenylistPolicy) -> Self {
        Self {
            policy,
            principal: None,
            secret: None,
        }
    }

    /// The login name, dropped when the session echoes it back
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// The password, dropped when the session echoes it back
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn sanitize(&self, raw: &str) -> SanitizedOutput {
        let mut kept = Vec::new();
        let mut failures = Vec::new();
        for line in raw.lines() {
            if is_tool_error_line(line) {
                failures.push(line.trim().to_string());
            } else if self.keep_line(line) {
                kept.push(line);
            }
        }
        SanitizedOutput {
            text: kept.join("\n"),
            failures,
        }
    }

    fn keep_line(&self, line: &str) -> bool {
        let stripped = line.trim();
        if stripped.is_empty() {
            return false;
        }
        if self.principal.as_deref().is_some_and(|p| stripped.eq(p)) {
            return false;
        }
        if self.secret.as_deref().is_some_and(|s| stripped.eq(s)) {
            return false;
        }
        if stripped.starts_with(PRIVILEGE_PROMPT_MARKER) || stripped.to_lowercase().ends_with("password:") {
            return false;
        }
        if is_bare_identifier(stripped) {
            return false;
        }
        if let Some((key, value)) = stripped.split_once(':') {
            let key = key.trim();
            if DENYLISTED_KEYS.contains(&key) {
                return match self.policy {
                    DenylistPolicy::DropAlways => false,
                    DenylistPolicy::DropIfEmpty => !is_unset_value(value),
                };
            }
        }
        true
    }
}
