use std::fmt;
use std::fmt::Formatter;
use std::path::PathBuf;
use async_trait::async_trait;
use crate::error::{OvsBackupError, Result};
use crate::parsing::sanitizer::is_tool_error_line;

pub mod ssh;
pub mod scripted;
pub mod capture;
pub mod restore;

/// Helper macro to convert Vec<&str> to Vec<String> to avoid having to keep writing `.to_string()`
#[macro_export]
macro_rules! vec_of_strings {
    ($($x:expr),*) => (vec![$($x.to_string()),*]);
}

pub const OVS_VSCTL: &str = "ovs-vsctl";

/// One command line to run on a switch, as an argument vector. The executor decides how the
/// arguments are quoted for the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvsCommand {
    args: Vec<String>,
}

impl OvsCommand {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
        }
    }

    /// `ovs-vsctl` followed by the given arguments
    pub fn ovs_vsctl(args: Vec<String>) -> Self {
        let mut full = vec_of_strings![OVS_VSCTL];
        full.extend(args);
        Self::new(full)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for OvsCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Raw output of one command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` if the process was ended by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }
    }
}

/// The host a command is run on and the account used to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchTarget {
    pub host: String,
    pub username: String,
    pub port: u16,
}

impl SwitchTarget {
    pub fn new(host: &str, username: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            port,
        }
    }

    /// Label used for snapshots of this host when the caller does not give one
    pub fn default_label(&self) -> String {
        format!("switch_{}", &self.host)
    }

    /// Both the host and the username can be handed to `ssh` as they are
    pub fn is_safe(&self) -> bool {
        is_safe_ssh_name(&self.host) && is_safe_ssh_name(&self.username)
    }
}

/// A host or user name that `ssh` cannot mistake for an option or split into several arguments.
/// Names come from requests.
pub fn is_safe_ssh_name(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.contains('@')
        && !value.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// How to authenticate against a switch. A password is used both for the login and for `sudo`.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    IdentityFile(PathBuf),
    /// rely on a running ssh agent or the default keys of the user running the server
    Agent,
}

impl Credential {
    pub fn password(&self) -> Option<&str> {
        match self {
            Credential::Password(password) => Some(password),
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::IdentityFile(path) => write!(f, "IdentityFile({path:?})"),
            Credential::Agent => f.write_str("Agent"),
        }
    }
}

/// Runs one command line per call against a switch and returns its raw output. Implementations
/// only fail with `Transport` errors: anything the tool itself printed is returned as output and
/// judged by `classify_output`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &OvsCommand,
        target: &SwitchTarget,
        credential: &Credential,
    ) -> Result<CommandOutput>;
}

/// Turn tool error text into a `ToolReportedFailure`. `ovs-vsctl` error text is looked for on both
/// channels since wrappers around the session can deliver it on stdout.
pub fn classify_output(command: &OvsCommand, output: CommandOutput) -> Result<CommandOutput> {
    let error_lines: Vec<&str> = output.stderr.lines()
        .chain(output.stdout.lines())
        .map(|l| l.trim())
        .filter(|l| is_tool_error_line(l))
        .collect();
    if !error_lines.is_empty() {
        return Err(OvsBackupError::ToolReportedFailure {
            command: command.to_string(),
            message: error_lines.join("; "),
        });
    }
    match output.exit_code {
        Some(0) => Ok(output),
        Some(code) => {
            let stderr = output.stderr.trim();
            let message = if stderr.is_empty() {
                format!("exited with status {code}")
            } else {
                stderr.to_string()
            };
            Err(OvsBackupError::ToolReportedFailure {
                command: command.to_string(),
                message,
            })
        }
        None => Err(OvsBackupError::ToolReportedFailure {
            command: command.to_string(),
            message: "terminated by a signal".to_string(),
        }),
    }
}

/// Execute and classify
pub async fn run_ovs_command(
    executor: &dyn RemoteExecutor,
    command: &OvsCommand,
    target: &SwitchTarget,
    credential: &Credential,
) -> Result<CommandOutput> {
    tracing::debug!("running on {}: {}", &target.host, command);
    let output = executor.execute(command, target, credential).await?;
    classify_output(command, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_bridge() -> OvsCommand {
        OvsCommand::ovs_vsctl(vec_of_strings!["list", "bridge"])
    }

    #[test]
    fn test_command_display() {
        assert_eq!(list_bridge().to_string(), "ovs-vsctl list bridge");
        assert_eq!(list_bridge().args().len(), 3);
    }

    #[test]
    fn test_marker_on_stdout_is_failure() {
        let output = CommandOutput::new("ovs-vsctl: no bridge named br9\n", "", 0);
        match classify_output(&list_bridge(), output) {
            Err(OvsBackupError::ToolReportedFailure { command, message }) => {
                assert_eq!(command, "ovs-vsctl list bridge");
                assert_eq!(message, "ovs-vsctl: no bridge named br9");
            }
            other => panic!("unexpected classification {other:?}"),
        }
    }

    #[test]
    fn test_marker_on_stderr_is_failure() {
        let output = CommandOutput::new("", "Interface eth9 does not exist", 1);
        assert!(matches!(
            classify_output(&list_bridge(), output),
            Err(OvsBackupError::ToolReportedFailure { .. })
        ));
    }

    #[test]
    fn test_clean_output_passes() {
        let output = CommandOutput::new("name : br0\n", "", 0);
        let classified = classify_output(&list_bridge(), output.clone()).unwrap();
        assert_eq!(classified, output);
    }

    #[test]
    fn test_non_zero_exit_without_marker() {
        let output = CommandOutput::new("", "", 2);
        match classify_output(&list_bridge(), output) {
            Err(OvsBackupError::ToolReportedFailure { message, .. }) => assert_eq!(message, "exited with status 2"),
            other => panic!("unexpected classification {other:?}"),
        }
    }

    #[test]
    fn test_ssh_names() {
        assert!(SwitchTarget::new("10.0.0.5", "ovsadmin", 22).is_safe());
        assert!(SwitchTarget::new("sw1.lab.example", "ovs-admin_2", 22).is_safe());
        assert!(!SwitchTarget::new("10.0.0.5", "-oProxyCommand=touch /tmp/x", 22).is_safe());
        assert!(!SwitchTarget::new("-oProxyCommand=id", "ovsadmin", 22).is_safe());
        assert!(!SwitchTarget::new("10.0.0.5 -v", "ovsadmin", 22).is_safe());
        assert!(!SwitchTarget::new("10.0.0.5", "root@evil", 22).is_safe());
        assert!(!SwitchTarget::new("10.0.0.5\n", "ovsadmin", 22).is_safe());
        assert!(!SwitchTarget::new("", "ovsadmin", 22).is_safe());
    }

    #[test]
    fn test_password_is_redacted() {
        let credential = Credential::Password("hunter2".into());
        assert!(!format!("{credential:?}").contains("hunter2"));
        assert_eq!(credential.password(), Some("hunter2"));
    }
}
