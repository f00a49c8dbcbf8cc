use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::error::{OvsBackupError, Result};
use crate::orchestration::{CommandOutput, Credential, OvsCommand, RemoteExecutor, SwitchTarget};

enum ScriptedResponse {
    Output(CommandOutput),
    Unreachable(String),
}

/// Executor that replays canned output keyed by the command line and records what it was asked to
/// run. Commands with no canned output succeed with empty output. Used to test capture and restore
/// without a switch.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: HashMap<String, ScriptedResponse>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, command_line: &str, stdout: &str) -> Self {
        self.responses.insert(command_line.to_string(), ScriptedResponse::Output(CommandOutput::new(stdout, "", 0)));
        self
    }

    pub fn with_failure(mut self, command_line: &str, stderr: &str, exit_code: i32) -> Self {
        self.responses.insert(command_line.to_string(), ScriptedResponse::Output(CommandOutput::new("", stderr, exit_code)));
        self
    }

    /// The command fails as if the session to the host dropped
    pub fn with_unreachable(mut self, command_line: &str, message: &str) -> Self {
        self.responses.insert(command_line.to_string(), ScriptedResponse::Unreachable(message.to_string()));
        self
    }

    /// Command lines executed so far, in order
    pub async fn executed(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command: &OvsCommand,
        target: &SwitchTarget,
        _credential: &Credential,
    ) -> Result<CommandOutput> {
        let command_line = command.to_string();
        self.executed.lock().await.push(command_line.clone());
        match self.responses.get(&command_line) {
            Some(ScriptedResponse::Output(output)) => Ok(output.clone()),
            Some(ScriptedResponse::Unreachable(message)) => Err(OvsBackupError::Transport {
                host: target.host.clone(),
                command: command_line,
                message: message.clone(),
            }),
            None => Ok(CommandOutput::new("", "", 0)),
        }
    }
}
