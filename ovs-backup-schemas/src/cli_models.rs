use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable read for the switch password when `--password` is not given
pub const PASSWORD_ENV_VAR: &str = "OVS_BACKUP_PASSWORD";

#[derive(Parser)]
#[command(version = "1.0", about = "Capture and restore Open vSwitch topologies")]
pub struct Opts {
    #[arg(short, long)]
    pub verbosity: Option<String>,
    #[command(subcommand)]
    pub sub_command: SubCommand,
    #[arg(
    long,
    default_value = "http://localhost:3356/",
    help = "Specify the URL to the backup server"
    )]
    pub server_connection: String,
}

#[derive(Subcommand, Debug, Deserialize, Serialize)]
pub enum SubCommand {
    #[command(about = "Capture the topology of a switch into a new backup")]
    Capture(CaptureCmd),
    #[command(about = "List the backups stored on the server")]
    List,
    #[command(about = "Print a stored backup")]
    Show(BackupFileCmd),
    #[command(about = "Print the restore plan of a stored backup")]
    Plan(PlanCmd),
    #[command(about = "Print the restore plan of a local backup file without contacting the server")]
    PlanLocal(PlanLocalCmd),
    #[command(about = "Restore a stored backup onto a switch")]
    Restore(RestoreCmd),
    #[command(about = "Delete a stored backup")]
    Delete(BackupFileCmd),
    #[command(about = "Show the current switch configuration as reported by ovs-vsctl show")]
    Inspect(TargetArgs),
}

impl SubCommand {
    pub fn name(&self) -> String {
        match &self {
            SubCommand::Capture(_) => "capture".into(),
            SubCommand::List => "list".into(),
            SubCommand::Show(_) => "show".into(),
            SubCommand::Plan(_) => "plan".into(),
            SubCommand::PlanLocal(_) => "plan local".into(),
            SubCommand::Restore(_) => "restore".into(),
            SubCommand::Delete(_) => "delete".into(),
            SubCommand::Inspect(_) => "inspect".into(),
        }
    }

    /// Commands that work on local files only
    pub fn is_offline(&self) -> bool {
        matches!(self, SubCommand::PlanLocal(_))
    }
}

/// Connection details for a switch
#[derive(Args, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetArgs {
    #[clap(long, help = "Hostname or ip of the switch")]
    pub host: String,
    #[clap(long, short, help = "SSH user, defaults to the server configuration")]
    pub user: Option<String>,
    #[clap(long, help = "SSH and sudo password, also read from OVS_BACKUP_PASSWORD")]
    pub password: Option<String>,
}

impl TargetArgs {
    pub fn resolve_password(&self) -> Option<String> {
        self.password.clone()
            .or_else(|| std::env::var(PASSWORD_ENV_VAR).ok())
    }
}

#[derive(Args, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CaptureCmd {
    #[command(flatten)]
    pub target: TargetArgs,
    #[clap(long, help = "Label used in the backup file name")]
    pub label: Option<String>,
    #[clap(long, help = "Only capture this bridge")]
    pub bridge: Option<String>,
}

#[derive(Args, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BackupFileCmd {
    #[clap(help = "Backup file name as listed by the server")]
    pub file: String,
}

#[derive(Args, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PlanCmd {
    #[clap(help = "Backup file name as listed by the server")]
    pub file: String,
    #[clap(long, action, help = "Also restore the datapath id of each bridge")]
    pub preserve_datapath_id: bool,
}

#[derive(Args, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PlanLocalCmd {
    #[clap(help = "Path to a backup yaml file")]
    pub path: PathBuf,
    #[clap(long, action, help = "Also restore the datapath id of each bridge")]
    pub preserve_datapath_id: bool,
}

#[derive(Args, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RestoreCmd {
    #[clap(help = "Backup file name as listed by the server")]
    pub file: String,
    #[command(flatten)]
    pub target: TargetArgs,
    #[clap(long, action, help = "Also restore the datapath id of each bridge")]
    pub preserve_datapath_id: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture() {
        let opts = Opts::parse_from([
            "ovs-backup", "capture", "--host", "10.0.0.5", "--user", "ovsadmin", "--bridge", "br0",
        ]);
        match opts.sub_command {
            SubCommand::Capture(cmd) => {
                assert_eq!(cmd.target.host, "10.0.0.5");
                assert_eq!(cmd.target.user, Some("ovsadmin".to_string()));
                assert_eq!(cmd.bridge, Some("br0".to_string()));
                assert!(cmd.label.is_none());
            }
            _ => panic!("expected capture"),
        }
        assert_eq!(opts.server_connection, "http://localhost:3356/");
    }

    #[test]
    fn test_parse_plan_local_is_offline() {
        let opts = Opts::parse_from([
            "ovs-backup", "plan-local", "backup/br0.yaml", "--preserve-datapath-id",
        ]);
        assert!(opts.sub_command.is_offline());
        assert_eq!(opts.sub_command.name(), "plan local");
    }
}
