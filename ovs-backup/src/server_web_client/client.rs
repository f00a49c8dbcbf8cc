use anyhow::Context;
use reqwest::Client;
use ovs_backup_schemas::cli_models::{Opts, PlanLocalCmd, SubCommand};
use ovs_backup_schemas::handlers::{CaptureRequest, CommandResult, InspectRequest, RestoreRequest};
use crate::server_web_client::http_actions;
use crate::snapshot::from_document;
use crate::snapshot::restore::{PlanOptions, RestorePlanner};

/// Run a CLI command against the backup server and print the result
pub async fn backup_action(
    client: &Client,
    opts: &Opts,
) -> anyhow::Result<()> {
    let server_url = opts.server_connection.as_str();
    tracing::debug!("running {} command", opts.sub_command.name());

    match &opts.sub_command {
        SubCommand::Capture(cmd) => {
            let request = CaptureRequest {
                host: cmd.target.host.clone(),
                username: cmd.target.user.clone(),
                password: cmd.target.resolve_password(),
                label: cmd.label.clone(),
                bridge: cmd.bridge.clone(),
            };
            let response = http_actions::capture_backup(client, server_url, &request).await?;
            for diagnostic in &response.diagnostics {
                tracing::warn!("{diagnostic}");
            }
            println!("saved {} ({} bridges, {} ports)", &response.file, response.bridges, response.ports);
        }
        SubCommand::List => {
            let list = http_actions::list_backups(client, server_url).await?;
            for file in list.files {
                println!("{file}");
            }
        }
        SubCommand::Show(cmd) => {
            let snapshot = http_actions::get_backup(client, server_url, &cmd.file).await?;
            println!("{snapshot}");
        }
        SubCommand::Plan(cmd) => {
            let plan = http_actions::get_restore_plan(client, server_url, &cmd.file, cmd.preserve_datapath_id).await?;
            for command in plan.commands {
                println!("{command}");
            }
        }
        SubCommand::Restore(cmd) => {
            let request = RestoreRequest {
                file: cmd.file.clone(),
                host: cmd.target.host.clone(),
                username: cmd.target.user.clone(),
                password: cmd.target.resolve_password(),
                preserve_datapath_id: cmd.preserve_datapath_id,
            };
            let response = http_actions::restore_backup(client, server_url, &request).await?;
            print_restore_results(&response.results);
        }
        SubCommand::Delete(cmd) => {
            http_actions::delete_backup(client, server_url, &cmd.file).await?;
            println!("deleted {}", &cmd.file);
        }
        SubCommand::Inspect(target) => {
            let request = InspectRequest {
                host: target.host.clone(),
                username: target.user.clone(),
                password: target.resolve_password(),
            };
            println!("{}", http_actions::inspect_switch(client, server_url, &request).await?);
        }
        SubCommand::PlanLocal(cmd) => {
            for command in plan_local(cmd).await? {
                println!("{command}");
            }
        }
    }
    Ok(())
}

/// Plan a restore from a backup file on disk, without the server
pub async fn plan_local(cmd: &PlanLocalCmd) -> anyhow::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(&cmd.path).await
        .context(format!("reading backup file {:?}", &cmd.path))?;
    let snapshot = from_document(&cmd.path.display().to_string(), &text)?;
    let planner = RestorePlanner::new(PlanOptions {
        preserve_datapath_id: cmd.preserve_datapath_id,
    });
    Ok(planner.plan(&snapshot, &snapshot.switch_ip).command_lines())
}

fn print_restore_results(results: &[CommandResult]) {
    let failed = results.iter().filter(|r| !r.success).count();
    for result in results {
        let status = if result.success { "ok" } else { "FAILED" };
        println!("[{status}] {}", &result.command);
        if !result.success {
            let reason = result.error.as_deref().unwrap_or(result.stderr.trim());
            println!("    {reason}");
        }
    }
    println!("{} commands, {} failed", results.len(), failed);
}
