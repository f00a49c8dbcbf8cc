use anyhow::bail;
use ovs_backup_schemas::handlers::{
    BackupList, CaptureRequest, CaptureResponse, InspectRequest, RestorePlanResponse,
    RestoreRequest, RestoreResponse,
};
use ovs_backup_schemas::topology::Snapshot;
use reqwest::Response;

/// Reusable helper method for parsing the response from the server for command results
async fn parse_response(resp: Response, command_name: &str) -> anyhow::Result<String> {
    let http_code = resp.status();
    let text_response = resp.text().await?;

    if http_code.is_success() {
        tracing::debug!("{command_name} command successful");
    } else {
        tracing::error!(
            "command was not successful with code {:?}",
            http_code.to_string()
        );
        // exit cli with error as we cannot continue
        bail!("server response: {}", text_response);
    }
    Ok(text_response)
}

/// Ask the server to capture a switch into a new backup
pub async fn capture_backup(
    client: &reqwest::Client,
    server_url: &str,
    request: &CaptureRequest,
) -> anyhow::Result<CaptureResponse> {
    tracing::info!("capturing switch '{}'", &request.host);
    let server_api = format!("{server_url}api/backups");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.post(server_api).json(request).send().await?;
    let text = parse_response(resp, "capture").await?;
    Ok(serde_json::from_str(&text)?)
}

pub async fn list_backups(
    client: &reqwest::Client,
    server_url: &str,
) -> anyhow::Result<BackupList> {
    let server_api = format!("{server_url}api/backups");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.get(server_api).send().await?;
    let text = parse_response(resp, "list").await?;
    Ok(serde_json::from_str(&text)?)
}

pub async fn get_backup(
    client: &reqwest::Client,
    server_url: &str,
    file: &str,
) -> anyhow::Result<Snapshot> {
    let server_api = format!("{server_url}api/backups/{file}");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.get(server_api).send().await?;
    let text = parse_response(resp, "show").await?;
    Ok(serde_json::from_str(&text)?)
}

pub async fn get_restore_plan(
    client: &reqwest::Client,
    server_url: &str,
    file: &str,
    preserve_datapath_id: bool,
) -> anyhow::Result<RestorePlanResponse> {
    let server_api = format!("{server_url}api/backups/{file}/plan");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.get(server_api)
        .query(&[("preserve_datapath_id", preserve_datapath_id)])
        .send()
        .await?;
    let text = parse_response(resp, "plan").await?;
    Ok(serde_json::from_str(&text)?)
}

pub async fn restore_backup(
    client: &reqwest::Client,
    server_url: &str,
    request: &RestoreRequest,
) -> anyhow::Result<RestoreResponse> {
    tracing::info!("restoring '{}' onto '{}'", &request.file, &request.host);
    let server_api = format!("{server_url}api/restore");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.post(server_api).json(request).send().await?;
    let text = parse_response(resp, "restore").await?;
    Ok(serde_json::from_str(&text)?)
}

pub async fn delete_backup(
    client: &reqwest::Client,
    server_url: &str,
    file: &str,
) -> anyhow::Result<()> {
    tracing::info!("deleting backup '{file}'");
    let server_api = format!("{server_url}api/backups/{file}");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.delete(server_api).send().await?;
    parse_response(resp, "delete").await?;
    Ok(())
}

/// The sanitized `ovs-vsctl show` output of a switch
pub async fn inspect_switch(
    client: &reqwest::Client,
    server_url: &str,
    request: &InspectRequest,
) -> anyhow::Result<String> {
    let server_api = format!("{server_url}api/inspect");
    tracing::trace!("api url used = {:?}", &server_api);
    let resp = client.post(server_api).json(request).send().await?;
    parse_response(resp, "inspect").await
}
