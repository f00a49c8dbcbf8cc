use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing::level_filters::LevelFilter;
use ovs_backup_lib::server_web_client::client;
use ovs_backup_schemas::cli_models::Opts;
use reqwest::Client;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    std::process::exit(match run_app().await {
        Ok(_) => 0,
        Err(_) => 1,
    });
}

fn log_level(s: &str) -> anyhow::Result<LevelFilter> {
    match s.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(anyhow!("Unknown Log LevelFilter {}", s)),
    }
}

/// The CLI arguments are processed and the command is run, either locally or against the backup
/// server. Errors are printed with their causes before returning.
pub async fn run_app() -> Result<(), anyhow::Error> {
    // Invoke cli option parsing
    let opts: Opts = Opts::parse();
    let mut e = None;
    // Determine and set log level
    let level = match &opts.verbosity {
        None => LevelFilter::INFO,
        Some(x) => match log_level(x) {
            Ok(l) => l,
            Err(err) => {
                e = Some(err);
                LevelFilter::INFO
            }
        },
    };

    let stdout_log = tracing_subscriber::fmt::layer();
    tracing_subscriber::registry()
        .with(stdout_log.with_filter(level))
        .init();
    if let Some(e) = e {
        tracing::warn!("{}", e);
    }

    match parse_command(opts).await {
        Ok(_) => Ok(()),
        Err(err) => {
            tracing::error!("ERROR: {}", err);
            err.chain().skip(1).for_each(|cause| tracing::error!("because: {}", cause));
            Err(err)
        }
    }
}

/// This is the entrypoint for all commands
pub async fn parse_command(opts: Opts) -> anyhow::Result<()> {
    let client = Client::new();

    // commands on local files do not need the server
    if opts.sub_command.is_offline() {
        return client::backup_action(&client, &opts).await;
    }

    tracing::trace!("server connection = {:?}", opts.server_connection);
    // check server is running
    let conn_test = client.get(format!("{}api/backups", opts.server_connection))
        .send()
        .await
        .context("Connecting to backup server");
    if conn_test.is_err() {
        bail!("could not connect to backup server at {}, is it running?", opts.server_connection);
    }

    client::backup_action(&client, &opts)
        .await
        .context(format!("running {} command", opts.sub_command.name()))?;
    Ok(())
}
