use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use axum::ServiceExt;
use axum::extract::Request;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::normalize_path::NormalizePathLayer;
use tower_layer::Layer;
use ovs_backup_lib::orchestration::RemoteExecutor;
use ovs_backup_lib::orchestration::ssh::SshExecutor;
use ovs_backup_schemas::OVS_BACKUP_SETTINGS_FOLDER;
use ovs_backup_schemas::settings::ServerConfig;
use ovs_backup_server_lib::{backup_app, logging, AppState, PROJECT_VERSION};
use ovs_backup_server_lib::actions::ActionLog;
use ovs_backup_server_lib::logging::setup_action_log_cleanup;

/// CLI argument parsing for the backup server
#[derive(Parser, Debug)]
#[command(version, about = "OVS topology backup server")]
struct ServerArgs {
    /// Location of server.json, defaults to /var/lib/ovs-backup/config/server.json
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    mode: Option<ServerModeCmd>,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum ServerModeCmd {
    /// Run the http server, the default
    Serve,
    /// Write a config file with the default settings and exit
    CreateConfig,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let args = ServerArgs::parse();
    let _logging_guard = logging::configure_logging(&PathBuf::from(format!("{OVS_BACKUP_SETTINGS_FOLDER}log/"))).await;
    let config_path = args.config.unwrap_or_else(ServerConfig::default_location);

    if let Some(ServerModeCmd::CreateConfig) = args.mode {
        if let Err(err) = create_config(&config_path).await {
            tracing::error!("could not create config at {:?}, error: {err:#}", &config_path);
            exit(1);
        }
        exit(0);
    }

    let config = match ServerConfig::read(&config_path).await {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("could not start server due to configuration, error: {err:#}");
            exit(1);
        }
    };
    let addr: SocketAddr = match format!("{}:{}", &config.listen_ip, config.listen_port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!("invalid listen address {}:{}, error: {err:#}", &config.listen_ip, config.listen_port);
            exit(1);
        }
    };

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(&config.ssh));
    let action_log = Arc::new(ActionLog::new(ServerConfig::action_log_folder()));
    let retention_days = config.action_log_retention_days;
    tracing::info!("backups are stored in {:?}", &config.backup_folder);
    let app_state = Arc::new(AppState::new(config, executor, action_log.clone()));

    // add trim slash middleware
    let app = NormalizePathLayer::trim_trailing_slash().layer(backup_app(app_state));

    // set up cron job to clear old action logs
    match setup_action_log_cleanup(action_log, retention_days).await {
        Ok(_) => {}
        Err(err) => {
            tracing::error!("could not set up action log cron job with err: {err:#}");
            exit(1);
        }
    }

    tracing::info!("ovs-backup-server {} listening on {}", PROJECT_VERSION, addr);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("could not bind to {addr}, error: {err:#}");
            exit(1);
        }
    };
    if let Err(err) = axum::serve::serve(listener, ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app)).await {
        tracing::error!("server stopped with error: {err:#}");
        exit(1);
    }
}

/// Write the default settings, an existing config is left alone
async fn create_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        tracing::info!("config already exists at {:?}, not overwriting", path);
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    ServerConfig::default().write(path).await?;
    tracing::info!("wrote default config to {:?}", path);
    Ok(())
}
