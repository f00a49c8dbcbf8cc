pub mod cli_models;
pub mod action_models;
pub mod topology;
pub mod settings;
pub mod handlers;

pub const OVS_BACKUP_SETTINGS_FOLDER: &str = "/var/lib/ovs-backup/";
