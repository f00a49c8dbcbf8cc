pub mod client;
pub mod http_actions;
