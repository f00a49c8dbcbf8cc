//! Capture, store and restore the Open vSwitch topology of remote switches.
//!
//! The write path runs `RemoteExecutor` output through `parsing` into a `Snapshot` that the
//! `SnapshotStore` persists. The read path loads a snapshot, plans its restore with the
//! `RestorePlanner` and applies the plan through the executor again.

pub mod error;
pub mod parsing;
pub mod snapshot;
pub mod orchestration;
pub mod server_web_client;

pub use error::{OvsBackupError, Result};
