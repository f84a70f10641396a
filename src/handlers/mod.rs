//! Task handlers. Remote handlers receive a live SSH session and run
//! synchronously inside `spawn_blocking`; probe and driver handlers are
//! async and run on the worker directly.

pub mod backup;
pub mod probes;
pub mod scripts;
pub mod wp_cli;

use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::queue::task::TaskSpec;
use crate::ssh::SshSession;

/// Dispatch a remote (SSH-backed) task spec to its handler.
pub fn run_remote(session: &SshSession, spec: &TaskSpec, remote: &RemoteConfig) -> Result<Value> {
    match spec {
        TaskSpec::WpStatus { wp_path } => wp_cli::wp_status(session, wp_path),
        TaskSpec::BackupSite {
            wp_path,
            db_name,
            db_user,
            db_pass,
            out_dir,
        } => backup::backup_site(session, wp_path, db_name, db_user, db_pass, out_dir),
        TaskSpec::BackupDb {
            db_name,
            db_user,
            db_pass,
            out_dir,
        } => backup::backup_db(session, db_name, db_user, db_pass, out_dir),
        TaskSpec::BackupContent { wp_path, out_dir } => {
            backup::backup_wp_content(session, wp_path, out_dir)
        }
        TaskSpec::UpdateWithRollback {
            wp_path,
            db_name,
            db_user,
            db_pass,
            out_dir,
        } => wp_cli::update_with_rollback(session, wp_path, db_name, db_user, db_pass, out_dir),
        TaskSpec::ProvisionWp(args) => scripts::provision_wp_sh(session, &remote.scripts_dir, args),
        TaskSpec::WpReset(args) => scripts::wp_reset_sh(session, &remote.scripts_dir, args),
        _ => Err(Error::Task(format!(
            "{} is not a remote task",
            spec.kind()
        ))),
    }
}
