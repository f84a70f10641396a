//! Backup handlers: timestamped database dumps and wp-content tarballs
//! produced on the remote host.

use chrono::Utc;
use serde_json::{json, Value};
use shell_words::quote;

use crate::error::Result;
use crate::ssh::SshSession;

/// UTC stamp embedded in artefact names.
pub fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Full snapshot: database dump + wp-content tarball.
pub fn backup_site(
    session: &SshSession,
    wp_path: &str,
    db_name: &str,
    db_user: &str,
    db_pass: &str,
    out_dir: &str,
) -> Result<Value> {
    let ts = timestamp();
    let sql = format!("{out_dir}/{db_name}-{ts}.sql.gz");
    let tar = format!("{out_dir}/wp-content-{ts}.tar.gz");

    ensure_out_dir(session, out_dir)?;
    dump_database(session, db_name, db_user, db_pass, &sql)?;
    tar_wp_content(session, wp_path, &tar)?;

    Ok(json!({"db_dump": sql, "content_tar": tar, "timestamp": ts}))
}

/// Database-only backup.
pub fn backup_db(
    session: &SshSession,
    db_name: &str,
    db_user: &str,
    db_pass: &str,
    out_dir: &str,
) -> Result<Value> {
    let ts = timestamp();
    let sql = format!("{out_dir}/{db_name}-{ts}.sql.gz");

    ensure_out_dir(session, out_dir)?;
    dump_database(session, db_name, db_user, db_pass, &sql)?;

    Ok(json!({"db_dump": sql, "timestamp": ts}))
}

/// wp-content-only backup.
pub fn backup_wp_content(session: &SshSession, wp_path: &str, out_dir: &str) -> Result<Value> {
    let ts = timestamp();
    let tar = format!("{out_dir}/wp-content-{ts}.tar.gz");

    ensure_out_dir(session, out_dir)?;
    tar_wp_content(session, wp_path, &tar)?;

    Ok(json!({"content_tar": tar, "timestamp": ts}))
}

fn ensure_out_dir(session: &SshSession, out_dir: &str) -> Result<()> {
    session
        .run(&format!("mkdir -p {}", quote(out_dir)))?
        .require_ok("mkdir backup dir")?;
    Ok(())
}

/// The database password travels via the environment, never the command
/// line (visible in `ps` otherwise).
fn dump_database(
    session: &SshSession,
    db_name: &str,
    db_user: &str,
    db_pass: &str,
    sql_path: &str,
) -> Result<()> {
    let cmd = format!(
        "export MYSQL_PWD={}; mysqldump -u {} {} | gzip > {}",
        quote(db_pass),
        quote(db_user),
        quote(db_name),
        quote(sql_path),
    );
    session.run(&cmd)?.require_ok("mysqldump")?;
    Ok(())
}

fn tar_wp_content(session: &SshSession, wp_path: &str, tar_path: &str) -> Result<()> {
    let cmd = format!(
        "tar -C {} -czf {} wp-content",
        quote(wp_path),
        quote(tar_path),
    );
    session.run(&cmd)?.require_ok("tar wp-content")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_utc_compact() {
        let ts = timestamp();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }
}
