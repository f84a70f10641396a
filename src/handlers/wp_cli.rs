//! Handlers built on the site's wp-cli: freshness status and the
//! snapshot-protected plugin update.

use serde_json::{json, Value};
use shell_words::quote;
use tracing::warn;

use crate::error::Result;
use crate::ssh::{CommandOutput, SshSession};

use super::backup::backup_site;

fn wp(session: &SshSession, wp_path: &str, cmd: &str) -> Result<CommandOutput> {
    let full = format!("cd {} && wp {}", quote(wp_path), cmd);
    Ok(session.run(&full)?)
}

fn parse_json_or_empty_list(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(json!([]));
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Enumerate outdated core/plugins/themes via wp-cli.
pub fn wp_status(session: &SshSession, wp_path: &str) -> Result<Value> {
    let core = wp(session, wp_path, "core check-update --format=json")?;
    let plugins = wp(session, wp_path, "plugin list --update=available --format=json")?;
    let themes = wp(session, wp_path, "theme list --update=available --format=json")?;

    Ok(json!({
        "core": parse_json_or_empty_list(&core.stdout)?,
        "plugins": parse_json_or_empty_list(&plugins.stdout)?,
        "themes": parse_json_or_empty_list(&themes.stdout)?,
    }))
}

/// Update all plugins behind a snapshot; restore database and wp-content
/// from it when the update exits non-zero.
///
/// Restoration is best-effort: each step records its own error without
/// aborting the others.
pub fn update_with_rollback(
    session: &SshSession,
    wp_path: &str,
    db_name: &str,
    db_user: &str,
    db_pass: &str,
    out_dir: &str,
) -> Result<Value> {
    let snapshot = backup_site(session, wp_path, db_name, db_user, db_pass, out_dir)?;

    let update = wp(session, wp_path, "plugin update --all --format=json")?;
    if update.ok {
        let details = parse_json_or_empty_list(&update.stdout).unwrap_or(json!([]));
        return Ok(json!({
            "updated": true,
            "snapshot": snapshot,
            "details": {"plugins": details},
        }));
    }

    let mut error = update.stderr.trim().to_string();
    if error.is_empty() {
        error = update.stdout.trim().to_string();
    }
    error.truncate(500);
    let error = format!("plugin update exited {}: {error}", update.exit_code);
    warn!(%error, "plugin update failed; restoring snapshot");

    let mut restore_errors: Vec<String> = Vec::new();

    // database
    let db_dump = snapshot["db_dump"].as_str().unwrap_or_default();
    let restore_db = format!(
        "export MYSQL_PWD={}; gunzip -c {} | mysql -u {} {}",
        quote(db_pass),
        quote(db_dump),
        quote(db_user),
        quote(db_name),
    );
    match session.run(&restore_db) {
        Ok(output) if output.ok => {}
        Ok(output) => restore_errors.push(format!(
            "db_restore: exited {}: {}",
            output.exit_code,
            output.stderr.trim()
        )),
        Err(e) => restore_errors.push(format!("db_restore: {e}")),
    }

    // wp-content, extracted over the existing tree
    let content_tar = snapshot["content_tar"].as_str().unwrap_or_default();
    let restore_content = format!(
        "mkdir -p {}/wp-content && tar -C {} -xzf {}",
        quote(wp_path),
        quote(wp_path),
        quote(content_tar),
    );
    match session.run(&restore_content) {
        Ok(output) if output.ok => {
            // normalise permissions after the extract; failures are not fatal
            let _ = session.run(&format!(
                "find {}/wp-content -type d -exec chmod 755 {{}} +",
                quote(wp_path)
            ));
            let _ = session.run(&format!(
                "find {}/wp-content -type f -exec chmod 644 {{}} +",
                quote(wp_path)
            ));
        }
        Ok(output) => restore_errors.push(format!(
            "content_restore: exited {}: {}",
            output.exit_code,
            output.stderr.trim()
        )),
        Err(e) => restore_errors.push(format!("content_restore: {e}")),
    }

    let restored = restore_errors.is_empty();
    Ok(json!({
        "updated": false,
        "error": error,
        "snapshot": snapshot,
        "restored": restored,
        "restore_errors": if restored { Value::Null } else { json!(restore_errors) },
    }))
}
