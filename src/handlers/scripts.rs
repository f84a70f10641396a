//! Script-driven handlers: provisioning and droplet reset. Both upload a
//! shell script from the configured scripts directory, run it under sudo
//! (directly when the login is root) and read back a JSON report.

use std::path::Path;

use serde_json::{json, Value};
use shell_words::quote;
use tracing::info;

use crate::error::{Error, Result};
use crate::queue::task::{ProvisionArgs, ResetArgs};
use crate::ssh::{CommandOutput, SshSession};

const PROVISION_SCRIPT: &str = "wp_provision.sh";
const PROVISION_REMOTE: &str = "/tmp/wp_provision.sh";
const PROVISION_REPORT: &str = "/tmp/wp_provision_report.json";

const RESET_SCRIPT: &str = "wp_reset.sh";
const RESET_REMOTE: &str = "/tmp/wp_reset.sh";
const RESET_REPORT: &str = "/tmp/droplet_reset_report.json";
const RESET_REPORT_FALLBACK: &str = "/tmp/wp_rollback_report.json";

/// Upload the provisioning script, execute it with every argument quoted,
/// and parse the report it writes.
pub fn provision_wp_sh(
    session: &SshSession,
    scripts_dir: &Path,
    args: &ProvisionArgs,
) -> Result<Value> {
    let local = scripts_dir.join(PROVISION_SCRIPT);
    if !local.exists() {
        return Err(Error::Task(format!(
            "provision script not found at {}",
            local.display()
        )));
    }

    session.upload(&local, PROVISION_REMOTE)?;
    session
        .sudo(&format!("chmod +x {PROVISION_REMOTE}"))?
        .require_ok("chmod provision script")?;

    let cmd = provision_command(args);
    info!(domain = %args.domain, "running provisioning script");
    let run = session.sudo(&cmd)?;

    // The script chmods the report 0644 and its error trap writes one on
    // failure, so the read itself needs no sudo.
    let report = session.run(&format!("cat {PROVISION_REPORT}"))?;
    if !report.ok || report.stdout.trim().is_empty() {
        return Ok(unknown_report(&run));
    }
    match serde_json::from_str::<Value>(report.stdout.trim()) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Ok(json!({
            "status": "unknown",
            "raw": report.stdout.trim(),
            "parsed": false,
        })),
    }
}

fn provision_command(args: &ProvisionArgs) -> String {
    let noninteractive = if args.noninteractive { "true" } else { "false" };
    [
        PROVISION_REMOTE.to_string(),
        quote(&args.domain).into_owned(),
        quote(&args.wp_path).into_owned(),
        quote(&args.site_title).into_owned(),
        quote(&args.admin_user).into_owned(),
        quote(&args.admin_pass).into_owned(),
        quote(&args.admin_email).into_owned(),
        quote(&args.db_name).into_owned(),
        quote(&args.db_user).into_owned(),
        quote(&args.db_pass).into_owned(),
        quote(&args.php_version).into_owned(),
        quote(&args.wp_version).into_owned(),
        quote(PROVISION_REPORT).into_owned(),
        quote(&args.letsencrypt_email).into_owned(),
        quote(noninteractive).into_owned(),
    ]
    .join(" ")
}

/// Upload and run the reset script. The script only understands
/// `--force` / `--no-ufw` / `--no-reboot`; `reset_ufw=true` means "do
/// reset the firewall", so the flag is inverted.
pub fn wp_reset_sh(session: &SshSession, scripts_dir: &Path, args: &ResetArgs) -> Result<Value> {
    let local = scripts_dir.join(RESET_SCRIPT);
    if !local.exists() {
        return Err(Error::Task(format!(
            "reset script not found at {}",
            local.display()
        )));
    }

    session.upload(&local, RESET_REMOTE)?;
    session
        .sudo(&format!("chmod +x {RESET_REMOTE}"))?
        .require_ok("chmod reset script")?;

    let mut flags: Vec<&str> = Vec::new();
    if args.force {
        flags.push("--force");
    }
    if !args.reset_ufw {
        flags.push("--no-ufw");
    }

    let cmd = std::iter::once(RESET_REMOTE)
        .chain(flags)
        .collect::<Vec<_>>()
        .join(" ");
    info!("running droplet reset script");
    let run = session.sudo(&cmd)?;

    // requested path first, then the script defaults
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(path) = args.report_path.as_deref() {
        candidates.push(path);
    }
    for default in [RESET_REPORT, RESET_REPORT_FALLBACK] {
        if !candidates.contains(&default) {
            candidates.push(default);
        }
    }

    let mut report_body = String::new();
    for path in &candidates {
        if let Ok(output) = session.run(&format!("cat {}", quote(path))) {
            if output.ok && !output.stdout.trim().is_empty() {
                report_body = output.stdout;
                break;
            }
        }
    }

    if report_body.trim().is_empty() {
        return Ok(json!({
            "status": "unknown",
            "error": "report not found",
            "tried": candidates,
            "exec_ok": run.ok,
        }));
    }
    match serde_json::from_str::<Value>(report_body.trim()) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Ok(json!({
            "status": "unknown",
            "raw": report_body.trim(),
            "parsed": false,
        })),
    }
}

fn unknown_report(run: &CommandOutput) -> Value {
    let mut raw = String::new();
    if !run.stdout.trim().is_empty() {
        raw.push_str(run.stdout.trim());
    }
    if !run.stderr.trim().is_empty() {
        if !raw.is_empty() {
            raw.push('\n');
        }
        raw.push_str(run.stderr.trim());
    }
    raw.truncate(2000);
    json!({"status": "unknown", "raw": raw})
}
