//! Scoped SSH sessions over `ssh2`.
//!
//! Sessions are synchronous and strictly scoped to one task invocation;
//! callers drive them from `tokio::task::spawn_blocking`. Release happens
//! on drop, after which any materialised temp key is removed by its own
//! guard.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, SshError};
use crate::site::SiteRecord;

use super::credentials::{AuthMethod, Credential};

/// Handshake, banner exchange and authentication share this floor.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct SshTimeouts {
    pub connect: Duration,
    pub command: Duration,
}

impl Default for SshTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            command: Duration::from_secs(600),
        }
    }
}

impl SshTimeouts {
    pub fn from_remote_config(remote: &crate::config::RemoteConfig) -> Self {
        Self {
            connect: Duration::from_secs(remote.connect_timeout_secs),
            command: Duration::from_secs(remote.command_timeout_secs),
        }
    }
}

/// Outcome of one remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub ok: bool,
}

impl CommandOutput {
    /// Promote a non-zero exit into a task error carrying the context and
    /// a bounded slice of stderr.
    pub fn require_ok(self, context: &str) -> Result<CommandOutput, Error> {
        if self.ok {
            Ok(self)
        } else {
            let mut detail = self.stderr.trim().to_string();
            if detail.is_empty() {
                detail = self.stdout.trim().to_string();
            }
            detail.truncate(500);
            Err(Error::Task(format!(
                "{context} exited {}: {detail}",
                self.exit_code
            )))
        }
    }
}

pub struct SshSession {
    session: ssh2::Session,
    user: String,
    sudo_password: Option<String>,
}

impl SshSession {
    /// Open and authenticate a session for `site` using a materialised
    /// credential. Agent and system key discovery are never consulted, so
    /// behaviour is deterministic across hosts.
    pub fn connect(
        site: &SiteRecord,
        credential: &Credential,
        timeouts: SshTimeouts,
    ) -> Result<Self, SshError> {
        let addr = (site.host.as_str(), site.port)
            .to_socket_addrs()
            .map_err(|e| SshError::Connect(format!("resolve {}: {e}", site.host)))?
            .next()
            .ok_or_else(|| {
                SshError::Connect(format!("no address found for {}", site.host))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, timeouts.connect)
            .map_err(|e| SshError::Connect(format!("{addr}: {e}")))?;

        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp);
        // banner + auth get the generous floor; per-command timeout follows
        session.set_timeout(AUTH_TIMEOUT.max(timeouts.connect).as_millis() as u32);
        session
            .handshake()
            .map_err(|e| SshError::Connect(format!("handshake: {e}")))?;

        match credential.method() {
            AuthMethod::KeyFile(path) => {
                session
                    .userauth_pubkey_file(&site.user, None, path, None)
                    .map_err(|e| SshError::Auth(format!("pubkey: {e}")))?;
            }
            AuthMethod::Password => {
                let password = site.password.as_deref().ok_or_else(|| {
                    SshError::Credentials("password auth selected without a password".into())
                })?;
                session
                    .userauth_password(&site.user, password)
                    .map_err(|e| SshError::Auth(format!("password: {e}")))?;
            }
        }
        if !session.authenticated() {
            return Err(SshError::Auth("authentication was not accepted".into()));
        }

        session.set_timeout(timeouts.command.as_millis() as u32);
        debug!(host = %site.host, port = site.port, user = %site.user, "SSH session established");

        Ok(Self {
            session,
            user: site.user.clone(),
            sudo_password: site.effective_sudo_password().map(str::to_string),
        })
    }

    /// Run a command as the login user.
    pub fn run(&self, cmd: &str) -> Result<CommandOutput, SshError> {
        self.exec(cmd, None)
    }

    /// Run a command under privilege escalation. Already-root sessions run
    /// the command directly, matching the behaviour operators get from a
    /// root login shell.
    pub fn sudo(&self, cmd: &str) -> Result<CommandOutput, SshError> {
        if self.user == "root" {
            return self.exec(cmd, None);
        }
        let wrapped = sudo_command(cmd);
        let stdin = self
            .sudo_password
            .as_deref()
            .map(|password| format!("{password}\n"));
        self.exec(&wrapped, stdin.as_deref())
    }

    /// Upload a local file over SFTP.
    pub fn upload(&self, local: &Path, remote: &str) -> Result<(), SshError> {
        let mut source = std::fs::File::open(local)
            .map_err(|e| SshError::Transfer(format!("open {}: {e}", local.display())))?;
        let sftp = self.session.sftp()?;
        let mut target = sftp
            .create(Path::new(remote))
            .map_err(|e| SshError::Transfer(format!("create {remote}: {e}")))?;
        std::io::copy(&mut source, &mut target)
            .map_err(|e| SshError::Transfer(format!("put {remote}: {e}")))?;
        Ok(())
    }

    /// Download a remote file over SFTP into `writer`.
    pub fn download_to<W: Write>(&self, remote: &str, writer: &mut W) -> Result<u64, SshError> {
        let sftp = self.session.sftp()?;
        let mut source = sftp
            .open(Path::new(remote))
            .map_err(|e| SshError::Transfer(format!("open {remote}: {e}")))?;
        let copied = std::io::copy(&mut source, writer)
            .map_err(|e| SshError::Transfer(format!("get {remote}: {e}")))?;
        Ok(copied)
    }

    /// Download a remote file over SFTP to a local path.
    pub fn download(&self, remote: &str, local: &Path) -> Result<u64, SshError> {
        let mut target = std::fs::File::create(local)
            .map_err(|e| SshError::Transfer(format!("create {}: {e}", local.display())))?;
        self.download_to(remote, &mut target)
    }

    /// The login probe used by `/ssh/login`.
    pub fn verify(&self) -> Result<Value, SshError> {
        let output = self.run("echo ok && uname -a")?;
        Ok(json!({
            "ok": output.ok,
            "stdout": output.stdout.trim(),
        }))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn exec(&self, cmd: &str, stdin: Option<&str>) -> Result<CommandOutput, SshError> {
        let mut channel = self.session.channel_session()?;
        channel
            .exec(cmd)
            .map_err(|e| SshError::Command(format!("exec: {e}")))?;

        if let Some(data) = stdin {
            channel
                .write_all(data.as_bytes())
                .map_err(|e| SshError::Command(format!("stdin: {e}")))?;
        }
        channel
            .send_eof()
            .map_err(|e| SshError::Command(format!("eof: {e}")))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| SshError::Command(format!("read stdout: {e}")))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| SshError::Command(format!("read stderr: {e}")))?;

        channel
            .wait_close()
            .map_err(|e| SshError::Command(format!("close: {e}")))?;
        let exit_code = channel.exit_status()?;

        Ok(CommandOutput {
            ok: exit_code == 0,
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Non-interactive sudo wrapper; the password, when needed, arrives on
/// stdin via `-S` with an empty prompt.
fn sudo_command(cmd: &str) -> String {
    format!("sudo -S -p '' sh -c {}", shell_words::quote(cmd))
}
