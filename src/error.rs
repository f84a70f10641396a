//! Error types for the AMC control plane.

use thiserror::Error;

/// Result type alias for control-plane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for control-plane operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid request payload
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote execution error
    #[error("SSH error: {0}")]
    Ssh(#[from] SshError),

    /// Task execution error; the message becomes the task `info`
    #[error("Task error: {0}")]
    Task(String),

    /// Queue submission / delivery error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report delivery error
    #[error("Report error: {0}")]
    Report(String),
}

/// Errors raised by the SSH/SFTP execution engine
#[derive(Debug, Error)]
pub enum SshError {
    /// TCP connect / handshake failure
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Authentication failure
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Credential materialisation failure
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// Remote command failure
    #[error("Command failed: {0}")]
    Command(String),

    /// SFTP transfer failure
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// libssh2-level error
    #[error("Session error: {0}")]
    Session(#[from] ssh2::Error),
}
