//! Remote execution engine: credential materialisation and scoped
//! SSH/SFTP sessions.

pub mod connection;
pub mod credentials;

pub use connection::{CommandOutput, SshSession};
pub use credentials::{materialize, AuthMethod, Credential};
