//! Seam between the dispatcher and whatever actually speaks SSH.

use std::fmt;
use std::io::Read;

use super::auth::Credential;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("authentication as '{username}' rejected by {endpoint}")]
    Authentication { endpoint: String, username: String },

    #[error("failed to run '{command}': {message}")]
    Exec { command: String, message: String },

    #[error("I/O error on remote channel: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote command '{0}' ended without an exit status")]
    Terminated(String),
}

/// Opens authenticated sessions.
pub trait Connector {
    type Session: RemoteSession;

    fn connect(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
    ) -> Result<Self::Session, TransportError>;
}

/// An open connection to one host.
pub trait RemoteSession {
    type Channel: ExecChannel;

    fn exec(&mut self, command: &str) -> Result<Self::Channel, TransportError>;

    /// Tear the connection down. Errors are the implementation's to log.
    fn disconnect(&mut self);
}

/// One running remote command.
pub trait ExecChannel {
    /// Stdout of the remote process. Each stream can be taken once.
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Wait for the remote process and return its exit status.
    fn exit_status(&mut self) -> Result<i32, TransportError>;

    /// Release the channel. Must be safe to call after `exit_status`.
    fn close(&mut self);
}
