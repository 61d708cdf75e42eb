//! Communicator boundary: how a build reaches the machine it provisions.
//!
//! The wire protocol is not implemented here. A [`Connector`] opens a
//! [`Session`] to an [`Endpoint`]; [`StepConnect`] retries that until the
//! machine answers and leaves the session in the state bag for the
//! provisioning step.

mod config;
mod step_connect;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use camino::Utf8PathBuf;

use crate::multistep::{CancelToken, StateKey};

pub use config::{CommunicatorConfig, SshConfig};
pub use step_connect::{HostFn, StepConnect};

/// The connected session, stored by [`StepConnect`].
pub const SESSION: StateKey<Box<dyn Session>> = StateKey::new("communicator");

/// Connector used by [`StepConnect`], seeded by the builder.
pub const CONNECTOR: StateKey<Arc<dyn Connector>> = StateKey::new("connector");

/// Address and credentials of the machine being provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key_file: Option<Utf8PathBuf>,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// An open connection to the machine.
pub trait Session: Send {
    /// Runs `command` remotely and returns its exit code.
    fn run(&mut self, command: &str) -> Result<i32>;

    /// Closes the connection.
    fn close(&mut self) -> Result<()>;
}

/// Opens sessions to machines.
pub trait Connector: Send + Sync {
    /// Makes a single connection attempt.
    ///
    /// Long handshakes should observe `cancel`.
    fn connect(&self, endpoint: &Endpoint, cancel: &CancelToken) -> Result<Box<dyn Session>>;
}
