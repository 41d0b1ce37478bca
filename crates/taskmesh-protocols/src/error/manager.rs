//! Manager errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TransportError;
use crate::connection::{ConnectionId, InterfaceAddress};

/// Errors surfaced by local and global manager operations.
///
/// Serializable so that remote managers can return them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ManagerError {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Component not found: {process}:{component}")]
    ComponentNotFound { process: String, component: String },

    #[error("Interface not found: {0}")]
    InterfaceNotFound(InterfaceAddress),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Already connected as connection {0}")]
    AlreadyConnected(ConnectionId),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("Connection failed after {attempts} attempts: {reason}")]
    ConnectionFailed { attempts: u32, reason: String },

    #[error("Incompatible interfaces: {0}")]
    Incompatible(String),

    #[error("Component class not found: {0}")]
    ClassNotFound(String),

    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("Component error: {0}")]
    Component(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ManagerError {
    /// Whether a connect attempt failing with this error may succeed later,
    /// once the missing peer has registered.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ManagerError::ProcessNotFound(_)
                | ManagerError::ComponentNotFound { .. }
                | ManagerError::InterfaceNotFound(_)
                | ManagerError::Network(_)
        )
    }
}

impl From<TransportError> for ManagerError {
    fn from(err: TransportError) -> Self {
        ManagerError::Network(err.to_string())
    }
}
