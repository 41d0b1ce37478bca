//! Error types for the component runtime.

use taskmesh_protocols::{ComponentState, ExecutionResult};
use thiserror::Error;

/// Errors from component lifecycle and interface management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    #[error("Invalid transition for {component}: {from} -> {to}")]
    InvalidTransition {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },

    #[error("Interface already exists: {0}")]
    InterfaceExists(String),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Required interface not connected: {component}:{interface}")]
    RequiredNotConnected { component: String, interface: String },

    #[error("Interface already connected: {0}")]
    AlreadyConnected(String),

    #[error("Interface not connected: {0}")]
    NotConnected(String),

    #[error("Incompatible interfaces: {0}")]
    Incompatible(String),

    #[error("State table slot not found: {0}")]
    SlotNotFound(String),

    #[error("Component already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Component not found: {0}")]
    NotFound(String),

    #[error("Component class not found: {0}")]
    ClassNotFound(String),

    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("Configuration failed: {0}")]
    Configuration(String),

    #[error("Task failed: {0}")]
    Task(String),
}

impl ComponentError {
    /// Shorthand for a failure raised by user task code.
    pub fn task(message: impl Into<String>) -> Self {
        ComponentError::Task(message.into())
    }
}

/// Failure reported by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The handler ran and failed.
    #[error("Command failed: {0}")]
    Failed(String),

    /// The argument could not be interpreted.
    #[error("Invalid command input: {0}")]
    InvalidInput(String),
}

impl CommandError {
    pub fn failed(message: impl Into<String>) -> Self {
        CommandError::Failed(message.into())
    }

    /// Result code reported to the caller.
    pub fn execution_result(&self) -> ExecutionResult {
        match self {
            CommandError::Failed(_) => ExecutionResult::CommandException,
            CommandError::InvalidInput(_) => ExecutionResult::InvalidInput,
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        CommandError::InvalidInput(err.to_string())
    }
}

pub type ComponentResult<T> = Result<T, ComponentError>;
