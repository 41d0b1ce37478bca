//! # TaskMesh Protocols
//!
//! Shared vocabulary of the TaskMesh component runtime.
//! Contains only type and trait definitions - no implementations.
//!
//! ## Core Types
//!
//! - [`ComponentState`] - Totally ordered lifecycle state of a component
//! - [`ExecutionResult`] - Closed result code returned by every command invocation
//! - [`ConnectionDescription`] - One client/server interface binding known to the global manager
//! - [`Endpoint`] - Address of a local or global manager
//!
//! ## Core Traits
//!
//! - [`GlobalManagerInterface`] - Operations a local manager invokes on the global manager
//! - [`LocalManagerInterface`] - Operations the global manager and peers invoke on a local manager
//! - [`PeerConnector`] - Resolves endpoints to manager handles

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod interface;
pub mod manager;
pub mod result;
pub mod state;
pub mod wire;

pub use connection::{
    ComponentStateChange, ConnectionDescription, ConnectionId, InterfaceAddress, ManagerEvent,
};
pub use endpoint::Endpoint;
pub use error::{ManagerError, TransportError};
pub use interface::{
    CommandDescription, CommandKind, ComponentDescription, EventDescription, EventKind,
    FunctionDescription, InterfaceNames, InterfaceProvidedDescription,
    InterfaceRequiredDescription, QueuingPolicy, Requiredness,
};
pub use manager::{GlobalManagerInterface, LocalManagerInterface, PeerConnector};
pub use result::{CommandReply, ExecutionResult};
pub use state::ComponentState;
