//! Manager protocol traits.
//!
//! The global manager is the single authority over the connection
//! directory. Local managers call it through [`GlobalManagerInterface`];
//! it calls back into them (and they call each other for the data plane)
//! through [`LocalManagerInterface`]. Both traits are implemented by the
//! managers themselves for in-process use and by transport clients for
//! remote use.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::connection::{
    ComponentStateChange, ConnectionDescription, ConnectionId, InterfaceAddress,
};
use crate::endpoint::Endpoint;
use crate::error::ManagerError;
use crate::interface::{ComponentDescription, InterfaceNames, InterfaceProvidedDescription};
use crate::result::{CommandReply, ExecutionResult};
use crate::state::ComponentState;

/// Operations a local manager invokes on the global manager.
#[async_trait]
pub trait GlobalManagerInterface: Send + Sync {
    /// Register a process and the endpoint its local manager listens on.
    async fn add_process(&self, process: &str, endpoint: Endpoint) -> Result<(), ManagerError>;

    /// Remove a process, its components and every connection touching it.
    async fn remove_process(&self, process: &str) -> Result<(), ManagerError>;

    /// Endpoint of a registered process.
    async fn process_endpoint(&self, process: &str) -> Result<Endpoint, ManagerError>;

    /// Insert or refresh a component entry.
    async fn register_component(&self, description: ComponentDescription)
        -> Result<(), ManagerError>;

    /// Remove a component entry.
    async fn remove_component(&self, process: &str, component: &str) -> Result<(), ManagerError>;

    /// Record a component state change.
    async fn set_component_state(&self, change: ComponentStateChange) -> Result<(), ManagerError>;

    /// Validate both endpoints of a connection request and return them in
    /// (client, server) order, swapping them if they were given reversed.
    async fn resolve_connection(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<(InterfaceAddress, InterfaceAddress), ManagerError>;

    /// Allocate a connection id and record the connection as pending.
    async fn connect_setup(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionDescription, ManagerError>;

    /// Confirm a pending connection once both sides are bound.
    async fn connect_notify(&self, id: ConnectionId) -> Result<(), ManagerError>;

    /// Ask the client-side process to establish a connection.
    async fn initiate_connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError>;

    /// Remove a connection and tear down both sides.
    async fn disconnect(&self, id: ConnectionId) -> Result<(), ManagerError>;

    /// Id of the live (or pending) connection between two interfaces.
    async fn find_connection(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<Option<ConnectionId>, ManagerError>;

    async fn names_of_processes(&self) -> Result<Vec<String>, ManagerError>;

    async fn names_of_components(&self, process: &str) -> Result<Vec<String>, ManagerError>;

    async fn names_of_interfaces(
        &self,
        process: &str,
        component: &str,
    ) -> Result<InterfaceNames, ManagerError>;

    /// Confirmed connections only.
    async fn list_connections(&self) -> Result<Vec<ConnectionDescription>, ManagerError>;

    async fn component_state(
        &self,
        process: &str,
        component: &str,
    ) -> Result<ComponentState, ManagerError>;
}

/// Operations invoked on a local manager by the global manager or by a
/// peer local manager.
#[async_trait]
pub trait LocalManagerInterface: Send + Sync {
    /// Establish a connection whose client interface lives in this process.
    async fn connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError>;

    /// Bind the server side of a cross-process connection and describe the
    /// provided interface so the client can build its proxy.
    async fn connect_server_side(
        &self,
        connection: ConnectionDescription,
        client_endpoint: Endpoint,
    ) -> Result<InterfaceProvidedDescription, ManagerError>;

    /// Drop every local binding belonging to a connection. Unknown ids are a no-op.
    async fn disconnect_local(&self, id: ConnectionId) -> Result<(), ManagerError>;

    /// Execute a command arriving from a remote client.
    async fn execute_command(&self, id: ConnectionId, command: String, argument: Value)
        -> CommandReply;

    /// Deliver an event arriving from a remote server.
    async fn deliver_event(&self, id: ConnectionId, event: String, payload: Value)
        -> ExecutionResult;

    async fn create_component(&self, class: &str, name: &str, args: Value)
        -> Result<(), ManagerError>;

    async fn configure_component(&self, name: &str, config: &str) -> Result<(), ManagerError>;

    async fn start_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError>;

    async fn stop_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError>;

    async fn resume_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError>;

    async fn component_state(&self, name: &str) -> Result<ComponentState, ManagerError>;

    async fn load_library(&self, library: &str) -> Result<(), ManagerError>;

    async fn class_names(&self) -> Result<Vec<String>, ManagerError>;
}

/// Resolves endpoints to manager handles.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Handle to the local manager at `endpoint`.
    async fn local(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn LocalManagerInterface>, ManagerError>;

    /// Handle to the global manager at `endpoint`.
    async fn global(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn GlobalManagerInterface>, ManagerError>;
}
