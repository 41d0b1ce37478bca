//! JSON-lines wire messages for remote managers.
//!
//! Every request travels as one [`RequestEnvelope`] per line and is answered
//! by exactly one [`ResponseEnvelope`] carrying the same id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{
    ComponentStateChange, ConnectionDescription, ConnectionId, InterfaceAddress,
};
use crate::endpoint::Endpoint;
use crate::error::ManagerError;
use crate::interface::ComponentDescription;

/// Requests served by the global manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum GlobalRequest {
    AddProcess { process: String, endpoint: Endpoint },
    RemoveProcess { process: String },
    ProcessEndpoint { process: String },
    RegisterComponent { description: ComponentDescription },
    RemoveComponent { process: String, component: String },
    SetComponentState { change: ComponentStateChange },
    ResolveConnection { client: InterfaceAddress, server: InterfaceAddress },
    ConnectSetup { client: InterfaceAddress, server: InterfaceAddress },
    ConnectNotify { id: ConnectionId },
    InitiateConnect { client: InterfaceAddress, server: InterfaceAddress },
    Disconnect { id: ConnectionId },
    FindConnection { client: InterfaceAddress, server: InterfaceAddress },
    NamesOfProcesses,
    NamesOfComponents { process: String },
    NamesOfInterfaces { process: String, component: String },
    ListConnections,
    ComponentState { process: String, component: String },
}

/// Requests served by a local manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum LocalRequest {
    Connect { client: InterfaceAddress, server: InterfaceAddress },
    ConnectServerSide { connection: ConnectionDescription, client_endpoint: Endpoint },
    DisconnectLocal { id: ConnectionId },
    ExecuteCommand { id: ConnectionId, command: String, argument: Value },
    DeliverEvent { id: ConnectionId, event: String, payload: Value },
    CreateComponent { class: String, name: String, args: Value },
    ConfigureComponent { name: String, config: String },
    StartComponent { name: String, delay_secs: f64 },
    StopComponent { name: String, delay_secs: f64 },
    ResumeComponent { name: String, delay_secs: f64 },
    ComponentState { name: String },
    LoadLibrary { library: String },
    ClassNames,
}

/// One request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    pub id: u64,
    pub request: T,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub outcome: Result<Value, ManagerError>,
}

impl ResponseEnvelope {
    /// Build a response from a typed handler result.
    pub fn from_result<T: Serialize>(id: u64, result: Result<T, ManagerError>) -> Self {
        let outcome = result.and_then(|value| {
            serde_json::to_value(value).map_err(|e| ManagerError::InvalidRequest(e.to_string()))
        });
        Self { id, outcome }
    }

    /// Decode the outcome into the type the caller expects.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ManagerError> {
        let value = self.outcome?;
        serde_json::from_value(value).map_err(|e| ManagerError::Network(e.to_string()))
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
