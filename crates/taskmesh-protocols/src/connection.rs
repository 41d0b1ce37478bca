//! Connection identities and manager events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::ComponentState;

/// Globally unique connection handle assigned by the global manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Reserved sentinel never assigned to a live connection.
    pub const INVALID: ConnectionId = ConnectionId(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-qualified interface address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub process: String,
    pub component: String,
    pub interface: String,
}

impl InterfaceAddress {
    pub fn new(
        process: impl Into<String>,
        component: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            process: process.into(),
            component: component.into(),
            interface: interface.into(),
        }
    }

    /// Parse `process:component:interface`, or `component:interface`
    /// qualified with `default_process`.
    pub fn parse(text: &str, default_process: &str) -> Option<Self> {
        let parts: Vec<&str> = text.trim().split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [component, interface] => Some(Self::new(default_process, *component, *interface)),
            [process, component, interface] => Some(Self::new(*process, *component, *interface)),
            _ => None,
        }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.process, self.component, self.interface)
    }
}

/// One client required interface bound to one server provided interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub id: ConnectionId,
    pub client: InterfaceAddress,
    pub server: InterfaceAddress,
}

impl ConnectionDescription {
    /// Whether client and server live in the same process.
    pub fn is_local(&self) -> bool {
        self.client.process == self.server.process
    }

    /// Whether either side lives in `process`.
    pub fn involves_process(&self, process: &str) -> bool {
        self.client.process == process || self.server.process == process
    }
}

impl fmt::Display for ConnectionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.id, self.client, self.server)
    }
}

/// State change notification for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStateChange {
    pub process: String,
    pub component: String,
    pub state: ComponentState,
}

/// Directory changes broadcast by the global manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ManagerEvent {
    AddProcess { process: String },
    RemoveProcess { process: String },
    AddComponent { process: String, component: String },
    RemoveComponent { process: String, component: String },
    AddConnection(ConnectionDescription),
    RemoveConnection(ConnectionDescription),
    ChangeState(ComponentStateChange),
}

impl ManagerEvent {
    /// Event name as raised on the manager component interfaces.
    pub fn name(&self) -> &'static str {
        match self {
            ManagerEvent::AddProcess { .. } => "AddProcess",
            ManagerEvent::RemoveProcess { .. } => "RemoveProcess",
            ManagerEvent::AddComponent { .. } => "AddComponent",
            ManagerEvent::RemoveComponent { .. } => "RemoveComponent",
            ManagerEvent::AddConnection(_) => "AddConnection",
            ManagerEvent::RemoveConnection(_) => "RemoveConnection",
            ManagerEvent::ChangeState(_) => "ChangeState",
        }
    }

    /// Names of every event kind, in declaration order.
    pub const NAMES: [&'static str; 7] = [
        "AddProcess",
        "RemoveProcess",
        "AddComponent",
        "RemoveComponent",
        "AddConnection",
        "RemoveConnection",
        "ChangeState",
    ];
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
