//! Management services for user components.
//!
//! [`ManagerComponentServices`] adds a required interface to a component
//! and, once it is connected to the process's manager component client,
//! offers the management command set as blocking calls. It is meant for
//! component threads and other non-async threads.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmesh_core::{Component, ComponentResult, EventReceiver, InterfaceRequired};
use taskmesh_protocols::{
    ComponentState, ConnectionDescription, ConnectionId, InterfaceAddress, InterfaceNames,
    ManagerError, ManagerEvent, Requiredness,
};
use tracing::{debug, warn};

use crate::config::ManagerConfig;
use crate::manager_component::{
    ComponentRef, ConfigureRequest, ConnectRequest, CreateRequest, DisconnectRequest,
    LibraryRequest, LifecycleRequest, MANAGER_FUNCTIONS, ProcessRef,
};

/// Name of the required interface the services add to their component.
pub const SERVICES_INTERFACE: &str = "ManagerServices";

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Check once, never block.
    Immediate,
    After(Duration),
    Forever,
}

impl WaitTimeout {
    /// `0` checks once, a negative value waits forever.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs < 0.0 {
            WaitTimeout::Forever
        } else if secs == 0.0 {
            WaitTimeout::Immediate
        } else {
            Duration::try_from_secs_f64(secs)
                .map(WaitTimeout::After)
                .unwrap_or(WaitTimeout::Forever)
        }
    }
}

enum WaitTarget<'a> {
    Process,
    Component(&'a str),
    State(&'a str, ComponentState),
}

/// Blocking access to the managers from inside a component.
pub struct ManagerComponentServices {
    process: String,
    interface: Arc<InterfaceRequired>,
    wait_slice: Duration,
}

impl ManagerComponentServices {
    /// Add the services interface to `component`. Connect it with
    /// `LocalComponentManager::connect_services` before use.
    pub fn install(component: &Component, config: &ManagerConfig) -> ComponentResult<Self> {
        let interface = component.add_interface_required(SERVICES_INTERFACE, Requiredness::Optional)?;
        for (name, kind) in MANAGER_FUNCTIONS {
            interface.add_function(name, kind)?;
        }
        for event in ManagerEvent::NAMES {
            interface.add_event_receiver(event);
        }
        Ok(Self {
            process: config.process.clone(),
            interface,
            wait_slice: config.wait_slice,
        })
    }

    /// Process the owning component lives in.
    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn is_connected(&self) -> bool {
        self.interface.is_connected()
    }

    /// Receiver of a manager event, for callers that want to wait on it.
    pub fn event_receiver(&self, event: &str) -> Option<Arc<EventReceiver>> {
        self.interface.event_receiver(event)
    }

    fn request<A: Serialize, T: DeserializeOwned>(&self, function: &str, argument: A) -> Result<T, ManagerError> {
        let argument = serde_json::to_value(argument)
            .map_err(|e| ManagerError::InvalidRequest(e.to_string()))?;
        let value = self
            .interface
            .call(function, argument)
            .into_result()
            .map_err(|result| ManagerError::Network(format!("{} returned {}", function, result)))?;
        let outcome: Result<T, ManagerError> = serde_json::from_value(value)
            .map_err(|e| ManagerError::InvalidRequest(format!("bad reply to {}: {}", function, e)))?;
        outcome
    }

    pub fn component_create(&self, process: &str, class: &str, name: &str, args: Value) -> Result<(), ManagerError> {
        self.request(
            "ComponentCreate",
            CreateRequest {
                process: process.to_string(),
                class: class.to_string(),
                name: name.to_string(),
                args,
            },
        )
    }

    pub fn component_configure(&self, process: &str, name: &str, config: &str) -> Result<(), ManagerError> {
        self.request(
            "ComponentConfigure",
            ConfigureRequest {
                process: process.to_string(),
                name: name.to_string(),
                config: config.to_string(),
            },
        )
    }

    /// Connect two interfaces given with their processes.
    pub fn connect(&self, client: InterfaceAddress, server: InterfaceAddress) -> Result<ConnectionId, ManagerError> {
        self.request("ComponentConnect", ConnectRequest { client, server })
    }

    /// Connect two interfaces of this process.
    pub fn connect_local(
        &self,
        client_component: &str,
        client_interface: &str,
        server_component: &str,
        server_interface: &str,
    ) -> Result<ConnectionId, ManagerError> {
        self.connect(
            InterfaceAddress::new(&self.process, client_component, client_interface),
            InterfaceAddress::new(&self.process, server_component, server_interface),
        )
    }

    pub fn disconnect(&self, id: ConnectionId) -> Result<(), ManagerError> {
        self.request("ComponentDisconnect", DisconnectRequest::ById { id })
    }

    pub fn disconnect_interfaces(&self, client: InterfaceAddress, server: InterfaceAddress) -> Result<(), ManagerError> {
        self.request("ComponentDisconnect", DisconnectRequest::ByInterfaces { client, server })
    }

    fn lifecycle(&self, function: &str, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.request(
            function,
            LifecycleRequest {
                process: process.to_string(),
                name: name.to_string(),
                delay_secs,
            },
        )
    }

    pub fn component_start(&self, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.lifecycle("ComponentStart", process, name, delay_secs)
    }

    pub fn component_stop(&self, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.lifecycle("ComponentStop", process, name, delay_secs)
    }

    pub fn component_resume(&self, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.lifecycle("ComponentResume", process, name, delay_secs)
    }

    pub fn component_get_state(&self, process: &str, name: &str) -> Result<ComponentState, ManagerError> {
        self.request(
            "ComponentGetState",
            ComponentRef {
                process: process.to_string(),
                name: name.to_string(),
            },
        )
    }

    pub fn names_of_processes(&self) -> Result<Vec<String>, ManagerError> {
        self.request("GetNamesOfProcesses", Value::Null)
    }

    pub fn names_of_components(&self, process: &str) -> Result<Vec<String>, ManagerError> {
        self.request(
            "GetNamesOfComponents",
            ProcessRef {
                process: process.to_string(),
            },
        )
    }

    pub fn names_of_interfaces(&self, process: &str, component: &str) -> Result<InterfaceNames, ManagerError> {
        self.request(
            "GetNamesOfInterfaces",
            ComponentRef {
                process: process.to_string(),
                name: component.to_string(),
            },
        )
    }

    pub fn list_connections(&self) -> Result<Vec<ConnectionDescription>, ManagerError> {
        self.request("GetListOfConnections", Value::Null)
    }

    pub fn load_library(&self, process: &str, library: &str) -> Result<(), ManagerError> {
        self.request(
            "LoadLibrary",
            LibraryRequest {
                process: process.to_string(),
                library: library.to_string(),
            },
        )
    }

    pub fn class_names(&self, process: &str) -> Result<Vec<String>, ManagerError> {
        self.request(
            "GetListOfComponentClasses",
            ProcessRef {
                process: process.to_string(),
            },
        )
    }

    // ---- waiting ----

    /// Wait until `process` is registered.
    pub fn wait_for_process(&self, process: &str, timeout: WaitTimeout) -> bool {
        self.wait_for(process, WaitTarget::Process, timeout).is_ok()
    }

    /// Wait until `component` exists in `process`.
    pub fn wait_for_component(&self, process: &str, component: &str, timeout: WaitTimeout) -> bool {
        self.wait_for(process, WaitTarget::Component(component), timeout)
            .is_ok()
    }

    /// Wait until `component` in `process` is exactly in `state`.
    ///
    /// On timeout the error carries the last state observed, or `None` if
    /// the component was never seen.
    pub fn wait_for_state(
        &self,
        process: &str,
        component: &str,
        state: ComponentState,
        timeout: WaitTimeout,
    ) -> Result<(), Option<ComponentState>> {
        self.wait_for(process, WaitTarget::State(component, state), timeout)
    }

    fn holds(&self, process: &str, target: &WaitTarget<'_>, last: &mut Option<ComponentState>) -> bool {
        let outcome = match target {
            WaitTarget::Process => self
                .names_of_processes()
                .map(|names| names.iter().any(|n| n == process)),
            WaitTarget::Component(component) => self
                .names_of_components(process)
                .map(|names| names.iter().any(|n| n == component)),
            WaitTarget::State(component, state) => self
                .component_get_state(process, component)
                .map(|current| {
                    *last = Some(current);
                    current == *state
                }),
        };
        outcome.unwrap_or_else(|e| {
            debug!("Wait condition on {} not met yet: {}", process, e);
            false
        })
    }

    /// Check the condition, then block on the matching event in bounded
    /// slices, re-checking after every slice.
    fn wait_for(
        &self,
        process: &str,
        target: WaitTarget<'_>,
        timeout: WaitTimeout,
    ) -> Result<(), Option<ComponentState>> {
        let event = match target {
            WaitTarget::Process => "AddProcess",
            WaitTarget::Component(_) => "AddComponent",
            WaitTarget::State(..) => "ChangeState",
        };
        let Some(receiver) = self.interface.event_receiver(event) else {
            warn!("Services of {} have no {} receiver", self.process, event);
            return Err(None);
        };
        let deadline = match timeout {
            WaitTimeout::After(duration) => Some(Instant::now() + duration),
            _ => None,
        };

        let mut last = None;
        loop {
            // taken before the check so an event in between is not missed
            let generation = receiver.generation();
            if self.holds(process, &target, &mut last) {
                return Ok(());
            }
            let slice = match (timeout, deadline) {
                (WaitTimeout::After(_), Some(deadline)) => {
                    deadline.saturating_duration_since(Instant::now()).min(self.wait_slice)
                }
                (WaitTimeout::Immediate, _) => Duration::ZERO,
                _ => self.wait_slice,
            };
            if slice.is_zero() {
                match last {
                    Some(state) => warn!(
                        "Wait on {} gave up, last known state {}",
                        process, state
                    ),
                    None => debug!("Wait on {} gave up", process),
                }
                return Err(last);
            }
            receiver.wait_since(generation, slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::IdleTask;
    use taskmesh_protocols::ExecutionResult;

    #[test]
    fn test_wait_timeout_from_secs() {
        assert_eq!(WaitTimeout::from_secs_f64(0.0), WaitTimeout::Immediate);
        assert_eq!(WaitTimeout::from_secs_f64(-1.0), WaitTimeout::Forever);
        assert_eq!(
            WaitTimeout::from_secs_f64(1.5),
            WaitTimeout::After(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_unconnected_services_report_network_error() {
        let component = Component::builder("User").build(IdleTask).unwrap();
        let services = ManagerComponentServices::install(&component, &ManagerConfig::new("P")).unwrap();
        assert!(!services.is_connected());

        let err = services.names_of_processes().unwrap_err();
        assert!(matches!(err, ManagerError::Network(ref m) if m.contains(ExecutionResult::FunctionNotBound.as_str())));
        assert!(!services.wait_for_process("P", WaitTimeout::Immediate));
    }

    #[test]
    fn test_services_interface_is_optional() {
        let component = Component::builder("User").build(IdleTask).unwrap();
        ManagerComponentServices::install(&component, &ManagerConfig::new("P")).unwrap();
        // an unconnected services interface does not block startup
        component.create().unwrap();
        assert_eq!(component.state(), ComponentState::Ready);
    }
}
