//! Global component manager: the single authority over processes,
//! components and connections.
//!
//! The directory sits behind one mutex that is never held across an
//! `.await`; calls into local managers happen after the lock is released.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use taskmesh_protocols::{
    ComponentDescription, ComponentState, ComponentStateChange, ConnectionDescription,
    ConnectionId, Endpoint, GlobalManagerInterface, InterfaceAddress, InterfaceNames,
    LocalManagerInterface, ManagerError, ManagerEvent, PeerConnector,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::within;

const EVENT_CAPACITY: usize = 256;

/// Time a local manager gets to tear down its side of a connection.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

struct ProcessEntry {
    endpoint: Endpoint,
    components: BTreeMap<String, ComponentDescription>,
}

struct ConnectionRecord {
    description: ConnectionDescription,
    confirmed: bool,
    created: Instant,
}

#[derive(Default)]
struct Directory {
    processes: BTreeMap<String, ProcessEntry>,
    connections: BTreeMap<ConnectionId, ConnectionRecord>,
}

impl Directory {
    fn component(&self, process: &str, component: &str) -> Result<&ComponentDescription, ManagerError> {
        let entry = self
            .processes
            .get(process)
            .ok_or_else(|| ManagerError::ProcessNotFound(process.to_string()))?;
        entry
            .components
            .get(component)
            .ok_or_else(|| ManagerError::ComponentNotFound {
                process: process.to_string(),
                component: component.to_string(),
            })
    }

    fn endpoint(&self, process: &str) -> Result<Endpoint, ManagerError> {
        self.processes
            .get(process)
            .map(|entry| entry.endpoint.clone())
            .ok_or_else(|| ManagerError::ProcessNotFound(process.to_string()))
    }

    /// Live or pending connection using the required interface `client`.
    fn connection_of_client(&self, client: &InterfaceAddress) -> Option<&ConnectionRecord> {
        self.connections
            .values()
            .find(|record| record.description.client == *client)
    }
}

/// The global component manager.
pub struct GlobalComponentManager {
    directory: Mutex<Directory>,
    next_id: AtomicU64,
    events: broadcast::Sender<ManagerEvent>,
    connector: Arc<dyn PeerConnector>,
    confirm_timeout: Duration,
    call_timeout: Duration,
}

impl GlobalComponentManager {
    pub fn new(connector: Arc<dyn PeerConnector>, confirm_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            directory: Mutex::new(Directory::default()),
            next_id: AtomicU64::new(1),
            events,
            connector,
            confirm_timeout,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bound each teardown call to a local manager by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Subscribe to directory events.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        debug!("GCM event {}", event.name());
        let _ = self.events.send(event);
    }

    /// Disconnect every pending connection older than the confirm timeout.
    pub async fn check_confirm_timeouts(&self) -> Vec<ConnectionId> {
        let expired: Vec<ConnectionId> = {
            let directory = self.directory.lock();
            directory
                .connections
                .values()
                .filter(|r| !r.confirmed && r.created.elapsed() >= self.confirm_timeout)
                .map(|r| r.description.id)
                .collect()
        };
        join_all(expired.iter().map(|id| async move {
            warn!("Connection {} was not confirmed in time, disconnecting", id);
            if let Err(e) = self.disconnect(*id).await {
                debug!("Cleanup of unconfirmed connection {} failed: {}", id, e);
            }
        }))
        .await;
        expired
    }

    /// Run `check_confirm_timeouts` every `interval` until cancelled.
    pub fn spawn_confirm_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let gcm = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        gcm.check_confirm_timeouts().await;
                    }
                }
            }
            debug!("Confirm sweeper stopped");
        })
    }

    /// Handle to the local manager of `process`.
    pub async fn local_manager(
        &self,
        process: &str,
    ) -> Result<Arc<dyn LocalManagerInterface>, ManagerError> {
        let endpoint = self.directory.lock().endpoint(process)?;
        self.connector.local(&endpoint).await
    }

    // ---- management operations forwarded to local managers ----

    /// Resolve and establish a connection, whichever process asks.
    pub async fn connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError> {
        let (client, server) = self.resolve_connection(client, server).await?;
        if let Some(id) = self.find_connection(client.clone(), server.clone()).await? {
            warn!("{} -> {} already connected as {}", client, server, id);
            return Ok(id);
        }
        self.initiate_connect(client, server).await
    }

    /// Disconnect the connection between two interfaces, if any.
    pub async fn disconnect_interfaces(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<(), ManagerError> {
        let (client, server) = self.resolve_connection(client, server).await?;
        match self.find_connection(client.clone(), server.clone()).await? {
            Some(id) => self.disconnect(id).await,
            None => Err(ManagerError::InvalidRequest(format!(
                "{} and {} are not connected",
                client, server
            ))),
        }
    }

    pub async fn create_component(
        &self,
        process: &str,
        class: &str,
        name: &str,
        args: Value,
    ) -> Result<(), ManagerError> {
        self.local_manager(process)
            .await?
            .create_component(class, name, args)
            .await
    }

    pub async fn configure_component(
        &self,
        process: &str,
        name: &str,
        config: &str,
    ) -> Result<(), ManagerError> {
        self.local_manager(process)
            .await?
            .configure_component(name, config)
            .await
    }

    pub async fn start_component(&self, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.local_manager(process)
            .await?
            .start_component(name, delay_secs)
            .await
    }

    pub async fn stop_component(&self, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.local_manager(process)
            .await?
            .stop_component(name, delay_secs)
            .await
    }

    pub async fn resume_component(&self, process: &str, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.local_manager(process)
            .await?
            .resume_component(name, delay_secs)
            .await
    }

    pub async fn load_library(&self, process: &str, library: &str) -> Result<(), ManagerError> {
        self.local_manager(process).await?.load_library(library).await
    }

    pub async fn class_names(&self, process: &str) -> Result<Vec<String>, ManagerError> {
        self.local_manager(process).await?.class_names().await
    }

    /// Tell each endpoint to drop its side of a connection. A peer that does
    /// not answer within the call timeout is logged and skipped.
    async fn disconnect_peers(&self, description: &ConnectionDescription, endpoints: Vec<Endpoint>) {
        let id = description.id;
        let teardowns = endpoints.into_iter().map(|endpoint| async move {
            let what = format!("Teardown of connection {} at {}", id, endpoint);
            let result = within(self.call_timeout, &what, async {
                self.connector.local(&endpoint).await?.disconnect_local(id).await
            })
            .await;
            if let Err(e) = result {
                warn!("Could not tear down connection {} at {}: {}", id, endpoint, e);
            }
        });
        join_all(teardowns).await;
    }
}

#[async_trait]
impl GlobalManagerInterface for GlobalComponentManager {
    async fn add_process(&self, process: &str, endpoint: Endpoint) -> Result<(), ManagerError> {
        {
            let mut directory = self.directory.lock();
            if directory.processes.contains_key(process) {
                return Err(ManagerError::AlreadyRegistered(process.to_string()));
            }
            directory.processes.insert(
                process.to_string(),
                ProcessEntry {
                    endpoint: endpoint.clone(),
                    components: BTreeMap::new(),
                },
            );
        }
        info!("Process {} registered at {}", process, endpoint);
        self.emit(ManagerEvent::AddProcess {
            process: process.to_string(),
        });
        Ok(())
    }

    async fn remove_process(&self, process: &str) -> Result<(), ManagerError> {
        let (entry, removed, remaining) = {
            let mut directory = self.directory.lock();
            let entry = directory
                .processes
                .remove(process)
                .ok_or_else(|| ManagerError::ProcessNotFound(process.to_string()))?;
            let ids: Vec<ConnectionId> = directory
                .connections
                .values()
                .filter(|r| r.description.involves_process(process))
                .map(|r| r.description.id)
                .collect();
            let mut removed = Vec::new();
            for id in ids {
                if let Some(record) = directory.connections.remove(&id) {
                    let peer = if record.description.client.process == process {
                        &record.description.server.process
                    } else {
                        &record.description.client.process
                    };
                    let endpoint = directory.processes.get(peer).map(|p| p.endpoint.clone());
                    removed.push((record.description, endpoint));
                }
            }
            let remaining = directory.processes.len();
            (entry, removed, remaining)
        };

        for (description, endpoint) in removed {
            self.emit(ManagerEvent::RemoveConnection(description.clone()));
            if let Some(endpoint) = endpoint {
                self.disconnect_peers(&description, vec![endpoint]).await;
            }
        }
        for component in entry.components.into_keys() {
            self.emit(ManagerEvent::RemoveComponent {
                process: process.to_string(),
                component,
            });
        }
        info!("Process {} removed ({} remaining)", process, remaining);
        self.emit(ManagerEvent::RemoveProcess {
            process: process.to_string(),
        });
        Ok(())
    }

    async fn process_endpoint(&self, process: &str) -> Result<Endpoint, ManagerError> {
        self.directory.lock().endpoint(process)
    }

    async fn register_component(&self, description: ComponentDescription) -> Result<(), ManagerError> {
        let added = {
            let mut directory = self.directory.lock();
            let entry = directory
                .processes
                .get_mut(&description.process)
                .ok_or_else(|| ManagerError::ProcessNotFound(description.process.clone()))?;
            entry
                .components
                .insert(description.name.clone(), description.clone())
                .is_none()
        };
        if added {
            debug!("Component {}:{} registered", description.process, description.name);
            self.emit(ManagerEvent::AddComponent {
                process: description.process,
                component: description.name,
            });
        }
        Ok(())
    }

    async fn remove_component(&self, process: &str, component: &str) -> Result<(), ManagerError> {
        let ids: Vec<ConnectionId> = {
            let mut directory = self.directory.lock();
            let entry = directory
                .processes
                .get_mut(process)
                .ok_or_else(|| ManagerError::ProcessNotFound(process.to_string()))?;
            entry
                .components
                .remove(component)
                .ok_or_else(|| ManagerError::ComponentNotFound {
                    process: process.to_string(),
                    component: component.to_string(),
                })?;
            directory
                .connections
                .values()
                .filter(|r| {
                    let d = &r.description;
                    (d.client.process == process && d.client.component == component)
                        || (d.server.process == process && d.server.component == component)
                })
                .map(|r| r.description.id)
                .collect()
        };
        for id in ids {
            if let Err(e) = self.disconnect(id).await {
                debug!("Disconnect of {} during component removal failed: {}", id, e);
            }
        }
        self.emit(ManagerEvent::RemoveComponent {
            process: process.to_string(),
            component: component.to_string(),
        });
        Ok(())
    }

    async fn set_component_state(&self, change: ComponentStateChange) -> Result<(), ManagerError> {
        {
            let mut directory = self.directory.lock();
            let description = directory
                .processes
                .get_mut(&change.process)
                .and_then(|entry| entry.components.get_mut(&change.component))
                .ok_or_else(|| ManagerError::ComponentNotFound {
                    process: change.process.clone(),
                    component: change.component.clone(),
                })?;
            description.state = change.state;
        }
        self.emit(ManagerEvent::ChangeState(change));
        Ok(())
    }

    async fn resolve_connection(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<(InterfaceAddress, InterfaceAddress), ManagerError> {
        let directory = self.directory.lock();
        let client_component = directory.component(&client.process, &client.component)?;
        let server_component = directory.component(&server.process, &server.component)?;

        let as_given = client_component.interfaces.required.contains(&client.interface)
            && server_component.interfaces.provided.contains(&server.interface);
        if as_given {
            return Ok((client, server));
        }
        let swapped = client_component.interfaces.provided.contains(&client.interface)
            && server_component.interfaces.required.contains(&server.interface);
        if swapped {
            debug!("Swapping reversed connection request {} -> {}", client, server);
            return Ok((server, client));
        }
        if !client_component.interfaces.required.contains(&client.interface)
            && !client_component.interfaces.provided.contains(&client.interface)
        {
            return Err(ManagerError::InterfaceNotFound(client));
        }
        Err(ManagerError::InterfaceNotFound(server))
    }

    async fn connect_setup(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionDescription, ManagerError> {
        let mut directory = self.directory.lock();
        directory.component(&client.process, &client.component)?;
        directory.component(&server.process, &server.component)?;
        if let Some(existing) = directory.connection_of_client(&client) {
            return Err(ManagerError::AlreadyConnected(existing.description.id));
        }
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let description = ConnectionDescription { id, client, server };
        directory.connections.insert(
            id,
            ConnectionRecord {
                description: description.clone(),
                confirmed: false,
                created: Instant::now(),
            },
        );
        debug!("Connection {} pending", description);
        Ok(description)
    }

    async fn connect_notify(&self, id: ConnectionId) -> Result<(), ManagerError> {
        let description = {
            let mut directory = self.directory.lock();
            let record = directory
                .connections
                .get_mut(&id)
                .ok_or(ManagerError::ConnectionNotFound(id))?;
            if record.confirmed {
                return Ok(());
            }
            record.confirmed = true;
            record.description.clone()
        };
        info!("Connection {} established", description);
        self.emit(ManagerEvent::AddConnection(description));
        Ok(())
    }

    async fn initiate_connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError> {
        let peer = self.local_manager(&client.process).await?;
        peer.connect(client, server).await
    }

    async fn disconnect(&self, id: ConnectionId) -> Result<(), ManagerError> {
        let (record, endpoints) = {
            let mut directory = self.directory.lock();
            let record = directory
                .connections
                .remove(&id)
                .ok_or(ManagerError::ConnectionNotFound(id))?;
            let mut processes = vec![record.description.client.process.clone()];
            if !record.description.is_local() {
                processes.push(record.description.server.process.clone());
            }
            let endpoints: Vec<Endpoint> = processes
                .iter()
                .filter_map(|p| directory.processes.get(p).map(|e| e.endpoint.clone()))
                .collect();
            (record, endpoints)
        };
        info!("Connection {} removed", record.description);
        self.disconnect_peers(&record.description, endpoints).await;
        if record.confirmed {
            self.emit(ManagerEvent::RemoveConnection(record.description));
        }
        Ok(())
    }

    async fn find_connection(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<Option<ConnectionId>, ManagerError> {
        let directory = self.directory.lock();
        Ok(directory
            .connections
            .values()
            .find(|r| r.description.client == client && r.description.server == server)
            .map(|r| r.description.id))
    }

    async fn names_of_processes(&self) -> Result<Vec<String>, ManagerError> {
        Ok(self.directory.lock().processes.keys().cloned().collect())
    }

    async fn names_of_components(&self, process: &str) -> Result<Vec<String>, ManagerError> {
        let directory = self.directory.lock();
        let entry = directory
            .processes
            .get(process)
            .ok_or_else(|| ManagerError::ProcessNotFound(process.to_string()))?;
        Ok(entry.components.keys().cloned().collect())
    }

    async fn names_of_interfaces(&self, process: &str, component: &str) -> Result<InterfaceNames, ManagerError> {
        let directory = self.directory.lock();
        Ok(directory.component(process, component)?.interfaces.clone())
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionDescription>, ManagerError> {
        Ok(self
            .directory
            .lock()
            .connections
            .values()
            .filter(|r| r.confirmed)
            .map(|r| r.description.clone())
            .collect())
    }

    async fn component_state(&self, process: &str, component: &str) -> Result<ComponentState, ManagerError> {
        let directory = self.directory.lock();
        Ok(directory.component(process, component)?.state)
    }
}

#[cfg(test)]
#[path = "global_tests.rs"]
mod tests;
