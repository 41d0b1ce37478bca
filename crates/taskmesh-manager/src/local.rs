//! Local component manager: owns the components of one process and binds
//! their interfaces on behalf of the global manager.
//!
//! Every binding the process holds lives in one map keyed by connection id,
//! so tearing a connection down never depends on which side goes first.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use taskmesh_config::Config;
use taskmesh_core::{
    ClientId, Component, ComponentFactory, ComponentRegistry, INTERFACE_INTERNAL,
    InterfaceProvided, InterfaceRequired, InterfaceTarget,
};
use taskmesh_protocols::{
    CommandReply, ComponentState, ComponentStateChange, ConnectionDescription, ConnectionId,
    Endpoint, ExecutionResult, GlobalManagerInterface, InterfaceAddress,
    InterfaceProvidedDescription, LocalManagerInterface, ManagerError, PeerConnector,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::error::{from_component_error, within};
use crate::proxy::{ProvidedInterfaceProxy, RequiredInterfaceProxy};

/// One side of a connection held by this process.
enum Binding {
    /// Client and server both live here.
    Local { required: Arc<InterfaceRequired> },
    /// Our required interface bound to a proxy of a remote provided interface.
    Client {
        required: Arc<InterfaceRequired>,
        proxy: Arc<ProvidedInterfaceProxy>,
    },
    /// Our provided interface serving a remote client.
    Server { proxy: Arc<RequiredInterfaceProxy> },
}

/// Run `op` until it succeeds, fails with a non-retriable error, or
/// `config.retry_count` attempts have failed.
async fn with_retries<T, F, Fut>(config: &ManagerConfig, what: &str, mut op: F) -> Result<T, ManagerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ManagerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt < config.retry_count => {
                let delay = config.retry_delay_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    what, attempt, config.retry_count, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_retriable() => {
                error!("{} failed after {} attempts: {}", what, attempt, e);
                return Err(ManagerError::ConnectionFailed {
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

fn delay_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

/// The local component manager of one process.
pub struct LocalComponentManager {
    config: ManagerConfig,
    endpoint: Endpoint,
    global: Arc<dyn GlobalManagerInterface>,
    connector: Arc<dyn PeerConnector>,
    registry: ComponentRegistry,
    factory: Arc<ComponentFactory>,
    runtime: Handle,
    bindings: Mutex<HashMap<ConnectionId, Binding>>,
    states: mpsc::UnboundedSender<ComponentStateChange>,
    internal_clients: Mutex<HashMap<String, ClientId>>,
    manager_components: Mutex<BTreeSet<String>>,
    this: Weak<LocalComponentManager>,
}

impl LocalComponentManager {
    /// Register this process with the global manager and start reporting
    /// component state changes to it.
    ///
    /// Must be called from within a tokio runtime; the manager keeps a
    /// handle to it for calls made from component threads.
    pub async fn start(
        config: ManagerConfig,
        endpoint: Endpoint,
        global: Arc<dyn GlobalManagerInterface>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Arc<Self>, ManagerError> {
        let what = format!("Registering process {}", config.process);
        with_retries(&config, &what, || global.add_process(&config.process, endpoint.clone())).await?;

        let (states, mut rx) = mpsc::unbounded_channel::<ComponentStateChange>();
        let reporter = global.clone();
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                if let Err(e) = reporter.set_component_state(change.clone()).await {
                    debug!(
                        "State {} of {}:{} not recorded: {}",
                        change.state, change.process, change.component, e
                    );
                }
            }
        });

        info!("Local component manager {} started at {}", config.process, endpoint);
        Ok(Arc::new_cyclic(|this| Self {
            config,
            endpoint,
            global,
            connector,
            registry: ComponentRegistry::new(),
            factory: Arc::new(ComponentFactory::new()),
            runtime: Handle::current(),
            bindings: Mutex::new(HashMap::new()),
            states,
            internal_clients: Mutex::new(HashMap::new()),
            manager_components: Mutex::new(BTreeSet::new()),
            this: this.clone(),
        }))
    }

    pub fn process(&self) -> &str {
        &self.config.process
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn global(&self) -> &Arc<dyn GlobalManagerInterface> {
        &self.global
    }

    pub fn factory(&self) -> &Arc<ComponentFactory> {
        &self.factory
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<Self>> {
        self.this.upgrade()
    }

    pub fn component(&self, name: &str) -> Option<Arc<Component>> {
        self.registry.get(name)
    }

    fn require_component(&self, name: &str) -> Result<Arc<Component>, ManagerError> {
        self.registry
            .get(name)
            .ok_or_else(|| ManagerError::ComponentNotFound {
                process: self.config.process.clone(),
                component: name.to_string(),
            })
    }

    pub fn is_manager_component(&self, name: &str) -> bool {
        self.manager_components.lock().contains(name)
    }

    fn component_error(&self, err: taskmesh_core::ComponentError) -> ManagerError {
        from_component_error(&self.config.process, err)
    }

    /// Connection ids with a binding in this process.
    pub fn bound_connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.bindings.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    // ---- component registry ----

    /// Add a component to this process and announce it to the global manager.
    pub async fn add_component(&self, component: Arc<Component>) -> Result<(), ManagerError> {
        let name = component.name().to_string();
        self.registry
            .register(component.clone())
            .map_err(|e| self.component_error(e))?;

        if let Err(e) = self
            .global
            .register_component(component.description(&self.config.process))
            .await
        {
            warn!("Global manager rejected component {}: {}", name, e);
            let _ = self.registry.unregister(&name);
            return Err(e);
        }

        let states = self.states.clone();
        let process = self.config.process.clone();
        component.add_state_listener(Arc::new(move |component: &str, state: ComponentState| {
            let _ = states.send(ComponentStateChange {
                process: process.clone(),
                component: component.to_string(),
                state,
            });
        }));
        // covers any transition between registration and the listener
        let _ = self.states.send(ComponentStateChange {
            process: self.config.process.clone(),
            component: name.clone(),
            state: component.state(),
        });

        info!("Component {} added to process {}", name, self.config.process);
        Ok(())
    }

    /// Add a component that serves the manager itself. Lifecycle requests
    /// addressed to it are ignored and it is left running by `kill_all`.
    pub(crate) async fn add_manager_component(&self, component: Arc<Component>) -> Result<(), ManagerError> {
        self.manager_components
            .lock()
            .insert(component.name().to_string());
        let result = self.add_component(component.clone()).await;
        if result.is_err() {
            self.manager_components.lock().remove(component.name());
        }
        result
    }

    /// Kill a component, drop its connections and forget it.
    pub async fn remove_component(&self, name: &str) -> Result<(), ManagerError> {
        let component = self.registry.unregister(name).map_err(|e| self.component_error(e))?;
        self.manager_components.lock().remove(name);
        self.internal_clients.lock().remove(name);
        tokio::task::spawn_blocking(move || component.kill())
            .await
            .map_err(|e| ManagerError::Component(e.to_string()))?;
        self.global.remove_component(&self.config.process, name).await?;
        info!("Component {} removed from process {}", name, self.config.process);
        Ok(())
    }

    // ---- interface lookup ----

    fn local_address(&self, address: &InterfaceAddress) -> Result<Arc<Component>, ManagerError> {
        if address.process != self.config.process {
            return Err(ManagerError::InvalidRequest(format!(
                "{} does not belong to process {}",
                address, self.config.process
            )));
        }
        self.require_component(&address.component)
    }

    fn required_interface(&self, address: &InterfaceAddress) -> Result<Arc<InterfaceRequired>, ManagerError> {
        self.local_address(address)?
            .interface_required(&address.interface)
            .ok_or_else(|| ManagerError::InterfaceNotFound(address.clone()))
    }

    fn provided_interface(&self, address: &InterfaceAddress) -> Result<Arc<InterfaceProvided>, ManagerError> {
        self.local_address(address)?
            .interface_provided(&address.interface)
            .ok_or_else(|| ManagerError::InterfaceNotFound(address.clone()))
    }

    /// Re-announce a local component so interfaces added after
    /// registration are known to the global manager.
    async fn refresh_registration(&self, address: &InterfaceAddress) -> Result<(), ManagerError> {
        if address.process != self.config.process {
            return Ok(());
        }
        if let Some(component) = self.registry.get(&address.component) {
            self.global
                .register_component(component.description(&self.config.process))
                .await?;
        }
        Ok(())
    }

    // ---- connections ----

    async fn try_connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError> {
        self.refresh_registration(&client).await?;
        self.refresh_registration(&server).await?;
        let (client, server) = self.global.resolve_connection(client, server).await?;

        if let Some(id) = self.global.find_connection(client.clone(), server.clone()).await? {
            warn!("{} -> {} already connected as {}", client, server, id);
            return Ok(id);
        }
        if client.process != self.config.process {
            debug!("Asking process {} to connect {} -> {}", client.process, client, server);
            return self.global.initiate_connect(client, server).await;
        }

        let description = self.global.connect_setup(client, server).await?;
        let id = description.id;
        if let Err(e) = self.bind_client_side(&description).await {
            warn!("Binding {} failed: {}", description, e);
            if let Err(cleanup) = self.global.disconnect(id).await {
                debug!("Cleanup of connection {} failed: {}", id, cleanup);
            }
            return Err(e);
        }
        if let Err(e) = self.global.connect_notify(id).await {
            warn!("Connection {} could not be confirmed: {}", id, e);
            self.unbind(id);
            return Err(e);
        }
        info!("Connected {}", description);
        Ok(id)
    }

    async fn bind_client_side(&self, description: &ConnectionDescription) -> Result<(), ManagerError> {
        let required = self.required_interface(&description.client)?;
        if description.is_local() {
            let provided: Arc<dyn InterfaceTarget> = self.provided_interface(&description.server)?;
            required.connect(provided).map_err(|e| self.component_error(e))?;
            self.bindings
                .lock()
                .insert(description.id, Binding::Local { required });
            return Ok(());
        }

        let (peer, provided) = within(
            self.config.command_timeout,
            &format!("Server side of connection {}", description.id),
            async {
                let endpoint = self.global.process_endpoint(&description.server.process).await?;
                let peer = self.connector.local(&endpoint).await?;
                let provided = peer
                    .connect_server_side(description.clone(), self.endpoint.clone())
                    .await?;
                Ok((peer, provided))
            },
        )
        .await?;
        let proxy = ProvidedInterfaceProxy::new(
            description.id,
            provided,
            peer,
            self.runtime.clone(),
            self.config.management_timeout(),
        );
        let target: Arc<dyn InterfaceTarget> = proxy.clone();
        required.connect(target).map_err(|e| self.component_error(e))?;
        self.bindings
            .lock()
            .insert(description.id, Binding::Client { required, proxy });
        Ok(())
    }

    /// Drop the local binding of a connection. Returns whether one existed.
    fn unbind(&self, id: ConnectionId) -> bool {
        let Some(binding) = self.bindings.lock().remove(&id) else {
            return false;
        };
        match binding {
            Binding::Local { required } => {
                if let Err(e) = required.disconnect() {
                    debug!("Connection {}: {}", id, e);
                }
            }
            Binding::Client { required, proxy } => {
                proxy.close();
                if let Err(e) = required.disconnect() {
                    debug!("Connection {}: {}", id, e);
                }
            }
            Binding::Server { proxy } => proxy.detach(),
        }
        debug!("Connection {} unbound in process {}", id, self.config.process);
        true
    }

    /// Disconnect a connection anywhere in the system. An unknown id is a
    /// no-op reported as `Ok(false)`.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<bool, ManagerError> {
        match self.global.disconnect(id).await {
            Ok(()) => Ok(true),
            Err(ManagerError::ConnectionNotFound(_)) => {
                warn!("Disconnect of unknown connection {} ignored", id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Disconnect whatever connects two interfaces.
    pub async fn disconnect_interfaces(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<bool, ManagerError> {
        let (client, server) = self.global.resolve_connection(client, server).await?;
        match self.global.find_connection(client.clone(), server.clone()).await? {
            Some(id) => self.disconnect(id).await,
            None => {
                warn!("{} and {} are not connected", client, server);
                Ok(false)
            }
        }
    }

    // ---- management helpers ----

    fn internal_client(&self, name: &str, internal: &Arc<InterfaceProvided>) -> ClientId {
        *self
            .internal_clients
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| internal.attach())
    }

    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T, ManagerError>
    where
        F: FnOnce() -> Result<T, ManagerError> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| ManagerError::Component(format!("blocking task failed: {}", e)))?
    }

    fn user_components(&self) -> Vec<Arc<Component>> {
        let managers = self.manager_components.lock().clone();
        self.registry
            .snapshot()
            .into_iter()
            .filter(|c| !managers.contains(c.name()))
            .collect()
    }

    // ---- bulk operations ----

    /// Create every component still CONSTRUCTED.
    pub fn create_all(&self) -> Result<(), ManagerError> {
        for component in self.user_components() {
            if component.state() == ComponentState::Constructed {
                component.create().map_err(|e| self.component_error(e))?;
            }
        }
        Ok(())
    }

    /// Start every READY component.
    pub fn start_all(&self) -> Result<(), ManagerError> {
        for component in self.user_components() {
            if component.state() == ComponentState::Ready {
                component.start().map_err(|e| self.component_error(e))?;
            }
        }
        Ok(())
    }

    /// Kill every component except the manager components.
    pub fn kill_all(&self) {
        for component in self.user_components() {
            component.kill();
        }
    }

    /// Whether every user component reached at least `state` in time.
    pub fn wait_for_state_all(&self, state: ComponentState, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut all = true;
        for component in self.user_components() {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            if !component.wait_for_state(state, left) {
                warn!(
                    "Component {} is {} after waiting for {}",
                    component.name(),
                    component.state(),
                    state
                );
                all = false;
            }
        }
        all
    }

    pub fn create_all_and_wait(&self, timeout: Duration) -> Result<bool, ManagerError> {
        self.create_all()?;
        Ok(self.wait_for_state_all(ComponentState::Ready, timeout))
    }

    pub fn start_all_and_wait(&self, timeout: Duration) -> Result<bool, ManagerError> {
        self.start_all()?;
        Ok(self.wait_for_state_all(ComponentState::Active, timeout))
    }

    pub fn kill_all_and_wait(&self, timeout: Duration) -> bool {
        self.kill_all();
        self.wait_for_state_all(ComponentState::Finished, timeout)
    }

    /// Create the components and connections a configuration file declares.
    pub async fn configure_from(&self, config: &Config) -> Result<(), ManagerError> {
        for entry in &config.components {
            self.create_component(&entry.class, &entry.name, entry.args.clone())
                .await?;
            if let Some(text) = &entry.configure {
                self.configure_component(&entry.name, text).await?;
            }
        }
        for entry in &config.connections {
            let client = InterfaceAddress::parse(&entry.client, &self.config.process)
                .ok_or_else(|| ManagerError::InvalidRequest(format!("bad address {}", entry.client)))?;
            let server = InterfaceAddress::parse(&entry.server, &self.config.process)
                .ok_or_else(|| ManagerError::InvalidRequest(format!("bad address {}", entry.server)))?;
            self.connect(client, server).await?;
        }
        Ok(())
    }

    /// Kill every component, wait for them and leave the system.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ManagerError> {
        let components = self.registry.snapshot();
        let finished = self
            .blocking(move || {
                let deadline = std::time::Instant::now() + timeout;
                let mut finished = true;
                for component in &components {
                    component.kill();
                }
                for component in &components {
                    let left = deadline.saturating_duration_since(std::time::Instant::now());
                    finished &= component.wait_to_terminate(left);
                }
                Ok(finished)
            })
            .await?;
        if !finished {
            warn!("Some components of {} did not finish in time", self.config.process);
        }
        let ids: Vec<ConnectionId> = self.bound_connections();
        for id in ids {
            self.unbind(id);
        }
        self.global.remove_process(&self.config.process).await?;
        info!("Local component manager {} shut down", self.config.process);
        Ok(())
    }
}

#[async_trait]
impl LocalManagerInterface for LocalComponentManager {
    async fn connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError> {
        let what = format!("Connect {} -> {}", client, server);
        with_retries(&self.config, &what, || {
            self.try_connect(client.clone(), server.clone())
        })
        .await
    }

    async fn connect_server_side(
        &self,
        connection: ConnectionDescription,
        client_endpoint: Endpoint,
    ) -> Result<InterfaceProvidedDescription, ManagerError> {
        let provided = self.provided_interface(&connection.server)?;
        let peer = self.connector.local(&client_endpoint).await?;
        let target: Arc<dyn InterfaceTarget> = provided.clone();
        let proxy = RequiredInterfaceProxy::attach(connection.id, target, peer, &self.runtime);
        self.bindings
            .lock()
            .insert(connection.id, Binding::Server { proxy });
        debug!("Serving {} for {}", connection, client_endpoint);
        Ok(provided.description())
    }

    async fn disconnect_local(&self, id: ConnectionId) -> Result<(), ManagerError> {
        if !self.unbind(id) {
            debug!("No binding for connection {} in process {}", id, self.config.process);
        }
        Ok(())
    }

    async fn execute_command(&self, id: ConnectionId, command: String, argument: Value) -> CommandReply {
        let proxy = match self.bindings.lock().get(&id) {
            Some(Binding::Server { proxy }) => proxy.clone(),
            _ => return CommandReply::failed(ExecutionResult::FunctionNotBound),
        };
        tokio::task::spawn_blocking(move || proxy.execute(&command, argument))
            .await
            .unwrap_or_else(|_| CommandReply::failed(ExecutionResult::CommandException))
    }

    async fn deliver_event(&self, id: ConnectionId, event: String, payload: Value) -> ExecutionResult {
        let proxy = match self.bindings.lock().get(&id) {
            Some(Binding::Client { proxy, .. }) => proxy.clone(),
            _ => return ExecutionResult::FunctionNotBound,
        };
        tokio::task::spawn_blocking(move || proxy.deliver(&event, payload))
            .await
            .unwrap_or(ExecutionResult::CommandException)
    }

    async fn create_component(&self, class: &str, name: &str, args: Value) -> Result<(), ManagerError> {
        let component = self
            .factory
            .create(class, name, &args)
            .map_err(|e| self.component_error(e))?;
        self.add_component(component).await
    }

    async fn configure_component(&self, name: &str, config: &str) -> Result<(), ManagerError> {
        let component = self.require_component(name)?;
        let process = self.config.process.clone();
        let config = config.to_string();
        self.blocking(move || {
            component
                .configure(&config)
                .map_err(|e| from_component_error(&process, e))
        })
        .await
    }

    async fn start_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        let component = self.require_component(name)?;
        if self.is_manager_component(name) {
            warn!("Ignoring start of manager component {}", name);
            return Ok(());
        }
        let process = self.config.process.clone();
        let ready_timeout = self.config.command_timeout;
        let delay = delay_from_secs(delay_secs);
        self.blocking(move || {
            if component.state() == ComponentState::Constructed {
                component
                    .create()
                    .map_err(|e| from_component_error(&process, e))?;
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            if !component.wait_for_state(ComponentState::Ready, ready_timeout) {
                return Err(ManagerError::Component(format!(
                    "{} is {} and cannot start",
                    component.name(),
                    component.state()
                )));
            }
            component.start().map_err(|e| from_component_error(&process, e))
        })
        .await
    }

    async fn stop_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        let component = self.require_component(name)?;
        if self.is_manager_component(name) {
            warn!("Ignoring stop of manager component {}", name);
            return Ok(());
        }
        let internal = component
            .interface_provided(INTERFACE_INTERNAL)
            .ok_or_else(|| ManagerError::Component(format!("{} has no {}", name, INTERFACE_INTERNAL)))?;
        let client = self.internal_client(name, &internal);
        let delay = delay_from_secs(delay_secs);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let name = name.to_string();
        self.blocking(move || {
            let reply = internal.execute(client, "ComponentStop", Value::Null);
            if reply.is_ok() {
                Ok(())
            } else {
                Err(ManagerError::Component(format!(
                    "ComponentStop on {} returned {}",
                    name, reply.result
                )))
            }
        })
        .await
    }

    async fn resume_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        let component = self.require_component(name)?;
        if self.is_manager_component(name) {
            warn!("Ignoring resume of manager component {}", name);
            return Ok(());
        }
        let delay = delay_from_secs(delay_secs);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let process = self.config.process.clone();
        self.blocking(move || component.start().map_err(|e| from_component_error(&process, e)))
            .await
    }

    async fn component_state(&self, name: &str) -> Result<ComponentState, ManagerError> {
        let component = self.require_component(name)?;
        if self.is_manager_component(name) {
            return Ok(ComponentState::Active);
        }
        Ok(component.state())
    }

    async fn load_library(&self, library: &str) -> Result<(), ManagerError> {
        let classes = self
            .factory
            .load_library(library)
            .map_err(|e| self.component_error(e))?;
        info!(
            "Process {} loaded library {} ({} classes)",
            self.config.process,
            library,
            classes.len()
        );
        Ok(())
    }

    async fn class_names(&self) -> Result<Vec<String>, ManagerError> {
        Ok(self.factory.class_names())
    }
}

impl std::fmt::Debug for LocalComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComponentManager")
            .field("process", &self.config.process)
            .field("endpoint", &self.endpoint)
            .field("components", &self.registry.names())
            .finish()
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
