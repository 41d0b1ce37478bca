//! Manager components: the management command set exposed as ordinary
//! component interfaces.
//!
//! The process hosting the global manager runs a server component (`MCS`)
//! whose `InterfaceGCM` executes management requests on the server's own
//! thread. Every process runs a client component (`MCC_<process>`) whose
//! required `InterfaceGCM` is connected to the server like any other
//! connection. User components reach the managers through the client's
//! `InterfaceComponent`, usually via [`ManagerComponentServices`].
//!
//! Every command answers with a serialized `Result<T, ManagerError>`.
//!
//! [`ManagerComponentServices`]: crate::services::ManagerComponentServices

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use taskmesh_core::{
    CommandError, Component, ComponentResult, IdleTask, InterfaceProvided, InterfaceRequired,
};
use taskmesh_protocols::{
    CommandKind, ComponentState, ConnectionId, GlobalManagerInterface, InterfaceAddress,
    LocalManagerInterface, ManagerError, ManagerEvent, QueuingPolicy, Requiredness,
};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::blocking::run_blocking;
use crate::config::ManagerConfig;
use crate::error::from_component_error;
use crate::global::GlobalComponentManager;
use crate::local::LocalComponentManager;
use crate::services::SERVICES_INTERFACE;

pub const MANAGER_SERVER: &str = "MCS";
pub const INTERFACE_GCM: &str = "InterfaceGCM";
pub const INTERFACE_COMPONENT: &str = "InterfaceComponent";

/// Name of the manager component client of `process`.
pub fn manager_client_name(process: &str) -> String {
    format!("MCC_{}", process)
}

/// Management commands and their kinds.
pub const MANAGER_FUNCTIONS: [(&str, CommandKind); 14] = [
    ("ComponentCreate", CommandKind::QualifiedRead),
    ("ComponentConfigure", CommandKind::QualifiedRead),
    ("ComponentConnect", CommandKind::QualifiedRead),
    ("ComponentDisconnect", CommandKind::QualifiedRead),
    ("ComponentStart", CommandKind::QualifiedRead),
    ("ComponentStop", CommandKind::QualifiedRead),
    ("ComponentResume", CommandKind::QualifiedRead),
    ("ComponentGetState", CommandKind::QualifiedRead),
    ("GetNamesOfProcesses", CommandKind::Read),
    ("GetNamesOfComponents", CommandKind::QualifiedRead),
    ("GetNamesOfInterfaces", CommandKind::QualifiedRead),
    ("GetListOfConnections", CommandKind::Read),
    ("LoadLibrary", CommandKind::QualifiedRead),
    ("GetListOfComponentClasses", CommandKind::QualifiedRead),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub process: String,
    pub class: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub process: String,
    pub name: String,
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub client: InterfaceAddress,
    pub server: InterfaceAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisconnectRequest {
    ById { id: ConnectionId },
    ByInterfaces {
        client: InterfaceAddress,
        server: InterfaceAddress,
    },
}

/// Start, stop or resume after `delay_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRequest {
    pub process: String,
    pub name: String,
    #[serde(default)]
    pub delay_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub process: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRef {
    pub process: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRequest {
    pub process: String,
    pub library: String,
}

/// Encode a failure the way every management command answers.
pub(crate) fn failure_value(err: ManagerError) -> Value {
    serde_json::to_value(Result::<(), ManagerError>::Err(err)).unwrap_or(Value::Null)
}

fn add_server_command<R, T, F, Fut>(
    interface: &InterfaceProvided,
    name: &str,
    kind: CommandKind,
    context: &ServerContext,
    op: F,
) -> ComponentResult<()>
where
    R: DeserializeOwned,
    T: Serialize + Send + 'static,
    F: Fn(Arc<GlobalComponentManager>, R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ManagerError>> + Send + 'static,
{
    let context = context.clone();
    let handler = Arc::new(move |argument: Value| -> Result<Value, CommandError> {
        let request: R = serde_json::from_value(argument)
            .map_err(|e| CommandError::InvalidInput(e.to_string()))?;
        let outcome = run_blocking(
            &context.runtime,
            Some(context.timeout),
            op(context.gcm.clone(), request),
        );
        Ok(serde_json::to_value(outcome)?)
    });
    // queued: requests run on the server's own thread, one at a time
    interface.add_command(name, kind, handler, true)
}

#[derive(Clone)]
struct ServerContext {
    gcm: Arc<GlobalComponentManager>,
    runtime: Handle,
    timeout: Duration,
}

/// Build the manager component server of the process hosting `gcm`.
///
/// The returned component still has to be added to the local manager,
/// created and started.
pub fn build_manager_server(
    gcm: Arc<GlobalComponentManager>,
    config: &ManagerConfig,
    runtime: &Handle,
) -> ComponentResult<Arc<Component>> {
    let component = Component::builder(MANAGER_SERVER)
        .class("ManagerComponentServer")
        .from_signal()
        .mailbox_size(config.manager_mailbox_size)
        .build(IdleTask)?;
    let interface = component.add_interface_provided(INTERFACE_GCM, QueuingPolicy::Queued)?;
    interface.set_command_timeout(config.management_timeout());

    let context = ServerContext {
        gcm: gcm.clone(),
        runtime: runtime.clone(),
        timeout: config.management_timeout(),
    };
    let qualified = CommandKind::QualifiedRead;

    add_server_command(&interface, "ComponentCreate", qualified, &context, |gcm, req: CreateRequest| async move {
        gcm.create_component(&req.process, &req.class, &req.name, req.args).await
    })?;
    add_server_command(&interface, "ComponentConfigure", qualified, &context, |gcm, req: ConfigureRequest| async move {
        gcm.configure_component(&req.process, &req.name, &req.config).await
    })?;
    add_server_command(&interface, "ComponentConnect", qualified, &context, |gcm, req: ConnectRequest| async move {
        gcm.connect(req.client, req.server).await
    })?;
    add_server_command(&interface, "ComponentDisconnect", qualified, &context, |gcm, req: DisconnectRequest| async move {
        match req {
            DisconnectRequest::ById { id } => gcm.disconnect(id).await,
            DisconnectRequest::ByInterfaces { client, server } => {
                gcm.disconnect_interfaces(client, server).await
            }
        }
    })?;
    add_server_command(&interface, "ComponentStart", qualified, &context, |gcm, req: LifecycleRequest| async move {
        gcm.start_component(&req.process, &req.name, req.delay_secs).await
    })?;
    add_server_command(&interface, "ComponentStop", qualified, &context, |gcm, req: LifecycleRequest| async move {
        gcm.stop_component(&req.process, &req.name, req.delay_secs).await
    })?;
    add_server_command(&interface, "ComponentResume", qualified, &context, |gcm, req: LifecycleRequest| async move {
        gcm.resume_component(&req.process, &req.name, req.delay_secs).await
    })?;
    add_server_command(&interface, "ComponentGetState", qualified, &context, |gcm, req: ComponentRef| async move {
        // ask the owning process, which knows about manager components
        gcm.local_manager(&req.process)
            .await?
            .component_state(&req.name)
            .await
    })?;
    add_server_command(&interface, "GetNamesOfProcesses", CommandKind::Read, &context, |gcm, _: ()| async move {
        gcm.names_of_processes().await
    })?;
    add_server_command(&interface, "GetNamesOfComponents", qualified, &context, |gcm, req: ProcessRef| async move {
        gcm.names_of_components(&req.process).await
    })?;
    add_server_command(&interface, "GetNamesOfInterfaces", qualified, &context, |gcm, req: ComponentRef| async move {
        gcm.names_of_interfaces(&req.process, &req.name).await
    })?;
    add_server_command(&interface, "GetListOfConnections", CommandKind::Read, &context, |gcm, _: ()| async move {
        gcm.list_connections().await
    })?;
    add_server_command(&interface, "LoadLibrary", qualified, &context, |gcm, req: LibraryRequest| async move {
        gcm.load_library(&req.process, &req.library).await
    })?;
    add_server_command(&interface, "GetListOfComponentClasses", qualified, &context, |gcm, req: ProcessRef| async move {
        gcm.class_names(&req.process).await
    })?;

    for event in ManagerEvent::NAMES {
        interface.add_event_write(event)?;
    }
    spawn_event_pump(&gcm, interface, Arc::downgrade(&component), runtime);
    Ok(component)
}

/// Re-raise global manager events on the server interface until the
/// server component terminates.
fn spawn_event_pump(
    gcm: &GlobalComponentManager,
    interface: Arc<InterfaceProvided>,
    component: Weak<Component>,
    runtime: &Handle,
) {
    let mut events = gcm.subscribe();
    runtime.spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let alive = component
                        .upgrade()
                        .is_some_and(|c| !c.state().is_terminal());
                    if !alive {
                        break;
                    }
                    let payload = match serde_json::to_value(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Cannot encode manager event {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    let result = interface.raise_event(event.name(), payload);
                    if !result.is_ok() {
                        debug!("Raising {} returned {}", event.name(), result);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Manager component server missed {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Manager event pump stopped");
    });
}

fn forward(server: &InterfaceRequired, function: &str, argument: Value) -> Value {
    match server.call(function, argument).into_result() {
        Ok(value) => value,
        Err(result) => failure_value(ManagerError::Network(format!(
            "{} returned {}",
            function, result
        ))),
    }
}

/// Build the manager component client of `process`.
///
/// Its required `InterfaceGCM` must be connected to the server before the
/// component is created.
pub fn build_manager_client(process: &str, config: &ManagerConfig) -> ComponentResult<Arc<Component>> {
    let component = Component::builder(manager_client_name(process))
        .class("ManagerComponentClient")
        .from_signal()
        .mailbox_size(config.manager_mailbox_size)
        .build(IdleTask)?;
    let to_server = component.add_interface_required(INTERFACE_GCM, Requiredness::Required)?;
    let provided = component.add_interface_provided(INTERFACE_COMPONENT, QueuingPolicy::NotQueued)?;

    for (name, kind) in MANAGER_FUNCTIONS {
        to_server.add_function(name, kind)?;
        let server = to_server.clone();
        provided.add_command(
            name,
            kind,
            Arc::new(move |argument: Value| -> Result<Value, CommandError> {
                Ok(forward(&server, name, argument))
            }),
            false,
        )?;
    }
    for event in ManagerEvent::NAMES {
        provided.add_event_write(event)?;
        let out = Arc::downgrade(&provided);
        to_server.add_event_handler_write(event, false, move |payload| {
            if let Some(out) = out.upgrade() {
                let _ = out.raise_event(event, payload);
            }
        })?;
    }
    Ok(component)
}

fn bring_up(component: &Component) -> ComponentResult<()> {
    if component.state() == ComponentState::Constructed {
        component.create()?;
    }
    if !component.wait_for_state(ComponentState::Ready, Duration::from_secs(5)) {
        return Err(taskmesh_core::ComponentError::task(format!(
            "{} did not become ready",
            component.name()
        )));
    }
    component.start()
}

impl LocalComponentManager {
    /// Add the manager components of this process. Pass the global manager
    /// when this process hosts it, so the server component runs here too.
    pub async fn enable_manager_components(
        &self,
        gcm: Option<Arc<GlobalComponentManager>>,
    ) -> Result<(), ManagerError> {
        let process = self.process().to_string();

        if let Some(gcm) = gcm {
            let server = build_manager_server(gcm, self.config(), self.runtime())
                .map_err(|e| from_component_error(&process, e))?;
            self.add_manager_component(server.clone()).await?;
            let p = process.clone();
            self.blocking(move || bring_up(&server).map_err(|e| from_component_error(&p, e)))
                .await?;
            info!("Manager component server running in {}", process);
        }

        let client = build_manager_client(&process, self.config())
            .map_err(|e| from_component_error(&process, e))?;
        let client_name = client.name().to_string();
        self.add_manager_component(client.clone()).await?;
        self.connect(
            InterfaceAddress::new(&process, &client_name, INTERFACE_GCM),
            InterfaceAddress::new(&self.config().server_process, MANAGER_SERVER, INTERFACE_GCM),
        )
        .await?;
        let p = process.clone();
        self.blocking(move || bring_up(&client).map_err(|e| from_component_error(&p, e)))
            .await?;
        info!("Manager component client {} running", client_name);
        Ok(())
    }

    /// Connect the manager services interface of `component` to this
    /// process's manager component client.
    pub async fn connect_services(&self, component: &str) -> Result<ConnectionId, ManagerError> {
        let process = self.process().to_string();
        self.connect(
            InterfaceAddress::new(&process, component, SERVICES_INTERFACE),
            InterfaceAddress::new(&process, manager_client_name(&process), INTERFACE_COMPONENT),
        )
        .await
    }
}
