//! TCP transport for remote managers.
//!
//! Messages are JSON objects, one per line. Clients tag every request with
//! an id and may have several in flight on one connection; servers handle
//! each request in its own task and answer with the same id.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use taskmesh_protocols::wire::{GlobalRequest, LocalRequest, RequestEnvelope, ResponseEnvelope};
use taskmesh_protocols::{
    CommandReply, ComponentDescription, ComponentState, ComponentStateChange,
    ConnectionDescription, ConnectionId, Endpoint, ExecutionResult, GlobalManagerInterface,
    InterfaceAddress, InterfaceNames, InterfaceProvidedDescription, LocalManagerInterface,
    ManagerError, TransportError,
};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest line either side accepts; longer lines are skipped.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// How long a client waits for the answer to one request by default.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;

fn line_reader(read: OwnedReadHalf) -> LineReader {
    FramedRead::new(read, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
}

/// Next complete line, skipping over lines longer than [`MAX_LINE_LENGTH`].
/// `None` once the peer has gone away.
async fn next_line(lines: &mut LineReader) -> Option<String> {
    loop {
        match lines.next().await? {
            Ok(line) => return Some(line),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
            }
            Err(LinesCodecError::Io(e)) => {
                debug!("Manager connection read failed: {}", e);
                return None;
            }
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), TransportError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

type Pending = Arc<DashMap<u64, oneshot::Sender<ResponseEnvelope>>>;

/// Client half of a line connection with any number of requests in flight.
struct LineClient {
    addr: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl LineClient {
    async fn connect(addr: &str, timeout: Duration) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout)??;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_responses(line_reader(read), pending.clone(), closed.clone()));
        debug!("Connected to {}", addr);
        Ok(Self {
            addr: addr.to_string(),
            writer: Mutex::new(write),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            timeout,
            reader,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn call<R: Serialize>(&self, request: R) -> Result<ResponseEnvelope, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&RequestEnvelope { id, request })?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // the reader marks the client closed before it clears `pending`, so
        // checking after the insert cannot miss a concurrent close
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(TransportError::Closed);
        }
        let written = {
            let mut writer = self.writer.lock().await;
            write_line(&mut writer, &line).await
        };
        if let Err(e) = written {
            self.pending.remove(&id);
            return Err(e);
        }
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                warn!("Request {} to {} timed out after {:?}", id, self.addr, self.timeout);
                Err(TransportError::Timeout)
            }
        }
    }
}

impl Drop for LineClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_responses(mut lines: LineReader, pending: Pending, closed: Arc<AtomicBool>) {
    while let Some(line) = next_line(&mut lines).await {
        match serde_json::from_str::<ResponseEnvelope>(&line) {
            Ok(response) => match pending.remove(&response.id) {
                Some((_, tx)) => {
                    let _ = tx.send(response);
                }
                None => debug!("Dropping response to unknown request {}", response.id),
            },
            Err(e) => warn!("Malformed response line: {}", e),
        }
    }
    closed.store(true, Ordering::Release);
    // dropping the senders fails every outstanding call with Closed
    pending.clear();
}

/// Global manager reached over TCP.
pub struct TcpGlobalClient {
    channel: LineClient,
}

impl TcpGlobalClient {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        Self::connect_with_timeout(addr, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Connect, giving up on the connection and on every later request
    /// after `timeout`.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            channel: LineClient::connect(addr, timeout).await?,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    async fn request<T: DeserializeOwned>(&self, request: GlobalRequest) -> Result<T, ManagerError> {
        self.channel.call(request).await?.decode()
    }
}

#[async_trait]
impl GlobalManagerInterface for TcpGlobalClient {
    async fn add_process(&self, process: &str, endpoint: Endpoint) -> Result<(), ManagerError> {
        self.request(GlobalRequest::AddProcess {
            process: process.to_string(),
            endpoint,
        })
        .await
    }

    async fn remove_process(&self, process: &str) -> Result<(), ManagerError> {
        self.request(GlobalRequest::RemoveProcess {
            process: process.to_string(),
        })
        .await
    }

    async fn process_endpoint(&self, process: &str) -> Result<Endpoint, ManagerError> {
        self.request(GlobalRequest::ProcessEndpoint {
            process: process.to_string(),
        })
        .await
    }

    async fn register_component(&self, description: ComponentDescription) -> Result<(), ManagerError> {
        self.request(GlobalRequest::RegisterComponent { description }).await
    }

    async fn remove_component(&self, process: &str, component: &str) -> Result<(), ManagerError> {
        self.request(GlobalRequest::RemoveComponent {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await
    }

    async fn set_component_state(&self, change: ComponentStateChange) -> Result<(), ManagerError> {
        self.request(GlobalRequest::SetComponentState { change }).await
    }

    async fn resolve_connection(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<(InterfaceAddress, InterfaceAddress), ManagerError> {
        self.request(GlobalRequest::ResolveConnection { client, server }).await
    }

    async fn connect_setup(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionDescription, ManagerError> {
        self.request(GlobalRequest::ConnectSetup { client, server }).await
    }

    async fn connect_notify(&self, id: ConnectionId) -> Result<(), ManagerError> {
        self.request(GlobalRequest::ConnectNotify { id }).await
    }

    async fn initiate_connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError> {
        self.request(GlobalRequest::InitiateConnect { client, server }).await
    }

    async fn disconnect(&self, id: ConnectionId) -> Result<(), ManagerError> {
        self.request(GlobalRequest::Disconnect { id }).await
    }

    async fn find_connection(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<Option<ConnectionId>, ManagerError> {
        self.request(GlobalRequest::FindConnection { client, server }).await
    }

    async fn names_of_processes(&self) -> Result<Vec<String>, ManagerError> {
        self.request(GlobalRequest::NamesOfProcesses).await
    }

    async fn names_of_components(&self, process: &str) -> Result<Vec<String>, ManagerError> {
        self.request(GlobalRequest::NamesOfComponents {
            process: process.to_string(),
        })
        .await
    }

    async fn names_of_interfaces(&self, process: &str, component: &str) -> Result<InterfaceNames, ManagerError> {
        self.request(GlobalRequest::NamesOfInterfaces {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionDescription>, ManagerError> {
        self.request(GlobalRequest::ListConnections).await
    }

    async fn component_state(&self, process: &str, component: &str) -> Result<ComponentState, ManagerError> {
        self.request(GlobalRequest::ComponentState {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await
    }
}

/// Local manager reached over TCP.
pub struct TcpLocalClient {
    channel: LineClient,
}

impl TcpLocalClient {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        Self::connect_with_timeout(addr, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Connect, giving up on the connection and on every later request
    /// after `timeout`.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            channel: LineClient::connect(addr, timeout).await?,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    async fn request<T: DeserializeOwned>(&self, request: LocalRequest) -> Result<T, ManagerError> {
        self.channel.call(request).await?.decode()
    }
}

#[async_trait]
impl LocalManagerInterface for TcpLocalClient {
    async fn connect(
        &self,
        client: InterfaceAddress,
        server: InterfaceAddress,
    ) -> Result<ConnectionId, ManagerError> {
        self.request(LocalRequest::Connect { client, server }).await
    }

    async fn connect_server_side(
        &self,
        connection: ConnectionDescription,
        client_endpoint: Endpoint,
    ) -> Result<InterfaceProvidedDescription, ManagerError> {
        self.request(LocalRequest::ConnectServerSide {
            connection,
            client_endpoint,
        })
        .await
    }

    async fn disconnect_local(&self, id: ConnectionId) -> Result<(), ManagerError> {
        self.request(LocalRequest::DisconnectLocal { id }).await
    }

    async fn execute_command(&self, id: ConnectionId, command: String, argument: Value) -> CommandReply {
        self.request(LocalRequest::ExecuteCommand { id, command, argument })
            .await
            .unwrap_or_else(|e| {
                debug!("Remote command on {} failed: {}", self.channel.addr, e);
                CommandReply::failed(ExecutionResult::NetworkError)
            })
    }

    async fn deliver_event(&self, id: ConnectionId, event: String, payload: Value) -> ExecutionResult {
        self.request(LocalRequest::DeliverEvent { id, event, payload })
            .await
            .unwrap_or(ExecutionResult::NetworkError)
    }

    async fn create_component(&self, class: &str, name: &str, args: Value) -> Result<(), ManagerError> {
        self.request(LocalRequest::CreateComponent {
            class: class.to_string(),
            name: name.to_string(),
            args,
        })
        .await
    }

    async fn configure_component(&self, name: &str, config: &str) -> Result<(), ManagerError> {
        self.request(LocalRequest::ConfigureComponent {
            name: name.to_string(),
            config: config.to_string(),
        })
        .await
    }

    async fn start_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.request(LocalRequest::StartComponent {
            name: name.to_string(),
            delay_secs,
        })
        .await
    }

    async fn stop_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.request(LocalRequest::StopComponent {
            name: name.to_string(),
            delay_secs,
        })
        .await
    }

    async fn resume_component(&self, name: &str, delay_secs: f64) -> Result<(), ManagerError> {
        self.request(LocalRequest::ResumeComponent {
            name: name.to_string(),
            delay_secs,
        })
        .await
    }

    async fn component_state(&self, name: &str) -> Result<ComponentState, ManagerError> {
        self.request(LocalRequest::ComponentState {
            name: name.to_string(),
        })
        .await
    }

    async fn load_library(&self, library: &str) -> Result<(), ManagerError> {
        self.request(LocalRequest::LoadLibrary {
            library: library.to_string(),
        })
        .await
    }

    async fn class_names(&self) -> Result<Vec<String>, ManagerError> {
        self.request(LocalRequest::ClassNames).await
    }
}

/// Server-side dispatch of one decoded request.
#[async_trait]
trait RequestHandler<R>: Send + Sync + 'static {
    async fn handle(&self, request: R) -> Result<Value, ManagerError>;
}

fn encode<T: Serialize>(result: Result<T, ManagerError>) -> Result<Value, ManagerError> {
    result.and_then(|value| {
        serde_json::to_value(value).map_err(|e| ManagerError::InvalidRequest(e.to_string()))
    })
}

struct GlobalDispatcher(Arc<dyn GlobalManagerInterface>);

#[async_trait]
impl RequestHandler<GlobalRequest> for GlobalDispatcher {
    async fn handle(&self, request: GlobalRequest) -> Result<Value, ManagerError> {
        let gcm = &self.0;
        match request {
            GlobalRequest::AddProcess { process, endpoint } => {
                encode(gcm.add_process(&process, endpoint).await)
            }
            GlobalRequest::RemoveProcess { process } => encode(gcm.remove_process(&process).await),
            GlobalRequest::ProcessEndpoint { process } => {
                encode(gcm.process_endpoint(&process).await)
            }
            GlobalRequest::RegisterComponent { description } => {
                encode(gcm.register_component(description).await)
            }
            GlobalRequest::RemoveComponent { process, component } => {
                encode(gcm.remove_component(&process, &component).await)
            }
            GlobalRequest::SetComponentState { change } => {
                encode(gcm.set_component_state(change).await)
            }
            GlobalRequest::ResolveConnection { client, server } => {
                encode(gcm.resolve_connection(client, server).await)
            }
            GlobalRequest::ConnectSetup { client, server } => {
                encode(gcm.connect_setup(client, server).await)
            }
            GlobalRequest::ConnectNotify { id } => encode(gcm.connect_notify(id).await),
            GlobalRequest::InitiateConnect { client, server } => {
                encode(gcm.initiate_connect(client, server).await)
            }
            GlobalRequest::Disconnect { id } => encode(gcm.disconnect(id).await),
            GlobalRequest::FindConnection { client, server } => {
                encode(gcm.find_connection(client, server).await)
            }
            GlobalRequest::NamesOfProcesses => encode(gcm.names_of_processes().await),
            GlobalRequest::NamesOfComponents { process } => {
                encode(gcm.names_of_components(&process).await)
            }
            GlobalRequest::NamesOfInterfaces { process, component } => {
                encode(gcm.names_of_interfaces(&process, &component).await)
            }
            GlobalRequest::ListConnections => encode(gcm.list_connections().await),
            GlobalRequest::ComponentState { process, component } => {
                encode(gcm.component_state(&process, &component).await)
            }
        }
    }
}

struct LocalDispatcher(Arc<dyn LocalManagerInterface>);

#[async_trait]
impl RequestHandler<LocalRequest> for LocalDispatcher {
    async fn handle(&self, request: LocalRequest) -> Result<Value, ManagerError> {
        let lcm = &self.0;
        match request {
            LocalRequest::Connect { client, server } => encode(lcm.connect(client, server).await),
            LocalRequest::ConnectServerSide {
                connection,
                client_endpoint,
            } => encode(lcm.connect_server_side(connection, client_endpoint).await),
            LocalRequest::DisconnectLocal { id } => encode(lcm.disconnect_local(id).await),
            LocalRequest::ExecuteCommand { id, command, argument } => {
                encode(Ok(lcm.execute_command(id, command, argument).await))
            }
            LocalRequest::DeliverEvent { id, event, payload } => {
                encode(Ok(lcm.deliver_event(id, event, payload).await))
            }
            LocalRequest::CreateComponent { class, name, args } => {
                encode(lcm.create_component(&class, &name, args).await)
            }
            LocalRequest::ConfigureComponent { name, config } => {
                encode(lcm.configure_component(&name, &config).await)
            }
            LocalRequest::StartComponent { name, delay_secs } => {
                encode(lcm.start_component(&name, delay_secs).await)
            }
            LocalRequest::StopComponent { name, delay_secs } => {
                encode(lcm.stop_component(&name, delay_secs).await)
            }
            LocalRequest::ResumeComponent { name, delay_secs } => {
                encode(lcm.resume_component(&name, delay_secs).await)
            }
            LocalRequest::ComponentState { name } => encode(lcm.component_state(&name).await),
            LocalRequest::LoadLibrary { library } => encode(lcm.load_library(&library).await),
            LocalRequest::ClassNames => encode(lcm.class_names().await),
        }
    }
}

/// A listening manager server.
pub struct ManagerServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ManagerServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint clients use to reach this server.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::Tcp(self.local_addr.to_string())
    }

    /// Stop accepting and close every connection.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Serves a global manager over TCP.
pub struct GlobalServer;

impl GlobalServer {
    pub async fn bind(
        addr: &str,
        gcm: Arc<dyn GlobalManagerInterface>,
        cancel: CancellationToken,
    ) -> Result<ManagerServer, TransportError> {
        serve(addr, Arc::new(GlobalDispatcher(gcm)), cancel, "global").await
    }
}

/// Serves a local manager over TCP.
pub struct LocalServer;

impl LocalServer {
    pub async fn bind(
        addr: &str,
        lcm: Arc<dyn LocalManagerInterface>,
        cancel: CancellationToken,
    ) -> Result<ManagerServer, TransportError> {
        serve(addr, Arc::new(LocalDispatcher(lcm)), cancel, "local").await
    }
}

async fn serve<R, H>(
    addr: &str,
    handler: Arc<H>,
    cancel: CancellationToken,
    role: &'static str,
) -> Result<ManagerServer, TransportError>
where
    R: DeserializeOwned + Send + 'static,
    H: RequestHandler<R>,
{
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("{} manager listening on tcp://{}", role, local_addr);

    let token = cancel.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted {} manager connection from {}", role, peer);
                        tokio::spawn(serve_connection(stream, handler.clone(), token.clone()));
                    }
                    Err(e) => warn!("Accept on {} manager listener failed: {}", role, e),
                },
            }
        }
        debug!("{} manager listener on {} stopped", role, local_addr);
    });

    Ok(ManagerServer {
        local_addr,
        cancel,
        task,
    })
}

async fn serve_connection<R, H>(stream: TcpStream, handler: Arc<H>, cancel: CancellationToken)
where
    R: DeserializeOwned + Send + 'static,
    H: RequestHandler<R>,
{
    let _ = stream.set_nodelay(true);
    let (read, mut write) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ResponseEnvelope>();
    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let line = match serde_json::to_string(&response) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Cannot encode response {}: {}", response.id, e);
                    continue;
                }
            };
            if let Err(e) = write_line(&mut write, &line).await {
                debug!("Manager connection closed while writing: {}", e);
                break;
            }
        }
    });

    let mut lines = line_reader(read);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = next_line(&mut lines) => match line {
                Some(line) => match serde_json::from_str::<RequestEnvelope<R>>(&line) {
                    Ok(envelope) => {
                        let handler = handler.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let outcome = handler.handle(envelope.request).await;
                            let _ = tx.send(ResponseEnvelope { id: envelope.id, outcome });
                        });
                    }
                    Err(e) => {
                        warn!("Malformed request line: {}", e);
                        let id = serde_json::from_str::<Value>(&line)
                            .ok()
                            .and_then(|v| v.get("id").and_then(Value::as_u64));
                        if let Some(id) = id {
                            let _ = tx.send(ResponseEnvelope {
                                id,
                                outcome: Err(ManagerError::InvalidRequest(e.to_string())),
                            });
                        }
                    }
                },
                None => break,
            },
        }
    }
    drop(tx);
    let _ = writer.await;
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
