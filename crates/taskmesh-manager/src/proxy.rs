//! Interface proxies for connections that cross process boundaries.
//!
//! The client process binds its required interface to a
//! [`ProvidedInterfaceProxy`], which forwards command execution to the
//! server process. The server process attaches a [`RequiredInterfaceProxy`]
//! to the real provided interface, which forwards events back to the
//! client process in the order they were raised.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, mpsc as std_mpsc};
use std::time::Duration;
use taskmesh_core::{ClientId, EventSink, InterfaceTarget};
use taskmesh_protocols::{
    CommandReply, ConnectionId, ExecutionResult, InterfaceProvidedDescription,
    LocalManagerInterface,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Subscribers = BTreeMap<String, Vec<(ClientId, Arc<dyn EventSink>)>>;

/// Client-side stand-in for a provided interface living in another process.
pub struct ProvidedInterfaceProxy {
    connection: ConnectionId,
    description: InterfaceProvidedDescription,
    peer: Arc<dyn LocalManagerInterface>,
    runtime: Handle,
    timeout: Duration,
    next_client: AtomicU64,
    subscribers: Mutex<Subscribers>,
    closed: AtomicBool,
}

impl ProvidedInterfaceProxy {
    pub fn new(
        connection: ConnectionId,
        description: InterfaceProvidedDescription,
        peer: Arc<dyn LocalManagerInterface>,
        runtime: Handle,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            connection,
            description,
            peer,
            runtime,
            timeout,
            next_client: AtomicU64::new(1),
            subscribers: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Hand an event that arrived from the server process to local subscribers.
    pub fn deliver(&self, event: &str, payload: Value) -> ExecutionResult {
        let sinks: Vec<Arc<dyn EventSink>> = self
            .subscribers
            .lock()
            .get(event)
            .map(|subs| subs.iter().map(|(_, sink)| sink.clone()).collect())
            .unwrap_or_default();
        let mut outcome = ExecutionResult::Ok;
        for sink in sinks {
            let result = sink.deliver(event, payload.clone());
            if outcome.is_ok() && !result.is_ok() {
                outcome = result;
            }
        }
        outcome
    }

    /// Stop forwarding. Later executions fail with `NetworkError`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.subscribers.lock().clear();
    }
}

impl InterfaceTarget for ProvidedInterfaceProxy {
    fn name(&self) -> &str {
        &self.description.name
    }

    fn description(&self) -> InterfaceProvidedDescription {
        self.description.clone()
    }

    fn attach(&self) -> ClientId {
        ClientId(self.next_client.fetch_add(1, Ordering::Relaxed))
    }

    fn detach(&self, client: ClientId) {
        for subs in self.subscribers.lock().values_mut() {
            subs.retain(|(id, _)| *id != client);
        }
    }

    fn execute(&self, _client: ClientId, command: &str, argument: Value) -> CommandReply {
        if self.closed.load(Ordering::Acquire) {
            return CommandReply::failed(ExecutionResult::NetworkError);
        }
        if self.description.command(command).is_none() {
            return CommandReply::failed(ExecutionResult::InvalidCommand);
        }
        let (tx, rx) = std_mpsc::sync_channel(1);
        let peer = self.peer.clone();
        let connection = self.connection;
        let command = command.to_string();
        self.runtime.spawn(async move {
            let reply = peer.execute_command(connection, command, argument).await;
            let _ = tx.send(reply);
        });
        match rx.recv_timeout(self.timeout) {
            Ok(reply) => reply,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!("Remote command on connection {} timed out", self.connection);
                CommandReply::failed(ExecutionResult::Timeout)
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                CommandReply::failed(ExecutionResult::NetworkError)
            }
        }
    }

    fn subscribe(&self, client: ClientId, event: &str, sink: Arc<dyn EventSink>) -> bool {
        if !self.description.has_event(event) {
            return false;
        }
        self.subscribers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((client, sink));
        true
    }
}

struct ForwardingSink {
    events: mpsc::UnboundedSender<(String, Value)>,
}

impl EventSink for ForwardingSink {
    fn deliver(&self, event: &str, payload: Value) -> ExecutionResult {
        match self.events.send((event.to_string(), payload)) {
            Ok(()) => ExecutionResult::Ok,
            Err(_) => ExecutionResult::NetworkError,
        }
    }
}

/// Server-side stand-in for a required interface living in another process.
pub struct RequiredInterfaceProxy {
    connection: ConnectionId,
    target: Arc<dyn InterfaceTarget>,
    client: ClientId,
}

impl RequiredInterfaceProxy {
    /// Attach to `target` as a new client and forward all of its events to
    /// the client process through one ordered task.
    pub fn attach(
        connection: ConnectionId,
        target: Arc<dyn InterfaceTarget>,
        peer: Arc<dyn LocalManagerInterface>,
        runtime: &Handle,
    ) -> Arc<Self> {
        let client = target.attach();
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Value)>();
        runtime.spawn(async move {
            while let Some((event, payload)) = rx.recv().await {
                let result = peer.deliver_event(connection, event.clone(), payload).await;
                if !result.is_ok() {
                    debug!("Event {} on connection {} returned {}", event, connection, result);
                }
            }
            debug!("Event forwarding for connection {} stopped", connection);
        });

        let sink: Arc<dyn EventSink> = Arc::new(ForwardingSink { events: tx });
        for event in target.description().events {
            target.subscribe(client, &event.name, sink.clone());
        }
        Arc::new(Self {
            connection,
            target,
            client,
        })
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Execute a command on behalf of the remote client.
    pub fn execute(&self, command: &str, argument: Value) -> CommandReply {
        self.target.execute(self.client, command, argument)
    }

    /// Drop subscriptions and pending queued commands of the remote client.
    pub fn detach(&self) {
        self.target.detach(self.client);
    }
}
