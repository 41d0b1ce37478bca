//! Provided interfaces: named bundles of commands and events.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use taskmesh_protocols::{
    CommandKind, CommandReply, EventKind, ExecutionResult, InterfaceProvidedDescription,
    QueuingPolicy,
};
use tracing::{debug, warn};

use crate::command::{Command, CommandHandler};
use crate::error::{CommandError, ComponentError, ComponentResult};
use crate::event::{EventGenerator, EventSink};
use crate::mailbox::{ClientId, Mailbox};
use crate::state_table::StateTable;

/// Default time a caller waits for a queued command that returns a value.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability a required interface binds to: a local provided interface
/// or a proxy for one living in another process.
pub trait InterfaceTarget: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> InterfaceProvidedDescription;

    /// Register a new client and return its id.
    fn attach(&self) -> ClientId;

    /// Forget a client: drop its subscriptions and pending mailbox entries.
    fn detach(&self, client: ClientId);

    fn execute(&self, client: ClientId, command: &str, argument: Value) -> CommandReply;

    /// Subscribe a client to an event. Returns false if the event is unknown.
    fn subscribe(&self, client: ClientId, event: &str, sink: Arc<dyn EventSink>) -> bool;
}

pub(crate) type Hook = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct QueuedCommand {
    command: Arc<Command>,
    argument: Value,
    reply: Option<mpsc::SyncSender<CommandReply>>,
}

/// A provided interface owned by one component.
pub struct InterfaceProvided {
    name: String,
    component: String,
    policy: QueuingPolicy,
    management: bool,
    commands: RwLock<BTreeMap<String, Arc<Command>>>,
    events: RwLock<BTreeMap<String, Arc<EventGenerator>>>,
    mailbox: Option<Mailbox<QueuedCommand>>,
    next_client: AtomicU64,
    clients: Mutex<BTreeSet<ClientId>>,
    post_queued: RwLock<Option<Hook>>,
    command_timeout: RwLock<Duration>,
}

impl InterfaceProvided {
    /// Create an interface. Queued interfaces get a mailbox of `capacity` entries.
    pub fn new(
        component: impl Into<String>,
        name: impl Into<String>,
        policy: QueuingPolicy,
        capacity: usize,
    ) -> Self {
        let component = component.into();
        let name = name.into();
        let mailbox = match policy {
            QueuingPolicy::Queued => Some(Mailbox::new(format!("{}.{}", component, name), capacity)),
            QueuingPolicy::NotQueued => None,
        };
        Self {
            name,
            component,
            policy,
            management: false,
            commands: RwLock::new(BTreeMap::new()),
            events: RwLock::new(BTreeMap::new()),
            mailbox,
            next_client: AtomicU64::new(1),
            clients: Mutex::new(BTreeSet::new()),
            post_queued: RwLock::new(None),
            command_timeout: RwLock::new(DEFAULT_COMMAND_TIMEOUT),
        }
    }

    /// Mark this interface as carrying management traffic; its mailbox is
    /// drained even while the owning component is not active.
    pub fn into_management(mut self) -> Self {
        self.management = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn policy(&self) -> QueuingPolicy {
        self.policy
    }

    pub fn is_management(&self) -> bool {
        self.management
    }

    pub fn mailbox_len(&self) -> usize {
        self.mailbox.as_ref().map_or(0, |m| m.len())
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox.as_ref().map_or(0, |m| m.capacity())
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// How long callers of queued value-returning commands wait for the owner.
    pub fn set_command_timeout(&self, timeout: Duration) {
        *self.command_timeout.write() = timeout;
    }

    /// Called after each successful enqueue.
    pub(crate) fn set_post_queued(&self, hook: Hook) {
        *self.post_queued.write() = Some(hook);
    }

    /// Add a command. Void and write commands on a queued interface always
    /// go through the mailbox; read commands do only when `queued` is set,
    /// in which case the caller blocks until the owner has run them.
    pub fn add_command(
        &self,
        name: &str,
        kind: CommandKind,
        handler: CommandHandler,
        queued: bool,
    ) -> ComponentResult<()> {
        let queued = self.mailbox.is_some() && (queued || !kind.returns_value());
        let mut commands = self.commands.write();
        if commands.contains_key(name) {
            return Err(ComponentError::Configuration(format!(
                "duplicate command {}.{}",
                self.name, name
            )));
        }
        let owner = format!("{}.{}", self.component, self.name);
        commands.insert(
            name.to_string(),
            Arc::new(Command::new(owner, name, kind, handler, queued)),
        );
        Ok(())
    }

    pub fn add_command_void<F>(&self, name: &str, f: F) -> ComponentResult<()>
    where
        F: Fn() -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.add_command(name, CommandKind::Void, Arc::new(move |_| f().map(|_| Value::Null)), false)
    }

    pub fn add_command_write<F>(&self, name: &str, f: F) -> ComponentResult<()>
    where
        F: Fn(Value) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.add_command(name, CommandKind::Write, Arc::new(move |v| f(v).map(|_| Value::Null)), false)
    }

    pub fn add_command_read<F>(&self, name: &str, f: F) -> ComponentResult<()>
    where
        F: Fn() -> Result<Value, CommandError> + Send + Sync + 'static,
    {
        self.add_command(name, CommandKind::Read, Arc::new(move |_| f()), false)
    }

    pub fn add_command_qualified_read<F>(&self, name: &str, f: F) -> ComponentResult<()>
    where
        F: Fn(Value) -> Result<Value, CommandError> + Send + Sync + 'static,
    {
        self.add_command(name, CommandKind::QualifiedRead, Arc::new(f), false)
    }

    /// Read command returning the latest committed value of a state table slot.
    pub fn add_command_read_state(
        &self,
        name: &str,
        table: Arc<StateTable>,
        slot: &str,
    ) -> ComponentResult<()> {
        if !table.has_slot(slot) {
            return Err(ComponentError::SlotNotFound(slot.to_string()));
        }
        let slot = slot.to_string();
        self.add_command_read(name, move || {
            table
                .read_latest(&slot)
                .ok_or_else(|| CommandError::failed(format!("no committed value for {}", slot)))
        })
    }

    pub fn command(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.read().get(name).cloned()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    pub fn add_event_void(&self, name: &str) -> ComponentResult<()> {
        self.add_event(name, EventKind::Void)
    }

    pub fn add_event_write(&self, name: &str) -> ComponentResult<()> {
        self.add_event(name, EventKind::Write)
    }

    fn add_event(&self, name: &str, kind: EventKind) -> ComponentResult<()> {
        let mut events = self.events.write();
        if events.contains_key(name) {
            return Err(ComponentError::Configuration(format!(
                "duplicate event {}.{}",
                self.name, name
            )));
        }
        events.insert(name.to_string(), Arc::new(EventGenerator::new(name, kind)));
        Ok(())
    }

    pub fn event(&self, name: &str) -> Option<Arc<EventGenerator>> {
        self.events.read().get(name).cloned()
    }

    /// Raise an event to every subscribed client.
    pub fn raise_event(&self, name: &str, payload: Value) -> ExecutionResult {
        match self.event(name) {
            Some(generator) => generator.raise(payload),
            None => ExecutionResult::InvalidCommand,
        }
    }

    /// Execute every queued command present when the call starts.
    ///
    /// Returns the number executed; 0 when another thread is already draining.
    pub fn process_mailbox(&self) -> usize {
        let Some(mailbox) = &self.mailbox else {
            return 0;
        };
        mailbox
            .drain(|queued| {
                let reply = queued.command.invoke(queued.argument);
                match queued.reply {
                    // The caller may have timed out and gone away.
                    Some(tx) => {
                        let _ = tx.try_send(reply);
                    }
                    None if !reply.is_ok() => {
                        debug!(
                            "Queued command {}.{}.{} returned {}",
                            self.component,
                            self.name,
                            queued.command.name(),
                            reply.result
                        );
                    }
                    None => {}
                }
            })
            .unwrap_or(0)
    }

    /// Discard pending commands. Called when the owner finishes.
    pub fn cleanup(&self) {
        if let Some(mailbox) = &self.mailbox {
            let discarded = mailbox.clear();
            if discarded > 0 {
                warn!(
                    "Interface {}.{} discarded {} pending commands",
                    self.component, self.name, discarded
                );
            }
        }
    }

    fn notify_queued(&self) {
        let hook = self.post_queued.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn enqueue(&self, client: ClientId, command: Arc<Command>, argument: Value) -> CommandReply {
        let Some(mailbox) = &self.mailbox else {
            return command.invoke(argument);
        };

        if !command.kind().returns_value() {
            let entry = QueuedCommand {
                command,
                argument,
                reply: None,
            };
            if mailbox.try_push(client, entry).is_err() {
                return CommandReply::failed(ExecutionResult::MailboxFull);
            }
            self.notify_queued();
            return CommandReply::done();
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let name = command.name().to_string();
        let entry = QueuedCommand {
            command,
            argument,
            reply: Some(tx),
        };
        if mailbox.try_push(client, entry).is_err() {
            return CommandReply::failed(ExecutionResult::MailboxFull);
        }
        self.notify_queued();

        let timeout = *self.command_timeout.read();
        match rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(_) => {
                warn!(
                    "Queued command {}.{}.{} not executed within {:?}",
                    self.component, self.name, name, timeout
                );
                CommandReply::failed(ExecutionResult::Timeout)
            }
        }
    }
}

impl InterfaceTarget for InterfaceProvided {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> InterfaceProvidedDescription {
        InterfaceProvidedDescription {
            name: self.name.clone(),
            policy: self.policy,
            commands: self.commands.read().values().map(|c| c.description()).collect(),
            events: self.events.read().values().map(|e| e.description()).collect(),
        }
    }

    fn attach(&self) -> ClientId {
        let client = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        self.clients.lock().insert(client);
        client
    }

    fn detach(&self, client: ClientId) {
        self.clients.lock().remove(&client);
        for generator in self.events.read().values() {
            generator.unsubscribe(client);
        }
        if let Some(mailbox) = &self.mailbox {
            let purged = mailbox.purge_client(client);
            if purged > 0 {
                warn!(
                    "Interface {}.{} discarded {} pending commands of disconnected client",
                    self.component, self.name, purged
                );
            }
        }
    }

    fn execute(&self, client: ClientId, command: &str, argument: Value) -> CommandReply {
        let Some(cmd) = self.command(command) else {
            return CommandReply::failed(ExecutionResult::InvalidCommand);
        };
        if !cmd.is_enabled() {
            return CommandReply::failed(ExecutionResult::CommandDisabled);
        }
        if cmd.is_queued() {
            self.enqueue(client, cmd, argument)
        } else {
            cmd.invoke(argument)
        }
    }

    fn subscribe(&self, client: ClientId, event: &str, sink: Arc<dyn EventSink>) -> bool {
        match self.event(event) {
            Some(generator) => {
                generator.subscribe(client, sink);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "interface_provided_tests.rs"]
mod tests;
