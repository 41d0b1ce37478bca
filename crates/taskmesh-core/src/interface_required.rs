//! Required interfaces: function slots and event handlers bound 1:1 to a
//! provided interface.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use taskmesh_protocols::{
    CommandKind, CommandReply, EventKind, ExecutionResult, FunctionDescription,
    InterfaceRequiredDescription, Requiredness,
};
use tracing::{debug, warn};

use crate::command::panic_message;
use crate::error::{ComponentError, ComponentResult};
use crate::event::{EventReceiver, EventSink};
use crate::interface_provided::{Hook, InterfaceTarget};
use crate::mailbox::{ClientId, Mailbox};

type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

struct EventHandler {
    kind: EventKind,
    queued: bool,
    callback: EventCallback,
}

struct QueuedEvent {
    callback: EventCallback,
    event: String,
    payload: Value,
}

struct Binding {
    target: Arc<dyn InterfaceTarget>,
    client: ClientId,
}

/// A required interface owned by one component.
pub struct InterfaceRequired {
    name: String,
    component: String,
    requiredness: Requiredness,
    functions: RwLock<BTreeMap<String, CommandKind>>,
    handlers: RwLock<BTreeMap<String, EventHandler>>,
    receivers: RwLock<BTreeMap<String, Arc<EventReceiver>>>,
    events: Mailbox<QueuedEvent>,
    binding: Mutex<Option<Binding>>,
    post_queued: RwLock<Option<Hook>>,
    this: Weak<InterfaceRequired>,
}

impl InterfaceRequired {
    /// Create an interface whose queued event handlers share a mailbox of
    /// `capacity` entries.
    pub fn new(
        component: impl Into<String>,
        name: impl Into<String>,
        requiredness: Requiredness,
        capacity: usize,
    ) -> Arc<Self> {
        let component = component.into();
        let name = name.into();
        let mailbox_name = format!("{}.{}.events", component, name);
        Arc::new_cyclic(|this| Self {
            name,
            component,
            requiredness,
            functions: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new(BTreeMap::new()),
            receivers: RwLock::new(BTreeMap::new()),
            events: Mailbox::new(mailbox_name, capacity),
            binding: Mutex::new(None),
            post_queued: RwLock::new(None),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn requiredness(&self) -> Requiredness {
        self.requiredness
    }

    pub(crate) fn set_post_queued(&self, hook: Hook) {
        *self.post_queued.write() = Some(hook);
    }

    /// Declare a function slot, bound at connect time to a command of the
    /// same name and kind.
    pub fn add_function(&self, name: &str, kind: CommandKind) -> ComponentResult<()> {
        let mut functions = self.functions.write();
        if functions.contains_key(name) {
            return Err(ComponentError::Configuration(format!(
                "duplicate function {}.{}",
                self.name, name
            )));
        }
        functions.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn add_event_handler_void<F>(&self, event: &str, queued: bool, f: F) -> ComponentResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_event_handler(event, EventKind::Void, queued, Arc::new(move |_| f()))
    }

    pub fn add_event_handler_write<F>(&self, event: &str, queued: bool, f: F) -> ComponentResult<()>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.add_event_handler(event, EventKind::Write, queued, Arc::new(f))
    }

    fn add_event_handler(
        &self,
        event: &str,
        kind: EventKind,
        queued: bool,
        callback: EventCallback,
    ) -> ComponentResult<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(event) {
            return Err(ComponentError::Configuration(format!(
                "duplicate event handler {}.{}",
                self.name, event
            )));
        }
        handlers.insert(
            event.to_string(),
            EventHandler {
                kind,
                queued,
                callback,
            },
        );
        Ok(())
    }

    /// Receiver that threads can block on until `event` arrives.
    pub fn add_event_receiver(&self, event: &str) -> Arc<EventReceiver> {
        self.receivers
            .write()
            .entry(event.to_string())
            .or_insert_with(|| Arc::new(EventReceiver::new(event)))
            .clone()
    }

    pub fn event_receiver(&self, event: &str) -> Option<Arc<EventReceiver>> {
        self.receivers.read().get(event).cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// Name of the bound provided interface.
    pub fn connected_interface(&self) -> Option<String> {
        self.binding
            .lock()
            .as_ref()
            .map(|b| b.target.name().to_string())
    }

    /// Bind to a provided interface. Every declared function must exist on
    /// the target with the same kind.
    pub fn connect(&self, target: Arc<dyn InterfaceTarget>) -> ComponentResult<()> {
        let mut binding = self.binding.lock();
        if let Some(existing) = binding.as_ref() {
            return Err(ComponentError::AlreadyConnected(format!(
                "{}.{} is bound to {}",
                self.component,
                self.name,
                existing.target.name()
            )));
        }

        let description = target.description();
        for (function, kind) in self.functions.read().iter() {
            match description.command(function) {
                Some(command) if command.kind == *kind => {}
                Some(command) => {
                    return Err(ComponentError::Incompatible(format!(
                        "{}.{}.{} expects {:?}, {} provides {:?}",
                        self.component, self.name, function, kind, description.name, command.kind
                    )));
                }
                None => {
                    return Err(ComponentError::Incompatible(format!(
                        "{} has no command {} required by {}.{}",
                        description.name, function, self.component, self.name
                    )));
                }
            }
        }

        let client = target.attach();
        let sink: Arc<dyn EventSink> = Arc::new(RequiredSink {
            interface: self.this.clone(),
        });
        let mut events: Vec<String> = self.handlers.read().keys().cloned().collect();
        events.extend(self.receivers.read().keys().cloned());
        events.sort();
        events.dedup();
        for event in events {
            if !target.subscribe(client, &event, sink.clone()) {
                debug!(
                    "{}.{}: {} does not offer event {}",
                    self.component,
                    self.name,
                    target.name(),
                    event
                );
            }
        }

        debug!("{}.{} bound to {}", self.component, self.name, target.name());
        *binding = Some(Binding { target, client });
        Ok(())
    }

    /// Unbind. Pending events from the old peer are discarded.
    pub fn disconnect(&self) -> ComponentResult<()> {
        let binding = self.binding.lock().take();
        let Some(binding) = binding else {
            return Err(ComponentError::NotConnected(format!(
                "{}.{}",
                self.component, self.name
            )));
        };
        binding.target.detach(binding.client);
        let discarded = self.events.clear();
        if discarded > 0 {
            warn!(
                "{}.{} discarded {} pending events on disconnect",
                self.component, self.name, discarded
            );
        }
        debug!("{}.{} unbound from {}", self.component, self.name, binding.target.name());
        Ok(())
    }

    /// Invoke a function slot.
    pub fn call(&self, function: &str, argument: Value) -> CommandReply {
        if !self.functions.read().contains_key(function) {
            return CommandReply::failed(ExecutionResult::InvalidCommand);
        }
        let bound = self
            .binding
            .lock()
            .as_ref()
            .map(|b| (b.target.clone(), b.client));
        match bound {
            // Execute outside the binding lock; queued reads may block.
            Some((target, client)) => target.execute(client, function, argument),
            None => CommandReply::failed(ExecutionResult::FunctionNotBound),
        }
    }

    pub fn call_void(&self, function: &str) -> ExecutionResult {
        self.call(function, Value::Null).result
    }

    pub fn call_write(&self, function: &str, argument: Value) -> ExecutionResult {
        self.call(function, argument).result
    }

    pub fn call_read(&self, function: &str) -> Result<Value, ExecutionResult> {
        self.call(function, Value::Null).into_result()
    }

    pub fn call_qualified_read(&self, function: &str, argument: Value) -> Result<Value, ExecutionResult> {
        self.call(function, argument).into_result()
    }

    /// Run queued event handlers in arrival order.
    pub fn process_events(&self) -> usize {
        self.events
            .drain(|queued| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (queued.callback)(queued.payload)));
                if let Err(payload) = outcome {
                    warn!(
                        "Event handler {}.{}.{} panicked: {}",
                        self.component,
                        self.name,
                        queued.event,
                        panic_message(payload.as_ref())
                    );
                }
            })
            .unwrap_or(0)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn description(&self) -> InterfaceRequiredDescription {
        InterfaceRequiredDescription {
            name: self.name.clone(),
            requiredness: self.requiredness,
            functions: self
                .functions
                .read()
                .iter()
                .map(|(name, kind)| FunctionDescription {
                    name: name.clone(),
                    kind: *kind,
                })
                .collect(),
            event_handlers: self.handlers.read().keys().cloned().collect(),
        }
    }

    fn deliver(&self, event: &str, payload: Value) -> ExecutionResult {
        if let Some(receiver) = self.event_receiver(event) {
            receiver.notify(payload.clone());
        }

        let handler = self
            .handlers
            .read()
            .get(event)
            .map(|h| (h.kind, h.queued, h.callback.clone()));
        let Some((kind, queued, callback)) = handler else {
            return ExecutionResult::Ok;
        };
        let payload = match kind {
            EventKind::Void => Value::Null,
            EventKind::Write => payload,
        };

        if queued {
            let entry = QueuedEvent {
                callback,
                event: event.to_string(),
                payload,
            };
            if self.events.try_push(ClientId(0), entry).is_err() {
                warn!("{}.{}: event mailbox full, {} dropped", self.component, self.name, event);
                return ExecutionResult::MailboxFull;
            }
            let hook = self.post_queued.read().clone();
            if let Some(hook) = hook {
                hook();
            }
            ExecutionResult::Ok
        } else {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => ExecutionResult::Ok,
                Err(payload) => {
                    warn!(
                        "Event handler {}.{}.{} panicked: {}",
                        self.component,
                        self.name,
                        event,
                        panic_message(payload.as_ref())
                    );
                    ExecutionResult::CommandException
                }
            }
        }
    }
}

struct RequiredSink {
    interface: Weak<InterfaceRequired>,
}

impl EventSink for RequiredSink {
    fn deliver(&self, event: &str, payload: Value) -> ExecutionResult {
        match self.interface.upgrade() {
            Some(interface) => interface.deliver(event, payload),
            None => ExecutionResult::FunctionNotBound,
        }
    }
}

#[cfg(test)]
#[path = "interface_required_tests.rs"]
mod tests;
