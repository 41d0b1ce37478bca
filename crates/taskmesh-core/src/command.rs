//! Provided commands and their dispatch boundary.

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use taskmesh_protocols::{CommandDescription, CommandKind, CommandReply, ExecutionResult};
use tracing::warn;

use crate::error::CommandError;

/// Handler shared by every command kind. Void and read commands receive `Value::Null`.
pub type CommandHandler = Arc<dyn Fn(Value) -> Result<Value, CommandError> + Send + Sync>;

/// A named command offered by a provided interface.
pub struct Command {
    name: String,
    kind: CommandKind,
    handler: CommandHandler,
    enabled: AtomicBool,
    queued: bool,
    owner: String,
}

impl Command {
    pub(crate) fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: CommandKind,
        handler: CommandHandler,
        queued: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            handler,
            enabled: AtomicBool::new(true),
            queued,
            owner: owner.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Whether invocations go through the owner's mailbox.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn description(&self) -> CommandDescription {
        CommandDescription {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    /// Run the handler on the calling thread.
    ///
    /// Panics and handler errors are contained here and reported as result
    /// codes; nothing propagates to the caller's thread.
    pub fn invoke(&self, argument: Value) -> CommandReply {
        if !self.is_enabled() {
            return CommandReply::failed(ExecutionResult::CommandDisabled);
        }
        let argument = if self.kind.takes_argument() {
            argument
        } else {
            Value::Null
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(argument))) {
            Ok(Ok(value)) => {
                if self.kind.returns_value() {
                    CommandReply::ok(value)
                } else {
                    CommandReply::done()
                }
            }
            Ok(Err(e)) => {
                warn!("Command {}.{} failed: {}", self.owner, self.name, e);
                CommandReply::failed(e.execution_result())
            }
            Err(payload) => {
                warn!(
                    "Command {}.{} panicked: {}",
                    self.owner,
                    self.name,
                    panic_message(payload.as_ref())
                );
                CommandReply::failed(ExecutionResult::CommandException)
            }
        }
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
