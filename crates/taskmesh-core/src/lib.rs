//! Component runtime for TaskMesh.
//!
//! Components exchange commands and events through provided and required
//! interfaces. Queued commands and events land in bounded mailboxes that
//! the owning component drains on its own execution thread.

pub mod command;
pub mod component;
pub mod error;
pub mod event;
pub mod factory;
pub mod interface_provided;
pub mod interface_required;
pub mod mailbox;
pub mod registry;
pub mod state_table;
pub mod task;

pub use command::{Command, CommandHandler};
pub use component::{
    CHANGE_STATE_EVENT, Component, ComponentBuilder, EXEC_IN, EXEC_OUT, INTERFACE_INTERNAL,
    RUN_EVENT, StateListener,
};
pub use error::{CommandError, ComponentError, ComponentResult};
pub use event::{EventGenerator, EventReceiver, EventSink};
pub use factory::{ClassLibrary, ComponentFactory, Constructor};
pub use interface_provided::{DEFAULT_COMMAND_TIMEOUT, InterfaceProvided, InterfaceTarget};
pub use interface_required::InterfaceRequired;
pub use mailbox::{ClientId, Mailbox};
pub use registry::ComponentRegistry;
pub use state_table::{StateRow, StateTable};
pub use task::{ExecutionKind, IdleTask, Task};
