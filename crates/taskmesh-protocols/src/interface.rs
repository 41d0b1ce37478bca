//! Interface vocabulary: command kinds, queuing policies and the
//! serializable descriptions exchanged between managers.

use serde::{Deserialize, Serialize};

use crate::state::ComponentState;

/// Kind of a provided command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// No argument, no result.
    Void,
    /// One argument, no result.
    Write,
    /// No argument, one result.
    Read,
    /// One argument, one result.
    QualifiedRead,
}

impl CommandKind {
    /// Whether the caller expects a value back.
    pub fn returns_value(self) -> bool {
        matches!(self, CommandKind::Read | CommandKind::QualifiedRead)
    }

    /// Whether the command takes an argument.
    pub fn takes_argument(self) -> bool {
        matches!(self, CommandKind::Write | CommandKind::QualifiedRead)
    }
}

/// Kind of a provided event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Void,
    Write,
}

/// Whether commands on a provided interface go through a mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuingPolicy {
    NotQueued,
    #[default]
    Queued,
}

/// Whether a required interface must be connected before startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requiredness {
    #[default]
    Required,
    Optional,
}

/// Public description of one provided command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescription {
    pub name: String,
    pub kind: CommandKind,
}

/// Public description of one provided event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescription {
    pub name: String,
    pub kind: EventKind,
}

/// Public description of one required function slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescription {
    pub name: String,
    pub kind: CommandKind,
}

/// Description of a provided interface, used to build remote proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceProvidedDescription {
    pub name: String,
    pub policy: QueuingPolicy,
    #[serde(default)]
    pub commands: Vec<CommandDescription>,
    #[serde(default)]
    pub events: Vec<EventDescription>,
}

impl InterfaceProvidedDescription {
    /// Find a command by name.
    pub fn command(&self, name: &str) -> Option<&CommandDescription> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Whether an event with this name is offered.
    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.name == name)
    }
}

/// Description of a required interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRequiredDescription {
    pub name: String,
    pub requiredness: Requiredness,
    #[serde(default)]
    pub functions: Vec<FunctionDescription>,
    #[serde(default)]
    pub event_handlers: Vec<String>,
}

/// Names of the interfaces a component owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceNames {
    #[serde(default)]
    pub provided: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Directory entry for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescription {
    pub process: String,
    pub name: String,
    pub class: String,
    pub state: ComponentState,
    #[serde(default)]
    pub interfaces: InterfaceNames,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind_shape() {
        assert!(!CommandKind::Void.takes_argument());
        assert!(CommandKind::Write.takes_argument());
        assert!(CommandKind::Read.returns_value());
        assert!(CommandKind::QualifiedRead.takes_argument());
        assert!(CommandKind::QualifiedRead.returns_value());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(QueuingPolicy::default(), QueuingPolicy::Queued);
        assert_eq!(Requiredness::default(), Requiredness::Required);
    }

    #[test]
    fn test_provided_description_lookup() {
        let description = InterfaceProvidedDescription {
            name: "Prov".to_string(),
            policy: QueuingPolicy::Queued,
            commands: vec![CommandDescription {
                name: "Reset".to_string(),
                kind: CommandKind::Void,
            }],
            events: vec![EventDescription {
                name: "Changed".to_string(),
                kind: EventKind::Write,
            }],
        };
        assert_eq!(description.command("Reset").unwrap().kind, CommandKind::Void);
        assert!(description.command("Missing").is_none());
        assert!(description.has_event("Changed"));
    }
}
