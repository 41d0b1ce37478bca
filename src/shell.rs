//! Interactive management shell.
//!
//! A line holds one or more commands separated by `;`. Anything after `#`
//! or `//` is a comment. Commands that act on one process take an optional
//! leading process name and default to the shell's own process.

use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use taskmesh_core::{Component, ComponentResult, IdleTask};
use taskmesh_manager::{ManagerComponentServices, ManagerConfig, WaitTimeout};
use taskmesh_protocols::{ComponentState, InterfaceAddress, ManagerError};

pub(crate) const SHELL_COMPONENT: &str = "Shell";

const DEFAULT_WAIT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub(crate) enum ShellError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command}: invalid number of parameters (usage: {usage})")]
    Usage {
        command: &'static str,
        usage: &'static str,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

struct CommandHelp {
    name: &'static str,
    usage: &'static str,
    about: &'static str,
}

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "help",
        usage: "help [command]",
        about: "list commands or show how to use one",
    },
    CommandHelp {
        name: "quit",
        usage: "quit",
        about: "leave the shell",
    },
    CommandHelp {
        name: "list",
        usage: "list [process]",
        about: "list processes and the state of their components",
    },
    CommandHelp {
        name: "classes",
        usage: "classes [process]",
        about: "list the classes a process can create",
    },
    CommandHelp {
        name: "connections",
        usage: "connections [process] [component]",
        about: "list connections, optionally only those touching a process or component",
    },
    CommandHelp {
        name: "waitfor",
        usage: "waitfor process [component [state]]",
        about: "block until a process, a component or a component state exists",
    },
    CommandHelp {
        name: "load",
        usage: "load [process] library",
        about: "load a component library",
    },
    CommandHelp {
        name: "create",
        usage: "create [process] class name [json-args]",
        about: "create a component",
    },
    CommandHelp {
        name: "configure",
        usage: "configure [process] component config",
        about: "configure a component",
    },
    CommandHelp {
        name: "connect",
        usage: "connect [process] client required [process] server provided",
        about: "connect a required interface to a provided interface",
    },
    CommandHelp {
        name: "disconnect",
        usage: "disconnect [process] client required [process] server provided",
        about: "remove a connection",
    },
    CommandHelp {
        name: "start",
        usage: "start [process] component",
        about: "start a component",
    },
    CommandHelp {
        name: "stop",
        usage: "stop [process] component",
        about: "stop a running component",
    },
    CommandHelp {
        name: "resume",
        usage: "resume [process] component",
        about: "resume a stopped component",
    },
];

fn usage(command: &'static str) -> ShellError {
    let usage = COMMANDS
        .iter()
        .find(|c| c.name == command)
        .map(|c| c.usage)
        .unwrap_or(command);
    ShellError::Usage { command, usage }
}

/// Drop everything after the first `#` or `//`.
fn strip_comment(line: &str) -> &str {
    let cut = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

/// Shell component plus the management services it talks through.
pub(crate) struct Shell {
    component: Arc<Component>,
    services: ManagerComponentServices,
    wait_timeout: WaitTimeout,
    quitting: AtomicBool,
}

impl Shell {
    /// Build the shell component. Add it to the local manager and connect
    /// its services with `connect_services(SHELL_COMPONENT)` before use.
    pub(crate) fn new(config: &ManagerConfig) -> ComponentResult<Self> {
        let component = Component::builder(SHELL_COMPONENT)
            .from_signal()
            .build(IdleTask)?;
        let services = ManagerComponentServices::install(&component, config)?;
        Ok(Self {
            component,
            services,
            wait_timeout: WaitTimeout::After(DEFAULT_WAIT),
            quitting: AtomicBool::new(false),
        })
    }

    pub(crate) fn with_wait_timeout(mut self, timeout: WaitTimeout) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub(crate) fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub(crate) fn prompt(&self) -> String {
        format!("{}> ", self.services.process())
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.quitting.load(Ordering::SeqCst) || self.component.state().is_terminal()
    }

    /// Run every command on `line` in order, stopping at the first failure.
    pub(crate) fn execute_line(&self, line: &str) -> Result<String, ShellError> {
        let mut output = Vec::new();
        for command in strip_comment(line).split(';') {
            let command = command.trim();
            if command.is_empty() {
                continue;
            }
            debug!("Shell command: {}", command);
            let out = self.execute(command)?;
            if !out.is_empty() {
                output.push(out);
            }
            if self.is_finished() {
                break;
            }
        }
        Ok(output.join("\n"))
    }

    fn execute(&self, command: &str) -> Result<String, ShellError> {
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));
        if name == "create" {
            return self.create(rest);
        }

        let args: Vec<&str> = rest.split_whitespace().collect();
        match name {
            "help" => self.help(&args),
            "quit" => self.quit(&args),
            "list" => self.list(&args),
            "classes" => {
                let (process, _) = self.split_process("classes", &args, 0)?;
                Ok(self.services.class_names(&process)?.join("\n"))
            }
            "connections" => self.connections(&args),
            "waitfor" => self.wait_for(&args),
            "load" => {
                let (process, rest) = self.split_process("load", &args, 1)?;
                self.services.load_library(&process, &rest[0])?;
                Ok(format!("Loaded {} in {}", rest[0], process))
            }
            "configure" => {
                let (process, rest) = self.split_process("configure", &args, 2)?;
                self.services.component_configure(&process, &rest[0], &rest[1])?;
                Ok(String::new())
            }
            "connect" => {
                let (client, server) = self.addresses("connect", &args)?;
                let id = self.services.connect(client, server)?;
                Ok(format!("Connection {}", id))
            }
            "disconnect" => {
                let (client, server) = self.addresses("disconnect", &args)?;
                self.services.disconnect_interfaces(client, server)?;
                Ok(String::new())
            }
            "start" => {
                let (process, rest) = self.split_process("start", &args, 1)?;
                self.services.component_start(&process, &rest[0], 0.0)?;
                Ok(String::new())
            }
            "stop" => {
                let (process, rest) = self.split_process("stop", &args, 1)?;
                self.services.component_stop(&process, &rest[0], 0.0)?;
                Ok(String::new())
            }
            "resume" => {
                let (process, rest) = self.split_process("resume", &args, 1)?;
                self.services.component_resume(&process, &rest[0], 0.0)?;
                Ok(String::new())
            }
            other => Err(ShellError::UnknownCommand(other.to_string())),
        }
    }

    /// Accept `count` arguments for the own process, or `count + 1` with a
    /// leading process name.
    fn split_process(
        &self,
        command: &'static str,
        args: &[&str],
        count: usize,
    ) -> Result<(String, Vec<String>), ShellError> {
        let owned = |args: &[&str]| args.iter().map(|a| a.to_string()).collect();
        if args.len() == count {
            Ok((self.services.process().to_string(), owned(args)))
        } else if args.len() == count + 1 {
            Ok((args[0].to_string(), owned(&args[1..])))
        } else {
            Err(usage(command))
        }
    }

    fn addresses(
        &self,
        command: &'static str,
        args: &[&str],
    ) -> Result<(InterfaceAddress, InterfaceAddress), ShellError> {
        let own = self.services.process();
        match args {
            [client, required, server, provided] => Ok((
                InterfaceAddress::new(own, *client, *required),
                InterfaceAddress::new(own, *server, *provided),
            )),
            [client_process, client, required, server_process, server, provided] => Ok((
                InterfaceAddress::new(*client_process, *client, *required),
                InterfaceAddress::new(*server_process, *server, *provided),
            )),
            _ => Err(usage(command)),
        }
    }

    fn create(&self, rest: &str) -> Result<String, ShellError> {
        let (head, json) = match rest.find(['{', '[']) {
            Some(index) => (&rest[..index], Some(&rest[index..])),
            None => (rest, None),
        };
        let words: Vec<&str> = head.split_whitespace().collect();
        let (process, rest) = self.split_process("create", &words, 2)?;
        let args = match json {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| ShellError::InvalidArgument(format!("bad component arguments: {}", e)))?,
            None => Value::Null,
        };
        self.services.component_create(&process, &rest[0], &rest[1], args)?;
        Ok(format!("Created {}:{}", process, rest[1]))
    }

    fn help(&self, args: &[&str]) -> Result<String, ShellError> {
        match args {
            [] => Ok(COMMANDS
                .iter()
                .map(|c| format!("  {:<12} {}", c.name, c.about))
                .collect::<Vec<_>>()
                .join("\n")),
            [name] => COMMANDS
                .iter()
                .find(|c| c.name == *name)
                .map(|c| format!("{}\n  {}", c.usage, c.about))
                .ok_or_else(|| ShellError::UnknownCommand(name.to_string())),
            _ => Err(usage("help")),
        }
    }

    fn quit(&self, args: &[&str]) -> Result<String, ShellError> {
        if !args.is_empty() {
            return Err(usage("quit"));
        }
        info!("Shell quitting");
        self.quitting.store(true, Ordering::SeqCst);
        self.component.kill();
        Ok(String::new())
    }

    fn list(&self, args: &[&str]) -> Result<String, ShellError> {
        let processes = match args {
            [] => self.services.names_of_processes()?,
            [process] => vec![process.to_string()],
            _ => return Err(usage("list")),
        };
        let mut lines = Vec::new();
        for process in processes {
            lines.push(process.clone());
            for component in self.services.names_of_components(&process)? {
                let state = self
                    .services
                    .component_get_state(&process, &component)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "?".to_string());
                lines.push(format!("  {}: {}", component, state));
            }
        }
        Ok(lines.join("\n"))
    }

    fn connections(&self, args: &[&str]) -> Result<String, ShellError> {
        let (process, component) = match args {
            [] => (None, None),
            [process] => (Some(*process), None),
            [process, component] => (Some(*process), Some(*component)),
            _ => return Err(usage("connections")),
        };
        let touches = |address: &InterfaceAddress| {
            process.is_none_or(|p| address.process == p)
                && component.is_none_or(|c| address.component == c)
        };
        Ok(self
            .services
            .list_connections()?
            .into_iter()
            .filter(|c| touches(&c.client) || touches(&c.server))
            .map(|c| format!("  [{}] {} -> {}", c.id, c.client, c.server))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn wait_for(&self, args: &[&str]) -> Result<String, ShellError> {
        let timeout = self.wait_timeout;
        let (done, target) = match args {
            [process] => (
                self.services.wait_for_process(process, timeout),
                process.to_string(),
            ),
            [process, component] => (
                self.services.wait_for_component(process, component, timeout),
                format!("{}:{}", process, component),
            ),
            [process, component, state] => {
                let state: ComponentState = state.parse().map_err(ShellError::InvalidArgument)?;
                match self.services.wait_for_state(process, component, state, timeout) {
                    Ok(()) => (true, String::new()),
                    Err(last) => (
                        false,
                        format!(
                            "{}:{} to be {} (last known state {})",
                            process,
                            component,
                            state,
                            last.map_or_else(|| "unknown".to_string(), |s| s.to_string())
                        ),
                    ),
                }
            }
            _ => return Err(usage("waitfor")),
        };
        if done {
            Ok(String::new())
        } else {
            Err(ShellError::Timeout(target))
        }
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
