//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Root configuration of one TaskMesh process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub process: ProcessConfig,

    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub connect: ConnectConfig,

    #[serde(default)]
    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub wait: WaitConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Components created at startup, in order.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    /// Connections established after every component exists.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Identity of this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_process_name")]
    pub name: String,

    /// Address the local manager serves peer requests on (`tcp://host:port`).
    #[serde(default)]
    pub listen: Option<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            name: default_process_name(),
            listen: None,
        }
    }
}

fn default_process_name() -> String {
    "LCM".to_string()
}

/// Where the global component manager lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalMode {
    /// Global manager co-located in this process.
    #[default]
    Local,
    /// Global manager reached over the network.
    Remote,
}

/// Global manager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub mode: GlobalMode,

    /// Endpoint of a remote global manager.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Address a co-located global manager additionally listens on.
    #[serde(default)]
    pub listen: Option<String>,

    /// Process hosting the global manager when it is remote.
    #[serde(default)]
    pub process: Option<String>,
}

/// Connection protocol tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Attempts made before a remote connect fails.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt (1.0 = fixed delay).
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Seconds a pending connection may wait for confirmation.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Milliseconds a caller waits on a blocking or remote command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl ConnectConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_retry_count() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_confirm_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_ms() -> u64 {
    5000
}

/// Mailbox capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Capacity of queued interfaces created without an explicit size.
    #[serde(default = "default_mailbox_size")]
    pub default_size: usize,

    /// Capacity of manager component interfaces.
    #[serde(default = "default_manager_mailbox_size")]
    pub manager_size: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            default_size: default_mailbox_size(),
            manager_size: default_manager_mailbox_size(),
        }
    }
}

fn default_mailbox_size() -> usize {
    64
}

fn default_manager_mailbox_size() -> usize {
    256
}

/// Wait-for-condition tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Length of each bounded wait when waiting indefinitely.
    #[serde(default = "default_slice_secs")]
    pub slice_secs: u64,
}

impl WaitConfig {
    pub fn slice(&self) -> Duration {
        Duration::from_secs(self.slice_secs)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            slice_secs: default_slice_secs(),
        }
    }
}

fn default_slice_secs() -> u64 {
    3
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset.
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            file_prefix: default_log_prefix(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_prefix() -> String {
    "taskmesh".to_string()
}

/// One component to create at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Registered class name.
    pub class: String,

    /// Component name, unique within the process.
    pub name: String,

    /// Constructor arguments passed to the class factory.
    #[serde(default)]
    pub args: Value,

    /// Configuration string passed to the component's `configure` hook.
    #[serde(default)]
    pub configure: Option<String>,
}

/// One connection to establish at startup.
///
/// Addresses are `component:interface` (this process) or
/// `process:component:interface`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub client: String,
    pub server: String,
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
