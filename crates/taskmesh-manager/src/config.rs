//! Runtime settings of the managers, derived from the file configuration.

use std::time::Duration;
use taskmesh_config::{Config, GlobalMode};

/// Process name of a stand-alone global manager.
pub const DEFAULT_GLOBAL_PROCESS: &str = "GCM";

/// Settings passed explicitly to every manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Name of this process.
    pub process: String,
    /// Process hosting the global manager and the manager component server.
    pub server_process: String,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub confirm_timeout: Duration,
    pub command_timeout: Duration,
    pub mailbox_size: usize,
    pub manager_mailbox_size: usize,
    pub wait_slice: Duration,
}

impl ManagerConfig {
    /// Defaults for a process that hosts its own global manager.
    pub fn new(process: impl Into<String>) -> Self {
        let process = process.into();
        Self {
            server_process: process.clone(),
            process,
            retry_count: 10,
            retry_delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            confirm_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            mailbox_size: 64,
            manager_mailbox_size: 256,
            wait_slice: Duration::from_secs(3),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let server_process = match config.global.mode {
            GlobalMode::Local => config.process.name.clone(),
            GlobalMode::Remote => config
                .global
                .process
                .clone()
                .unwrap_or_else(|| DEFAULT_GLOBAL_PROCESS.to_string()),
        };
        Self {
            process: config.process.name.clone(),
            server_process,
            retry_count: config.connect.retry_count.max(1),
            retry_delay: config.connect.retry_delay(),
            backoff_multiplier: config.connect.backoff_multiplier.max(1.0),
            confirm_timeout: config.connect.confirm_timeout(),
            command_timeout: config.connect.command_timeout(),
            mailbox_size: config.mailbox.default_size,
            manager_mailbox_size: config.mailbox.manager_size,
            wait_slice: config.wait.slice(),
        }
    }

    pub fn with_server_process(mut self, process: impl Into<String>) -> Self {
        self.server_process = process.into();
        self
    }

    pub fn with_retry(mut self, count: u32, delay: Duration) -> Self {
        self.retry_count = count.max(1);
        self.retry_delay = delay;
        self
    }

    /// Delay before attempt `attempt + 1` (attempts count from 1).
    pub fn retry_delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.retry_delay.mul_f64(factor)
    }

    /// Upper bound for one management request: a full retry cycle plus
    /// one command timeout.
    pub fn management_timeout(&self) -> Duration {
        (1..self.retry_count).fold(self.command_timeout, |total, attempt| {
            total + self.retry_delay_after(attempt)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_mode_hosts_server() {
        let mut config = Config::default();
        config.process.name = "Robot".into();
        let manager = ManagerConfig::from_config(&config);
        assert_eq!(manager.process, "Robot");
        assert_eq!(manager.server_process, "Robot");
        assert_eq!(manager.retry_count, 10);
        assert_eq!(manager.wait_slice, Duration::from_secs(3));
    }

    #[test]
    fn test_remote_mode_names_server_process() {
        let config = taskmesh_config::ConfigLoader::load_str(
            r#"
[process]
name = "Vision"

[global]
mode = "remote"
endpoint = "tcp://127.0.0.1:9100"
"#,
        )
        .unwrap();
        let manager = ManagerConfig::from_config(&config);
        assert_eq!(manager.server_process, DEFAULT_GLOBAL_PROCESS);
    }

    #[test]
    fn test_fixed_delay_by_default() {
        let config = ManagerConfig::new("P").with_retry(3, Duration::from_millis(100));
        assert_eq!(config.retry_delay_after(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay_after(3), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_multiplier() {
        let mut config = ManagerConfig::new("P").with_retry(3, Duration::from_millis(100));
        config.backoff_multiplier = 2.0;
        assert_eq!(config.retry_delay_after(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_management_timeout_covers_retries() {
        let mut config = ManagerConfig::new("P").with_retry(3, Duration::from_millis(100));
        config.command_timeout = Duration::from_secs(1);
        assert_eq!(config.management_timeout(), Duration::from_millis(1200));
    }
}
