//! Configuration validation.

use std::collections::HashSet;

use taskmesh_protocols::{Endpoint, InterfaceAddress};

use crate::error::ConfigError;
use crate::schema::{Config, GlobalMode};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_process(config, &mut result);
        Self::validate_global(config, &mut result);
        Self::validate_connect(config, &mut result);
        Self::validate_mailbox(config, &mut result);
        Self::validate_components(config, &mut result);
        Self::validate_connections(config, &mut result);

        Ok(result)
    }

    fn validate_process(config: &Config, result: &mut ValidationResult) {
        let name = &config.process.name;
        if name.is_empty() {
            result.add_error(ValidationError::new("process.name", "Process name cannot be empty"));
        } else if name.contains(':') {
            result.add_error(ValidationError::new(
                "process.name",
                "Process name cannot contain ':'",
            ));
        }

        if let Some(listen) = &config.process.listen {
            Self::check_endpoint("process.listen", listen, result);
        }
    }

    fn validate_global(config: &Config, result: &mut ValidationResult) {
        match (&config.global.mode, &config.global.endpoint) {
            (GlobalMode::Remote, None) => {
                result.add_error(ValidationError::new(
                    "global.endpoint",
                    "Remote mode requires a global manager endpoint",
                ));
            }
            (GlobalMode::Remote, Some(endpoint)) => {
                Self::check_endpoint("global.endpoint", endpoint, result);
                if config.process.listen.is_none() {
                    result.add_warning(ValidationWarning::new(
                        "process.listen",
                        "No listen address: peers cannot reach this process",
                    ));
                }
            }
            (GlobalMode::Local, Some(_)) => {
                result.add_warning(ValidationWarning::new(
                    "global.endpoint",
                    "Endpoint is ignored in local mode",
                ));
            }
            (GlobalMode::Local, None) => {}
        }

        if let Some(listen) = &config.global.listen {
            Self::check_endpoint("global.listen", listen, result);
        }
    }

    fn validate_connect(config: &Config, result: &mut ValidationResult) {
        let connect = &config.connect;
        if connect.retry_count == 0 {
            result.add_error(ValidationError::new(
                "connect.retry_count",
                "retry_count must be greater than 0",
            ));
        }
        if connect.retry_count > 100 {
            result.add_warning(ValidationWarning::new(
                "connect.retry_count",
                "retry_count is very high (>100), failed connects will block for a long time",
            ));
        }
        if connect.backoff_multiplier < 1.0 {
            result.add_error(ValidationError::new(
                "connect.backoff_multiplier",
                "backoff_multiplier must be at least 1.0",
            ));
        }
        if connect.command_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "connect.command_timeout_ms",
                "command_timeout_ms must be greater than 0",
            ));
        }
    }

    fn validate_mailbox(config: &Config, result: &mut ValidationResult) {
        if config.mailbox.default_size == 0 {
            result.add_error(ValidationError::new(
                "mailbox.default_size",
                "Mailbox size must be greater than 0",
            ));
        }
        if config.mailbox.manager_size == 0 {
            result.add_error(ValidationError::new(
                "mailbox.manager_size",
                "Mailbox size must be greater than 0",
            ));
        }
    }

    fn validate_components(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (index, component) in config.components.iter().enumerate() {
            let path = format!("components[{}]", index);
            if component.class.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.class", path),
                    "Class cannot be empty",
                ));
            }
            if component.name.is_empty() || component.name.contains(':') {
                result.add_error(ValidationError::new(
                    format!("{}.name", path),
                    "Component name must be non-empty and cannot contain ':'",
                ));
            }
            if !seen.insert(component.name.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.name", path),
                    format!("Duplicate component name: {}", component.name),
                ));
            }
        }
    }

    fn validate_connections(config: &Config, result: &mut ValidationResult) {
        let process = &config.process.name;
        let declared: HashSet<&str> = config.components.iter().map(|c| c.name.as_str()).collect();

        for (index, connection) in config.connections.iter().enumerate() {
            for (side, text) in [("client", &connection.client), ("server", &connection.server)] {
                let path = format!("connections[{}].{}", index, side);
                match InterfaceAddress::parse(text, process) {
                    None => result.add_error(ValidationError::new(
                        path,
                        format!("Expected [process:]component:interface, got '{}'", text),
                    )),
                    Some(address) => {
                        if &address.process == process
                            && !declared.contains(address.component.as_str())
                        {
                            result.add_warning(ValidationWarning::new(
                                path,
                                format!(
                                    "Component '{}' is not declared in this file",
                                    address.component
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_endpoint(path: &str, text: &str, result: &mut ValidationResult) {
        if let Err(message) = text.parse::<Endpoint>() {
            result.add_error(ValidationError::new(path, message));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
