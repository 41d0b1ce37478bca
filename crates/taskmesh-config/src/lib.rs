//! # TaskMesh Config
//!
//! Configuration management for TaskMesh processes: manager endpoints,
//! connect/retry tuning, mailbox sizes and the declarative list of
//! components and connections a process sets up at startup.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
