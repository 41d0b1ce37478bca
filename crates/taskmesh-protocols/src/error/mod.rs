//! Error types for the TaskMesh manager protocol.

mod manager;
mod transport;

pub use manager::*;
pub use transport::*;
