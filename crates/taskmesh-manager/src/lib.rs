//! # TaskMesh Manager
//!
//! Local and global component managers and everything that lets them talk
//! across processes.
//!
//! - [`GlobalComponentManager`] - single authority over processes,
//!   components and connections
//! - [`LocalComponentManager`] - owns the components of one process and
//!   binds their interfaces
//! - [`InProcessHub`] / [`Connector`] - endpoint resolution
//! - [`GlobalServer`] / [`LocalServer`] - TCP JSON-lines transports
//! - [`ManagerComponentServices`] - blocking management calls for components

pub mod blocking;
pub mod config;
pub mod error;
pub mod global;
pub mod hub;
pub mod local;
pub mod manager_component;
pub mod proxy;
pub mod services;
pub mod transport;

pub use blocking::run_blocking;
pub use config::{DEFAULT_GLOBAL_PROCESS, ManagerConfig};
pub use error::{from_component_error, within};
pub use global::GlobalComponentManager;
pub use hub::{Connector, InProcessHub};
pub use local::LocalComponentManager;
pub use manager_component::{
    INTERFACE_COMPONENT, INTERFACE_GCM, MANAGER_FUNCTIONS, MANAGER_SERVER,
    build_manager_client, build_manager_server, manager_client_name,
};
pub use proxy::{ProvidedInterfaceProxy, RequiredInterfaceProxy};
pub use services::{ManagerComponentServices, SERVICES_INTERFACE, WaitTimeout};
pub use transport::{
    DEFAULT_REQUEST_TIMEOUT, GlobalServer, LocalServer, MAX_LINE_LENGTH, ManagerServer,
    TcpGlobalClient, TcpLocalClient,
};
