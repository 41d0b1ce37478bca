//! Endpoint resolution.
//!
//! [`InProcessHub`] resolves `inproc://` endpoints to managers living in
//! this OS process. [`Connector`] adds TCP endpoints on top of it and
//! caches one client per remote address.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use taskmesh_protocols::{
    Endpoint, GlobalManagerInterface, LocalManagerInterface, ManagerError, PeerConnector,
};
use tracing::debug;

use crate::transport::{DEFAULT_REQUEST_TIMEOUT, TcpGlobalClient, TcpLocalClient};

/// Registry of the managers running in this OS process.
///
/// Holds weak references so that a manager and the hub it is registered
/// with do not keep each other alive.
#[derive(Default)]
pub struct InProcessHub {
    locals: DashMap<String, Weak<dyn LocalManagerInterface>>,
    global: RwLock<Option<Weak<dyn GlobalManagerInterface>>>,
}

impl InProcessHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_local(&self, process: &str, lcm: &Arc<dyn LocalManagerInterface>) {
        debug!("Hub: local manager {} registered", process);
        self.locals.insert(process.to_string(), Arc::downgrade(lcm));
    }

    pub fn unregister_local(&self, process: &str) {
        self.locals.remove(process);
    }

    pub fn set_global(&self, gcm: &Arc<dyn GlobalManagerInterface>) {
        *self.global.write() = Some(Arc::downgrade(gcm));
    }

    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.locals.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn unreachable(endpoint: &Endpoint) -> ManagerError {
        ManagerError::Network(format!("no manager at {}", endpoint))
    }
}

#[async_trait]
impl PeerConnector for InProcessHub {
    async fn local(&self, endpoint: &Endpoint) -> Result<Arc<dyn LocalManagerInterface>, ManagerError> {
        match endpoint {
            Endpoint::InProcess(name) => self
                .locals
                .get(name)
                .and_then(|weak| weak.upgrade())
                .ok_or_else(|| Self::unreachable(endpoint)),
            Endpoint::Tcp(_) => Err(Self::unreachable(endpoint)),
        }
    }

    async fn global(&self, endpoint: &Endpoint) -> Result<Arc<dyn GlobalManagerInterface>, ManagerError> {
        match endpoint {
            Endpoint::InProcess(_) => self
                .global
                .read()
                .as_ref()
                .and_then(|weak| weak.upgrade())
                .ok_or_else(|| Self::unreachable(endpoint)),
            Endpoint::Tcp(_) => Err(Self::unreachable(endpoint)),
        }
    }
}

/// Resolves both in-process and TCP endpoints.
pub struct Connector {
    hub: Arc<InProcessHub>,
    request_timeout: Duration,
    tcp_locals: DashMap<String, Arc<TcpLocalClient>>,
    tcp_globals: DashMap<String, Arc<TcpGlobalClient>>,
}

impl Connector {
    pub fn new(hub: Arc<InProcessHub>) -> Arc<Self> {
        Self::with_request_timeout(hub, DEFAULT_REQUEST_TIMEOUT)
    }

    /// TCP requests that get no answer within `request_timeout` fail with
    /// a network error.
    pub fn with_request_timeout(hub: Arc<InProcessHub>, request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            hub,
            request_timeout,
            tcp_locals: DashMap::new(),
            tcp_globals: DashMap::new(),
        })
    }

    pub fn hub(&self) -> &Arc<InProcessHub> {
        &self.hub
    }

    async fn tcp_local(&self, addr: &str) -> Result<Arc<TcpLocalClient>, ManagerError> {
        if let Some(client) = self.tcp_locals.get(addr).map(|c| c.clone()) {
            if !client.is_closed() {
                return Ok(client);
            }
            debug!("Reconnecting to local manager at {}", addr);
        }
        let client = Arc::new(TcpLocalClient::connect_with_timeout(addr, self.request_timeout).await?);
        self.tcp_locals.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    async fn tcp_global(&self, addr: &str) -> Result<Arc<TcpGlobalClient>, ManagerError> {
        if let Some(client) = self.tcp_globals.get(addr).map(|c| c.clone()) {
            if !client.is_closed() {
                return Ok(client);
            }
            debug!("Reconnecting to global manager at {}", addr);
        }
        let client = Arc::new(TcpGlobalClient::connect_with_timeout(addr, self.request_timeout).await?);
        self.tcp_globals.insert(addr.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl PeerConnector for Connector {
    async fn local(&self, endpoint: &Endpoint) -> Result<Arc<dyn LocalManagerInterface>, ManagerError> {
        match endpoint {
            Endpoint::InProcess(_) => self.hub.local(endpoint).await,
            Endpoint::Tcp(addr) => {
                let client: Arc<dyn LocalManagerInterface> = self.tcp_local(addr).await?;
                Ok(client)
            }
        }
    }

    async fn global(&self, endpoint: &Endpoint) -> Result<Arc<dyn GlobalManagerInterface>, ManagerError> {
        match endpoint {
            Endpoint::InProcess(_) => self.hub.global(endpoint).await,
            Endpoint::Tcp(addr) => {
                let client: Arc<dyn GlobalManagerInterface> = self.tcp_global(addr).await?;
                Ok(client)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::GlobalComponentManager;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unknown_in_process_endpoint_is_retriable() {
        let hub = InProcessHub::new();
        let err = hub.local(&Endpoint::in_process("P9")).await.err().unwrap();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_hub_does_not_keep_global_alive() {
        let hub = InProcessHub::new();
        let gcm: Arc<dyn GlobalManagerInterface> = Arc::new(GlobalComponentManager::new(
            hub.clone(),
            Duration::from_secs(1),
        ));
        hub.set_global(&gcm);
        assert!(hub.global(&Endpoint::in_process("GCM")).await.is_ok());

        drop(gcm);
        assert!(hub.global(&Endpoint::in_process("GCM")).await.is_err());
    }

    #[tokio::test]
    async fn test_connector_reports_refused_tcp() {
        let connector = Connector::new(InProcessHub::new());
        // port 1 is never a manager
        let err = connector.local(&Endpoint::tcp("127.0.0.1:1")).await.err().unwrap();
        assert!(matches!(err, ManagerError::Network(_)));
    }
}
