//! Process bring-up and tear-down.
//!
//! Builds the global manager (co-located or remote), the local manager,
//! their TCP servers and the manager components, then applies the
//! components and connections declared in the configuration.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use taskmesh_config::{Config, GlobalMode};
use taskmesh_manager::{
    Connector, GlobalComponentManager, GlobalServer, InProcessHub, LocalComponentManager,
    LocalServer, ManagerConfig, ManagerServer,
};
use taskmesh_protocols::{
    Endpoint, GlobalManagerInterface, LocalManagerInterface, ManagerError, PeerConnector,
};

use crate::classes::{DEMO_LIBRARY, demo_library};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// `tcp://host:port` or bare `host:port` to a socket address string.
fn socket_addr(listen: &str) -> Result<String, ManagerError> {
    match listen.parse::<Endpoint>() {
        Ok(Endpoint::Tcp(addr)) => Ok(addr),
        Ok(Endpoint::InProcess(_)) => Err(ManagerError::InvalidRequest(format!(
            "cannot listen on in-process endpoint {}",
            listen
        ))),
        Err(_) if listen.contains(':') => Ok(listen.to_string()),
        Err(e) => Err(ManagerError::InvalidRequest(e)),
    }
}

/// One running TaskMesh process.
pub(crate) struct ProcessRuntime {
    lcm: Arc<LocalComponentManager>,
    gcm: Option<Arc<GlobalComponentManager>>,
    servers: Vec<ManagerServer>,
    cancel: CancellationToken,
}

impl ProcessRuntime {
    /// Bring up the managers described by `config`. Declared components
    /// are created but not started.
    pub(crate) async fn launch(config: &Config) -> Result<Self, ManagerError> {
        let manager_config = ManagerConfig::from_config(config);
        let process = manager_config.process.clone();
        let hub = InProcessHub::new();
        let connector =
            Connector::with_request_timeout(hub.clone(), manager_config.management_timeout());
        let cancel = CancellationToken::new();
        let mut servers = Vec::new();

        let (global, gcm): (Arc<dyn GlobalManagerInterface>, _) = match config.global.mode {
            GlobalMode::Local => {
                let gcm = Arc::new(
                    GlobalComponentManager::new(connector.clone(), manager_config.confirm_timeout)
                        .with_call_timeout(manager_config.command_timeout),
                );
                let global: Arc<dyn GlobalManagerInterface> = gcm.clone();
                hub.set_global(&global);
                gcm.spawn_confirm_sweeper(manager_config.confirm_timeout / 2, cancel.clone());
                if let Some(listen) = &config.global.listen {
                    let server = GlobalServer::bind(&socket_addr(listen)?, gcm.clone(), cancel.clone()).await?;
                    info!("Global component manager serving on {}", server.endpoint());
                    servers.push(server);
                }
                (global, Some(gcm))
            }
            GlobalMode::Remote => {
                let endpoint: Endpoint = config
                    .global
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| ManagerError::InvalidRequest("remote mode needs global.endpoint".into()))?
                    .parse()
                    .map_err(ManagerError::InvalidRequest)?;
                info!("Using global component manager at {}", endpoint);
                (connector.global(&endpoint).await?, None)
            }
        };

        let endpoint = match &config.process.listen {
            Some(listen) => Endpoint::tcp(socket_addr(listen)?),
            None => Endpoint::in_process(process.as_str()),
        };
        let lcm = LocalComponentManager::start(manager_config, endpoint, global, connector).await?;
        let local: Arc<dyn LocalManagerInterface> = lcm.clone();
        hub.register_local(&process, &local);

        if let Some(listen) = &config.process.listen {
            let server = LocalServer::bind(&socket_addr(listen)?, lcm.clone(), cancel.clone()).await?;
            info!("Local component manager {} serving on {}", process, server.endpoint());
            servers.push(server);
        }

        lcm.factory().register_library(demo_library());
        if let Err(e) = lcm.factory().load_library(DEMO_LIBRARY) {
            warn!("Built-in classes unavailable: {}", e);
        }
        lcm.enable_manager_components(gcm.clone()).await?;
        lcm.configure_from(config).await?;

        Ok(Self {
            lcm,
            gcm,
            servers,
            cancel,
        })
    }

    pub(crate) fn lcm(&self) -> &Arc<LocalComponentManager> {
        &self.lcm
    }

    pub(crate) fn hosts_global(&self) -> bool {
        self.gcm.is_some()
    }

    /// Create and start every component, waiting up to `timeout` for each
    /// step.
    pub(crate) async fn start_all(&self, timeout: Duration) -> Result<(), ManagerError> {
        let lcm = self.lcm.clone();
        let all_started = tokio::task::spawn_blocking(move || -> Result<bool, ManagerError> {
            Ok(lcm.create_all_and_wait(timeout)? && lcm.start_all_and_wait(timeout)?)
        })
        .await
        .map_err(|e| ManagerError::Component(e.to_string()))??;
        if !all_started {
            warn!("Not every component of {} became active within {:?}", self.lcm.process(), timeout);
        }
        Ok(())
    }

    /// Kill the components, leave the system and stop the servers.
    pub(crate) async fn shutdown(self) {
        info!("Shutting down {}", self.lcm.process());
        if let Err(e) = self.lcm.shutdown(SHUTDOWN_TIMEOUT).await {
            warn!("Local manager shutdown: {}", e);
        }
        self.cancel.cancel();
        for server in self.servers {
            server.shutdown().await;
        }
    }
}
