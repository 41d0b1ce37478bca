use super::*;

struct NoPeers;

#[async_trait]
impl PeerConnector for NoPeers {
    async fn local(&self, endpoint: &Endpoint) -> Result<Arc<dyn LocalManagerInterface>, ManagerError> {
        Err(ManagerError::Network(format!("{} unreachable", endpoint)))
    }

    async fn global(&self, endpoint: &Endpoint) -> Result<Arc<dyn GlobalManagerInterface>, ManagerError> {
        Err(ManagerError::Network(format!("{} unreachable", endpoint)))
    }
}

fn gcm() -> GlobalComponentManager {
    GlobalComponentManager::new(Arc::new(NoPeers), Duration::from_millis(50))
}

fn description(process: &str, name: &str, provided: &[&str], required: &[&str]) -> ComponentDescription {
    ComponentDescription {
        process: process.into(),
        name: name.into(),
        class: name.into(),
        state: ComponentState::Constructed,
        interfaces: InterfaceNames {
            provided: provided.iter().map(|s| s.to_string()).collect(),
            required: required.iter().map(|s| s.to_string()).collect(),
        },
    }
}

async fn populated() -> GlobalComponentManager {
    let gcm = gcm();
    gcm.add_process("P1", Endpoint::InProcess("P1".into())).await.unwrap();
    gcm.add_process("P2", Endpoint::InProcess("P2".into())).await.unwrap();
    gcm.register_component(description("P1", "A", &[], &["Req"])).await.unwrap();
    gcm.register_component(description("P2", "B", &["Prov"], &[])).await.unwrap();
    gcm
}

fn req() -> InterfaceAddress {
    InterfaceAddress::new("P1", "A", "Req")
}

fn prov() -> InterfaceAddress {
    InterfaceAddress::new("P2", "B", "Prov")
}

#[tokio::test]
async fn test_add_process_twice() {
    let gcm = gcm();
    gcm.add_process("P", Endpoint::InProcess("P".into())).await.unwrap();
    let err = gcm
        .add_process("P", Endpoint::InProcess("P".into()))
        .await
        .unwrap_err();
    assert_eq!(err, ManagerError::AlreadyRegistered("P".into()));
}

#[tokio::test]
async fn test_register_component_needs_process() {
    let gcm = gcm();
    let err = gcm
        .register_component(description("Nope", "A", &[], &[]))
        .await
        .unwrap_err();
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_resolve_swaps_reversed_arguments() {
    let gcm = populated().await;
    let (client, server) = gcm.resolve_connection(prov(), req()).await.unwrap();
    assert_eq!(client, req());
    assert_eq!(server, prov());
}

#[tokio::test]
async fn test_resolve_unknown_interface() {
    let gcm = populated().await;
    let err = gcm
        .resolve_connection(InterfaceAddress::new("P1", "A", "Nope"), prov())
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::InterfaceNotFound(ref a) if a.interface == "Nope"));
}

#[tokio::test]
async fn test_pending_connection_blocks_second_setup() {
    let gcm = populated().await;
    let first = gcm.connect_setup(req(), prov()).await.unwrap();
    assert!(first.id.is_valid());

    let err = gcm.connect_setup(req(), prov()).await.unwrap_err();
    assert_eq!(err, ManagerError::AlreadyConnected(first.id));

    // pending connections are not listed
    assert!(gcm.list_connections().await.unwrap().is_empty());
    assert_eq!(gcm.find_connection(req(), prov()).await.unwrap(), Some(first.id));
}

#[tokio::test]
async fn test_notify_publishes_connection() {
    let gcm = populated().await;
    let mut events = gcm.subscribe();
    let description = gcm.connect_setup(req(), prov()).await.unwrap();
    gcm.connect_notify(description.id).await.unwrap();

    assert_eq!(gcm.list_connections().await.unwrap(), vec![description.clone()]);
    assert_eq!(events.recv().await.unwrap(), ManagerEvent::AddConnection(description));
}

#[tokio::test]
async fn test_disconnect_then_setup_yields_new_id() {
    let gcm = populated().await;
    let first = gcm.connect_setup(req(), prov()).await.unwrap();
    gcm.connect_notify(first.id).await.unwrap();
    gcm.disconnect(first.id).await.unwrap();
    assert!(gcm.list_connections().await.unwrap().is_empty());

    let second = gcm.connect_setup(req(), prov()).await.unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_disconnect_unknown_id() {
    let gcm = populated().await;
    let err = gcm.disconnect(ConnectionId(99)).await.unwrap_err();
    assert_eq!(err, ManagerError::ConnectionNotFound(ConnectionId(99)));
}

#[tokio::test]
async fn test_unconfirmed_connection_expires() {
    let gcm = populated().await;
    let pending = gcm.connect_setup(req(), prov()).await.unwrap();
    assert!(gcm.check_confirm_timeouts().await.is_empty());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(gcm.check_confirm_timeouts().await, vec![pending.id]);
    assert_eq!(gcm.find_connection(req(), prov()).await.unwrap(), None);
}

#[tokio::test]
async fn test_state_changes_are_cached() {
    let gcm = populated().await;
    gcm.set_component_state(ComponentStateChange {
        process: "P2".into(),
        component: "B".into(),
        state: ComponentState::Ready,
    })
    .await
    .unwrap();
    assert_eq!(gcm.component_state("P2", "B").await.unwrap(), ComponentState::Ready);
}

#[tokio::test]
async fn test_remove_process_drops_its_connections() {
    let gcm = populated().await;
    let description = gcm.connect_setup(req(), prov()).await.unwrap();
    gcm.connect_notify(description.id).await.unwrap();

    gcm.remove_process("P2").await.unwrap();
    assert!(gcm.list_connections().await.unwrap().is_empty());
    assert_eq!(gcm.names_of_processes().await.unwrap(), vec!["P1"]);
    assert!(gcm.names_of_components("P2").await.is_err());
}

#[tokio::test]
async fn test_names_of_interfaces() {
    let gcm = populated().await;
    let names = gcm.names_of_interfaces("P2", "B").await.unwrap();
    assert_eq!(names.provided, vec!["Prov"]);
    assert!(names.required.is_empty());
}
