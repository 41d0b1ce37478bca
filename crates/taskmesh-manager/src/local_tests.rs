use super::*;
use crate::global::GlobalComponentManager;
use crate::hub::InProcessHub;
use serde_json::json;
use taskmesh_core::IdleTask;
use taskmesh_protocols::{CommandKind, QueuingPolicy, Requiredness};

struct Fixture {
    gcm: Arc<GlobalComponentManager>,
    lcm: Arc<LocalComponentManager>,
    _hub: Arc<InProcessHub>,
}

async fn fixture(process: &str) -> Fixture {
    let hub = InProcessHub::new();
    let gcm = Arc::new(GlobalComponentManager::new(hub.clone(), Duration::from_secs(5)));
    let global: Arc<dyn GlobalManagerInterface> = gcm.clone();
    hub.set_global(&global);
    let config = ManagerConfig::new(process).with_retry(3, Duration::from_millis(10));
    let lcm = LocalComponentManager::start(config, Endpoint::in_process(process), global, hub.clone())
        .await
        .unwrap();
    let local: Arc<dyn LocalManagerInterface> = lcm.clone();
    hub.register_local(process, &local);
    Fixture { gcm, lcm, _hub: hub }
}

fn server(name: &str) -> Arc<Component> {
    let component = Component::builder(name).build(IdleTask).unwrap();
    let prov = component
        .add_interface_provided("Prov", QueuingPolicy::NotQueued)
        .unwrap();
    prov.add_command_read("Get", || Ok(json!(42))).unwrap();
    component
}

fn client(name: &str) -> Arc<Component> {
    let component = Component::builder(name).build(IdleTask).unwrap();
    let req = component
        .add_interface_required("Req", Requiredness::Required)
        .unwrap();
    req.add_function("Get", CommandKind::Read).unwrap();
    component
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_component_registers_globally() {
    let f = fixture("P1").await;
    f.lcm.add_component(server("B")).await.unwrap();

    assert_eq!(f.gcm.names_of_components("P1").await.unwrap(), vec!["B"]);
    let names = f.gcm.names_of_interfaces("P1", "B").await.unwrap();
    assert!(names.provided.contains(&"Prov".to_string()));
    assert!(names.provided.contains(&INTERFACE_INTERNAL.to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_component_rejected() {
    let f = fixture("P1").await;
    f.lcm.add_component(server("B")).await.unwrap();
    let err = f.lcm.add_component(server("B")).await.unwrap_err();
    assert_eq!(err, ManagerError::AlreadyRegistered("B".into()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_connect_binds_directly() {
    let f = fixture("P1").await;
    let a = client("A");
    f.lcm.add_component(a.clone()).await.unwrap();
    f.lcm.add_component(server("B")).await.unwrap();

    let id = f
        .lcm
        .connect(
            InterfaceAddress::new("P1", "A", "Req"),
            InterfaceAddress::new("P1", "B", "Prov"),
        )
        .await
        .unwrap();
    assert_eq!(f.lcm.bound_connections(), vec![id]);
    assert_eq!(f.gcm.list_connections().await.unwrap().len(), 1);

    let req = a.interface_required("Req").unwrap();
    assert_eq!(req.call_read("Get").unwrap(), json!(42));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_state_changes_reach_global_manager() {
    let f = fixture("P1").await;
    f.lcm.add_component(server("B")).await.unwrap();
    f.lcm.start_component("B", 0.0).await.unwrap();
    assert_eq!(f.lcm.component_state("B").await.unwrap(), ComponentState::Active);

    let gcm = f.gcm.clone();
    assert!(
        eventually(|| {
            let gcm = gcm.clone();
            async move { gcm.component_state("P1", "B").await == Ok(ComponentState::Active) }
        })
        .await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_goes_through_internal_interface() {
    let f = fixture("P1").await;
    let b = server("B");
    f.lcm.add_component(b.clone()).await.unwrap();
    f.lcm.start_component("B", 0.0).await.unwrap();

    f.lcm.stop_component("B", 0.0).await.unwrap();
    assert_eq!(b.state(), ComponentState::Ready);

    f.lcm.resume_component("B", 0.0).await.unwrap();
    assert_eq!(b.state(), ComponentState::Active);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_manager_components_ignore_lifecycle_requests() {
    let f = fixture("P1").await;
    let mcc = Component::builder("MCC_P1").build(IdleTask).unwrap();
    f.lcm.add_manager_component(mcc.clone()).await.unwrap();

    f.lcm.start_component("MCC_P1", 0.0).await.unwrap();
    assert_eq!(mcc.state(), ComponentState::Constructed);
    assert_eq!(
        f.lcm.component_state("MCC_P1").await.unwrap(),
        ComponentState::Active
    );

    f.lcm.kill_all();
    assert_eq!(mcc.state(), ComponentState::Constructed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_component() {
    let f = fixture("P1").await;
    let err = f.lcm.start_component("Nope", 0.0).await.unwrap_err();
    assert!(matches!(err, ManagerError::ComponentNotFound { ref component, .. } if component == "Nope"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_unknown_id_is_noop() {
    let f = fixture("P1").await;
    assert!(!f.lcm.disconnect(ConnectionId(77)).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_configure_from_declares_components_and_connections() {
    let f = fixture("P1").await;
    f.lcm
        .factory()
        .register_class("Server", |builder, _args| {
            let component = builder.build(IdleTask)?;
            let prov = component.add_interface_provided("Prov", QueuingPolicy::NotQueued)?;
            prov.add_command_read("Get", || Ok(json!(7)))?;
            Ok(component)
        })
        .unwrap();
    f.lcm
        .factory()
        .register_class("Client", |builder, _args| {
            let component = builder.build(IdleTask)?;
            let req = component.add_interface_required("Req", Requiredness::Required)?;
            req.add_function("Get", CommandKind::Read)?;
            Ok(component)
        })
        .unwrap();

    let config = taskmesh_config::ConfigLoader::load_str(
        r#"
[process]
name = "P1"

[[components]]
class = "Server"
name = "B"

[[components]]
class = "Client"
name = "A"

[[connections]]
client = "A:Req"
server = "B:Prov"
"#,
    )
    .unwrap();
    f.lcm.configure_from(&config).await.unwrap();

    assert_eq!(f.lcm.registry().names(), vec!["A", "B"]);
    assert!(f.lcm.create_all_and_wait(Duration::from_secs(2)).unwrap());
    let a = f.lcm.component("A").unwrap();
    assert_eq!(a.interface_required("Req").unwrap().call_read("Get").unwrap(), json!(7));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bulk_lifecycle() {
    let f = fixture("P1").await;
    f.lcm.add_component(server("B")).await.unwrap();
    f.lcm.add_component(server("C")).await.unwrap();

    assert!(f.lcm.create_all_and_wait(Duration::from_secs(2)).unwrap());
    assert!(f.lcm.start_all_and_wait(Duration::from_secs(2)).unwrap());
    assert!(f.lcm.kill_all_and_wait(Duration::from_secs(2)));
    for component in f.lcm.registry().snapshot() {
        assert_eq!(component.state(), ComponentState::Finished);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_leaves_the_system() {
    let f = fixture("P1").await;
    f.lcm.add_component(server("B")).await.unwrap();
    f.lcm.shutdown(Duration::from_secs(2)).await.unwrap();
    assert!(f.gcm.names_of_processes().await.unwrap().is_empty());
}
