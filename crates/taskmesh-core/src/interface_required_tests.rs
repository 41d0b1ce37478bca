use super::*;
use crate::interface_provided::InterfaceProvided;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use taskmesh_protocols::QueuingPolicy;

fn server() -> Arc<InterfaceProvided> {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 4);
    iface.add_command_void("Reset", || Ok(())).unwrap();
    iface
        .add_command_qualified_read("Square", |v| {
            let n: i64 = serde_json::from_value(v)?;
            Ok(json!(n * n))
        })
        .unwrap();
    iface.add_event_write("Changed").unwrap();
    Arc::new(iface)
}

fn client() -> Arc<InterfaceRequired> {
    let iface = InterfaceRequired::new("A", "Req", Requiredness::Required, 4);
    iface.add_function("Reset", CommandKind::Void).unwrap();
    iface.add_function("Square", CommandKind::QualifiedRead).unwrap();
    iface
}

#[test]
fn test_unbound_function() {
    let req = client();
    assert_eq!(req.call_void("Reset"), ExecutionResult::FunctionNotBound);
    assert_eq!(req.call_void("Unknown"), ExecutionResult::InvalidCommand);
}

#[test]
fn test_connect_and_call() {
    let prov = server();
    let req = client();
    req.connect(prov.clone()).unwrap();
    assert!(req.is_connected());
    assert_eq!(req.connected_interface().as_deref(), Some("Prov"));

    assert_eq!(req.call_qualified_read("Square", json!(7)), Ok(json!(49)));
    assert_eq!(req.call_void("Reset"), ExecutionResult::Ok);
    assert_eq!(prov.mailbox_len(), 1);
}

#[test]
fn test_connect_twice_rejected() {
    let req = client();
    req.connect(server()).unwrap();
    assert!(matches!(
        req.connect(server()),
        Err(ComponentError::AlreadyConnected(_))
    ));
}

#[test]
fn test_connect_rejects_missing_command() {
    let req = client();
    req.add_function("Calibrate", CommandKind::Void).unwrap();
    let result = req.connect(server());
    assert!(matches!(result, Err(ComponentError::Incompatible(_))));
    assert!(!req.is_connected());
}

#[test]
fn test_connect_rejects_kind_mismatch() {
    let req = InterfaceRequired::new("A", "Req", Requiredness::Required, 4);
    req.add_function("Reset", CommandKind::Read).unwrap();
    assert!(matches!(
        req.connect(server()),
        Err(ComponentError::Incompatible(_))
    ));
}

#[test]
fn test_direct_event_handler() {
    let prov = server();
    let req = client();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    req.add_event_handler_write("Changed", false, move |v| sink.lock().push(v))
        .unwrap();
    req.connect(prov.clone()).unwrap();

    assert_eq!(prov.raise_event("Changed", json!(3)), ExecutionResult::Ok);
    assert_eq!(*seen.lock(), vec![json!(3)]);
}

#[test]
fn test_queued_event_handler_runs_on_process_events() {
    let prov = server();
    let req = client();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    req.add_event_handler_write("Changed", true, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    req.connect(prov.clone()).unwrap();

    prov.raise_event("Changed", json!(1));
    prov.raise_event("Changed", json!(2));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(req.pending_events(), 2);
    assert_eq!(req.process_events(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_panicking_event_handler_is_contained() {
    let prov = server();
    let req = client();
    req.add_event_handler_void("Changed", false, || panic!("handler failure"))
        .unwrap();
    req.connect(prov.clone()).unwrap();
    assert_eq!(
        prov.raise_event("Changed", Value::Null),
        ExecutionResult::CommandException
    );
}

#[test]
fn test_event_receiver_wakes_on_event() {
    let prov = server();
    let req = client();
    let receiver = req.add_event_receiver("Changed");
    req.connect(prov.clone()).unwrap();

    let generation = receiver.generation();
    prov.raise_event("Changed", json!("x"));
    assert_eq!(
        receiver.wait_since(generation, Duration::from_millis(10)),
        Some(json!("x"))
    );
}

#[test]
fn test_disconnect_unbinds_and_unsubscribes() {
    let prov = server();
    let req = client();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    req.add_event_handler_void("Changed", false, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    req.connect(prov.clone()).unwrap();
    req.call_void("Reset");
    assert_eq!(prov.mailbox_len(), 1);

    req.disconnect().unwrap();
    assert!(!req.is_connected());
    assert_eq!(prov.mailbox_len(), 0);
    assert_eq!(prov.client_count(), 0);

    prov.raise_event("Changed", Value::Null);
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(req.call_void("Reset"), ExecutionResult::FunctionNotBound);
    assert!(matches!(req.disconnect(), Err(ComponentError::NotConnected(_))));
}

#[test]
fn test_description() {
    let req = client();
    req.add_event_handler_void("Changed", true, || {}).unwrap();
    let description = req.description();
    assert_eq!(description.functions.len(), 2);
    assert_eq!(description.event_handlers, vec!["Changed".to_string()]);
}
