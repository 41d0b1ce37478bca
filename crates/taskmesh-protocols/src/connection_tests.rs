use super::*;

#[test]
fn test_invalid_connection_id() {
    assert!(!ConnectionId::INVALID.is_valid());
    assert!(ConnectionId(7).is_valid());
    assert_eq!(ConnectionId(7).to_string(), "#7");
}

#[test]
fn test_address_parse_qualified() {
    let address = InterfaceAddress::parse("p1:Robot:Arm", "local").unwrap();
    assert_eq!(address, InterfaceAddress::new("p1", "Robot", "Arm"));
    assert_eq!(address.to_string(), "p1:Robot:Arm");
}

#[test]
fn test_address_parse_uses_default_process() {
    let address = InterfaceAddress::parse("Robot:Arm", "local").unwrap();
    assert_eq!(address.process, "local");
}

#[test]
fn test_address_parse_rejects_malformed() {
    assert!(InterfaceAddress::parse("Robot", "local").is_none());
    assert!(InterfaceAddress::parse("a:b:c:d", "local").is_none());
    assert!(InterfaceAddress::parse("p::Arm", "local").is_none());
}

#[test]
fn test_connection_locality() {
    let connection = ConnectionDescription {
        id: ConnectionId(1),
        client: InterfaceAddress::new("p1", "A", "Req"),
        server: InterfaceAddress::new("p2", "B", "Prov"),
    };
    assert!(!connection.is_local());
    assert!(connection.involves_process("p2"));
    assert!(!connection.involves_process("p3"));
}

#[test]
fn test_manager_event_names() {
    let event = ManagerEvent::AddComponent {
        process: "p1".to_string(),
        component: "A".to_string(),
    };
    assert_eq!(event.name(), "AddComponent");
    assert!(ManagerEvent::NAMES.contains(&event.name()));

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "add_component");
}
