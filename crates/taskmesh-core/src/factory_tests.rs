use super::*;
use crate::task::IdleTask;
use serde_json::json;
use std::time::Duration;

fn idle(builder: ComponentBuilder, _args: &Value) -> ComponentResult<Arc<Component>> {
    builder.build(IdleTask)
}

#[test]
fn test_create_registered_class() {
    let factory = ComponentFactory::new();
    factory.register_class("Idle", idle).unwrap();

    let component = factory.create("Idle", "worker", &Value::Null).unwrap();
    assert_eq!(component.name(), "worker");
    assert_eq!(component.class(), "Idle");
}

#[test]
fn test_unknown_class() {
    let factory = ComponentFactory::new();
    let err = factory.create("Nope", "x", &Value::Null).unwrap_err();
    assert_eq!(err, ComponentError::ClassNotFound("Nope".into()));
}

#[test]
fn test_duplicate_class() {
    let factory = ComponentFactory::new();
    factory.register_class("Idle", idle).unwrap();
    assert!(factory.register_class("Idle", idle).is_err());
}

#[test]
fn test_constructor_sees_arguments() {
    let factory = ComponentFactory::new();
    factory
        .register_class("Ticker", |builder, args| {
            let period = args["period_ms"].as_u64().unwrap_or(10);
            builder.periodic(Duration::from_millis(period)).build(IdleTask)
        })
        .unwrap();

    let component = factory
        .create("Ticker", "tick", &json!({ "period_ms": 25 }))
        .unwrap();
    assert_eq!(
        component.kind(),
        crate::task::ExecutionKind::Periodic(Duration::from_millis(25))
    );
}

#[test]
fn test_library_classes_appear_after_load() {
    let factory = ComponentFactory::new();
    factory.register_library(
        ClassLibrary::new("devices")
            .with_class("Sensor", idle)
            .with_class("Motor", idle),
    );
    assert!(!factory.has_class("Sensor"));
    assert_eq!(factory.library_names(), vec!["devices"]);

    let classes = factory.load_library("devices").unwrap();
    assert_eq!(classes, vec!["Sensor", "Motor"]);
    assert_eq!(factory.class_names(), vec!["Motor", "Sensor"]);

    // second load is harmless
    assert!(factory.load_library("devices").is_ok());
}

#[test]
fn test_unknown_library() {
    let factory = ComponentFactory::new();
    assert_eq!(
        factory.load_library("missing").unwrap_err(),
        ComponentError::LibraryNotFound("missing".into())
    );
}
