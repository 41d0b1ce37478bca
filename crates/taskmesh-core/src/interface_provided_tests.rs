use super::*;
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use std::thread;

fn counting_interface(capacity: usize) -> (InterfaceProvided, Arc<AtomicUsize>) {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, capacity);
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    iface
        .add_command_void("Increment", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    (iface, count)
}

#[test]
fn test_unknown_command_is_invalid() {
    let (iface, _) = counting_interface(2);
    let client = iface.attach();
    let reply = iface.execute(client, "Missing", Value::Null);
    assert_eq!(reply.result, ExecutionResult::InvalidCommand);
}

#[test]
fn test_void_command_is_queued_until_drained() {
    let (iface, count) = counting_interface(4);
    let client = iface.attach();

    assert!(iface.execute(client, "Increment", Value::Null).is_ok());
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(iface.mailbox_len(), 1);

    assert_eq!(iface.process_mailbox(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_two_slot_mailbox_reports_full() {
    let (iface, count) = counting_interface(2);
    let client = iface.attach();

    assert!(iface.execute(client, "Increment", Value::Null).is_ok());
    assert!(iface.execute(client, "Increment", Value::Null).is_ok());
    let third = iface.execute(client, "Increment", Value::Null);
    assert_eq!(third.result, ExecutionResult::MailboxFull);

    assert_eq!(iface.process_mailbox(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(iface.execute(client, "Increment", Value::Null).is_ok());
}

#[test]
fn test_write_commands_drain_in_order() {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 8);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    iface
        .add_command_write("Push", move |v| {
            sink.lock().push(v);
            Ok(())
        })
        .unwrap();
    let client = iface.attach();
    for i in 0..5 {
        iface.execute(client, "Push", json!(i));
    }
    iface.process_mailbox();
    assert_eq!(*seen.lock(), vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
}

#[test]
fn test_failing_command_does_not_disturb_fifo() {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 8);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    iface
        .add_command_write("Push", move |v| {
            if v == json!(1) {
                panic!("bad entry");
            }
            sink.lock().push(v);
            Ok(())
        })
        .unwrap();
    let client = iface.attach();
    for i in 0..3 {
        iface.execute(client, "Push", json!(i));
    }
    assert_eq!(iface.process_mailbox(), 3);
    assert_eq!(*seen.lock(), vec![json!(0), json!(2)]);
}

#[test]
fn test_read_command_runs_directly() {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 2);
    iface.add_command_read("Get", || Ok(json!("value"))).unwrap();
    let client = iface.attach();
    assert_eq!(iface.execute(client, "Get", Value::Null), CommandReply::ok(json!("value")));
    assert_eq!(iface.mailbox_len(), 0);
}

#[test]
fn test_not_queued_interface_runs_directly() {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::NotQueued, 0);
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    iface
        .add_command_void("Increment", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let client = iface.attach();
    assert!(iface.execute(client, "Increment", Value::Null).is_ok());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(iface.mailbox_capacity(), 0);
}

#[test]
fn test_queued_read_times_out_without_drainer() {
    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 2);
    iface
        .add_command("Slow", CommandKind::Read, Arc::new(|_| Ok(json!(1))), true)
        .unwrap();
    iface.set_command_timeout(Duration::from_millis(20));
    let client = iface.attach();
    let reply = iface.execute(client, "Slow", Value::Null);
    assert_eq!(reply.result, ExecutionResult::Timeout);
}

#[test]
fn test_queued_read_answered_by_owner_thread() {
    let iface = Arc::new(InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 2));
    iface
        .add_command(
            "Double",
            CommandKind::QualifiedRead,
            Arc::new(|v| {
                let n: i64 = serde_json::from_value(v)?;
                Ok(json!(n * 2))
            }),
            true,
        )
        .unwrap();

    let owner = {
        let iface = iface.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                if iface.process_mailbox() > 0 {
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let client = iface.attach();
    let reply = iface.execute(client, "Double", json!(21));
    assert_eq!(reply, CommandReply::ok(json!(42)));
    owner.join().unwrap();
}

#[test]
fn test_post_queued_hook_runs_after_enqueue() {
    let (iface, _) = counting_interface(2);
    let hooks = Arc::new(AtomicUsize::new(0));
    let counter = hooks.clone();
    iface.set_post_queued(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let client = iface.attach();
    iface.execute(client, "Increment", Value::Null);
    iface.execute(client, "Increment", Value::Null);
    iface.execute(client, "Increment", Value::Null);
    assert_eq!(hooks.load(Ordering::SeqCst), 2);
}

#[test]
fn test_detach_purges_pending_commands_of_client() {
    let (iface, count) = counting_interface(8);
    let first = iface.attach();
    let second = iface.attach();
    assert_eq!(iface.client_count(), 2);

    iface.execute(first, "Increment", Value::Null);
    iface.execute(second, "Increment", Value::Null);
    iface.execute(first, "Increment", Value::Null);

    iface.detach(first);
    assert_eq!(iface.client_count(), 1);
    assert_eq!(iface.process_mailbox(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_duplicate_command_rejected() {
    let (iface, _) = counting_interface(2);
    let result = iface.add_command_void("Increment", || Ok(()));
    assert!(matches!(result, Err(ComponentError::Configuration(_))));
}

#[test]
fn test_raise_unknown_event() {
    let (iface, _) = counting_interface(2);
    assert_eq!(iface.raise_event("Nope", Value::Null), ExecutionResult::InvalidCommand);
}

#[test]
fn test_description_lists_commands_and_events() {
    let (iface, _) = counting_interface(2);
    iface.add_event_write("Changed").unwrap();
    let description = iface.description();
    assert_eq!(description.name, "Prov");
    assert_eq!(description.command("Increment").unwrap().kind, CommandKind::Void);
    assert!(description.has_event("Changed"));
}

#[test]
fn test_read_state_command() {
    let table = Arc::new(StateTable::new("B", 4));
    table.add_slot("position", json!(0.0)).unwrap();
    table.write("position", json!(1.5)).unwrap();
    table.advance();

    let iface = InterfaceProvided::new("B", "Prov", QueuingPolicy::Queued, 2);
    iface.add_command_read_state("GetPosition", table.clone(), "position").unwrap();
    assert!(iface.add_command_read_state("GetVelocity", table, "velocity").is_err());

    let client = iface.attach();
    assert_eq!(
        iface.execute(client, "GetPosition", Value::Null),
        CommandReply::ok(json!(1.5))
    );
}
