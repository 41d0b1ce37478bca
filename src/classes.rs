//! Built-in component classes, bundled as the `demo` library.
//!
//! - `Counter`: periodic, counts its runs and raises `Tick` every
//!   `tick_every` runs. Provided interface `Counter` with `GetValue`
//!   (read from the state table) and `Reset` (write).
//! - `Printer`: signal-driven, logs every `Tick` it receives on its
//!   optional required interface `Input` and reports the count through
//!   `Status.GetCount`.

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use taskmesh_core::{
    ClassLibrary, CommandError, Component, ComponentBuilder, ComponentError, ComponentResult, Task,
};
use taskmesh_protocols::{QueuingPolicy, Requiredness};

pub(crate) const DEMO_LIBRARY: &str = "demo";

/// The library holding every built-in class.
pub(crate) fn demo_library() -> ClassLibrary {
    ClassLibrary::new(DEMO_LIBRARY)
        .with_class("Counter", counter)
        .with_class("Printer", printer)
}

fn parse_args<T: Default + for<'de> Deserialize<'de>>(class: &str, args: &Value) -> ComponentResult<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args.clone())
        .map_err(|e| ComponentError::Configuration(format!("bad {} arguments: {}", class, e)))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CounterArgs {
    period_ms: u64,
    tick_every: i64,
}

impl Default for CounterArgs {
    fn default() -> Self {
        Self {
            period_ms: 100,
            tick_every: 10,
        }
    }
}

struct CounterTask {
    value: Arc<AtomicI64>,
    tick_every: i64,
}

impl Task for CounterTask {
    fn run(&mut self, component: &Component) -> ComponentResult<()> {
        let value = self.value.fetch_add(1, Ordering::SeqCst) + 1;
        component.state_table().write("value", json!(value))?;
        if value % self.tick_every == 0 {
            if let Some(interface) = component.interface_provided("Counter") {
                interface.raise_event("Tick", json!(value));
            }
        }
        Ok(())
    }
}

fn counter(builder: ComponentBuilder, args: &Value) -> ComponentResult<Arc<Component>> {
    let args: CounterArgs = parse_args("Counter", args)?;
    let value = Arc::new(AtomicI64::new(0));
    let component = builder
        .periodic(Duration::from_millis(args.period_ms.max(1)))
        .build(CounterTask {
            value: value.clone(),
            tick_every: args.tick_every.max(1),
        })?;

    let table = component.state_table();
    table.add_slot("value", json!(0))?;
    let interface = component.add_interface_provided("Counter", QueuingPolicy::Queued)?;
    interface.add_command_read_state("GetValue", table, "value")?;
    interface.add_command_write("Reset", move |argument| {
        let start = match argument {
            Value::Null => 0,
            other => other
                .as_i64()
                .ok_or_else(|| CommandError::InvalidInput(format!("expected an integer, got {}", other)))?,
        };
        value.store(start, Ordering::SeqCst);
        Ok(())
    })?;
    interface.add_event_write("Tick")?;
    Ok(component)
}

struct PrinterTask;

impl Task for PrinterTask {}

fn printer(builder: ComponentBuilder, _args: &Value) -> ComponentResult<Arc<Component>> {
    let component = builder.from_signal().build(PrinterTask)?;
    let name = component.name().to_string();
    let count = Arc::new(AtomicU64::new(0));

    let input = component.add_interface_required("Input", Requiredness::Optional)?;
    let seen = count.clone();
    input.add_event_handler_write("Tick", true, move |payload| {
        seen.fetch_add(1, Ordering::SeqCst);
        info!("{} received Tick {}", name, payload);
    })?;

    let status = component.add_interface_provided("Status", QueuingPolicy::NotQueued)?;
    status.add_command_read("GetCount", move || Ok(json!(count.load(Ordering::SeqCst))))?;
    Ok(component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::ComponentFactory;
    use taskmesh_protocols::ComponentState;

    fn factory() -> ComponentFactory {
        let factory = ComponentFactory::new();
        factory.register_library(demo_library());
        factory.load_library(DEMO_LIBRARY).unwrap();
        factory
    }

    #[test]
    fn test_library_provides_demo_classes() {
        assert_eq!(factory().class_names(), vec!["Counter", "Printer"]);
    }

    #[test]
    fn test_counter_counts_and_ticks() {
        let counter = factory()
            .create("Counter", "C", &json!({ "period_ms": 5, "tick_every": 2 }))
            .unwrap();
        let printer = factory().create("Printer", "P", &Value::Null).unwrap();
        let input = printer.interface_required("Input").unwrap();
        let target: Arc<dyn taskmesh_core::InterfaceTarget> =
            counter.interface_provided("Counter").unwrap();
        input.connect(target).unwrap();

        for component in [&counter, &printer] {
            component.create().unwrap();
            assert!(component.wait_for_state(ComponentState::Ready, Duration::from_secs(2)));
            component.start().unwrap();
        }

        let status = printer.interface_provided("Status").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let count = status.command("GetCount").unwrap().invoke(Value::Null).value;
            if count.as_u64().unwrap_or(0) >= 2 || std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let count = status.command("GetCount").unwrap().invoke(Value::Null).value;
        assert!(count.as_u64().unwrap() >= 2);

        let value = counter
            .interface_provided("Counter")
            .unwrap()
            .command("GetValue")
            .unwrap()
            .invoke(Value::Null)
            .value;
        assert!(value.as_i64().unwrap() >= 4);

        counter.kill();
        printer.kill();
        assert!(counter.wait_to_terminate(Duration::from_secs(2)));
        assert!(printer.wait_to_terminate(Duration::from_secs(2)));
    }

    #[test]
    fn test_counter_rejects_bad_arguments() {
        let err = factory()
            .create("Counter", "C", &json!({ "period_ms": "fast" }))
            .err()
            .unwrap();
        assert!(matches!(err, ComponentError::Configuration(_)));
    }
}
