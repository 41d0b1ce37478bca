//! Events: generators on the provided side, sinks and receivers on the
//! required side.

use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmesh_protocols::{EventDescription, EventKind, ExecutionResult};

use crate::mailbox::ClientId;

/// Destination of events raised by a provided interface.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block on the receiving component.
    fn deliver(&self, event: &str, payload: Value) -> ExecutionResult;
}

/// A named event offered by a provided interface, fanned out to every
/// subscribed client.
pub struct EventGenerator {
    name: String,
    kind: EventKind,
    subscribers: Mutex<Vec<(ClientId, Arc<dyn EventSink>)>>,
}

impl EventGenerator {
    pub(crate) fn new(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            name: name.into(),
            kind,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn description(&self) -> EventDescription {
        EventDescription {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    pub(crate) fn subscribe(&self, client: ClientId, sink: Arc<dyn EventSink>) {
        self.subscribers.lock().push((client, sink));
    }

    pub(crate) fn unsubscribe(&self, client: ClientId) {
        self.subscribers.lock().retain(|(owner, _)| *owner != client);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Raise the event. Returns the first non-OK delivery result, if any.
    pub fn raise(&self, payload: Value) -> ExecutionResult {
        let payload = match self.kind {
            EventKind::Void => Value::Null,
            EventKind::Write => payload,
        };
        // Sinks may call back into the interface; deliver outside the lock.
        let sinks: Vec<Arc<dyn EventSink>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, sink)| sink.clone())
            .collect();

        let mut outcome = ExecutionResult::Ok;
        for sink in sinks {
            let result = sink.deliver(&self.name, payload.clone());
            if outcome.is_ok() && !result.is_ok() {
                outcome = result;
            }
        }
        outcome
    }
}

/// Lets a thread block until an event arrives.
///
/// Every delivery bumps a generation counter and wakes all waiters, so
/// several threads waiting on the same event all unblock. Capture
/// [`generation`](Self::generation) before checking a condition and pass it
/// to [`wait_since`](Self::wait_since) to avoid missing an event that
/// arrives in between.
pub struct EventReceiver {
    name: String,
    slot: Mutex<(u64, Option<Value>)>,
    signal: Condvar,
}

impl EventReceiver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Mutex::new((0, None)),
            signal: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events received so far.
    pub fn generation(&self) -> u64 {
        self.slot.lock().0
    }

    /// Payload of the most recent event.
    pub fn last_payload(&self) -> Option<Value> {
        self.slot.lock().1.clone()
    }

    pub(crate) fn notify(&self, payload: Value) {
        {
            let mut slot = self.slot.lock();
            slot.0 += 1;
            slot.1 = Some(payload);
        }
        self.signal.notify_all();
    }

    /// Block until the next event or until `timeout` elapses.
    pub fn wait_with_timeout(&self, timeout: Duration) -> Option<Value> {
        let generation = self.generation();
        self.wait_since(generation, timeout)
    }

    /// Block until an event newer than `generation` arrives or `timeout`
    /// elapses. Returns the latest payload on success.
    pub fn wait_since(&self, generation: u64, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.0 <= generation {
            if self.signal.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        if slot.0 > generation {
            slot.1.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    struct Recording(Mutex<Vec<(String, Value)>>);

    impl EventSink for Recording {
        fn deliver(&self, event: &str, payload: Value) -> ExecutionResult {
            self.0.lock().push((event.to_string(), payload));
            ExecutionResult::Ok
        }
    }

    #[test]
    fn test_raise_fans_out_to_subscribers() {
        let generator = EventGenerator::new("Changed", EventKind::Write);
        let first = Arc::new(Recording(Mutex::new(Vec::new())));
        let second = Arc::new(Recording(Mutex::new(Vec::new())));
        generator.subscribe(ClientId(1), first.clone());
        generator.subscribe(ClientId(2), second.clone());

        assert!(generator.raise(json!(5)).is_ok());
        assert_eq!(first.0.lock().len(), 1);
        assert_eq!(second.0.lock()[0], ("Changed".to_string(), json!(5)));

        generator.unsubscribe(ClientId(1));
        generator.raise(json!(6));
        assert_eq!(first.0.lock().len(), 1);
        assert_eq!(second.0.lock().len(), 2);
    }

    #[test]
    fn test_void_event_drops_payload() {
        let generator = EventGenerator::new("Tick", EventKind::Void);
        let sink = Arc::new(Recording(Mutex::new(Vec::new())));
        generator.subscribe(ClientId(1), sink.clone());
        generator.raise(json!("ignored"));
        assert!(sink.0.lock()[0].1.is_null());
    }

    #[test]
    fn test_receiver_times_out() {
        let receiver = EventReceiver::new("AddComponent");
        assert!(receiver.wait_with_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_wait_since_sees_earlier_event() {
        let receiver = EventReceiver::new("ChangeState");
        let generation = receiver.generation();
        receiver.notify(json!("READY"));
        assert_eq!(
            receiver.wait_since(generation, Duration::from_millis(1)),
            Some(json!("READY"))
        );
    }

    #[test]
    fn test_two_waiters_both_unblock() {
        let receiver = Arc::new(EventReceiver::new("AddComponent"));
        let generation = receiver.generation();
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let receiver = receiver.clone();
                thread::spawn(move || receiver.wait_since(generation, Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        receiver.notify(json!({"component": "A"}));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Some(json!({"component": "A"})));
        }
    }
}
