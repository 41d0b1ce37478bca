//! Components: named units of execution with a lifecycle state machine.
//!
//! A component owns provided and required interfaces, a state table and a
//! [`Task`]. Threaded components run the task on a thread of their own
//! unless their `ExecIn` required interface is bound to another
//! component's `ExecOut`, in which case they borrow that component's turns.

use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use taskmesh_protocols::{
    ComponentDescription, ComponentState, ExecutionResult, InterfaceNames, QueuingPolicy,
    Requiredness,
};
use tracing::{debug, error, info, warn};

use crate::command::panic_message;
use crate::error::{CommandError, ComponentError, ComponentResult};
use crate::interface_provided::{Hook, InterfaceProvided};
use crate::interface_required::InterfaceRequired;
use crate::state_table::StateTable;
use crate::task::{ExecutionKind, Task};

/// Required interface through which a component receives execution turns.
pub const EXEC_IN: &str = "ExecIn";
/// Provided interface through which a component donates its turns.
pub const EXEC_OUT: &str = "ExecOut";
/// Management interface every component provides.
pub const INTERFACE_INTERNAL: &str = "InterfaceInternal";

pub const RUN_EVENT: &str = "RunEvent";
pub const CHANGE_STATE_EVENT: &str = "ChangeStateEvent";

pub const DEFAULT_MAILBOX_SIZE: usize = 64;
pub const DEFAULT_STATE_HISTORY: usize = 256;

/// Poll interval of a threaded component that is not ACTIVE.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Callback invoked after every state change with the component name and
/// the new state.
pub type StateListener = Arc<dyn Fn(&str, ComponentState) + Send + Sync>;

/// Binary wake-up flag for a component thread.
struct Wakeup {
    raised: Mutex<bool>,
    signal: Condvar,
}

impl Wakeup {
    fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn raise(&self) {
        *self.raised.lock() = true;
        self.signal.notify_one();
    }

    /// Wait until raised or until `timeout` elapses, then clear the flag.
    fn wait(&self, timeout: Option<Duration>) {
        let mut raised = self.raised.lock();
        if !*raised {
            match timeout {
                Some(timeout) => {
                    self.signal.wait_for(&mut raised, timeout);
                }
                None => self.signal.wait(&mut raised),
            }
        }
        *raised = false;
    }
}

/// Builder for [`Component`].
pub struct ComponentBuilder {
    name: String,
    class: String,
    kind: ExecutionKind,
    mailbox_size: usize,
    history: usize,
}

impl ComponentBuilder {
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn kind(mut self, kind: ExecutionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn periodic(self, period: Duration) -> Self {
        self.kind(ExecutionKind::Periodic(period))
    }

    pub fn continuous(self) -> Self {
        self.kind(ExecutionKind::Continuous)
    }

    pub fn from_signal(self) -> Self {
        self.kind(ExecutionKind::FromSignal)
    }

    /// Default capacity of the component's mailboxes.
    pub fn mailbox_size(mut self, size: usize) -> Self {
        self.mailbox_size = size.max(1);
        self
    }

    /// Number of committed rows the state table keeps.
    pub fn state_history(mut self, history: usize) -> Self {
        self.history = history.max(1);
        self
    }

    pub fn build(self, task: impl Task) -> ComponentResult<Arc<Component>> {
        let component = Arc::new_cyclic(|this| Component {
            state_table: Arc::new(StateTable::new(self.name.clone(), self.history)),
            name: self.name,
            class: self.class,
            kind: self.kind,
            state: Mutex::new(ComponentState::Constructed),
            state_changed: Condvar::new(),
            task: Mutex::new(Box::new(task)),
            provided: RwLock::new(BTreeMap::new()),
            required: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            thread: Mutex::new(None),
            executor: Mutex::new(None),
            wakeup: Wakeup::new(),
            run_event_called: AtomicBool::new(false),
            cleaned_up: AtomicBool::new(false),
            mailbox_size: self.mailbox_size,
            this: this.clone(),
        });
        component.install_internal_interface()?;
        if component.kind.is_threaded() {
            component.install_execution_interfaces()?;
        }
        Ok(component)
    }
}

/// A unit of execution with interfaces and a lifecycle.
pub struct Component {
    name: String,
    class: String,
    kind: ExecutionKind,
    state: Mutex<ComponentState>,
    state_changed: Condvar,
    task: Mutex<Box<dyn Task>>,
    provided: RwLock<BTreeMap<String, Arc<InterfaceProvided>>>,
    required: RwLock<BTreeMap<String, Arc<InterfaceRequired>>>,
    state_table: Arc<StateTable>,
    listeners: RwLock<Vec<StateListener>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Thread currently executing the task: the own thread, or the donor
    /// thread once the first `RunEvent` arrived.
    executor: Mutex<Option<ThreadId>>,
    wakeup: Wakeup,
    run_event_called: AtomicBool,
    cleaned_up: AtomicBool,
    mailbox_size: usize,
    this: Weak<Component>,
}

impl Component {
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        let name = name.into();
        ComponentBuilder {
            class: name.clone(),
            name,
            kind: ExecutionKind::Passive,
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            history: DEFAULT_STATE_HISTORY,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn kind(&self) -> ExecutionKind {
        self.kind
    }

    pub fn state(&self) -> ComponentState {
        *self.state.lock()
    }

    pub fn state_table(&self) -> Arc<StateTable> {
        self.state_table.clone()
    }

    pub fn mailbox_size(&self) -> usize {
        self.mailbox_size
    }

    /// Register a callback fired after every state change.
    pub fn add_state_listener(&self, listener: StateListener) {
        self.listeners.write().push(listener);
    }

    // ---- interfaces ----

    pub fn add_interface_provided(
        &self,
        name: &str,
        policy: QueuingPolicy,
    ) -> ComponentResult<Arc<InterfaceProvided>> {
        self.add_interface_provided_with_capacity(name, policy, self.mailbox_size)
    }

    /// Add a provided interface. Passive components have no thread to drain
    /// a mailbox, so their interfaces are never queued.
    pub fn add_interface_provided_with_capacity(
        &self,
        name: &str,
        policy: QueuingPolicy,
        capacity: usize,
    ) -> ComponentResult<Arc<InterfaceProvided>> {
        let policy = if self.kind.is_threaded() {
            policy
        } else {
            if policy == QueuingPolicy::Queued {
                debug!("Passive component {} ignores queuing for {}", self.name, name);
            }
            QueuingPolicy::NotQueued
        };
        let interface = InterfaceProvided::new(&self.name, name, policy, capacity);
        self.insert_provided(interface)
    }

    fn insert_provided(&self, interface: InterfaceProvided) -> ComponentResult<Arc<InterfaceProvided>> {
        let mut provided = self.provided.write();
        if provided.contains_key(interface.name()) {
            return Err(ComponentError::InterfaceExists(format!(
                "{}:{}",
                self.name,
                interface.name()
            )));
        }
        let interface = Arc::new(interface);
        interface.set_post_queued(self.queued_hook(interface.is_management()));
        provided.insert(interface.name().to_string(), interface.clone());
        Ok(interface)
    }

    pub fn add_interface_required(
        &self,
        name: &str,
        requiredness: Requiredness,
    ) -> ComponentResult<Arc<InterfaceRequired>> {
        let mut required = self.required.write();
        if required.contains_key(name) {
            return Err(ComponentError::InterfaceExists(format!("{}:{}", self.name, name)));
        }
        let interface = InterfaceRequired::new(&self.name, name, requiredness, self.mailbox_size);
        interface.set_post_queued(self.queued_hook(false));
        required.insert(name.to_string(), interface.clone());
        Ok(interface)
    }

    pub fn interface_provided(&self, name: &str) -> Option<Arc<InterfaceProvided>> {
        self.provided.read().get(name).cloned()
    }

    pub fn interface_required(&self, name: &str) -> Option<Arc<InterfaceRequired>> {
        self.required.read().get(name).cloned()
    }

    pub fn interfaces_provided(&self) -> Vec<Arc<InterfaceProvided>> {
        self.provided.read().values().cloned().collect()
    }

    pub fn interfaces_required(&self) -> Vec<Arc<InterfaceRequired>> {
        self.required.read().values().cloned().collect()
    }

    pub fn interface_names(&self) -> InterfaceNames {
        InterfaceNames {
            provided: self.provided.read().keys().cloned().collect(),
            required: self.required.read().keys().cloned().collect(),
        }
    }

    pub fn description(&self, process: &str) -> ComponentDescription {
        ComponentDescription {
            process: process.to_string(),
            name: self.name.clone(),
            class: self.class.clone(),
            state: self.state(),
            interfaces: self.interface_names(),
        }
    }

    /// Whether execution turns come from another component's `ExecOut`.
    pub fn is_exec_driven(&self) -> bool {
        self.interface_required(EXEC_IN)
            .is_some_and(|exec_in| exec_in.is_connected())
    }

    fn install_internal_interface(&self) -> ComponentResult<()> {
        let interface = InterfaceProvided::new(
            &self.name,
            INTERFACE_INTERNAL,
            QueuingPolicy::Queued,
            self.mailbox_size,
        )
        .into_management();

        let this = self.this.clone();
        interface.add_command_void("ComponentStart", move || {
            with_component(&this, |c| c.start())
        })?;
        let this = self.this.clone();
        interface.add_command_void("ComponentStop", move || {
            with_component(&this, |c| c.suspend())
        })?;
        let this = self.this.clone();
        interface.add_command_void("ComponentResume", move || {
            with_component(&this, |c| c.start())
        })?;
        let this = self.this.clone();
        interface.add_command_read("ComponentGetState", move || {
            let component = this
                .upgrade()
                .ok_or_else(|| CommandError::failed("component dropped"))?;
            Ok(Value::String(component.state().as_str().to_string()))
        })?;

        self.insert_provided(interface)?;
        Ok(())
    }

    fn install_execution_interfaces(&self) -> ComponentResult<()> {
        let exec_out = self.add_interface_provided(EXEC_OUT, QueuingPolicy::NotQueued)?;
        exec_out.add_event_void(RUN_EVENT)?;
        exec_out.add_event_write(CHANGE_STATE_EVENT)?;

        let exec_in = self.add_interface_required(EXEC_IN, Requiredness::Optional)?;
        let this = self.this.clone();
        exec_in.add_event_handler_void(RUN_EVENT, false, move || {
            if let Some(component) = this.upgrade() {
                component.run_event_handler();
            }
        })?;
        let this = self.this.clone();
        exec_in.add_event_handler_write(CHANGE_STATE_EVENT, false, move |payload| {
            let Some(component) = this.upgrade() else {
                return;
            };
            match serde_json::from_value::<ComponentState>(payload) {
                Ok(upstream) => component.change_state_event_handler(upstream),
                Err(e) => warn!("Component {} got malformed state change: {}", component.name, e),
            }
        })?;
        Ok(())
    }

    // ---- lifecycle ----

    /// CONSTRUCTED -> INITIALIZING, then run startup on the right thread.
    ///
    /// Passive components start up synchronously. Components driven through
    /// `ExecIn` start up on the first `RunEvent`. Other threaded components
    /// spawn their thread here.
    pub fn create(&self) -> ComponentResult<()> {
        if let Err(e) = self.check_required_interfaces() {
            error!("Cannot create component {}: {}", self.name, e);
            return Err(e);
        }
        self.transition(ComponentState::Initializing, &[ComponentState::Constructed])?;

        if self.is_exec_driven() {
            info!("Component {} waits for its first RunEvent", self.name);
            return Ok(());
        }
        if !self.kind.is_threaded() {
            return if self.startup_internal() {
                Ok(())
            } else {
                Err(ComponentError::task(format!("startup of {} failed", self.name)))
            };
        }

        let this = self
            .this
            .upgrade()
            .ok_or_else(|| ComponentError::NotFound(self.name.clone()))?;
        let mut slot = self.thread.lock();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || this.thread_main())
            .map_err(|e| ComponentError::task(format!("cannot spawn thread: {}", e)))?;
        *slot = Some(handle);
        Ok(())
    }

    /// READY -> ACTIVE. No-op when already ACTIVE.
    pub fn start(&self) -> ComponentResult<()> {
        match self.transition(ComponentState::Active, &[ComponentState::Ready]) {
            Ok(_) => {
                self.wakeup.raise();
                Ok(())
            }
            Err(ComponentError::InvalidTransition { from: ComponentState::Active, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// ACTIVE -> READY. No-op when already READY.
    pub fn suspend(&self) -> ComponentResult<()> {
        match self.transition(ComponentState::Ready, &[ComponentState::Active]) {
            Ok(_) => Ok(()),
            Err(ComponentError::InvalidTransition { from: ComponentState::Ready, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Request termination. Idempotent.
    ///
    /// With an executing thread the component moves to FINISHING and the
    /// thread finishes it. Otherwise cleanup runs here and the component
    /// goes straight to FINISHED.
    pub fn kill(&self) {
        match self.state() {
            ComponentState::Finished => {
                warn!("Component {} already finished", self.name);
                return;
            }
            ComponentState::Finishing => return,
            _ => {}
        }
        if self.has_executor() {
            let _ = self.transition(
                ComponentState::Finishing,
                &[
                    ComponentState::Constructed,
                    ComponentState::Initializing,
                    ComponentState::Ready,
                    ComponentState::Active,
                ],
            );
            self.wakeup.raise();
        } else {
            self.cleanup_internal();
        }
    }

    /// Block until the state is at least `target` or `timeout` elapses.
    pub fn wait_for_state(&self, target: ComponentState, timeout: Duration) -> bool {
        if self.is_executor_thread() {
            let state = self.state();
            if state < target {
                warn!(
                    "Component {} cannot wait for {} on its own thread",
                    self.name, target
                );
            }
            return state >= target;
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state < target {
            if self.state_changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let reached = *state >= target;
        if !reached {
            debug!(
                "Component {} did not reach {} within {:?} (now {})",
                self.name, target, timeout, *state
            );
        }
        reached
    }

    /// Wait for FINISHED and join the component's own thread.
    pub fn wait_to_terminate(&self, timeout: Duration) -> bool {
        if !self.wait_for_state(ComponentState::Finished, timeout) {
            return false;
        }
        if !self.is_executor_thread() {
            if let Some(handle) = self.thread.lock().take() {
                if handle.join().is_err() {
                    warn!("Thread of component {} panicked", self.name);
                }
            }
        }
        true
    }

    /// Apply a configuration string through the task.
    pub fn configure(&self, config: &str) -> ComponentResult<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(ComponentError::Configuration(format!(
                "{} is {}",
                self.name, state
            )));
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| self.task.lock().configure(self, config)));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(ComponentError::Configuration(panic_message(payload.as_ref()))),
        }
    }

    /// Raise `RunEvent` on `ExecOut`, at most once per execution turn.
    pub fn run_event(&self) -> ExecutionResult {
        self.raise_run_event(true)
    }

    // ---- dispatch ----

    /// Drain every provided command mailbox.
    pub fn process_queued_commands(&self) -> usize {
        self.interfaces_provided()
            .iter()
            .map(|interface| interface.process_mailbox())
            .sum()
    }

    /// Drain every required interface's event mailbox.
    pub fn process_queued_events(&self) -> usize {
        self.interfaces_required()
            .iter()
            .map(|interface| interface.process_events())
            .sum()
    }

    /// Drain only management mailboxes.
    pub fn process_manager_commands(&self) -> usize {
        self.interfaces_provided()
            .iter()
            .filter(|interface| interface.is_management())
            .map(|interface| interface.process_mailbox())
            .sum()
    }

    fn queued_hook(&self, management: bool) -> Hook {
        let this = self.this.clone();
        Arc::new(move || {
            if let Some(component) = this.upgrade() {
                component.on_queued(management);
            }
        })
    }

    fn on_queued(&self, management: bool) {
        if self.thread.lock().is_some() {
            self.wakeup.raise();
            return;
        }
        if management {
            // no thread of our own drains this mailbox
            let drain_here =
                !self.kind.is_threaded() || *self.state.lock() != ComponentState::Active;
            if drain_here {
                self.process_manager_commands();
            }
        }
    }

    fn thread_main(self: Arc<Self>) {
        *self.executor.lock() = Some(thread::current().id());
        info!("Component {} thread started", self.name);
        self.startup_internal();
        self.run_loop();
        self.cleanup_internal();
        info!("Component {} thread exiting", self.name);
    }

    fn run_loop(&self) {
        let mut deadline = Instant::now();
        loop {
            let state = self.state();
            if state.is_terminal() {
                break;
            }
            if state != ComponentState::Active {
                self.process_manager_commands();
                self.wakeup.wait(Some(IDLE_POLL));
                deadline = Instant::now();
                continue;
            }
            match self.kind {
                ExecutionKind::Periodic(period) => {
                    let now = Instant::now();
                    if now < deadline {
                        self.wakeup.wait(Some(deadline - now));
                        continue;
                    }
                    self.run_once();
                    deadline += period;
                    let now = Instant::now();
                    if deadline < now {
                        // overrun, do not try to catch up
                        deadline = now + period;
                    }
                }
                ExecutionKind::Continuous => {
                    self.run_once();
                    thread::yield_now();
                }
                ExecutionKind::FromSignal => {
                    self.run_once();
                    self.wakeup.wait(None);
                }
                ExecutionKind::Passive => break,
            }
        }
    }

    /// One execution turn: queued commands, queued events, `run`, state
    /// table commit and the `RunEvent` to driven components.
    fn run_once(&self) {
        self.run_event_called.store(false, Ordering::Release);
        self.process_queued_commands();
        self.process_queued_events();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.task.lock().run(self)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Run of component {} failed: {}", self.name, e),
            Err(payload) => error!(
                "Run of component {} panicked: {}",
                self.name,
                panic_message(payload.as_ref())
            ),
        }

        self.state_table.advance_if_automatic();
        self.raise_run_event(true);
    }

    fn startup_internal(&self) -> bool {
        if let Err(e) = self.check_required_interfaces() {
            error!("Startup of component {} aborted: {}", self.name, e);
            return false;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| self.task.lock().startup(self)));
        let ok = match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Startup of component {} failed: {}", self.name, e);
                false
            }
            Err(payload) => {
                error!(
                    "Startup of component {} panicked: {}",
                    self.name,
                    panic_message(payload.as_ref())
                );
                false
            }
        };
        self.state_table.advance_if_automatic();
        if ok {
            let _ = self.transition(ComponentState::Ready, &[ComponentState::Initializing]);
        }
        // driven components start up on this turn
        self.raise_run_event(false);
        ok
    }

    fn cleanup_internal(&self) {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            return;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| self.task.lock().cleanup(self)));
        if let Err(payload) = outcome {
            error!(
                "Cleanup of component {} panicked: {}",
                self.name,
                panic_message(payload.as_ref())
            );
        }
        self.state_table.cleanup();
        for interface in self.interfaces_provided() {
            interface.cleanup();
        }
        let _ = self.transition(
            ComponentState::Finished,
            &[
                ComponentState::Constructed,
                ComponentState::Initializing,
                ComponentState::Ready,
                ComponentState::Active,
                ComponentState::Finishing,
            ],
        );
        info!("Component {} finished", self.name);
    }

    fn raise_run_event(&self, once_per_turn: bool) -> ExecutionResult {
        let already = self.run_event_called.swap(true, Ordering::AcqRel);
        if once_per_turn && already {
            return ExecutionResult::CommandDisabled;
        }
        match self.interface_provided(EXEC_OUT) {
            Some(exec_out) => exec_out.raise_event(RUN_EVENT, Value::Null),
            None => ExecutionResult::InvalidCommand,
        }
    }

    /// Execution turn donated by the component bound to `ExecIn`.
    fn run_event_handler(&self) {
        self.run_event_called.store(false, Ordering::Release);
        let state = self.state();
        let bound = self.executor.lock().is_some();
        match state {
            ComponentState::Initializing if !bound => {
                *self.executor.lock() = Some(thread::current().id());
                debug!("Component {} starts on a donated thread", self.name);
                self.startup_internal();
            }
            ComponentState::Active => {
                self.run_once();
                return;
            }
            ComponentState::Finishing => self.cleanup_internal(),
            ComponentState::Constructed
            | ComponentState::Initializing
            | ComponentState::Ready => {
                self.process_manager_commands();
            }
            ComponentState::Finished => {}
        }
        self.raise_run_event(true);
    }

    /// State change of the component bound to `ExecIn`, mirrored here and
    /// forwarded downstream.
    fn change_state_event_handler(&self, upstream: ComponentState) {
        let state = self.state();
        match upstream {
            ComponentState::Initializing if state == ComponentState::Constructed => {
                if let Err(e) = self.create() {
                    warn!("Component {} could not follow create: {}", self.name, e);
                }
            }
            ComponentState::Ready if state == ComponentState::Active => {
                if let Err(e) = self.suspend() {
                    warn!("Component {} could not follow suspend: {}", self.name, e);
                }
            }
            ComponentState::Finishing | ComponentState::Finished => {
                self.kill();
                // the donor delivers no more turns once finished
                if upstream == ComponentState::Finished
                    && self.state() == ComponentState::Finishing
                {
                    self.cleanup_internal();
                }
            }
            _ => {}
        }
        if let Some(exec_out) = self.interface_provided(EXEC_OUT) {
            exec_out.raise_event(CHANGE_STATE_EVENT, serde_json::json!(upstream));
        }
    }

    // ---- state machine ----

    /// Move to `to` if the current state is in `allowed`, then notify
    /// waiters, listeners and driven components.
    fn transition(
        &self,
        to: ComponentState,
        allowed: &[ComponentState],
    ) -> ComponentResult<ComponentState> {
        let from = {
            let mut state = self.state.lock();
            let from = *state;
            if !allowed.contains(&from) {
                return Err(ComponentError::InvalidTransition {
                    component: self.name.clone(),
                    from,
                    to,
                });
            }
            *state = to;
            from
        };
        self.state_changed.notify_all();
        if from != to {
            debug!("Component {}: {} -> {}", self.name, from, to);
            self.fan_out(to);
        }
        Ok(from)
    }

    fn fan_out(&self, state: ComponentState) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(&self.name, state);
        }
        if !self.is_exec_driven() {
            if let Some(exec_out) = self.interface_provided(EXEC_OUT) {
                exec_out.raise_event(CHANGE_STATE_EVENT, serde_json::json!(state));
            }
        }
    }

    fn check_required_interfaces(&self) -> ComponentResult<()> {
        for interface in self.interfaces_required() {
            if interface.is_connected() {
                continue;
            }
            match interface.requiredness() {
                Requiredness::Required => {
                    return Err(ComponentError::RequiredNotConnected {
                        component: self.name.clone(),
                        interface: interface.name().to_string(),
                    });
                }
                Requiredness::Optional => {
                    warn!(
                        "Optional interface {}:{} is not connected",
                        self.name,
                        interface.name()
                    );
                }
            }
        }
        Ok(())
    }

    fn has_executor(&self) -> bool {
        self.thread.lock().is_some() || self.executor.lock().is_some()
    }

    fn is_executor_thread(&self) -> bool {
        *self.executor.lock() == Some(thread::current().id())
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

fn with_component<F>(this: &Weak<Component>, f: F) -> Result<(), CommandError>
where
    F: FnOnce(&Component) -> ComponentResult<()>,
{
    let component = this
        .upgrade()
        .ok_or_else(|| CommandError::failed("component dropped"))?;
    f(&component).map_err(|e| CommandError::failed(e.to_string()))
}

#[cfg(test)]
#[path = "component_tests.rs"]
mod tests;
