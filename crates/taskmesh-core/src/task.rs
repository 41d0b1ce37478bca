//! User behavior plugged into a component.

use std::time::Duration;

use crate::component::Component;
use crate::error::ComponentResult;

/// Callbacks a component invokes on its execution thread.
///
/// All callbacks run on the thread that currently executes the component
/// (its own thread, the thread of the component donating its turns, or the
/// caller of `create`/`kill` for passive components).
pub trait Task: Send + 'static {
    /// Apply a configuration string. Called before `create`.
    fn configure(&mut self, _component: &Component, _config: &str) -> ComponentResult<()> {
        Ok(())
    }

    /// One-time initialization. A failure keeps the component below READY.
    fn startup(&mut self, _component: &Component) -> ComponentResult<()> {
        Ok(())
    }

    /// One iteration of work, invoked while the component is ACTIVE.
    fn run(&mut self, _component: &Component) -> ComponentResult<()> {
        Ok(())
    }

    /// Release resources. Called exactly once, before FINISHED.
    fn cleanup(&mut self, _component: &Component) {}
}

/// A task without behavior, for components that only expose interfaces.
pub struct IdleTask;

impl Task for IdleTask {}

/// How a component obtains execution turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    /// No thread. Startup and cleanup run on the caller of `create`/`kill`.
    Passive,
    /// Own thread calling `run` once per period.
    Periodic(Duration),
    /// Own thread calling `run` back to back.
    Continuous,
    /// Own thread calling `run` whenever a command or event is queued.
    FromSignal,
}

impl ExecutionKind {
    pub fn is_threaded(self) -> bool {
        !matches!(self, ExecutionKind::Passive)
    }
}
