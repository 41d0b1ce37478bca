//! Component lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a component.
///
/// States are totally ordered so that "at least READY" is a single
/// comparison. `Finishing` and `Finished` are terminal and compare greater
/// than every running state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ComponentState {
    #[default]
    Constructed = 0,
    Initializing = 1,
    Ready = 2,
    Active = 3,
    Finishing = 4,
    Finished = 5,
}

impl ComponentState {
    /// All states in lifecycle order.
    pub const ALL: [ComponentState; 6] = [
        ComponentState::Constructed,
        ComponentState::Initializing,
        ComponentState::Ready,
        ComponentState::Active,
        ComponentState::Finishing,
        ComponentState::Finished,
    ];

    /// Whether the component is shutting down or gone.
    pub fn is_terminal(self) -> bool {
        self >= ComponentState::Finishing
    }

    /// Whether `Run` is being invoked.
    pub fn is_running(self) -> bool {
        self == ComponentState::Active
    }

    /// Upper-case name used on the wire and in the shell.
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentState::Constructed => "CONSTRUCTED",
            ComponentState::Initializing => "INITIALIZING",
            ComponentState::Ready => "READY",
            ComponentState::Active => "ACTIVE",
            ComponentState::Finishing => "FINISHING",
            ComponentState::Finished => "FINISHED",
        }
    }
}

impl From<u8> for ComponentState {
    fn from(value: u8) -> Self {
        match value {
            0 => ComponentState::Constructed,
            1 => ComponentState::Initializing,
            2 => ComponentState::Ready,
            3 => ComponentState::Active,
            4 => ComponentState::Finishing,
            _ => ComponentState::Finished,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown component state: {}", s))
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
