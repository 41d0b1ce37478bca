//! Timestamped ring buffer of named data slots.
//!
//! Writers update the current row; [`StateTable::advance`] commits it with
//! a tick and timestamp. Readers only see committed rows, so a reader never
//! observes a half-written iteration.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ComponentError, ComponentResult};

/// One committed row.
#[derive(Debug, Clone, Serialize)]
pub struct StateRow {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, Value>,
}

struct Inner {
    tick: u64,
    current: BTreeMap<String, Value>,
    rows: VecDeque<StateRow>,
}

pub struct StateTable {
    name: String,
    history: usize,
    automatic: AtomicBool,
    inner: RwLock<Inner>,
}

impl StateTable {
    /// Create a table keeping the last `history` rows.
    pub fn new(name: impl Into<String>, history: usize) -> Self {
        let history = history.max(1);
        Self {
            name: name.into(),
            history,
            automatic: AtomicBool::new(true),
            inner: RwLock::new(Inner {
                tick: 0,
                current: BTreeMap::new(),
                rows: VecDeque::with_capacity(history),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> usize {
        self.history
    }

    /// Whether the owning component advances the table after every run.
    pub fn is_automatic(&self) -> bool {
        self.automatic.load(Ordering::Acquire)
    }

    pub fn set_automatic(&self, automatic: bool) {
        self.automatic.store(automatic, Ordering::Release);
    }

    /// Declare a slot with its initial value.
    pub fn add_slot(&self, slot: &str, initial: Value) -> ComponentResult<()> {
        let mut inner = self.inner.write();
        if inner.current.contains_key(slot) {
            return Err(ComponentError::Configuration(format!(
                "duplicate state table slot {}.{}",
                self.name, slot
            )));
        }
        inner.current.insert(slot.to_string(), initial);
        Ok(())
    }

    pub fn has_slot(&self, slot: &str) -> bool {
        self.inner.read().current.contains_key(slot)
    }

    pub fn slot_names(&self) -> Vec<String> {
        self.inner.read().current.keys().cloned().collect()
    }

    /// Update a slot in the current (uncommitted) row.
    pub fn write(&self, slot: &str, value: Value) -> ComponentResult<()> {
        let mut inner = self.inner.write();
        match inner.current.get_mut(slot) {
            Some(entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(ComponentError::SlotNotFound(slot.to_string())),
        }
    }

    /// Commit the current row and move to the next tick.
    pub fn advance(&self) {
        let mut inner = self.inner.write();
        let row = StateRow {
            tick: inner.tick,
            timestamp: Utc::now(),
            values: inner.current.clone(),
        };
        if inner.rows.len() == self.history {
            inner.rows.pop_front();
        }
        inner.rows.push_back(row);
        inner.tick += 1;
    }

    pub(crate) fn advance_if_automatic(&self) {
        if self.is_automatic() {
            self.advance();
        }
    }

    /// Tick of the row being written.
    pub fn tick(&self) -> u64 {
        self.inner.read().tick
    }

    /// Most recently committed value of a slot.
    pub fn read_latest(&self, slot: &str) -> Option<Value> {
        self.inner
            .read()
            .rows
            .back()
            .and_then(|row| row.values.get(slot).cloned())
    }

    /// Most recently committed row.
    pub fn latest_row(&self) -> Option<StateRow> {
        self.inner.read().rows.back().cloned()
    }

    /// Up to `count` committed values of a slot, oldest first, with their ticks.
    pub fn read_history(&self, slot: &str, count: usize) -> Vec<(u64, Value)> {
        let inner = self.inner.read();
        let skip = inner.rows.len().saturating_sub(count);
        inner
            .rows
            .iter()
            .skip(skip)
            .filter_map(|row| row.values.get(slot).map(|v| (row.tick, v.clone())))
            .collect()
    }

    /// Drop committed history. Called when the owner finishes.
    pub fn cleanup(&self) {
        self.inner.write().rows.clear();
    }
}
