//! Named state machines with queued transitions.
//!
//! `set` only queues; the transition itself is processed at the top of each
//! frame, at most one per machine. A `set` issued mid-transition lands in
//! the queued slot and processes the following frame (latest write wins).

use ahash::AHashMap;

use crate::error::{EcsError, Result};

struct StateMachine {
    current: u32,
    previous: u32,
    queued: Option<u32>,
}

/// The app's named state machines.
pub struct States {
    machines: AHashMap<String, StateMachine>,
}

impl States {
    pub fn new() -> Self {
        Self {
            machines: AHashMap::new(),
        }
    }

    /// Create (or reset) a machine at `initial`.
    pub fn add(&mut self, name: &str, initial: u32) {
        self.machines.insert(
            name.to_string(),
            StateMachine {
                current: initial,
                previous: initial,
                queued: None,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.machines.get(name).map(|machine| machine.current)
    }

    pub fn previous(&self, name: &str) -> Option<u32> {
        self.machines.get(name).map(|machine| machine.previous)
    }

    /// Queue a transition for the next frame.
    pub fn set(&mut self, name: &str, value: u32) -> Result<()> {
        let machine = self
            .machines
            .get_mut(name)
            .ok_or_else(|| EcsError::UnknownState(name.to_string()))?;
        machine.queued = Some(value);
        Ok(())
    }

    /// Drain queued transitions that actually change state, as
    /// (machine, from, to). Queued re-entries into the current state are
    /// dropped.
    pub(crate) fn take_pending(&mut self) -> Vec<(String, u32, u32)> {
        let mut pending = Vec::new();
        for (name, machine) in self.machines.iter_mut() {
            if let Some(queued) = machine.queued.take() {
                if queued != machine.current {
                    pending.push((name.clone(), machine.current, queued));
                }
            }
        }
        pending
    }

    /// Commit a transition produced by [`States::take_pending`].
    pub(crate) fn apply(&mut self, name: &str, to: u32) {
        if let Some(machine) = self.machines.get_mut(name) {
            machine.previous = machine.current;
            machine.current = to;
        }
    }
}

impl Default for States {
    fn default() -> Self {
        Self::new()
    }
}
