//! System functions and their scheduling metadata.

use crate::command::Commands;
use crate::event::Events;
use crate::state::States;
use crate::world::World;

/// Execution context handed to every system.
///
/// Direct world access is immediate; structural mutations that should wait
/// for the stage boundary go through `commands`.
pub struct SystemCtx<'a> {
    pub world: &'a mut World,
    pub commands: &'a mut Commands,
    pub events: &'a mut Events,
    pub states: &'a mut States,
}

/// Boxed system function.
pub type SystemFn = Box<dyn FnMut(&mut SystemCtx) + Send>;

/// Predicate gating a system; pure read-only over world and states.
pub type RunCondition = Box<dyn Fn(&World, &States) -> bool + Send>;

/// A system plus everything the scheduler needs to place it.
pub struct SystemDesc {
    pub(crate) func: SystemFn,
    pub(crate) label: Option<String>,
    /// Labels this system must run after.
    pub(crate) after: Vec<String>,
    /// Labels this system must run before.
    pub(crate) before: Vec<String>,
    pub(crate) run_conditions: Vec<RunCondition>,
    /// Threading hint; recorded for a future parallel executor, unused by
    /// the cooperative one.
    pub(crate) single_threaded: bool,
}

impl SystemDesc {
    pub fn new<F>(func: F) -> Self
    where
        F: FnMut(&mut SystemCtx) + Send + 'static,
    {
        Self {
            func: Box::new(func),
            label: None,
            after: Vec::new(),
            before: Vec::new(),
            run_conditions: Vec::new(),
            single_threaded: false,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_single_threaded(&self) -> bool {
        self.single_threaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc_defaults() {
        let desc = SystemDesc::new(|_ctx| {});
        assert_eq!(desc.label(), None);
        assert!(desc.after.is_empty());
        assert!(desc.before.is_empty());
        assert!(!desc.is_single_threaded());
    }
}
