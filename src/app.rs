//! The staged application runner.
//!
//! One `update` is a frame: queued state transitions process first, every
//! non-Startup stage runs in order, the world tick advances, and event
//! buffers swap. Within a stage, systems run in topologically sorted order;
//! each system gets a fresh command buffer that is applied (and its observer
//! triggers flushed) before the next system starts, so mutations of system
//! `i` are visible to system `j > i`.

use ahash::AHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::command::Commands;
use crate::component::ComponentId;
use crate::error::Result;
use crate::event::{Events, EventTypeId};
use crate::observer::{Trigger, TriggerKind};
use crate::schedule::{stage, Schedule};
use crate::state::States;
use crate::system::{SystemCtx, SystemDesc, SystemFn};
use crate::world::World;

/// Threading hint for system execution. Recorded for a future parallel
/// executor; the cooperative executor runs everything on the caller's
/// thread regardless.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Threading {
    #[default]
    Auto,
    Single,
    Multi,
}

/// Application: a world plus stages, events, and states.
pub struct App {
    pub world: World,
    schedule: Schedule,
    events: Events,
    states: States,
    enter_systems: AHashMap<(String, u32), Vec<SystemFn>>,
    exit_systems: AHashMap<(String, u32), Vec<SystemFn>>,
    threading: Threading,
    startup_run: bool,
}

impl App {
    pub fn new(threading: Threading) -> Self {
        Self {
            world: World::new(),
            schedule: Schedule::with_default_stages(),
            events: Events::new(),
            states: States::new(),
            enter_systems: AHashMap::new(),
            exit_systems: AHashMap::new(),
            threading,
            startup_run: false,
        }
    }

    pub fn threading(&self) -> Threading {
        self.threading
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    // ========== Stages ==========

    /// Append a custom stage at the end of the frame.
    pub fn add_stage(&mut self, name: &str) -> Result<&mut Self> {
        self.schedule.add_stage(name)?;
        Ok(self)
    }

    pub fn add_stage_before(&mut self, name: &str, anchor: &str) -> Result<&mut Self> {
        self.schedule.add_stage_before(name, anchor)?;
        Ok(self)
    }

    pub fn add_stage_after(&mut self, name: &str, anchor: &str) -> Result<&mut Self> {
        self.schedule.add_stage_after(name, anchor)?;
        Ok(self)
    }

    // ========== Systems ==========

    /// Start configuring a system; finish with [`SystemBuilder::build`].
    /// Unconfigured systems land in the Update stage.
    pub fn add_system<F>(&mut self, func: F) -> SystemBuilder<'_>
    where
        F: FnMut(&mut SystemCtx) + Send + 'static,
    {
        SystemBuilder {
            app: self,
            desc: SystemDesc::new(func),
            stage: stage::UPDATE.to_string(),
        }
    }

    // ========== Observers ==========

    /// Register a global observer on the world.
    pub fn add_observer<F>(
        &mut self,
        kind: TriggerKind,
        component: Option<ComponentId>,
        callback: F,
    ) -> &mut Self
    where
        F: FnMut(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.world.add_observer(kind, component, callback);
        self
    }

    // ========== Events ==========

    pub fn add_event_type(&mut self, name: &str, element_size: usize) -> EventTypeId {
        self.events.register(name, element_size)
    }

    pub fn send_event(&mut self, event: EventTypeId, bytes: &[u8]) -> Result<()> {
        self.events.send(event, bytes)
    }

    pub fn send_event_value<T: bytemuck::Pod>(
        &mut self,
        event: EventTypeId,
        value: &T,
    ) -> Result<()> {
        self.events.send_value(event, value)
    }

    pub fn read_events<F>(&self, event: EventTypeId, callback: F)
    where
        F: FnMut(&[u8]),
    {
        self.events.read(event, callback)
    }

    pub fn read_events_value<T: bytemuck::Pod, F>(&self, event: EventTypeId, callback: F)
    where
        F: FnMut(&T),
    {
        self.events.read_values(event, callback)
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut Events {
        &mut self.events
    }

    // ========== States ==========

    pub fn add_state(&mut self, name: &str, initial: u32) -> &mut Self {
        self.states.add(name, initial);
        self
    }

    /// Queue a state transition; it processes at the top of the next frame.
    pub fn set_state(&mut self, name: &str, value: u32) -> Result<()> {
        self.states.set(name, value)
    }

    pub fn get_state(&self, name: &str) -> Option<u32> {
        self.states.get(name)
    }

    pub fn states(&self) -> &States {
        &self.states
    }

    pub fn add_system_on_enter<F>(&mut self, state: &str, value: u32, func: F) -> &mut Self
    where
        F: FnMut(&mut SystemCtx) + Send + 'static,
    {
        self.enter_systems
            .entry((state.to_string(), value))
            .or_default()
            .push(Box::new(func));
        self
    }

    pub fn add_system_on_exit<F>(&mut self, state: &str, value: u32, func: F) -> &mut Self
    where
        F: FnMut(&mut SystemCtx) + Send + 'static,
    {
        self.exit_systems
            .entry((state.to_string(), value))
            .or_default()
            .push(Box::new(func));
        self
    }

    // ========== Resources ==========

    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) -> &mut Self {
        self.world.insert_resource(resource);
        self
    }

    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.world.resource()
    }

    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.world.resource_mut()
    }

    pub fn has_resource<R: 'static>(&self) -> bool {
        self.world.has_resource::<R>()
    }

    // ========== Execution ==========

    /// Run the Startup stage. Idempotent: later calls are no-ops.
    pub fn run_startup(&mut self) {
        if self.startup_run {
            return;
        }
        self.startup_run = true;
        if let Some(index) = self.schedule.stage_index(stage::STARTUP) {
            self.run_stage(index);
        }
    }

    /// One frame: state transitions, every non-Startup stage in order, tick
    /// advance, event buffer swap.
    pub fn update(&mut self) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("app.update", tick = self.world.tick()).entered();

        if !self.startup_run {
            self.run_startup();
        }

        self.process_state_transitions();

        for index in 0..self.schedule.stage_count() {
            if self.schedule.stage_name(index) == Some(stage::STARTUP) {
                continue;
            }
            self.run_stage(index);
        }

        self.world.update();
        self.events.swap_buffers();
    }

    /// Frame loop; returns when `should_quit` says so.
    pub fn run<F>(&mut self, mut should_quit: F)
    where
        F: FnMut(&App) -> bool,
    {
        self.run_startup();
        while !should_quit(self) {
            self.update();
        }
    }

    fn run_stage(&mut self, index: usize) {
        #[cfg(feature = "profiling")]
        let _span = info_span!(
            "app.stage",
            name = self.schedule.stage_name(index).unwrap_or("?")
        )
        .entered();

        let mut systems = std::mem::take(&mut self.schedule.stage_mut(index).systems);
        let order = crate::schedule::sorted_order(&systems);

        for &system_index in &order {
            let desc = &mut systems[system_index];
            let ready = desc
                .run_conditions
                .iter()
                .all(|condition| condition(&self.world, &self.states));
            if !ready {
                continue;
            }

            let mut commands = Commands::new();
            {
                let mut ctx = SystemCtx {
                    world: &mut self.world,
                    commands: &mut commands,
                    events: &mut self.events,
                    states: &mut self.states,
                };
                (desc.func)(&mut ctx);
            }
            commands.apply(&mut self.world, &mut self.events);
            self.world.flush_triggers();
        }

        // Restore, keeping systems that were added mid-run.
        let added = std::mem::replace(&mut self.schedule.stage_mut(index).systems, systems);
        self.schedule.stage_mut(index).systems.extend(added);
    }

    fn process_state_transitions(&mut self) {
        for (name, from, to) in self.states.take_pending() {
            self.run_transition_systems((name.clone(), from), false);
            self.states.apply(&name, to);
            self.run_transition_systems((name, to), true);
        }
    }

    fn run_transition_systems(&mut self, key: (String, u32), enter: bool) {
        let table = if enter {
            &mut self.enter_systems
        } else {
            &mut self.exit_systems
        };
        let Some(mut funcs) = table.remove(&key) else {
            return;
        };

        for func in funcs.iter_mut() {
            let mut commands = Commands::new();
            {
                let mut ctx = SystemCtx {
                    world: &mut self.world,
                    commands: &mut commands,
                    events: &mut self.events,
                    states: &mut self.states,
                };
                func(&mut ctx);
            }
            commands.apply(&mut self.world, &mut self.events);
            self.world.flush_triggers();
        }

        let table = if enter {
            &mut self.enter_systems
        } else {
            &mut self.exit_systems
        };
        if let Some(added) = table.remove(&key) {
            funcs.extend(added);
        }
        table.insert(key, funcs);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(Threading::Auto)
    }
}

/// Fluent configuration for a system being added to the app.
///
/// Call [`SystemBuilder::build`] to attach the system; a builder dropped
/// without `build` discards it.
pub struct SystemBuilder<'app> {
    app: &'app mut App,
    desc: SystemDesc,
    stage: String,
}

impl SystemBuilder<'_> {
    /// Target stage (default: Update).
    pub fn in_stage(mut self, name: &str) -> Self {
        self.stage = name.to_string();
        self
    }

    /// Name this system so others can order against it.
    pub fn label(mut self, label: &str) -> Self {
        self.desc.label = Some(label.to_string());
        self
    }

    /// Run after the system labelled `label` (same stage).
    pub fn after(mut self, label: &str) -> Self {
        self.desc.after.push(label.to_string());
        self
    }

    /// Run before the system labelled `label` (same stage).
    pub fn before(mut self, label: &str) -> Self {
        self.desc.before.push(label.to_string());
        self
    }

    /// Gate the system on a predicate; conditions short-circuit left to
    /// right.
    pub fn run_if<F>(mut self, condition: F) -> Self
    where
        F: Fn(&World, &States) -> bool + Send + 'static,
    {
        self.desc.run_conditions.push(Box::new(condition));
        self
    }

    /// Gate the system on a state machine being in `value`.
    pub fn run_if_state(self, state: &str, value: u32) -> Self {
        let state = state.to_string();
        self.run_if(move |_world, states| states.get(&state) == Some(value))
    }

    /// Mark the system as unsafe to parallelise (hint only).
    pub fn single_threaded(mut self) -> Self {
        self.desc.single_threaded = true;
        self
    }

    /// Attach the configured system to its stage.
    pub fn build(self) {
        let SystemBuilder { app, desc, stage } = self;
        match app.schedule.stage_mut_by_name(&stage) {
            Some(target) => target.systems.push(desc),
            None => {
                debug_assert!(false, "unknown stage `{stage}`");
                if let Some(update) = app.schedule.stage_mut_by_name(stage::UPDATE) {
                    update.systems.push(desc);
                }
            }
        }
    }
}
