//! Lifecycle observers.
//!
//! Observers fire synchronously from the mutation site. While the world is
//! inside a deferred bracket the triggers queue instead and drain once the
//! bracket closes, so callbacks always see a consistent world.

use ahash::AHashMap;

use crate::component::ComponentId;
use crate::entity::Entity;
use crate::world::World;

/// What caused a trigger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TriggerKind {
    /// Entity created.
    OnSpawn,
    /// Entity destroyed.
    OnDespawn,
    /// Component added for the first time.
    OnAdd,
    /// Component added or overwritten.
    OnInsert,
    /// Component removed.
    OnRemove,
    /// Application-defined channel.
    Custom,
}

/// A lifecycle notification delivered to observers.
#[derive(Clone, Copy, Debug)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub entity: Entity,
    /// Component involved, if the trigger is component-shaped.
    pub component: Option<ComponentId>,
}

impl Trigger {
    pub(crate) fn entity(kind: TriggerKind, entity: Entity) -> Self {
        Self {
            kind,
            entity,
            component: None,
        }
    }

    pub(crate) fn component(kind: TriggerKind, entity: Entity, component: ComponentId) -> Self {
        Self {
            kind,
            entity,
            component: Some(component),
        }
    }
}

/// Observer callback. Runs with full world access.
pub type ObserverFn = Box<dyn FnMut(&mut World, &Trigger) + Send + Sync>;

/// One registered observer: a trigger kind, an optional component filter,
/// and the callback.
pub struct Observer {
    pub kind: TriggerKind,
    /// None observes every component.
    pub component: Option<ComponentId>,
    callback: ObserverFn,
}

impl Observer {
    pub fn new<F>(kind: TriggerKind, component: Option<ComponentId>, callback: F) -> Self
    where
        F: FnMut(&mut World, &Trigger) + Send + Sync + 'static,
    {
        Self {
            kind,
            component,
            callback: Box::new(callback),
        }
    }

    fn matches(&self, trigger: &Trigger) -> bool {
        self.kind == trigger.kind
            && (self.component.is_none() || self.component == trigger.component)
    }
}

/// Global and entity-scoped observer tables plus the held-trigger queue.
pub struct ObserverRegistry {
    global: Vec<Observer>,
    by_entity: AHashMap<Entity, Vec<Observer>>,
    queued: Vec<Trigger>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            global: Vec::new(),
            by_entity: AHashMap::new(),
            queued: Vec::new(),
        }
    }

    pub(crate) fn add_global(&mut self, observer: Observer) {
        self.global.push(observer);
    }

    pub(crate) fn add_scoped(&mut self, entity: Entity, observer: Observer) {
        self.by_entity.entry(entity).or_default().push(observer);
    }

    pub(crate) fn queue(&mut self, trigger: Trigger) {
        self.queued.push(trigger);
    }

    pub(crate) fn clear_queued(&mut self) {
        self.queued.clear();
    }

    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    pub fn scoped_count(&self, entity: Entity) -> usize {
        self.by_entity.get(&entity).map_or(0, Vec::len)
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Register a global observer, firing for any entity.
    pub fn add_observer<F>(&mut self, kind: TriggerKind, component: Option<ComponentId>, callback: F)
    where
        F: FnMut(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.observers
            .add_global(Observer::new(kind, component, callback));
    }

    /// Register an observer scoped to one entity.
    pub fn add_entity_observer<F>(
        &mut self,
        entity: Entity,
        kind: TriggerKind,
        component: Option<ComponentId>,
        callback: F,
    ) where
        F: FnMut(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.observers
            .add_scoped(entity, Observer::new(kind, component, callback));
    }

    pub(crate) fn attach_observer(&mut self, entity: Entity, observer: Observer) {
        self.observers.add_scoped(entity, observer);
    }

    /// Fire the generic Custom channel for an entity.
    pub fn trigger_custom(&mut self, entity: Entity, component: Option<ComponentId>) {
        self.emit(Trigger {
            kind: TriggerKind::Custom,
            entity,
            component,
        });
    }

    /// Deliver every held trigger. No-op outside a drained bracket.
    pub(crate) fn flush_triggers(&mut self) {
        loop {
            let queued = std::mem::take(&mut self.observers.queued);
            if queued.is_empty() {
                return;
            }
            for trigger in queued {
                self.dispatch_trigger(trigger);
            }
        }
    }

    /// Invoke every matching observer. The tables are detached during the
    /// walk so callbacks get full world access; observers registered from
    /// inside a callback are merged back afterwards.
    pub(crate) fn dispatch_trigger(&mut self, trigger: Trigger) {
        let mut global = std::mem::take(&mut self.observers.global);
        for observer in global.iter_mut() {
            if observer.matches(&trigger) {
                (observer.callback)(self, &trigger);
            }
        }
        let added = std::mem::replace(&mut self.observers.global, global);
        self.observers.global.extend(added);

        if let Some(mut scoped) = self.observers.by_entity.remove(&trigger.entity) {
            for observer in scoped.iter_mut() {
                if observer.matches(&trigger) {
                    (observer.callback)(self, &trigger);
                }
            }
            // The entity's observers die with it.
            if trigger.kind != TriggerKind::OnDespawn {
                if let Some(added) = self.observers.by_entity.remove(&trigger.entity) {
                    scoped.extend(added);
                }
                self.observers.by_entity.insert(trigger.entity, scoped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let reader = Arc::clone(&count);
        (count, move || reader.load(Ordering::SeqCst))
    }

    #[test]
    fn test_spawn_despawn_observers() {
        let mut world = World::new();
        let (spawns, read_spawns) = counter();
        let (despawns, read_despawns) = counter();

        world.add_observer(TriggerKind::OnSpawn, None, move |_, _| {
            spawns.fetch_add(1, Ordering::SeqCst);
        });
        world.add_observer(TriggerKind::OnDespawn, None, move |_, _| {
            despawns.fetch_add(1, Ordering::SeqCst);
        });

        let entity = world.spawn();
        world.despawn(entity);
        assert_eq!(read_spawns(), 1);
        assert_eq!(read_despawns(), 1);
    }

    #[test]
    fn test_add_fires_once_insert_fires_every_time() {
        let mut world = World::new();
        let position = world.register_component("Position", 8);
        let (adds, read_adds) = counter();
        let (inserts, read_inserts) = counter();

        world.add_observer(TriggerKind::OnAdd, Some(position), move |_, _| {
            adds.fetch_add(1, Ordering::SeqCst);
        });
        world.add_observer(TriggerKind::OnInsert, Some(position), move |_, _| {
            inserts.fetch_add(1, Ordering::SeqCst);
        });

        let entity = world.spawn();
        world.set_value(entity, position, &[1.0f32, 2.0]);
        world.set_value(entity, position, &[3.0f32, 4.0]);

        assert_eq!(read_adds(), 1);
        assert_eq!(read_inserts(), 2);
    }

    #[test]
    fn test_component_filter() {
        let mut world = World::new();
        let position = world.register_component("Position", 8);
        let velocity = world.register_component("Velocity", 8);
        let (hits, read_hits) = counter();

        world.add_observer(TriggerKind::OnAdd, Some(velocity), move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        let entity = world.spawn();
        world.set_value(entity, position, &[0.0f32, 0.0]);
        assert_eq!(read_hits(), 0);
        world.set_value(entity, velocity, &[0.0f32, 0.0]);
        assert_eq!(read_hits(), 1);
    }

    #[test]
    fn test_entity_scoped_observer() {
        let mut world = World::new();
        let position = world.register_component("Position", 8);
        let watched = world.spawn();
        let other = world.spawn();
        let (hits, read_hits) = counter();

        world.add_entity_observer(watched, TriggerKind::OnInsert, None, move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        world.set_value(other, position, &[0.0f32, 0.0]);
        assert_eq!(read_hits(), 0);
        world.set_value(watched, position, &[0.0f32, 0.0]);
        assert_eq!(read_hits(), 1);
    }

    #[test]
    fn test_triggers_queue_inside_deferred_bracket() {
        let mut world = World::new();
        let position = world.register_component("Position", 8);
        let entity = world.spawn();
        let (hits, read_hits) = counter();

        world.add_observer(TriggerKind::OnInsert, Some(position), move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        world.begin_deferred();
        world.set_value(entity, position, &[0.0f32, 0.0]);
        assert_eq!(read_hits(), 0);
        world.end_deferred();
        assert_eq!(read_hits(), 1);
    }

    #[test]
    fn test_observer_reads_component_in_callback() {
        let mut world = World::new();
        let health = world.register_component("Health", 4);
        let (seen, read_seen) = counter();

        world.add_observer(TriggerKind::OnInsert, Some(health), move |world, trigger| {
            let value = world
                .get_value::<u32>(trigger.entity, trigger.component.unwrap())
                .copied()
                .unwrap_or(0);
            seen.store(value as usize, Ordering::SeqCst);
        });

        let entity = world.spawn();
        world.set_value(entity, health, &77u32);
        assert_eq!(read_seen(), 77);
    }
}
