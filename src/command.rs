// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deferred mutation buffers.
//!
//! Each system gets a fresh `Commands`; entries replay against the world at
//! the stage boundary, in insertion order, inside the world's deferred
//! bracket so observer triggers hold until the whole batch has landed.
//!
//! Spawning is the one immediate operation: the caller receives a live
//! handle (the entity starts in the root archetype) and every queued insert
//! on it lands at apply time.

use bytemuck::Pod;

use crate::component::ComponentId;
use crate::entity::Entity;
use crate::event::{Events, EventTypeId};
use crate::observer::{Observer, Trigger, TriggerKind};
use crate::world::World;

/// One deferred mutation.
pub enum Command {
    Insert {
        entity: Entity,
        component: ComponentId,
        bytes: Box<[u8]>,
    },
    Remove {
        entity: Entity,
        component: ComponentId,
    },
    Despawn(Entity),
    InsertResource(Box<dyn FnOnce(&mut World) + Send>),
    TriggerEvent {
        event: EventTypeId,
        bytes: Box<[u8]>,
    },
    AttachObserver {
        entity: Entity,
        observer: Observer,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Insert {
                entity, component, ..
            } => f
                .debug_struct("Insert")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::Remove { entity, component } => f
                .debug_struct("Remove")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::Despawn(entity) => f.debug_tuple("Despawn").field(entity).finish(),
            Command::InsertResource(_) => write!(f, "InsertResource(...)"),
            Command::TriggerEvent { event, .. } => {
                f.debug_struct("TriggerEvent").field("event", event).finish()
            }
            Command::AttachObserver { entity, .. } => f
                .debug_struct("AttachObserver")
                .field("entity", entity)
                .finish(),
        }
    }
}

/// Append-only command log.
#[derive(Default)]
pub struct Commands {
    commands: Vec<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Spawn immediately and return a builder for queueing inserts on the
    /// new entity.
    pub fn spawn<'a>(&'a mut self, world: &mut World) -> EntityCommands<'a> {
        let entity = world.spawn();
        EntityCommands {
            commands: self,
            entity,
        }
    }

    /// Builder targeting an existing entity.
    pub fn entity(&mut self, entity: Entity) -> EntityCommands<'_> {
        EntityCommands {
            commands: self,
            entity,
        }
    }

    /// Queue a component write.
    pub fn insert(&mut self, entity: Entity, component: ComponentId, bytes: &[u8]) {
        self.commands.push(Command::Insert {
            entity,
            component,
            bytes: bytes.into(),
        });
    }

    pub fn insert_value<T: Pod>(&mut self, entity: Entity, component: ComponentId, value: &T) {
        self.insert(entity, component, bytemuck::bytes_of(value));
    }

    /// Queue a component removal.
    pub fn remove(&mut self, entity: Entity, component: ComponentId) {
        self.commands.push(Command::Remove { entity, component });
    }

    /// Queue a despawn.
    pub fn despawn(&mut self, entity: Entity) {
        self.commands.push(Command::Despawn(entity));
    }

    /// Queue a resource replacement.
    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.commands
            .push(Command::InsertResource(Box::new(move |world| {
                world.insert_resource(resource);
            })));
    }

    /// Queue an event send (lands in the write buffer at apply time).
    pub fn send_event(&mut self, event: EventTypeId, bytes: &[u8]) {
        self.commands.push(Command::TriggerEvent {
            event,
            bytes: bytes.into(),
        });
    }

    pub fn send_event_value<T: Pod>(&mut self, event: EventTypeId, value: &T) {
        self.send_event(event, bytemuck::bytes_of(value));
    }

    /// Queue registration of an entity-scoped observer.
    pub fn attach_observer<F>(
        &mut self,
        entity: Entity,
        kind: TriggerKind,
        component: Option<ComponentId>,
        callback: F,
    ) where
        F: FnMut(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.commands.push(Command::AttachObserver {
            entity,
            observer: Observer::new(kind, component, callback),
        });
    }

    /// Replay all entries in insertion order under the deferred bracket,
    /// then clear the buffer.
    pub fn apply(&mut self, world: &mut World, events: &mut Events) {
        if self.commands.is_empty() {
            return;
        }

        world.begin_deferred();
        for command in self.commands.drain(..) {
            match command {
                Command::Insert {
                    entity,
                    component,
                    bytes,
                } => world.set_now(entity, component, &bytes),
                Command::Remove { entity, component } => world.unset_now(entity, component),
                Command::Despawn(entity) => world.despawn_now(entity),
                Command::InsertResource(insert) => insert(world),
                Command::TriggerEvent { event, bytes } => {
                    let _ = events.send(event, &bytes);
                }
                Command::AttachObserver { entity, observer } => {
                    world.attach_observer(entity, observer);
                }
            }
        }
        world.end_deferred();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// Chainable builder scoped to one entity.
pub struct EntityCommands<'a> {
    commands: &'a mut Commands,
    entity: Entity,
}

impl EntityCommands<'_> {
    pub fn insert(self, component: ComponentId, bytes: &[u8]) -> Self {
        self.commands.insert(self.entity, component, bytes);
        self
    }

    pub fn insert_value<T: Pod>(self, component: ComponentId, value: &T) -> Self {
        self.commands.insert_value(self.entity, component, value);
        self
    }

    pub fn remove(self, component: ComponentId) -> Self {
        self.commands.remove(self.entity, component);
        self
    }

    pub fn despawn(self) -> Self {
        self.commands.despawn(self.entity);
        self
    }

    pub fn observe<F>(
        self,
        kind: TriggerKind,
        component: Option<ComponentId>,
        callback: F,
    ) -> Self
    where
        F: FnMut(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.commands
            .attach_observer(self.entity, kind, component, callback);
        self
    }

    /// The entity this builder targets.
    pub fn id(&self) -> Entity {
        self.entity
    }
}
