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

//! World: central entity, component, and archetype storage.
//!
//! Mutations through a stale handle or an unknown component id are silent
//! no-ops; reads return `None`. The byte-level API (`set`/`get`/`unset`) is
//! the ground truth; the `*_value` wrappers layer `bytemuck::Pod` types on
//! top of it.

use std::any::{Any, TypeId};

use ahash::AHashMap;
use bytemuck::Pod;
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{identity_hash, Archetype};
use crate::chunk::Tick;
use crate::component::{ComponentDesc, ComponentId, ComponentInfo, ComponentRegistry};
use crate::entity::{Entities, Entity, EntityLocation};
use crate::hierarchy::ChildrenMirror;
use crate::observer::{ObserverRegistry, Trigger, TriggerKind};
use crate::storage::{ColumnData, StorageBackend};
use crate::{CHUNK_CAPACITY, INITIAL_ARCHETYPE_CAPACITY};

/// Archetype slot of the root (empty) archetype. Always live.
pub(crate) const ROOT_SLOT: usize = 0;

/// Mutation captured while the world is inside a deferred bracket.
pub(crate) enum DeferredOp {
    Set {
        entity: Entity,
        component: ComponentId,
        bytes: Box<[u8]>,
    },
    Unset {
        entity: Entity,
        component: ComponentId,
    },
    Despawn(Entity),
}

/// Central ECS world.
pub struct World {
    entities: Entities,
    registry: ComponentRegistry,

    /// Archetype slots; evicted slots become None and are reused.
    archetypes: Vec<Option<Archetype>>,
    /// Identity hash -> archetype slot.
    archetype_index: AHashMap<u64, usize>,
    free_slots: Vec<usize>,

    tick: Tick,
    /// Bumped whenever the archetype set changes; invalidates query caches.
    structural_version: u64,

    in_deferred: bool,
    deferred: Vec<DeferredOp>,

    pub(crate) observers: ObserverRegistry,

    /// Hierarchy side table: parent -> ordered child list.
    pub(crate) children_table: AHashMap<Entity, Vec<Entity>>,
    parent_id: ComponentId,
    children_id: ComponentId,

    /// Typed singletons for global state.
    resources: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl World {
    pub fn new() -> Self {
        let mut registry = ComponentRegistry::new();
        let parent_id = registry.register("Parent", std::mem::size_of::<Entity>());
        let children_id = registry.register("Children", std::mem::size_of::<ChildrenMirror>());

        let mut world = Self {
            entities: Entities::new(),
            registry,
            archetypes: Vec::with_capacity(INITIAL_ARCHETYPE_CAPACITY),
            archetype_index: AHashMap::with_capacity(INITIAL_ARCHETYPE_CAPACITY),
            free_slots: Vec::new(),
            tick: 0,
            structural_version: 0,
            in_deferred: false,
            deferred: Vec::new(),
            observers: ObserverRegistry::new(),
            children_table: AHashMap::new(),
            parent_id,
            children_id,
            resources: AHashMap::new(),
        };

        // Bootstrap the root archetype (entities with no components).
        let root = world.get_or_create_archetype(SmallVec::new());
        debug_assert_eq!(root, ROOT_SLOT);
        world
    }

    // ========== Ticks ==========

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Advance the world tick. Called once per frame by the scheduler.
    pub fn update(&mut self) {
        // Wraparound would break every stored changed/added comparison.
        if self.tick == Tick::MAX {
            panic!("World tick overflow at {}", self.tick);
        }
        self.tick += 1;
    }

    // ========== Registration ==========

    /// Register a component with the default heap storage backend.
    pub fn register_component(&mut self, name: &str, size: usize) -> ComponentId {
        self.registry.register(name, size)
    }

    /// Register a component backed by external storage.
    pub fn register_component_with_backend(
        &mut self,
        name: &str,
        size: usize,
        backend: std::sync::Arc<dyn StorageBackend>,
    ) -> ComponentId {
        self.registry.register_with_backend(name, size, Some(backend))
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.registry.id_by_name(name)
    }

    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.registry.info(id)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Id of the auto-registered `Parent` component.
    pub fn parent_component_id(&self) -> ComponentId {
        self.parent_id
    }

    /// Id of the auto-registered `Children` mirror component.
    pub fn children_component_id(&self) -> ComponentId {
        self.children_id
    }

    // ========== Entities ==========

    /// Create an entity in the root archetype.
    pub fn spawn(&mut self) -> Entity {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.spawn").entered();

        let entity = self.entities.alloc();
        let tick = self.tick;
        let arch = self.archetypes[ROOT_SLOT].as_mut().expect("root archetype");
        let (chunk, row) = arch.push_entity(entity, tick, |_| unreachable!("root has no columns"));
        self.entities.get_mut(entity).expect("fresh entity").location = EntityLocation {
            archetype: ROOT_SLOT,
            chunk,
            row,
        };

        self.emit(Trigger::entity(TriggerKind::OnSpawn, entity));
        entity
    }

    /// Create an entity with a preselected handle.
    ///
    /// The requested handle is currently ignored and a fresh one is always
    /// allocated.
    pub fn spawn_with_id(&mut self, _id: Entity) -> Entity {
        self.spawn()
    }

    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Current storage position of a live entity.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        self.entities.get(entity).map(|record| record.location)
    }

    /// Destroy an entity and its row. No-op for stale handles. Inside a
    /// deferred bracket the despawn is queued.
    pub fn despawn(&mut self, entity: Entity) {
        if !self.entities.contains(entity) {
            return;
        }
        if self.in_deferred {
            self.deferred.push(DeferredOp::Despawn(entity));
            return;
        }
        self.despawn_now(entity);
    }

    pub(crate) fn despawn_now(&mut self, entity: Entity) {
        if !self.entities.contains(entity) {
            return;
        }

        // Keep both hierarchy directions consistent before the row goes away.
        self.hierarchy_on_despawn(entity);

        let location = self.entities.get(entity).expect("checked above").location;
        let arch = self.archetypes[location.archetype].as_mut().expect("live archetype");
        if let Some(moved) = arch.remove_entity(location.chunk, location.row) {
            if let Some(record) = self.entities.get_mut(moved.entity) {
                record.location.chunk = moved.chunk;
                record.location.row = moved.row;
            }
        }

        self.entities.free(entity);
        self.emit(Trigger::entity(TriggerKind::OnDespawn, entity));
    }

    // ========== Components ==========

    /// Write component bytes on an entity, transitioning its archetype if the
    /// component is new. `bytes` must match the registered size (empty for
    /// tags). Queued while inside a deferred bracket.
    pub fn set(&mut self, entity: Entity, component: ComponentId, bytes: &[u8]) {
        if self.in_deferred {
            self.deferred.push(DeferredOp::Set {
                entity,
                component,
                bytes: bytes.into(),
            });
            return;
        }
        self.set_now(entity, component, bytes);
    }

    pub(crate) fn set_now(&mut self, entity: Entity, component: ComponentId, bytes: &[u8]) {
        let Some(record) = self.entities.get(entity) else {
            return;
        };
        let location = record.location;
        let Some(desc) = self.registry.desc(component) else {
            return;
        };
        debug_assert_eq!(bytes.len(), desc.size, "component byte size mismatch");
        if bytes.len() != desc.size {
            return;
        }

        let arch = self.archetypes[location.archetype].as_ref().expect("live archetype");
        if arch.has_component(component) {
            // Overwrite in place.
            let Some(column_index) = arch.column_position(component) else {
                return; // tag: membership already present
            };
            let tick = self.tick;
            let arch = self.archetypes[location.archetype].as_mut().expect("live archetype");
            let chunk = arch.chunk_mut(location.chunk).expect("live chunk");
            let column = chunk.column_mut(column_index).expect("column");
            column.data.write(location.row, bytes);
            column.changed_ticks[location.row] = tick;

            self.emit(Trigger::component(TriggerKind::OnInsert, entity, component));
            return;
        }

        // Archetype transition along the add edge.
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.transition", add = component.raw()).entered();

        let target = self.archetype_with(location.archetype, desc);
        let (new_chunk, new_row) = self.move_entity(entity, location, target);

        if desc.size > 0 {
            let tick = self.tick;
            let arch = self.archetypes[target].as_mut().expect("live archetype");
            let column_index = arch.column_position(component).expect("sized component");
            let chunk = arch.chunk_mut(new_chunk).expect("live chunk");
            let column = chunk.column_mut(column_index).expect("column");
            column.data.write(new_row, bytes);
            column.changed_ticks[new_row] = tick;
            column.added_ticks[new_row] = tick;
        }

        self.emit(Trigger::component(TriggerKind::OnAdd, entity, component));
        self.emit(Trigger::component(TriggerKind::OnInsert, entity, component));
    }

    /// Remove a component from an entity. No-op if absent. Queued while
    /// inside a deferred bracket.
    pub fn unset(&mut self, entity: Entity, component: ComponentId) {
        if self.in_deferred {
            self.deferred.push(DeferredOp::Unset { entity, component });
            return;
        }
        self.unset_now(entity, component);
    }

    pub(crate) fn unset_now(&mut self, entity: Entity, component: ComponentId) {
        let Some(record) = self.entities.get(entity) else {
            return;
        };
        let location = record.location;
        let arch = self.archetypes[location.archetype].as_ref().expect("live archetype");
        if !arch.has_component(component) {
            return;
        }

        let target = self.archetype_without(location.archetype, component);
        self.move_entity(entity, location, target);
        self.emit(Trigger::component(TriggerKind::OnRemove, entity, component));
    }

    /// Read component bytes. None for stale handles, unknown components, and
    /// tags (which have no data to point at).
    pub fn get(&self, entity: Entity, component: ComponentId) -> Option<&[u8]> {
        let location = self.entities.get(entity)?.location;
        let arch = self.archetypes[location.archetype].as_ref()?;
        let column_index = arch.column_position(component)?;
        let size = arch.data_components()[column_index].size;
        let chunk = arch.chunk(location.chunk)?;
        Some(chunk.column(column_index)?.data().read(location.row, size))
    }

    /// Read component bytes mutably, stamping the row's changed tick.
    pub fn get_mut(&mut self, entity: Entity, component: ComponentId) -> Option<&mut [u8]> {
        let location = self.entities.get(entity)?.location;
        let tick = self.tick;
        let arch = self.archetypes[location.archetype].as_mut()?;
        let column_index = arch.column_position(component)?;
        let size = arch.data_components()[column_index].size;
        let chunk = arch.chunk_mut(location.chunk)?;
        let column = chunk.column_mut(column_index)?;
        column.changed_ticks[location.row] = tick;
        let ptr = column.data.row_ptr(location.row, size);
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, size) })
    }

    pub fn has(&self, entity: Entity, component: ComponentId) -> bool {
        let Some(record) = self.entities.get(entity) else {
            return false;
        };
        self.archetypes[record.location.archetype]
            .as_ref()
            .is_some_and(|arch| arch.has_component(component))
    }

    /// Add a zero-sized tag component.
    pub fn add_tag(&mut self, entity: Entity, tag: ComponentId) {
        self.set(entity, tag, &[]);
    }

    /// Stamp a component's changed tick with the current world tick.
    pub fn mark_changed(&mut self, entity: Entity, component: ComponentId) {
        let Some(record) = self.entities.get(entity) else {
            return;
        };
        let location = record.location;
        let tick = self.tick;
        let Some(arch) = self.archetypes[location.archetype].as_mut() else {
            return;
        };
        let Some(column_index) = arch.column_position(component) else {
            return;
        };
        if let Some(column) = arch
            .chunk_mut(location.chunk)
            .and_then(|chunk| chunk.column_mut(column_index))
        {
            column.changed_ticks[location.row] = tick;
        }
    }

    // ========== Typed convenience over the byte API ==========

    pub fn set_value<T: Pod>(&mut self, entity: Entity, component: ComponentId, value: &T) {
        self.set(entity, component, bytemuck::bytes_of(value));
    }

    pub fn get_value<T: Pod>(&self, entity: Entity, component: ComponentId) -> Option<&T> {
        let bytes = self.get(entity, component)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return None;
        }
        Some(bytemuck::from_bytes(bytes))
    }

    pub fn get_value_mut<T: Pod>(
        &mut self,
        entity: Entity,
        component: ComponentId,
    ) -> Option<&mut T> {
        let bytes = self.get_mut(entity, component)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return None;
        }
        Some(bytemuck::from_bytes_mut(bytes))
    }

    // ========== Deferred bracket ==========

    /// Enter deferred mode: component/entity mutations queue instead of
    /// applying, and observer triggers hold until the bracket closes.
    pub fn begin_deferred(&mut self) {
        self.in_deferred = true;
    }

    /// Replay queued mutations in insertion order, then deliver held
    /// observer triggers against the now-consistent world.
    pub fn end_deferred(&mut self) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.end_deferred", queued = self.deferred.len()).entered();

        // Triggers keep queueing during the replay itself.
        let ops = std::mem::take(&mut self.deferred);
        for op in ops {
            match op {
                DeferredOp::Set {
                    entity,
                    component,
                    bytes,
                } => self.set_now(entity, component, &bytes),
                DeferredOp::Unset { entity, component } => self.unset_now(entity, component),
                DeferredOp::Despawn(entity) => self.despawn_now(entity),
            }
        }

        self.in_deferred = false;
        self.flush_triggers();
    }

    /// Whether the world is currently inside a deferred bracket.
    pub fn is_deferred(&self) -> bool {
        self.in_deferred
    }

    // ========== Resources (typed singletons) ==========

    /// Insert a resource, replacing any existing value of the same type.
    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.resources.insert(TypeId::of::<R>(), Box::new(resource));
    }

    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources
            .get(&TypeId::of::<R>())
            .and_then(|r| r.downcast_ref())
    }

    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources
            .get_mut(&TypeId::of::<R>())
            .and_then(|r| r.downcast_mut())
    }

    pub fn has_resource<R: 'static>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<R>())
    }

    pub fn remove_resource<R: 'static>(&mut self) -> Option<R> {
        self.resources
            .remove(&TypeId::of::<R>())
            .and_then(|r| r.downcast().ok())
            .map(|boxed| *boxed)
    }

    // ========== World maintenance ==========

    /// Discard every entity and all non-root archetypes; the tick resets to
    /// zero. Registered components, observers, and resources survive.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.children_table.clear();
        self.deferred.clear();
        self.in_deferred = false;
        self.observers.clear_queued();

        self.archetypes.clear();
        self.archetype_index.clear();
        self.free_slots.clear();
        self.tick = 0;
        self.structural_version += 1;

        let root = self.get_or_create_archetype(SmallVec::new());
        debug_assert_eq!(root, ROOT_SLOT);
    }

    /// Evict archetypes that hold no entities (the root is exempt) and prune
    /// graph edges that pointed at them. Returns the eviction count.
    pub fn remove_empty_archetypes(&mut self) -> usize {
        let mut removed: Vec<usize> = Vec::new();
        for slot in 1..self.archetypes.len() {
            if let Some(arch) = &self.archetypes[slot] {
                if arch.is_empty() {
                    removed.push(slot);
                }
            }
        }
        if removed.is_empty() {
            return 0;
        }

        for &slot in &removed {
            let arch = self.archetypes[slot].take().expect("checked above");
            self.archetype_index.remove(&arch.id());
            self.free_slots.push(slot);
        }
        for slot_entry in self.archetypes.iter_mut() {
            if let Some(arch) = slot_entry {
                arch.retain_edges(|target| !removed.contains(&target));
            }
        }

        self.structural_version += 1;
        removed.len()
    }

    // ========== Archetype access ==========

    pub fn archetype(&self, slot: usize) -> Option<&Archetype> {
        self.archetypes.get(slot).and_then(|slot| slot.as_ref())
    }

    /// Live archetypes with their slots.
    pub fn archetypes(&self) -> impl Iterator<Item = (usize, &Archetype)> {
        self.archetypes
            .iter()
            .enumerate()
            .filter_map(|(slot, arch)| arch.as_ref().map(|arch| (slot, arch)))
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Monotonic counter bumped on any change to the archetype set.
    pub fn structural_version(&self) -> u64 {
        self.structural_version
    }

    // ========== Internals ==========

    /// Find or create the archetype for a component set; returns its slot.
    fn get_or_create_archetype(&mut self, mut components: SmallVec<[ComponentDesc; 8]>) -> usize {
        components.sort_by_key(|desc| desc.id);
        let hash = identity_hash(components.iter().map(|desc| desc.id));
        if let Some(&slot) = self.archetype_index.get(&hash) {
            return slot;
        }

        let archetype = Archetype::new(components);
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.archetypes[slot] = Some(archetype);
                slot
            }
            None => {
                self.archetypes.push(Some(archetype));
                self.archetypes.len() - 1
            }
        };
        self.archetype_index.insert(hash, slot);
        self.structural_version += 1;
        slot
    }

    /// Neighbour of `slot` reached by adding `desc`, materialising the edge
    /// pair on first use.
    fn archetype_with(&mut self, slot: usize, desc: ComponentDesc) -> usize {
        let arch = self.archetypes[slot].as_ref().expect("live archetype");
        if let Some(target) = arch.add_edge(desc.id) {
            return target;
        }
        let components = arch.components_with(desc);
        let target = self.get_or_create_archetype(components);
        self.archetypes[slot]
            .as_mut()
            .expect("live archetype")
            .set_add_edge(desc.id, target);
        self.archetypes[target]
            .as_mut()
            .expect("live archetype")
            .set_remove_edge(desc.id, slot);
        target
    }

    /// Neighbour of `slot` reached by removing `component`.
    fn archetype_without(&mut self, slot: usize, component: ComponentId) -> usize {
        let arch = self.archetypes[slot].as_ref().expect("live archetype");
        if let Some(target) = arch.remove_edge(component) {
            return target;
        }
        let components = arch.components_without(component);
        let target = self.get_or_create_archetype(components);
        self.archetypes[slot]
            .as_mut()
            .expect("live archetype")
            .set_remove_edge(component, target);
        self.archetypes[target]
            .as_mut()
            .expect("live archetype")
            .set_add_edge(component, slot);
        target
    }

    /// Move an entity to `target`: allocate its new row, copy the data
    /// components both archetypes share (bytes and ticks), swap-remove the
    /// old row, and repair the displaced entity's record. Returns the new
    /// (chunk, row).
    fn move_entity(
        &mut self,
        entity: Entity,
        old: EntityLocation,
        target: usize,
    ) -> (usize, usize) {
        debug_assert_ne!(old.archetype, target);
        let tick = self.tick;

        // Allocate the destination row first; the source row stays intact
        // until the copy below is done.
        let registry = &self.registry;
        let target_arch = self.archetypes[target].as_mut().expect("live archetype");
        let (new_chunk, new_row) = target_arch.push_entity(entity, tick, |desc| {
            ColumnData::new(desc.size, CHUNK_CAPACITY, registry.backend(desc.id))
        });

        // Copy every data component present in both archetypes.
        {
            let (old_arch, new_arch) = two_slots(&mut self.archetypes, old.archetype, target);

            let mut copies: SmallVec<[(usize, usize, usize); 8]> = SmallVec::new();
            for (src_index, desc) in old_arch.data_components().iter().enumerate() {
                if let Some(dst_index) = new_arch.column_position(desc.id) {
                    copies.push((src_index, dst_index, desc.size));
                }
            }

            let old_chunk = old_arch.chunk(old.chunk).expect("live chunk");
            let new_chunk_ref = new_arch.chunk_mut(new_chunk).expect("live chunk");

            for (src_index, dst_index, size) in copies {
                let src_column = old_chunk.column(src_index).expect("column");
                let changed = src_column.changed_ticks()[old.row];
                let added = src_column.added_ticks()[old.row];

                let dst_column = new_chunk_ref.column_mut(dst_index).expect("column");
                ColumnData::copy_row(
                    src_column.data(),
                    old.row,
                    &mut dst_column.data,
                    new_row,
                    size,
                );
                dst_column.changed_ticks[new_row] = changed;
                dst_column.added_ticks[new_row] = added;
            }
        }

        // Swap-remove the old row and fix the displaced entity.
        let old_arch = self.archetypes[old.archetype].as_mut().expect("live archetype");
        if let Some(moved) = old_arch.remove_entity(old.chunk, old.row) {
            if let Some(record) = self.entities.get_mut(moved.entity) {
                record.location.chunk = moved.chunk;
                record.location.row = moved.row;
            }
        }

        self.entities.get_mut(entity).expect("live entity").location = EntityLocation {
            archetype: target,
            chunk: new_chunk,
            row: new_row,
        };
        (new_chunk, new_row)
    }

    /// Route a lifecycle trigger: queued inside the deferred bracket,
    /// dispatched synchronously otherwise.
    pub(crate) fn emit(&mut self, trigger: Trigger) {
        if self.in_deferred {
            self.observers.queue(trigger);
        } else {
            self.dispatch_trigger(trigger);
        }
    }
}

/// Split-borrow two distinct archetype slots.
fn two_slots(
    archetypes: &mut [Option<Archetype>],
    a: usize,
    b: usize,
) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (
            left[a].as_mut().expect("live archetype"),
            right[0].as_mut().expect("live archetype"),
        )
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (
            right[0].as_mut().expect("live archetype"),
            left[b].as_mut().expect("live archetype"),
        )
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
