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

//! Archetypes: equivalence classes of entities by component set.
//!
//! An archetype's identity is an FNV-1a hash over its ascending component id
//! list and is stable for its whole life. Rows live in fixed-capacity chunks;
//! every chunk except possibly the last is full, and removal back-fills holes
//! from the archetype's final row to keep it that way. Graph edges to the
//! neighbouring archetypes reached by adding or removing one component are
//! materialised on first transition and O(1) afterwards.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::chunk::{Chunk, Tick};
use crate::component::{ComponentDesc, ComponentId};
use crate::entity::Entity;
use crate::storage::ColumnData;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a over an ascending component id list.
pub fn identity_hash<I>(sorted_ids: I) -> u64
where
    I: IntoIterator<Item = ComponentId>,
{
    let mut hash = FNV_OFFSET_BASIS;
    for id in sorted_ids {
        hash ^= id.raw() as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Outcome of a swap-remove: the entity that was relocated into the freed
/// row, with its new position.
pub(crate) struct MovedRow {
    pub entity: Entity,
    pub chunk: usize,
    pub row: usize,
}

pub struct Archetype {
    id: u64,
    /// Canonical component list, ascending by id. Tags included.
    components: SmallVec<[ComponentDesc; 8]>,
    /// Sized components only; index here == column index in every chunk.
    data_components: SmallVec<[ComponentDesc; 8]>,
    data_sizes: SmallVec<[usize; 8]>,
    tags: SmallVec<[ComponentId; 4]>,
    chunks: Vec<Chunk>,
    entity_count: usize,

    /// component id -> index in `components`
    positions: FxHashMap<ComponentId, usize>,
    /// component id -> index in `data_components` / chunk columns
    column_positions: FxHashMap<ComponentId, usize>,

    /// component id -> archetype slot reached by adding it
    add_edges: FxHashMap<ComponentId, usize>,
    /// component id -> archetype slot reached by removing it
    remove_edges: FxHashMap<ComponentId, usize>,
}

impl Archetype {
    /// Build an archetype from a component list (sorted here; duplicates are
    /// the caller's bug).
    pub(crate) fn new(mut components: SmallVec<[ComponentDesc; 8]>) -> Self {
        components.sort_by_key(|desc| desc.id);
        debug_assert!(components.windows(2).all(|w| w[0].id < w[1].id));

        let id = identity_hash(components.iter().map(|desc| desc.id));

        let mut data_components: SmallVec<[ComponentDesc; 8]> = SmallVec::new();
        let mut tags = SmallVec::new();
        let mut positions = FxHashMap::default();
        let mut column_positions = FxHashMap::default();

        for (index, desc) in components.iter().enumerate() {
            positions.insert(desc.id, index);
            if desc.is_tag() {
                tags.push(desc.id);
            } else {
                column_positions.insert(desc.id, data_components.len());
                data_components.push(*desc);
            }
        }
        let data_sizes: SmallVec<[usize; 8]> =
            data_components.iter().map(|desc| desc.size).collect();

        Self {
            id,
            components,
            data_components,
            data_sizes,
            tags,
            chunks: Vec::new(),
            entity_count: 0,
            positions,
            column_positions,
            add_edges: FxHashMap::default(),
            remove_edges: FxHashMap::default(),
        }
    }

    /// Identity hash over the sorted component id list.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn components(&self) -> &[ComponentDesc] {
        &self.components
    }

    pub fn data_components(&self) -> &[ComponentDesc] {
        &self.data_components
    }

    pub fn tags(&self) -> &[ComponentId] {
        &self.tags
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    pub fn has_component(&self, component: ComponentId) -> bool {
        self.positions.contains_key(&component)
    }

    /// Index of `component` in the canonical list.
    pub fn component_position(&self, component: ComponentId) -> Option<usize> {
        self.positions.get(&component).copied()
    }

    /// Chunk column index of a sized component; None for tags and absentees.
    pub fn column_position(&self, component: ComponentId) -> Option<usize> {
        self.column_positions.get(&component).copied()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub(crate) fn chunk_mut(&mut self, index: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(index)
    }

    pub(crate) fn data_sizes(&self) -> &[usize] {
        &self.data_sizes
    }

    /// Component list with `desc` spliced in (for the add transition).
    pub(crate) fn components_with(&self, desc: ComponentDesc) -> SmallVec<[ComponentDesc; 8]> {
        let mut out = self.components.clone();
        out.push(desc);
        out
    }

    /// Component list with `component` removed (for the remove transition).
    pub(crate) fn components_without(&self, component: ComponentId) -> SmallVec<[ComponentDesc; 8]> {
        self.components
            .iter()
            .copied()
            .filter(|desc| desc.id != component)
            .collect()
    }

    pub(crate) fn add_edge(&self, component: ComponentId) -> Option<usize> {
        self.add_edges.get(&component).copied()
    }

    pub(crate) fn remove_edge(&self, component: ComponentId) -> Option<usize> {
        self.remove_edges.get(&component).copied()
    }

    pub(crate) fn set_add_edge(&mut self, component: ComponentId, target: usize) {
        self.add_edges.insert(component, target);
    }

    pub(crate) fn set_remove_edge(&mut self, component: ComponentId, target: usize) {
        self.remove_edges.insert(component, target);
    }

    /// Drop edges whose target archetype slot no longer survives.
    pub(crate) fn retain_edges<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.add_edges.retain(|_, target| keep(*target));
        self.remove_edges.retain(|_, target| keep(*target));
    }

    /// Place `entity` at the insertion point (the first non-full chunk,
    /// allocating one when every chunk is full), stamping added and changed
    /// ticks. Returns (chunk index, row).
    pub(crate) fn push_entity<F>(
        &mut self,
        entity: Entity,
        tick: Tick,
        make_storage: F,
    ) -> (usize, usize)
    where
        F: FnMut(&ComponentDesc) -> ColumnData,
    {
        let needs_chunk = self.chunks.last().map_or(true, Chunk::is_full);
        if needs_chunk {
            self.chunks
                .push(Chunk::new(&self.data_components, make_storage));
        }

        let chunk_index = self.chunks.len() - 1;
        let row = self.chunks[chunk_index].push_row(entity, tick);
        self.entity_count += 1;
        (chunk_index, row)
    }

    /// Swap-remove the row at (chunk, row), back-filling the hole with the
    /// archetype's final row so all chunks but the last stay full. Trailing
    /// empty chunks are released.
    ///
    /// Returns the relocated entity (if any) so the caller can repair its
    /// entity-index record.
    pub(crate) fn remove_entity(&mut self, chunk: usize, row: usize) -> Option<MovedRow> {
        debug_assert!(chunk < self.chunks.len());
        debug_assert!(row < self.chunks[chunk].count());

        let last_chunk = self.chunks.len() - 1;
        let last_row = self.chunks[last_chunk].count() - 1;

        let moved = if chunk == last_chunk && row == last_row {
            self.chunks[chunk].pop_row();
            None
        } else if chunk == last_chunk {
            let entity = self.chunks[chunk].fill_from_last(row, &self.data_sizes);
            Some(MovedRow { entity, chunk, row })
        } else {
            // Hole in an interior chunk: pull the archetype's final row over.
            let (head, tail) = self.chunks.split_at_mut(last_chunk);
            let dst = &mut head[chunk];
            let src = &mut tail[0];

            for (column_index, &size) in self.data_sizes.iter().enumerate() {
                let src_column = src.column(column_index).expect("column");
                let changed = src_column.changed_ticks()[last_row];
                let added = src_column.added_ticks()[last_row];

                let dst_column = dst.column_mut(column_index).expect("column");
                ColumnData::copy_row(
                    src.column(column_index).expect("column").data(),
                    last_row,
                    &mut dst_column.data,
                    row,
                    size,
                );
                dst_column.changed_ticks[row] = changed;
                dst_column.added_ticks[row] = added;
            }

            let entity = src.entity(last_row);
            dst.set_entity(row, entity);
            src.pop_row();
            Some(MovedRow { entity, chunk, row })
        };

        self.entity_count -= 1;
        while self.chunks.last().is_some_and(Chunk::is_empty) {
            self.chunks.pop();
        }
        moved
    }
}
