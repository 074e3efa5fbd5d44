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

//! Declarative queries over the archetype set.
//!
//! A query is a list of terms; building it records every matching archetype
//! and captures the world's structural-change version, so iteration only
//! rescans when the archetype set actually changed.
//!
//! The iterator yields whole chunks. Changed/Added terms filter at the
//! archetype level only; the per-row freshness test is deliberately left to
//! the caller, who compares the exposed tick arrays against `world.tick()`
//! or a remembered last-seen tick.
//!
//! Structurally mutating the world while an iterator is live is undefined
//! behaviour; writing through the current chunk's columns is allowed and
//! does not invalidate the iterator.

use std::ptr::NonNull;

use bytemuck::Pod;
use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::chunk::{Chunk, Tick};
use crate::component::ComponentId;
use crate::entity::Entity;
use crate::storage::ColumnData;
use crate::world::World;
use crate::MAX_QUERY_TERMS;

/// Per-term predicate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TermOp {
    /// Archetype must contain the component.
    With,
    /// Archetype must lack the component.
    Without,
    /// Always matches; the column may be absent and the caller checks.
    Optional,
    /// Component present; rows filtered by changed tick (caller-side).
    Changed,
    /// Component present; rows filtered by added tick (caller-side).
    Added,
}

#[derive(Clone, Copy, Debug)]
pub struct Term {
    pub op: TermOp,
    pub component: ComponentId,
}

/// Declarative archetype filter with a cached match list.
pub struct Query {
    terms: SmallVec<[Term; MAX_QUERY_TERMS]>,
    matched: Vec<usize>,
    last_structural_version: u64,
    built: bool,
}

impl Query {
    pub fn new() -> Self {
        Self {
            terms: SmallVec::new(),
            matched: Vec::new(),
            last_structural_version: 0,
            built: false,
        }
    }

    fn term(mut self, op: TermOp, component: ComponentId) -> Self {
        // Terms past the cap are dropped, matching the configured bound.
        if self.terms.len() < MAX_QUERY_TERMS {
            self.terms.push(Term { op, component });
        }
        self
    }

    pub fn with(self, component: ComponentId) -> Self {
        self.term(TermOp::With, component)
    }

    pub fn without(self, component: ComponentId) -> Self {
        self.term(TermOp::Without, component)
    }

    pub fn optional(self, component: ComponentId) -> Self {
        self.term(TermOp::Optional, component)
    }

    pub fn changed(self, component: ComponentId) -> Self {
        self.term(TermOp::Changed, component)
    }

    pub fn added(self, component: ComponentId) -> Self {
        self.term(TermOp::Added, component)
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    fn matches(&self, archetype: &Archetype) -> bool {
        self.terms.iter().all(|term| {
            let has = archetype.has_component(term.component);
            match term.op {
                TermOp::With | TermOp::Changed | TermOp::Added => has,
                TermOp::Without => !has,
                TermOp::Optional => true,
            }
        })
    }

    /// Scan the archetype set and record matches, capturing the structural
    /// version for staleness checks.
    pub fn build(&mut self, world: &World) {
        self.matched.clear();
        for (slot, archetype) in world.archetypes() {
            if self.matches(archetype) {
                self.matched.push(slot);
            }
        }
        self.last_structural_version = world.structural_version();
        self.built = true;
    }

    fn ensure_built(&mut self, world: &World) {
        if !self.built || self.last_structural_version != world.structural_version() {
            self.build(world);
        }
    }

    /// Matched archetype slots from the last build.
    pub fn matched_archetypes(&self) -> &[usize] {
        &self.matched
    }

    /// Iterate matching chunks, rebuilding the match list first if the
    /// archetype set changed. The iterator itself is a stack value and
    /// allocates nothing.
    pub fn iter<'w>(&'w mut self, world: &'w World) -> QueryIter<'w> {
        self.ensure_built(world);
        QueryIter {
            world,
            matched: &self.matched,
            archetype_cursor: 0,
            chunk_cursor: 0,
        }
    }

    /// Total matched rows across all chunks.
    pub fn count(&mut self, world: &World) -> usize {
        self.ensure_built(world);
        self.matched
            .iter()
            .filter_map(|&slot| world.archetype(slot))
            .map(|archetype| archetype.entity_count())
            .sum()
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk-granular cursor over a query's matched archetypes.
pub struct QueryIter<'w> {
    world: &'w World,
    matched: &'w [usize],
    archetype_cursor: usize,
    chunk_cursor: usize,
}

impl<'w> Iterator for QueryIter<'w> {
    type Item = ChunkView<'w>;

    fn next(&mut self) -> Option<ChunkView<'w>> {
        while self.archetype_cursor < self.matched.len() {
            let slot = self.matched[self.archetype_cursor];
            let Some(archetype) = self.world.archetype(slot) else {
                self.archetype_cursor += 1;
                self.chunk_cursor = 0;
                continue;
            };

            match archetype.chunk(self.chunk_cursor) {
                Some(chunk) => {
                    self.chunk_cursor += 1;
                    if chunk.is_empty() {
                        continue;
                    }
                    return Some(ChunkView { archetype, chunk });
                }
                None => {
                    self.archetype_cursor += 1;
                    self.chunk_cursor = 0;
                }
            }
        }
        None
    }
}

/// One matched chunk: index-aligned entity and component columns.
#[derive(Clone, Copy)]
pub struct ChunkView<'w> {
    archetype: &'w Archetype,
    chunk: &'w Chunk,
}

impl<'w> ChunkView<'w> {
    pub fn archetype(&self) -> &'w Archetype {
        self.archetype
    }

    /// Live rows in this chunk.
    pub fn count(&self) -> usize {
        self.chunk.count()
    }

    pub fn entities(&self) -> &'w [Entity] {
        self.chunk.entities()
    }

    fn column_index(&self, component: ComponentId) -> Option<usize> {
        self.archetype.column_position(component)
    }

    /// Base pointer of a component's column. The native-storage fast path;
    /// None for tags, absent components, and external backends.
    pub fn column(&self, component: ComponentId) -> Option<NonNull<u8>> {
        let index = self.column_index(component)?;
        self.chunk.column(index)?.data().base_ptr()
    }

    /// A column by its position in the archetype's data-component list.
    pub fn data_column(&self, index: usize) -> Option<&'w crate::chunk::Column> {
        self.chunk.column(index)
    }

    /// The column's storage, whichever backend owns it.
    pub fn column_data(&self, component: ComponentId) -> Option<&'w ColumnData> {
        let index = self.column_index(component)?;
        Some(self.chunk.column(index)?.data())
    }

    /// Per-row changed ticks for a component, index-aligned with
    /// [`ChunkView::entities`].
    pub fn changed_ticks(&self, component: ComponentId) -> Option<&'w [Tick]> {
        let index = self.column_index(component)?;
        Some(&self.chunk.column(index)?.changed_ticks()[..self.chunk.count()])
    }

    /// Per-row added ticks for a component.
    pub fn added_ticks(&self, component: ComponentId) -> Option<&'w [Tick]> {
        let index = self.column_index(component)?;
        Some(&self.chunk.column(index)?.added_ticks()[..self.chunk.count()])
    }

    /// View a native column as a typed slice. None when the component is
    /// absent, a tag, externally stored, or `T`'s size does not match the
    /// registered component size.
    pub fn column_slice<T: Pod>(&self, component: ComponentId) -> Option<&'w [T]> {
        let index = self.column_index(component)?;
        if self.archetype.data_components()[index].size != std::mem::size_of::<T>() {
            return None;
        }
        let base = self.chunk.column(index)?.data().base_ptr()?;
        if (base.as_ptr() as usize) % std::mem::align_of::<T>() != 0 {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(base.as_ptr() as *const T, self.chunk.count()) })
    }

    /// Mutable typed view of a native column.
    ///
    /// # Safety
    /// The caller must be the only accessor of this column for the slice's
    /// lifetime. Writing through the current chunk is allowed during
    /// iteration; holding two overlapping slices is not.
    pub unsafe fn column_slice_mut<T: Pod>(&self, component: ComponentId) -> Option<&'w mut [T]> {
        let index = self.column_index(component)?;
        if self.archetype.data_components()[index].size != std::mem::size_of::<T>() {
            return None;
        }
        let base = self.chunk.column(index)?.data().base_ptr()?;
        if (base.as_ptr() as usize) % std::mem::align_of::<T>() != 0 {
            return None;
        }
        Some(std::slice::from_raw_parts_mut(
            base.as_ptr() as *mut T,
            self.chunk.count(),
        ))
    }
}
