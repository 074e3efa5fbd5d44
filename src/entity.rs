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

//! Entity handles and the generational entity index.
//!
//! A handle packs a 32-bit slot index and a 16-bit generation into the low
//! 48 bits of a `u64`; the top 16 bits are reserved and always zero. A handle
//! resolves only while the stored generation for its index still matches.

use bytemuck::{Pod, Zeroable};

/// Opaque entity handle.
///
/// The zero handle is reserved as "none"; slot 0 is never allocated so a
/// live handle can never collide with [`Entity::NULL`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Entity(u64);

impl Entity {
    /// The reserved "none" handle.
    pub const NULL: Entity = Entity(0);

    pub(crate) fn new(index: u32, generation: u16) -> Self {
        Entity((index as u64) | ((generation as u64) << 32))
    }

    /// Slot index into the entity table.
    pub fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Generation tag; a handle is valid only while this matches the table.
    pub fn generation(self) -> u16 {
        ((self.0 >> 32) & 0xFFFF) as u16
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Raw 64-bit representation (low 48 bits used).
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from [`Entity::to_bits`].
    pub fn from_bits(bits: u64) -> Self {
        Entity(bits)
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

/// Where a live entity's row currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    /// Slot of the owning archetype in the world's archetype table.
    pub archetype: usize,
    /// Chunk index within that archetype.
    pub chunk: usize,
    /// Row within that chunk.
    pub row: usize,
}

impl EntityLocation {
    pub(crate) const DANGLING: EntityLocation = EntityLocation {
        archetype: usize::MAX,
        chunk: usize::MAX,
        row: usize::MAX,
    };
}

/// Dense entry of the entity index.
///
/// Carries its own handle so that when a removal swaps the last dense entry
/// into the freed slot, the displaced entity's sparse mapping can be fixed.
#[derive(Debug, Clone, Copy)]
pub struct EntityRecord {
    pub entity: Entity,
    pub location: EntityLocation,
}

/// Sparse/dense entity store with generation tags and index recycling.
pub struct Entities {
    /// entity index -> position in `dense` (u32::MAX when free)
    sparse: Vec<u32>,
    /// generation per entity index, parallel to `sparse`
    generations: Vec<u16>,
    dense: Vec<EntityRecord>,
    /// Stack of freed indices awaiting reuse.
    recycled: Vec<u32>,
}

const FREE: u32 = u32::MAX;

impl Entities {
    pub fn new() -> Self {
        Self {
            // Slot 0 stays permanently unallocated.
            sparse: vec![FREE],
            generations: vec![0],
            dense: Vec::new(),
            recycled: Vec::new(),
        }
    }

    /// Allocate a handle, preferring a recycled index.
    ///
    /// A recycled index comes back with its generation bumped, so handles
    /// minted before the recycle keep failing lookup.
    pub fn alloc(&mut self) -> Entity {
        let index = match self.recycled.pop() {
            Some(index) => {
                let gen = &mut self.generations[index as usize];
                *gen = gen.wrapping_add(1);
                index
            }
            None => {
                let index = self.sparse.len() as u32;
                self.sparse.push(FREE);
                self.generations.push(0);
                index
            }
        };

        let entity = Entity::new(index, self.generations[index as usize]);
        self.sparse[index as usize] = self.dense.len() as u32;
        self.dense.push(EntityRecord {
            entity,
            location: EntityLocation::DANGLING,
        });
        entity
    }

    /// Resolve a handle to its record. Fails on out-of-range indices and
    /// generation mismatches.
    pub fn get(&self, entity: Entity) -> Option<&EntityRecord> {
        let dense_index = self.dense_index(entity)?;
        self.dense.get(dense_index)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        let dense_index = self.dense_index(entity)?;
        self.dense.get_mut(dense_index)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_index(entity).is_some()
    }

    /// Free a handle: swap-remove its dense entry and recycle the index.
    ///
    /// Returns false for stale or unknown handles.
    pub fn free(&mut self, entity: Entity) -> bool {
        let Some(dense_index) = self.dense_index(entity) else {
            return false;
        };

        self.dense.swap_remove(dense_index);
        if dense_index < self.dense.len() {
            // Repoint the displaced entity's sparse slot at its new home.
            let moved = self.dense[dense_index].entity;
            self.sparse[moved.index() as usize] = dense_index as u32;
        }

        self.sparse[entity.index() as usize] = FREE;
        self.recycled.push(entity.index());
        true
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Drop every live entity and recycled index, keeping generations so
    /// pre-clear handles stay invalid.
    pub fn clear(&mut self) {
        for slot in self.sparse.iter_mut() {
            *slot = FREE;
        }
        for gen in self.generations.iter_mut() {
            *gen = gen.wrapping_add(1);
        }
        self.dense.clear();
        self.recycled.clear();
        for index in (1..self.sparse.len() as u32).rev() {
            self.recycled.push(index);
        }
    }

    fn dense_index(&self, entity: Entity) -> Option<usize> {
        if entity.is_null() {
            return None;
        }
        let index = entity.index() as usize;
        if index >= self.sparse.len() || self.generations[index] != entity.generation() {
            return None;
        }
        let dense_index = self.sparse[index];
        if dense_index == FREE || dense_index as usize >= self.dense.len() {
            return None;
        }
        Some(dense_index as usize)
    }
}

impl Default for Entities {
    fn default() -> Self {
        Self::new()
    }
}
