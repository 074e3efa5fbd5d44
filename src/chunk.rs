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

//! Fixed-capacity row groups.
//!
//! A chunk holds an entity column plus one data column per sized component.
//! All columns are index-aligned: row `i` of every column belongs to the
//! same entity. Rows `[0, count)` are live and dense.

use crate::component::ComponentDesc;
use crate::entity::Entity;
use crate::storage::ColumnData;
use crate::CHUNK_CAPACITY;

/// Change-detection tick counter.
pub type Tick = u32;

/// One component's storage inside a chunk: record bytes plus parallel
/// per-row changed/added tick arrays.
pub struct Column {
    pub(crate) data: ColumnData,
    pub(crate) changed_ticks: Box<[Tick]>,
    pub(crate) added_ticks: Box<[Tick]>,
}

impl Column {
    fn new(data: ColumnData) -> Self {
        Self {
            data,
            changed_ticks: vec![0; CHUNK_CAPACITY].into_boxed_slice(),
            added_ticks: vec![0; CHUNK_CAPACITY].into_boxed_slice(),
        }
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn changed_ticks(&self) -> &[Tick] {
        &self.changed_ticks
    }

    pub fn added_ticks(&self) -> &[Tick] {
        &self.added_ticks
    }
}

/// Fixed-capacity block of rows within an archetype.
pub struct Chunk {
    entities: Box<[Entity]>,
    columns: Box<[Column]>,
    count: usize,
}

impl Chunk {
    /// Build an empty chunk with one column per data component, pulling each
    /// column's storage from the provided constructor.
    pub(crate) fn new<F>(data_components: &[ComponentDesc], mut make_storage: F) -> Self
    where
        F: FnMut(&ComponentDesc) -> ColumnData,
    {
        let columns = data_components
            .iter()
            .map(|desc| Column::new(make_storage(desc)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            entities: vec![Entity::NULL; CHUNK_CAPACITY].into_boxed_slice(),
            columns,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == CHUNK_CAPACITY
    }

    /// Live entity handles, rows `[0, count)`.
    pub fn entities(&self) -> &[Entity] {
        &self.entities[..self.count]
    }

    pub fn entity(&self, row: usize) -> Entity {
        self.entities[row]
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub(crate) fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Claim the next row for `entity`, stamping every column's added and
    /// changed tick with the current world tick.
    pub(crate) fn push_row(&mut self, entity: Entity, tick: Tick) -> usize {
        debug_assert!(!self.is_full());
        let row = self.count;
        self.entities[row] = entity;
        for column in self.columns.iter_mut() {
            column.changed_ticks[row] = tick;
            column.added_ticks[row] = tick;
        }
        self.count += 1;
        row
    }

    pub(crate) fn set_entity(&mut self, row: usize, entity: Entity) {
        debug_assert!(row < self.count);
        self.entities[row] = entity;
    }

    /// Drop the last live row.
    pub(crate) fn pop_row(&mut self) {
        debug_assert!(self.count > 0);
        self.count -= 1;
        self.entities[self.count] = Entity::NULL;
    }

    /// Overwrite `row` with the contents of this chunk's last row (entity
    /// handle, column bytes, ticks), then drop the last row. Returns the
    /// entity now occupying `row`.
    pub(crate) fn fill_from_last(&mut self, row: usize, sizes: &[usize]) -> Entity {
        let last = self.count - 1;
        debug_assert!(row < last);

        for (column, &size) in self.columns.iter_mut().zip(sizes) {
            column.data.move_row_within(last, row, size);
            column.changed_ticks[row] = column.changed_ticks[last];
            column.added_ticks[row] = column.added_ticks[last];
        }
        let moved = self.entities[last];
        self.entities[row] = moved;
        self.pop_row();
        moved
    }
}
