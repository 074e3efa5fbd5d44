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

//! Chunked archetype ECS with a staged scheduler.
//!
//! Entities live in archetypes keyed by their component set; each archetype
//! stores rows in fixed-capacity columnar chunks with per-row change ticks.
//! Components are registered at runtime by name and byte size, so the store
//! is schema-extensible without recompilation. On top sits an [`App`] with
//! ordered stages, labelled system dependencies, per-system command
//! buffers, double-buffered events, lifecycle observers, and state
//! machines.

pub mod app;
pub mod archetype;
pub mod chunk;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod observer;
pub mod prelude;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod query;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod system;
pub mod world;

/// Rows per chunk. Power of two.
pub const CHUNK_CAPACITY: usize = 4096;

/// Preallocated component registry slots.
pub const MAX_COMPONENTS: usize = 1024;

/// Maximum terms per query.
pub const MAX_QUERY_TERMS: usize = 16;

/// Starting capacity of the world's archetype table.
pub const INITIAL_ARCHETYPE_CAPACITY: usize = 32;

// Re-exports for convenience
pub use app::{App, SystemBuilder, Threading};
pub use archetype::Archetype;
pub use chunk::{Chunk, Column, Tick};
pub use command::{Commands, EntityCommands};
pub use component::{ComponentId, ComponentInfo, ComponentRegistry};
pub use entity::{Entity, EntityLocation};
pub use error::{EcsError, Result};
pub use event::{Events, EventTypeId};
pub use hierarchy::{ChildrenMirror, MAX_HIERARCHY_DEPTH};
pub use observer::{Observer, Trigger, TriggerKind};
pub use query::{ChunkView, Query, QueryIter, Term, TermOp};
pub use schedule::{stage, Schedule, Stage};
pub use state::States;
pub use storage::{ColumnData, StorageBackend, StorageHandle};
pub use system::{RunCondition, SystemCtx, SystemDesc, SystemFn};
pub use world::World;
