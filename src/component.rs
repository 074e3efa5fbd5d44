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

//! Component identifiers and the world-local component registry.
//!
//! Components are registered at runtime with a name, a byte size, and an
//! optional storage backend. A size of zero declares a tag: pure archetype
//! membership with no per-entity data.

use std::sync::Arc;

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::storage::StorageBackend;
use crate::MAX_COMPONENTS;

/// Maximum byte length of a component name.
pub const MAX_COMPONENT_NAME: usize = 63;

/// World-local component type identifier.
///
/// Ids are drawn from a monotonically increasing sequence starting at 1;
/// 0 is reserved and never handed out.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Registered component record.
pub struct ComponentInfo {
    pub id: ComponentId,
    name: String,
    pub size: usize,
    /// None selects the default contiguous heap backend.
    pub storage: Option<Arc<dyn StorageBackend>>,
}

impl ComponentInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags are zero-sized: membership only, no column.
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

/// Lightweight per-archetype view of a component: id + size.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ComponentDesc {
    pub id: ComponentId,
    pub size: usize,
}

impl ComponentDesc {
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

/// Dense append-only registry with side maps for O(1) id and name lookup.
///
/// Re-registering an already-known name is not defended against; callers
/// own that contract.
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_id: FxHashMap<ComponentId, usize>,
    by_name: AHashMap<String, ComponentId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            infos: Vec::with_capacity(MAX_COMPONENTS),
            by_id: FxHashMap::default(),
            by_name: AHashMap::new(),
        }
    }

    /// Register a component with the default storage backend.
    pub fn register(&mut self, name: &str, size: usize) -> ComponentId {
        self.register_with_backend(name, size, None)
    }

    /// Register a component with an explicit storage backend.
    ///
    /// The backend choice is captured here and is therefore uniform across
    /// every chunk that ever holds this component.
    pub fn register_with_backend(
        &mut self,
        name: &str,
        size: usize,
        storage: Option<Arc<dyn StorageBackend>>,
    ) -> ComponentId {
        let id = ComponentId(self.infos.len() as u32 + 1);
        let name = truncate_name(name);

        let index = self.infos.len();
        self.infos.push(ComponentInfo {
            id,
            name: name.clone(),
            size,
            storage,
        });
        self.by_id.insert(id, index);
        self.by_name.insert(name, id);
        id
    }

    /// Look up a component id by name.
    pub fn id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        let index = *self.by_id.get(&id)?;
        self.infos.get(index)
    }

    pub fn desc(&self, id: ComponentId) -> Option<ComponentDesc> {
        self.info(id).map(|info| ComponentDesc {
            id: info.id,
            size: info.size,
        })
    }

    pub fn backend(&self, id: ComponentId) -> Option<&Arc<dyn StorageBackend>> {
        self.info(id).and_then(|info| info.storage.as_ref())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_COMPONENT_NAME {
        return name.to_string();
    }
    let mut end = MAX_COMPONENT_NAME;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
