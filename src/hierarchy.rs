//! Parent/child relationships.
//!
//! `Parent` and `Children` are ordinary components, but the child lists
//! themselves live in a world-side table keyed by parent; the `Children`
//! component is a mirror carrying the list length so queries can see
//! membership. The dedicated operations here keep both directions
//! consistent: every entity whose `Parent` is `p` appears exactly once in
//! `p`'s list, the relation stays a forest, and upward walks are bounded.

use bytemuck::{Pod, Zeroable};

use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::world::World;

/// Upper bound on ancestor walks; deeper chains are treated as broken.
pub const MAX_HIERARCHY_DEPTH: usize = 256;

/// Query-visible mirror of a parent's child list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ChildrenMirror {
    pub count: u32,
    pad: u32,
}

impl ChildrenMirror {
    pub fn new(count: u32) -> Self {
        Self { count, pad: 0 }
    }
}

impl World {
    /// Make `child` a child of `parent`.
    ///
    /// Self-attachment and cycles are refused. A child that already has a
    /// parent is detached from it first.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> Result<()> {
        if !self.exists(parent) || !self.exists(child) {
            return Err(EcsError::EntityNotFound);
        }
        if parent == child {
            return Err(EcsError::HierarchyError(
                "cannot parent an entity to itself".into(),
            ));
        }
        if self.is_ancestor_of(child, parent) {
            return Err(EcsError::CycleAttempted);
        }

        if let Some(old_parent) = self.parent_of(child) {
            if old_parent == parent {
                return Ok(());
            }
            self.detach_child_now(old_parent, child);
        }

        let parent_id = self.parent_component_id();
        self.set_now(child, parent_id, bytemuck::bytes_of(&parent));

        let list = self.children_table.entry(parent).or_default();
        list.push(child);
        let count = list.len() as u32;
        self.write_children_mirror(parent, count);
        Ok(())
    }

    /// Break the `parent`/`child` link. Errors if no such link exists.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> Result<()> {
        if !self.exists(parent) || !self.exists(child) {
            return Err(EcsError::EntityNotFound);
        }
        if self.parent_of(child) != Some(parent) {
            return Err(EcsError::HierarchyError(
                "entity is not a child of that parent".into(),
            ));
        }

        let parent_id = self.parent_component_id();
        self.unset_now(child, parent_id);
        self.detach_child_now(parent, child);
        Ok(())
    }

    /// Clear every child's `Parent` and drop the parent's list.
    pub fn remove_all_children(&mut self, parent: Entity) -> Result<()> {
        if !self.exists(parent) {
            return Err(EcsError::EntityNotFound);
        }
        let Some(children) = self.children_table.remove(&parent) else {
            return Ok(());
        };

        let parent_id = self.parent_component_id();
        for child in children {
            self.unset_now(child, parent_id);
        }
        let children_id = self.children_component_id();
        self.unset_now(parent, children_id);
        Ok(())
    }

    pub fn parent_of(&self, child: Entity) -> Option<Entity> {
        let parent_id = self.parent_component_id();
        self.get_value::<Entity>(child, parent_id).copied()
    }

    pub fn has_parent(&self, child: Entity) -> bool {
        self.parent_of(child).is_some()
    }

    /// The parent's child list, in attachment order (removal swaps).
    pub fn children_of(&self, parent: Entity) -> Option<&[Entity]> {
        self.children_table.get(&parent).map(Vec::as_slice)
    }

    pub fn child_count(&self, parent: Entity) -> usize {
        self.children_table.get(&parent).map_or(0, Vec::len)
    }

    /// Walk upward from `descendant` looking for `ancestor`.
    pub fn is_ancestor_of(&self, ancestor: Entity, descendant: Entity) -> bool {
        if !self.exists(ancestor) || !self.exists(descendant) {
            return false;
        }
        let mut current = descendant;
        for _ in 0..MAX_HIERARCHY_DEPTH {
            match self.parent_of(current) {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    pub fn is_descendant_of(&self, descendant: Entity, ancestor: Entity) -> bool {
        self.is_ancestor_of(ancestor, descendant)
    }

    /// Number of edges between `entity` and its root.
    pub fn depth(&self, entity: Entity) -> usize {
        if !self.exists(entity) {
            return 0;
        }
        let mut depth = 0;
        let mut current = entity;
        while depth < MAX_HIERARCHY_DEPTH {
            match self.parent_of(current) {
                Some(parent) => {
                    current = parent;
                    depth += 1;
                }
                None => break,
            }
        }
        depth
    }

    /// Visit `parent`'s children in list order, pre-order when recursive.
    pub fn traverse_children<F>(&self, parent: Entity, recursive: bool, visitor: &mut F)
    where
        F: FnMut(Entity),
    {
        let Some(children) = self.children_table.get(&parent) else {
            return;
        };
        // The table owns the lists; clone the slice so the visitor may
        // inspect the world freely.
        let children = children.clone();
        for child in children {
            visitor(child);
            if recursive {
                self.traverse_children(child, true, visitor);
            }
        }
    }

    /// Visit each ancestor of `child`, nearest first.
    pub fn traverse_ancestors<F>(&self, child: Entity, visitor: &mut F)
    where
        F: FnMut(Entity),
    {
        let mut current = child;
        for _ in 0..MAX_HIERARCHY_DEPTH {
            match self.parent_of(current) {
                Some(parent) => {
                    visitor(parent);
                    current = parent;
                }
                None => return,
            }
        }
    }

    /// Remove `child` from `parent`'s list and refresh or drop the mirror.
    /// Leaves the child's own `Parent` component alone.
    pub(crate) fn detach_child_now(&mut self, parent: Entity, child: Entity) {
        let Some(list) = self.children_table.get_mut(&parent) else {
            return;
        };
        let Some(position) = list.iter().position(|&entry| entry == child) else {
            return;
        };
        list.swap_remove(position);
        let count = list.len() as u32;

        if count == 0 {
            self.children_table.remove(&parent);
            let children_id = self.children_component_id();
            self.unset_now(parent, children_id);
        } else {
            self.write_children_mirror(parent, count);
        }
    }

    /// Hierarchy bookkeeping for a dying entity: detach it from its parent
    /// and orphan its children (their `Parent` is cleared, they are not
    /// despawned).
    pub(crate) fn hierarchy_on_despawn(&mut self, entity: Entity) {
        if let Some(parent) = self.parent_of(entity) {
            self.detach_child_now(parent, entity);
        }
        if let Some(children) = self.children_table.remove(&entity) {
            let parent_id = self.parent_component_id();
            for child in children {
                self.unset_now(child, parent_id);
            }
        }
    }

    fn write_children_mirror(&mut self, parent: Entity, count: u32) {
        let children_id = self.children_component_id();
        self.set_now(
            parent,
            children_id,
            bytemuck::bytes_of(&ChildrenMirror::new(count)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_child_links_both_directions() {
        let mut world = World::new();
        let parent = world.spawn();
        let child = world.spawn();

        world.add_child(parent, child).unwrap();
        assert_eq!(world.parent_of(child), Some(parent));
        assert_eq!(world.children_of(parent), Some(&[child][..]));
        assert_eq!(world.child_count(parent), 1);

        let children_id = world.children_component_id();
        let mirror = world.get_value::<ChildrenMirror>(parent, children_id);
        assert_eq!(mirror.map(|m| m.count), Some(1));
    }

    #[test]
    fn test_remove_child_restores_pre_call_state() {
        let mut world = World::new();
        let parent = world.spawn();
        let child = world.spawn();

        world.add_child(parent, child).unwrap();
        world.remove_child(parent, child).unwrap();

        assert_eq!(world.parent_of(child), None);
        assert_eq!(world.children_of(parent), None);
        let children_id = world.children_component_id();
        assert!(!world.has(parent, children_id));
    }

    #[test]
    fn test_cycle_refused() {
        let mut world = World::new();
        let root = world.spawn();
        let child = world.spawn();
        let grandchild = world.spawn();
        world.add_child(root, child).unwrap();
        world.add_child(child, grandchild).unwrap();

        assert_eq!(
            world.add_child(grandchild, root),
            Err(EcsError::CycleAttempted)
        );
        assert!(!world.has_parent(root));
    }

    #[test]
    fn test_self_attach_refused() {
        let mut world = World::new();
        let entity = world.spawn();
        assert!(world.add_child(entity, entity).is_err());
        assert!(!world.has_parent(entity));
    }

    #[test]
    fn test_reparent_detaches_first() {
        let mut world = World::new();
        let first = world.spawn();
        let second = world.spawn();
        let child = world.spawn();

        world.add_child(first, child).unwrap();
        world.add_child(second, child).unwrap();

        assert_eq!(world.parent_of(child), Some(second));
        assert_eq!(world.children_of(first), None);
        assert_eq!(world.children_of(second), Some(&[child][..]));
    }

    #[test]
    fn test_remove_all_children() {
        let mut world = World::new();
        let parent = world.spawn();
        let a = world.spawn();
        let b = world.spawn();
        world.add_child(parent, a).unwrap();
        world.add_child(parent, b).unwrap();

        world.remove_all_children(parent).unwrap();
        assert_eq!(world.child_count(parent), 0);
        assert!(!world.has_parent(a));
        assert!(!world.has_parent(b));
    }

    #[test]
    fn test_depth_and_ancestry() {
        let mut world = World::new();
        let root = world.spawn();
        let mid = world.spawn();
        let leaf = world.spawn();
        world.add_child(root, mid).unwrap();
        world.add_child(mid, leaf).unwrap();

        assert_eq!(world.depth(root), 0);
        assert_eq!(world.depth(leaf), 2);
        assert!(world.is_ancestor_of(root, leaf));
        assert!(world.is_descendant_of(leaf, root));
        assert!(!world.is_ancestor_of(leaf, root));
    }

    #[test]
    fn test_traversal_orders() {
        let mut world = World::new();
        let root = world.spawn();
        let a = world.spawn();
        let b = world.spawn();
        let a1 = world.spawn();
        world.add_child(root, a).unwrap();
        world.add_child(root, b).unwrap();
        world.add_child(a, a1).unwrap();

        let mut preorder = Vec::new();
        world.traverse_children(root, true, &mut |entity| preorder.push(entity));
        assert_eq!(preorder, vec![a, a1, b]);

        let mut ancestors = Vec::new();
        world.traverse_ancestors(a1, &mut |entity| ancestors.push(entity));
        assert_eq!(ancestors, vec![a, root]);
    }

    #[test]
    fn test_despawn_orphans_children() {
        let mut world = World::new();
        let parent = world.spawn();
        let child = world.spawn();
        world.add_child(parent, child).unwrap();

        world.despawn(parent);
        assert!(world.exists(child));
        assert!(!world.has_parent(child));
    }

    #[test]
    fn test_despawned_child_leaves_parent_list() {
        let mut world = World::new();
        let parent = world.spawn();
        let a = world.spawn();
        let b = world.spawn();
        world.add_child(parent, a).unwrap();
        world.add_child(parent, b).unwrap();

        world.despawn(a);
        assert_eq!(world.child_count(parent), 1);
        assert_eq!(world.children_of(parent), Some(&[b][..]));
    }
}
