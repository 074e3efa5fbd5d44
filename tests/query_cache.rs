//! Query match caching against the structural-change version.

use chunked_ecs::prelude::*;

#[test]
fn build_is_deterministic_without_mutation() {
    let mut world = World::new();
    let position = world.register_component("Position", 8);
    let velocity = world.register_component("Velocity", 8);

    for index in 0..6 {
        let entity = world.spawn();
        world.set_value(entity, position, &[index as f32, 0.0]);
        if index % 2 == 0 {
            world.set_value(entity, velocity, &[1.0f32, 0.0]);
        }
    }

    let mut query = Query::new().with(position);
    query.build(&world);
    let first = query.matched_archetypes().to_vec();
    query.build(&world);
    assert_eq!(first, query.matched_archetypes());
}

#[test]
fn new_archetypes_appear_on_next_iteration() {
    let mut world = World::new();
    let position = world.register_component("Position", 8);
    let velocity = world.register_component("Velocity", 8);

    let mut query = Query::new().with(position);
    assert_eq!(query.count(&world), 0);

    let plain = world.spawn();
    world.set_value(plain, position, &[0.0f32, 0.0]);
    assert_eq!(query.count(&world), 1);

    let moving = world.spawn();
    world.set_value(moving, position, &[0.0f32, 0.0]);
    world.set_value(moving, velocity, &[1.0f32, 0.0]);

    // Two archetypes now match.
    let total: usize = query.iter(&world).map(|chunk| chunk.count()).sum();
    assert_eq!(total, 2);
    assert_eq!(query.matched_archetypes().len(), 2);
}

#[test]
fn eviction_invalidates_cached_matches() {
    let mut world = World::new();
    let position = world.register_component("Position", 8);
    let velocity = world.register_component("Velocity", 8);

    let entity = world.spawn();
    world.set_value(entity, position, &[0.0f32, 0.0]);
    world.set_value(entity, velocity, &[0.0f32, 0.0]);

    let mut query = Query::new().with(position);
    assert_eq!(query.count(&world), 1);
    let matched_before = query.matched_archetypes().len();

    // Moving the entity out leaves its old archetype empty; eviction then
    // removes it and the query rebuilds cleanly.
    world.unset(entity, velocity);
    world.remove_empty_archetypes();

    assert_eq!(query.count(&world), 1);
    assert!(query.matched_archetypes().len() <= matched_before + 1);
    let total: usize = query.iter(&world).map(|chunk| chunk.count()).sum();
    assert_eq!(total, 1);
}

#[test]
fn optional_terms_never_filter_archetypes() {
    let mut world = World::new();
    let position = world.register_component("Position", 8);
    let velocity = world.register_component("Velocity", 8);

    let bare = world.spawn();
    world.set_value(bare, position, &[1.0f32, 0.0]);
    let full = world.spawn();
    world.set_value(full, position, &[2.0f32, 0.0]);
    world.set_value(full, velocity, &[3.0f32, 0.0]);

    let mut query = Query::new().with(position).optional(velocity);
    let mut rows = 0;
    for chunk in query.iter(&world) {
        rows += chunk.count();
        match chunk.column_slice::<[f32; 2]>(velocity) {
            Some(velocities) => assert_eq!(velocities.len(), chunk.count()),
            None => assert!(chunk.column(velocity).is_none()),
        }
    }
    assert_eq!(rows, 2);
}

#[test]
fn term_capacity_is_bounded() {
    let mut world = World::new();
    let ids: Vec<_> = (0..20)
        .map(|index| world.register_component(&format!("C{index}"), 4))
        .collect();

    // Terms beyond the cap are ignored rather than growing unbounded.
    let mut query = ids
        .iter()
        .fold(Query::new(), |query, &id| query.optional(id));
    assert!(query.terms().len() <= chunked_ecs::MAX_QUERY_TERMS);
    query.build(&world);
}
