//! Change detection: the query exposes tick arrays, the caller filters.

use chunked_ecs::prelude::*;

fn main() {
    let mut world = World::new();
    let health = world.register_component("Health", 4);

    let entities: Vec<Entity> = (0..5)
        .map(|index| {
            let entity = world.spawn();
            world.set_value(entity, health, &(100u32 + index));
            entity
        })
        .collect();

    // A frame passes; two entities take damage.
    world.update();
    *world.get_value_mut::<u32>(entities[1], health).unwrap() -= 30;
    *world.get_value_mut::<u32>(entities[3], health).unwrap() -= 55;

    let mut damaged = Query::new().with(health).changed(health);
    for chunk in damaged.iter(&world) {
        let ticks = chunk.changed_ticks(health).unwrap();
        let values: &[u32] = chunk.column_slice(health).unwrap();
        for (row, entity) in chunk.entities().iter().enumerate() {
            if ticks[row] == world.tick() {
                println!("{entity:?} changed this frame: health={}", values[row]);
            }
        }
    }
}
