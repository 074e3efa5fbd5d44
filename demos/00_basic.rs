//! Minimal tour: register components, spawn, mutate, query.

use chunked_ecs::prelude::*;

fn main() {
    let mut world = World::new();
    let position = world.register_component("Position", 8);
    let velocity = world.register_component("Velocity", 8);

    for index in 0..10 {
        let entity = world.spawn();
        world.set_value(entity, position, &[index as f32, 0.0f32]);
        if index % 2 == 0 {
            world.set_value(entity, velocity, &[1.0f32, 0.5f32]);
        }
    }

    // Integrate velocities into positions, chunk by chunk.
    let mut movers = Query::new().with(position).with(velocity);
    for chunk in movers.iter(&world) {
        let velocities: &[[f32; 2]] = chunk.column_slice(velocity).unwrap();
        // Columns of the current chunk may be written during iteration.
        let positions = unsafe { chunk.column_slice_mut::<[f32; 2]>(position).unwrap() };
        for (p, v) in positions.iter_mut().zip(velocities) {
            p[0] += v[0];
            p[1] += v[1];
        }
    }

    let mut still = Query::new().with(position).without(velocity);
    println!("movers:   {}", movers.count(&world));
    println!("standing: {}", still.count(&world));
}
