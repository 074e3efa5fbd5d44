use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chunked_ecs::prelude::*;

fn spawn_with_components(count: usize) -> (World, ComponentId, ComponentId) {
    let mut world = World::new();
    let position = world.register_component("Position", 8);
    let velocity = world.register_component("Velocity", 8);
    for index in 0..count {
        let entity = world.spawn();
        world.set_value(entity, position, &[index as f32, 0.0]);
        world.set_value(entity, velocity, &[1.0f32, 1.0]);
    }
    (world, position, velocity)
}

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("spawn_10k_two_components", |b| {
        b.iter(|| {
            let (world, _, _) = spawn_with_components(10_000);
            black_box(world.entity_count())
        });
    });
}

fn bench_iteration(c: &mut Criterion) {
    let (world, position, velocity) = spawn_with_components(100_000);

    c.bench_function("iterate_100k_integrate", |b| {
        let mut query = Query::new().with(position).with(velocity);
        b.iter(|| {
            let mut sum = 0.0f32;
            for chunk in query.iter(&world) {
                let positions: &[[f32; 2]] = chunk.column_slice(position).unwrap();
                let velocities: &[[f32; 2]] = chunk.column_slice(velocity).unwrap();
                for (p, v) in positions.iter().zip(velocities) {
                    sum += p[0] + v[0];
                }
            }
            black_box(sum)
        });
    });
}

fn bench_transitions(c: &mut Criterion) {
    c.bench_function("add_remove_component_1k", |b| {
        let mut world = World::new();
        let position = world.register_component("Position", 8);
        let flag = world.register_component("Flag", 0);
        let entities: Vec<Entity> = (0..1_000)
            .map(|_| {
                let entity = world.spawn();
                world.set_value(entity, position, &[0.0f32, 0.0]);
                entity
            })
            .collect();

        b.iter(|| {
            for &entity in &entities {
                world.add_tag(entity, flag);
            }
            for &entity in &entities {
                world.unset(entity, flag);
            }
        });
    });
}

fn bench_query_count(c: &mut Criterion) {
    let (world, position, _) = spawn_with_components(100_000);
    c.bench_function("query_count_100k", |b| {
        let mut query = Query::new().with(position);
        b.iter(|| black_box(query.count(&world)));
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_iteration,
    bench_transitions,
    bench_query_count
);
criterion_main!(benches);
