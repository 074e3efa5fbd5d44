//! Deferred command buffers and the world's deferred bracket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chunked_ecs::prelude::*;

#[test]
fn spawned_entity_invisible_to_queries_until_apply() {
    let mut app = App::default();
    let position = app.world.register_component("Position", 8);
    let velocity = app.world.register_component("Velocity", 8);

    let mid_frame_count = Arc::new(AtomicUsize::new(usize::MAX));
    let mid_in = Arc::clone(&mid_frame_count);

    app.add_system(move |ctx| {
        ctx.commands
            .spawn(ctx.world)
            .insert_value(position, &[1.0f32, 1.0])
            .insert_value(velocity, &[2.0f32, 2.0]);

        let mut query = Query::new().with(position).with(velocity);
        mid_in.store(query.count(ctx.world), Ordering::SeqCst);
    })
    .build();

    app.update();

    assert_eq!(mid_frame_count.load(Ordering::SeqCst), 0);
    let mut query = Query::new().with(position).with(velocity);
    assert_eq!(query.count(&app.world), 1);

    // Both inserts landed in one archetype.
    for chunk in query.iter(&app.world) {
        assert!(chunk.column(position).is_some());
        assert!(chunk.column(velocity).is_some());
    }
}

#[test]
fn commands_apply_in_insertion_order() {
    let mut app = App::default();
    let health = app.world.register_component("Health", 4);
    let entity = app.world.spawn();

    app.add_system(move |ctx| {
        ctx.commands.insert_value(entity, health, &1u32);
        ctx.commands.insert_value(entity, health, &2u32);
        ctx.commands.remove(entity, health);
        ctx.commands.insert_value(entity, health, &3u32);
    })
    .build();

    app.update();
    assert_eq!(app.world.get_value::<u32>(entity, health), Some(&3));
}

#[test]
fn deferred_despawn_applies_at_boundary() {
    let mut app = App::default();
    let doomed = app.world.spawn();
    let alive_during = Arc::new(AtomicUsize::new(0));
    let alive_in = Arc::clone(&alive_during);

    app.add_system(move |ctx| {
        ctx.commands.despawn(doomed);
        alive_in.store(ctx.world.exists(doomed) as usize, Ordering::SeqCst);
    })
    .build();

    app.update();
    assert_eq!(alive_during.load(Ordering::SeqCst), 1);
    assert!(!app.world.exists(doomed));
}

#[test]
fn observers_fire_after_batch_lands() {
    let mut world = World::new();
    let position = world.register_component("Position", 8);

    // Record what the observer saw: the component must already be readable.
    let seen: Arc<Mutex<Vec<[f32; 2]>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    world.add_observer(TriggerKind::OnAdd, Some(position), move |world, trigger| {
        if let Some(value) = world.get_value::<[f32; 2]>(trigger.entity, position) {
            seen_in.lock().unwrap().push(*value);
        }
    });

    let mut commands = Commands::new();
    let mut events = chunked_ecs::Events::new();
    let a = commands.spawn(&mut world).insert_value(position, &[1.0f32, 2.0]).id();
    let b = commands.spawn(&mut world).insert_value(position, &[3.0f32, 4.0]).id();
    commands.apply(&mut world, &mut events);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&[1.0, 2.0]));
    assert!(seen.contains(&[3.0, 4.0]));
    assert!(world.exists(a) && world.exists(b));
}

#[test]
fn command_sent_events_arrive_next_frame() {
    let mut app = App::default();
    let scored = app.add_event_type("Scored", 4);

    app.add_system(move |ctx| {
        ctx.commands.send_event_value(scored, &5u32);
    })
    .build();

    app.update();
    let mut seen = Vec::new();
    app.read_events_value::<u32, _>(scored, |value| seen.push(*value));
    assert_eq!(seen, vec![5]);
}

#[test]
fn resource_commands_replace_value() {
    #[derive(Debug, PartialEq)]
    struct Score(u32);

    let mut app = App::default();
    app.insert_resource(Score(0));

    app.add_system(|ctx| {
        ctx.commands.insert_resource(Score(10));
    })
    .build();

    app.update();
    assert_eq!(app.resource::<Score>(), Some(&Score(10)));
}
