//! A small app: stages, labelled systems, commands, events, states.

use chunked_ecs::prelude::*;

const RUNNING: u32 = 0;
const DONE: u32 = 1;

fn main() {
    let mut app = App::new(Threading::Single);
    let position = app.world.register_component("Position", 8);
    let velocity = app.world.register_component("Velocity", 8);
    let finished = app.add_event_type("Finished", 4);

    app.add_state("sim", RUNNING);

    // Seed entities during Startup via commands.
    app.add_system(move |ctx| {
        for index in 0..4 {
            ctx.commands
                .spawn(ctx.world)
                .insert_value(position, &[0.0f32, 0.0])
                .insert_value(velocity, &[1.0f32 + index as f32, 0.0]);
        }
    })
    .in_stage(stage::STARTUP)
    .build();

    app.add_system(move |ctx| {
        let mut movers = Query::new().with(position).with(velocity);
        for chunk in movers.iter(ctx.world) {
            let velocities: &[[f32; 2]] = chunk.column_slice(velocity).unwrap();
            let positions = unsafe { chunk.column_slice_mut::<[f32; 2]>(position).unwrap() };
            for (p, v) in positions.iter_mut().zip(velocities) {
                p[0] += v[0];
            }
        }
    })
    .label("integrate")
    .run_if_state("sim", RUNNING)
    .build();

    app.add_system(move |ctx| {
        let mut done = 0u32;
        let mut movers = Query::new().with(position);
        for chunk in movers.iter(ctx.world) {
            let positions: &[[f32; 2]] = chunk.column_slice(position).unwrap();
            done += positions.iter().filter(|p| p[0] >= 10.0).count() as u32;
        }
        if done > 0 {
            ctx.events.send_value(finished, &done).unwrap();
            ctx.states.set("sim", DONE).unwrap();
        }
    })
    .after("integrate")
    .build();

    app.add_system_on_enter("sim", DONE, |_ctx| {
        println!("simulation finished");
    });

    for frame in 0..12 {
        app.update();
        app.read_events_value::<u32, _>(finished, |count| {
            println!("frame {frame}: {count} entities crossed the line");
        });
        if app.get_state("sim") == Some(DONE) {
            break;
        }
    }
}
