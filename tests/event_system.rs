//! Double-buffered event delivery through the app frame loop.

use chunked_ecs::prelude::*;

#[test]
fn events_live_exactly_one_frame() {
    let mut app = App::default();
    let event_x = app.add_event_type("EventX", 4);

    app.send_event_value(event_x, &1u32).unwrap();
    app.update();

    let mut first_frame = Vec::new();
    app.read_events_value::<u32, _>(event_x, |value| first_frame.push(*value));
    assert_eq!(first_frame, vec![1]);

    app.update();
    let mut second_frame = Vec::new();
    app.read_events_value::<u32, _>(event_x, |value| second_frame.push(*value));
    assert!(second_frame.is_empty());
}

#[test]
fn resending_extends_lifetime() {
    let mut app = App::default();
    let heartbeat = app.add_event_type("Heartbeat", 4);

    app.send_event_value(heartbeat, &1u32).unwrap();
    app.update();

    // Reader systems can re-send to keep an event alive another frame.
    let mut carried = Vec::new();
    app.read_events_value::<u32, _>(heartbeat, |value| carried.push(*value));
    for value in &carried {
        app.send_event_value(heartbeat, value).unwrap();
    }
    app.update();

    let mut second = Vec::new();
    app.read_events_value::<u32, _>(heartbeat, |value| second.push(*value));
    assert_eq!(second, vec![1]);
}

#[test]
fn multiple_channels_are_independent() {
    let mut app = App::default();
    let damage = app.add_event_type("Damage", 4);
    let heal = app.add_event_type("Heal", 4);

    app.send_event_value(damage, &3u32).unwrap();
    app.update();

    assert_eq!(app.events().len(damage), 1);
    assert_eq!(app.events().len(heal), 0);
}

#[test]
fn systems_read_previous_frame_and_send_next() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let mut app = App::default();
    let tick_event = app.add_event_type("TickEvent", 8);

    let received = Arc::new(AtomicUsize::new(0));
    let received_in = Arc::clone(&received);
    app.add_system(move |ctx| {
        let mut count = 0;
        ctx.events.read_values::<u64, _>(tick_event, |_| count += 1);
        received_in.fetch_add(count, Ordering::SeqCst);
        ctx.events.send_value(tick_event, &0u64).unwrap();
    })
    .build();

    // Frame 1: nothing to read, one sent. Frame 2: reads frame 1's send.
    app.update();
    assert_eq!(received.load(Ordering::SeqCst), 0);
    app.update();
    assert_eq!(received.load(Ordering::SeqCst), 1);
}
