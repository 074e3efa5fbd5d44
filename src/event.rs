//! Double-buffered event channels.
//!
//! Each registered event type owns a read buffer (what systems see this
//! frame) and a write buffer (accumulating for the next). The end-of-frame
//! swap promotes write to read and empties the new write buffer, so an
//! event lives exactly one frame unless it is sent again. Delivery is a
//! callback per event in send order; there is no back-pressure.

use ahash::AHashMap;
use bytemuck::Pod;

use crate::error::{EcsError, Result};

/// Identifier of a registered event type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventTypeId(u32);

struct EventChannel {
    name: String,
    element_size: usize,
    read: Vec<u8>,
    read_count: usize,
    write: Vec<u8>,
    write_count: usize,
}

/// Registry of event types and their channels.
pub struct Events {
    channels: Vec<EventChannel>,
    by_name: AHashMap<String, EventTypeId>,
}

impl Events {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            by_name: AHashMap::new(),
        }
    }

    /// Register an event type by name and payload size. Registering an
    /// existing name returns the original id.
    pub fn register(&mut self, name: &str, element_size: usize) -> EventTypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = EventTypeId(self.channels.len() as u32);
        self.channels.push(EventChannel {
            name: name.to_string(),
            element_size,
            read: Vec::new(),
            read_count: 0,
            write: Vec::new(),
            write_count: 0,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_by_name(&self, name: &str) -> Option<EventTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: EventTypeId) -> Option<&str> {
        self.channels.get(id.0 as usize).map(|c| c.name.as_str())
    }

    /// Append an event to the write buffer; visible to readers after the
    /// next buffer swap.
    pub fn send(&mut self, id: EventTypeId, bytes: &[u8]) -> Result<()> {
        let channel = self
            .channels
            .get_mut(id.0 as usize)
            .ok_or(EcsError::UnknownEventType)?;
        if bytes.len() != channel.element_size {
            return Err(EcsError::CommandError(format!(
                "event `{}` expects {} bytes, got {}",
                channel.name,
                channel.element_size,
                bytes.len()
            )));
        }
        channel.write.extend_from_slice(bytes);
        channel.write_count += 1;
        Ok(())
    }

    pub fn send_value<T: Pod>(&mut self, id: EventTypeId, value: &T) -> Result<()> {
        self.send(id, bytemuck::bytes_of(value))
    }

    /// Deliver this frame's events in send order.
    pub fn read<F>(&self, id: EventTypeId, mut callback: F)
    where
        F: FnMut(&[u8]),
    {
        let Some(channel) = self.channels.get(id.0 as usize) else {
            return;
        };
        for index in 0..channel.read_count {
            let start = index * channel.element_size;
            callback(&channel.read[start..start + channel.element_size]);
        }
    }

    pub fn read_values<T: Pod, F>(&self, id: EventTypeId, mut callback: F)
    where
        F: FnMut(&T),
    {
        self.read(id, |bytes| {
            if bytes.len() == std::mem::size_of::<T>() {
                callback(bytemuck::from_bytes(bytes));
            }
        });
    }

    /// Number of events readable this frame.
    pub fn len(&self, id: EventTypeId) -> usize {
        self.channels.get(id.0 as usize).map_or(0, |c| c.read_count)
    }

    pub fn is_empty(&self, id: EventTypeId) -> bool {
        self.len(id) == 0
    }

    /// Promote write buffers to read buffers and truncate the new write
    /// buffers. Runs at the end of every frame.
    pub fn swap_buffers(&mut self) {
        for channel in self.channels.iter_mut() {
            std::mem::swap(&mut channel.read, &mut channel.write);
            channel.read_count = channel.write_count;
            channel.write.clear();
            channel.write_count = 0;
        }
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_live_one_frame() {
        let mut events = Events::new();
        let hit = events.register("Hit", 4);

        events.send_value(hit, &7u32).unwrap();
        assert_eq!(events.len(hit), 0);

        events.swap_buffers();
        let mut seen = Vec::new();
        events.read_values::<u32, _>(hit, |value| seen.push(*value));
        assert_eq!(seen, vec![7]);

        events.swap_buffers();
        assert_eq!(events.len(hit), 0);
    }

    #[test]
    fn test_delivery_preserves_send_order() {
        let mut events = Events::new();
        let hit = events.register("Hit", 4);
        for value in [3u32, 1, 2] {
            events.send_value(hit, &value).unwrap();
        }
        events.swap_buffers();

        let mut seen = Vec::new();
        events.read_values::<u32, _>(hit, |value| seen.push(*value));
        assert_eq!(seen, vec![3, 1, 2]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let mut events = Events::new();
        let hit = events.register("Hit", 4);
        assert!(events.send(hit, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_reregistration_returns_same_id() {
        let mut events = Events::new();
        let a = events.register("Hit", 4);
        let b = events.register("Hit", 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_sized_events_count() {
        let mut events = Events::new();
        let ping = events.register("Ping", 0);
        events.send(ping, &[]).unwrap();
        events.send(ping, &[]).unwrap();
        events.swap_buffers();

        let mut count = 0;
        events.read(ping, |bytes| {
            assert!(bytes.is_empty());
            count += 1;
        });
        assert_eq!(count, 2);
    }
}
