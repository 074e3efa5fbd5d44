//! Pluggable storage backends driven through the public registration API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chunked_ecs::prelude::*;
use chunked_ecs::{StorageBackend, StorageHandle};

/// Heap-table backend standing in for embedding-language memory. Tracks
/// allocation traffic so the tests can assert the trait is actually used.
/// Chunks are u64-backed to keep record pointers aligned.
struct TrackingBackend {
    chunks: Mutex<Vec<Box<[u64]>>>,
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl TrackingBackend {
    fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            allocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    fn ptr(&self, handle: StorageHandle, offset: usize) -> *mut u8 {
        let mut chunks = self.chunks.lock().unwrap();
        unsafe { (chunks[handle.0 as usize].as_mut_ptr() as *mut u8).add(offset) }
    }
}

impl StorageBackend for TrackingBackend {
    fn allocate_chunk(&self, component_size: usize, capacity: usize) -> StorageHandle {
        self.allocs.fetch_add(1, Ordering::SeqCst);
        let mut chunks = self.chunks.lock().unwrap();
        let words = (component_size * capacity).div_ceil(8);
        chunks.push(vec![0u64; words].into_boxed_slice());
        StorageHandle(chunks.len() as u64 - 1)
    }

    fn free_chunk(&self, _handle: StorageHandle) {
        self.frees.fetch_add(1, Ordering::SeqCst);
    }

    fn get_ptr(&self, handle: StorageHandle, row: usize, size: usize) -> *mut u8 {
        self.ptr(handle, row * size)
    }

    fn set_data(&self, handle: StorageHandle, row: usize, data: &[u8]) {
        let dst = self.ptr(handle, row * data.len());
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
    }

    fn copy_data(
        &self,
        src: StorageHandle,
        src_row: usize,
        dst: StorageHandle,
        dst_row: usize,
        size: usize,
    ) {
        let src_ptr = self.ptr(src, src_row * size);
        let dst_ptr = self.ptr(dst, dst_row * size);
        unsafe { std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, size) };
    }

    fn swap_data(&self, handle: StorageHandle, row_a: usize, row_b: usize, size: usize) {
        unsafe {
            std::ptr::swap_nonoverlapping(
                self.ptr(handle, row_a * size),
                self.ptr(handle, row_b * size),
                size,
            );
        }
    }
}

#[test]
fn external_backend_round_trips_through_world() {
    let backend = Arc::new(TrackingBackend::new());
    let mut world = World::new();
    let position =
        world.register_component_with_backend("Position", 8, Arc::clone(&backend) as _);

    let entity = world.spawn();
    world.set_value(entity, position, &[4.0f32, 5.0]);
    assert_eq!(
        world.get_value::<[f32; 2]>(entity, position),
        Some(&[4.0, 5.0])
    );
    assert!(backend.allocs.load(Ordering::SeqCst) >= 1);
}

#[test]
fn external_columns_survive_transitions() {
    let backend = Arc::new(TrackingBackend::new());
    let mut world = World::new();
    let position =
        world.register_component_with_backend("Position", 8, Arc::clone(&backend) as _);
    let health = world.register_component("Health", 4);

    let entity = world.spawn();
    world.set_value(entity, position, &[1.0f32, 2.0]);
    // Native and external columns mix within one archetype.
    world.set_value(entity, health, &50u32);

    assert_eq!(
        world.get_value::<[f32; 2]>(entity, position),
        Some(&[1.0, 2.0])
    );
    assert_eq!(world.get_value::<u32>(entity, health), Some(&50));
}

#[test]
fn iteration_falls_back_to_column_data_for_external_storage() {
    let backend = Arc::new(TrackingBackend::new());
    let mut world = World::new();
    let position =
        world.register_component_with_backend("Position", 8, Arc::clone(&backend) as _);

    for index in 0..3 {
        let entity = world.spawn();
        world.set_value(entity, position, &[index as f32, 0.0]);
    }

    let mut query = Query::new().with(position);
    let mut seen = Vec::new();
    for chunk in query.iter(&world) {
        // No base-pointer fast path for external storage.
        assert!(chunk.column(position).is_none());
        let data = chunk.column_data(position).unwrap();
        for row in 0..chunk.count() {
            let bytes = data.read(row, 8);
            let values: &[f32; 2] = bytemuck::from_bytes(bytes);
            seen.push(values[0]);
        }
    }
    seen.sort_by(f32::total_cmp);
    assert_eq!(seen, vec![0.0, 1.0, 2.0]);
}

#[test]
fn eviction_frees_backend_chunks() {
    let backend = Arc::new(TrackingBackend::new());
    let mut world = World::new();
    let position =
        world.register_component_with_backend("Position", 8, Arc::clone(&backend) as _);

    let entity = world.spawn();
    world.set_value(entity, position, &[0.0f32, 0.0]);
    world.despawn(entity);
    world.remove_empty_archetypes();

    assert_eq!(
        backend.allocs.load(Ordering::SeqCst),
        backend.frees.load(Ordering::SeqCst)
    );
}
