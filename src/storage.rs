//! Pluggable column storage.
//!
//! Column bytes are owned by a storage backend. The default backend is a
//! contiguous heap buffer with a direct base-pointer fast path that skips
//! dynamic dispatch on the query iteration path; custom backends (embedding
//! language memory, GPU staging buffers) go through the [`StorageBackend`]
//! trait with opaque chunk handles.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Opaque handle to one chunk's worth of storage inside a backend.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StorageHandle(pub u64);

/// External column storage provider.
///
/// One backend instance serves every chunk of every component registered
/// against it; all row indices are < the capacity passed to
/// [`StorageBackend::allocate_chunk`].
pub trait StorageBackend: Send + Sync {
    /// Allocate contiguous storage for `capacity` records of `component_size`
    /// bytes and return an opaque handle to it. The storage must be aligned
    /// for the component type it will hold.
    fn allocate_chunk(&self, component_size: usize, capacity: usize) -> StorageHandle;

    /// Release storage previously returned by `allocate_chunk`.
    fn free_chunk(&self, handle: StorageHandle);

    /// Raw pointer to the record at `row`. Only valid until the next
    /// mutation of the chunk.
    fn get_ptr(&self, handle: StorageHandle, row: usize, size: usize) -> *mut u8;

    /// Overwrite the record at `row` with `data`.
    fn set_data(&self, handle: StorageHandle, row: usize, data: &[u8]);

    /// Copy one record between two chunks of the same component.
    fn copy_data(
        &self,
        src: StorageHandle,
        src_row: usize,
        dst: StorageHandle,
        dst_row: usize,
        size: usize,
    );

    /// Exchange the bytes of two rows within one chunk.
    fn swap_data(&self, handle: StorageHandle, row_a: usize, row_b: usize, size: usize);
}

// Columns hold raw bytes of any registered component type; 16 covers the
// alignment of every primitive and SIMD-friendly struct the byte API admits.
const COLUMN_ALIGN: usize = 16;

/// Default backend: one zeroed heap allocation per column.
pub struct NativeBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl NativeBuffer {
    fn new(component_size: usize, capacity: usize) -> Self {
        let len = component_size * capacity;
        let layout = Layout::from_size_align(len, COLUMN_ALIGN).expect("column layout");
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| std::alloc::handle_alloc_error(layout));
        Self { ptr, len }
    }

    fn row_ptr(&self, row: usize, size: usize) -> *mut u8 {
        debug_assert!(row * size + size <= self.len);
        unsafe { self.ptr.as_ptr().add(row * size) }
    }

    /// Start of the column's contiguous allocation.
    pub fn base_ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.len, COLUMN_ALIGN).expect("column layout");
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

// The buffer is an exclusively owned allocation of plain bytes.
unsafe impl Send for NativeBuffer {}
unsafe impl Sync for NativeBuffer {}

/// Per-column storage capability, chosen at column construction.
pub enum ColumnData {
    /// Contiguous heap buffer; iteration reads the base pointer directly.
    Native(NativeBuffer),
    /// Backend-owned storage reached through the trait.
    External {
        backend: Arc<dyn StorageBackend>,
        handle: StorageHandle,
    },
}

impl ColumnData {
    pub(crate) fn new(
        component_size: usize,
        capacity: usize,
        backend: Option<&Arc<dyn StorageBackend>>,
    ) -> Self {
        match backend {
            None => ColumnData::Native(NativeBuffer::new(component_size, capacity)),
            Some(backend) => {
                let handle = backend.allocate_chunk(component_size, capacity);
                ColumnData::External {
                    backend: Arc::clone(backend),
                    handle,
                }
            }
        }
    }

    /// Base pointer of the native fast path; None for external backends.
    pub fn base_ptr(&self) -> Option<NonNull<u8>> {
        match self {
            ColumnData::Native(buffer) => Some(buffer.base_ptr()),
            ColumnData::External { .. } => None,
        }
    }

    /// Raw pointer to the record at `row`; valid until the next mutation.
    pub fn row_ptr(&self, row: usize, size: usize) -> *mut u8 {
        match self {
            ColumnData::Native(buffer) => buffer.row_ptr(row, size),
            ColumnData::External { backend, handle } => backend.get_ptr(*handle, row, size),
        }
    }

    pub(crate) fn write(&mut self, row: usize, data: &[u8]) {
        match self {
            ColumnData::Native(buffer) => {
                let dst = buffer.row_ptr(row, data.len());
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
            }
            ColumnData::External { backend, handle } => backend.set_data(*handle, row, data),
        }
    }

    /// Borrow the record at `row` as bytes. Valid until the next mutation
    /// of the chunk.
    pub fn read(&self, row: usize, size: usize) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.row_ptr(row, size), size) }
    }

    /// Copy one record from `src` into `dst`. The two columns belong to the
    /// same component, so they share a backend.
    pub(crate) fn copy_row(
        src: &ColumnData,
        src_row: usize,
        dst: &mut ColumnData,
        dst_row: usize,
        size: usize,
    ) {
        match (src, &mut *dst) {
            (ColumnData::Native(s), ColumnData::Native(d)) => {
                let src_ptr = s.row_ptr(src_row, size);
                let dst_ptr = d.row_ptr(dst_row, size);
                unsafe { std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, size) };
            }
            (
                ColumnData::External {
                    backend,
                    handle: src_handle,
                },
                ColumnData::External {
                    handle: dst_handle, ..
                },
            ) => {
                backend.copy_data(*src_handle, src_row, *dst_handle, dst_row, size);
            }
            (src_any, dst_any) => {
                // Mixed pairs cannot arise from registration, but stay correct.
                let bytes = src_any.read(src_row, size).to_vec();
                dst_any.write(dst_row, &bytes);
            }
        }
    }

    /// Move a record within one column (rows are distinct).
    pub(crate) fn move_row_within(&mut self, from: usize, to: usize, size: usize) {
        debug_assert_ne!(from, to);
        match self {
            ColumnData::Native(buffer) => {
                let src = buffer.row_ptr(from, size);
                let dst = buffer.row_ptr(to, size);
                unsafe { std::ptr::copy_nonoverlapping(src, dst, size) };
            }
            ColumnData::External { backend, handle } => {
                backend.copy_data(*handle, from, *handle, to, size);
            }
        }
    }

    pub(crate) fn swap_rows(&mut self, row_a: usize, row_b: usize, size: usize) {
        if row_a == row_b {
            return;
        }
        match self {
            ColumnData::Native(buffer) => unsafe {
                std::ptr::swap_nonoverlapping(
                    buffer.row_ptr(row_a, size),
                    buffer.row_ptr(row_b, size),
                    size,
                );
            },
            ColumnData::External { backend, handle } => {
                backend.swap_data(*handle, row_a, row_b, size);
            }
        }
    }
}

impl Drop for ColumnData {
    fn drop(&mut self) {
        if let ColumnData::External { backend, handle } = self {
            backend.free_chunk(*handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_native_round_trip() {
        let mut column = ColumnData::new(8, 16, None);
        column.write(3, &42u64.to_le_bytes());
        assert_eq!(column.read(3, 8), &42u64.to_le_bytes());
        assert!(column.base_ptr().is_some());
    }

    #[test]
    fn test_copy_and_swap() {
        let mut a = ColumnData::new(4, 8, None);
        let mut b = ColumnData::new(4, 8, None);
        a.write(0, &1u32.to_le_bytes());
        a.write(1, &2u32.to_le_bytes());

        ColumnData::copy_row(&a, 0, &mut b, 5, 4);
        assert_eq!(b.read(5, 4), &1u32.to_le_bytes());

        a.swap_rows(0, 1, 4);
        assert_eq!(a.read(0, 4), &2u32.to_le_bytes());
        assert_eq!(a.read(1, 4), &1u32.to_le_bytes());
    }

    /// Minimal external backend used to prove the trait path works.
    struct VecBackend {
        chunks: Mutex<Vec<Box<[u8]>>>,
    }

    impl VecBackend {
        fn new() -> Self {
            Self {
                chunks: Mutex::new(Vec::new()),
            }
        }

        fn ptr(&self, handle: StorageHandle, offset: usize) -> *mut u8 {
            let mut chunks = self.chunks.lock().unwrap();
            unsafe { chunks[handle.0 as usize].as_mut_ptr().add(offset) }
        }
    }

    impl StorageBackend for VecBackend {
        fn allocate_chunk(&self, component_size: usize, capacity: usize) -> StorageHandle {
            let mut chunks = self.chunks.lock().unwrap();
            chunks.push(vec![0u8; component_size * capacity].into_boxed_slice());
            StorageHandle(chunks.len() as u64 - 1)
        }

        fn free_chunk(&self, _handle: StorageHandle) {}

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
    fn test_external_backend_round_trip() {
        let backend: Arc<dyn StorageBackend> = Arc::new(VecBackend::new());
        let mut column = ColumnData::new(4, 8, Some(&backend));
        assert!(column.base_ptr().is_none());

        column.write(2, &7u32.to_le_bytes());
        assert_eq!(column.read(2, 4), &7u32.to_le_bytes());

        column.swap_rows(2, 3, 4);
        assert_eq!(column.read(3, 4), &7u32.to_le_bytes());
    }
}
