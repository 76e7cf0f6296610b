//! Typed, persistently mapped upload buffers.
//!
//! An [`UploadBuffer`] is a fixed-capacity array of POD entries living in
//! CPU-writable, GPU-readable memory. Entries are addressed by index; the
//! GPU reads entry `i` at `base_address + i * stride`.
//!
//! Writes are plain memory copies with no synchronization of their own. The
//! frame manager guarantees the owning frame slot is not in flight before
//! the update step writes into it.
//!
//! # Example
//!
//! ```
//! use pbr_renderer::UploadBuffer;
//! use pbr_resources::ObjectConstants;
//! use pbr_rhi::headless::HeadlessGpu;
//!
//! let gpu = HeadlessGpu::new();
//! let mut objects =
//!     UploadBuffer::<ObjectConstants, _>::new(&gpu, 4, true, "objects").unwrap();
//! assert_eq!(objects.stride(), 256);
//!
//! objects.write(2, &ObjectConstants::default());
//! assert_eq!(objects.device_address(2), objects.base_address() + 512);
//! ```

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;
use tracing::debug;

use pbr_rhi::{Backend, HostVisibleBuffer, RhiResult};

/// Constant buffer entries start on this byte boundary.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Fixed-capacity array of `T` in mapped upload memory.
///
/// Dropping the buffer drops the backing memory, which unmaps it before the
/// GPU resource is released.
#[derive(Debug)]
pub struct UploadBuffer<T: Pod, M: HostVisibleBuffer> {
    memory: M,
    capacity: usize,
    stride: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod, M: HostVisibleBuffer> UploadBuffer<T, M> {
    /// Allocates room for `capacity` entries.
    ///
    /// Constant buffer entries are padded to [`CONSTANT_BUFFER_ALIGNMENT`];
    /// other buffers are tightly packed. A zero capacity still allocates one
    /// entry so the buffer has a valid address, but accepts no writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot allocate the memory.
    pub fn new<B>(
        backend: &B,
        capacity: usize,
        is_constant_buffer: bool,
        label: &str,
    ) -> RhiResult<Self>
    where
        B: Backend<Memory = M>,
    {
        let stride = Self::aligned_stride(is_constant_buffer);
        let size = (capacity.max(1) * stride) as u64;
        let memory = backend.create_upload_memory(size, label)?;

        debug!(
            "Created upload buffer '{}': {} x {} bytes (stride {})",
            label,
            capacity,
            size_of::<T>(),
            stride
        );

        Ok(Self {
            memory,
            capacity,
            stride,
            _marker: PhantomData,
        })
    }

    /// Byte distance between consecutive entries.
    pub fn aligned_stride(is_constant_buffer: bool) -> usize {
        if is_constant_buffer {
            size_of::<T>().next_multiple_of(CONSTANT_BUFFER_ALIGNMENT)
        } else {
            size_of::<T>()
        }
    }

    /// Number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte distance between consecutive entries.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// GPU address of entry 0.
    #[inline]
    pub fn base_address(&self) -> u64 {
        self.memory.device_address()
    }

    /// GPU address of entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn device_address(&self, index: usize) -> u64 {
        self.check_index(index);
        self.base_address() + (index * self.stride) as u64
    }

    /// Copies `value` into entry `index`.
    ///
    /// Never blocks. The caller guarantees the GPU is not reading this buffer.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn write(&mut self, index: usize, value: &T) {
        self.check_index(index);
        let offset = index * self.stride;
        self.memory.mapped_bytes_mut()[offset..offset + size_of::<T>()]
            .copy_from_slice(bytemuck::bytes_of(value));
    }

    /// Reads entry `index` back from mapped memory.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn read(&self, index: usize) -> T {
        self.check_index(index);
        let offset = index * self.stride;
        bytemuck::pod_read_unaligned(&self.memory.mapped_bytes()[offset..offset + size_of::<T>()])
    }

    /// Raw mapped bytes of entry `index`, including padding.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn entry_bytes(&self, index: usize) -> &[u8] {
        self.check_index(index);
        let offset = index * self.stride;
        &self.memory.mapped_bytes()[offset..offset + self.stride]
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.capacity,
            "upload buffer index {} out of range (capacity {})",
            index,
            self.capacity
        );
    }
}
