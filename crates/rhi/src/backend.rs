//! Backend abstraction used by the frame pipeline.
//!
//! The frame pipeline only needs a handful of GPU capabilities: persistently
//! mapped upload memory, resettable command allocators, a command recorder
//! for indexed draws, and a monotonic fence. Each backend ([`crate::vulkan`],
//! [`crate::headless`]) provides those through the traits below.

use std::time::Duration;

use crate::error::RhiResult;
use crate::vertex::{IndexBufferView, VertexBufferView};

/// Identifies a graphics pipeline built by the pipeline collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u32);

/// CPU-writable, GPU-readable memory that stays mapped for its whole lifetime.
pub trait HostVisibleBuffer: Send {
    /// Size of the mapped region in bytes.
    fn size(&self) -> u64;

    /// The mapped bytes.
    fn mapped_bytes(&self) -> &[u8];

    /// The mapped bytes, writable.
    ///
    /// Writes are plain memory copies. The caller guarantees the GPU is not
    /// reading this memory.
    fn mapped_bytes_mut(&mut self) -> &mut [u8];

    /// GPU virtual address of byte 0.
    fn device_address(&self) -> u64;
}

/// Backing memory for command recording.
pub trait CommandAllocator: Send {
    /// Recycles all memory used by command lists recorded from this allocator.
    ///
    /// The GPU must have finished executing every such command list.
    fn reset(&mut self) -> RhiResult<()>;
}

/// Records draw commands into a command list.
pub trait DrawRecorder {
    /// Selects the pipeline used by subsequent draws.
    fn set_pipeline(&mut self, pipeline: PipelineId) -> RhiResult<()>;

    /// Binds the pass constants address for subsequent draws.
    fn bind_pass_constants(&mut self, address: u64);

    /// Binds the vertex and index buffers.
    fn bind_geometry(&mut self, vertices: &VertexBufferView, indices: &IndexBufferView);

    /// Binds the per-object constants address.
    fn bind_object_constants(&mut self, address: u64);

    /// Binds the per-material constants address.
    fn bind_material_constants(&mut self, address: u64);

    /// Binds texture descriptor indices. `None` leaves the slot unbound.
    fn bind_textures(&mut self, environment: Option<u32>, diffuse: Option<u32>);

    /// Issues one indexed, non-instanced draw.
    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32);
}

/// A monotonic 64-bit counter shared by the CPU and a GPU queue.
pub trait GpuFence: Send {
    /// Enqueues a GPU-side signal to `value`, ordered after all work
    /// already submitted to the queue.
    fn signal(&self, value: u64) -> RhiResult<()>;

    /// Latest value the GPU has reached.
    fn completed_value(&self) -> RhiResult<u64>;

    /// Blocks until the completed value reaches `value`.
    ///
    /// Returns `Ok(false)` if `timeout` elapsed first. `None` waits forever.
    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<bool>;
}

/// A GPU backend able to run the frame pipeline.
pub trait Backend {
    /// Upload memory type.
    type Memory: HostVisibleBuffer;
    /// Command allocator type.
    type Allocator: CommandAllocator;
    /// Command list type.
    type CommandList: DrawRecorder;
    /// Fence type.
    type Fence: GpuFence;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Allocates `size` bytes of persistently mapped upload memory.
    fn create_upload_memory(&self, size: u64, label: &str) -> RhiResult<Self::Memory>;

    /// Creates a command allocator.
    fn create_command_allocator(&self) -> RhiResult<Self::Allocator>;

    /// Creates a fence starting at zero.
    fn create_fence(&self) -> RhiResult<Self::Fence>;

    /// Opens a command list backed by `allocator`.
    fn begin_command_list(&self, allocator: &mut Self::Allocator) -> RhiResult<Self::CommandList>;

    /// Closes and submits a command list to the graphics queue.
    fn execute(&self, list: Self::CommandList) -> RhiResult<()>;

    /// Reports whether the device is still usable.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`](crate::RhiError::DeviceLost) once the
    /// device has been lost or removed.
    fn device_status(&self) -> RhiResult<()>;
}
