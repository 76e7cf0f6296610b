//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns one VkCommandPool and its primary command buffer.
//!   Each frame resource slot holds one, so resetting the pool recycles
//!   exactly that slot's recording memory.
//! - [`CommandBuffer`] records PBR draws, feeding constant addresses and
//!   texture indices through [`DrawPushConstants`].

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, trace};

use crate::backend::{CommandAllocator, DrawRecorder, PipelineId};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{DrawPushConstants, NO_TEXTURE, PipelineTable};
use crate::vertex::{IndexBufferView, VertexBufferView};

/// Vulkan command pool wrapper.
///
/// # Thread Safety
///
/// Command pools are externally synchronized; the owning frame slot is the
/// only user.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Primary command buffer allocated from `pool`.
    command_buffer: vk::CommandBuffer,
}

impl CommandPool {
    /// Creates a command pool on the graphics queue family and allocates its
    /// primary command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or buffer allocation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_family())
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let pool =
            device.check(unsafe { device.handle().create_command_pool(&create_info, None) })?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.handle().allocate_command_buffers(&alloc_info) };
        let command_buffer = match device.check(buffers) {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.handle().destroy_command_pool(pool, None) };
                return Err(e);
            }
        };

        debug!(
            "Command pool created for queue family {}",
            device.graphics_family()
        );

        Ok(Self {
            device,
            pool,
            command_buffer,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the primary command buffer.
    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl CommandAllocator for CommandPool {
    fn reset(&mut self) -> RhiResult<()> {
        let result = unsafe {
            self.device
                .handle()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
        };
        self.device.check(result)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Frees the command buffer along with the pool.
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed");
    }
}

/// A command buffer in the recording state.
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
    /// Pipelines and layout used for binding.
    pipelines: Arc<PipelineTable>,
    /// Values pushed with the next draw.
    push: DrawPushConstants,
    /// Number of draws recorded.
    draws: u32,
}

impl CommandBuffer {
    /// Begins one-time recording into `pool`'s primary command buffer.
    pub(crate) fn begin(
        device: Arc<Device>,
        pool: &CommandPool,
        pipelines: Arc<PipelineTable>,
    ) -> RhiResult<Self> {
        let buffer = pool.command_buffer();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        device.check(unsafe { device.handle().begin_command_buffer(buffer, &begin_info) })?;

        if pipelines.texture_set() != vk::DescriptorSet::null() {
            unsafe {
                device.handle().cmd_bind_descriptor_sets(
                    buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipelines.layout(),
                    0,
                    &[pipelines.texture_set()],
                    &[],
                );
            }
        }

        Ok(Self {
            device,
            buffer,
            pipelines,
            push: DrawPushConstants::default(),
            draws: 0,
        })
    }

    /// Ends recording.
    pub(crate) fn end(&self) -> RhiResult<vk::CommandBuffer> {
        self.device
            .check(unsafe { self.device.handle().end_command_buffer(self.buffer) })?;
        trace!("Command buffer closed with {} draws", self.draws);
        Ok(self.buffer)
    }

    /// Returns the Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }
}

impl DrawRecorder for CommandBuffer {
    fn set_pipeline(&mut self, pipeline: PipelineId) -> RhiResult<()> {
        let handle = self.pipelines.get(pipeline).ok_or_else(|| {
            RhiError::PipelineError(format!("pipeline {:?} is not registered", pipeline))
        })?;
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                handle,
            );
        }
        Ok(())
    }

    fn bind_pass_constants(&mut self, address: u64) {
        self.push.pass = address;
    }

    fn bind_geometry(&mut self, vertices: &VertexBufferView, indices: &IndexBufferView) {
        unsafe {
            self.device.handle().cmd_bind_vertex_buffers(
                self.buffer,
                0,
                &[vk::Buffer::from_raw(vertices.buffer)],
                &[vertices.offset],
            );
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                vk::Buffer::from_raw(indices.buffer),
                indices.offset,
                indices.format.to_vk(),
            );
        }
    }

    fn bind_object_constants(&mut self, address: u64) {
        self.push.object = address;
    }

    fn bind_material_constants(&mut self, address: u64) {
        self.push.material = address;
    }

    fn bind_textures(&mut self, environment: Option<u32>, diffuse: Option<u32>) {
        self.push.environment_texture = environment.unwrap_or(NO_TEXTURE);
        self.push.diffuse_texture = diffuse.unwrap_or(NO_TEXTURE);
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        unsafe {
            self.device.handle().cmd_push_constants(
                self.buffer,
                self.pipelines.layout(),
                DrawPushConstants::stages(),
                0,
                bytemuck::bytes_of(&self.push),
            );
            self.device.handle().cmd_draw_indexed(
                self.buffer,
                index_count,
                1,
                start_index,
                base_vertex,
                0,
            );
        }
        self.draws += 1;
    }
}
