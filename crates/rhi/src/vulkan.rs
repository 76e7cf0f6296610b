//! [`Backend`] implementation over Vulkan.

use std::sync::Arc;

use tracing::trace;

use crate::backend::Backend;
use crate::buffer::Buffer;
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::RhiResult;
use crate::pipeline::PipelineTable;
use crate::sync::TimelineFence;

/// Vulkan backend: a device plus the pipelines draws are recorded with.
pub struct VulkanBackend {
    device: Arc<Device>,
    pipelines: Arc<PipelineTable>,
}

impl VulkanBackend {
    /// Creates a backend over `device`.
    pub fn new(device: Arc<Device>, pipelines: PipelineTable) -> Self {
        Self {
            device,
            pipelines: Arc::new(pipelines),
        }
    }

    /// Returns the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the pipeline table.
    #[inline]
    pub fn pipelines(&self) -> &PipelineTable {
        &self.pipelines
    }
}

impl Backend for VulkanBackend {
    type Memory = Buffer;
    type Allocator = CommandPool;
    type CommandList = CommandBuffer;
    type Fence = TimelineFence;

    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn create_upload_memory(&self, size: u64, label: &str) -> RhiResult<Buffer> {
        Buffer::new_upload(self.device.clone(), size, label)
    }

    fn create_command_allocator(&self) -> RhiResult<CommandPool> {
        CommandPool::new(self.device.clone())
    }

    fn create_fence(&self) -> RhiResult<TimelineFence> {
        TimelineFence::new(self.device.clone())
    }

    fn begin_command_list(&self, allocator: &mut CommandPool) -> RhiResult<CommandBuffer> {
        self.device.status()?;
        CommandBuffer::begin(self.device.clone(), allocator, self.pipelines.clone())
    }

    fn execute(&self, list: CommandBuffer) -> RhiResult<()> {
        let buffers = [list.end()?];
        let submit = ash::vk::SubmitInfo::default().command_buffers(&buffers);
        unsafe { self.device.submit_graphics(&[submit])? };
        trace!("Submitted command buffer");
        Ok(())
    }

    fn device_status(&self) -> RhiResult<()> {
        self.device.status()
    }
}
