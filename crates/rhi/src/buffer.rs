//! Persistently mapped upload buffers.
//!
//! [`Buffer`] is a host-visible uniform buffer allocated through
//! gpu-allocator. Shaders reach it through its buffer device address, so the
//! frame pipeline binds constants by address instead of by descriptor.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::backend::HostVisibleBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Usage flags of upload buffers.
pub fn upload_usage_flags() -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
}

/// Memory location of upload buffers.
pub const UPLOAD_MEMORY_LOCATION: MemoryLocation = MemoryLocation::CpuToGpu;

/// Host-visible GPU buffer with managed memory.
///
/// The allocation stays mapped until the buffer is dropped.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    /// GPU virtual address.
    address: vk::DeviceAddress,
    /// Debug label.
    label: String,
}

impl Buffer {
    /// Creates a mapped upload buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero, if buffer or memory allocation
    /// fails, or if the memory could not be mapped.
    pub fn new_upload(device: Arc<Device>, size: vk::DeviceSize, label: &str) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Buffer '{}' size must be greater than 0",
                label
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(upload_usage_flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.check(unsafe { device.handle().create_buffer(&buffer_info, None) })?;

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: label,
            requirements,
            location: UPLOAD_MEMORY_LOCATION,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        // Constructed before binding so an early return still releases everything.
        let mut this = Self {
            device,
            buffer,
            allocation: None,
            size,
            address: 0,
            label: label.to_string(),
        };

        if allocation.mapped_ptr().is_none() {
            this.allocation = Some(allocation);
            return Err(RhiError::AllocationFailed {
                label: this.label.clone(),
                reason: "memory is not host mapped".to_string(),
            });
        }

        let bind = unsafe {
            this.device.handle().bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )
        };
        this.allocation = Some(allocation);
        this.device.check(bind)?;

        let address_info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
        this.address = unsafe { this.device.handle().get_buffer_device_address(&address_info) };

        debug!(
            "Created upload buffer '{}': {} bytes at {:#x}",
            this.label, size, this.address
        );

        Ok(this)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the debug label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl HostVisibleBuffer for Buffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn mapped_bytes(&self) -> &[u8] {
        let len = self.size as usize;
        match self.allocation.as_ref().and_then(Allocation::mapped_slice) {
            Some(bytes) => &bytes[..len],
            None => &[],
        }
    }

    fn mapped_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.size as usize;
        match self.allocation.as_mut().and_then(Allocation::mapped_slice_mut) {
            Some(bytes) => &mut bytes[..len],
            None => &mut [],
        }
    }

    fn device_address(&self) -> u64 {
        self.address
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Freeing the allocation unmaps it; the buffer goes after.
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().lock().free(allocation) {
                error!("Failed to free buffer '{}' allocation: {:?}", self.label, e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed upload buffer '{}'", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_usage_flags() {
        let flags = upload_usage_flags();
        assert!(flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert!(flags.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS));
        assert!(!flags.contains(vk::BufferUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn test_upload_memory_is_host_visible() {
        assert_eq!(UPLOAD_MEMORY_LOCATION, MemoryLocation::CpuToGpu);
    }

    #[test]
    fn test_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Buffer>();
    }
}
