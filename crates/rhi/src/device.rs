//! Vulkan logical device wrapper.
//!
//! Instance, physical device and logical device creation belong to the
//! platform layer. [`Device`] takes ownership of an already created
//! `ash::Device`, sets up gpu-allocator, serializes graphics queue
//! submissions and remembers whether the device has been lost.
//!
//! # Example
//!
//! ```no_run
//! use pbr_rhi::device::Device;
//! use pbr_rhi::vk;
//!
//! # fn example(
//! #     instance: &ash::Instance,
//! #     physical_device: vk::PhysicalDevice,
//! #     logical: ash::Device,
//! #     graphics_family: u32,
//! # ) -> Result<(), pbr_rhi::RhiError> {
//! // `logical` must have been created with `Device::required_features_12()`.
//! let device = unsafe { Device::from_raw(instance, physical_device, logical, graphics_family)? };
//! device.status()?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use tracing::{error, info};

use crate::error::{RhiError, RhiResult};

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared through `Arc`. The allocator and the graphics
/// queue are each guarded by a mutex.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator. Dropped before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Graphics queue family index.
    graphics_family: u32,
    /// Serializes `vkQueueSubmit` on the graphics queue.
    queue_lock: Mutex<()>,
    /// Set once any call reports `VK_ERROR_DEVICE_LOST`.
    lost: AtomicBool,
}

impl Device {
    /// Vulkan 1.2 features the frame pipeline relies on.
    ///
    /// Timeline semaphores back the frame fence, buffer device addresses
    /// back constant binding, and descriptor indexing backs bindless textures.
    pub fn required_features_12() -> vk::PhysicalDeviceVulkan12Features<'static> {
        vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .buffer_device_address(true)
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .shader_sampled_image_array_non_uniform_indexing(true)
    }

    /// Wraps an externally created logical device and initializes gpu-allocator.
    ///
    /// # Safety
    ///
    /// `device` must be a valid logical device created from `physical_device`
    /// with at least [`Device::required_features_12`] enabled, and
    /// `graphics_family` must be a graphics-capable queue family it created a
    /// queue for. Ownership of `device` passes to the returned value.
    ///
    /// # Errors
    ///
    /// Returns an error if allocator initialization fails.
    pub unsafe fn from_raw(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        graphics_family: u32,
    ) -> RhiResult<Arc<Self>> {
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        info!(
            "Device wrapped (graphics family {}), GPU memory allocator initialized",
            graphics_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            graphics_family,
            queue_lock: Mutex::new(()),
            lost: AtomicBool::new(false),
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the graphics queue family index.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Returns true once the device has reported `VK_ERROR_DEVICE_LOST`.
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Fails with [`RhiError::DeviceLost`] if the device has been lost.
    pub fn status(&self) -> RhiResult<()> {
        if self.is_lost() {
            return Err(RhiError::DeviceLost(
                "device reported VK_ERROR_DEVICE_LOST".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts a Vulkan result, recording device loss.
    pub fn check<T>(&self, result: VkResult<T>) -> RhiResult<T> {
        result.map_err(|e| {
            if e == vk::Result::ERROR_DEVICE_LOST && !self.lost.swap(true, Ordering::AcqRel) {
                error!("Vulkan device lost");
            }
            RhiError::from(e)
        })
    }

    /// Submits work to the graphics queue.
    ///
    /// # Safety
    ///
    /// Every handle referenced by `submits` must be valid and every command
    /// buffer fully recorded.
    pub unsafe fn submit_graphics(&self, submits: &[vk::SubmitInfo<'_>]) -> RhiResult<()> {
        self.status()?;
        let _queue = self.queue_lock.lock();
        let result = unsafe {
            self.device
                .queue_submit(self.graphics_queue, submits, vk::Fence::null())
        };
        self.check(result)
    }

    /// Waits for the device to become idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        let _queue = self.queue_lock.lock();
        let result = unsafe { self.device.device_wait_idle() };
        self.check(result)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            error!("Failed to wait for device idle during drop: {:?}", e);
        }

        unsafe {
            // All allocations must be freed before the device goes away.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, queue and physical device are plain
// handles, and the allocator and queue are guarded by mutexes.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_features() {
        let features = Device::required_features_12();
        assert_eq!(features.timeline_semaphore, vk::TRUE);
        assert_eq!(features.buffer_device_address, vk::TRUE);
        assert_eq!(features.descriptor_indexing, vk::TRUE);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
