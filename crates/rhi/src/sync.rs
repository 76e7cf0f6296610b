//! Timeline semaphore fence.
//!
//! [`TimelineFence`] implements [`GpuFence`] over a Vulkan timeline
//! semaphore: one monotonically increasing 64-bit counter that the graphics
//! queue signals and the host can read or wait on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pbr_rhi::GpuFence;
//! use pbr_rhi::device::Device;
//! use pbr_rhi::sync::TimelineFence;
//!
//! # fn example(device: Arc<Device>) -> Result<(), pbr_rhi::RhiError> {
//! let fence = TimelineFence::new(device)?;
//!
//! // After the frame's command buffers have been submitted:
//! fence.signal(1)?;
//!
//! // Before reusing that frame's resources:
//! fence.wait(1, None)?;
//! assert!(fence.completed_value()? >= 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::backend::GpuFence;
use crate::device::Device;
use crate::error::RhiResult;

/// Converts an optional timeout into the nanosecond form Vulkan expects.
pub fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
}

/// Vulkan timeline semaphore wrapper.
///
/// # Thread Safety
///
/// Signal submissions go through the device's queue lock; reads and waits
/// are thread-safe per the Vulkan specification.
pub struct TimelineFence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Timeline semaphore handle.
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    /// Creates a timeline semaphore with initial value 0.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore =
            device.check(unsafe { device.handle().create_semaphore(&create_info, None) })?;

        debug!("Created timeline semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl GpuFence for TimelineFence {
    fn signal(&self, value: u64) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        // No command buffers: the signal is ordered after everything
        // previously submitted to the queue.
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);

        unsafe { self.device.submit_graphics(&[submit]) }
    }

    fn completed_value(&self) -> RhiResult<u64> {
        let result = unsafe { self.device.handle().get_semaphore_counter_value(self.semaphore) };
        self.device.check(result)
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<bool> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        let result = unsafe {
            self.device
                .handle()
                .wait_semaphores(&wait_info, timeout_nanos(timeout))
        };
        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => self.device.check(Err(e)),
        }
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline semaphore");
    }
}
