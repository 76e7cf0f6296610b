//! CPU side of the frame fence.
//!
//! [`FrameFence`] owns the single monotonic counter shared by every frame
//! slot. The CPU advances its target value once per frame, after all draws
//! for that frame have been submitted; the GPU reports the highest value it
//! has finished.
//!
//! Besides waiting, the fence audits the GPU: a completed value lower than
//! one already observed is reported as [`RhiError::FenceRegression`], and a
//! bounded wait that expires is reported as [`RhiError::FenceTimeout`]. Both
//! are fatal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use pbr_rhi::{GpuFence, RhiError, RhiResult};

/// Monotonic fence shared by all frame slots.
pub struct FrameFence<F: GpuFence> {
    fence: F,
    /// Last value signaled by the CPU.
    current_value: u64,
    /// Highest completed value observed so far.
    highest_completed: AtomicU64,
    timeout: Option<Duration>,
}

impl<F: GpuFence> FrameFence<F> {
    /// Wraps a GPU fence that starts at zero.
    ///
    /// `timeout` bounds every wait; `None` waits forever.
    pub fn new(fence: F, timeout: Option<Duration>) -> Self {
        Self {
            fence,
            current_value: 0,
            highest_completed: AtomicU64::new(0),
            timeout,
        }
    }

    /// Last value signaled by the CPU.
    #[inline]
    pub fn current_value(&self) -> u64 {
        self.current_value
    }

    /// Highest completed value observed so far.
    #[inline]
    pub fn highest_completed(&self) -> u64 {
        self.highest_completed.load(Ordering::Acquire)
    }

    /// Wait bound.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Underlying GPU fence.
    #[inline]
    pub fn inner(&self) -> &F {
        &self.fence
    }

    /// Increments the target value and enqueues a GPU signal to it.
    ///
    /// Call once per frame, after the frame's last submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be enqueued. The target value is
    /// left unchanged in that case.
    pub fn advance_and_signal(&mut self) -> RhiResult<u64> {
        let value = self.current_value + 1;
        self.fence.signal(value)?;
        self.current_value = value;
        trace!("Signaled fence value {}", value);
        Ok(value)
    }

    /// Latest value the GPU has finished.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FenceRegression`] if the value is lower than one
    /// observed before, or the backend's error if the device is lost.
    pub fn completed_value(&self) -> RhiResult<u64> {
        let observed = self.fence.completed_value()?;
        let previous = self.highest_completed.fetch_max(observed, Ordering::AcqRel);
        if observed < previous {
            error!(
                "Fence completed value regressed from {} to {}",
                previous, observed
            );
            return Err(RhiError::FenceRegression { previous, observed });
        }
        Ok(observed)
    }

    /// Returns true if the GPU has finished `value`.
    pub fn is_complete(&self, value: u64) -> RhiResult<bool> {
        Ok(value == 0 || self.completed_value()? >= value)
    }

    /// Blocks until the GPU has finished `target`.
    ///
    /// Returns immediately for 0 or an already completed value.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FenceTimeout`] if the configured timeout expires,
    /// or a device-lost error from the backend.
    ///
    /// # Panics
    ///
    /// Panics if `target` was never signaled, since the wait could not end.
    pub fn block_until(&self, target: u64) -> RhiResult<()> {
        assert!(
            target <= self.current_value,
            "waiting for fence value {} which was never signaled (current {})",
            target,
            self.current_value
        );

        let completed = self.completed_value()?;
        if target == 0 || completed >= target {
            return Ok(());
        }

        debug!(
            "Waiting for fence value {} (completed {})",
            target, completed
        );
        let start = Instant::now();

        if !self.fence.wait(target, self.timeout)? {
            let completed = self.completed_value()?;
            let timeout = self.timeout.unwrap_or_default();
            error!(
                "Fence wait for value {} timed out after {:?} (completed {})",
                target, timeout, completed
            );
            return Err(RhiError::FenceTimeout {
                value: target,
                completed,
                timeout,
            });
        }

        let completed = self.completed_value()?;
        if completed < target {
            error!(
                "Fence wait for value {} returned with completed value {}",
                target, completed
            );
            return Err(RhiError::FenceRegression {
                previous: target,
                observed: completed,
            });
        }

        debug!("Fence value {} reached after {:?}", target, start.elapsed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use pbr_rhi::Backend;
    use pbr_rhi::headless::{HeadlessFence, HeadlessGpu};

    use super::*;

    fn fence(gpu: &HeadlessGpu, timeout: Option<Duration>) -> FrameFence<HeadlessFence> {
        FrameFence::new(gpu.create_fence().unwrap(), timeout)
    }

    #[test]
    fn test_advance_increments_by_one() {
        let gpu = HeadlessGpu::new();
        let mut fence = fence(&gpu, None);
        assert_eq!(fence.advance_and_signal().unwrap(), 1);
        assert_eq!(fence.advance_and_signal().unwrap(), 2);
        assert_eq!(fence.current_value(), 2);
        assert_eq!(gpu.pending_signals(), vec![1, 2]);
    }

    #[test]
    fn test_zero_and_completed_values_do_not_block() {
        let gpu = HeadlessGpu::new();
        let mut fence = fence(&gpu, None);
        fence.block_until(0).unwrap();

        fence.advance_and_signal().unwrap();
        gpu.complete_all();
        fence.block_until(1).unwrap();
        assert!(fence.is_complete(1).unwrap());
    }

    #[test]
    fn test_block_until_waits_for_gpu() {
        let gpu = HeadlessGpu::new();
        let mut fence = fence(&gpu, None);
        fence.advance_and_signal().unwrap();
        fence.advance_and_signal().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            fence.block_until(2).unwrap();
            tx.send(()).unwrap();
        });

        gpu.complete_next();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        gpu.complete_next();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_timeout_is_fatal() {
        let gpu = HeadlessGpu::new();
        let mut fence = fence(&gpu, Some(Duration::from_millis(10)));
        fence.advance_and_signal().unwrap();

        let err = fence.block_until(1).unwrap_err();
        assert!(matches!(
            err,
            RhiError::FenceTimeout {
                value: 1,
                completed: 0,
                ..
            }
        ));
        assert!(err.is_device_lost());
    }

    #[test]
    fn test_regression_detected() {
        let gpu = HeadlessGpu::new();
        let fence = fence(&gpu, None);
        gpu.complete_up_to(3);
        assert_eq!(fence.completed_value().unwrap(), 3);

        gpu.inject_completed_value(2);
        let err = fence.completed_value().unwrap_err();
        assert!(matches!(
            err,
            RhiError::FenceRegression {
                previous: 3,
                observed: 2
            }
        ));
        assert_eq!(fence.highest_completed(), 3);
    }

    #[test]
    fn test_device_lost_wakes_waiter() {
        let gpu = HeadlessGpu::new();
        let mut fence = fence(&gpu, None);
        fence.advance_and_signal().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            tx.send(fence.block_until(1)).unwrap();
        });

        thread::sleep(Duration::from_millis(10));
        gpu.set_device_lost("removed");
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(RhiError::DeviceLost(_))));
        waiter.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "never signaled")]
    fn test_waiting_for_unsignaled_value_panics() {
        let gpu = HeadlessGpu::new();
        let fence = fence(&gpu, None);
        let _ = fence.block_until(1);
    }
}
