//! Frame resource rotation and synchronization.
//!
//! This module provides the [`FrameManager`] struct, which cycles through a
//! fixed ring of [`FrameResource`] slots and gates the reuse of each slot on
//! the shared [`FrameFence`].
//!
//! # Overview
//!
//! The frame manager implements a "frames in flight" pattern where up to K
//! frames can be processed concurrently:
//!
//! 1. While the GPU renders frame N, the CPU prepares frame N+1
//! 2. Each frame slot has its own constants and command allocator
//! 3. The fence ensures the CPU doesn't overwrite a slot still in use
//!
//! # Protocol
//!
//! ```text
//! begin_frame:
//!   1. current = (current + 1) % K
//!   2. v = frames[current].fence_value
//!   3. if v != 0 and completed < v: block until completed >= v
//!   4. reset frames[current].allocator
//! (update constants, record and submit draws)
//! end_frame:
//!   5. frames[current].fence_value = fence.advance_and_signal()
//! ```
//!
//! The first call to `begin_frame` selects slot 0.
//!
//! # Example
//!
//! ```
//! use pbr_renderer::{FrameCapacities, FrameManager};
//! use pbr_rhi::headless::HeadlessGpu;
//!
//! # fn main() -> Result<(), pbr_rhi::RhiError> {
//! let gpu = HeadlessGpu::new();
//! let mut frames = FrameManager::new(&gpu, 3, FrameCapacities::default(), None)?;
//!
//! for _ in 0..3 {
//!     frames.begin_frame()?;
//!     // Write constants, record and execute command lists...
//!     frames.end_frame()?;
//! }
//! assert_eq!(frames.fence().current_value(), 3);
//!
//! gpu.complete_all();
//! frames.wait_for_all_frames()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use pbr_rhi::{Backend, RhiResult};

use crate::fence::FrameFence;
use crate::frame_resource::{FrameCapacities, FrameResource};

/// Rotates through the frame slots.
pub struct FrameManager<B: Backend> {
    /// One slot per frame in flight.
    frames: Vec<FrameResource<B>>,
    /// Fence shared by every slot.
    fence: FrameFence<B::Fence>,
    /// Index of the slot selected by the last `begin_frame`.
    current_frame: usize,
    /// True between `begin_frame` and `end_frame`.
    recording: bool,
}

impl<B: Backend> FrameManager<B> {
    /// Creates `frames_in_flight` slots and the shared fence.
    ///
    /// `fence_timeout` bounds every fence wait; `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns an error if any slot or the fence cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(
        backend: &B,
        frames_in_flight: usize,
        capacities: FrameCapacities,
        fence_timeout: Option<Duration>,
    ) -> RhiResult<Self> {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");

        let frames = (0..frames_in_flight)
            .map(|i| FrameResource::new(backend, i, capacities))
            .collect::<RhiResult<Vec<_>>>()?;
        let fence = FrameFence::new(backend.create_fence()?, fence_timeout);

        info!(
            "Frame manager created with {} frames in flight on {} backend",
            frames_in_flight,
            backend.name()
        );

        Ok(Self {
            frames,
            fence,
            current_frame: frames_in_flight - 1,
            recording: false,
        })
    }

    /// Advances to the next slot, waits for its previous GPU work and resets
    /// its command allocator.
    ///
    /// This is the only place the frame loop blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost, the fence misbehaves or the
    /// wait times out. All of these are fatal.
    ///
    /// # Panics
    ///
    /// Panics if called twice without an `end_frame` in between.
    pub fn begin_frame(&mut self) -> RhiResult<&mut FrameResource<B>> {
        assert!(
            !self.recording,
            "begin_frame called twice without end_frame"
        );

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        let index = self.current_frame;

        let fence_value = self.frames[index].fence_value();
        self.fence.block_until(fence_value)?;

        let frame = &mut self.frames[index];
        frame.reset()?;
        self.recording = true;

        trace!("Began frame slot {} (last fence {})", index, fence_value);
        Ok(frame)
    }

    /// Signals the fence and tags the current slot with the new value.
    ///
    /// Call after the frame's last submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be enqueued.
    ///
    /// # Panics
    ///
    /// Panics if no frame is being recorded.
    pub fn end_frame(&mut self) -> RhiResult<u64> {
        assert!(self.recording, "end_frame called without begin_frame");
        self.recording = false;

        let value = self.fence.advance_and_signal()?;
        self.frames[self.current_frame].set_fence_value(value);

        trace!(
            "Ended frame slot {} with fence value {}",
            self.current_frame, value
        );
        Ok(value)
    }

    /// Blocks until the GPU has finished every submitted frame.
    ///
    /// Dropping the manager does this too, unless the device is lost.
    pub fn wait_for_all_frames(&self) -> RhiResult<()> {
        let target = self.fence.current_value();
        debug!("Waiting for all frames (fence value {})", target);
        self.fence.block_until(target)?;
        info!("All frames retired at fence value {}", target);
        Ok(())
    }

    /// Slot selected by the last `begin_frame`.
    #[inline]
    pub fn current_frame(&self) -> &FrameResource<B> {
        &self.frames[self.current_frame]
    }

    /// Index of the slot selected by the last `begin_frame`.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current_frame
    }

    /// Slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= frames_in_flight()`.
    #[inline]
    pub fn frame(&self, index: usize) -> &FrameResource<B> {
        &self.frames[index]
    }

    /// Number of slots (K).
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// The shared fence.
    #[inline]
    pub fn fence(&self) -> &FrameFence<B::Fence> {
        &self.fence
    }

    /// Returns true between `begin_frame` and `end_frame`.
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

impl<B: Backend> Drop for FrameManager<B> {
    fn drop(&mut self) {
        // Slots own memory the GPU may still be reading.
        match self.fence.is_complete(self.fence.current_value()) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!("Skipping GPU drain, fence is unusable: {}", e);
                return;
            }
        }
        if let Err(e) = self.wait_for_all_frames() {
            error!(
                "Failed to drain the GPU before destroying frame resources: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use pbr_rhi::headless::HeadlessGpu;

    use super::*;

    fn manager(gpu: &HeadlessGpu, k: usize) -> FrameManager<HeadlessGpu> {
        FrameManager::new(gpu, k, FrameCapacities::default(), None).unwrap()
    }

    fn tick(frames: &mut FrameManager<HeadlessGpu>) -> u64 {
        frames.begin_frame().unwrap();
        frames.end_frame().unwrap()
    }

    #[test]
    fn test_round_robin_from_slot_zero() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 3);

        let mut visited = Vec::new();
        for _ in 0..7 {
            frames.begin_frame().unwrap();
            visited.push(frames.current_index());
            frames.end_frame().unwrap();
            gpu.complete_all();
        }
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_fresh_slots_do_not_block() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 3);
        // Nothing completes, but the first K ticks never wait.
        for expected in 1..=3 {
            assert_eq!(tick(&mut frames), expected);
        }
        assert_eq!(frames.frame(0).fence_value(), 1);
        assert_eq!(frames.frame(2).fence_value(), 3);
        gpu.complete_all();
    }

    #[test]
    fn test_reused_slot_waits_for_its_fence() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 2);
        tick(&mut frames);
        tick(&mut frames);

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            frames.begin_frame().unwrap();
            tx.send(frames.current_index()).unwrap();
            frames
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        gpu.complete_next();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);

        let frames = handle.join().unwrap();
        assert!(frames.is_recording());
        assert_eq!(gpu.premature_resets(), 0);
        gpu.complete_all();
    }

    #[test]
    fn test_wait_for_all_frames() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 3);
        tick(&mut frames);
        tick(&mut frames);

        let worker = gpu.spawn_completion_worker(Duration::from_millis(1));
        frames.wait_for_all_frames().unwrap();
        assert_eq!(gpu.completed_value(), 2);
        drop(worker);
    }

    #[test]
    fn test_drop_drains_in_flight_frames() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 3);
        for _ in 0..3 {
            tick(&mut frames);
        }
        assert_eq!(gpu.pending_signals(), vec![1, 2, 3]);

        let worker = gpu.spawn_completion_worker(Duration::from_millis(20));
        drop(frames);
        assert!(gpu.pending_signals().is_empty());
        assert_eq!(gpu.completed_value(), 3);
        drop(worker);
    }

    #[test]
    fn test_drop_after_device_lost_does_not_wait() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 2);
        tick(&mut frames);
        gpu.set_device_lost("removed");

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            drop(frames);
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert_eq!(gpu.pending_signals(), vec![1]);
    }

    #[test]
    fn test_drop_with_bounded_wait_gives_up() {
        let gpu = HeadlessGpu::new();
        let mut frames =
            FrameManager::new(&gpu, 2, FrameCapacities::default(), Some(Duration::from_millis(10)))
                .unwrap();
        tick(&mut frames);

        let started = std::time::Instant::now();
        drop(frames);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(gpu.completed_value(), 0);
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn test_double_begin_panics() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 3);
        frames.begin_frame().unwrap();
        let _ = frames.begin_frame();
    }

    #[test]
    #[should_panic(expected = "without begin_frame")]
    fn test_end_without_begin_panics() {
        let gpu = HeadlessGpu::new();
        let mut frames = manager(&gpu, 3);
        let _ = frames.end_frame();
    }

    #[test]
    #[should_panic(expected = "at least 1")]
    fn test_zero_frames_panics() {
        let gpu = HeadlessGpu::new();
        let _ = manager(&gpu, 0);
    }

    #[test]
    fn test_frame_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager<HeadlessGpu>>();
    }
}
