//! Per-frame resources.
//!
//! A [`FrameResource`] holds everything the CPU writes or records for one
//! frame in flight: a command allocator, private copies of the pass,
//! material and object constants, and the fence value that tags the last
//! GPU work submitted with it.
//!
//! # Ownership
//!
//! ```text
//! begin_frame   fence wait succeeds  -> CPU owns the slot
//!               allocator reset, constants written, commands recorded
//! end_frame     commands executed, fence signaled -> GPU owns the slot
//!               until the slot's fence value completes
//! ```

use tracing::debug;

use pbr_resources::{MaterialConstants, ObjectConstants, PassConstants};
use pbr_rhi::{Backend, CommandAllocator, RhiResult};

use crate::upload_buffer::UploadBuffer;

/// Number of entries in each per-frame constant pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCapacities {
    /// Material constant entries (one per material).
    pub materials: usize,
    /// Object constant entries (one per render item).
    pub objects: usize,
}

/// Resources owned by one frame in flight.
pub struct FrameResource<B: Backend> {
    /// Command allocator for this frame's command lists.
    allocator: B::Allocator,
    /// Pass constants (one entry).
    pass_constants: UploadBuffer<PassConstants, B::Memory>,
    /// Material constants (one entry per material).
    material_constants: UploadBuffer<MaterialConstants, B::Memory>,
    /// Object constants (one entry per render item).
    object_constants: UploadBuffer<ObjectConstants, B::Memory>,
    /// Fence value of the last submission from this slot. 0 means never submitted.
    fence_value: u64,
}

impl<B: Backend> FrameResource<B> {
    /// Creates the resources for frame slot `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator or any constant pool cannot be created.
    pub fn new(backend: &B, index: usize, capacities: FrameCapacities) -> RhiResult<Self> {
        let allocator = backend.create_command_allocator()?;
        let pass_constants =
            UploadBuffer::new(backend, 1, true, &format!("frame{}_pass_constants", index))?;
        let material_constants = UploadBuffer::new(
            backend,
            capacities.materials,
            true,
            &format!("frame{}_material_constants", index),
        )?;
        let object_constants = UploadBuffer::new(
            backend,
            capacities.objects,
            true,
            &format!("frame{}_object_constants", index),
        )?;

        debug!(
            "Created frame resource {} ({} materials, {} objects)",
            index, capacities.materials, capacities.objects
        );

        Ok(Self {
            allocator,
            pass_constants,
            material_constants,
            object_constants,
            fence_value: 0,
        })
    }

    /// Recycles the command allocator.
    ///
    /// Only the frame manager calls this, after the slot's fence value has
    /// completed.
    pub(crate) fn reset(&mut self) -> RhiResult<()> {
        self.allocator.reset()
    }

    /// Fence value of the last submission from this slot.
    #[inline]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub(crate) fn set_fence_value(&mut self, value: u64) {
        assert!(
            value > self.fence_value,
            "frame fence value must increase ({} -> {})",
            self.fence_value,
            value
        );
        self.fence_value = value;
    }

    /// Returns true if this slot has never been submitted.
    #[inline]
    pub fn is_fresh(&self) -> bool {
        self.fence_value == 0
    }

    /// The command allocator.
    #[inline]
    pub fn allocator(&self) -> &B::Allocator {
        &self.allocator
    }

    #[inline]
    pub(crate) fn allocator_mut(&mut self) -> &mut B::Allocator {
        &mut self.allocator
    }

    /// Pass constants pool.
    #[inline]
    pub fn pass_constants(&self) -> &UploadBuffer<PassConstants, B::Memory> {
        &self.pass_constants
    }

    /// Material constants pool.
    #[inline]
    pub fn material_constants(&self) -> &UploadBuffer<MaterialConstants, B::Memory> {
        &self.material_constants
    }

    /// Object constants pool.
    #[inline]
    pub fn object_constants(&self) -> &UploadBuffer<ObjectConstants, B::Memory> {
        &self.object_constants
    }

    /// Writable pass constants. Only write while this slot is current.
    #[inline]
    pub fn pass_constants_mut(&mut self) -> &mut UploadBuffer<PassConstants, B::Memory> {
        &mut self.pass_constants
    }

    #[inline]
    pub fn material_constants_mut(
        &mut self,
    ) -> &mut UploadBuffer<MaterialConstants, B::Memory> {
        &mut self.material_constants
    }

    #[inline]
    pub fn object_constants_mut(
        &mut self,
    ) -> &mut UploadBuffer<ObjectConstants, B::Memory> {
        &mut self.object_constants
    }
}

#[cfg(test)]
mod tests {
    use pbr_rhi::headless::HeadlessGpu;

    use super::*;

    fn capacities() -> FrameCapacities {
        FrameCapacities {
            materials: 2,
            objects: 5,
        }
    }

    #[test]
    fn test_pool_capacities() {
        let gpu = HeadlessGpu::new();
        let frame = FrameResource::new(&gpu, 0, capacities()).unwrap();
        assert_eq!(frame.pass_constants().capacity(), 1);
        assert_eq!(frame.material_constants().capacity(), 2);
        assert_eq!(frame.object_constants().capacity(), 5);
        assert!(frame.is_fresh());
    }

    #[test]
    fn test_slots_have_private_memory() {
        let gpu = HeadlessGpu::new();
        let a = FrameResource::new(&gpu, 0, capacities()).unwrap();
        let b = FrameResource::new(&gpu, 1, capacities()).unwrap();
        assert_ne!(
            a.object_constants().base_address(),
            b.object_constants().base_address()
        );
        assert_ne!(a.allocator().id(), b.allocator().id());
    }

    #[test]
    fn test_reset_recycles_allocator() {
        let gpu = HeadlessGpu::new();
        let mut frame = FrameResource::new(&gpu, 0, capacities()).unwrap();
        frame.reset().unwrap();
        assert_eq!(frame.allocator().resets(), 1);
        assert_eq!(gpu.premature_resets(), 0);
    }

    #[test]
    #[should_panic(expected = "must increase")]
    fn test_fence_value_cannot_regress() {
        let gpu = HeadlessGpu::new();
        let mut frame = FrameResource::new(&gpu, 0, capacities()).unwrap();
        frame.set_fence_value(4);
        frame.set_fence_value(4);
    }

    #[test]
    fn test_creation_fails_on_lost_device() {
        let gpu = HeadlessGpu::new();
        gpu.set_device_lost("test");
        assert!(FrameResource::new(&gpu, 0, capacities()).is_err());
    }
}
