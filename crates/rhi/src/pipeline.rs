//! Pipeline lookup for the Vulkan backend.
//!
//! Shader compilation and pipeline construction happen elsewhere. The
//! builder registers each finished pipeline here under a [`PipelineId`] and
//! keeps ownership of the Vulkan handles.

use std::collections::HashMap;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::backend::PipelineId;

/// Texture slot value meaning "nothing bound".
pub const NO_TEXTURE: u32 = u32::MAX;

/// Push constant block read by every PBR pipeline.
///
/// Constants are reached through buffer device addresses; textures through
/// indices into the bindless texture array.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub pass: u64,
    pub object: u64,
    pub material: u64,
    pub environment_texture: u32,
    pub diffuse_texture: u32,
}

impl Default for DrawPushConstants {
    fn default() -> Self {
        Self {
            pass: 0,
            object: 0,
            material: 0,
            environment_texture: NO_TEXTURE,
            diffuse_texture: NO_TEXTURE,
        }
    }
}

impl DrawPushConstants {
    /// Size of the block in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Shader stages that read the block.
    pub fn stages() -> vk::ShaderStageFlags {
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    }

    /// Push constant range pipeline layouts must declare.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: Self::stages(),
            offset: 0,
            size: Self::SIZE,
        }
    }
}

/// Pipelines and the shared layout they were built with.
#[derive(Debug, Default)]
pub struct PipelineTable {
    layout: vk::PipelineLayout,
    texture_set: vk::DescriptorSet,
    pipelines: HashMap<PipelineId, vk::Pipeline>,
}

impl PipelineTable {
    /// Creates a table for pipelines sharing `layout`.
    ///
    /// `texture_set` is the bindless texture descriptor set, bound once per
    /// command list. Pass a null handle when no textures are used.
    pub fn new(layout: vk::PipelineLayout, texture_set: vk::DescriptorSet) -> Self {
        Self {
            layout,
            texture_set,
            pipelines: HashMap::new(),
        }
    }

    /// Registers a pipeline, returning the one it replaced.
    pub fn insert(&mut self, id: PipelineId, pipeline: vk::Pipeline) -> Option<vk::Pipeline> {
        self.pipelines.insert(id, pipeline)
    }

    /// Looks up a pipeline.
    pub fn get(&self, id: PipelineId) -> Option<vk::Pipeline> {
        self.pipelines.get(&id).copied()
    }

    /// Shared pipeline layout.
    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Bindless texture descriptor set.
    #[inline]
    pub fn texture_set(&self) -> vk::DescriptorSet {
        self.texture_set
    }

    /// Number of registered pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if no pipeline is registered.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_push_constants_layout() {
        // 3 x u64 + 2 x u32, no padding
        assert_eq!(DrawPushConstants::SIZE, 32);
        assert_eq!(std::mem::offset_of!(DrawPushConstants, material), 16);
        assert_eq!(std::mem::offset_of!(DrawPushConstants, environment_texture), 24);
        // Vulkan guarantees at least 128 bytes of push constants.
        assert!(DrawPushConstants::SIZE <= 128);
    }

    #[test]
    fn test_default_push_constants_bind_no_texture() {
        let push = DrawPushConstants::default();
        assert_eq!(push.environment_texture, NO_TEXTURE);
        assert_eq!(push.diffuse_texture, NO_TEXTURE);
    }

    #[test]
    fn test_pipeline_table_lookup() {
        let mut table = PipelineTable::new(vk::PipelineLayout::null(), vk::DescriptorSet::null());
        assert!(table.is_empty());

        table.insert(PipelineId(1), vk::Pipeline::from_raw(0xabc));
        assert_eq!(table.get(PipelineId(1)), Some(vk::Pipeline::from_raw(0xabc)));
        assert_eq!(table.get(PipelineId(2)), None);
        assert_eq!(table.len(), 1);
    }
}
