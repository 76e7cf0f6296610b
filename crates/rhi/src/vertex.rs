//! Vertex data structures and geometry views.
//!
//! # Vertex Types
//!
//! - [`Vertex`] - PBR vertex with position, normal, tangent, bitangent and UV
//! - [`VertexBufferView`] / [`IndexBufferView`] - where GPU-resident geometry lives

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Standard vertex format used by the PBR shaders.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: tangent (12 bytes)
/// - Offset 36: bitangent (12 bytes)
/// - Offset 48: tex_coord (8 bytes)
/// - Total size: 56 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position in object space.
    pub position: Vec3,
    /// Surface normal vector (should be normalized).
    pub normal: Vec3,
    /// Tangent along increasing U.
    pub tangent: Vec3,
    /// Bitangent along increasing V.
    pub bitangent: Vec3,
    /// Texture coordinates (UV).
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Creates a new vertex with the specified attributes.
    #[inline]
    pub const fn new(
        position: Vec3,
        normal: Vec3,
        tangent: Vec3,
        bitangent: Vec3,
        tex_coord: Vec2,
    ) -> Self {
        Self {
            position,
            normal,
            tangent,
            bitangent,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Get the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        let vec3 = |location, offset| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format: vk::Format::R32G32B32_SFLOAT,
            offset,
        };
        [
            vec3(0, 0),
            vec3(1, 12),
            vec3(2, 24),
            vec3(3, 36),
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 4,
                format: vk::Format::R32G32_SFLOAT,
                offset: 48,
            },
        ]
    }
}

/// Width of the indices in an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }

    /// Converts to the Vulkan index type.
    pub fn to_vk(self) -> vk::IndexType {
        match self {
            IndexFormat::U16 => vk::IndexType::UINT16,
            IndexFormat::U32 => vk::IndexType::UINT32,
        }
    }
}

/// A GPU-resident vertex buffer range.
///
/// `buffer` is the backend's raw buffer handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexBufferView {
    pub buffer: u64,
    pub offset: u64,
    pub size: u64,
    pub stride: u32,
}

/// A GPU-resident index buffer range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer: u64,
    pub offset: u64,
    pub size: u64,
    pub format: IndexFormat,
}
