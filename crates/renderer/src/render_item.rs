//! Render items and render layers.
//!
//! A [`RenderItem`] is one draw: a submesh, a material and the transforms
//! placing it in the world. Every item belongs to exactly one
//! [`RenderLayer`], chosen once when the item is added to the scene.
//!
//! # Classification
//!
//! Opaque items are classified by which texture channels their material has,
//! checked in this order, first match wins:
//!
//! | diffuse | metallic | specular | layer |
//! |---------|----------|----------|-------|
//! | absent  | any      | any      | [`RenderLayer::OpaqueUntextured`] |
//! | present | absent   | any      | [`RenderLayer::OpaqueNoMetallic`] |
//! | present | present  | absent   | [`RenderLayer::OpaqueNoSpecular`] |
//! | present | present  | present  | [`RenderLayer::Opaque`] |
//!
//! Alpha-tested, transparent and background items are placed by their
//! [`ItemRole`] instead.

use glam::Mat4;

use pbr_resources::{MaterialId, MeshId, ObjectConstants, TextureChannels};
use pbr_rhi::PipelineId;

/// Draw-order and pipeline partition of render items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderLayer {
    /// Fully textured opaque geometry.
    Opaque,
    /// Opaque geometry with a diffuse map but no metallic map.
    OpaqueNoMetallic,
    /// Opaque geometry with diffuse and metallic maps but no specular map.
    OpaqueNoSpecular,
    /// Opaque geometry without a diffuse map.
    OpaqueUntextured,
    AlphaTested,
    Transparent,
    /// Environment geometry such as the sky sphere.
    Background,
}

impl RenderLayer {
    /// Number of layers.
    pub const COUNT: usize = 7;

    /// Order in which layers are drawn every frame.
    ///
    /// Opaque geometry resolves depth before blended geometry is composited.
    pub const DRAW_ORDER: [RenderLayer; Self::COUNT] = [
        RenderLayer::Opaque,
        RenderLayer::OpaqueNoMetallic,
        RenderLayer::OpaqueNoSpecular,
        RenderLayer::OpaqueUntextured,
        RenderLayer::AlphaTested,
        RenderLayer::Transparent,
        RenderLayer::Background,
    ];

    /// Opaque layer for a material's texture channels.
    pub fn classify(textures: &TextureChannels) -> Self {
        if textures.diffuse.is_none() {
            RenderLayer::OpaqueUntextured
        } else if textures.metallic.is_none() {
            RenderLayer::OpaqueNoMetallic
        } else if textures.specular.is_none() {
            RenderLayer::OpaqueNoSpecular
        } else {
            RenderLayer::Opaque
        }
    }

    /// Layer for an item with the given role and material channels.
    pub fn for_role(role: ItemRole, textures: &TextureChannels) -> Self {
        match role {
            ItemRole::Opaque => Self::classify(textures),
            ItemRole::AlphaTested => RenderLayer::AlphaTested,
            ItemRole::Transparent => RenderLayer::Transparent,
            ItemRole::Background => RenderLayer::Background,
        }
    }

    /// Position in [`Self::DRAW_ORDER`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            RenderLayer::Opaque => "opaque",
            RenderLayer::OpaqueNoMetallic => "opaque_no_metallic",
            RenderLayer::OpaqueNoSpecular => "opaque_no_specular",
            RenderLayer::OpaqueUntextured => "opaque_untextured",
            RenderLayer::AlphaTested => "alpha_tested",
            RenderLayer::Transparent => "transparent",
            RenderLayer::Background => "background",
        }
    }
}

/// What an item is drawn as, independent of its material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ItemRole {
    #[default]
    Opaque,
    AlphaTested,
    Transparent,
    Background,
}

/// Pipeline used for each layer, plus the wireframe override.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerPipelines {
    layers: [PipelineId; RenderLayer::COUNT],
    wireframe: PipelineId,
}

impl LayerPipelines {
    /// Creates a table from per-layer pipelines, indexed by [`RenderLayer::index`].
    pub fn new(layers: [PipelineId; RenderLayer::COUNT], wireframe: PipelineId) -> Self {
        Self { layers, wireframe }
    }

    /// Layer `i` uses pipeline `i`; wireframe uses pipeline `COUNT`.
    pub fn sequential() -> Self {
        Self {
            layers: std::array::from_fn(|i| PipelineId(i as u32)),
            wireframe: PipelineId(RenderLayer::COUNT as u32),
        }
    }

    /// Pipeline drawing `layer`. In wireframe mode every layer uses the
    /// wireframe pipeline.
    #[inline]
    pub fn get(&self, layer: RenderLayer, wireframe: bool) -> PipelineId {
        if wireframe {
            self.wireframe
        } else {
            self.layers[layer.index()]
        }
    }
}

impl Default for LayerPipelines {
    fn default() -> Self {
        Self::sequential()
    }
}

/// Handle to a render item in a [`RenderScene`](crate::scene::RenderScene).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u32);

impl ItemId {
    /// Position of the item in its scene.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One drawable instance.
#[derive(Clone, Debug)]
pub struct RenderItem {
    pub(crate) name: String,
    pub(crate) world: Mat4,
    pub(crate) tex_transform: Mat4,
    pub(crate) material: MaterialId,
    pub(crate) mesh: MeshId,
    pub(crate) submesh: usize,
    pub(crate) role: ItemRole,
    pub(crate) layer: RenderLayer,
    pub(crate) object_index: usize,
    pub(crate) frames_dirty: usize,
}

impl RenderItem {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object to world transform.
    #[inline]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    /// Texture coordinate transform.
    #[inline]
    pub fn tex_transform(&self) -> Mat4 {
        self.tex_transform
    }

    #[inline]
    pub fn material(&self) -> MaterialId {
        self.material
    }

    #[inline]
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    /// Index into the mesh's submesh list.
    #[inline]
    pub fn submesh(&self) -> usize {
        self.submesh
    }

    #[inline]
    pub fn role(&self) -> ItemRole {
        self.role
    }

    /// Layer chosen when the item was added.
    #[inline]
    pub fn layer(&self) -> RenderLayer {
        self.layer
    }

    /// Entry index in every frame slot's object constant pool.
    #[inline]
    pub fn object_index(&self) -> usize {
        self.object_index
    }

    /// Number of frame slots still holding stale constants.
    #[inline]
    pub fn frames_dirty(&self) -> usize {
        self.frames_dirty
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frames_dirty > 0
    }

    /// Constants as uploaded to the GPU.
    pub fn object_constants(&self) -> ObjectConstants {
        ObjectConstants::new(self.world, self.tex_transform)
    }

    /// Records that the current frame slot received the latest constants.
    pub fn mark_frame_updated(&mut self) {
        debug_assert!(self.frames_dirty > 0, "render item '{}' is not dirty", self.name);
        self.frames_dirty = self.frames_dirty.saturating_sub(1);
    }
}
