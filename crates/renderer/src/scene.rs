//! The render item arena.
//!
//! [`RenderScene`] owns every render item and the per-layer draw lists.
//! Items are added once while the scene is built and live until shutdown;
//! only their transforms change afterwards.
//!
//! Each item gets the next object constant index from the scene's own
//! [`IndexSequence`], so the number of items added is exactly the object
//! pool capacity every frame slot needs.

use std::collections::HashMap;

use glam::Mat4;
use tracing::debug;

use pbr_core::IndexSequence;
use pbr_resources::{MaterialId, MaterialLibrary, MeshId, MeshRegistry, ResourceError};

use crate::error::{RendererError, RendererResult};
use crate::render_item::{ItemId, ItemRole, RenderItem, RenderLayer};

/// Parameters of a new render item.
#[derive(Clone, Debug)]
pub struct RenderItemDesc {
    pub name: String,
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub material: MaterialId,
    pub mesh: MeshId,
    /// Name of the submesh to draw.
    pub submesh: String,
    pub role: ItemRole,
}

impl RenderItemDesc {
    /// Opaque item with identity transforms.
    pub fn new(name: &str, mesh: MeshId, submesh: &str, material: MaterialId) -> Self {
        Self {
            name: name.to_string(),
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            material,
            mesh,
            submesh: submesh.to_string(),
            role: ItemRole::Opaque,
        }
    }

    pub fn with_world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn with_tex_transform(mut self, tex_transform: Mat4) -> Self {
        self.tex_transform = tex_transform;
        self
    }

    pub fn with_role(mut self, role: ItemRole) -> Self {
        self.role = role;
        self
    }
}

/// Arena of render items, partitioned by layer.
#[derive(Debug)]
pub struct RenderScene {
    items: Vec<RenderItem>,
    by_name: HashMap<String, ItemId>,
    layers: [Vec<ItemId>; RenderLayer::COUNT],
    sequence: IndexSequence,
    frames_in_flight: usize,
}

impl RenderScene {
    /// Creates an empty scene for `frames_in_flight` frame slots.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            items: Vec::new(),
            by_name: HashMap::new(),
            layers: Default::default(),
            sequence: IndexSequence::new(),
            frames_in_flight,
        }
    }

    /// Adds an item, assigns its object constant index and classifies it.
    ///
    /// The new item is dirty for every frame slot.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, or if the material, mesh or submesh does
    /// not exist.
    pub fn add_item(
        &mut self,
        desc: RenderItemDesc,
        materials: &MaterialLibrary,
        meshes: &MeshRegistry,
    ) -> RendererResult<ItemId> {
        if self.by_name.contains_key(&desc.name) {
            return Err(ResourceError::DuplicateName {
                kind: "render item",
                name: desc.name,
            }
            .into());
        }
        if desc.material.index() >= materials.len() {
            return Err(RendererError::InvalidItem {
                name: desc.name,
                reason: format!("material {} does not exist", desc.material.index()),
            });
        }
        if desc.mesh.index() >= meshes.len() {
            return Err(RendererError::InvalidItem {
                name: desc.name,
                reason: format!("mesh {} does not exist", desc.mesh.index()),
            });
        }
        let submesh = meshes.get(desc.mesh).submesh_index(&desc.submesh)?;

        let material = materials.get(desc.material);
        let layer = RenderLayer::for_role(desc.role, material.textures());
        let id = ItemId(self.items.len() as u32);
        let object_index = self.sequence.next_index();

        debug!(
            "Added render item '{}' (object index {}, material '{}', layer {})",
            desc.name,
            object_index,
            material.name(),
            layer.name()
        );

        self.by_name.insert(desc.name.clone(), id);
        self.layers[layer.index()].push(id);
        self.items.push(RenderItem {
            name: desc.name,
            world: desc.world,
            tex_transform: desc.tex_transform,
            material: desc.material,
            mesh: desc.mesh,
            submesh,
            role: desc.role,
            layer,
            object_index,
            frames_dirty: self.frames_in_flight,
        });
        Ok(id)
    }

    /// Returns an item.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different scene.
    pub fn get(&self, id: ItemId) -> &RenderItem {
        &self.items[id.index()]
    }

    /// Looks an item up by name.
    pub fn find(&self, name: &str) -> Option<ItemId> {
        self.by_name.get(name).copied()
    }

    /// Moves an item and marks it dirty for every slot.
    pub fn set_world(&mut self, id: ItemId, world: Mat4) {
        let k = self.frames_in_flight;
        let item = &mut self.items[id.index()];
        item.world = world;
        item.frames_dirty = k;
    }

    /// Changes an item's texture transform and marks it dirty for every slot.
    pub fn set_tex_transform(&mut self, id: ItemId, tex_transform: Mat4) {
        let k = self.frames_in_flight;
        let item = &mut self.items[id.index()];
        item.tex_transform = tex_transform;
        item.frames_dirty = k;
    }

    /// Marks every item dirty for every slot.
    pub fn mark_all_dirty(&mut self) {
        let k = self.frames_in_flight;
        for item in &mut self.items {
            item.frames_dirty = k;
        }
    }

    /// Items drawn in `layer`, in insertion order.
    #[inline]
    pub fn layer(&self, layer: RenderLayer) -> &[ItemId] {
        &self.layers[layer.index()]
    }

    /// Iterates over all items.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &RenderItem)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (ItemId(i as u32), item))
    }

    /// Iterates mutably over items that still have stale slots.
    pub fn dirty_mut(&mut self) -> impl Iterator<Item = &mut RenderItem> {
        self.items.iter_mut().filter(|item| item.is_dirty())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of frame slots dirty counters are reset to.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Object constant entries each frame slot needs.
    #[inline]
    pub fn object_slots(&self) -> usize {
        self.sequence.issued()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use pbr_resources::{
        MaterialConstants, Mesh, MeshRecipe, TextureChannels, TextureRegistry,
    };
    use pbr_rhi::vertex::{IndexBufferView, VertexBufferView};

    use super::*;

    struct Fixture {
        materials: MaterialLibrary,
        meshes: MeshRegistry,
        plain: MaterialId,
        textured: MaterialId,
        sphere: MeshId,
    }

    fn fixture() -> Fixture {
        let mut textures = TextureRegistry::new();
        let diffuse = textures.register("diffuse", 0).unwrap();

        let mut materials = MaterialLibrary::new(3);
        let plain = materials
            .create("plain", MaterialConstants::default(), TextureChannels::NONE)
            .unwrap();
        let textured = materials
            .create(
                "textured",
                MaterialConstants::default(),
                TextureChannels {
                    diffuse: Some(diffuse),
                    ..TextureChannels::NONE
                },
            )
            .unwrap();

        let data = MeshRecipe::Sphere {
            radius: 1.0,
            slices: 8,
            stacks: 8,
        }
        .build()
        .unwrap();
        let mut meshes = MeshRegistry::new();
        let sphere = meshes
            .register(Mesh {
                name: "sphere".into(),
                vertex_buffer: VertexBufferView::default(),
                index_buffer: IndexBufferView {
                    buffer: 0,
                    offset: 0,
                    size: data.index_bytes().len() as u64,
                    format: data.index_format(),
                },
                submeshes: vec![data.whole("sphere")],
            })
            .unwrap();

        Fixture {
            materials,
            meshes,
            plain,
            textured,
            sphere,
        }
    }

    #[test]
    fn test_object_indices_and_layers() {
        let f = fixture();
        let mut scene = RenderScene::new(3);
        let a = scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "sphere", f.plain),
                &f.materials,
                &f.meshes,
            )
            .unwrap();
        let b = scene
            .add_item(
                RenderItemDesc::new("b", f.sphere, "sphere", f.textured),
                &f.materials,
                &f.meshes,
            )
            .unwrap();
        let sky = scene
            .add_item(
                RenderItemDesc::new("sky", f.sphere, "sphere", f.textured)
                    .with_role(ItemRole::Background),
                &f.materials,
                &f.meshes,
            )
            .unwrap();

        assert_eq!(scene.get(a).object_index(), 0);
        assert_eq!(scene.get(b).object_index(), 1);
        assert_eq!(scene.get(sky).object_index(), 2);
        assert_eq!(scene.object_slots(), 3);

        assert_eq!(scene.layer(RenderLayer::OpaqueUntextured), &[a]);
        assert_eq!(scene.layer(RenderLayer::OpaqueNoMetallic), &[b]);
        assert_eq!(scene.layer(RenderLayer::Background), &[sky]);
        assert!(scene.layer(RenderLayer::Opaque).is_empty());
        assert_eq!(scene.find("sky"), Some(sky));
    }

    #[test]
    fn test_mutation_resets_dirty_counter() {
        let f = fixture();
        let mut scene = RenderScene::new(3);
        let id = scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "sphere", f.plain),
                &f.materials,
                &f.meshes,
            )
            .unwrap();
        assert_eq!(scene.get(id).frames_dirty(), 3);

        for _ in 0..3 {
            scene.dirty_mut().for_each(RenderItem::mark_frame_updated);
        }
        assert!(!scene.get(id).is_dirty());
        assert_eq!(scene.dirty_mut().count(), 0);

        scene.set_world(id, Mat4::from_translation(Vec3::X));
        assert_eq!(scene.get(id).frames_dirty(), 3);
        assert_eq!(scene.get(id).world(), Mat4::from_translation(Vec3::X));

        scene.dirty_mut().for_each(RenderItem::mark_frame_updated);
        scene.set_tex_transform(id, Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(scene.get(id).frames_dirty(), 3);
    }

    #[test]
    fn test_layer_is_fixed_at_build_time() {
        let mut f = fixture();
        let mut scene = RenderScene::new(3);
        let id = scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "sphere", f.textured),
                &f.materials,
                &f.meshes,
            )
            .unwrap();
        f.materials.update(f.textured, |p| p.roughness = 0.1);
        scene.set_world(id, Mat4::IDENTITY);
        assert_eq!(scene.get(id).layer(), RenderLayer::OpaqueNoMetallic);
    }

    #[test]
    fn test_invalid_items_rejected() {
        let f = fixture();
        let mut scene = RenderScene::new(3);

        let err = scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "missing", f.plain),
                &f.materials,
                &f.meshes,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RendererError::Resource(ResourceError::UnknownSubmesh { .. })
        ));

        let other = MaterialLibrary::new(3);
        let err = scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "sphere", f.plain),
                &other,
                &f.meshes,
            )
            .unwrap_err();
        assert!(matches!(err, RendererError::InvalidItem { .. }));

        scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "sphere", f.plain),
                &f.materials,
                &f.meshes,
            )
            .unwrap();
        let err = scene
            .add_item(
                RenderItemDesc::new("a", f.sphere, "sphere", f.plain),
                &f.materials,
                &f.meshes,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RendererError::Resource(ResourceError::DuplicateName { .. })
        ));
        // Failed additions consume no object index.
        assert_eq!(scene.object_slots(), 1);
    }

    #[test]
    fn test_mark_all_dirty() {
        let f = fixture();
        let mut scene = RenderScene::new(2);
        for name in ["a", "b"] {
            scene
                .add_item(
                    RenderItemDesc::new(name, f.sphere, "sphere", f.plain),
                    &f.materials,
                    &f.meshes,
                )
                .unwrap();
        }
        scene.dirty_mut().for_each(RenderItem::mark_frame_updated);
        scene.dirty_mut().for_each(RenderItem::mark_frame_updated);
        assert_eq!(scene.dirty_mut().count(), 0);

        scene.mark_all_dirty();
        assert!(scene.iter().all(|(_, item)| item.frames_dirty() == 2));
    }
}
