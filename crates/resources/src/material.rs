//! Materials and the material factory.
//!
//! Every [`Material`] owns one entry in each frame slot's material constant
//! pool. The entry index is handed out by the [`MaterialLibrary`] that
//! created the material, and never changes afterwards.
//!
//! A material carries a dirty counter. Creating or mutating the material
//! sets it to the number of frame slots (K); the update step writes the
//! constants into the current slot and decrements it. After K ticks every
//! slot holds the latest parameters.

use std::collections::HashMap;

use pbr_core::IndexSequence;
use tracing::debug;

use crate::constants::MaterialConstants;
use crate::error::{ResourceError, ResourceResult};
use crate::texture::TextureId;

/// Handle to a material in a [`MaterialLibrary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

impl MaterialId {
    /// Position of the material in its library.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Texture channels a material may sample. `None` means the channel is absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureChannels {
    pub diffuse: Option<TextureId>,
    /// Secondary reflectance.
    pub specular: Option<TextureId>,
    pub metallic: Option<TextureId>,
    pub roughness: Option<TextureId>,
    pub normal: Option<TextureId>,
    pub displacement: Option<TextureId>,
    pub bump: Option<TextureId>,
    pub ambient_occlusion: Option<TextureId>,
    pub cavity: Option<TextureId>,
    pub sheen: Option<TextureId>,
    pub emissive: Option<TextureId>,
    pub opacity: Option<TextureId>,
}

impl TextureChannels {
    /// No channel present.
    pub const NONE: Self = Self {
        diffuse: None,
        specular: None,
        metallic: None,
        roughness: None,
        normal: None,
        displacement: None,
        bump: None,
        ambient_occlusion: None,
        cavity: None,
        sheen: None,
        emissive: None,
        opacity: None,
    };

    /// Number of channels present.
    pub fn count(&self) -> usize {
        [
            self.diffuse,
            self.specular,
            self.metallic,
            self.roughness,
            self.normal,
            self.displacement,
            self.bump,
            self.ambient_occlusion,
            self.cavity,
            self.sheen,
            self.emissive,
            self.opacity,
        ]
        .iter()
        .filter(|channel| channel.is_some())
        .count()
    }
}

/// A named set of shading parameters and textures.
#[derive(Clone, Debug)]
pub struct Material {
    name: String,
    properties: MaterialConstants,
    textures: TextureChannels,
    constant_index: usize,
    frames_dirty: usize,
}

impl Material {
    /// Unique name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current shading parameters.
    #[inline]
    pub fn properties(&self) -> &MaterialConstants {
        &self.properties
    }

    /// Texture channels.
    #[inline]
    pub fn textures(&self) -> &TextureChannels {
        &self.textures
    }

    /// Entry index in every frame slot's material constant pool.
    #[inline]
    pub fn constant_index(&self) -> usize {
        self.constant_index
    }

    /// Number of frame slots still holding stale constants.
    #[inline]
    pub fn frames_dirty(&self) -> usize {
        self.frames_dirty
    }

    /// Returns true if some frame slot still needs these constants.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frames_dirty > 0
    }

    /// Records that the current frame slot received the latest constants.
    pub fn mark_frame_updated(&mut self) {
        debug_assert!(self.frames_dirty > 0, "material '{}' is not dirty", self.name);
        self.frames_dirty = self.frames_dirty.saturating_sub(1);
    }
}

/// Creates materials and owns them.
///
/// Constant indices come from the library's own [`IndexSequence`], so two
/// libraries never influence each other's numbering.
#[derive(Debug)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
    sequence: IndexSequence,
    frames_in_flight: usize,
}

impl MaterialLibrary {
    /// Creates an empty library for `frames_in_flight` frame slots.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(frames_in_flight: usize) -> Self {
        Self::with_sequence(frames_in_flight, IndexSequence::new())
    }

    /// Creates an empty library that continues numbering from `sequence`.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn with_sequence(frames_in_flight: usize, sequence: IndexSequence) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            materials: Vec::new(),
            by_name: HashMap::new(),
            sequence,
            frames_in_flight,
        }
    }

    /// Creates a material and assigns it the next constant index.
    ///
    /// The new material is dirty for every frame slot.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateName`] if `name` is taken.
    pub fn create(
        &mut self,
        name: &str,
        properties: MaterialConstants,
        textures: TextureChannels,
    ) -> ResourceResult<MaterialId> {
        if self.by_name.contains_key(name) {
            return Err(ResourceError::DuplicateName {
                kind: "material",
                name: name.to_string(),
            });
        }

        let id = MaterialId(self.materials.len() as u32);
        let constant_index = self.sequence.next_index();
        self.materials.push(Material {
            name: name.to_string(),
            properties,
            textures,
            constant_index,
            frames_dirty: self.frames_in_flight,
        });
        self.by_name.insert(name.to_string(), id);

        debug!(
            "Created material '{}' (constant index {}, {} texture channel(s))",
            name,
            constant_index,
            textures.count()
        );
        Ok(id)
    }

    /// Returns a material.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different library.
    pub fn get(&self, id: MaterialId) -> &Material {
        &self.materials[id.index()]
    }

    /// Looks a material up by name.
    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    /// Mutates a material's parameters and marks it dirty for every slot.
    pub fn update(&mut self, id: MaterialId, f: impl FnOnce(&mut MaterialConstants)) {
        let k = self.frames_in_flight;
        let material = &mut self.materials[id.index()];
        f(&mut material.properties);
        material.frames_dirty = k;
    }

    /// Marks every material dirty for every slot.
    pub fn mark_all_dirty(&mut self) {
        let k = self.frames_in_flight;
        for material in &mut self.materials {
            material.frames_dirty = k;
        }
    }

    /// Iterates over all materials.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials
            .iter()
            .enumerate()
            .map(|(i, material)| (MaterialId(i as u32), material))
    }

    /// Iterates mutably over materials that still have stale slots.
    pub fn dirty_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.iter_mut().filter(|m| m.is_dirty())
    }

    /// Number of materials. Also the capacity each slot's material pool needs.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns true if the library is empty.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Number of frame slots dirty counters are reset to.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Highest constant index issued plus one.
    #[inline]
    pub fn constant_slots(&self) -> usize {
        self.sequence.issued()
    }
}
