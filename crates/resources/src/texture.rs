//! GPU-resident textures.
//!
//! Image decoding and upload happen in the asset loader. By the time a
//! texture is registered here it already lives on the GPU and has a slot in
//! the shader-visible texture array; the registry only remembers that slot.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Handle to a registered texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

impl TextureId {
    /// Position of the texture in its registry.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A texture the shaders can sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texture {
    /// Unique name.
    pub name: String,
    /// Slot in the shader-visible texture array.
    pub descriptor_index: u32,
}

/// Arena of textures addressed by [`TextureId`].
#[derive(Debug, Default)]
pub struct TextureRegistry {
    textures: Vec<Texture>,
    by_name: HashMap<String, TextureId>,
}

impl TextureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an uploaded texture.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateName`] if `name` is taken.
    pub fn register(&mut self, name: &str, descriptor_index: u32) -> ResourceResult<TextureId> {
        if self.by_name.contains_key(name) {
            return Err(ResourceError::DuplicateName {
                kind: "texture",
                name: name.to_string(),
            });
        }
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(Texture {
            name: name.to_string(),
            descriptor_index,
        });
        self.by_name.insert(name.to_string(), id);
        debug!("Registered texture '{}' at descriptor {}", name, descriptor_index);
        Ok(id)
    }

    /// Returns a texture.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different registry.
    pub fn get(&self, id: TextureId) -> &Texture {
        &self.textures[id.index()]
    }

    /// Shader descriptor slot of a texture.
    #[inline]
    pub fn descriptor_index(&self, id: TextureId) -> u32 {
        self.get(id).descriptor_index
    }

    /// Looks a texture up by name.
    pub fn find(&self, name: &str) -> Option<TextureId> {
        self.by_name.get(name).copied()
    }

    /// Number of registered textures.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Returns true if no texture is registered.
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut textures = TextureRegistry::new();
        let sky = textures.register("sky", 0).unwrap();
        let brick = textures.register("brick_diffuse", 7).unwrap();

        assert_eq!(textures.len(), 2);
        assert_eq!(textures.find("brick_diffuse"), Some(brick));
        assert_eq!(textures.descriptor_index(brick), 7);
        assert_eq!(textures.get(sky).name, "sky");
        assert_eq!(textures.find("missing"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut textures = TextureRegistry::new();
        textures.register("sky", 0).unwrap();
        let err = textures.register("sky", 1).unwrap_err();
        assert!(matches!(err, ResourceError::DuplicateName { kind: "texture", .. }));
    }
}
