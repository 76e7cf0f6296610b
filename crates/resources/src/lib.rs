//! Scene resources consumed by the frame pipeline.
//!
//! This crate holds the CPU-side records the renderer uploads or binds:
//! - GPU constant layouts ([`constants`])
//! - Materials and the material factory ([`material`])
//! - GPU-resident textures ([`texture`])
//! - GPU-resident meshes and procedural mesh recipes ([`mesh`])

mod error;

pub mod constants;
pub mod material;
pub mod mesh;
pub mod texture;

pub use constants::{Light, MAX_LIGHTS, MaterialConstants, ObjectConstants, PassConstants};
pub use error::{ResourceError, ResourceResult};
pub use material::{Material, MaterialId, MaterialLibrary, TextureChannels};
pub use mesh::{Mesh, MeshData, MeshId, MeshRecipe, MeshRegistry, Submesh};
pub use texture::{Texture, TextureId, TextureRegistry};
