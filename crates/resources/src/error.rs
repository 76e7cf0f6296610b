//! Error types for resource registration.

use thiserror::Error;

/// Error type for resource operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A resource with this name already exists.
    #[error("{kind} '{name}' is already registered")]
    DuplicateName {
        /// Kind of resource ("material", "texture", "mesh").
        kind: &'static str,
        /// The clashing name.
        name: String,
    },

    /// A mesh recipe has parameters the generator cannot handle.
    #[error("Invalid mesh recipe: {0}")]
    InvalidRecipe(String),

    /// A mesh references a submesh that does not exist.
    #[error("Mesh '{mesh}' has no submesh '{submesh}'")]
    UnknownSubmesh {
        /// Mesh name.
        mesh: String,
        /// Requested submesh name.
        submesh: String,
    },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
