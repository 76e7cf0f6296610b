//! Renderer configuration loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound on frames in flight accepted by [`RendererConfig::validate`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Frame pipeline settings.
///
/// Missing keys fall back to [`Default`].
///
/// ```
/// let config = pbr_core::RendererConfig::from_toml_str("frames_in_flight = 2").unwrap();
/// assert_eq!(config.frames_in_flight, 2);
/// assert!(!config.wireframe);
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Number of frame resource slots (K).
    pub frames_in_flight: usize,
    /// Bound on the fence wait in milliseconds. `None` waits forever.
    pub fence_timeout_ms: Option<u64>,
    /// Draw every layer with the wireframe pipeline.
    pub wireframe: bool,
    /// Clear color of the back buffer.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            fence_timeout_ms: None,
            wireframe: false,
            clear_color: [0.5, 0.5, 0.5, 1.0],
        }
    }
}

impl RendererConfig {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!("Loaded renderer config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Checks that values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `frames_in_flight` is zero or larger
    /// than [`MAX_FRAMES_IN_FLIGHT`], or when the fence timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.fence_timeout_ms == Some(0) {
            return Err(Error::Config("fence_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Fence wait bound as a [`Duration`].
    pub fn fence_timeout(&self) -> Option<Duration> {
        self.fence_timeout_ms.map(Duration::from_millis)
    }
}
