//! Core utilities for the PBR frame pipeline.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Renderer configuration
//! - Index sequence generation for constant-buffer slots

mod config;
mod error;
mod logging;
mod sequence;
mod timer;

pub use config::{MAX_FRAMES_IN_FLIGHT, RendererConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with};
pub use sequence::IndexSequence;
pub use timer::{FrameTime, Timer};
