//! Frame pipeline for the PBR demo.
//!
//! This crate drives one frame tick end to end:
//! - Frame resource slots and their upload buffers
//! - Fence-gated rotation through the slots
//! - Render items, layers and the per-tick update step
//! - Layer-ordered draw dispatch
//!
//! Everything is generic over [`pbr_rhi::Backend`], so the same code runs on
//! Vulkan and on the headless simulated GPU.

mod error;

pub mod dispatch;
pub mod fence;
pub mod frame_manager;
pub mod frame_resource;
pub mod render_item;
pub mod renderer;
pub mod scene;
pub mod update;
pub mod upload_buffer;

pub use dispatch::{DispatchOptions, record_layers};
pub use error::{RendererError, RendererResult};
pub use fence::FrameFence;
pub use frame_manager::FrameManager;
pub use frame_resource::{FrameCapacities, FrameResource};
pub use render_item::{ItemId, ItemRole, LayerPipelines, RenderItem, RenderLayer};
pub use renderer::{FrameRenderer, SceneResources};
pub use scene::{RenderItemDesc, RenderScene};
pub use upload_buffer::{CONSTANT_BUFFER_ALIGNMENT, UploadBuffer};

/// Number of frame resource slots used when no configuration overrides it.
pub const NUM_FRAME_RESOURCES: usize = 3;
