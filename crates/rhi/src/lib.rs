//! Render hardware interface for the PBR frame pipeline.
//!
//! This crate defines the small set of GPU capabilities the frame pipeline
//! depends on ([`Backend`] and friends) and provides two implementations:
//! - [`vulkan::VulkanBackend`]: timeline semaphores, buffer device addresses
//!   and push constants over `ash` and `gpu-allocator`
//! - [`headless::HeadlessGpu`]: a simulated GPU timeline for tests and
//!   headless runs

mod backend;
mod error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod headless;
pub mod pipeline;
pub mod sync;
pub mod vertex;
pub mod vulkan;

pub use backend::{
    Backend, CommandAllocator, DrawRecorder, GpuFence, HostVisibleBuffer, PipelineId,
};
pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
