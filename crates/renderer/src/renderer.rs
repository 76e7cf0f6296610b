//! Per-tick orchestration.
//!
//! [`FrameRenderer`] ties the pieces together in the order one tick needs:
//!
//! ```text
//! begin_frame   device check, rotate + fence gate + allocator reset,
//!               update step, open command list
//! record_draws  layer-ordered dispatch into the command list
//! end_frame     execute, device check, signal the fence
//! ```
//!
//! Presenting the image is left to the caller.

use glam::Mat4;
use tracing::{debug, info, trace, warn};

use pbr_core::{FrameTime, RendererConfig};
use pbr_resources::{
    MaterialConstants, MaterialId, MaterialLibrary, MeshRegistry, PassConstants, TextureId,
    TextureRegistry,
};
use pbr_rhi::Backend;

use crate::dispatch::{DispatchOptions, record_layers};
use crate::error::{RendererError, RendererResult};
use crate::frame_manager::FrameManager;
use crate::frame_resource::FrameCapacities;
use crate::render_item::{ItemId, LayerPipelines};
use crate::scene::RenderScene;
use crate::update::{update_material_constants, update_object_constants, update_pass_constants};

/// Everything the renderer draws.
///
/// The scene and material library must be fully built before the renderer
/// is created; their sizes fix the capacity of every frame slot.
#[derive(Debug)]
pub struct SceneResources {
    pub materials: MaterialLibrary,
    pub meshes: MeshRegistry,
    pub textures: TextureRegistry,
    pub scene: RenderScene,
}

/// Drives frame ticks on a backend.
pub struct FrameRenderer<B: Backend> {
    backend: B,
    frames: FrameManager<B>,
    resources: SceneResources,
    pass: PassConstants,
    options: DispatchOptions,
    config: RendererConfig,
    ticks: u64,
}

impl<B: Backend> FrameRenderer<B> {
    /// Creates the frame slots for `resources`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, if the resources were built for
    /// a different number of frames in flight, or if GPU resources cannot be
    /// created.
    pub fn new(
        backend: B,
        config: RendererConfig,
        resources: SceneResources,
        pipelines: LayerPipelines,
    ) -> RendererResult<Self> {
        config.validate()?;

        let k = config.frames_in_flight;
        for (what, frames) in [
            ("material library", resources.materials.frames_in_flight()),
            ("render scene", resources.scene.frames_in_flight()),
        ] {
            if frames != k {
                return Err(pbr_core::Error::Config(format!(
                    "{} was built for {} frames in flight, renderer uses {}",
                    what, frames, k
                ))
                .into());
            }
        }

        let capacities = FrameCapacities {
            materials: resources.materials.constant_slots(),
            objects: resources.scene.object_slots(),
        };
        let frames = FrameManager::new(&backend, k, capacities, config.fence_timeout())?;

        info!(
            "Frame renderer ready: {} render items, {} materials, {} meshes, {} textures",
            resources.scene.len(),
            resources.materials.len(),
            resources.meshes.len(),
            resources.textures.len()
        );

        let options = DispatchOptions {
            pipelines,
            wireframe: config.wireframe,
            environment_texture: None,
        };

        Ok(Self {
            backend,
            frames,
            resources,
            pass: PassConstants::default(),
            options,
            config,
            ticks: 0,
        })
    }

    /// Checks the device, claims the next frame slot, runs the update step
    /// and opens a command list.
    ///
    /// Blocks if the slot's previous GPU work has not finished.
    ///
    /// # Errors
    ///
    /// Any error here is fatal: the device is lost, the fence misbehaved or
    /// a bounded wait expired.
    pub fn begin_frame(&mut self, time: FrameTime) -> RendererResult<B::CommandList> {
        self.backend.device_status()?;

        let frame = self.frames.begin_frame()?;
        self.pass.set_time(time.total, time.delta);

        let objects = update_object_constants(
            &mut self.resources.scene,
            frame.object_constants_mut(),
        );
        let materials = update_material_constants(
            &mut self.resources.materials,
            frame.material_constants_mut(),
        );
        update_pass_constants(&self.pass, frame.pass_constants_mut());

        let list = self.backend.begin_command_list(frame.allocator_mut())?;

        trace!(
            "Tick {}: slot {}, {} object and {} material write(s)",
            self.ticks,
            self.frames.current_index(),
            objects,
            materials
        );
        Ok(list)
    }

    /// Records the draws for every layer. Returns the number of draws.
    ///
    /// # Panics
    ///
    /// Panics if no frame has been begun.
    pub fn record_draws(&mut self, list: &mut B::CommandList) -> RendererResult<usize> {
        assert!(
            self.frames.is_recording(),
            "record_draws called outside begin_frame/end_frame"
        );
        let draws = record_layers(
            list,
            self.frames.current_frame(),
            &self.resources.scene,
            &self.resources.materials,
            &self.resources.meshes,
            &self.resources.textures,
            &self.options,
        )?;
        Ok(draws)
    }

    /// Submits the command list, checks the device and signals the fence.
    ///
    /// Returns the fence value tagging this frame.
    ///
    /// # Panics
    ///
    /// Panics if no frame has been begun.
    pub fn end_frame(&mut self, list: B::CommandList) -> RendererResult<u64> {
        assert!(
            self.frames.is_recording(),
            "end_frame called without begin_frame"
        );
        self.backend.execute(list)?;
        self.backend.device_status()?;

        let value = self.frames.end_frame()?;
        self.ticks += 1;
        Ok(value)
    }

    /// Runs one full tick. Returns the fence value tagging it.
    pub fn render_frame(&mut self, time: FrameTime) -> RendererResult<u64> {
        let mut list = self.begin_frame(time)?;
        self.record_draws(&mut list)?;
        self.end_frame(list)
    }

    /// Waits for the GPU to finish every submitted frame.
    ///
    /// Dropping the renderer drains the GPU too; calling this first lets the
    /// caller see the error. A lost device is logged and reported, since
    /// there is nothing left to wait for.
    pub fn shutdown(&mut self) -> RendererResult<()> {
        if self.frames.is_recording() {
            warn!("Shutting down with a frame still being recorded");
        }
        match self.frames.wait_for_all_frames() {
            Ok(()) => {
                info!(
                    "Renderer shut down after {} frames (fence value {})",
                    self.ticks,
                    self.frames.fence().current_value()
                );
                Ok(())
            }
            Err(err) => {
                warn!("GPU could not be drained: {}", err);
                Err(RendererError::from(err))
            }
        }
    }

    /// Pass constants uploaded every tick. Timing fields are overwritten by
    /// `begin_frame`.
    #[inline]
    pub fn pass_constants_mut(&mut self) -> &mut PassConstants {
        &mut self.pass
    }

    #[inline]
    pub fn pass_constants(&self) -> &PassConstants {
        &self.pass
    }

    /// Scene resources.
    #[inline]
    pub fn resources(&self) -> &SceneResources {
        &self.resources
    }

    /// Moves a render item. Every slot picks the new transform up over the
    /// next K ticks.
    pub fn set_world(&mut self, id: ItemId, world: Mat4) {
        self.resources.scene.set_world(id, world);
    }

    /// Changes a render item's texture-coordinate transform.
    pub fn set_tex_transform(&mut self, id: ItemId, tex_transform: Mat4) {
        self.resources.scene.set_tex_transform(id, tex_transform);
    }

    /// Edits a material's parameters.
    ///
    /// Items and materials cannot be added here: the frame slots were sized
    /// for the resources handed to [`FrameRenderer::new`].
    pub fn update_material(&mut self, id: MaterialId, f: impl FnOnce(&mut MaterialConstants)) {
        self.resources.materials.update(id, f);
    }

    /// Switches every layer to the wireframe pipeline.
    pub fn set_wireframe(&mut self, wireframe: bool) {
        if self.options.wireframe != wireframe {
            debug!("Wireframe {}", if wireframe { "on" } else { "off" });
        }
        self.options.wireframe = wireframe;
    }

    #[inline]
    pub fn wireframe(&self) -> bool {
        self.options.wireframe
    }

    /// Environment cube map bound with every draw.
    pub fn set_environment_texture(&mut self, texture: Option<TextureId>) {
        self.options.environment_texture = texture;
    }

    /// Clear color for the presentation pass.
    #[inline]
    pub fn clear_color(&self) -> [f32; 4] {
        self.config.clear_color
    }

    #[inline]
    pub fn frame_manager(&self) -> &FrameManager<B> {
        &self.frames
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of completed ticks.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use pbr_rhi::headless::HeadlessGpu;

    use super::*;

    fn empty_resources(k: usize) -> SceneResources {
        SceneResources {
            materials: MaterialLibrary::new(k),
            meshes: MeshRegistry::new(),
            textures: TextureRegistry::new(),
            scene: RenderScene::new(k),
        }
    }

    #[test]
    fn test_frames_in_flight_must_match() {
        let result = FrameRenderer::new(
            HeadlessGpu::new(),
            RendererConfig::default(),
            empty_resources(2),
            LayerPipelines::default(),
        );
        assert!(matches!(result, Err(RendererError::Config(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RendererConfig {
            frames_in_flight: 0,
            ..RendererConfig::default()
        };
        let result = FrameRenderer::new(
            HeadlessGpu::new(),
            config,
            empty_resources(3),
            LayerPipelines::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_scene_ticks() {
        let gpu = HeadlessGpu::new();
        let mut renderer = FrameRenderer::new(
            gpu.clone(),
            RendererConfig::default(),
            empty_resources(3),
            LayerPipelines::default(),
        )
        .unwrap();

        assert_eq!(renderer.render_frame(FrameTime::new(0.016, 0.016)).unwrap(), 1);
        assert_eq!(renderer.ticks(), 1);
        gpu.complete_all();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_wireframe_from_config() {
        let config = RendererConfig {
            wireframe: true,
            ..RendererConfig::default()
        };
        let mut renderer = FrameRenderer::new(
            HeadlessGpu::new(),
            config,
            empty_resources(3),
            LayerPipelines::default(),
        )
        .unwrap();
        assert!(renderer.wireframe());
        renderer.set_wireframe(false);
        assert!(!renderer.wireframe());
        assert_eq!(renderer.clear_color(), [0.5, 0.5, 0.5, 1.0]);
    }
}
