//! PBR Demo - Main Entry Point
//!
//! Builds the PBR sphere scene and drives the frame pipeline on the headless
//! GPU: rotate through the frame slots, update dirty constants, record the
//! layers and signal the fence, once per tick.

mod args;
mod demo;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Mat4;
use tracing::{error, info};

use pbr_core::Timer;
use pbr_renderer::{FrameRenderer, LayerPipelines, RendererResult};
use pbr_rhi::Backend;
use pbr_rhi::headless::HeadlessGpu;

use crate::args::Args;

/// Sphere spun every tick so its constants keep flowing through all slots.
const SPINNING_SPHERE: &str = "sphere_rust";

fn main() -> Result<()> {
    pbr_core::init_logging();
    let args = Args::parse();

    info!("Starting PBR demo");

    let config = args.renderer_config()?;
    let gpu = HeadlessGpu::new();
    let demo = demo::build(&gpu, config.frames_in_flight).context("Failed to build demo scene")?;

    let mut renderer = FrameRenderer::new(
        gpu.clone(),
        config,
        demo.resources,
        LayerPipelines::sequential(),
    )
    .context("Failed to create renderer")?;
    renderer.set_environment_texture(Some(demo.environment));
    demo::setup_pass(renderer.pass_constants_mut());

    let worker = gpu.spawn_completion_worker(Duration::from_millis(args.gpu_latency_ms));
    info!("Initialization complete, entering main loop");

    let started = Instant::now();
    let result = run(&mut renderer, args.ticks);
    let elapsed = started.elapsed();

    let drained = match &result {
        Ok(()) => {
            let drained = renderer.shutdown();
            let ticks = renderer.ticks().max(1);
            info!(
                "Rendered {} frames in {:.2?} ({:.3} ms/frame), fence at {}",
                renderer.ticks(),
                elapsed,
                elapsed.as_secs_f64() * 1000.0 / ticks as f64,
                renderer.frame_manager().fence().current_value()
            );
            drained
        }
        Err(e) if e.is_device_lost() => {
            error!("Frame loop stopped: {}", e);
            Ok(())
        }
        Err(e) => {
            error!("Frame loop stopped: {}", e);
            renderer.shutdown()
        }
    };

    // The renderer drains on drop, so the GPU must still be running.
    drop(renderer);
    drop(worker);
    drop(demo.geometry);

    info!("Shutting down");
    result.map_err(|e| {
        let context = if e.is_device_lost() {
            "Device lost during frame loop"
        } else {
            "Render error"
        };
        anyhow::Error::new(e).context(context)
    })?;
    drained.context("Failed to drain the GPU")?;
    Ok(())
}

fn run<B: Backend>(renderer: &mut FrameRenderer<B>, ticks: u64) -> RendererResult<()> {
    let spinning = renderer.resources().scene.find(SPINNING_SPHERE);
    let mut timer = Timer::new();

    for _ in 0..ticks {
        let time = timer.tick();

        if let Some(id) = spinning {
            let world = renderer.resources().scene.get(id).world();
            let translation = world.w_axis.truncate();
            renderer.set_world(
                id,
                Mat4::from_translation(translation) * Mat4::from_rotation_y(time.total),
            );
        }

        renderer.render_frame(time)?;
    }
    Ok(())
}
