//! Command line arguments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pbr_core::RendererConfig;

/// PBR sphere demo arguments.
#[derive(Parser, Debug)]
#[command(
    name = "pbr-demo",
    about = "Headless PBR sphere demo",
    long_about = "Builds the PBR sphere scene and drives the frame pipeline on a \
        simulated GPU.\n\n\
        EXAMPLES:\n\
          # 600 ticks with triple buffering and 8 ms of GPU latency\n\
          pbr-demo --ticks 600 --frames 3 --gpu-latency-ms 8\n\
        \n\
          # Fail fast if the GPU stalls for more than a second\n\
          pbr-demo --fence-timeout-ms 1000",
    version
)]
pub struct Args {
    /// Renderer configuration file (TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Frames in flight. Overrides the configuration file.
    #[arg(long)]
    pub frames: Option<usize>,

    /// Number of frame ticks to run.
    #[arg(long, default_value = "300")]
    pub ticks: u64,

    /// Time the simulated GPU takes to finish each frame.
    #[arg(long, default_value = "4")]
    pub gpu_latency_ms: u64,

    /// Draw every layer with the wireframe pipeline.
    #[arg(long)]
    pub wireframe: bool,

    /// Bound on each fence wait. Overrides the configuration file.
    #[arg(long)]
    pub fence_timeout_ms: Option<u64>,
}

impl Args {
    /// Loads the configuration file, if any, and applies command line overrides.
    pub fn renderer_config(&self) -> Result<RendererConfig> {
        let mut config = match &self.config {
            Some(path) => RendererConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RendererConfig::default(),
        };

        if let Some(frames) = self.frames {
            config.frames_in_flight = frames;
        }
        if self.wireframe {
            config.wireframe = true;
        }
        if self.fence_timeout_ms.is_some() {
            config.fence_timeout_ms = self.fence_timeout_ms;
        }

        config.validate().context("Invalid renderer configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["pbr-demo"]);
        assert_eq!(args.ticks, 300);
        let config = args.renderer_config().unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "pbr-demo",
            "--frames",
            "2",
            "--wireframe",
            "--fence-timeout-ms",
            "250",
        ]);
        let config = args.renderer_config().unwrap();
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.wireframe);
        assert_eq!(config.fence_timeout_ms, Some(250));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["pbr-demo", "--frames", "0"]);
        assert!(args.renderer_config().is_err());
    }
}
