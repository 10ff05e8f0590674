//! Command line arguments.
//!
//! Flags given on the command line override the values read from the
//! `--config` TOML file.

use std::path::PathBuf;

use clap::Parser;
use scenebridge_core::host::{RenderVariant, SceneSettings};
use scenebridge_render::config::RenderInto;
use scenebridge_render::{ConfigError, DriverConfig, load_config};

/// Which render the front end runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Final-frame render pulled back into the host.
    #[default]
    Batch,
    /// Final-frame render as a render farm would run it.
    Background,
    /// Live render followed by a few scripted scene edits.
    Interactive,
    /// Material preview.
    Swatch,
    /// Texture bake.
    Bake,
    /// One RIB file per frame.
    Rib,
}

/// Where rendered pixels go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliTarget {
    Host,
    It,
}

impl From<CliTarget> for RenderInto {
    fn from(cli: CliTarget) -> Self {
        match cli {
            CliTarget::Host => RenderInto::Host,
            CliTarget::It => RenderInto::It,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "scenebridge",
    about = "Drives a synthetic scene through the render pipeline",
    long_about = "Builds a small synthetic scene (mesh, hair, points, volume, light and \
        light filter) and runs it through one of the render modes against the dummy \
        renderer.\n\n\
        EXAMPLES:\n\
          # Final frame at 640x360\n\
          scenebridge --mode batch --width 640 --height 360\n\
        \n\
          # Live render with five edits\n\
          scenebridge --mode interactive --edits 5\n\
        \n\
          # RIB files for frames 1 to 24, reusing one scene\n\
          scenebridge --mode rib --start 1 --end 24 --persistent",
    version
)]
pub struct Args {
    /// Render mode.
    #[arg(long, default_value = "batch", value_enum)]
    pub mode: Mode,

    /// Driver configuration file (TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output width in pixels.
    #[arg(long, default_value = "320")]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long, default_value = "180")]
    pub height: u32,

    /// Render with the XPU variant.
    #[arg(long)]
    pub xpu: bool,

    /// Export transformation and deformation motion blur.
    #[arg(long)]
    pub motion_blur: bool,

    /// Keep the renderer scene between renders.
    #[arg(long)]
    pub persistent: bool,

    /// Denoise the final passes.
    #[arg(long)]
    pub denoise: bool,

    /// Where final-frame pixels go.
    #[arg(long, value_enum)]
    pub render_into: Option<CliTarget>,

    /// Stats print level, 0 (none) to 4 (all).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub stats_level: Option<u8>,

    /// First frame of a RIB export.
    #[arg(long, default_value = "1")]
    pub start: i32,

    /// Last frame of a RIB export.
    #[arg(long, default_value = "1")]
    pub end: i32,

    /// RIB path template; `{frame}` becomes the zero-padded frame number.
    #[arg(long)]
    pub rib_output: Option<String>,

    /// Number of scripted edits during an interactive render.
    #[arg(long, default_value = "3")]
    pub edits: u32,
}

impl Args {
    /// The configuration file, if any, with command line overrides applied.
    pub fn driver_config(&self) -> Result<DriverConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => DriverConfig::default(),
        };
        if self.persistent {
            config.session.persistent_data = true;
        }
        if self.denoise {
            config.denoise.enabled = true;
        }
        if let Some(target) = self.render_into {
            config.session.render_into = target.into();
        }
        if let Some(level) = self.stats_level {
            config.stats.print_level = level;
        }
        if let Some(output) = &self.rib_output {
            config.rib.output = output.clone();
        }
        Ok(config)
    }

    pub fn scene_settings(&self) -> SceneSettings {
        SceneSettings {
            resolution: (self.width, self.height),
            motion_blur: self.motion_blur,
            variant: if self.xpu {
                RenderVariant::Xpu
            } else {
                RenderVariant::Ris
            },
            denoise: self.denoise,
            ..Default::default()
        }
    }
}
