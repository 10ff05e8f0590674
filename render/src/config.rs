//! Driver configuration loaded from TOML.
//!
//! Every section and field is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [renderer]
//! program = "prman"
//! woffs = ["R56008"]
//!
//! [session]
//! persistent_data = false
//! render_into = "host"
//!
//! [stats]
//! print_level = 1
//!
//! [rib]
//! format = "ascii"
//! output = "/var/tmp/scene.{frame}.rib"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors raised while loading a [`DriverConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub renderer: RendererConfig,
    pub session: SessionConfig,
    pub stats: StatsConfig,
    pub timing: TimingConfig,
    pub rib: RibConfig,
    pub denoise: DenoiseConfig,
}

impl DriverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Loads a driver config from a TOML file.
pub fn load_config(path: &Path) -> Result<DriverConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    DriverConfig::from_toml_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub program: String,
    /// Warning ids passed to the renderer as `-woff`.
    pub woffs: Vec<String>,
    /// Extra arguments for every render session.
    pub session_args: Vec<String>,
    /// Display server the renderer talks to when rendering into `it`.
    pub display_server: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "prman".into(),
            woffs: Vec::new(),
            session_args: Vec::new(),
            display_server: "it".into(),
        }
    }
}

impl RendererConfig {
    /// Arguments for the process-wide renderer begin call.
    pub fn system_args(&self) -> Vec<String> {
        let mut args = vec![self.program.clone()];
        if !self.woffs.is_empty() {
            args.push("-woff".into());
            args.push(self.woffs.join(","));
        }
        args
    }
}

/// Where pixels go while rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderInto {
    /// Pulled from the display driver into the host's render result.
    #[default]
    Host,
    /// Sent to the external `it` image tool by the renderer.
    It,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Keep the renderer scene alive between frames and update it through
    /// the synchronizer instead of re-exporting.
    pub persistent_data: bool,
    pub render_into: RenderInto,
    /// Interactive renders use the pull model for viewport redraws.
    pub ipr_render_into: RenderInto,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// 0 (none) to 4 (all).
    pub print_level: u8,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub connect_retry_ms: u64,
    pub server_id: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            print_level: 1,
            poll_interval_ms: 100,
            connect_timeout_ms: 5000,
            connect_retry_ms: 100,
            server_id: "scenebridge".into(),
        }
    }
}

impl StatsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub pull_interval_ms: u64,
    pub viewport_refresh_s: f32,
    pub engine_lock_timeout_ms: u64,
    pub stop_lock_timeout_ms: u64,
    pub xpu_stats_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pull_interval_ms: 10,
            viewport_refresh_s: 0.01,
            engine_lock_timeout_ms: 2000,
            stop_lock_timeout_ms: 5000,
            xpu_stats_delay_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn pull_interval(&self) -> Duration {
        Duration::from_millis(self.pull_interval_ms)
    }

    pub fn viewport_refresh(&self) -> Duration {
        Duration::from_secs_f32(self.viewport_refresh_s.max(0.0))
    }

    pub fn engine_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_lock_timeout_ms)
    }

    pub fn stop_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_lock_timeout_ms)
    }

    pub fn xpu_stats_delay(&self) -> Duration {
        Duration::from_millis(self.xpu_stats_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RibFormat {
    #[default]
    Ascii,
    Binary,
}

impl RibFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RibCompression {
    #[default]
    None,
    Gzip,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RibConfig {
    pub format: RibFormat,
    pub compression: RibCompression,
    /// Output path; `{frame}` expands to the zero-padded frame number.
    pub output: String,
}

impl Default for RibConfig {
    fn default() -> Self {
        Self {
            format: RibFormat::Ascii,
            compression: RibCompression::None,
            output: "scene.{frame}.rib".into(),
        }
    }
}

impl RibConfig {
    /// Output path for `frame`.
    pub fn output_for_frame(&self, frame: i32) -> String {
        self.output.replace("{frame}", &format!("{frame:04}"))
    }

    /// Render command writing the scene to `path`.
    pub fn command(&self, path: &str) -> String {
        let mut command = format!("rib {} -format {}", path, self.format.as_str());
        if self.format == RibFormat::Ascii {
            command.push_str(" -indent");
        }
        if self.compression == RibCompression::Gzip {
            command.push_str(" -compression gzip");
        }
        command
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    pub enabled: bool,
    pub asymmetry: f32,
    pub use_color_pass: bool,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            asymmetry: 0.0,
            use_color_pass: false,
        }
    }
}
