//! # SceneBridge Render
//!
//! Drives the external renderer through a render's whole lifecycle.
//!
//! # Architecture
//!
//! - [`Renderer`] is the renderer control and event API. [`DummyRenderer`]
//!   records calls and completes renders on the calling thread.
//! - [`RenderDriver`] runs batch, interactive, swatch, bake and RIB renders
//!   on top of a [`scenebridge_sync::SceneSynchronizer`].
//! - [`StatsManager`] polls the renderer's live telemetry.
//! - [`EventQueue`] carries everything background threads want the host to
//!   do back to the host's own thread.
//!
//! # Example
//!
//! ```ignore
//! let driver = RenderDriver::new(
//!     Arc::new(DummyRenderer::new()),
//!     Arc::new(DummyStatsClient::new()),
//!     load_config(Path::new("scenebridge.toml"))?,
//! );
//! driver.start_interactive_render(engine.clone(), &snapshot)?;
//! loop {
//!     driver.update_scene(&snapshot);
//!     driver.process_events();
//! }
//! ```

pub mod config;
pub mod denoise;
pub mod display;
pub mod driver;
pub mod events;
pub mod host;
pub mod license;
pub mod renderer;
pub mod stats;

pub use config::{ConfigError, DriverConfig, load_config};
pub use denoise::{Denoiser, NullDenoiser};
pub use display::PixelBuffer;
pub use driver::{RenderDriver, RenderError, Timeline};
pub use events::{EventQueue, RenderEvent};
pub use host::{HeadlessEngine, HostEngine, ResultPass};
pub use license::{LicenseError, LicenseStatus};
#[cfg(feature = "dummy")]
pub use renderer::DummyRenderer;
pub use renderer::{CallbackKind, Renderer, RendererError};
#[cfg(feature = "dummy")]
pub use stats::DummyStatsClient;
pub use stats::{StatsClient, StatsManager};

/// Render library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the render version.
pub fn init() {
    log::info!("SceneBridge Render v{} initialized", VERSION);
}
