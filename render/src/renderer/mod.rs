//! External renderer control and event API.
//!
//! The [`Renderer`] trait is everything the render driver needs from the
//! renderer library besides the retained scene graph itself: session
//! begin/end, scene creation, render commands, event callbacks and display
//! buffer pulls.
//!
//! Every method takes `&self`. Event callbacks fire on the renderer's own
//! threads, and the display buffer is read from the pull loop while the
//! stats thread and the driver's stop sequence run concurrently.

#[cfg(feature = "dummy")]
mod dummy;

#[cfg(feature = "dummy")]
pub use dummy::DummyRenderer;

use std::fmt;
use std::sync::Arc;

use scenebridge_core::{SceneGraph, SceneGraphError};

use crate::license::LicenseStatus;

/// Renderer-side failures.
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("failed to begin a render session: {0}")]
    SessionBegin(String),
    #[error("renderer rejected command `{command}`: {reason}")]
    CommandRejected { command: String, reason: String },
    #[error(transparent)]
    SceneGraph(#[from] SceneGraphError),
}

/// Event streams a callback can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Progress in percent, 0..=100.
    Progress,
    /// Render lifecycle. `0` means the render exited; anything else means
    /// an iteration is refining.
    Render,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress => f.write_str("progress"),
            Self::Render => f.write_str("render"),
        }
    }
}

/// Callback invoked from a renderer thread with the event payload.
///
/// Callbacks may only touch the render context, the stats counters and the
/// event queue. They never call into the host.
pub type EventCallback = Arc<dyn Fn(i32) + Send + Sync>;

pub trait Renderer: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Process-wide begin, called once when the driver is created.
    fn system_begin(&self, args: &[String]);

    /// Opens a render session.
    fn begin_session(&self, args: &[String]) -> Result<(), RendererError>;

    fn end_session(&self);

    fn license_status(&self) -> LicenseStatus;

    /// Creates a retained scene graph for the current session.
    fn create_scene(&self) -> Result<Box<dyn SceneGraph>, RendererError>;

    /// Issues a render command for `scene`. Live commands return
    /// immediately; `-blocking` commands return when the render is done.
    fn render(&self, scene: &mut dyn SceneGraph, command: &str) -> Result<(), RendererError>;

    /// Stops any render running on `scene`.
    fn stop(&self, scene: &mut dyn SceneGraph);

    fn delete_scene(&self, scene: Box<dyn SceneGraph>);

    fn register_callback(&self, kind: CallbackKind, callback: EventCallback);

    fn unregister_callback(&self, kind: CallbackKind);

    /// Number of display images the current render writes.
    fn display_count(&self) -> usize;

    /// Channel count of display image `image`, or 0 when unknown.
    fn num_channels(&self, image: usize) -> usize;

    /// Name of display image `image`, used for the result pass.
    fn display_name(&self, image: usize) -> String;

    /// Copies the current pixels of display image `image` as a flat,
    /// channel-interleaved float buffer.
    fn pull_buffer(&self, image: usize, width: u32, height: u32) -> Option<Vec<f32>>;

    /// Whether the display buffer changed since the last reset.
    fn has_buffer_updated(&self) -> bool;

    fn reset_buffer_updated(&self);
}
