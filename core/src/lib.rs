//! # SceneBridge Core
//!
//! Shared building blocks for keeping a host application's scene mirrored in
//! an external renderer's retained scene graph:
//!
//! - [`context`]: render mode flags and render state shared across threads
//! - [`params`]: typed, detail-tagged parameter tables
//! - [`scene_graph`]: the retained scene-graph API and edit scopes
//! - [`host`]: the host scene model and dependency graph
//! - [`motion`]: shutter sampling and image-region helpers

pub mod context;
pub mod host;
pub mod motion;
pub mod params;
pub mod scene_graph;

pub use context::{RenderContext, RenderMode, RenderState};
pub use params::{Detail, Param, ParamList, ParamValue};
pub use scene_graph::{
    Definition, NodeHandle, NodeKind, SceneGraph, SceneGraphError, SceneGraphResult, ScopedEdit,
};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the core version.
pub fn init() {
    log::info!("SceneBridge Core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
