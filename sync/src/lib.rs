//! # SceneBridge Sync
//!
//! Keeps the renderer's retained scene graph in step with the host scene.
//!
//! # Architecture
//!
//! - [`SceneMirror`] indexes every prototype (one per host data-block) and
//!   the instances placed from it.
//! - [`translators`] turn each primitive category into renderer nodes.
//! - [`ChangeSet`] diffs the host dependency graph against the mirror.
//! - [`SceneSynchronizer`] drives a full export or applies a change set
//!   inside a single edit scope.
//!
//! # Example
//!
//! ```ignore
//! let mut sync = SceneSynchronizer::new(context.clone());
//! sync.export_full(&mut scene, &depsgraph)?;
//! // later, after the host edits the scene
//! if let Some(changes) = sync.update_scene(&mut scene, &depsgraph) {
//!     log::debug!("{} change(s) applied", changes.len());
//! }
//! ```

pub mod change_set;
pub mod materials;
pub mod mirror;
pub mod synchronizer;
pub mod translators;

pub use change_set::{Change, ChangeKind, ChangeSet};
pub use materials::MaterialTable;
pub use mirror::{Lookup, Prototype, PrototypeData, SceneMirror};
pub use synchronizer::{SceneSynchronizer, SyncError};
pub use translators::{TranslateError, TranslateResult, Translator, TranslatorSet};

/// Sync library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the sync version.
pub fn init() {
    log::info!("SceneBridge Sync v{} initialized", VERSION);
}
