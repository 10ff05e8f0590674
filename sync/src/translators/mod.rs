//! Per-category translators.
//!
//! A translator turns one kind of host primitive into renderer scene-graph
//! nodes. All translators share the [`Translator`] contract:
//!
//! - `export` creates the renderer-side nodes on first sight and returns the
//!   new [`Prototype`], without populating primitive variables.
//! - `update` re-populates the nodes from current host data. It is
//!   idempotent and detaches geometry that became empty instead of defining a
//!   zero-count primitive.
//! - `export_deform_sample` pushes the positions of one motion step.
//! - `update_primvar` refreshes a single primitive variable.
//!
//! [`TranslatorSet`] maps a [`PrimitiveCategory`] to its translator.

mod curves;
mod light;
mod mesh;
mod points;
mod procedural;
mod volume;
pub mod tokens;

use glam::Mat4;
use scenebridge_core::host::{CombineMode, HostObject, ObjectId, PrimitiveCategory, SceneSettings};
use scenebridge_core::params::ParamList;
use scenebridge_core::scene_graph::{NodeHandle, SceneGraph, SceneGraphError};

use crate::materials::MaterialTable;
use crate::mirror::Prototype;

pub use curves::CurvesTranslator;
pub use light::{LightFilterTranslator, LightTranslator};
pub use mesh::MeshTranslator;
pub use points::PointCloudTranslator;
pub use procedural::RunProgramTranslator;
pub use volume::{OpenVdbTranslator, RiVolumeTranslator};

/// Errors raised while translating one object.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    SceneGraph(#[from] SceneGraphError),
    #[error("{translator} translator cannot translate {object} ({actual})")]
    WrongGeometry {
        translator: PrimitiveCategory,
        object: String,
        actual: PrimitiveCategory,
    },
    #[error("invalid data on {object}: {reason}")]
    InvalidData { object: String, reason: String },
    #[error("no prototype for {0}")]
    MissingPrototype(ObjectId),
}

pub type TranslateResult<T> = Result<T, TranslateError>;

/// A light filter linked to the light being translated, resolved by the
/// synchronizer before the light's `update` runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedFilter {
    pub object: ObjectId,
    pub db_name: String,
    pub filter_node: NodeHandle,
    /// Name of the filter shader node, used in combiner reference lists.
    pub filter_name: String,
    pub combine_mode: Option<CombineMode>,
    pub cheat_shadow: bool,
    pub transform: Mat4,
}

/// Everything a translator may touch besides the object and its prototype.
pub struct TranslateContext<'a> {
    pub scene: &'a mut dyn SceneGraph,
    pub settings: &'a SceneSettings,
    pub materials: &'a MaterialTable,
    pub linked_filters: &'a [LinkedFilter],
}

impl<'a> TranslateContext<'a> {
    pub fn new(
        scene: &'a mut dyn SceneGraph,
        settings: &'a SceneSettings,
        materials: &'a MaterialTable,
    ) -> Self {
        Self {
            scene,
            settings,
            materials,
            linked_filters: &[],
        }
    }
}

/// Result of a full update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The primitive was (re)defined.
    Defined,
    /// The object has no geometry; its primitive is detached.
    Empty,
}

/// Translation strategy for one primitive category.
pub trait Translator: Send + Sync {
    fn category(&self) -> PrimitiveCategory;

    /// Creates the renderer-side nodes for a data-block seen for the first
    /// time.
    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype>;

    /// Pushes current host data into the prototype's nodes.
    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome>;

    /// Pushes the positions of motion step `sample`. Categories without
    /// deformation history ignore this.
    fn export_deform_sample(
        &self,
        _cx: &mut TranslateContext<'_>,
        _object: &HostObject,
        _prototype: &mut Prototype,
        _sample: u32,
    ) -> TranslateResult<()> {
        Ok(())
    }

    /// Refreshes the object-level primvar `name` on the primitive node.
    fn update_primvar(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
        name: &str,
    ) -> TranslateResult<()> {
        let node = prototype.primvar_node();
        let mut primvars = cx.scene.primvars(node)?;
        copy_object_primvar(object, &mut primvars, name);
        cx.scene.set_primvars(node, primvars)?;
        Ok(())
    }
}

/// Copies the object-level primvar `name` into `primvars`, or removes it
/// when the object no longer carries it.
pub fn copy_object_primvar(object: &HostObject, primvars: &mut ParamList, name: &str) {
    match object.primvars.get(name) {
        Some(param) => primvars.set_param(name, param.clone()),
        None => {
            primvars.remove(name);
        }
    }
}

fn wrong_geometry(translator: PrimitiveCategory, object: &HostObject) -> TranslateError {
    TranslateError::WrongGeometry {
        translator,
        object: object.name.clone(),
        actual: object.category(),
    }
}

/// One translator per primitive category.
#[derive(Default)]
pub struct TranslatorSet {
    mesh: MeshTranslator,
    curves: CurvesTranslator,
    points: PointCloudTranslator,
    ri_volume: RiVolumeTranslator,
    openvdb: OpenVdbTranslator,
    light: LightTranslator,
    light_filter: LightFilterTranslator,
    run_program: RunProgramTranslator,
}

impl TranslatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_category(&self, category: PrimitiveCategory) -> &dyn Translator {
        match category {
            PrimitiveCategory::Mesh => &self.mesh,
            PrimitiveCategory::Curves => &self.curves,
            PrimitiveCategory::PointCloud => &self.points,
            PrimitiveCategory::RiVolume => &self.ri_volume,
            PrimitiveCategory::OpenVdb => &self.openvdb,
            PrimitiveCategory::Light => &self.light,
            PrimitiveCategory::LightFilter => &self.light_filter,
            PrimitiveCategory::RunProgram => &self.run_program,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_its_translator() {
        let set = TranslatorSet::new();
        for category in [
            PrimitiveCategory::Mesh,
            PrimitiveCategory::Curves,
            PrimitiveCategory::PointCloud,
            PrimitiveCategory::RiVolume,
            PrimitiveCategory::OpenVdb,
            PrimitiveCategory::Light,
            PrimitiveCategory::LightFilter,
            PrimitiveCategory::RunProgram,
        ] {
            assert_eq!(set.for_category(category).category(), category);
        }
    }
}
