//! Scene synchronizer.
//!
//! Owns the [`SceneMirror`], the translators and the material table, and
//! drives them from the host's dependency graph:
//!
//! - [`SceneSynchronizer::export_full`] exports the whole scene once at the
//!   start of a session. Any failure aborts the export.
//! - [`SceneSynchronizer::batch_update_scene`] applies one [`ChangeSet`].
//!   A failure on one object is logged and the rest of the set is still
//!   applied; the failed object keeps its last good state.
//! - [`SceneSynchronizer::update_scene`] and
//!   [`SceneSynchronizer::update_view`] are the live-session entry points and
//!   do nothing unless an interactive render is running.
//!
//! Every pass runs inside one [`ScopedEdit`], so the renderer never sees a
//! half-applied pass.

use std::sync::Arc;
use std::time::Instant;

use scenebridge_core::host::{
    Depsgraph, HostGeometry, HostObject, ObjectId, PrimitiveCategory,
};
use scenebridge_core::params::ParamList;
use scenebridge_core::scene_graph::{
    Definition, NodeHandle, NodeKind, SceneGraph, SceneGraphError, ScopedEdit,
};
use scenebridge_core::RenderContext;

use crate::change_set::{ChangeKind, ChangeSet};
use crate::materials::MaterialTable;
use crate::mirror::{PrototypeData, SceneMirror};
use crate::translators::{
    LinkedFilter, TranslateContext, TranslateError, TranslateResult, TranslatorSet,
};

/// Name of the render camera node.
pub const CAMERA_NODE: &str = "main_camera";
const CAMERA_SHADER: &str = "PxrCamera";

/// Errors that abort a full export.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to export {object}: {source}")]
    Object {
        object: String,
        #[source]
        source: TranslateError,
    },
    #[error(transparent)]
    SceneGraph(#[from] SceneGraphError),
}

/// Receives `(label, fraction)` export progress.
pub type ProgressSink = Box<dyn FnMut(&str, f32) + Send>;

pub struct SceneSynchronizer {
    mirror: SceneMirror,
    translators: TranslatorSet,
    materials: MaterialTable,
    context: Arc<RenderContext>,
    camera: Option<NodeHandle>,
    progress: Option<ProgressSink>,
}

impl SceneSynchronizer {
    pub fn new(context: Arc<RenderContext>) -> Self {
        Self {
            mirror: SceneMirror::new(),
            translators: TranslatorSet::new(),
            materials: MaterialTable::new(),
            context,
            camera: None,
            progress: None,
        }
    }

    #[inline]
    pub fn mirror(&self) -> &SceneMirror {
        &self.mirror
    }

    #[inline]
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    #[inline]
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    #[inline]
    pub fn camera(&self) -> Option<NodeHandle> {
        self.camera
    }

    pub fn set_progress_sink(&mut self, sink: impl FnMut(&str, f32) + Send + 'static) {
        self.progress = Some(Box::new(sink));
    }

    fn report_progress(&mut self, label: &str, fraction: f32) {
        if let Some(sink) = self.progress.as_mut() {
            sink(label, fraction);
        }
    }

    /// Exports every visible object, the materials and the camera.
    pub fn export_full(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
    ) -> Result<(), SyncError> {
        log::info!("Parsing scene...");
        let started = Instant::now();
        let mut edit = ScopedEdit::new(scene);

        self.materials.sync(&mut *edit, depsgraph.materials())?;
        self.sync_camera(&mut *edit, depsgraph)?;

        let mut objects: Vec<&HostObject> =
            depsgraph.objects().iter().filter(|ob| ob.visible).collect();
        objects.sort_by_key(|ob| ob.category() != PrimitiveCategory::LightFilter);

        let total = objects.len().max(1) as f32;
        for (i, object) in objects.into_iter().enumerate() {
            self.report_progress(&format!("Exporting {}", object.name), i as f32 / total);
            if self.mirror.contains_object(object.id) {
                continue;
            }
            self.add_object(&mut *edit, depsgraph, object)
                .map_err(|source| SyncError::Object {
                    object: object.name.clone(),
                    source,
                })?;
        }
        self.report_progress("Finished exporting", 1.0);

        log::info!(
            "Finished parsing scene. Total time: {:?}",
            started.elapsed()
        );
        Ok(())
    }

    /// Diffs the dependency graph against the mirror without touching the
    /// renderer.
    pub fn compute_change_set(&self, depsgraph: &dyn Depsgraph) -> ChangeSet {
        ChangeSet::compute(depsgraph, &self.mirror)
    }

    /// Applies every change the dependency graph reports in one edit scope
    /// and returns what was applied.
    pub fn batch_update_scene(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
    ) -> ChangeSet {
        let changes = self.compute_change_set(depsgraph);
        if changes.is_empty() {
            return changes;
        }
        log::debug!("Applying {} scene change(s)", changes.len());

        let mut edit = ScopedEdit::new(scene);
        if let Err(err) = self.materials.sync(&mut *edit, depsgraph.materials()) {
            log::warn!("Failed to update materials: {}", err);
        }
        for change in &changes {
            if let Err(err) = self.apply(&mut *edit, depsgraph, change.object, &change.kind) {
                log::warn!(
                    "Failed to apply {} change to {}: {}",
                    change.kind,
                    change.object,
                    err
                );
            }
        }
        changes
    }

    /// Live-session scene update. Returns `None` when no interactive render
    /// is running.
    pub fn update_scene(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
    ) -> Option<ChangeSet> {
        if !self.context.is_interactive_running() {
            return None;
        }
        Some(self.batch_update_scene(scene, depsgraph))
    }

    /// Live-session camera update. Returns whether the camera was updated.
    pub fn update_view(&mut self, scene: &mut dyn SceneGraph, depsgraph: &dyn Depsgraph) -> bool {
        if !self.context.is_interactive_running() {
            return false;
        }
        let mut edit = ScopedEdit::new(scene);
        match self.sync_camera(&mut *edit, depsgraph) {
            Ok(updated) => updated,
            Err(err) => {
                log::warn!("Failed to update the camera: {}", err);
                false
            }
        }
    }

    /// Forgets all state. The renderer scene must already be gone.
    pub fn reset(&mut self) {
        self.mirror.reset();
        self.materials.reset();
        self.camera = None;
    }

    fn apply(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
        id: ObjectId,
        kind: &ChangeKind,
    ) -> TranslateResult<()> {
        if *kind == ChangeKind::Removed {
            let was_light = self
                .mirror
                .prototype_for_object(id)
                .is_some_and(|prototype| prototype.category == PrimitiveCategory::Light);
            if was_light {
                self.mirror.unlink_light(scene, id)?;
            }
            if self.mirror.remove_instance(scene, id)? {
                log::debug!("Removed {} and its prototype", id);
            }
            return Ok(());
        }

        let Some(object) = depsgraph.object(id) else {
            return Ok(());
        };
        match kind {
            ChangeKind::Added => self.add_object(scene, depsgraph, object),
            ChangeKind::Geometry => {
                self.update_object(scene, depsgraph, object)?;
                self.mirror.update_instance_transform(scene, object)
            }
            ChangeKind::Transform => self.mirror.update_instance_transform(scene, object),
            ChangeKind::Material => {
                let material = self.instance_material(object);
                self.mirror.update_instance_material(scene, object, material)?;
                if object.materials.len() > 1 {
                    self.update_object(scene, depsgraph, object)?;
                }
                Ok(())
            }
            ChangeKind::Property(name) => {
                let settings = depsgraph.settings();
                let mut cx = TranslateContext::new(scene, settings, &self.materials);
                self.mirror
                    .update_primvar(&mut cx, &self.translators, object, name)
            }
            ChangeKind::Visibility | ChangeKind::Removed => Ok(()),
        }
    }

    fn instance_material(&self, object: &HostObject) -> Option<NodeHandle> {
        object
            .material_for_slot(0)
            .and_then(|id| self.materials.get(id))
    }

    /// Exports (or reuses) the object's prototype and instances it.
    fn add_object(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
        object: &HostObject,
    ) -> TranslateResult<()> {
        let linked = self.resolve_filters(scene, depsgraph, object)?;
        let settings = depsgraph.settings();
        let lookup = {
            let mut cx = TranslateContext::new(scene, settings, &self.materials);
            cx.linked_filters = &linked;
            let lookup = self
                .mirror
                .get_or_create_prototype(&mut cx, &self.translators, object)?;
            if lookup.created
                && let Err(err) = self.mirror.update(&mut cx, &self.translators, object)
            {
                self.mirror.discard_unused(cx.scene, object.data)?;
                return Err(err);
            }
            lookup
        };

        let material = self.instance_material(object);
        self.mirror.add_instance(scene, object, material)?;

        for evicted in lookup.evicted {
            if evicted == object.id {
                continue;
            }
            if let Some(other) = depsgraph.object(evicted).filter(|ob| ob.visible) {
                log::debug!("Re-instancing {} after its prototype was replaced", other.name);
                let material = self.instance_material(other);
                self.mirror.add_instance(scene, other, material)?;
            }
        }
        Ok(())
    }

    /// Full re-translation of an object that is already instanced.
    fn update_object(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
        object: &HostObject,
    ) -> TranslateResult<()> {
        let linked = self.resolve_filters(scene, depsgraph, object)?;
        let mut cx = TranslateContext::new(scene, depsgraph.settings(), &self.materials);
        cx.linked_filters = &linked;
        self.mirror.update(&mut cx, &self.translators, object)?;
        Ok(())
    }

    /// Exports and updates the visible light filters linked to a light,
    /// recording the link on each filter's prototype. Other objects link
    /// nothing.
    fn resolve_filters(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
        object: &HostObject,
    ) -> TranslateResult<Vec<LinkedFilter>> {
        let HostGeometry::Light(light) = &object.geometry else {
            return Ok(Vec::new());
        };

        self.mirror.unlink_light(scene, object.id)?;
        let mut linked = Vec::with_capacity(light.filters.len());
        for filter_id in &light.filters {
            let Some(filter_object) = depsgraph.object(*filter_id) else {
                log::debug!("{} links missing light filter {}", object.name, filter_id);
                continue;
            };
            if !filter_object.visible {
                log::debug!("{} links hidden light filter {}", object.name, filter_object.name);
                continue;
            }
            let HostGeometry::LightFilter(filter) = &filter_object.geometry else {
                log::debug!("{} links {} which is not a light filter", object.name, filter_object.name);
                continue;
            };

            {
                let mut cx = TranslateContext::new(scene, depsgraph.settings(), &self.materials);
                self.mirror
                    .get_or_create_prototype(&mut cx, &self.translators, filter_object)?;
                self.mirror.update(&mut cx, &self.translators, filter_object)?;
            }

            let Some(prototype) = self.mirror.prototype_mut(filter_object.data) else {
                continue;
            };
            let db_name = prototype.db_name.clone();
            let PrototypeData::LightFilter(nodes) = &mut prototype.data else {
                continue;
            };
            if !nodes.lights.contains(&object.id) {
                nodes.lights.push(object.id);
            }
            linked.push(LinkedFilter {
                object: filter_object.id,
                db_name,
                filter_node: nodes.filter,
                filter_name: nodes.filter_name.clone(),
                combine_mode: filter.combine_mode,
                cheat_shadow: filter.is_cheat_shadow(),
                transform: filter_object.matrix(),
            });
        }
        Ok(linked)
    }

    /// Creates or refreshes the render camera. Returns `false` when the host
    /// has no camera.
    fn sync_camera(
        &mut self,
        scene: &mut dyn SceneGraph,
        depsgraph: &dyn Depsgraph,
    ) -> Result<bool, SceneGraphError> {
        let Some(camera) = depsgraph.camera() else {
            return Ok(false);
        };
        let node = match self.camera {
            Some(node) => node,
            None => {
                let node = scene.create_node(NodeKind::Camera, CAMERA_NODE)?;
                scene.define(
                    node,
                    Definition::Shader {
                        name: CAMERA_SHADER.to_string(),
                    },
                )?;
                let root = scene.root();
                scene.add_child(root, node)?;
                self.camera = Some(node);
                node
            }
        };

        let mut params = ParamList::new();
        params.set_float("fov", camera.fov);
        params.set_float("nearClip", camera.clip.0);
        params.set_float("farClip", camera.clip.1);
        scene.set_primvars(node, params)?;

        let mut attributes = ParamList::new();
        attributes.set_float_array("Ri:CropWindow", camera.crop_window.to_vec());
        let (width, height) = depsgraph.settings().output_size();
        attributes.set_integer_array("Ri:FormatResolution", vec![width as i32, height as i32]);
        scene.set_attributes(node, attributes)?;

        scene.set_transform(node, &[camera.transform], &[])?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use scenebridge_core::host::{
        DataId, HostCamera, HostMaterial, LightData, LightFilterData, MaterialId, MeshData,
        SceneSettings, SceneSnapshot,
    };
    use scenebridge_core::scene_graph::DummySceneGraph;
    use scenebridge_core::{RenderMode, RenderState};

    fn mesh(id: u64, data: u64) -> HostObject {
        HostObject::new(
            ObjectId(id),
            format!("ob{id}"),
            DataId(data),
            format!("mesh{data}"),
            HostGeometry::Mesh(MeshData::from_faces(
                vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
                &[&[0, 1, 3, 2]],
            )),
        )
    }

    fn interactive() -> Arc<RenderContext> {
        let context = Arc::new(RenderContext::new());
        context.set_mode(RenderMode::RENDER_RUNNING | RenderMode::INTERACTIVE_RUNNING);
        context.set_render_state(RenderState::Rendering);
        context
    }

    #[test]
    fn export_full_is_one_edit() {
        let mut scene = DummySceneGraph::strict();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        snapshot.add_object(mesh(1, 1));
        snapshot.add_object(mesh(2, 1));
        snapshot.set_camera(HostCamera::default());

        let mut sync = SceneSynchronizer::new(Arc::new(RenderContext::new()));
        sync.export_full(&mut scene, &snapshot).unwrap();

        assert_eq!(scene.edits_committed(), 1);
        assert_eq!(scene.mutations_outside_edit(), 0);
        assert_eq!(sync.mirror().len(), 1);
        assert_eq!(sync.mirror().known_objects(), vec![ObjectId(1), ObjectId(2)]);
        let camera = scene.node(sync.camera().unwrap()).unwrap();
        assert_eq!(camera.name, CAMERA_NODE);
    }

    #[test]
    fn export_progress_reaches_one() {
        let mut scene = DummySceneGraph::new();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        snapshot.add_object(mesh(1, 1));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut sync = SceneSynchronizer::new(Arc::new(RenderContext::new()));
        sync.set_progress_sink(move |label, fraction| {
            sink.lock().push((label.to_string(), fraction));
        });
        sync.export_full(&mut scene, &snapshot).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.first().unwrap().0, "Exporting ob1");
        assert_eq!(seen.last().unwrap().1, 1.0);
    }

    #[test]
    fn export_failure_names_the_object() {
        let mut scene = DummySceneGraph::new();
        scene.fail_definitions_for("mesh1");
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        snapshot.add_object(mesh(1, 1));

        let mut sync = SceneSynchronizer::new(Arc::new(RenderContext::new()));
        let err = sync.export_full(&mut scene, &snapshot).unwrap_err();
        assert!(matches!(&err, SyncError::Object { object, .. } if object == "ob1"));
        assert!(sync.mirror().is_empty());
        assert!(!scene.in_edit());
    }

    #[test]
    fn updates_are_gated_on_interactive_rendering() {
        let mut scene = DummySceneGraph::new();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        snapshot.add_object(mesh(1, 1));
        snapshot.set_camera(HostCamera::default());

        let mut sync = SceneSynchronizer::new(Arc::new(RenderContext::new()));
        assert!(sync.update_scene(&mut scene, &snapshot).is_none());
        assert!(!sync.update_view(&mut scene, &snapshot));
        assert_eq!(scene.edits_begun(), 0);
        assert!(sync.mirror().is_empty());
    }

    #[test]
    fn failing_object_does_not_stop_the_pass() {
        let mut scene = DummySceneGraph::new();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        let mut sync = SceneSynchronizer::new(interactive());
        sync.export_full(&mut scene, &snapshot).unwrap();

        scene.fail_definitions_for("mesh1");
        snapshot.add_object(mesh(1, 1));
        snapshot.add_object(mesh(2, 2));
        let changes = sync.update_scene(&mut scene, &snapshot).unwrap();

        assert_eq!(changes.count(&ChangeKind::Added), 2);
        assert!(!sync.mirror().contains_object(ObjectId(1)));
        assert!(sync.mirror().contains_object(ObjectId(2)));
        assert!(scene.find_by_name("ob1").is_none());
        assert!(scene.find_by_name("ob2").is_some());
    }

    #[test]
    fn material_change_rebinds_instance() {
        let mut scene = DummySceneGraph::new();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        for id in [1, 2] {
            snapshot.add_material(HostMaterial {
                id: MaterialId(id),
                name: format!("mat{id}"),
                shader: "PxrSurface".into(),
                params: ParamList::new(),
            });
        }
        snapshot.add_object(mesh(1, 1).with_materials(vec![Some(MaterialId(1))]));
        let mut sync = SceneSynchronizer::new(interactive());
        sync.export_full(&mut scene, &snapshot).unwrap();
        snapshot.clear_updates();

        snapshot.object_mut(ObjectId(1)).unwrap().materials = vec![Some(MaterialId(2))];
        snapshot.tag(ObjectId(1), scenebridge_core::host::UpdateTags::SHADING);
        sync.update_scene(&mut scene, &snapshot).unwrap();

        let group = sync
            .mirror()
            .prototype(DataId(1))
            .unwrap()
            .instances[&ObjectId(1)]
            .group;
        assert_eq!(
            scene.node(group).unwrap().material,
            sync.materials().get(MaterialId(2))
        );
    }

    #[test]
    fn lights_link_filters_exported_in_the_same_pass() {
        let mut scene = DummySceneGraph::new();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        snapshot.add_object(HostObject::new(
            ObjectId(1),
            "Key",
            DataId(1),
            "Key",
            HostGeometry::Light(LightData {
                shader: "PxrRectLight".into(),
                filters: vec![ObjectId(2)],
                ..Default::default()
            }),
        ));
        snapshot.add_object(
            HostObject::new(
                ObjectId(2),
                "Blocker",
                DataId(2),
                "Blocker",
                HostGeometry::LightFilter(LightFilterData {
                    shader: "PxrBlockerLightFilter".into(),
                    ..Default::default()
                }),
            )
            .with_transform(Mat4::from_translation(Vec3::Z)),
        );

        let mut sync = SceneSynchronizer::new(Arc::new(RenderContext::new()));
        sync.export_full(&mut scene, &snapshot).unwrap();

        let light = sync.mirror().prototype(DataId(1)).unwrap().node;
        let filter = sync.mirror().prototype(DataId(2)).unwrap();
        let PrototypeData::LightFilter(nodes) = &filter.data else {
            panic!("not a light filter");
        };
        assert_eq!(nodes.lights, vec![ObjectId(1)]);
        assert_eq!(scene.node(light).unwrap().light_filters, vec![nodes.filter]);
        let coordsys = scene.find_by_name("Blocker").unwrap();
        assert_eq!(scene.node(coordsys).unwrap().inherit_transform, false);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut scene = DummySceneGraph::new();
        let mut snapshot = SceneSnapshot::new(SceneSettings::default());
        snapshot.add_object(mesh(1, 1));
        snapshot.set_camera(HostCamera::default());
        let mut sync = SceneSynchronizer::new(Arc::new(RenderContext::new()));
        sync.export_full(&mut scene, &snapshot).unwrap();

        sync.reset();
        assert!(sync.mirror().is_empty());
        assert!(sync.camera().is_none());
        assert!(sync.materials().is_empty());
    }
}
