//! Scene mirror: the prototype table.
//!
//! Every host data-block that reaches the renderer is exported once as a
//! [`Prototype`] and placed any number of times through per-object
//! [`Instance`] groups hanging from the scene root.
//!
//! # Invariants
//!
//! - One prototype per [`DataId`].
//! - An instance's prototype is in the table for as long as the instance
//!   exists.
//! - A prototype whose last instance is removed is deleted immediately,
//!   renderer-side nodes included.

use std::collections::{BTreeMap, HashMap};

use glam::Mat4;
use scenebridge_core::host::{DataId, HostObject, ObjectId, PrimitiveCategory};
use scenebridge_core::scene_graph::{
    NodeHandle, NodeKind, SceneGraph, SceneGraphError, SceneGraphResult,
};

use crate::translators::{
    TranslateContext, TranslateError, TranslateResult, TranslatorSet, UpdateOutcome,
};

/// Point, face and face-vertex counts established by the last update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryCounts {
    pub npoints: usize,
    pub npolys: usize,
    pub nverts: usize,
}

/// Nodes owned by a mesh prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshNodes {
    pub geometry: NodeHandle,
    pub is_subdiv: bool,
    pub is_multi_material: bool,
    /// Face-set meshes for every material but the lowest index.
    pub children: Vec<NodeHandle>,
}

/// One curves node and the strands it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSet {
    pub node: NodeHandle,
    /// `(first point, point count)` of each strand in the host's flattened
    /// point list.
    pub strands: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightNodes {
    /// Combiner shader node, present when more than one filter is linked.
    pub combiner: Option<NodeHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightFilterNodes {
    pub filter: NodeHandle,
    pub filter_name: String,
    pub coord_sys: String,
    /// Lights this filter is linked to.
    pub lights: Vec<ObjectId>,
}

/// Category-specific node bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub enum PrototypeData {
    Mesh(MeshNodes),
    Curves(Vec<CurveSet>),
    /// The points node under the prototype group.
    Points(NodeHandle),
    Volume,
    Procedural,
    Light(LightNodes),
    LightFilter(LightFilterNodes),
}

/// A placement of a prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub group: NodeHandle,
    pub material: Option<NodeHandle>,
}

/// A data-block exported to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub key: DataId,
    pub category: PrimitiveCategory,
    pub db_name: String,
    /// The node instance groups add as a child.
    pub node: NodeHandle,
    pub is_transforming: bool,
    pub is_deforming: bool,
    /// Shutter sample times used for deformation.
    pub motion_steps: Vec<f32>,
    pub counts: GeometryCounts,
    pub instances: BTreeMap<ObjectId, Instance>,
    pub data: PrototypeData,
}

impl Prototype {
    pub fn new(
        key: DataId,
        category: PrimitiveCategory,
        db_name: &str,
        node: NodeHandle,
        data: PrototypeData,
    ) -> Self {
        Self {
            key,
            category,
            db_name: db_name.to_string(),
            node,
            is_transforming: false,
            is_deforming: false,
            motion_steps: Vec::new(),
            counts: GeometryCounts::default(),
            instances: BTreeMap::new(),
            data,
        }
    }

    /// Node that carries the primitive variables.
    pub fn primvar_node(&self) -> NodeHandle {
        match &self.data {
            PrototypeData::Mesh(mesh) => mesh.geometry,
            PrototypeData::LightFilter(filter) => filter.filter,
            PrototypeData::Points(geometry) => *geometry,
            _ => self.node,
        }
    }

    /// Motion is disabled for this frame: no deformation, no transform
    /// samples.
    pub fn disable_motion(&mut self) {
        self.is_transforming = false;
        self.is_deforming = false;
    }

    /// Whether deformation samples should be exported.
    pub fn wants_deform_samples(&self) -> bool {
        self.is_deforming && self.motion_steps.len() > 1
    }

    /// Every node owned by this prototype, children before parents.
    fn owned_nodes(&self, scene: &dyn SceneGraph) -> Vec<NodeHandle> {
        let mut nodes = Vec::new();
        match &self.data {
            PrototypeData::Mesh(mesh) => {
                nodes.extend(&mesh.children);
                nodes.push(mesh.geometry);
            }
            PrototypeData::Curves(sets) => nodes.extend(sets.iter().map(|set| set.node)),
            PrototypeData::Light(light) => {
                nodes.extend(scene.children(self.node).unwrap_or_default());
                nodes.extend(light.combiner);
            }
            PrototypeData::LightFilter(filter) => nodes.push(filter.filter),
            PrototypeData::Points(geometry) => nodes.push(*geometry),
            PrototypeData::Volume | PrototypeData::Procedural => {}
        }
        nodes.push(self.node);
        nodes
    }
}

/// Deletes a node, treating an already deleted node as success.
fn delete_quietly(scene: &mut dyn SceneGraph, node: NodeHandle) -> SceneGraphResult<()> {
    match scene.delete_node(node) {
        Ok(()) | Err(SceneGraphError::UnknownNode(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Result of [`SceneMirror::get_or_create_prototype`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    /// The translator's `export` ran.
    pub created: bool,
    /// Objects that lost their instance because the previous prototype for
    /// this key had a different category.
    pub evicted: Vec<ObjectId>,
}

/// Prototype table plus the object-to-prototype index.
#[derive(Debug, Default)]
pub struct SceneMirror {
    prototypes: HashMap<DataId, Prototype>,
    objects: HashMap<ObjectId, DataId>,
}

impl SceneMirror {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    pub fn prototype(&self, key: DataId) -> Option<&Prototype> {
        self.prototypes.get(&key)
    }

    pub fn prototype_mut(&mut self, key: DataId) -> Option<&mut Prototype> {
        self.prototypes.get_mut(&key)
    }

    /// Prototype the object is currently instanced from.
    pub fn prototype_for_object(&self, id: ObjectId) -> Option<&Prototype> {
        self.prototypes.get(self.objects.get(&id)?)
    }

    /// Data-block the object was instanced from.
    pub fn object_data(&self, id: ObjectId) -> Option<DataId> {
        self.objects.get(&id).copied()
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Instanced objects in id order.
    pub fn known_objects(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Looks up the prototype for `object.data`, exporting it on a miss.
    ///
    /// A prototype of another category under the same key is stale: its
    /// instances are detached, its nodes deleted and it is re-created by the
    /// right translator. The detached objects are returned so the caller can
    /// instance them again.
    pub fn get_or_create_prototype(
        &mut self,
        cx: &mut TranslateContext<'_>,
        translators: &TranslatorSet,
        object: &HostObject,
    ) -> TranslateResult<Lookup> {
        let key = object.data;
        let category = object.category();
        let mut lookup = Lookup::default();

        if let Some(existing) = self.prototypes.get(&key) {
            if existing.category == category {
                return Ok(lookup);
            }
            log::debug!(
                "Prototype {} changed from {} to {}; re-exporting",
                existing.db_name,
                existing.category,
                category
            );
            if let Some(stale) = self.prototypes.remove(&key) {
                lookup.evicted = self.destroy(cx.scene, stale)?;
            }
        }

        let translator = translators.for_category(category);
        let mut prototype = translator.export(cx, object, &object.db_name())?;
        Self::refresh_motion(&mut prototype, object, cx.settings.motion_steps());
        self.prototypes.insert(key, prototype);
        lookup.created = true;
        Ok(lookup)
    }

    fn refresh_motion(prototype: &mut Prototype, object: &HostObject, steps: Vec<f32>) {
        if steps.is_empty() {
            prototype.disable_motion();
        } else {
            prototype.is_transforming = object.is_transforming();
            prototype.is_deforming = object.is_deforming();
        }
        prototype.motion_steps = steps;
    }

    /// Runs the translator's full update followed by every deformation
    /// sample.
    pub fn update(
        &mut self,
        cx: &mut TranslateContext<'_>,
        translators: &TranslatorSet,
        object: &HostObject,
    ) -> TranslateResult<UpdateOutcome> {
        let prototype = self
            .prototypes
            .get_mut(&object.data)
            .ok_or(TranslateError::MissingPrototype(object.id))?;
        Self::refresh_motion(prototype, object, cx.settings.motion_steps());

        let translator = translators.for_category(prototype.category);
        let outcome = translator.update(cx, object, prototype)?;
        if outcome == UpdateOutcome::Defined && prototype.wants_deform_samples() {
            for sample in 0..prototype.motion_steps.len() as u32 {
                translator.export_deform_sample(cx, object, prototype, sample)?;
                if !prototype.is_deforming {
                    break;
                }
            }
        }
        Ok(outcome)
    }

    /// Refreshes one primitive variable.
    pub fn update_primvar(
        &mut self,
        cx: &mut TranslateContext<'_>,
        translators: &TranslatorSet,
        object: &HostObject,
        name: &str,
    ) -> TranslateResult<()> {
        let prototype = self
            .prototypes
            .get_mut(&object.data)
            .ok_or(TranslateError::MissingPrototype(object.id))?;
        translators
            .for_category(prototype.category)
            .update_primvar(cx, object, prototype, name)
    }

    /// Places `object` under the scene root. An existing instance of the
    /// object is updated in place.
    pub fn add_instance(
        &mut self,
        scene: &mut dyn SceneGraph,
        object: &HostObject,
        material: Option<NodeHandle>,
    ) -> TranslateResult<NodeHandle> {
        let prototype = self
            .prototypes
            .get_mut(&object.data)
            .ok_or(TranslateError::MissingPrototype(object.id))?;

        let group = match prototype.instances.get(&object.id) {
            Some(instance) => instance.group,
            None => {
                let group = scene.create_node(NodeKind::Group, &object.name)?;
                scene.add_child(group, prototype.node)?;
                let root = scene.root();
                scene.add_child(root, group)?;
                group
            }
        };
        let (samples, times) = Self::transform_samples(prototype, object);
        scene.set_transform(group, &samples, &times)?;
        scene.set_material(group, material)?;
        prototype
            .instances
            .insert(object.id, Instance { group, material });
        self.objects.insert(object.id, object.data);
        Ok(group)
    }

    fn transform_samples(prototype: &Prototype, object: &HostObject) -> (Vec<Mat4>, Vec<f32>) {
        let steps = &prototype.motion_steps;
        if prototype.is_transforming && steps.len() > 1 && object.transform.len() == steps.len() {
            (object.transform.clone(), steps.clone())
        } else {
            (vec![object.matrix()], Vec::new())
        }
    }

    /// Transform-only update: touches nothing but the instance group.
    pub fn update_instance_transform(
        &mut self,
        scene: &mut dyn SceneGraph,
        object: &HostObject,
    ) -> TranslateResult<()> {
        let prototype = self
            .prototypes
            .get(&object.data)
            .ok_or(TranslateError::MissingPrototype(object.id))?;
        let instance = prototype
            .instances
            .get(&object.id)
            .ok_or(TranslateError::MissingPrototype(object.id))?;
        let (samples, times) = Self::transform_samples(prototype, object);
        scene.set_transform(instance.group, &samples, &times)?;
        Ok(())
    }

    pub fn update_instance_material(
        &mut self,
        scene: &mut dyn SceneGraph,
        object: &HostObject,
        material: Option<NodeHandle>,
    ) -> TranslateResult<()> {
        let instance = self
            .prototypes
            .get_mut(&object.data)
            .and_then(|prototype| prototype.instances.get_mut(&object.id))
            .ok_or(TranslateError::MissingPrototype(object.id))?;
        scene.set_material(instance.group, material)?;
        instance.material = material;
        Ok(())
    }

    /// Removes the object's instance. Returns `true` when this was the last
    /// instance and the prototype was deleted with it.
    pub fn remove_instance(
        &mut self,
        scene: &mut dyn SceneGraph,
        id: ObjectId,
    ) -> SceneGraphResult<bool> {
        let Some(key) = self.objects.remove(&id) else {
            return Ok(false);
        };
        let Some(prototype) = self.prototypes.get_mut(&key) else {
            return Ok(false);
        };
        if let Some(instance) = prototype.instances.remove(&id) {
            Self::delete_instance(scene, &instance)?;
        }
        if !prototype.instances.is_empty() {
            return Ok(false);
        }
        if let Some(prototype) = self.prototypes.remove(&key) {
            log::debug!("Deleting prototype {}", prototype.db_name);
            self.destroy(scene, prototype)?;
        }
        Ok(true)
    }

    /// Drops a prototype nothing references yet, e.g. after its first
    /// update failed.
    pub fn discard_unused(
        &mut self,
        scene: &mut dyn SceneGraph,
        key: DataId,
    ) -> SceneGraphResult<()> {
        let unused = self
            .prototypes
            .get(&key)
            .is_some_and(|prototype| prototype.instances.is_empty());
        if unused && let Some(prototype) = self.prototypes.remove(&key) {
            self.destroy(scene, prototype)?;
        }
        Ok(())
    }

    /// Forgets `light` in the link list of every light filter. Filter
    /// prototypes without instances are deleted.
    pub fn unlink_light(
        &mut self,
        scene: &mut dyn SceneGraph,
        light: ObjectId,
    ) -> SceneGraphResult<()> {
        let mut unused = Vec::new();
        for (key, prototype) in &mut self.prototypes {
            if let PrototypeData::LightFilter(nodes) = &mut prototype.data {
                nodes.lights.retain(|id| *id != light);
                if prototype.instances.is_empty() {
                    unused.push(*key);
                }
            }
        }
        for key in unused {
            log::debug!("Deleting unplaced light filter {}", key);
            self.discard_unused(scene, key)?;
        }
        Ok(())
    }

    fn delete_instance(scene: &mut dyn SceneGraph, instance: &Instance) -> SceneGraphResult<()> {
        let root = scene.root();
        match scene.remove_child(root, instance.group) {
            Ok(()) | Err(SceneGraphError::NotAChild(..)) => {}
            Err(err) => return Err(err),
        }
        delete_quietly(scene, instance.group)
    }

    /// Deletes a prototype's instances and nodes. Returns the objects whose
    /// instances were removed.
    fn destroy(
        &mut self,
        scene: &mut dyn SceneGraph,
        prototype: Prototype,
    ) -> SceneGraphResult<Vec<ObjectId>> {
        let mut detached = Vec::with_capacity(prototype.instances.len());
        for (id, instance) in &prototype.instances {
            Self::delete_instance(scene, instance)?;
            self.objects.remove(id);
            detached.push(*id);
        }
        for node in prototype.owned_nodes(scene) {
            delete_quietly(scene, node)?;
        }
        Ok(detached)
    }

    /// Deletes everything this mirror created.
    pub fn clear(&mut self, scene: &mut dyn SceneGraph) -> SceneGraphResult<()> {
        let keys: Vec<_> = self.prototypes.keys().copied().collect();
        for key in keys {
            if let Some(prototype) = self.prototypes.remove(&key) {
                self.destroy(scene, prototype)?;
            }
        }
        self.objects.clear();
        Ok(())
    }

    /// Forgets all state without touching the renderer. Used once the
    /// renderer scene itself has been deleted.
    pub fn reset(&mut self) {
        self.prototypes.clear();
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translators::test_support::Harness;
    use glam::Vec3;
    use scenebridge_core::host::{DataId, HostGeometry, MeshData, ObjectId};

    fn mesh_object(id: u64, data: u64) -> HostObject {
        let mesh = MeshData::from_faces(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            &[&[0, 1, 3, 2]],
        );
        HostObject::new(
            ObjectId(id),
            format!("ob{id}"),
            DataId(data),
            format!("mesh{data}"),
            HostGeometry::Mesh(mesh),
        )
    }

    fn add(h: &mut Harness, mirror: &mut SceneMirror, set: &TranslatorSet, ob: &HostObject) -> Lookup {
        let lookup = mirror
            .get_or_create_prototype(&mut h.cx(), set, ob)
            .unwrap();
        if lookup.created {
            mirror.update(&mut h.cx(), set, ob).unwrap();
        }
        mirror.add_instance(&mut h.scene, ob, None).unwrap();
        lookup
    }

    #[test]
    fn shared_data_exports_once() {
        let mut h = Harness::new();
        let set = TranslatorSet::new();
        let mut mirror = SceneMirror::new();

        let a = mesh_object(1, 10);
        let b = mesh_object(2, 10);
        assert!(add(&mut h, &mut mirror, &set, &a).created);
        assert!(!add(&mut h, &mut mirror, &set, &b).created);

        assert_eq!(mirror.len(), 1);
        let prototype = mirror.prototype(DataId(10)).unwrap();
        assert_eq!(prototype.instances.len(), 2);
        assert_eq!(mirror.known_objects(), vec![ObjectId(1), ObjectId(2)]);
    }

    #[test]
    fn last_instance_collects_prototype() {
        let mut h = Harness::new();
        let set = TranslatorSet::new();
        let mut mirror = SceneMirror::new();

        add(&mut h, &mut mirror, &set, &mesh_object(1, 10));
        add(&mut h, &mut mirror, &set, &mesh_object(2, 10));
        let node = mirror.prototype(DataId(10)).unwrap().node;

        assert!(!mirror.remove_instance(&mut h.scene, ObjectId(1)).unwrap());
        assert_eq!(h.scene.delete_count(node), 0);

        assert!(mirror.remove_instance(&mut h.scene, ObjectId(2)).unwrap());
        assert_eq!(h.scene.delete_count(node), 1);
        assert!(mirror.is_empty());
        assert!(h.scene.children(h.scene.root()).unwrap().is_empty());
    }

    #[test]
    fn removing_unknown_object_is_a_no_op() {
        let mut h = Harness::new();
        let mut mirror = SceneMirror::new();
        assert!(!mirror.remove_instance(&mut h.scene, ObjectId(42)).unwrap());
    }

    #[test]
    fn category_change_recreates_prototype() {
        let mut h = Harness::new();
        let set = TranslatorSet::new();
        let mut mirror = SceneMirror::new();

        let mesh = mesh_object(1, 10);
        add(&mut h, &mut mirror, &set, &mesh);
        let old_node = mirror.prototype(DataId(10)).unwrap().node;

        let mut volume = mesh.clone();
        volume.geometry = HostGeometry::RiVolume;
        let lookup = add(&mut h, &mut mirror, &set, &volume);

        assert!(lookup.created);
        assert_eq!(lookup.evicted, vec![ObjectId(1)]);
        assert_eq!(h.scene.delete_count(old_node), 1);
        let prototype = mirror.prototype(DataId(10)).unwrap();
        assert_eq!(prototype.category, PrimitiveCategory::RiVolume);
        assert_eq!(prototype.instances.len(), 1);
    }

    #[test]
    fn clear_deletes_every_node() {
        let mut h = Harness::new();
        let set = TranslatorSet::new();
        let mut mirror = SceneMirror::new();
        add(&mut h, &mut mirror, &set, &mesh_object(1, 10));
        add(&mut h, &mut mirror, &set, &mesh_object(2, 20));

        mirror.clear(&mut h.scene).unwrap();

        assert!(mirror.is_empty());
        assert!(mirror.known_objects().is_empty());
        assert_eq!(h.scene.live_node_count(), 1);
    }
}
