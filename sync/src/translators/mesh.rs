//! Polygon meshes and subdivision surfaces.
//!
//! A mesh prototype is a group holding one mesh node. When faces use more
//! than one material, the faces of the lowest material index stay on that
//! node as a face set and every other material gets a child mesh named
//! `"{db_name}-{i}"` that inherits the primitive variables and carries only
//! its own face set and material binding.

use scenebridge_core::host::{HostGeometry, HostObject, MeshData, PrimitiveCategory};
use scenebridge_core::params::{Detail, ParamList};
use scenebridge_core::scene_graph::{Definition, NodeHandle, NodeKind};

use super::{
    TranslateContext, TranslateError, TranslateResult, Translator, UpdateOutcome, tokens,
    wrong_geometry,
};
use crate::mirror::{GeometryCounts, MeshNodes, Prototype, PrototypeData};

/// Renderer sharpness for a host crease weight of 1.0.
pub const INFINITELY_SHARP: f32 = 10.0;

/// Maps a host crease weight in `0..=1` to renderer sharpness.
pub fn crease_sharpness(weight: f32) -> f32 {
    let weight = weight.clamp(0.0, 1.0);
    weight * weight * INFINITELY_SHARP
}

/// Face indices per material index, in order of first appearance.
fn faces_by_material(mesh: &MeshData) -> Vec<(u32, Vec<i32>)> {
    let mut sets: Vec<(u32, Vec<i32>)> = Vec::new();
    for face in 0..mesh.npolys() {
        let material = mesh.material_index(face);
        match sets.iter_mut().find(|(id, _)| *id == material) {
            Some((_, faces)) => faces.push(face as i32),
            None => sets.push((material, vec![face as i32])),
        }
    }
    sets
}

fn is_multi_material(object: &HostObject, mesh: &MeshData) -> bool {
    if object.materials.len() < 2 || mesh.is_empty() {
        return false;
    }
    let first = mesh.material_index(0);
    (1..mesh.npolys()).any(|face| mesh.material_index(face) != first)
}

/// Subdivision tags: boundary interpolation plus one `crease` tag per edge
/// with a non-zero weight.
fn subdiv_tags(mesh: &MeshData, primvars: &mut ParamList) {
    let mut tags = vec![
        "interpolateboundary".to_string(),
        "facevaryinginterpolateboundary".to_string(),
    ];
    let mut nargs = vec![1, 0, 0, 1, 0, 0];
    let mut int_args = vec![
        mesh.interpolate_boundary,
        mesh.facevarying_interpolate_boundary,
    ];
    let mut float_args = Vec::new();

    for crease in mesh.creases.iter().filter(|c| c.weight > 0.0) {
        tags.push("crease".to_string());
        nargs.extend([2, 1, 0]);
        int_args.extend(crease.vertices.map(|v| v as i32));
        float_args.push(crease_sharpness(crease.weight));
    }

    primvars.set_string_array(tokens::SUBDIV_TAGS, tags);
    primvars.set_integer_array(tokens::SUBDIV_TAG_NARGS, nargs);
    primvars.set_integer_array(tokens::SUBDIV_TAG_INT_ARGS, int_args);
    primvars.set_float_array(tokens::SUBDIV_TAG_FLOAT_ARGS, float_args);
    primvars.set_string_array(tokens::SUBDIV_TAG_STRING_TAGS, Vec::new());
}

fn validate(object: &HostObject, mesh: &MeshData) -> TranslateResult<()> {
    let expected: usize = mesh.face_counts.iter().map(|c| *c as usize).sum();
    if expected != mesh.nverts() {
        return Err(TranslateError::InvalidData {
            object: object.name.clone(),
            reason: format!(
                "face counts cover {} vertices but {} were given",
                expected,
                mesh.nverts()
            ),
        });
    }
    if let Some(bad) = mesh
        .face_vertices
        .iter()
        .find(|v| **v as usize >= mesh.npoints())
    {
        return Err(TranslateError::InvalidData {
            object: object.name.clone(),
            reason: format!("point index {} out of range ({} points)", bad, mesh.npoints()),
        });
    }
    Ok(())
}

fn mesh_of(object: &HostObject) -> TranslateResult<&MeshData> {
    match &object.geometry {
        HostGeometry::Mesh(mesh) => Ok(mesh),
        _ => Err(wrong_geometry(PrimitiveCategory::Mesh, object)),
    }
}

fn nodes_of(prototype: &mut Prototype) -> TranslateResult<&mut MeshNodes> {
    match &mut prototype.data {
        PrototypeData::Mesh(nodes) => Ok(nodes),
        _ => Err(TranslateError::InvalidData {
            object: prototype.db_name.clone(),
            reason: "prototype is not a mesh".to_string(),
        }),
    }
}

#[derive(Debug, Default)]
pub struct MeshTranslator;

impl MeshTranslator {
    /// Clears motion times on the mesh node and every face-set child.
    fn drop_motion(
        cx: &mut TranslateContext<'_>,
        nodes: &MeshNodes,
    ) -> TranslateResult<()> {
        for node in std::iter::once(nodes.geometry).chain(nodes.children.iter().copied()) {
            let mut primvars = cx.scene.primvars(node)?;
            primvars.set_times(&[]);
            cx.scene.set_primvars(node, primvars)?;
        }
        Ok(())
    }

    fn delete_children(cx: &mut TranslateContext<'_>, nodes: &mut MeshNodes) -> TranslateResult<()> {
        for child in nodes.children.drain(..) {
            cx.scene.remove_child(nodes.geometry, child)?;
            cx.scene.delete_node(child)?;
        }
        Ok(())
    }

    fn material_node(
        cx: &TranslateContext<'_>,
        object: &HostObject,
        slot: u32,
    ) -> Option<NodeHandle> {
        object
            .material_for_slot(slot as usize)
            .and_then(|id| cx.materials.get(id))
    }
}

/// Builds the face-set children of a multi-material mesh.
struct FaceSets<'a> {
    db_name: &'a str,
    definition: &'a Definition,
    times: &'a [f32],
}

impl FaceSets<'_> {
    /// Defines one detached child per material but the lowest and stores the
    /// lowest material's faces in `primvars`. Returns the children and the
    /// material of the base node. Children created before a failure are
    /// deleted again.
    fn build(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        mesh: &MeshData,
        primvars: &mut ParamList,
    ) -> TranslateResult<(Vec<NodeHandle>, Option<NodeHandle>)> {
        let mut children = Vec::new();
        match self.define_all(cx, object, mesh, primvars, &mut children) {
            Ok(material) => Ok((children, material)),
            Err(err) => {
                Self::discard(cx, self.db_name, &children);
                Err(err)
            }
        }
    }

    /// Deletes children that never made it into the prototype.
    fn discard(cx: &mut TranslateContext<'_>, db_name: &str, children: &[NodeHandle]) {
        for child in children {
            if let Err(err) = cx.scene.delete_node(*child) {
                log::warn!("Could not delete face set of {}: {}", db_name, err);
            }
        }
    }

    fn define_all(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        mesh: &MeshData,
        primvars: &mut ParamList,
        children: &mut Vec<NodeHandle>,
    ) -> TranslateResult<Option<NodeHandle>> {
        let sets = faces_by_material(mesh);
        let min_index = sets.iter().map(|(id, _)| *id).min().unwrap_or(0);
        let mut base_material = None;
        for (material_index, faces) in sets {
            let material = MeshTranslator::material_node(cx, object, material_index);
            if material_index == min_index {
                primvars.set_integer_array(tokens::FACESET, faces);
                base_material = material;
                continue;
            }

            let name = format!("{}-{}", self.db_name, children.len() + 1);
            let child = cx.scene.create_node(NodeKind::Mesh, &name)?;
            children.push(child);
            cx.scene.define(child, self.definition.clone())?;
            if let Some(scheme) = mesh.subdivision {
                cx.scene.set_scheme(child, Some(scheme))?;
            }
            let mut child_primvars = ParamList::new();
            child_primvars.set_times(self.times);
            child_primvars.set_integer_array(tokens::FACESET, faces);
            child_primvars.inherit(primvars);
            cx.scene.set_primvars(child, child_primvars)?;
            cx.scene.set_material(child, material)?;
        }
        Ok(base_material)
    }
}

impl Translator for MeshTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::Mesh
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        mesh_of(object)?;
        let group = cx
            .scene
            .create_node(NodeKind::Group, &format!("{db_name}-group"))?;
        let geometry = cx.scene.create_node(NodeKind::Mesh, db_name)?;
        cx.scene.add_child(group, geometry)?;
        Ok(Prototype::new(
            object.data,
            PrimitiveCategory::Mesh,
            db_name,
            group,
            PrototypeData::Mesh(MeshNodes {
                geometry,
                is_subdiv: false,
                is_multi_material: false,
                children: Vec::new(),
            }),
        ))
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let mesh = mesh_of(object)?;
        let group = prototype.node;
        let db_name = prototype.db_name.clone();
        let wants_times = prototype.wants_deform_samples();
        let steps = prototype.motion_steps.clone();

        if mesh.is_empty() {
            log::debug!("Mesh {} is empty; detaching its geometry", db_name);
            prototype.counts = GeometryCounts::default();
            prototype.disable_motion();
            let nodes = nodes_of(prototype)?;
            if cx.scene.children(group)?.contains(&nodes.geometry) {
                cx.scene.remove_child(group, nodes.geometry)?;
            }
            return Ok(UpdateOutcome::Empty);
        }
        validate(object, mesh)?;

        let counts = GeometryCounts {
            npoints: mesh.npoints(),
            npolys: mesh.npolys(),
            nverts: mesh.nverts(),
        };
        let definition = Definition::Mesh {
            npolys: counts.npolys,
            npoints: counts.npoints,
            nverts: counts.nverts,
        };

        let multi_material = is_multi_material(object, mesh);
        let mut primvars = ParamList::new();
        if wants_times {
            primvars.set_times(&steps);
        }
        primvars.set_point_detail(tokens::P, mesh.points.clone(), Detail::Vertex);
        primvars.set_integer_detail(
            tokens::NVERTICES,
            mesh.face_counts.iter().map(|c| *c as i32).collect(),
            Detail::Uniform,
        );
        primvars.set_integer_detail(
            tokens::VERTICES,
            mesh.face_vertices.iter().map(|v| *v as i32).collect(),
            Detail::FaceVarying,
        );
        match mesh.subdivision {
            Some(_) => subdiv_tags(mesh, &mut primvars),
            None if !mesh.normals.is_empty() => {
                let detail = if mesh.normals.len() == counts.nverts {
                    Detail::FaceVarying
                } else {
                    Detail::Uniform
                };
                primvars.set_normal_detail(tokens::N, mesh.normals.clone(), detail);
            }
            None => {}
        }
        primvars.inherit(&object.primvars);

        // The old face sets stay in place until every new one is defined.
        let face_sets = if multi_material {
            let sets = FaceSets {
                db_name: &db_name,
                definition: &definition,
                times: if wants_times { &steps[..] } else { &[] },
            };
            Some(sets.build(cx, object, mesh, &mut primvars)?)
        } else {
            None
        };

        let nodes = nodes_of(prototype)?;
        let geometry = nodes.geometry;
        if let Err(err) = cx.scene.define(geometry, definition) {
            if let Some((children, _)) = &face_sets {
                FaceSets::discard(cx, &db_name, children);
            }
            return Err(err.into());
        }
        if cx.scene.num_children(group)? < 1 {
            cx.scene.add_child(group, geometry)?;
        }
        cx.scene.set_scheme(geometry, mesh.subdivision)?;
        nodes.is_subdiv = mesh.subdivision.is_some();
        nodes.is_multi_material = multi_material;

        Self::delete_children(cx, nodes)?;
        match face_sets {
            Some((children, material)) => {
                cx.scene.set_material(geometry, material)?;
                for child in children {
                    cx.scene.add_child(geometry, child)?;
                    nodes.children.push(child);
                }
            }
            None => cx.scene.set_material(geometry, None)?,
        }

        cx.scene.set_primvars(geometry, primvars)?;
        prototype.counts = counts;
        Ok(UpdateOutcome::Defined)
    }

    fn export_deform_sample(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
        sample: u32,
    ) -> TranslateResult<()> {
        let mesh = mesh_of(object)?;
        let npoints = prototype.counts.npoints;
        let positions = mesh
            .deform_samples
            .get(sample as usize)
            .filter(|points| points.len() == npoints);

        let Some(positions) = positions else {
            log::debug!(
                "Point count of {} changed within the shutter; disabling motion blur",
                prototype.db_name
            );
            prototype.disable_motion();
            let nodes = nodes_of(prototype)?;
            return Self::drop_motion(cx, nodes);
        };

        let nodes = nodes_of(prototype)?;
        for node in std::iter::once(nodes.geometry).chain(nodes.children.iter().copied()) {
            let mut primvars = cx.scene.primvars(node)?;
            primvars.set_point_detail_at(tokens::P, positions.clone(), Detail::Vertex, sample);
            cx.scene.set_primvars(node, primvars)?;
        }
        Ok(())
    }
}
