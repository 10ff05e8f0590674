//! Point clouds.

use scenebridge_core::host::{HostGeometry, HostObject, PointCloudData, PrimitiveCategory};
use scenebridge_core::params::{Detail, ParamList};
use scenebridge_core::scene_graph::{Definition, NodeHandle, NodeKind};

use super::{
    TranslateContext, TranslateError, TranslateResult, Translator, UpdateOutcome, tokens,
    wrong_geometry,
};
use crate::mirror::{GeometryCounts, Prototype, PrototypeData};

fn cloud_of(object: &HostObject) -> TranslateResult<&PointCloudData> {
    match &object.geometry {
        HostGeometry::PointCloud(cloud) => Ok(cloud),
        _ => Err(wrong_geometry(PrimitiveCategory::PointCloud, object)),
    }
}

fn geometry_of(prototype: &Prototype) -> TranslateResult<NodeHandle> {
    match prototype.data {
        PrototypeData::Points(geometry) => Ok(geometry),
        _ => Err(TranslateError::InvalidData {
            object: prototype.db_name.clone(),
            reason: "prototype is not a point cloud".to_string(),
        }),
    }
}

/// A point cloud prototype is a group holding one points node, detached
/// while the cloud is empty.
///
/// Point clouds carry no deformation history. Motion blur comes from the
/// velocity attribute instead: the second sample is each point pushed along
/// its velocity over the shutter interval.
#[derive(Debug, Default)]
pub struct PointCloudTranslator;

impl Translator for PointCloudTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::PointCloud
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        cloud_of(object)?;
        let group = cx
            .scene
            .create_node(NodeKind::Group, &format!("{db_name}-group"))?;
        let geometry = cx.scene.create_node(NodeKind::Points, db_name)?;
        cx.scene.add_child(group, geometry)?;
        Ok(Prototype::new(
            object.data,
            PrimitiveCategory::PointCloud,
            db_name,
            group,
            PrototypeData::Points(geometry),
        ))
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let cloud = cloud_of(object)?;
        let group = prototype.node;
        let geometry = geometry_of(prototype)?;
        let attached = cx.scene.children(group)?.contains(&geometry);
        let npoints = cloud.points.len();
        if npoints == 0 {
            log::debug!("Point cloud {} is empty; detaching it", prototype.db_name);
            prototype.disable_motion();
            prototype.counts = GeometryCounts::default();
            if attached {
                cx.scene.remove_child(group, geometry)?;
            }
            return Ok(UpdateOutcome::Empty);
        }

        cx.scene.define(geometry, Definition::Points { npoints })?;
        prototype.counts = GeometryCounts {
            npoints,
            ..Default::default()
        };

        let mut primvars = ParamList::new();
        let velocity = cloud
            .velocity
            .as_ref()
            .filter(|velocity| velocity.len() == npoints);
        let steps = prototype.motion_steps.clone();
        match (velocity, steps.first(), steps.last()) {
            (Some(velocity), Some(first), Some(last)) if steps.len() > 1 => {
                let scale = cx.settings.velocity_scale();
                let moved = cloud
                    .points
                    .iter()
                    .zip(velocity)
                    .map(|(p, v)| *p + *v * scale)
                    .collect();
                primvars.set_times(&[*first, *last]);
                primvars.set_point_detail_at(tokens::P, cloud.points.clone(), Detail::Vertex, 0);
                primvars.set_point_detail_at(tokens::P, moved, Detail::Vertex, 1);
            }
            _ => {
                primvars.set_times(&[]);
                primvars.set_point_detail(tokens::P, cloud.points.clone(), Detail::Vertex);
                prototype.is_deforming = false;
            }
        }

        if cloud.radii.iter().any(|r| *r != 0.0) {
            let widths = cloud.radii.iter().map(|r| r * 2.0).collect();
            primvars.set_float_detail(tokens::WIDTH, widths, Detail::Vertex);
        }
        primvars.inherit(&cloud.attributes);
        primvars.inherit(&object.primvars);
        cx.scene.set_primvars(geometry, primvars)?;
        if !attached {
            cx.scene.add_child(group, geometry)?;
        }
        Ok(UpdateOutcome::Defined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translators::test_support::Harness;
    use glam::Vec3;
    use scenebridge_core::host::{DataId, ObjectId};
    use scenebridge_core::scene_graph::SceneGraph;

    fn object(cloud: PointCloudData) -> HostObject {
        HostObject::new(
            ObjectId(4),
            "Dust",
            DataId(4),
            "Dust",
            HostGeometry::PointCloud(cloud),
        )
    }

    #[test]
    fn static_cloud_has_widths() {
        let mut h = Harness::new();
        let ob = object(PointCloudData {
            points: vec![Vec3::ZERO, Vec3::X],
            radii: vec![0.5, 0.25],
            ..Default::default()
        });
        let mut proto = h.export(&PointCloudTranslator, &ob);
        PointCloudTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        let node = h.scene.node(proto.primvar_node()).unwrap();
        assert_eq!(node.definition, Some(Definition::Points { npoints: 2 }));
        assert_eq!(node.primvars.floats(tokens::WIDTH).unwrap(), &[1.0, 0.5]);
        assert!(node.primvars.times().is_empty());
    }

    #[test]
    fn zero_radii_omit_width() {
        let mut h = Harness::new();
        let ob = object(PointCloudData {
            points: vec![Vec3::ZERO],
            radii: vec![0.0],
            ..Default::default()
        });
        let mut proto = h.export(&PointCloudTranslator, &ob);
        PointCloudTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();
        assert!(!h.scene.primvars(proto.primvar_node()).unwrap().contains(tokens::WIDTH));
    }

    #[test]
    fn velocity_produces_second_sample() {
        let mut h = Harness::new();
        h.settings.motion_blur = true;
        let ob = object(PointCloudData {
            points: vec![Vec3::ZERO, Vec3::X],
            velocity: Some(vec![Vec3::Y * 48.0, Vec3::ZERO]),
            ..Default::default()
        });
        let mut proto = h.export(&PointCloudTranslator, &ob);
        proto.motion_steps = h.settings.motion_steps();
        proto.is_deforming = true;
        PointCloudTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        let pv = h.scene.primvars(proto.primvar_node()).unwrap();
        let steps = h.settings.motion_steps();
        assert_eq!(pv.times(), &[steps[0], steps[steps.len() - 1]]);
        let moved = pv.vec3s_at(tokens::P, 1).unwrap();
        let expected = 48.0 * h.settings.velocity_scale();
        assert!((moved[0].y - expected).abs() < 1e-5);
        assert_eq!(moved[1], Vec3::X);
    }

    #[test]
    fn mismatched_velocity_is_ignored() {
        let mut h = Harness::new();
        h.settings.motion_blur = true;
        let ob = object(PointCloudData {
            points: vec![Vec3::ZERO, Vec3::X],
            velocity: Some(vec![Vec3::Y]),
            ..Default::default()
        });
        let mut proto = h.export(&PointCloudTranslator, &ob);
        proto.motion_steps = h.settings.motion_steps();
        proto.is_deforming = true;
        PointCloudTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        assert!(!proto.is_deforming);
        let pv = h.scene.primvars(proto.primvar_node()).unwrap();
        assert!(pv.times().is_empty());
        assert_eq!(pv.sample_count(tokens::P), 1);
    }

    #[test]
    fn empty_cloud_disables_motion() {
        let mut h = Harness::new();
        let ob = object(PointCloudData::default());
        let mut proto = h.export(&PointCloudTranslator, &ob);
        proto.is_transforming = true;
        let outcome = PointCloudTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();
        assert_eq!(outcome, UpdateOutcome::Empty);
        assert!(!proto.is_transforming);
        assert_eq!(h.scene.define_count(proto.primvar_node()), 0);
        assert!(h.scene.children(proto.node).unwrap().is_empty());
    }

    #[test]
    fn emptied_cloud_is_detached_until_it_has_points_again() {
        let mut h = Harness::new();
        let full = object(PointCloudData {
            points: vec![Vec3::ZERO, Vec3::X],
            ..Default::default()
        });
        let mut proto = h.export(&PointCloudTranslator, &full);
        let points = proto.primvar_node();
        PointCloudTranslator.update(&mut h.cx(), &full, &mut proto).unwrap();
        assert_eq!(h.scene.children(proto.node).unwrap(), vec![points]);

        let empty = object(PointCloudData::default());
        let outcome = PointCloudTranslator.update(&mut h.cx(), &empty, &mut proto).unwrap();
        assert_eq!(outcome, UpdateOutcome::Empty);
        assert!(h.scene.children(proto.node).unwrap().is_empty());
        assert_eq!(proto.counts, GeometryCounts::default());

        let refilled = object(PointCloudData {
            points: vec![Vec3::ONE; 3],
            ..Default::default()
        });
        PointCloudTranslator.update(&mut h.cx(), &refilled, &mut proto).unwrap();
        assert_eq!(h.scene.children(proto.node).unwrap(), vec![points]);
        let node = h.scene.node(points).unwrap();
        assert_eq!(node.definition, Some(Definition::Points { npoints: 3 }));
    }
}
