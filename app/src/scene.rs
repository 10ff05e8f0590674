//! Synthetic scene used by the headless front end.
//!
//! One object of each kind the synchronizer translates: a subdivided cube,
//! a patch of hair, a point cloud with velocities, a bounds-only volume, a
//! rect light and a light filter linked to it. [`AnimatedScene`] moves the
//! cube and the camera as the frame changes.

use glam::{Mat4, Vec3};
use scenebridge_core::host::{
    Bounds, CombineMode, CurvesData, DataId, Depsgraph, HostCamera, HostGeometry, HostMaterial,
    HostObject, LightData, LightFilterData, MaterialId, MeshData, ObjectId, PointCloudData,
    SceneSettings, SceneSnapshot, Strand,
};
use scenebridge_core::params::ParamList;
use scenebridge_core::scene_graph::SubdivScheme;
use scenebridge_render::Timeline;

pub const CUBE: ObjectId = ObjectId(1);
pub const HAIR: ObjectId = ObjectId(2);
pub const DUST: ObjectId = ObjectId(3);
pub const FOG: ObjectId = ObjectId(4);
pub const KEY_LIGHT: ObjectId = ObjectId(5);
pub const GOBO: ObjectId = ObjectId(6);

const CUBE_MATERIAL: MaterialId = MaterialId(1);

fn cube() -> HostObject {
    let points = vec![
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
    ];
    let mut mesh = MeshData::from_faces(
        points,
        &[
            &[0, 3, 2, 1],
            &[4, 5, 6, 7],
            &[0, 1, 5, 4],
            &[1, 2, 6, 5],
            &[2, 3, 7, 6],
            &[3, 0, 4, 7],
        ],
    );
    mesh.subdivision = Some(SubdivScheme::CatmullClark);

    HostObject::new(CUBE, "Cube", DataId(1), "CubeMesh", HostGeometry::Mesh(mesh))
        .with_materials(vec![Some(CUBE_MATERIAL)])
        .with_bounds(Bounds::new(Vec3::splat(-1.0), Vec3::splat(1.0)))
}

fn hair() -> HostObject {
    let strands = (0..16)
        .map(|i| {
            let root = Vec3::new((i % 4) as f32 * 0.25, (i / 4) as f32 * 0.25, 1.0);
            Strand {
                points: (0..4).map(|k| root + Vec3::Z * k as f32 * 0.2).collect(),
                radii: vec![0.01, 0.008, 0.006, 0.004],
            }
        })
        .collect();
    let curves = CurvesData {
        strands,
        ..Default::default()
    };
    HostObject::new(HAIR, "Fur", DataId(2), "FurCurves", HostGeometry::Curves(curves))
}

fn dust() -> HostObject {
    let points: Vec<Vec3> = (0..32)
        .map(|i| Vec3::new((i as f32 * 0.37).sin(), (i as f32 * 0.71).cos(), i as f32 * 0.05))
        .collect();
    let cloud = PointCloudData {
        radii: vec![0.02; points.len()],
        velocity: Some(vec![Vec3::new(0.0, 0.0, -0.5); points.len()]),
        points,
        attributes: ParamList::new(),
    };
    HostObject::new(
        DUST,
        "Dust",
        DataId(3),
        "DustPoints",
        HostGeometry::PointCloud(cloud),
    )
}

fn fog() -> HostObject {
    HostObject::new(FOG, "Fog", DataId(4), "FogVolume", HostGeometry::RiVolume)
        .with_bounds(Bounds::new(Vec3::splat(-4.0), Vec3::splat(4.0)))
}

fn key_light() -> HostObject {
    let mut params = ParamList::new();
    params.set_float("intensity", 2.0);
    params.set_float("exposure", 1.0);
    let light = LightData {
        shader: "PxrRectLight".into(),
        params,
        filters: vec![GOBO],
    };
    HostObject::new(
        KEY_LIGHT,
        "Key",
        DataId(5),
        "KeyLight",
        HostGeometry::Light(light),
    )
    .with_transform(Mat4::from_translation(Vec3::new(3.0, 3.0, 4.0)))
}

fn gobo() -> HostObject {
    let mut params = ParamList::new();
    params.set_string("map", "gobo.tex");
    let filter = LightFilterData {
        shader: "PxrGoboLightFilter".into(),
        params,
        combine_mode: Some(CombineMode::Mult),
        linking_groups: String::new(),
    };
    HostObject::new(
        GOBO,
        "Gobo",
        DataId(6),
        "GoboFilter",
        HostGeometry::LightFilter(filter),
    )
}

/// Camera on a circle around the origin, looking at it.
fn orbit_camera(frame: i32) -> HostCamera {
    let angle = frame as f32 * 0.1;
    let eye = Vec3::new(angle.cos() * 8.0, angle.sin() * 8.0, 3.0);
    HostCamera {
        transform: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Z).inverse(),
        ..Default::default()
    }
}

/// Builds the synthetic scene at frame 1.
pub fn build_scene(settings: SceneSettings) -> SceneSnapshot {
    let mut snapshot = SceneSnapshot::new(settings);
    let mut params = ParamList::new();
    params.set_float("diffuseGain", 0.8);
    snapshot.add_material(HostMaterial {
        id: CUBE_MATERIAL,
        name: "Clay".into(),
        shader: "PxrSurface".into(),
        params,
    });
    for object in [cube(), hair(), dust(), fog(), key_light(), gobo()] {
        snapshot.add_object(object);
    }
    snapshot.set_camera(orbit_camera(1));
    snapshot
}

/// A scene whose cube and camera move with the frame.
pub struct AnimatedScene {
    snapshot: SceneSnapshot,
}

impl AnimatedScene {
    pub fn new(settings: SceneSettings) -> Self {
        Self {
            snapshot: build_scene(settings),
        }
    }

    pub fn snapshot(&self) -> &SceneSnapshot {
        &self.snapshot
    }

    /// Forgets recorded edits once the renderer has seen them.
    pub fn mark_synced(&mut self) {
        self.snapshot.clear_updates();
    }

    /// Hides or shows the hair, one of the scripted interactive edits.
    pub fn toggle_hair(&mut self) -> bool {
        let visible = self
            .snapshot
            .object(HAIR)
            .is_some_and(|object| object.visible);
        self.snapshot.set_visible(HAIR, !visible);
        !visible
    }
}

impl Timeline for AnimatedScene {
    fn set_frame(&mut self, frame: i32) {
        self.snapshot.clear_updates();
        self.snapshot.set_frame(frame);
        let lift = Mat4::from_translation(Vec3::Z * frame as f32 * 0.1);
        let spin = Mat4::from_rotation_z(frame as f32 * 0.05);
        self.snapshot.set_transform(CUBE, lift * spin);
        self.snapshot.set_camera(orbit_camera(frame));
    }

    fn depsgraph(&self) -> &dyn Depsgraph {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenebridge_core::host::PrimitiveCategory;

    #[test]
    fn scene_has_one_object_per_kind() {
        let snapshot = build_scene(SceneSettings::default());
        let categories: Vec<PrimitiveCategory> =
            snapshot.objects().iter().map(|ob| ob.category()).collect();
        assert_eq!(
            categories,
            vec![
                PrimitiveCategory::Mesh,
                PrimitiveCategory::Curves,
                PrimitiveCategory::PointCloud,
                PrimitiveCategory::RiVolume,
                PrimitiveCategory::Light,
                PrimitiveCategory::LightFilter,
            ]
        );
        assert!(snapshot.camera().is_some());
        assert!(snapshot.material(CUBE_MATERIAL).is_some());
    }

    #[test]
    fn frame_change_tags_only_the_cube() {
        let mut scene = AnimatedScene::new(SceneSettings::default());
        scene.set_frame(4);
        let updates = scene.depsgraph().updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, CUBE);
        assert_eq!(scene.depsgraph().frame(), 4);
    }

    #[test]
    fn toggling_hair_flips_visibility() {
        let mut scene = AnimatedScene::new(SceneSettings::default());
        assert!(!scene.toggle_hair());
        assert!(scene.toggle_hair());
    }
}
