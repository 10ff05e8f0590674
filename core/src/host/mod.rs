//! Host scene model.
//!
//! The content-creation host hands the synchronizer an evaluated dependency
//! graph: objects with world transforms, geometry payloads and per-object
//! update tags. This module is the typed, host-neutral form of that data.
//!
//! # Identity
//!
//! - [`ObjectId`] names a placement in the world.
//! - [`DataId`] names the data-block the placement references. Objects that
//!   share a `DataId` share one exported prototype.
//! - [`MaterialId`] names a material.

pub mod depsgraph;
pub mod geometry;

use std::fmt;

use glam::{Mat4, Vec3};

use crate::params::ParamList;

pub use depsgraph::{
    Depsgraph, HostCamera, HostMaterial, ObjectUpdate, RenderVariant, SceneSettings,
    SceneSnapshot, UpdateTags,
};
pub use geometry::{
    AttributeRate, CombineMode, CreaseEdge, CurveAttribute, CurvesData, GridType, LightData,
    LightFilterData, MeshData, OpenVdbData, PointCloudData, RunProgramData, Strand, VdbGrid,
};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identity of a host object (a placement).
    ObjectId,
    "object#"
);
id_type!(
    /// Identity of a host data-block; the prototype key.
    DataId,
    "data#"
);
id_type!(
    /// Identity of a host material.
    MaterialId,
    "material#"
);

/// Translator dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveCategory {
    Mesh,
    Curves,
    PointCloud,
    RiVolume,
    OpenVdb,
    Light,
    LightFilter,
    RunProgram,
}

impl PrimitiveCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mesh => "MESH",
            Self::Curves => "CURVES",
            Self::PointCloud => "POINTCLOUD",
            Self::RiVolume => "RI_VOLUME",
            Self::OpenVdb => "OPENVDB",
            Self::Light => "LIGHT",
            Self::LightFilter => "LIGHTFILTER",
            Self::RunProgram => "PROCEDURAL_RUN_PROGRAM",
        }
    }
}

impl fmt::Display for PrimitiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry payload of a host object.
#[derive(Debug, Clone, PartialEq)]
pub enum HostGeometry {
    Mesh(MeshData),
    Curves(CurvesData),
    PointCloud(PointCloudData),
    /// Volume with no data of its own, rendered from its bounds.
    RiVolume,
    OpenVdb(OpenVdbData),
    Light(LightData),
    LightFilter(LightFilterData),
    RunProgram(RunProgramData),
}

impl HostGeometry {
    pub fn category(&self) -> PrimitiveCategory {
        match self {
            Self::Mesh(_) => PrimitiveCategory::Mesh,
            Self::Curves(_) => PrimitiveCategory::Curves,
            Self::PointCloud(_) => PrimitiveCategory::PointCloud,
            Self::RiVolume => PrimitiveCategory::RiVolume,
            Self::OpenVdb(_) => PrimitiveCategory::OpenVdb,
            Self::Light(_) => PrimitiveCategory::Light,
            Self::LightFilter(_) => PrimitiveCategory::LightFilter,
            Self::RunProgram(_) => PrimitiveCategory::RunProgram,
        }
    }
}

/// Axis-aligned object bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// `[xmin, xmax, ymin, ymax, zmin, zmax]`, the renderer's bound layout.
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min.x, self.max.x, self.min.y, self.max.y, self.min.z, self.max.z,
        ]
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }
}

/// An evaluated host object.
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub id: ObjectId,
    pub name: String,
    pub data: DataId,
    pub data_name: String,
    /// World matrix at each motion step; the first entry is the current
    /// frame.
    pub transform: Vec<Mat4>,
    pub visible: bool,
    /// Material slots. A slot may be empty.
    pub materials: Vec<Option<MaterialId>>,
    /// Object-level primvars exported onto every primitive.
    pub primvars: ParamList,
    pub bounds: Bounds,
    pub geometry: HostGeometry,
}

impl HostObject {
    pub fn new(
        id: ObjectId,
        name: impl Into<String>,
        data: DataId,
        data_name: impl Into<String>,
        geometry: HostGeometry,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            data,
            data_name: data_name.into(),
            transform: vec![Mat4::IDENTITY],
            visible: true,
            materials: Vec::new(),
            primvars: ParamList::new(),
            bounds: Bounds::default(),
            geometry,
        }
    }

    pub fn with_transform(mut self, matrix: Mat4) -> Self {
        self.transform = vec![matrix];
        self
    }

    pub fn with_motion(mut self, samples: Vec<Mat4>) -> Self {
        self.transform = samples;
        self
    }

    pub fn with_materials(mut self, materials: Vec<Option<MaterialId>>) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_primvars(mut self, primvars: ParamList) -> Self {
        self.primvars = primvars;
        self
    }

    #[inline]
    pub fn category(&self) -> PrimitiveCategory {
        self.geometry.category()
    }

    /// World matrix at the current frame.
    pub fn matrix(&self) -> Mat4 {
        self.transform.first().copied().unwrap_or(Mat4::IDENTITY)
    }

    /// True when the world matrix changes across the motion steps.
    pub fn is_transforming(&self) -> bool {
        match self.transform.split_first() {
            Some((first, rest)) => rest.iter().any(|m| m != first),
            None => false,
        }
    }

    pub fn is_deforming(&self) -> bool {
        match &self.geometry {
            HostGeometry::Mesh(mesh) => mesh.is_deforming(),
            HostGeometry::Curves(curves) => curves.is_deforming(),
            HostGeometry::PointCloud(cloud) => cloud.velocity.is_some(),
            _ => false,
        }
    }

    /// Renderer-side name of the data-block.
    pub fn db_name(&self) -> String {
        self.data_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Material in `slot`, falling back to the last slot when `slot` is out
    /// of range.
    pub fn material_for_slot(&self, slot: usize) -> Option<MaterialId> {
        self.materials
            .get(slot)
            .or_else(|| self.materials.last())
            .copied()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> HostObject {
        HostObject::new(
            ObjectId(1),
            "Cube",
            DataId(10),
            "Cube Mesh",
            HostGeometry::RiVolume,
        )
    }

    #[test]
    fn db_name_is_sanitized() {
        assert_eq!(object().db_name(), "Cube_Mesh");
    }

    #[test]
    fn static_transform_is_not_transforming() {
        let ob = object().with_motion(vec![Mat4::IDENTITY, Mat4::IDENTITY]);
        assert!(!ob.is_transforming());

        let ob = ob.with_motion(vec![
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::X),
        ]);
        assert!(ob.is_transforming());
    }

    #[test]
    fn out_of_range_slot_uses_last_material() {
        let ob = object().with_materials(vec![Some(MaterialId(1)), Some(MaterialId(2))]);
        assert_eq!(ob.material_for_slot(0), Some(MaterialId(1)));
        assert_eq!(ob.material_for_slot(7), Some(MaterialId(2)));
        assert_eq!(object().material_for_slot(0), None);
    }

    #[test]
    fn bounds_layout() {
        let b = Bounds::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.to_array(), [-1.0, 1.0, -2.0, 2.0, -3.0, 3.0]);
    }

    #[test]
    fn ids_display() {
        assert_eq!(ObjectId(4).to_string(), "object#4");
        assert_eq!(PrimitiveCategory::LightFilter.to_string(), "LIGHTFILTER");
    }
}
