//! Per-category geometry payloads carried by host objects.

use glam::Vec3;

use crate::params::{ParamList, ParamValue};
use crate::scene_graph::SubdivScheme;

use super::ObjectId;

/// An edge with a non-zero host crease weight in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreaseEdge {
    pub vertices: [u32; 2],
    pub weight: f32,
}

/// Polygon mesh or subdivision surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub points: Vec<Vec3>,
    /// Vertex count of each face.
    pub face_counts: Vec<u32>,
    /// Flattened point indices of every face.
    pub face_vertices: Vec<u32>,
    /// Empty, one per face, or one per face-vertex.
    pub normals: Vec<Vec3>,
    /// Crease weight for every edge; zero-weight edges may be listed too.
    pub creases: Vec<CreaseEdge>,
    /// Material slot of each face. Empty means slot 0 everywhere.
    pub material_indices: Vec<u32>,
    /// Set when the mesh renders as a subdivision surface.
    pub subdivision: Option<SubdivScheme>,
    /// Boundary interpolation for vertices and face-varying data.
    pub interpolate_boundary: i32,
    pub facevarying_interpolate_boundary: i32,
    /// Point positions at each motion step. Fewer than two entries means the
    /// mesh does not deform.
    pub deform_samples: Vec<Vec<Vec3>>,
}

impl MeshData {
    /// Builds a polygon mesh from faces given as point index lists.
    pub fn from_faces(points: Vec<Vec3>, faces: &[&[u32]]) -> Self {
        Self {
            points,
            face_counts: faces.iter().map(|f| f.len() as u32).collect(),
            face_vertices: faces.iter().flat_map(|f| f.iter().copied()).collect(),
            interpolate_boundary: 1,
            facevarying_interpolate_boundary: 3,
            ..Default::default()
        }
    }

    #[inline]
    pub fn npolys(&self) -> usize {
        self.face_counts.len()
    }

    #[inline]
    pub fn npoints(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn nverts(&self) -> usize {
        self.face_vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.face_counts.is_empty()
    }

    pub fn material_index(&self, face: usize) -> u32 {
        self.material_indices.get(face).copied().unwrap_or(0)
    }

    pub fn is_deforming(&self) -> bool {
        self.deform_samples.len() > 1
    }
}

/// Interpolation rate of a curve attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeRate {
    /// One value per control point.
    PerVertex,
    /// One value per strand.
    PerCurve,
}

/// Named attribute of a curves object, flattened across all strands.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveAttribute {
    pub name: String,
    pub rate: AttributeRate,
    pub value: ParamValue,
}

/// One hair strand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Strand {
    pub points: Vec<Vec3>,
    pub radii: Vec<f32>,
}

/// Hair or curve strands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurvesData {
    pub strands: Vec<Strand>,
    pub attributes: Vec<CurveAttribute>,
    /// Flattened control points at each motion step.
    pub deform_samples: Vec<Vec<Vec3>>,
}

impl CurvesData {
    /// Index of the first control point of every strand in the flattened
    /// point list.
    pub fn first_point_indices(&self) -> Vec<usize> {
        let mut next = 0;
        self.strands
            .iter()
            .map(|strand| {
                let first = next;
                next += strand.points.len();
                first
            })
            .collect()
    }

    pub fn is_deforming(&self) -> bool {
        self.deform_samples.len() > 1
    }
}

/// Point cloud.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudData {
    pub points: Vec<Vec3>,
    pub radii: Vec<f32>,
    /// Per-point velocity in units per second.
    pub velocity: Option<Vec<Vec3>>,
    /// Extra primvars, already tagged with a detail.
    pub attributes: ParamList,
}

/// Kind of voxel data stored in an OpenVDB grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridType {
    Float,
    Double,
    VectorFloat,
    VectorDouble,
    VectorInt,
    Int,
    Int64,
    Boolean,
    String,
    Mask,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VdbGrid {
    pub name: String,
    pub grid_type: GridType,
}

/// OpenVDB volume backed by a file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenVdbData {
    /// Empty when the volume has no file assigned.
    pub filepath: String,
    /// Set for image sequences; overrides `filepath` for the current frame.
    pub frame_filepath: Option<String>,
    pub grids: Vec<VdbGrid>,
    pub active_grid: usize,
    /// False when grid metadata could not be read.
    pub grids_loaded: bool,
    pub filter_width: f32,
    pub velocity_scale: f32,
    pub density_mult: f32,
    pub density_rolloff: f32,
}

impl Default for OpenVdbData {
    fn default() -> Self {
        Self {
            filepath: String::new(),
            frame_filepath: None,
            grids: Vec::new(),
            active_grid: 0,
            grids_loaded: true,
            filter_width: 0.0,
            velocity_scale: 1.0,
            density_mult: 1.0,
            density_rolloff: 0.0,
        }
    }
}

impl OpenVdbData {
    /// File to load for the current frame.
    pub fn resolved_path(&self) -> &str {
        self.frame_filepath.as_deref().unwrap_or(&self.filepath)
    }
}

/// Analytic light.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightData {
    pub shader: String,
    pub params: ParamList,
    /// Light filter objects linked to this light.
    pub filters: Vec<ObjectId>,
}

/// How a light filter combines with its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombineMode {
    #[default]
    Mult,
    Max,
    Min,
    Screen,
}

impl CombineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mult => "mult",
            Self::Max => "max",
            Self::Min => "min",
            Self::Screen => "screen",
        }
    }
}

/// Light filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightFilterData {
    pub shader: String,
    pub params: ParamList,
    pub combine_mode: Option<CombineMode>,
    /// Empty when the filter is not part of a light link.
    pub linking_groups: String,
}

impl LightFilterData {
    pub fn is_cheat_shadow(&self) -> bool {
        self.shader == "PxrCheatShadowLightFilter"
    }
}

/// Procedural generated by an external program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProgramData {
    pub program: String,
    pub args: String,
}
