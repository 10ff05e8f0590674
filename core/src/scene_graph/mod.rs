//! Retained scene-graph abstraction.
//!
//! The external renderer owns a persistent DAG of scene nodes. This module
//! describes the subset of that API the synchronizer drives: nodes are
//! created by kind, defined with counts, given typed primitive-variable sets,
//! and organised into a parent/child DAG with separate coordinate-system and
//! material-binding edges. Mutations are bracketed by edit scopes.
//!
//! # Available Backends
//!
//! - `dummy` (default): in-memory recording scene graph for tests and headless
//!   runs ([`DummySceneGraph`])
//!
//! # Architecture
//!
//! Every backend implements [`SceneGraph`]. Callers never pair
//! `begin_edit`/`end_edit` by hand; they open a [`ScopedEdit`], which commits
//! when it is dropped, including on early `?` returns and unwinding.

#[cfg(feature = "dummy")]
pub mod dummy;

use std::fmt;
use std::ops::{Deref, DerefMut};

use glam::Mat4;

use crate::params::ParamList;

#[cfg(feature = "dummy")]
pub use dummy::{DummyNode, DummySceneGraph};

/// Handle to a renderer-side scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Kind of scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Group,
    Mesh,
    Curves,
    Points,
    Volume,
    Procedural,
    Light,
    LightFilter,
    Material,
    Camera,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Mesh => "mesh",
            Self::Curves => "curves",
            Self::Points => "points",
            Self::Volume => "volume",
            Self::Procedural => "procedural",
            Self::Light => "light",
            Self::LightFilter => "lightfilter",
            Self::Material => "material",
            Self::Camera => "camera",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Curve degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveType {
    Linear,
    Cubic,
}

/// Curve end condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveWrap {
    Periodic,
    NonPeriodic,
}

/// Cubic curve basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveBasis {
    Bezier,
    BSpline,
    CatmullRom,
}

/// Topology passed to `define`. Renderers reject zero-count meshes and
/// curves, so translators detach empty geometry instead of defining it.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Mesh {
        npolys: usize,
        npoints: usize,
        nverts: usize,
    },
    Curves {
        curve_type: CurveType,
        wrap: CurveWrap,
        basis: CurveBasis,
        ncurves: usize,
        nverts: usize,
    },
    Points {
        npoints: usize,
    },
    Volume {
        dims: [u32; 3],
    },
    Procedural {
        kind: String,
    },
    /// Shader-backed nodes (lights, light filters, materials).
    Shader {
        name: String,
    },
}

/// Subdivision scheme for a mesh node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubdivScheme {
    CatmullClark,
    Loop,
    Bilinear,
}

impl SubdivScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatmullClark => "catmull-clark",
            Self::Loop => "loop",
            Self::Bilinear => "bilinear",
        }
    }
}

/// Errors raised by scene-graph backends.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneGraphError {
    #[error("unknown scene node {0}")]
    UnknownNode(NodeHandle),
    #[error("{node} is a {actual} node, expected {expected}")]
    KindMismatch {
        node: NodeHandle,
        expected: NodeKind,
        actual: NodeKind,
    },
    #[error("renderer rejected definition of \"{name}\": {reason}")]
    DefinitionRejected { name: String, reason: String },
    #[error("{0} is not a child of {1}")]
    NotAChild(NodeHandle, NodeHandle),
    #[error("{op} issued outside an edit scope")]
    OutsideEdit { op: &'static str },
}

pub type SceneGraphResult<T> = Result<T, SceneGraphError>;

/// The renderer's retained scene graph.
///
/// Implementations must tolerate calls from one thread at a time; the
/// render driver serialises access behind its session lock.
pub trait SceneGraph: Send {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// The world root every instance group hangs from.
    fn root(&self) -> NodeHandle;

    fn create_node(&mut self, kind: NodeKind, name: &str) -> SceneGraphResult<NodeHandle>;

    /// Deletes a node. Children are not deleted; they are owned separately.
    fn delete_node(&mut self, node: NodeHandle) -> SceneGraphResult<()>;

    fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> SceneGraphResult<()>;

    fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> SceneGraphResult<()>;

    fn children(&self, node: NodeHandle) -> SceneGraphResult<Vec<NodeHandle>>;

    fn num_children(&self, node: NodeHandle) -> SceneGraphResult<usize> {
        Ok(self.children(node)?.len())
    }

    fn define(&mut self, node: NodeHandle, definition: Definition) -> SceneGraphResult<()>;

    fn primvars(&self, node: NodeHandle) -> SceneGraphResult<ParamList>;

    fn set_primvars(&mut self, node: NodeHandle, primvars: ParamList) -> SceneGraphResult<()>;

    fn attributes(&self, node: NodeHandle) -> SceneGraphResult<ParamList>;

    fn set_attributes(&mut self, node: NodeHandle, attributes: ParamList) -> SceneGraphResult<()>;

    fn set_scheme(
        &mut self,
        node: NodeHandle,
        scheme: Option<SubdivScheme>,
    ) -> SceneGraphResult<()>;

    /// Sets the transform. More than one matrix makes it a motion transform
    /// sampled at `times`.
    fn set_transform(
        &mut self,
        node: NodeHandle,
        samples: &[Mat4],
        times: &[f32],
    ) -> SceneGraphResult<()>;

    fn set_material(
        &mut self,
        node: NodeHandle,
        material: Option<NodeHandle>,
    ) -> SceneGraphResult<()>;

    fn set_inherit_transform(&mut self, node: NodeHandle, inherit: bool) -> SceneGraphResult<()>;

    fn add_coordinate_system(
        &mut self,
        node: NodeHandle,
        coordsys: NodeHandle,
    ) -> SceneGraphResult<()>;

    fn set_light_filters(
        &mut self,
        light: NodeHandle,
        filters: &[NodeHandle],
    ) -> SceneGraphResult<()>;

    /// Opens an edit scope. Prefer [`ScopedEdit`].
    fn begin_edit(&mut self);

    /// Closes the innermost edit scope.
    fn end_edit(&mut self);
}

/// RAII edit transaction over a [`SceneGraph`].
///
/// `begin_edit` is called on construction and `end_edit` on drop, so the
/// renderer never observes a half-applied batch regardless of how the scope
/// is left.
///
/// # Example
///
/// ```ignore
/// let mut edit = ScopedEdit::new(scene);
/// let root = edit.root();
/// let node = edit.create_node(NodeKind::Group, "instance")?;
/// edit.add_child(root, node)?;
/// // committed here
/// ```
pub struct ScopedEdit<'a> {
    scene: &'a mut dyn SceneGraph,
}

impl<'a> ScopedEdit<'a> {
    pub fn new(scene: &'a mut dyn SceneGraph) -> Self {
        scene.begin_edit();
        Self { scene }
    }
}

impl<'a> Deref for ScopedEdit<'a> {
    type Target = dyn SceneGraph + 'a;

    fn deref(&self) -> &Self::Target {
        self.scene
    }
}

impl<'a> DerefMut for ScopedEdit<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scene
    }
}

impl Drop for ScopedEdit<'_> {
    fn drop(&mut self) {
        self.scene.end_edit();
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;

    #[test]
    fn scoped_edit_commits_on_drop() {
        let mut scene = DummySceneGraph::new();
        {
            let mut edit = ScopedEdit::new(&mut scene);
            let root = edit.root();
            let group = edit.create_node(NodeKind::Group, "g").unwrap();
            edit.add_child(root, group).unwrap();
        }
        assert!(!scene.in_edit());
        assert_eq!(scene.edits_committed(), 1);
        assert_eq!(scene.mutations_outside_edit(), 0);
    }

    #[test]
    fn scoped_edit_commits_on_error_path() {
        fn failing(scene: &mut dyn SceneGraph) -> SceneGraphResult<()> {
            let mut edit = ScopedEdit::new(scene);
            edit.delete_node(NodeHandle(9999))?;
            Ok(())
        }

        let mut scene = DummySceneGraph::new();
        let result = failing(&mut scene);
        assert_eq!(
            result,
            Err(SceneGraphError::UnknownNode(NodeHandle(9999)))
        );
        assert!(!scene.in_edit());
        assert_eq!(scene.edits_committed(), 1);
    }

    #[test]
    fn error_messages() {
        let err = SceneGraphError::KindMismatch {
            node: NodeHandle(3),
            expected: NodeKind::Mesh,
            actual: NodeKind::Group,
        };
        assert_eq!(err.to_string(), "node#3 is a group node, expected mesh");
    }
}
