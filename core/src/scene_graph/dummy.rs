//! Dummy scene graph for testing and headless runs.
//!
//! Nothing is sent to a renderer. Every call is recorded in shared state so a
//! test can hold one clone of the graph while the synchronizer drives another
//! and then assert how often each node was defined, transformed or deleted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;

use super::{
    Definition, NodeHandle, NodeKind, SceneGraph, SceneGraphError, SceneGraphResult,
    SubdivScheme,
};
use crate::params::ParamList;

/// Recorded state of one node.
#[derive(Debug, Clone)]
pub struct DummyNode {
    pub kind: NodeKind,
    pub name: String,
    pub children: Vec<NodeHandle>,
    pub primvars: ParamList,
    pub attributes: ParamList,
    pub definition: Option<Definition>,
    pub scheme: Option<SubdivScheme>,
    pub transform: Vec<Mat4>,
    pub transform_times: Vec<f32>,
    pub material: Option<NodeHandle>,
    pub inherit_transform: bool,
    pub coordinate_systems: Vec<NodeHandle>,
    pub light_filters: Vec<NodeHandle>,
    pub define_calls: usize,
    pub transform_calls: usize,
    pub primvar_calls: usize,
}

impl DummyNode {
    fn new(kind: NodeKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            children: Vec::new(),
            primvars: ParamList::new(),
            attributes: ParamList::new(),
            definition: None,
            scheme: None,
            transform: Vec::new(),
            transform_times: Vec::new(),
            material: None,
            inherit_transform: true,
            coordinate_systems: Vec::new(),
            light_filters: Vec::new(),
            define_calls: 0,
            transform_calls: 0,
            primvar_calls: 0,
        }
    }
}

#[derive(Debug)]
struct DummyState {
    nodes: HashMap<NodeHandle, DummyNode>,
    deleted: HashMap<NodeHandle, usize>,
    next_id: u64,
    root: NodeHandle,
    edit_depth: u32,
    edits_begun: usize,
    edits_committed: usize,
    mutations_outside_edit: usize,
    strict: bool,
    rejected_names: HashSet<String>,
}

impl DummyState {
    fn new() -> Self {
        let root = NodeHandle(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, DummyNode::new(NodeKind::Group, "world"));
        Self {
            nodes,
            deleted: HashMap::new(),
            next_id: 1,
            root,
            edit_depth: 0,
            edits_begun: 0,
            edits_committed: 0,
            mutations_outside_edit: 0,
            strict: false,
            rejected_names: HashSet::new(),
        }
    }

    fn touch(&mut self, op: &'static str) -> SceneGraphResult<()> {
        if self.edit_depth == 0 {
            self.mutations_outside_edit += 1;
            if self.strict {
                return Err(SceneGraphError::OutsideEdit { op });
            }
        }
        Ok(())
    }

    fn node(&self, handle: NodeHandle) -> SceneGraphResult<&DummyNode> {
        self.nodes
            .get(&handle)
            .ok_or(SceneGraphError::UnknownNode(handle))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> SceneGraphResult<&mut DummyNode> {
        self.nodes
            .get_mut(&handle)
            .ok_or(SceneGraphError::UnknownNode(handle))
    }

    fn expect_kind(&self, handle: NodeHandle, expected: NodeKind) -> SceneGraphResult<()> {
        let actual = self.node(handle)?.kind;
        if actual != expected {
            return Err(SceneGraphError::KindMismatch {
                node: handle,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// In-memory recording scene graph.
///
/// Clones share state.
#[derive(Clone)]
pub struct DummySceneGraph {
    state: Arc<Mutex<DummyState>>,
}

impl DummySceneGraph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DummyState::new())),
        }
    }

    /// Rejects any mutation issued outside an edit scope.
    pub fn strict() -> Self {
        let graph = Self::new();
        graph.state.lock().strict = true;
        graph
    }

    /// Makes every `define` on a node with this name fail.
    pub fn fail_definitions_for(&self, name: &str) {
        self.state.lock().rejected_names.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().rejected_names.clear();
    }

    pub fn in_edit(&self) -> bool {
        self.state.lock().edit_depth > 0
    }

    pub fn edits_begun(&self) -> usize {
        self.state.lock().edits_begun
    }

    pub fn edits_committed(&self) -> usize {
        self.state.lock().edits_committed
    }

    pub fn mutations_outside_edit(&self) -> usize {
        self.state.lock().mutations_outside_edit
    }

    /// Snapshot of a live node.
    pub fn node(&self, handle: NodeHandle) -> Option<DummyNode> {
        self.state.lock().nodes.get(&handle).cloned()
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.state.lock().nodes.contains_key(&handle)
    }

    /// First live node with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        let state = self.state.lock();
        let mut found: Vec<_> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.name == name)
            .map(|(handle, _)| *handle)
            .collect();
        found.sort();
        found.first().copied()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeHandle> {
        let state = self.state.lock();
        let mut found: Vec<_> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.kind == kind)
            .map(|(handle, _)| *handle)
            .collect();
        found.sort();
        found
    }

    /// Live nodes, the root included.
    pub fn live_node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn define_count(&self, handle: NodeHandle) -> usize {
        self.state
            .lock()
            .nodes
            .get(&handle)
            .map_or(0, |node| node.define_calls)
    }

    pub fn transform_count(&self, handle: NodeHandle) -> usize {
        self.state
            .lock()
            .nodes
            .get(&handle)
            .map_or(0, |node| node.transform_calls)
    }

    /// How many times `delete_node` succeeded for this handle.
    pub fn delete_count(&self, handle: NodeHandle) -> usize {
        self.state
            .lock()
            .deleted
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_deletes(&self) -> usize {
        self.state.lock().deleted.values().sum()
    }

    pub fn total_defines(&self) -> usize {
        self.state
            .lock()
            .nodes
            .values()
            .map(|node| node.define_calls)
            .sum()
    }
}

impl Default for DummySceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummySceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DummySceneGraph")
            .field("nodes", &state.nodes.len())
            .field("edit_depth", &state.edit_depth)
            .finish()
    }
}

impl SceneGraph for DummySceneGraph {
    fn name(&self) -> &str {
        "Dummy Scene Graph"
    }

    fn root(&self) -> NodeHandle {
        self.state.lock().root
    }

    fn create_node(&mut self, kind: NodeKind, name: &str) -> SceneGraphResult<NodeHandle> {
        let mut state = self.state.lock();
        state.touch("create_node")?;
        let handle = NodeHandle(state.next_id);
        state.next_id += 1;
        state.nodes.insert(handle, DummyNode::new(kind, name));
        log::trace!("DummySceneGraph: created {} node {:?} as {}", kind, name, handle);
        Ok(handle)
    }

    fn delete_node(&mut self, node: NodeHandle) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("delete_node")?;
        if state.nodes.remove(&node).is_none() {
            return Err(SceneGraphError::UnknownNode(node));
        }
        for other in state.nodes.values_mut() {
            other.children.retain(|child| *child != node);
            other.coordinate_systems.retain(|c| *c != node);
            other.light_filters.retain(|f| *f != node);
        }
        *state.deleted.entry(node).or_insert(0) += 1;
        log::trace!("DummySceneGraph: deleted {}", node);
        Ok(())
    }

    fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("add_child")?;
        state.node(child)?;
        let parent_node = state.node_mut(parent)?;
        if !parent_node.children.contains(&child) {
            parent_node.children.push(child);
        }
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("remove_child")?;
        let parent_node = state.node_mut(parent)?;
        let before = parent_node.children.len();
        parent_node.children.retain(|c| *c != child);
        if parent_node.children.len() == before {
            return Err(SceneGraphError::NotAChild(child, parent));
        }
        Ok(())
    }

    fn children(&self, node: NodeHandle) -> SceneGraphResult<Vec<NodeHandle>> {
        Ok(self.state.lock().node(node)?.children.clone())
    }

    fn define(&mut self, node: NodeHandle, definition: Definition) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("define")?;
        let name = state.node(node)?.name.clone();
        if state.rejected_names.contains(&name) {
            return Err(SceneGraphError::DefinitionRejected {
                name,
                reason: "injected failure".to_string(),
            });
        }
        let expected = match &definition {
            Definition::Mesh { npolys, .. } => {
                if *npolys == 0 {
                    return Err(SceneGraphError::DefinitionRejected {
                        name,
                        reason: "zero polygons".to_string(),
                    });
                }
                Some(NodeKind::Mesh)
            }
            Definition::Curves { ncurves, .. } => {
                if *ncurves == 0 {
                    return Err(SceneGraphError::DefinitionRejected {
                        name,
                        reason: "zero curves".to_string(),
                    });
                }
                Some(NodeKind::Curves)
            }
            Definition::Points { .. } => Some(NodeKind::Points),
            Definition::Volume { .. } => Some(NodeKind::Volume),
            Definition::Procedural { .. } => Some(NodeKind::Procedural),
            Definition::Shader { .. } => None,
        };
        if let Some(expected) = expected {
            state.expect_kind(node, expected)?;
        }
        log::trace!("DummySceneGraph: define {} {:?}", node, definition);
        let entry = state.node_mut(node)?;
        entry.definition = Some(definition);
        entry.define_calls += 1;
        Ok(())
    }

    fn primvars(&self, node: NodeHandle) -> SceneGraphResult<ParamList> {
        Ok(self.state.lock().node(node)?.primvars.clone())
    }

    fn set_primvars(&mut self, node: NodeHandle, primvars: ParamList) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_primvars")?;
        let entry = state.node_mut(node)?;
        entry.primvars = primvars;
        entry.primvar_calls += 1;
        Ok(())
    }

    fn attributes(&self, node: NodeHandle) -> SceneGraphResult<ParamList> {
        Ok(self.state.lock().node(node)?.attributes.clone())
    }

    fn set_attributes(&mut self, node: NodeHandle, attributes: ParamList) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_attributes")?;
        state.node_mut(node)?.attributes = attributes;
        Ok(())
    }

    fn set_scheme(
        &mut self,
        node: NodeHandle,
        scheme: Option<SubdivScheme>,
    ) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_scheme")?;
        state.expect_kind(node, NodeKind::Mesh)?;
        state.node_mut(node)?.scheme = scheme;
        Ok(())
    }

    fn set_transform(
        &mut self,
        node: NodeHandle,
        samples: &[Mat4],
        times: &[f32],
    ) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_transform")?;
        let entry = state.node_mut(node)?;
        entry.transform = samples.to_vec();
        entry.transform_times = times.to_vec();
        entry.transform_calls += 1;
        log::trace!(
            "DummySceneGraph: transform {} ({} samples)",
            node,
            samples.len()
        );
        Ok(())
    }

    fn set_material(
        &mut self,
        node: NodeHandle,
        material: Option<NodeHandle>,
    ) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_material")?;
        if let Some(material) = material {
            state.expect_kind(material, NodeKind::Material)?;
        }
        state.node_mut(node)?.material = material;
        Ok(())
    }

    fn set_inherit_transform(&mut self, node: NodeHandle, inherit: bool) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_inherit_transform")?;
        state.node_mut(node)?.inherit_transform = inherit;
        Ok(())
    }

    fn add_coordinate_system(
        &mut self,
        node: NodeHandle,
        coordsys: NodeHandle,
    ) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("add_coordinate_system")?;
        state.node(coordsys)?;
        let entry = state.node_mut(node)?;
        if !entry.coordinate_systems.contains(&coordsys) {
            entry.coordinate_systems.push(coordsys);
        }
        Ok(())
    }

    fn set_light_filters(
        &mut self,
        light: NodeHandle,
        filters: &[NodeHandle],
    ) -> SceneGraphResult<()> {
        let mut state = self.state.lock();
        state.touch("set_light_filters")?;
        state.expect_kind(light, NodeKind::Light)?;
        for filter in filters {
            state.node(*filter)?;
        }
        state.node_mut(light)?.light_filters = filters.to_vec();
        Ok(())
    }

    fn begin_edit(&mut self) {
        let mut state = self.state.lock();
        state.edit_depth += 1;
        state.edits_begun += 1;
    }

    fn end_edit(&mut self) {
        let mut state = self.state.lock();
        if state.edit_depth == 0 {
            log::warn!("DummySceneGraph: end_edit without a matching begin_edit");
            return;
        }
        state.edit_depth -= 1;
        state.edits_committed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::ScopedEdit;

    #[test]
    fn clones_share_state() {
        let mut scene = DummySceneGraph::new();
        let view = scene.clone();
        let node = scene.create_node(NodeKind::Mesh, "cube").unwrap();
        assert!(view.contains(node));
        assert_eq!(view.find_by_name("cube"), Some(node));
    }

    #[test]
    fn counts_defines_and_deletes() {
        let mut scene = DummySceneGraph::new();
        let mut edit = ScopedEdit::new(&mut scene);
        let mesh = edit.create_node(NodeKind::Mesh, "cube").unwrap();
        let mesh_def = Definition::Mesh {
            npolys: 6,
            npoints: 8,
            nverts: 24,
        };
        edit.define(mesh, mesh_def.clone()).unwrap();
        edit.define(mesh, mesh_def).unwrap();
        edit.delete_node(mesh).unwrap();
        drop(edit);

        assert_eq!(scene.delete_count(mesh), 1);
        assert_eq!(scene.define_count(mesh), 0);
        assert!(!scene.contains(mesh));
    }

    #[test]
    fn delete_detaches_from_parents() {
        let mut scene = DummySceneGraph::new();
        let root = scene.root();
        let group = scene.create_node(NodeKind::Group, "g").unwrap();
        scene.add_child(root, group).unwrap();
        scene.delete_node(group).unwrap();
        assert!(scene.children(root).unwrap().is_empty());
        assert_eq!(
            scene.delete_node(group),
            Err(SceneGraphError::UnknownNode(group))
        );
    }

    #[test]
    fn remove_missing_child_is_an_error() {
        let mut scene = DummySceneGraph::new();
        let root = scene.root();
        let group = scene.create_node(NodeKind::Group, "g").unwrap();
        assert_eq!(
            scene.remove_child(root, group),
            Err(SceneGraphError::NotAChild(group, root))
        );
    }

    #[test]
    fn zero_polygon_meshes_are_rejected() {
        let mut scene = DummySceneGraph::new();
        let mesh = scene.create_node(NodeKind::Mesh, "empty").unwrap();
        let result = scene.define(
            mesh,
            Definition::Mesh {
                npolys: 0,
                npoints: 0,
                nverts: 0,
            },
        );
        assert!(matches!(
            result,
            Err(SceneGraphError::DefinitionRejected { .. })
        ));
    }

    #[test]
    fn definition_kind_must_match_node() {
        let mut scene = DummySceneGraph::new();
        let group = scene.create_node(NodeKind::Group, "g").unwrap();
        let result = scene.define(group, Definition::Points { npoints: 3 });
        assert_eq!(
            result,
            Err(SceneGraphError::KindMismatch {
                node: group,
                expected: NodeKind::Points,
                actual: NodeKind::Group,
            })
        );
    }

    #[test]
    fn injected_failures_reject_by_name() {
        let mut scene = DummySceneGraph::new();
        scene.fail_definitions_for("bad");
        let node = scene.create_node(NodeKind::Points, "bad").unwrap();
        assert!(scene.define(node, Definition::Points { npoints: 1 }).is_err());

        scene.clear_failures();
        assert!(scene.define(node, Definition::Points { npoints: 1 }).is_ok());
    }

    #[test]
    fn strict_mode_rejects_mutation_outside_edit() {
        let mut scene = DummySceneGraph::strict();
        assert_eq!(
            scene.create_node(NodeKind::Group, "g"),
            Err(SceneGraphError::OutsideEdit { op: "create_node" })
        );
        let mut edit = ScopedEdit::new(&mut scene);
        assert!(edit.create_node(NodeKind::Group, "g").is_ok());
    }

    #[test]
    fn unbalanced_end_edit_is_ignored() {
        let mut scene = DummySceneGraph::new();
        scene.end_edit();
        assert_eq!(scene.edits_committed(), 0);
        assert!(!scene.in_edit());
    }
}
