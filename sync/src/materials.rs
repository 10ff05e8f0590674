//! Host materials mirrored as material nodes.

use std::collections::HashMap;

use scenebridge_core::host::{HostMaterial, MaterialId};
use scenebridge_core::scene_graph::{Definition, NodeHandle, NodeKind, SceneGraph, SceneGraphResult};

#[derive(Debug, Default)]
pub struct MaterialTable {
    nodes: HashMap<MaterialId, NodeHandle>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<NodeHandle> {
        self.nodes.get(&id).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates nodes for new materials, refreshes parameters on existing ones
    /// and deletes nodes of materials the host no longer has.
    pub fn sync(
        &mut self,
        scene: &mut dyn SceneGraph,
        materials: &[HostMaterial],
    ) -> SceneGraphResult<()> {
        for material in materials {
            let node = match self.nodes.get(&material.id) {
                Some(node) => *node,
                None => {
                    let node = scene.create_node(NodeKind::Material, &material.name)?;
                    scene.define(
                        node,
                        Definition::Shader {
                            name: material.shader.clone(),
                        },
                    )?;
                    self.nodes.insert(material.id, node);
                    node
                }
            };
            scene.set_primvars(node, material.params.clone())?;
        }

        let stale: Vec<_> = self
            .nodes
            .keys()
            .filter(|id| !materials.iter().any(|m| m.id == **id))
            .copied()
            .collect();
        for id in stale {
            if let Some(node) = self.nodes.remove(&id) {
                scene.delete_node(node)?;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenebridge_core::params::ParamList;
    use scenebridge_core::scene_graph::DummySceneGraph;

    fn material(id: u64) -> HostMaterial {
        HostMaterial {
            id: MaterialId(id),
            name: format!("mat{id}"),
            shader: "PxrSurface".into(),
            params: ParamList::new(),
        }
    }

    #[test]
    fn sync_creates_and_deletes() {
        let mut scene = DummySceneGraph::new();
        let mut table = MaterialTable::new();

        table.sync(&mut scene, &[material(1), material(2)]).unwrap();
        assert_eq!(table.len(), 2);
        let first = table.get(MaterialId(1)).unwrap();
        let second = table.get(MaterialId(2)).unwrap();

        table.sync(&mut scene, &[material(1)]).unwrap();
        assert_eq!(table.get(MaterialId(1)), Some(first));
        assert_eq!(table.get(MaterialId(2)), None);
        assert_eq!(scene.delete_count(second), 1);
        assert_eq!(scene.define_count(first), 1);
    }
}
