//! Lights and light filters.
//!
//! A light filter is a shader node plus a coordinate-system group named after
//! the filter's data-block. A light owns one child group per linked filter,
//! positioned at the filter's transform and registered as a coordinate
//! system, so the filter shader can find its own space by name. When more
//! than one filter is linked, their contributions are merged by a
//! `PxrCombinerLightFilter` node that sorts the filters into
//! mult/max/min/screen reference lists.

use scenebridge_core::host::{
    CombineMode, HostGeometry, HostObject, LightData, LightFilterData, PrimitiveCategory,
};
use scenebridge_core::params::ParamList;
use scenebridge_core::scene_graph::{Definition, NodeHandle, NodeKind};

use super::{
    LinkedFilter, TranslateContext, TranslateError, TranslateResult, Translator, UpdateOutcome,
    tokens, wrong_geometry,
};
use crate::mirror::{LightFilterNodes, LightNodes, Prototype, PrototypeData};

fn light_of(object: &HostObject) -> TranslateResult<&LightData> {
    match &object.geometry {
        HostGeometry::Light(light) => Ok(light),
        _ => Err(wrong_geometry(PrimitiveCategory::Light, object)),
    }
}

fn filter_of(object: &HostObject) -> TranslateResult<&LightFilterData> {
    match &object.geometry {
        HostGeometry::LightFilter(filter) => Ok(filter),
        _ => Err(wrong_geometry(PrimitiveCategory::LightFilter, object)),
    }
}

fn bad_prototype(db_name: &str, expected: &str) -> TranslateError {
    TranslateError::InvalidData {
        object: db_name.to_string(),
        reason: format!("prototype is not a {expected}"),
    }
}

/// Filter nodes of one light update.
#[derive(Debug, Default)]
struct FilterNodes {
    coord_systems: Vec<NodeHandle>,
    combiner: Option<NodeHandle>,
    parent: Option<NodeHandle>,
}

impl FilterNodes {
    fn nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.coord_systems
            .iter()
            .copied()
            .chain(self.combiner)
            .chain(self.parent)
    }
}

#[derive(Debug, Default)]
pub struct LightTranslator;

impl LightTranslator {
    /// Deletes the filter coordinate systems and combiner of the previous
    /// update.
    fn clear_filters(
        cx: &mut TranslateContext<'_>,
        light: NodeHandle,
        nodes: &mut LightNodes,
    ) -> TranslateResult<()> {
        cx.scene.set_light_filters(light, &[])?;
        for child in cx.scene.children(light)? {
            cx.scene.remove_child(light, child)?;
            cx.scene.delete_node(child)?;
        }
        if let Some(combiner) = nodes.combiner.take() {
            cx.scene.delete_node(combiner)?;
        }
        Ok(())
    }

    /// Creates the nodes for the linked filters, detached from the light.
    /// Every node created is recorded in `built`, so a caller can delete
    /// them if this fails.
    fn build_filters(
        cx: &mut TranslateContext<'_>,
        db_name: &str,
        built: &mut FilterNodes,
    ) -> TranslateResult<()> {
        let linked = cx.linked_filters;
        for filter in linked {
            let coordsys = cx.scene.create_node(NodeKind::Group, &filter.db_name)?;
            built.coord_systems.push(coordsys);
            cx.scene.set_inherit_transform(coordsys, false)?;
            cx.scene.set_transform(coordsys, &[filter.transform], &[])?;
        }
        if linked.len() > 1 {
            let combiner = cx.scene.create_node(
                NodeKind::LightFilter,
                &format!("{db_name}-{}", tokens::COMBINER_SHADER),
            )?;
            built.combiner = Some(combiner);
            Self::combiner(cx, combiner, linked)?;
        }
        if !linked.is_empty() {
            let parent = cx.scene.create_node(NodeKind::Group, tokens::LIGHT_FILTER_PARENT)?;
            built.parent = Some(parent);
        }
        Ok(())
    }

    fn combiner(
        cx: &mut TranslateContext<'_>,
        node: NodeHandle,
        filters: &[LinkedFilter],
    ) -> TranslateResult<()> {
        cx.scene.define(
            node,
            Definition::Shader {
                name: tokens::COMBINER_SHADER.to_string(),
            },
        )?;

        let mut params = ParamList::new();
        for mode in [
            CombineMode::Mult,
            CombineMode::Max,
            CombineMode::Min,
            CombineMode::Screen,
        ] {
            let names: Vec<String> = filters
                .iter()
                .filter(|filter| filter.combine_mode == Some(mode))
                .map(|filter| filter.filter_name.clone())
                .collect();
            if !names.is_empty() {
                params.set_string_array(mode.as_str(), names);
            }
        }
        if filters.iter().any(|filter| filter.cheat_shadow) {
            params.set_integer(tokens::COMBINE_SHADOWS, 1);
        } else {
            params.remove(tokens::COMBINE_SHADOWS);
        }
        cx.scene.set_primvars(node, params)?;
        Ok(())
    }
}

impl Translator for LightTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::Light
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        let light = light_of(object)?;
        let node = cx.scene.create_node(NodeKind::Light, db_name)?;
        cx.scene.define(
            node,
            Definition::Shader {
                name: light.shader.clone(),
            },
        )?;
        Ok(Prototype::new(
            object.data,
            PrimitiveCategory::Light,
            db_name,
            node,
            PrototypeData::Light(LightNodes { combiner: None }),
        ))
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let light = light_of(object)?;
        let node = prototype.node;
        let db_name = prototype.db_name.clone();

        let PrototypeData::Light(nodes) = &mut prototype.data else {
            return Err(bad_prototype(&db_name, "light"));
        };

        let mut built = FilterNodes::default();
        if let Err(err) = Self::build_filters(cx, &db_name, &mut built) {
            for unused in built.nodes() {
                if let Err(cleanup) = cx.scene.delete_node(unused) {
                    log::warn!("Could not delete filter node of {}: {}", db_name, cleanup);
                }
            }
            return Err(err);
        }

        let mut params = light.params.clone();
        params.inherit(&object.primvars);
        cx.scene.set_primvars(node, params)?;

        Self::clear_filters(cx, node, nodes)?;
        let mut filter_nodes: Vec<NodeHandle> = cx
            .linked_filters
            .iter()
            .map(|filter| filter.filter_node)
            .collect();
        for coordsys in &built.coord_systems {
            cx.scene.add_child(node, *coordsys)?;
            cx.scene.add_coordinate_system(node, *coordsys)?;
        }
        if let Some(combiner) = built.combiner {
            nodes.combiner = Some(combiner);
            filter_nodes.push(combiner);
        }
        if let Some(parent) = built.parent {
            cx.scene.add_child(node, parent)?;
            cx.scene.add_coordinate_system(node, parent)?;
            cx.scene.set_light_filters(node, &filter_nodes)?;
        }
        Ok(UpdateOutcome::Defined)
    }
}

#[derive(Debug, Default)]
pub struct LightFilterTranslator;

impl Translator for LightFilterTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::LightFilter
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        let filter = filter_of(object)?;
        let group = cx.scene.create_node(NodeKind::Group, db_name)?;
        cx.scene.set_inherit_transform(group, false)?;

        let filter_name = format!("{db_name}-{}", filter.shader);
        let node = cx.scene.create_node(NodeKind::LightFilter, &filter_name)?;
        cx.scene.define(
            node,
            Definition::Shader {
                name: filter.shader.clone(),
            },
        )?;
        Ok(Prototype::new(
            object.data,
            PrimitiveCategory::LightFilter,
            db_name,
            group,
            PrototypeData::LightFilter(LightFilterNodes {
                filter: node,
                filter_name,
                coord_sys: db_name.to_string(),
                lights: Vec::new(),
            }),
        ))
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let filter = filter_of(object)?;
        let PrototypeData::LightFilter(nodes) = &prototype.data else {
            return Err(bad_prototype(&prototype.db_name, "light filter"));
        };

        let mut params = filter.params.clone();
        params.set_string(tokens::COORDSYS, nodes.coord_sys.as_str());
        if filter.linking_groups.is_empty() {
            params.remove(tokens::LINKING_GROUPS);
        } else {
            params.set_string(tokens::LINKING_GROUPS, filter.linking_groups.as_str());
        }
        params.inherit(&object.primvars);
        cx.scene.set_primvars(nodes.filter, params)?;
        Ok(UpdateOutcome::Defined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translators::test_support::Harness;
    use glam::{Mat4, Vec3};
    use scenebridge_core::host::{DataId, ObjectId};
    use scenebridge_core::scene_graph::SceneGraph;

    fn light_object() -> HostObject {
        let mut params = ParamList::new();
        params.set_float("intensity", 2.0);
        HostObject::new(
            ObjectId(20),
            "Key",
            DataId(20),
            "Key",
            HostGeometry::Light(LightData {
                shader: "PxrRectLight".into(),
                params,
                filters: Vec::new(),
            }),
        )
    }

    fn filter_object(id: u64, shader: &str, linking_groups: &str) -> HostObject {
        HostObject::new(
            ObjectId(id),
            format!("Filter{id}"),
            DataId(id),
            format!("Filter{id}"),
            HostGeometry::LightFilter(LightFilterData {
                shader: shader.into(),
                params: ParamList::new(),
                combine_mode: Some(CombineMode::Mult),
                linking_groups: linking_groups.into(),
            }),
        )
    }

    fn linked(h: &mut Harness, object: &HostObject, mode: CombineMode) -> LinkedFilter {
        let proto = h.export(&LightFilterTranslator, object);
        let PrototypeData::LightFilter(nodes) = &proto.data else {
            panic!("not a light filter");
        };
        LinkedFilter {
            object: object.id,
            db_name: proto.db_name.clone(),
            filter_node: nodes.filter,
            filter_name: nodes.filter_name.clone(),
            combine_mode: Some(mode),
            cheat_shadow: matches!(
                &object.geometry,
                HostGeometry::LightFilter(f) if f.is_cheat_shadow()
            ),
            transform: Mat4::from_translation(Vec3::Y),
        }
    }

    #[test]
    fn filter_export_and_linking_groups() {
        let mut h = Harness::new();
        let ob = filter_object(30, "PxrBlockerLightFilter", "rim");
        let mut proto = h.export(&LightFilterTranslator, &ob);

        let group = h.scene.node(proto.node).unwrap();
        assert_eq!(group.name, "Filter30");
        assert!(!group.inherit_transform);

        LightFilterTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();
        let filter = proto.primvar_node();
        let node = h.scene.node(filter).unwrap();
        assert_eq!(node.name, "Filter30-PxrBlockerLightFilter");
        assert_eq!(node.primvars.string(tokens::COORDSYS), Some("Filter30"));
        assert_eq!(node.primvars.string(tokens::LINKING_GROUPS), Some("rim"));

        let unlinked = filter_object(30, "PxrBlockerLightFilter", "");
        LightFilterTranslator
            .update(&mut h.cx(), &unlinked, &mut proto)
            .unwrap();
        let pv = h.scene.primvars(filter).unwrap();
        assert!(!pv.contains(tokens::LINKING_GROUPS));
    }

    #[test]
    fn light_without_filters() {
        let mut h = Harness::new();
        let ob = light_object();
        let mut proto = h.export(&LightTranslator, &ob);
        LightTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        let node = h.scene.node(proto.node).unwrap();
        assert_eq!(
            node.definition,
            Some(Definition::Shader {
                name: "PxrRectLight".into()
            })
        );
        assert_eq!(node.primvars.floats("intensity").unwrap(), &[2.0]);
        assert!(node.children.is_empty());
        assert!(node.light_filters.is_empty());
    }

    #[test]
    fn single_filter_gets_coordinate_systems() {
        let mut h = Harness::new();
        let filter = linked(&mut h, &filter_object(30, "PxrBlockerLightFilter", ""), CombineMode::Mult);
        h.filters = vec![filter.clone()];

        let ob = light_object();
        let mut proto = h.export(&LightTranslator, &ob);
        LightTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        let node = h.scene.node(proto.node).unwrap();
        assert_eq!(node.light_filters, vec![filter.filter_node]);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.coordinate_systems, node.children);

        let coordsys = h.scene.node(node.children[0]).unwrap();
        assert_eq!(coordsys.name, "Filter30");
        assert!(!coordsys.inherit_transform);
        assert_eq!(coordsys.transform, vec![filter.transform]);
        let parent = h.scene.node(node.children[1]).unwrap();
        assert_eq!(parent.name, tokens::LIGHT_FILTER_PARENT);
        assert!(h.scene.find_by_name("Key-PxrCombinerLightFilter").is_none());
    }

    #[test]
    fn several_filters_get_a_combiner() {
        let mut h = Harness::new();
        let blocker = linked(&mut h, &filter_object(30, "PxrBlockerLightFilter", ""), CombineMode::Mult);
        let shadow = linked(&mut h, &filter_object(31, "PxrCheatShadowLightFilter", ""), CombineMode::Max);
        h.filters = vec![blocker.clone(), shadow.clone()];

        let ob = light_object();
        let mut proto = h.export(&LightTranslator, &ob);
        LightTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        let combiner = h.scene.find_by_name("Key-PxrCombinerLightFilter").unwrap();
        let node = h.scene.node(proto.node).unwrap();
        assert_eq!(
            node.light_filters,
            vec![blocker.filter_node, shadow.filter_node, combiner]
        );

        let params = h.scene.primvars(combiner).unwrap();
        assert_eq!(
            params.strings("mult").unwrap(),
            &["Filter30-PxrBlockerLightFilter".to_string()]
        );
        assert_eq!(
            params.strings("max").unwrap(),
            &["Filter31-PxrCheatShadowLightFilter".to_string()]
        );
        assert!(!params.contains("min"));
        assert_eq!(params.ints(tokens::COMBINE_SHADOWS).unwrap(), &[1]);
    }

    #[test]
    fn failed_relink_keeps_the_previous_filters() {
        let mut h = Harness::new();
        let a = linked(&mut h, &filter_object(30, "PxrBlockerLightFilter", ""), CombineMode::Mult);
        let b = linked(&mut h, &filter_object(31, "PxrGoboLightFilter", ""), CombineMode::Mult);
        h.filters = vec![a, b];

        let ob = light_object();
        let mut proto = h.export(&LightTranslator, &ob);
        LightTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();
        let before = h.scene.node(proto.node).unwrap();

        h.scene.fail_definitions_for("Key-PxrCombinerLightFilter");
        let c = linked(&mut h, &filter_object(32, "PxrRampLightFilter", ""), CombineMode::Max);
        h.filters.push(c);
        let live = h.scene.live_node_count();
        assert!(LightTranslator.update(&mut h.cx(), &ob, &mut proto).is_err());

        let after = h.scene.node(proto.node).unwrap();
        assert_eq!(after.children, before.children);
        assert_eq!(after.coordinate_systems, before.coordinate_systems);
        assert_eq!(after.light_filters, before.light_filters);
        assert_eq!(h.scene.live_node_count(), live);
        let PrototypeData::Light(nodes) = &proto.data else {
            panic!("not a light");
        };
        assert_eq!(nodes.combiner, before.light_filters.last().copied());
    }

    #[test]
    fn relinking_replaces_previous_nodes() {
        let mut h = Harness::new();
        let a = linked(&mut h, &filter_object(30, "PxrBlockerLightFilter", ""), CombineMode::Mult);
        let b = linked(&mut h, &filter_object(31, "PxrGoboLightFilter", ""), CombineMode::Mult);
        h.filters = vec![a, b];

        let ob = light_object();
        let mut proto = h.export(&LightTranslator, &ob);
        LightTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();
        let old_children = h.scene.children(proto.node).unwrap();
        let old_combiner = h.scene.find_by_name("Key-PxrCombinerLightFilter").unwrap();

        h.filters.clear();
        LightTranslator.update(&mut h.cx(), &ob, &mut proto).unwrap();

        for child in old_children {
            assert_eq!(h.scene.delete_count(child), 1);
        }
        assert_eq!(h.scene.delete_count(old_combiner), 1);
        let node = h.scene.node(proto.node).unwrap();
        assert!(node.children.is_empty());
        assert!(node.light_filters.is_empty());
    }
}
