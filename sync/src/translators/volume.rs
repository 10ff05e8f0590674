//! Volumes: plain box volumes and OpenVDB files.
//!
//! OpenVDB volumes are handed to the renderer's `impl_openvdb` blobby DSO.
//! Its string arguments are the file, the density grid as
//! `"{grid}:fogvolume"`, an unused velocity grid slot and a JSON object of
//! shading controls. Every other grid in the file is declared as an empty
//! primvar so shaders can look it up by name.

use scenebridge_core::host::{GridType, HostGeometry, HostObject, OpenVdbData, PrimitiveCategory};
use scenebridge_core::params::{Detail, ParamList};
use scenebridge_core::scene_graph::{Definition, NodeKind};

use super::{TranslateContext, TranslateResult, Translator, UpdateOutcome, tokens, wrong_geometry};
use crate::mirror::{Prototype, PrototypeData};

const BOX: &str = "box";

fn define_empty_volume(cx: &mut TranslateContext<'_>, prototype: &Prototype) -> TranslateResult<()> {
    cx.scene
        .define(prototype.node, Definition::Volume { dims: [0, 0, 0] })?;
    Ok(())
}

fn export_volume(
    cx: &mut TranslateContext<'_>,
    object: &HostObject,
    db_name: &str,
    category: PrimitiveCategory,
) -> TranslateResult<Prototype> {
    let node = cx.scene.create_node(NodeKind::Volume, db_name)?;
    Ok(Prototype::new(
        object.data,
        category,
        db_name,
        node,
        PrototypeData::Volume,
    ))
}

/// A box volume bounded by the object's bounding box.
#[derive(Debug, Default)]
pub struct RiVolumeTranslator;

impl Translator for RiVolumeTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::RiVolume
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        if !matches!(object.geometry, HostGeometry::RiVolume) {
            return Err(wrong_geometry(PrimitiveCategory::RiVolume, object));
        }
        export_volume(cx, object, db_name, PrimitiveCategory::RiVolume)
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        define_empty_volume(cx, prototype)?;
        let mut primvars = cx.scene.primvars(prototype.node)?;
        primvars.set_string(tokens::TYPE, BOX);
        primvars.set_float_array(tokens::BOUND, object.bounds.to_array().to_vec());
        primvars.inherit(&object.primvars);
        cx.scene.set_primvars(prototype.node, primvars)?;
        Ok(UpdateOutcome::Defined)
    }
}

fn vdb_of(object: &HostObject) -> TranslateResult<&OpenVdbData> {
    match &object.geometry {
        HostGeometry::OpenVdb(vdb) => Ok(vdb),
        _ => Err(wrong_geometry(PrimitiveCategory::OpenVdb, object)),
    }
}

/// Shading controls passed to the OpenVDB DSO as a JSON string.
fn dso_controls(vdb: &OpenVdbData) -> String {
    serde_json::json!({
        "FilterWidth": vdb.filter_width,
        "VelocityScale": vdb.velocity_scale,
        "densitymult": vdb.density_mult,
        "densityrolloff": vdb.density_rolloff,
    })
    .to_string()
}

fn declare_grid(primvars: &mut ParamList, name: &str, grid_type: GridType) {
    match grid_type {
        GridType::Float | GridType::Double => {
            primvars.set_float_detail(name, Vec::new(), Detail::Varying)
        }
        GridType::VectorFloat | GridType::VectorDouble | GridType::VectorInt => {
            primvars.set_vector_detail(name, Vec::new(), Detail::Varying)
        }
        GridType::Int | GridType::Int64 | GridType::Boolean => {
            primvars.set_integer_detail(name, Vec::new(), Detail::Varying)
        }
        GridType::String => primvars.set_string_detail(name, Vec::new(), Detail::Uniform),
        GridType::Mask => {}
    }
}

#[derive(Debug, Default)]
pub struct OpenVdbTranslator;

impl Translator for OpenVdbTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::OpenVdb
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        vdb_of(object)?;
        let prototype = export_volume(cx, object, db_name, PrimitiveCategory::OpenVdb)?;
        define_empty_volume(cx, &prototype)?;
        Ok(prototype)
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let vdb = vdb_of(object)?;
        let mut primvars = ParamList::new();
        primvars.set_float_array(tokens::BOUND, object.bounds.to_array().to_vec());

        let active = vdb.grids.get(vdb.active_grid);
        match active {
            _ if vdb.filepath.is_empty() => primvars.set_string(tokens::TYPE, BOX),
            Some(active) if vdb.grids_loaded => {
                primvars.set_string(tokens::TYPE, tokens::OPENVDB_IMPL);
                primvars.set_string_array(
                    tokens::BLOBBYDSO_STRING_ARGS,
                    vec![
                        vdb.resolved_path().to_string(),
                        format!("{}:fogvolume", active.name),
                        String::new(),
                        dso_controls(vdb),
                    ],
                );
                for grid in &vdb.grids {
                    declare_grid(&mut primvars, &grid.name, grid.grid_type);
                }
            }
            _ => {
                log::error!(
                    "Could not load grids and metadata for volume: {}",
                    object.name
                );
                primvars.set_string(tokens::TYPE, BOX);
            }
        }

        cx.scene.set_primvars(prototype.node, primvars)?;
        Ok(UpdateOutcome::Defined)
    }
}
