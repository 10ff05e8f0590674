//! Procedurals generated by an external program at render time.

use scenebridge_core::host::{HostGeometry, HostObject, PrimitiveCategory, RunProgramData};
use scenebridge_core::scene_graph::{Definition, NodeKind};

use super::{TranslateContext, TranslateResult, Translator, UpdateOutcome, tokens, wrong_geometry};
use crate::mirror::{Prototype, PrototypeData};

/// Half extent of the bound given to run-program procedurals. The program's
/// output is unknown up front, so the bound covers the whole scene.
const PROCEDURAL_EXTENT: f32 = 100_000.0;

fn program_of(object: &HostObject) -> TranslateResult<&RunProgramData> {
    match &object.geometry {
        HostGeometry::RunProgram(program) => Ok(program),
        _ => Err(wrong_geometry(PrimitiveCategory::RunProgram, object)),
    }
}

#[derive(Debug, Default)]
pub struct RunProgramTranslator;

impl Translator for RunProgramTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::RunProgram
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        program_of(object)?;
        let node = cx.scene.create_node(NodeKind::Procedural, db_name)?;
        cx.scene.define(
            node,
            Definition::Procedural {
                kind: tokens::RUN_PROGRAM.to_string(),
            },
        )?;
        Ok(Prototype::new(
            object.data,
            PrimitiveCategory::RunProgram,
            db_name,
            node,
            PrototypeData::Procedural,
        ))
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let program = program_of(object)?;
        let mut primvars = cx.scene.primvars(prototype.node)?;
        primvars.set_string(tokens::FILENAME, program.program.as_str());
        primvars.set_string(tokens::DATA, program.args.as_str());
        primvars.set_float_array(
            tokens::PROCEDURAL_BOUND,
            [-PROCEDURAL_EXTENT, PROCEDURAL_EXTENT].repeat(3),
        );
        primvars.inherit(&object.primvars);
        cx.scene.set_primvars(prototype.node, primvars)?;
        Ok(UpdateOutcome::Defined)
    }
}
