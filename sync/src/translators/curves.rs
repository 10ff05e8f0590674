//! Hair and curve strands.
//!
//! Strands are exported as cubic Catmull-Rom curves with duplicated end
//! points so each curve passes through its first and last control point.
//! Large objects are split across several curves nodes, each a child of the
//! prototype group and named `"{db_name}-{i}"`.

use glam::Vec3;
use scenebridge_core::host::{
    AttributeRate, CurveAttribute, CurvesData, HostGeometry, HostObject, PrimitiveCategory,
};
use scenebridge_core::params::{Detail, ParamList, ParamValue};
use scenebridge_core::scene_graph::{CurveBasis, CurveType, CurveWrap, Definition, NodeKind};

use super::{
    TranslateContext, TranslateError, TranslateResult, Translator, UpdateOutcome,
    copy_object_primvar, tokens, wrong_geometry,
};
use crate::mirror::{CurveSet, Prototype, PrototypeData};

/// A curves node is closed once it holds more vertices than this.
pub const MAX_SET_VERTICES: usize = 100_000;

/// Radius used when a strand has no radius data.
pub const DEFAULT_RADIUS: f32 = 0.005;

/// Strands need this many control points to form a cubic segment.
const MIN_STRAND_POINTS: usize = 4;

/// Repeats the first and last element.
fn with_doubled_ends<T: Clone>(values: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len() + 2);
    if let (Some(first), Some(last)) = (values.first(), values.last()) {
        out.push(first.clone());
        out.extend_from_slice(values);
        out.push(last.clone());
    }
    out
}

/// Same as [`with_doubled_ends`] for a typed value range.
fn value_with_doubled_ends(value: &ParamValue, start: usize, len: usize) -> Option<ParamValue> {
    if len == 0 {
        return None;
    }
    let mut out = value.slice(start, 1)?;
    out.append(&value.slice(start, len)?);
    out.append(&value.slice(start + len - 1, 1)?);
    Some(out)
}

fn renderer_name(attribute: &CurveAttribute) -> &str {
    match attribute.name.as_str() {
        "color" => "Cs",
        name => name,
    }
}

/// Primvar data for one curves node, accumulated strand by strand.
#[derive(Debug, Default)]
struct SetBuilder {
    points: Vec<Vec3>,
    nvertices: Vec<i32>,
    widths: Vec<f32>,
    index: Vec<i32>,
    attributes: Vec<(String, Detail, ParamValue)>,
    strands: Vec<(usize, usize)>,
}

impl SetBuilder {
    fn nverts(&self) -> usize {
        self.points.len()
    }

    fn push_attribute(&mut self, name: &str, detail: Detail, value: ParamValue) {
        match self.attributes.iter_mut().find(|(n, _, _)| n == name) {
            Some((_, _, existing)) => {
                if !existing.append(&value) {
                    log::warn!("Curve attribute {} changes type between strands", name);
                }
            }
            None => self.attributes.push((name.to_string(), detail, value)),
        }
    }

    fn push_strand(&mut self, curves: &CurvesData, strand_index: usize, first_point: usize) {
        let strand = &curves.strands[strand_index];
        let npoints = strand.points.len();

        let has_radii = strand.radii.len() == npoints && strand.radii.iter().any(|r| *r != 0.0);
        let radii = if has_radii {
            strand.radii.clone()
        } else {
            vec![DEFAULT_RADIUS; npoints]
        };
        let points = with_doubled_ends(&strand.points);
        self.nvertices.push(points.len() as i32);
        self.points.extend(points);
        self.widths
            .extend(with_doubled_ends(&radii).into_iter().map(|r| r * 2.0));
        self.index.push(strand_index as i32);
        self.strands.push((first_point, npoints));

        for attribute in &curves.attributes {
            let name = renderer_name(attribute);
            let value = match attribute.rate {
                AttributeRate::PerCurve => attribute
                    .value
                    .slice(strand_index, 1)
                    .map(|v| (Detail::Uniform, v)),
                AttributeRate::PerVertex => {
                    value_with_doubled_ends(&attribute.value, first_point, npoints)
                        .map(|v| (Detail::Vertex, v))
                }
            };
            match value {
                Some((detail, value)) => self.push_attribute(name, detail, value),
                None => log::warn!(
                    "Curve attribute {} is too short for strand {}",
                    attribute.name,
                    strand_index
                ),
            }
        }
    }
}

/// Splits the strands into curve sets. Returns nothing when any strand is
/// too short to be a cubic curve.
fn build_sets(curves: &CurvesData) -> Vec<SetBuilder> {
    if let Some(short) = curves
        .strands
        .iter()
        .position(|s| s.points.len() < MIN_STRAND_POINTS)
    {
        log::error!(
            "Curve strand {} has fewer than {} control points; skipping curves",
            short,
            MIN_STRAND_POINTS
        );
        return Vec::new();
    }

    let mut sets = Vec::new();
    let mut current = SetBuilder::default();
    for (strand_index, first_point) in curves.first_point_indices().into_iter().enumerate() {
        current.push_strand(curves, strand_index, first_point);
        if current.nverts() > MAX_SET_VERTICES {
            sets.push(std::mem::take(&mut current));
        }
    }
    if current.nverts() > 0 {
        sets.push(current);
    }
    sets
}

fn curves_of(object: &HostObject) -> TranslateResult<&CurvesData> {
    match &object.geometry {
        HostGeometry::Curves(curves) => Ok(curves),
        _ => Err(wrong_geometry(PrimitiveCategory::Curves, object)),
    }
}

fn sets_of(prototype: &mut Prototype) -> TranslateResult<&mut Vec<CurveSet>> {
    match &mut prototype.data {
        PrototypeData::Curves(sets) => Ok(sets),
        _ => Err(TranslateError::InvalidData {
            object: prototype.db_name.clone(),
            reason: "prototype is not a curves object".to_string(),
        }),
    }
}

#[derive(Debug, Default)]
pub struct CurvesTranslator;

impl CurvesTranslator {
    fn clear_sets(cx: &mut TranslateContext<'_>, prototype: &mut Prototype) -> TranslateResult<()> {
        let group = prototype.node;
        for set in sets_of(prototype)?.drain(..) {
            cx.scene.remove_child(group, set.node)?;
            cx.scene.delete_node(set.node)?;
        }
        Ok(())
    }

    /// Defines one detached curves node per builder. Every node created is
    /// pushed to `sets`, so a caller can delete them if this fails.
    fn define_sets(
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
        times: &[f32],
        builders: Vec<SetBuilder>,
        sets: &mut Vec<CurveSet>,
    ) -> TranslateResult<()> {
        for (i, builder) in builders.into_iter().enumerate() {
            let definition = Definition::Curves {
                curve_type: CurveType::Cubic,
                wrap: CurveWrap::NonPeriodic,
                basis: CurveBasis::CatmullRom,
                ncurves: builder.nvertices.len(),
                nverts: builder.nverts(),
            };
            let node = cx
                .scene
                .create_node(NodeKind::Curves, &format!("{db_name}-{i}"))?;
            sets.push(CurveSet {
                node,
                strands: builder.strands,
            });
            cx.scene.define(node, definition)?;

            let mut primvars = ParamList::new();
            primvars.set_times(times);
            primvars.set_point_detail(tokens::P, builder.points, Detail::Vertex);
            primvars.set_integer_detail(tokens::NVERTICES, builder.nvertices, Detail::Uniform);
            primvars.set_integer_detail(tokens::INDEX, builder.index, Detail::Uniform);
            primvars.set_float_detail(tokens::WIDTH, builder.widths, Detail::Vertex);
            for (name, detail, value) in builder.attributes {
                primvars.set_value_detail(&name, value, detail);
            }
            primvars.inherit(&object.primvars);
            cx.scene.set_primvars(node, primvars)?;
        }
        Ok(())
    }
}

impl Translator for CurvesTranslator {
    fn category(&self) -> PrimitiveCategory {
        PrimitiveCategory::Curves
    }

    fn export(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        db_name: &str,
    ) -> TranslateResult<Prototype> {
        curves_of(object)?;
        let group = cx.scene.create_node(NodeKind::Group, db_name)?;
        Ok(Prototype::new(
            object.data,
            PrimitiveCategory::Curves,
            db_name,
            group,
            PrototypeData::Curves(Vec::new()),
        ))
    }

    fn update(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
    ) -> TranslateResult<UpdateOutcome> {
        let curves = curves_of(object)?;
        let builders = build_sets(curves);
        if builders.is_empty() {
            Self::clear_sets(cx, prototype)?;
            prototype.disable_motion();
            return Ok(UpdateOutcome::Empty);
        }

        let times = if prototype.wants_deform_samples() {
            prototype.motion_steps.clone()
        } else {
            Vec::new()
        };
        let group = prototype.node;
        let db_name = prototype.db_name.clone();
        let mut sets = Vec::with_capacity(builders.len());
        if let Err(err) = Self::define_sets(cx, object, &db_name, &times, builders, &mut sets) {
            for set in &sets {
                if let Err(cleanup) = cx.scene.delete_node(set.node) {
                    log::warn!("Could not delete curves node of {}: {}", db_name, cleanup);
                }
            }
            return Err(err);
        }

        Self::clear_sets(cx, prototype)?;
        for set in &sets {
            cx.scene.add_child(group, set.node)?;
        }
        log::debug!("Curves {} exported as {} set(s)", db_name, sets.len());
        *sets_of(prototype)? = sets;
        Ok(UpdateOutcome::Defined)
    }

    fn export_deform_sample(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
        sample: u32,
    ) -> TranslateResult<()> {
        let curves = curves_of(object)?;
        let total: usize = curves.strands.iter().map(|s| s.points.len()).sum();
        let positions = curves
            .deform_samples
            .get(sample as usize)
            .filter(|points| points.len() == total);

        let Some(positions) = positions else {
            log::debug!(
                "Point count of {} changed within the shutter; disabling motion blur",
                prototype.db_name
            );
            prototype.disable_motion();
            for set in sets_of(prototype)?.iter() {
                let mut primvars = cx.scene.primvars(set.node)?;
                primvars.set_times(&[]);
                cx.scene.set_primvars(set.node, primvars)?;
            }
            return Ok(());
        };

        for set in sets_of(prototype)?.iter() {
            let mut points = Vec::new();
            for (first, count) in &set.strands {
                points.extend(with_doubled_ends(&positions[*first..*first + *count]));
            }
            let mut primvars = cx.scene.primvars(set.node)?;
            primvars.set_point_detail_at(tokens::P, points, Detail::Vertex, sample);
            cx.scene.set_primvars(set.node, primvars)?;
        }
        Ok(())
    }

    /// Object primvars live on every curves node.
    fn update_primvar(
        &self,
        cx: &mut TranslateContext<'_>,
        object: &HostObject,
        prototype: &mut Prototype,
        name: &str,
    ) -> TranslateResult<()> {
        for set in sets_of(prototype)?.iter() {
            let mut primvars = cx.scene.primvars(set.node)?;
            copy_object_primvar(object, &mut primvars, name);
            cx.scene.set_primvars(set.node, primvars)?;
        }
        Ok(())
    }
}
