//! Typed parameter tables.
//!
//! [`ParamList`] is the currency between translators and the retained scene
//! graph: primitive variables on geometry, shader parameters on lights and
//! filters, and attribute sets all use it. Each entry is keyed by name and
//! motion time sample, carries a typed value and an optional [`Detail`] tag.
//!
//! Entries live in a `BTreeMap`, so two lists built from the same data
//! compare equal regardless of insertion order.

use std::collections::BTreeMap;
use std::fmt;

use glam::{Mat4, Vec3};

/// Sampling rate of a primitive variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Detail {
    /// One value for the whole primitive.
    Constant,
    /// One value per face (or per curve).
    Uniform,
    /// Interpolated linearly across faces.
    Varying,
    /// One value per point.
    Vertex,
    /// One value per face-vertex.
    FaceVarying,
}

impl Detail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Uniform => "uniform",
            Self::Varying => "varying",
            Self::Vertex => "vertex",
            Self::FaceVarying => "facevarying",
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed parameter value. Scalars are stored as one-element arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(Vec<i32>),
    Float(Vec<f32>),
    /// Fixed-size float tuples, e.g. `st` with arity 2.
    FloatTuple { values: Vec<f32>, arity: usize },
    Point(Vec<Vec3>),
    Vector(Vec<Vec3>),
    Normal(Vec<Vec3>),
    Color(Vec<Vec3>),
    String(Vec<String>),
    Matrix(Vec<Mat4>),
}

impl ParamValue {
    /// Number of elements (tuples count as one element each).
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::FloatTuple { values, arity } => values.len() / (*arity).max(1),
            Self::Point(v) | Self::Vector(v) | Self::Normal(v) | Self::Color(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Matrix(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements `start..start + len`, or `None` when out of range.
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        if start + len > self.len() {
            return None;
        }
        let range = start..start + len;
        Some(match self {
            Self::Int(v) => Self::Int(v[range].to_vec()),
            Self::Float(v) => Self::Float(v[range].to_vec()),
            Self::FloatTuple { values, arity } => Self::FloatTuple {
                values: values[start * arity..(start + len) * arity].to_vec(),
                arity: *arity,
            },
            Self::Point(v) => Self::Point(v[range].to_vec()),
            Self::Vector(v) => Self::Vector(v[range].to_vec()),
            Self::Normal(v) => Self::Normal(v[range].to_vec()),
            Self::Color(v) => Self::Color(v[range].to_vec()),
            Self::String(v) => Self::String(v[range].to_vec()),
            Self::Matrix(v) => Self::Matrix(v[range].to_vec()),
        })
    }

    /// Appends the elements of `other`. Returns `false` and leaves `self`
    /// untouched when the two values have different types.
    pub fn append(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.extend_from_slice(b),
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
            (
                Self::FloatTuple { values: a, arity },
                Self::FloatTuple {
                    values: b,
                    arity: other_arity,
                },
            ) if *arity == *other_arity => a.extend_from_slice(b),
            (Self::Point(a), Self::Point(b))
            | (Self::Vector(a), Self::Vector(b))
            | (Self::Normal(a), Self::Normal(b))
            | (Self::Color(a), Self::Color(b)) => a.extend_from_slice(b),
            (Self::String(a), Self::String(b)) => a.extend_from_slice(b),
            (Self::Matrix(a), Self::Matrix(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::FloatTuple { .. } => "float[]",
            Self::Point(_) => "point",
            Self::Vector(_) => "vector",
            Self::Normal(_) => "normal",
            Self::Color(_) => "color",
            Self::String(_) => "string",
            Self::Matrix(_) => "matrix",
        }
    }
}

/// One parameter entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: ParamValue,
    /// `None` for plain (non-primvar) arrays such as shader parameters.
    pub detail: Option<Detail>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ParamKey {
    name: String,
    sample: u32,
}

/// An ordered, typed parameter table with optional motion samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    times: Vec<f32>,
    entries: BTreeMap<ParamKey, Param>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, sample: u32, value: ParamValue, detail: Option<Detail>) {
        self.entries.insert(
            ParamKey {
                name: name.to_string(),
                sample,
            },
            Param { value, detail },
        );
    }

    // ------------------------------------------------------------------
    // Detail setters
    // ------------------------------------------------------------------

    pub fn set_point_detail(&mut self, name: &str, values: Vec<Vec3>, detail: Detail) {
        self.insert(name, 0, ParamValue::Point(values), Some(detail));
    }

    /// Sets one motion sample of a point primvar.
    pub fn set_point_detail_at(
        &mut self,
        name: &str,
        values: Vec<Vec3>,
        detail: Detail,
        sample: u32,
    ) {
        self.insert(name, sample, ParamValue::Point(values), Some(detail));
    }

    pub fn set_vector_detail(&mut self, name: &str, values: Vec<Vec3>, detail: Detail) {
        self.insert(name, 0, ParamValue::Vector(values), Some(detail));
    }

    pub fn set_normal_detail(&mut self, name: &str, values: Vec<Vec3>, detail: Detail) {
        self.insert(name, 0, ParamValue::Normal(values), Some(detail));
    }

    pub fn set_color_detail(&mut self, name: &str, values: Vec<Vec3>, detail: Detail) {
        self.insert(name, 0, ParamValue::Color(values), Some(detail));
    }

    pub fn set_float_detail(&mut self, name: &str, values: Vec<f32>, detail: Detail) {
        self.insert(name, 0, ParamValue::Float(values), Some(detail));
    }

    pub fn set_float_array_detail(
        &mut self,
        name: &str,
        values: Vec<f32>,
        arity: usize,
        detail: Detail,
    ) {
        self.insert(
            name,
            0,
            ParamValue::FloatTuple { values, arity },
            Some(detail),
        );
    }

    pub fn set_integer_detail(&mut self, name: &str, values: Vec<i32>, detail: Detail) {
        self.insert(name, 0, ParamValue::Int(values), Some(detail));
    }

    pub fn set_string_detail(&mut self, name: &str, values: Vec<String>, detail: Detail) {
        self.insert(name, 0, ParamValue::String(values), Some(detail));
    }

    /// Sets an already-typed value with a detail tag.
    pub fn set_value_detail(&mut self, name: &str, value: ParamValue, detail: Detail) {
        self.insert(name, 0, value, Some(detail));
    }

    // ------------------------------------------------------------------
    // Plain setters
    // ------------------------------------------------------------------

    pub fn set_integer(&mut self, name: &str, value: i32) {
        self.insert(name, 0, ParamValue::Int(vec![value]), None);
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.insert(name, 0, ParamValue::Float(vec![value]), None);
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        self.insert(name, 0, ParamValue::String(vec![value.into()]), None);
    }

    pub fn set_integer_array(&mut self, name: &str, values: Vec<i32>) {
        self.insert(name, 0, ParamValue::Int(values), None);
    }

    pub fn set_float_array(&mut self, name: &str, values: Vec<f32>) {
        self.insert(name, 0, ParamValue::Float(values), None);
    }

    pub fn set_string_array(&mut self, name: &str, values: Vec<String>) {
        self.insert(name, 0, ParamValue::String(values), None);
    }

    pub fn set_matrix(&mut self, name: &str, value: Mat4) {
        self.insert(name, 0, ParamValue::Matrix(vec![value]), None);
    }

    /// Stores an existing entry unchanged under `name`.
    pub fn set_param(&mut self, name: &str, param: Param) {
        self.entries.insert(
            ParamKey {
                name: name.to_string(),
                sample: 0,
            },
            param,
        );
    }

    // ------------------------------------------------------------------
    // Motion samples
    // ------------------------------------------------------------------

    /// Sets the motion sample times.
    ///
    /// An empty slice makes the list static: every entry at a sample other
    /// than 0 is dropped.
    pub fn set_times(&mut self, times: &[f32]) {
        self.times = times.to_vec();
        if times.is_empty() {
            self.entries.retain(|key, _| key.sample == 0);
        }
    }

    #[inline]
    pub fn times(&self) -> &[f32] {
        &self.times
    }

    /// Number of samples stored under `name`.
    pub fn sample_count(&self, name: &str) -> usize {
        self.entries.keys().filter(|key| key.name == name).count()
    }

    // ------------------------------------------------------------------
    // Bulk operations
    // ------------------------------------------------------------------

    /// Copies every entry of `parent` that this list does not define.
    pub fn inherit(&mut self, parent: &ParamList) {
        for (key, param) in &parent.entries {
            self.entries
                .entry(key.clone())
                .or_insert_with(|| param.clone());
        }
        if self.times.is_empty() {
            self.times = parent.times.clone();
        }
    }

    /// Removes every sample stored under `name`. Returns whether anything was
    /// removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.name != name);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.entries.clear();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Returns sample 0 of `name`.
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.get_sample(name, 0)
    }

    pub fn get_sample(&self, name: &str, sample: u32) -> Option<&Param> {
        self.entries.get(&ParamKey {
            name: name.to_string(),
            sample,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.keys().any(|key| key.name == name)
    }

    /// Distinct parameter names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut last: Option<&str> = None;
        self.entries.keys().filter_map(move |key| {
            if last == Some(key.name.as_str()) {
                None
            } else {
                last = Some(key.name.as_str());
                last
            }
        })
    }

    /// Number of stored entries, counting every motion sample.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ints(&self, name: &str) -> Option<&[i32]> {
        match &self.get(name)?.value {
            ParamValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn floats(&self, name: &str) -> Option<&[f32]> {
        match &self.get(name)?.value {
            ParamValue::Float(v) => Some(v),
            ParamValue::FloatTuple { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn strings(&self, name: &str) -> Option<&[String]> {
        match &self.get(name)?.value {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// First string value of `name`.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings(name)?.first().map(String::as_str)
    }

    /// Point, vector, normal or color data at a given sample.
    pub fn vec3s_at(&self, name: &str, sample: u32) -> Option<&[Vec3]> {
        match &self.get_sample(name, sample)?.value {
            ParamValue::Point(v) | ParamValue::Vector(v) | ParamValue::Normal(v) => Some(v),
            ParamValue::Color(v) => Some(v),
            _ => None,
        }
    }

    pub fn vec3s(&self, name: &str) -> Option<&[Vec3]> {
        self.vec3s_at(name, 0)
    }

    pub fn detail(&self, name: &str) -> Option<Detail> {
        self.get(name)?.detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> Vec<Vec3> {
        vec![Vec3::ZERO, Vec3::X, Vec3::Y]
    }

    #[test]
    fn setters_store_typed_values() {
        let mut params = ParamList::new();
        params.set_point_detail("P", tri(), Detail::Vertex);
        params.set_integer_detail("nvertices", vec![3], Detail::Uniform);
        params.set_string("type", "box");
        params.set_float_array("Bound", vec![-1.0, 1.0, -1.0, 1.0, -1.0, 1.0]);

        assert_eq!(params.vec3s("P").unwrap().len(), 3);
        assert_eq!(params.detail("P"), Some(Detail::Vertex));
        assert_eq!(params.ints("nvertices"), Some(&[3][..]));
        assert_eq!(params.string("type"), Some("box"));
        assert_eq!(params.floats("Bound").unwrap().len(), 6);
        assert_eq!(params.detail("Bound"), None);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = ParamList::new();
        a.set_float("x", 1.0);
        a.set_string("y", "z");

        let mut b = ParamList::new();
        b.set_string("y", "z");
        b.set_float("x", 1.0);

        assert_eq!(a, b);
    }

    #[test]
    fn empty_times_drop_motion_samples() {
        let mut params = ParamList::new();
        params.set_times(&[0.0, 0.5]);
        params.set_point_detail_at("P", tri(), Detail::Vertex, 0);
        params.set_point_detail_at("P", tri(), Detail::Vertex, 1);
        assert_eq!(params.sample_count("P"), 2);

        params.set_times(&[]);

        assert!(params.times().is_empty());
        assert_eq!(params.sample_count("P"), 1);
        assert!(params.get_sample("P", 1).is_none());
        assert_eq!(params.vec3s_at("P", 0).unwrap(), &tri()[..]);
    }

    #[test]
    fn inherit_keeps_local_entries() {
        let mut parent = ParamList::new();
        parent.set_point_detail("P", tri(), Detail::Vertex);
        parent.set_integer_array("shade:faceset", vec![0, 1]);

        let mut child = ParamList::new();
        child.set_integer_array("shade:faceset", vec![2]);
        child.inherit(&parent);

        assert_eq!(child.ints("shade:faceset"), Some(&[2][..]));
        assert!(child.contains("P"));
    }

    #[test]
    fn remove_drops_all_samples() {
        let mut params = ParamList::new();
        params.set_point_detail_at("P", tri(), Detail::Vertex, 0);
        params.set_point_detail_at("P", tri(), Detail::Vertex, 1);
        params.set_float("width", 0.1);

        assert!(params.remove("P"));
        assert!(!params.remove("P"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn names_are_distinct() {
        let mut params = ParamList::new();
        params.set_point_detail_at("P", tri(), Detail::Vertex, 0);
        params.set_point_detail_at("P", tri(), Detail::Vertex, 1);
        params.set_float("a", 1.0);
        let names: Vec<_> = params.names().collect();
        assert_eq!(names, vec!["P", "a"]);
    }

    #[test]
    fn slice_and_append_work_in_elements() {
        let value = ParamValue::FloatTuple {
            values: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            arity: 2,
        };
        let mut head = value.slice(0, 1).unwrap();
        assert_eq!(
            head,
            ParamValue::FloatTuple {
                values: vec![0.0, 1.0],
                arity: 2
            }
        );
        assert!(head.append(&value.slice(2, 1).unwrap()));
        assert_eq!(head.len(), 2);
        assert!(value.slice(2, 2).is_none());
        assert!(!head.append(&ParamValue::Int(vec![1])));
    }

    #[test]
    fn float_tuple_len_counts_tuples() {
        let value = ParamValue::FloatTuple {
            values: vec![0.0; 8],
            arity: 2,
        };
        assert_eq!(value.len(), 4);
        assert_eq!(value.type_name(), "float[]");
    }
}
