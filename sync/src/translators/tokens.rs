//! Renderer parameter names.

pub const P: &str = "P";
pub const N: &str = "N";
pub const WIDTH: &str = "width";
pub const INDEX: &str = "index";

pub const NVERTICES: &str = "Ri:nvertices";
pub const VERTICES: &str = "Ri:vertices";

pub const SUBDIV_TAGS: &str = "Ri:subdivtags";
pub const SUBDIV_TAG_NARGS: &str = "Ri:subdivtagnargs";
pub const SUBDIV_TAG_INT_ARGS: &str = "Ri:subdivtagintargs";
pub const SUBDIV_TAG_FLOAT_ARGS: &str = "Ri:subdivtagfloatargs";
pub const SUBDIV_TAG_STRING_TAGS: &str = "Ri:subdivtagstringtags";

pub const FACESET: &str = "shade:faceset";

pub const TYPE: &str = "Ri:type";
pub const BOUND: &str = "Ri:Bound";
pub const BLOBBYDSO_STRING_ARGS: &str = "blobbydso:stringargs";
pub const OPENVDB_IMPL: &str = "blobbydso:impl_openvdb";

pub const FILENAME: &str = "filename";
pub const DATA: &str = "data";
pub const PROCEDURAL_BOUND: &str = "bound";
pub const RUN_PROGRAM: &str = "RunProgram";

pub const COORDSYS: &str = "coordsys";
pub const LINKING_GROUPS: &str = "linkingGroups";
pub const COMBINE_SHADOWS: &str = "combineShadows";
pub const COMBINER_SHADER: &str = "PxrCombinerLightFilter";
pub const LIGHT_FILTER_PARENT: &str = "__lightFilterParent";
