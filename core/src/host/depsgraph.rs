//! Evaluated dependency graph and scene settings.

use bitflags::bitflags;
use glam::Mat4;

use crate::motion::{self, RenderBorder, ShutterTiming};
use crate::params::ParamList;

use super::{HostObject, MaterialId, ObjectId};

bitflags! {
    /// What changed on an object since the previous evaluation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateTags: u8 {
        const GEOMETRY = 1 << 0;
        const TRANSFORM = 1 << 1;
        const SHADING = 1 << 2;
        const VISIBILITY = 1 << 3;
    }
}

impl Default for UpdateTags {
    fn default() -> Self {
        Self::empty()
    }
}

/// One update record reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUpdate {
    pub id: ObjectId,
    pub tags: UpdateTags,
    /// Set when a single primvar-backed property changed.
    pub property: Option<String>,
}

/// Renderer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderVariant {
    #[default]
    Ris,
    Xpu,
}

impl RenderVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ris => "prman",
            Self::Xpu => "xpu",
        }
    }
}

/// Scene-wide render settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    pub motion_blur: bool,
    pub motion_segments: u32,
    pub shutter_angle: f32,
    pub shutter_timing: ShutterTiming,
    pub fps: f32,
    pub fps_base: f32,
    pub resolution: (u32, u32),
    pub resolution_percentage: u32,
    pub border: Option<RenderBorder>,
    pub variant: RenderVariant,
    pub denoise: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            motion_blur: false,
            motion_segments: 2,
            shutter_angle: 180.0,
            shutter_timing: ShutterTiming::FrameCenter,
            fps: 24.0,
            fps_base: 1.0,
            resolution: (1920, 1080),
            resolution_percentage: 100,
            border: None,
            variant: RenderVariant::Ris,
            denoise: false,
        }
    }
}

impl SceneSettings {
    /// Motion sample times, empty when motion blur is off.
    pub fn motion_steps(&self) -> Vec<f32> {
        if !self.motion_blur {
            return Vec::new();
        }
        motion::subframes(self.motion_segments, self.shutter_angle, self.shutter_timing)
    }

    pub fn velocity_scale(&self) -> f32 {
        motion::velocity_motion_scale(self.shutter_angle, self.fps, self.fps_base)
    }

    /// Output size after the resolution percentage.
    pub fn output_size(&self) -> (u32, u32) {
        motion::scaled_resolution(self.resolution, self.resolution_percentage)
    }
}

/// A host material.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMaterial {
    pub id: MaterialId,
    pub name: String,
    pub shader: String,
    pub params: ParamList,
}

/// The active render camera.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCamera {
    pub transform: Mat4,
    /// Horizontal field of view in degrees.
    pub fov: f32,
    pub clip: (f32, f32),
    /// Normalised crop window `[xmin, xmax, ymin, ymax]`.
    pub crop_window: [f32; 4],
}

impl Default for HostCamera {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            fov: 39.6,
            clip: (0.1, 1000.0),
            crop_window: [0.0, 1.0, 0.0, 1.0],
        }
    }
}

/// The host's evaluated dependency graph.
pub trait Depsgraph {
    /// Every object in the evaluated scene, visible or not.
    fn objects(&self) -> &[HostObject];

    fn object(&self, id: ObjectId) -> Option<&HostObject> {
        self.objects().iter().find(|ob| ob.id == id)
    }

    /// Update records since the previous evaluation.
    fn updates(&self) -> &[ObjectUpdate];

    fn materials(&self) -> &[HostMaterial];

    fn material(&self, id: MaterialId) -> Option<&HostMaterial> {
        self.materials().iter().find(|mat| mat.id == id)
    }

    fn settings(&self) -> &SceneSettings;

    fn camera(&self) -> Option<&HostCamera>;

    fn frame(&self) -> i32;
}

/// In-memory dependency graph.
///
/// Mutators record update tags the way the host would, so a test or the
/// headless front end can replay edits between synchronization passes.
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    objects: Vec<HostObject>,
    updates: Vec<ObjectUpdate>,
    materials: Vec<HostMaterial>,
    settings: SceneSettings,
    camera: Option<HostCamera>,
    frame: i32,
}

impl SceneSnapshot {
    pub fn new(settings: SceneSettings) -> Self {
        Self {
            settings,
            frame: 1,
            ..Default::default()
        }
    }

    pub fn settings_mut(&mut self) -> &mut SceneSettings {
        &mut self.settings
    }

    pub fn set_camera(&mut self, camera: HostCamera) {
        self.camera = Some(camera);
    }

    pub fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    pub fn add_material(&mut self, material: HostMaterial) {
        self.materials.retain(|m| m.id != material.id);
        self.materials.push(material);
    }

    /// Adds an object, replacing any object with the same id.
    pub fn add_object(&mut self, object: HostObject) {
        let id = object.id;
        self.objects.retain(|ob| ob.id != id);
        self.objects.push(object);
        self.tag(id, UpdateTags::all());
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<HostObject> {
        let index = self.objects.iter().position(|ob| ob.id == id)?;
        Some(self.objects.remove(index))
    }

    /// Mutable access without tagging. Call [`Self::tag`] afterwards.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut HostObject> {
        self.objects.iter_mut().find(|ob| ob.id == id)
    }

    pub fn set_transform(&mut self, id: ObjectId, matrix: Mat4) -> bool {
        let Some(object) = self.object_mut(id) else {
            return false;
        };
        object.transform = vec![matrix];
        self.tag(id, UpdateTags::TRANSFORM);
        true
    }

    pub fn set_visible(&mut self, id: ObjectId, visible: bool) -> bool {
        let Some(object) = self.object_mut(id) else {
            return false;
        };
        object.visible = visible;
        self.tag(id, UpdateTags::VISIBILITY);
        true
    }

    /// Records an update, merging tags with an existing record for `id`.
    pub fn tag(&mut self, id: ObjectId, tags: UpdateTags) {
        if let Some(update) = self.updates.iter_mut().find(|u| u.id == id) {
            update.tags |= tags;
            return;
        }
        self.updates.push(ObjectUpdate {
            id,
            tags,
            property: None,
        });
    }

    /// Records a single-property change.
    pub fn tag_property(&mut self, id: ObjectId, property: &str) {
        self.updates.push(ObjectUpdate {
            id,
            tags: UpdateTags::empty(),
            property: Some(property.to_string()),
        });
    }

    /// Forgets update records once they have been synchronized.
    pub fn clear_updates(&mut self) {
        self.updates.clear();
    }
}

impl Depsgraph for SceneSnapshot {
    fn objects(&self) -> &[HostObject] {
        &self.objects
    }

    fn updates(&self) -> &[ObjectUpdate] {
        &self.updates
    }

    fn materials(&self) -> &[HostMaterial] {
        &self.materials
    }

    fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    fn camera(&self) -> Option<&HostCamera> {
        self.camera.as_ref()
    }

    fn frame(&self) -> i32 {
        self.frame
    }
}
