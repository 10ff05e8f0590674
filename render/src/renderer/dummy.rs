//! Dummy renderer for testing and headless runs.
//!
//! Scenes are [`DummySceneGraph`]s and every call is recorded. By default a
//! render command completes on the calling thread: the registered progress
//! callback sees 0, 50 and 100 and the render callback sees the exit event.
//! [`DummyRenderer::manual`] turns that off so a test can drive events with
//! [`DummyRenderer::emit`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use scenebridge_core::SceneGraph;
use scenebridge_core::scene_graph::DummySceneGraph;

use super::{CallbackKind, EventCallback, Renderer, RendererError};
use crate::license::LicenseStatus;

struct DummyState {
    system_args: Vec<Vec<String>>,
    session_args: Vec<Vec<String>>,
    sessions_ended: usize,
    session_open: bool,
    fail_sessions: bool,
    rejected_definitions: Vec<String>,
    commands: Vec<String>,
    scenes: Vec<DummySceneGraph>,
    scenes_deleted: usize,
    stops: usize,
    callbacks: HashMap<CallbackKind, EventCallback>,
    unregistered: Vec<CallbackKind>,
    license: LicenseStatus,
    channels: Vec<usize>,
    fill: f32,
    buffer_updated: bool,
    auto_complete: bool,
}

/// Recording renderer. Clones share state.
#[derive(Clone)]
pub struct DummyRenderer {
    state: Arc<Mutex<DummyState>>,
}

impl DummyRenderer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DummyState {
                system_args: Vec::new(),
                session_args: Vec::new(),
                sessions_ended: 0,
                session_open: false,
                fail_sessions: false,
                rejected_definitions: Vec::new(),
                commands: Vec::new(),
                scenes: Vec::new(),
                scenes_deleted: 0,
                stops: 0,
                callbacks: HashMap::new(),
                unregistered: Vec::new(),
                license: LicenseStatus::valid("26.0"),
                channels: vec![4],
                fill: 0.5,
                buffer_updated: false,
                auto_complete: true,
            })),
        }
    }

    /// Render commands return without emitting any events.
    pub fn manual() -> Self {
        let renderer = Self::new();
        renderer.state.lock().auto_complete = false;
        renderer
    }

    pub fn set_license(&self, license: LicenseStatus) {
        self.state.lock().license = license;
    }

    /// Makes every `begin_session` fail.
    pub fn fail_sessions(&self) {
        self.state.lock().fail_sessions = true;
    }

    /// Makes `define` fail on nodes named `name` in every scene created
    /// from now on.
    pub fn reject_definitions(&self, name: &str) {
        self.state.lock().rejected_definitions.push(name.to_string());
    }

    /// Channel count per display image. The first image is the beauty pass.
    pub fn set_display_channels(&self, channels: Vec<usize>) {
        self.state.lock().channels = channels;
    }

    /// Value every pulled pixel channel holds.
    pub fn set_fill(&self, value: f32) {
        self.state.lock().fill = value;
    }

    pub fn mark_buffer_updated(&self) {
        self.state.lock().buffer_updated = true;
    }

    /// Invokes the callback registered for `kind`, if any, on this thread.
    pub fn emit(&self, kind: CallbackKind, value: i32) {
        let callback = self.state.lock().callbacks.get(&kind).cloned();
        if let Some(callback) = callback {
            log::trace!("DummyRenderer: {} event {}", kind, value);
            callback(value);
        }
    }

    pub fn system_args(&self) -> Vec<Vec<String>> {
        self.state.lock().system_args.clone()
    }

    pub fn sessions_begun(&self) -> usize {
        self.state.lock().session_args.len()
    }

    pub fn session_args(&self) -> Vec<Vec<String>> {
        self.state.lock().session_args.clone()
    }

    pub fn sessions_ended(&self) -> usize {
        self.state.lock().sessions_ended
    }

    pub fn session_open(&self) -> bool {
        self.state.lock().session_open
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Every scene created so far, oldest first. Each clone shares state
    /// with the scene the driver holds.
    pub fn scenes(&self) -> Vec<DummySceneGraph> {
        self.state.lock().scenes.clone()
    }

    pub fn last_scene(&self) -> Option<DummySceneGraph> {
        self.state.lock().scenes.last().cloned()
    }

    pub fn scenes_deleted(&self) -> usize {
        self.state.lock().scenes_deleted
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn has_callback(&self, kind: CallbackKind) -> bool {
        self.state.lock().callbacks.contains_key(&kind)
    }

    pub fn unregistered(&self) -> Vec<CallbackKind> {
        self.state.lock().unregistered.clone()
    }
}

impl Default for DummyRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for DummyRenderer {
    fn name(&self) -> &str {
        "Dummy Renderer"
    }

    fn system_begin(&self, args: &[String]) {
        log::trace!("DummyRenderer: system begin {:?}", args);
        self.state.lock().system_args.push(args.to_vec());
    }

    fn begin_session(&self, args: &[String]) -> Result<(), RendererError> {
        let mut state = self.state.lock();
        if state.fail_sessions {
            return Err(RendererError::SessionBegin("dummy session refused".into()));
        }
        log::trace!("DummyRenderer: begin session {:?}", args);
        state.session_args.push(args.to_vec());
        state.session_open = true;
        Ok(())
    }

    fn end_session(&self) {
        log::trace!("DummyRenderer: end session");
        let mut state = self.state.lock();
        state.sessions_ended += 1;
        state.session_open = false;
    }

    fn license_status(&self) -> LicenseStatus {
        self.state.lock().license.clone()
    }

    fn create_scene(&self) -> Result<Box<dyn SceneGraph>, RendererError> {
        let scene = DummySceneGraph::strict();
        log::trace!("DummyRenderer: creating scene");
        let mut state = self.state.lock();
        for name in &state.rejected_definitions {
            scene.fail_definitions_for(name);
        }
        state.scenes.push(scene.clone());
        Ok(Box::new(scene))
    }

    fn render(&self, scene: &mut dyn SceneGraph, command: &str) -> Result<(), RendererError> {
        log::trace!("DummyRenderer: render `{}` on {}", command, scene.name());
        let auto_complete = {
            let mut state = self.state.lock();
            state.commands.push(command.to_string());
            state.auto_complete
        };
        if !auto_complete || command.starts_with("rib ") {
            return Ok(());
        }
        for percent in [0, 50, 100] {
            self.mark_buffer_updated();
            self.emit(CallbackKind::Progress, percent);
        }
        self.emit(CallbackKind::Render, 0);
        Ok(())
    }

    fn stop(&self, scene: &mut dyn SceneGraph) {
        log::trace!("DummyRenderer: stop {}", scene.name());
        self.state.lock().stops += 1;
    }

    fn delete_scene(&self, scene: Box<dyn SceneGraph>) {
        log::trace!("DummyRenderer: delete {}", scene.name());
        self.state.lock().scenes_deleted += 1;
    }

    fn register_callback(&self, kind: CallbackKind, callback: EventCallback) {
        log::trace!("DummyRenderer: register {} callback", kind);
        self.state.lock().callbacks.insert(kind, callback);
    }

    fn unregister_callback(&self, kind: CallbackKind) {
        let mut state = self.state.lock();
        if state.callbacks.remove(&kind).is_some() {
            state.unregistered.push(kind);
        }
    }

    fn display_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    fn num_channels(&self, image: usize) -> usize {
        self.state.lock().channels.get(image).copied().unwrap_or(0)
    }

    fn display_name(&self, image: usize) -> String {
        match image {
            0 => "Ci".into(),
            n => format!("aov{}", n),
        }
    }

    fn pull_buffer(&self, image: usize, width: u32, height: u32) -> Option<Vec<f32>> {
        let state = self.state.lock();
        let channels = *state.channels.get(image)?;
        let len = width as usize * height as usize * channels;
        Some(vec![state.fill; len])
    }

    fn has_buffer_updated(&self) -> bool {
        self.state.lock().buffer_updated
    }

    fn reset_buffer_updated(&self) {
        self.state.lock().buffer_updated = false;
    }
}
