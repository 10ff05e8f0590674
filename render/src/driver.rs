//! Render driver: the lifecycle of every kind of render.
//!
//! # Architecture
//!
//! A render cycle acquires a renderer session, checks the license, creates
//! (or reuses) the retained scene, exports it through the
//! [`SceneSynchronizer`], issues the render command and then pulls pixels on
//! the calling thread until the render finishes or the host cancels.
//!
//! Alongside the calling thread:
//!
//! - a stats thread polls telemetry every [`StatsConfig::poll_interval`],
//! - an export stats thread reports export progress while exporting,
//! - a draw thread (interactive viewport renders) asks for redraws when the
//!   display buffer changes,
//! - renderer callbacks fire on renderer threads.
//!
//! None of them call the host. They update the [`RenderContext`], the stats
//! counters or push onto the [`EventQueue`], and the thread that owns the
//! host drains it with [`RenderDriver::process_events`].
//!
//! [`StatsConfig::poll_interval`]: crate::config::StatsConfig::poll_interval

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use scenebridge_core::host::{Depsgraph, RenderVariant, SceneSnapshot};
use scenebridge_core::motion::{RenderRegion, render_region};
use scenebridge_core::{RenderContext, RenderMode, RenderState, SceneGraph};
use scenebridge_sync::{ChangeSet, SceneSynchronizer, SyncError};

use crate::config::{DriverConfig, RenderInto};
use crate::denoise::{Denoiser, NullDenoiser};
use crate::display::{PixelBuffer, pass_channels, pull_image};
use crate::events::{EventQueue, RenderEvent};
use crate::host::{HostEngine, ResultPass};
use crate::license::{LicenseError, check_license};
use crate::renderer::{CallbackKind, EventCallback, Renderer, RendererError};
use crate::stats::{StatsClient, StatsManager};

/// Errors that abort a render. The `Display` text is what the user sees.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    License(#[from] LicenseError),
    #[error("Could not connect to the stats server. Aborting...")]
    StatsConnection,
    #[error("Export failed: {0}")]
    Export(#[from] SyncError),
    #[error(transparent)]
    Renderer(#[from] RendererError),
    #[error("no renderer scene is open")]
    NoScene,
}

/// Host frame control for multi-frame exports.
pub trait Timeline {
    fn set_frame(&mut self, frame: i32);

    /// The dependency graph evaluated at the current frame.
    fn depsgraph(&self) -> &dyn Depsgraph;
}

impl Timeline for SceneSnapshot {
    fn set_frame(&mut self, frame: i32) {
        SceneSnapshot::set_frame(self, frame);
    }

    fn depsgraph(&self) -> &dyn Depsgraph {
        self
    }
}

/// The host render handle, released under a bounded lock.
struct EngineSlot {
    engine: Mutex<Option<Arc<dyn HostEngine>>>,
}

impl EngineSlot {
    fn get(&self) -> Option<Arc<dyn HostEngine>> {
        self.engine.lock().clone()
    }

    fn set(&self, engine: Arc<dyn HostEngine>) {
        *self.engine.lock() = Some(engine);
    }

    /// Drops the engine. Gives up when the slot stays contended for
    /// `timeout`.
    fn release(&self, timeout: Duration) -> bool {
        match self.engine.try_lock_for(timeout) {
            Some(mut engine) => {
                *engine = None;
                true
            }
            None => {
                log::debug!("Engine lock contended, not releasing the engine");
                false
            }
        }
    }
}

/// Renderer scene plus the mirror that tracks it.
struct Session {
    scene: Option<Box<dyn SceneGraph>>,
    sync: SceneSynchronizer,
}

impl Session {
    fn ensure_scene(&mut self, renderer: &dyn Renderer) -> Result<(), RendererError> {
        if self.scene.is_none() {
            self.scene = Some(renderer.create_scene()?);
        }
        Ok(())
    }

    /// Full export, or an incremental update of a kept scene.
    fn export(&mut self, depsgraph: &dyn Depsgraph, incremental: bool) -> Result<(), RenderError> {
        let Some(scene) = self.scene.as_deref_mut() else {
            return Err(RenderError::NoScene);
        };
        if incremental {
            let changes = self.sync.batch_update_scene(scene, depsgraph);
            log::debug!("Updated kept scene with {} change(s)", changes.len());
            return Ok(());
        }
        self.sync.export_full(scene, depsgraph)?;
        Ok(())
    }

    fn render(&mut self, renderer: &dyn Renderer, command: &str) -> Result<(), RenderError> {
        let Some(scene) = self.scene.as_deref_mut() else {
            return Err(RenderError::NoScene);
        };
        log::info!("Render started: {}", command);
        renderer.render(scene, command)?;
        Ok(())
    }

    fn delete_scene(&mut self, renderer: &dyn Renderer) {
        if let Some(mut scene) = self.scene.take() {
            renderer.stop(scene.as_mut());
            renderer.delete_scene(scene);
        }
        self.sync.reset();
    }
}

fn join_thread(slot: &Mutex<Option<JoinHandle<()>>>, name: &str) {
    if let Some(handle) = slot.lock().take()
        && handle.join().is_err()
    {
        log::warn!("The {} thread panicked", name);
    }
}

/// Drives renders of every kind against a [`Renderer`].
///
/// All methods take `&self`, so one driver can be shared between the host's
/// main thread and its render thread.
pub struct RenderDriver {
    context: Arc<RenderContext>,
    renderer: Arc<dyn Renderer>,
    config: DriverConfig,
    stats: Arc<StatsManager>,
    events: Arc<EventQueue>,
    engine: Arc<EngineSlot>,
    session: Mutex<Session>,
    session_open: AtomicBool,
    stop_lock: Mutex<()>,
    callbacks: Mutex<Vec<CallbackKind>>,
    stats_thread: Mutex<Option<JoinHandle<()>>>,
    export_stats_thread: Mutex<Option<JoinHandle<()>>>,
    draw_thread: Mutex<Option<JoinHandle<()>>>,
    viewport_rendered: Arc<AtomicBool>,
    denoiser: Box<dyn Denoiser>,
}

impl RenderDriver {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        stats_client: Arc<dyn StatsClient>,
        config: DriverConfig,
    ) -> Self {
        let context = Arc::new(RenderContext::new());
        let stats = Arc::new(StatsManager::new(stats_client, &config.stats));

        let mut sync = SceneSynchronizer::new(context.clone());
        let export_stats = stats.clone();
        sync.set_progress_sink(move |label, progress| {
            export_stats.set_export_stats(label, progress);
        });

        renderer.system_begin(&config.renderer.system_args());
        log::info!("Render driver using {}", renderer.name());

        Self {
            context,
            renderer,
            config,
            stats,
            events: Arc::new(EventQueue::new()),
            engine: Arc::new(EngineSlot {
                engine: Mutex::new(None),
            }),
            session: Mutex::new(Session { scene: None, sync }),
            session_open: AtomicBool::new(false),
            stop_lock: Mutex::new(()),
            callbacks: Mutex::new(Vec::new()),
            stats_thread: Mutex::new(None),
            export_stats_thread: Mutex::new(None),
            draw_thread: Mutex::new(None),
            viewport_rendered: Arc::new(AtomicBool::new(false)),
            denoiser: Box::new(NullDenoiser),
        }
    }

    pub fn with_denoiser(mut self, denoiser: Box<dyn Denoiser>) -> Self {
        self.denoiser = denoiser;
        self
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<StatsManager> {
        &self.stats
    }

    pub fn events(&self) -> &Arc<EventQueue> {
        &self.events
    }

    /// Runs `f` with the synchronizer while holding the session lock.
    pub fn with_synchronizer<R>(&self, f: impl FnOnce(&SceneSynchronizer) -> R) -> R {
        f(&self.session.lock().sync)
    }

    /// Whether a renderer scene is open.
    pub fn has_scene(&self) -> bool {
        self.session.lock().scene.is_some()
    }

    pub fn engine(&self) -> Option<Arc<dyn HostEngine>> {
        self.engine.get()
    }

    /// Drops the host engine. Waits at most the configured engine lock
    /// timeout.
    pub fn release_engine(&self) -> bool {
        self.engine
            .release(self.config.timing.engine_lock_timeout())
    }

    // ------------------------------------------------------------------
    // Session plumbing
    // ------------------------------------------------------------------

    fn session_args(&self) -> Vec<String> {
        let mut args = vec![
            self.config.renderer.program.clone(),
            "-statssession".into(),
            self.stats.server_id().to_string(),
            "-dspyserver".into(),
            self.config.renderer.display_server.clone(),
        ];
        args.extend(self.config.renderer.session_args.iter().cloned());
        args
    }

    fn begin_session(&self) -> Result<(), RendererError> {
        self.renderer.begin_session(&self.session_args())?;
        self.session_open.store(true, Ordering::Release);
        Ok(())
    }

    fn end_session(&self) {
        if self.session_open.swap(false, Ordering::AcqRel) {
            self.renderer.end_session();
        }
    }

    fn check_license(&self) -> Result<(), LicenseError> {
        check_license(&self.renderer.license_status())
    }

    /// Begins a renderer session unless `begin` is false, then checks the
    /// license. On failure the error is reported, a session begun here is
    /// ended and the engine is released.
    fn open_session(&self, engine: &dyn HostEngine, begin: bool) -> Result<(), RenderError> {
        if begin && let Err(err) = self.begin_session() {
            let err = RenderError::from(err);
            engine.report_error(&err.to_string());
            self.release_engine();
            return Err(err);
        }
        if let Err(err) = self.check_license() {
            let err = RenderError::from(err);
            engine.report_error(&err.to_string());
            if begin {
                self.end_session();
            }
            self.release_engine();
            return Err(err);
        }
        Ok(())
    }

    fn register(&self, kind: CallbackKind, callback: EventCallback) {
        self.renderer.register_callback(kind, callback);
        let mut callbacks = self.callbacks.lock();
        if !callbacks.contains(&kind) {
            callbacks.push(kind);
        }
    }

    /// Reports `err`, tears the render down and releases the engine.
    fn abort(&self, engine: &dyn HostEngine, err: RenderError) -> RenderError {
        engine.report_error(&err.to_string());
        self.stop_render(false);
        self.release_engine();
        err
    }

    /// Attaches stats and exports the scene, with the export stats thread
    /// running while the context is in the exporting state.
    fn export_scene(
        &self,
        depsgraph: &dyn Depsgraph,
        incremental: bool,
        attach_stats: bool,
    ) -> Result<(), RenderError> {
        let mut session = self.session.lock();
        session.ensure_scene(self.renderer.as_ref())?;
        if attach_stats && !self.stats.attach() {
            return Err(RenderError::StatsConnection);
        }

        self.context.set_render_state(RenderState::Exporting);
        self.start_export_stats_thread();
        let exported = session.export(depsgraph, incremental);
        self.context.set_render_state(RenderState::Rendering);
        join_thread(&self.export_stats_thread, "export stats");
        exported
    }

    fn issue_render(&self, command: &str) -> Result<(), RenderError> {
        self.session
            .lock()
            .render(self.renderer.as_ref(), command)
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    fn progress_callback(&self) -> EventCallback {
        let context = self.context.clone();
        let stats = self.stats.clone();
        Arc::new(move |percent| {
            if !stats.is_connected() {
                stats.set_progress(percent);
            }
            if context.is_live_rendering() && percent == 100 {
                context.set_not_live_rendering();
            }
        })
    }

    fn bake_progress_callback(&self) -> EventCallback {
        let stats = self.stats.clone();
        Arc::new(move |percent| {
            if !stats.is_connected() {
                stats.set_progress(percent);
            }
        })
    }

    fn batch_progress_callback(&self) -> EventCallback {
        let context = self.context.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        Arc::new(move |percent| {
            stats.set_progress(percent);
            stats.draw_stats(&context, &events);
            // Progress line parsed by render farm queues.
            eprintln!("R90000 {:4}%", percent);
        })
    }

    fn render_callback(&self) -> EventCallback {
        let context = self.context.clone();
        Arc::new(move |event| {
            if event == 0 {
                log::info!("RenderMan has exited");
                if context.is_live_rendering() {
                    context.set_not_live_rendering();
                }
            }
        })
    }

    fn live_render_callback(&self) -> EventCallback {
        let context = self.context.clone();
        Arc::new(move |event| {
            if event == 0 {
                context.set_is_not_refining();
            } else {
                context.set_is_refining();
            }
        })
    }

    // ------------------------------------------------------------------
    // Background threads
    // ------------------------------------------------------------------

    fn start_stats_thread(&self) {
        join_thread(&self.stats_thread, "stats");
        self.stats.reset();

        let context = self.context.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        let engine = self.engine.clone();
        let interval = self.config.stats.poll_interval();
        let delay = context
            .is_xpu()
            .then(|| self.config.timing.xpu_stats_delay());
        let spawned = std::thread::Builder::new()
            .name("render-stats".into())
            .spawn(move || {
                if let Some(delay) = delay {
                    std::thread::sleep(delay);
                }
                while context.is_render_running() {
                    if engine.get().is_none() {
                        break;
                    }
                    if context.is_xpu() && context.is_regular_rendering() && stats.progress() > 98
                    {
                        context.set_not_live_rendering();
                        break;
                    }
                    if context.is_rendering_state() {
                        stats.update_payloads(&context, &events);
                    }
                    std::thread::sleep(interval);
                }
            });
        match spawned {
            Ok(handle) => *self.stats_thread.lock() = Some(handle),
            Err(err) => log::warn!("Failed to spawn the stats thread: {}", err),
        }
    }

    fn start_export_stats_thread(&self) {
        join_thread(&self.export_stats_thread, "export stats");
        let context = self.context.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        let interval = self.config.stats.poll_interval();
        let spawned = std::thread::Builder::new()
            .name("export-stats".into())
            .spawn(move || {
                while context.is_exporting_state() {
                    stats.draw_stats(&context, &events);
                    std::thread::sleep(interval);
                }
            });
        match spawned {
            Ok(handle) => *self.export_stats_thread.lock() = Some(handle),
            Err(err) => log::warn!("Failed to spawn the export stats thread: {}", err),
        }
    }

    fn start_draw_thread(&self) {
        join_thread(&self.draw_thread, "draw");
        let context = self.context.clone();
        let renderer = self.renderer.clone();
        let events = self.events.clone();
        let engine = self.engine.clone();
        let viewport_rendered = self.viewport_rendered.clone();
        let refresh = self.config.timing.viewport_refresh();
        let release_timeout = self.config.timing.engine_lock_timeout();
        let spawned = std::thread::Builder::new()
            .name("viewport-draw".into())
            .spawn(move || {
                while context.is_live_rendering() {
                    if !viewport_rendered.load(Ordering::Acquire) {
                        log::debug!("Viewport shading changed, stopping viewport updates");
                        context.set_not_live_rendering();
                        engine.release(release_timeout);
                        break;
                    }
                    if renderer.has_buffer_updated() {
                        renderer.reset_buffer_updated();
                        events.push(RenderEvent::Redraw);
                    }
                    std::thread::sleep(refresh);
                }
            });
        match spawned {
            Ok(handle) => *self.draw_thread.lock() = Some(handle),
            Err(err) => log::warn!("Failed to spawn the draw thread: {}", err),
        }
    }

    // ------------------------------------------------------------------
    // Display results
    // ------------------------------------------------------------------

    fn result_passes(&self, beauty_only: bool) -> Vec<ResultPass> {
        let count = if beauty_only {
            1
        } else {
            self.renderer.display_count().max(1)
        };
        (0..count)
            .map(|image| {
                if image == 0 {
                    ResultPass {
                        name: "Combined".into(),
                        channels: 4,
                    }
                } else {
                    ResultPass {
                        name: self.renderer.display_name(image),
                        channels: pass_channels(self.renderer.num_channels(image)),
                    }
                }
            })
            .collect()
    }

    fn pull_passes(
        &self,
        passes: &[ResultPass],
        size: (u32, u32),
        region: &RenderRegion,
    ) -> Vec<(usize, PixelBuffer)> {
        passes
            .iter()
            .enumerate()
            .filter_map(|(index, pass)| {
                pull_image(
                    self.renderer.as_ref(),
                    index,
                    size.0,
                    size.1,
                    pass.channels,
                    region,
                )
                .map(|buffer| (index, buffer))
            })
            .collect()
    }

    fn write_passes(&self, engine: &dyn HostEngine, buffers: &[(usize, PixelBuffer)]) {
        for (index, buffer) in buffers {
            engine.update_result(*index, buffer);
        }
    }

    /// Pulls pixels until the render stops being live or the host cancels,
    /// then writes the final (optionally denoised) passes.
    fn pull_until_done(
        &self,
        engine: &dyn HostEngine,
        depsgraph: &dyn Depsgraph,
        beauty_only: bool,
    ) {
        let settings = depsgraph.settings();
        let size = settings.output_size();
        let region = render_region(size.0, size.1, settings.border.as_ref());
        let passes = self.result_passes(beauty_only);
        engine.begin_result(region.size.0, region.size.1, &passes);

        while self.engine.get().is_some()
            && !engine.test_break()
            && self.context.is_live_rendering()
        {
            std::thread::sleep(self.config.timing.pull_interval());
            let buffers = self.pull_passes(&passes, size, &region);
            self.write_passes(engine, &buffers);
        }

        let mut buffers = self.pull_passes(&passes, size, &region);
        let denoise = self.config.denoise.enabled || settings.denoise;
        if denoise && !beauty_only && !engine.test_break() {
            self.context.set_render_state(RenderState::Denoising);
            let images: Vec<PixelBuffer> = buffers.iter().map(|(_, b)| b.clone()).collect();
            match self.denoiser.denoise(&images) {
                Some(denoised) if denoised.len() == buffers.len() => {
                    for ((_, buffer), clean) in buffers.iter_mut().zip(denoised) {
                        *buffer = clean;
                    }
                }
                _ => log::warn!("Denoiser returned no result, keeping rendered passes"),
            }
            self.context.set_render_state(RenderState::Rendering);
        }
        self.write_passes(engine, &buffers);
        engine.end_result();
    }

    /// Waits while the renderer sends pixels somewhere else.
    fn wait_until_done(&self, engine: &dyn HostEngine) {
        while self.engine.get().is_some()
            && !engine.test_break()
            && self.context.is_live_rendering()
        {
            std::thread::sleep(self.config.timing.pull_interval());
        }
    }

    // ------------------------------------------------------------------
    // Render modes
    // ------------------------------------------------------------------

    /// Final-frame render. Blocks until the frame is done or cancelled.
    pub fn start_render(
        &self,
        engine: Arc<dyn HostEngine>,
        depsgraph: &dyn Depsgraph,
        for_background: bool,
    ) -> Result<(), RenderError> {
        self.engine.set(engine.clone());
        let persistent = self.config.session.persistent_data;
        let reuse = persistent && self.has_scene();

        self.open_session(engine.as_ref(), !reuse)?;

        self.context.set_mode(RenderMode::RENDER_RUNNING);
        if for_background {
            self.context
                .set_mode_append(RenderMode::FOR_BACKGROUND | RenderMode::IS_EXTERNAL);
            self.register(CallbackKind::Render, self.render_callback());
            self.register(CallbackKind::Progress, self.batch_progress_callback());
        } else {
            self.register(CallbackKind::Progress, self.progress_callback());
            self.register(CallbackKind::Render, self.render_callback());
        }
        if depsgraph.settings().variant == RenderVariant::Xpu {
            self.context.set_mode_append(RenderMode::IS_XPU);
        }

        if let Err(err) = self.export_scene(depsgraph, reuse, true) {
            return Err(self.abort(engine.as_ref(), err));
        }
        self.stats.reset_progress();
        self.context.set_mode_append(RenderMode::IS_LIVE_RENDERING);

        if self.config.denoise.enabled || depsgraph.settings().denoise {
            let (width, height) = depsgraph.settings().output_size();
            self.denoiser.bootstrap(
                width,
                height,
                self.config.denoise.asymmetry,
                self.config.denoise.use_color_pass,
            );
        }

        if let Err(err) = self.issue_render("prman -live") {
            return Err(self.abort(engine.as_ref(), err));
        }
        self.start_stats_thread();

        match self.config.session.render_into {
            RenderInto::Host => self.pull_until_done(engine.as_ref(), depsgraph, false),
            RenderInto::It => {
                self.wait_until_done(engine.as_ref());
                if for_background {
                    // Background hosts expect a result even when pixels go
                    // to the image tool.
                    let (width, height) = depsgraph.settings().output_size();
                    let passes = self.result_passes(true);
                    engine.begin_result(width, height, &passes);
                    engine.update_result(0, &PixelBuffer::empty(width, height, 4));
                    engine.end_result();
                }
            }
        }

        self.release_engine();
        if !persistent {
            self.stop_render(true);
        }
        Ok(())
    }

    /// Starts a live render and returns once it is running. Later edits go
    /// through [`Self::update_scene`] and [`Self::update_view`].
    pub fn start_interactive_render(
        &self,
        engine: Arc<dyn HostEngine>,
        depsgraph: &dyn Depsgraph,
    ) -> Result<(), RenderError> {
        self.engine.set(engine.clone());
        self.context.set_mode(RenderMode::INTERACTIVE_RUNNING);

        if let Err(err) = self.begin_session() {
            return Err(self.abort(engine.as_ref(), err.into()));
        }
        if let Err(err) = self.check_license() {
            return Err(self.abort(engine.as_ref(), err.into()));
        }
        self.context.set_mode_append(RenderMode::RENDER_RUNNING);

        let viewport = self.config.session.ipr_render_into == RenderInto::Host;
        if viewport {
            self.context
                .set_mode_append(RenderMode::VIEWPORT_RENDERING);
        }
        self.viewport_rendered.store(viewport, Ordering::Release);
        self.register(CallbackKind::Render, self.live_render_callback());

        if let Err(err) = self.export_scene(depsgraph, false, true) {
            return Err(self.abort(engine.as_ref(), err));
        }
        self.context.set_mode_append(RenderMode::IS_LIVE_RENDERING);
        if let Err(err) = self.issue_render("prman -live") {
            return Err(self.abort(engine.as_ref(), err));
        }

        self.start_stats_thread();
        if viewport {
            self.start_draw_thread();
        }
        Ok(())
    }

    /// Material preview render. Blocks until done.
    pub fn start_swatch_render(
        &self,
        engine: Arc<dyn HostEngine>,
        depsgraph: &dyn Depsgraph,
    ) -> Result<(), RenderError> {
        self.engine.set(engine.clone());
        self.open_session(engine.as_ref(), true)?;

        self.context
            .set_mode(RenderMode::RENDER_RUNNING | RenderMode::SWATCH_RENDERING);
        self.register(CallbackKind::Progress, self.progress_callback());
        self.register(CallbackKind::Render, self.render_callback());

        if let Err(err) = self.export_scene(depsgraph, false, false) {
            return Err(self.abort(engine.as_ref(), err));
        }
        self.context.set_mode_append(RenderMode::IS_LIVE_RENDERING);
        if let Err(err) = self.issue_render("prman") {
            return Err(self.abort(engine.as_ref(), err));
        }

        self.pull_until_done(engine.as_ref(), depsgraph, true);
        self.stop_render(true);
        self.release_engine();
        Ok(())
    }

    /// Texture bake. The render command blocks until the bake is done.
    pub fn start_bake_render(
        &self,
        engine: Arc<dyn HostEngine>,
        depsgraph: &dyn Depsgraph,
        for_background: bool,
    ) -> Result<(), RenderError> {
        self.engine.set(engine.clone());
        self.open_session(engine.as_ref(), true)?;

        self.context
            .set_mode(RenderMode::RENDER_RUNNING | RenderMode::IS_BAKE_MODE);
        if for_background {
            self.context
                .set_mode_append(RenderMode::FOR_BACKGROUND | RenderMode::IS_EXTERNAL);
            self.register(CallbackKind::Render, self.render_callback());
            self.register(CallbackKind::Progress, self.batch_progress_callback());
        } else {
            self.register(CallbackKind::Progress, self.bake_progress_callback());
            self.register(CallbackKind::Render, self.render_callback());
        }

        if let Err(err) = self.export_scene(depsgraph, false, true) {
            return Err(self.abort(engine.as_ref(), err));
        }
        if let Err(err) = self.issue_render("prman -blocking") {
            return Err(self.abort(engine.as_ref(), err));
        }
        self.start_stats_thread();
        self.stop_render(true);
        self.release_engine();
        Ok(())
    }

    /// Writes one RIB file per frame. Returns the written paths.
    ///
    /// With persistent data the scene is exported once and later frames are
    /// applied as incremental updates.
    pub fn start_external_render(
        &self,
        engine: Arc<dyn HostEngine>,
        timeline: &mut dyn Timeline,
        frames: RangeInclusive<i32>,
    ) -> Result<Vec<String>, RenderError> {
        self.engine.set(engine.clone());
        self.open_session(engine.as_ref(), true)?;

        self.context.set_mode(
            RenderMode::RENDER_RUNNING | RenderMode::IS_EXTERNAL | RenderMode::IS_RIB_MODE,
        );
        let persistent = self.config.session.persistent_data;
        let mut written = Vec::new();

        for frame in frames {
            timeline.set_frame(frame);
            let incremental = persistent && self.has_scene();
            let path = self.config.rib.output_for_frame(frame);
            let command = self.config.rib.command(&path);

            let exported = self
                .export_scene(timeline.depsgraph(), incremental, false)
                .and_then(|()| self.issue_render(&command));
            if let Err(err) = exported {
                return Err(self.abort(engine.as_ref(), err));
            }
            if !persistent {
                self.session.lock().delete_scene(self.renderer.as_ref());
            }
            log::info!("Wrote {}", path);
            written.push(path);
        }

        self.session.lock().delete_scene(self.renderer.as_ref());
        self.context.stop();
        self.end_session();
        self.release_engine();
        Ok(written)
    }

    /// Stops whatever is running and tears the session down.
    ///
    /// Returns without doing anything when another stop holds the stop lock
    /// past the configured timeout, or when nothing is running.
    pub fn stop_render(&self, stop_draw_thread: bool) {
        let Some(_guard) = self
            .stop_lock
            .try_lock_for(self.config.timing.stop_lock_timeout())
        else {
            log::debug!("Another stop is in progress");
            return;
        };
        if !self.context.is_interactive_running() && !self.context.is_render_running() {
            return;
        }

        log::debug!("Telling the renderer to stop...");
        self.context.stop();
        for kind in self.callbacks.lock().drain(..) {
            self.renderer.unregister_callback(kind);
        }

        if stop_draw_thread {
            join_thread(&self.draw_thread, "draw");
        } else {
            self.draw_thread.lock().take();
        }
        join_thread(&self.stats_thread, "stats");
        join_thread(&self.export_stats_thread, "export stats");

        self.session.lock().delete_scene(self.renderer.as_ref());
        self.end_session();
        log::info!("Renderer has stopped");
    }

    // ------------------------------------------------------------------
    // Live session entry points
    // ------------------------------------------------------------------

    /// Applies host edits to a running interactive render. Returns `None`
    /// when no interactive render is running.
    pub fn update_scene(&self, depsgraph: &dyn Depsgraph) -> Option<ChangeSet> {
        if !self.context.is_interactive_running() {
            return None;
        }
        let mut session = self.session.lock();
        let Session { scene, sync } = &mut *session;
        let scene = scene.as_deref_mut()?;
        sync.update_scene(scene, depsgraph)
    }

    /// Pushes the host camera to a running interactive render.
    pub fn update_view(&self, depsgraph: &dyn Depsgraph) -> bool {
        if !self.context.is_interactive_running() {
            return false;
        }
        let mut session = self.session.lock();
        let Session { scene, sync } = &mut *session;
        match scene.as_deref_mut() {
            Some(scene) => sync.update_view(scene, depsgraph),
            None => false,
        }
    }

    /// Tells the driver whether the host viewport still shows the render.
    pub fn viewport_shading_changed(&self, rendered: bool) {
        self.viewport_rendered.store(rendered, Ordering::Release);
    }

    /// Drains the event queue and performs the host calls. Must be called
    /// from the thread that owns the host. Returns the number of events
    /// handled.
    pub fn process_events(&self) -> usize {
        let events = self.events.drain();
        let count = events.len();
        let Some(engine) = self.engine.get() else {
            if count > 0 {
                log::debug!("Dropping {} event(s), no engine attached", count);
            }
            return count;
        };
        for event in events {
            match event {
                RenderEvent::Stats { title, info } => engine.update_stats(&title, &info),
                RenderEvent::Progress(progress) => engine.update_progress(progress),
                RenderEvent::Redraw => {
                    if !engine.tag_redraw() {
                        self.viewport_shading_changed(false);
                    }
                }
                RenderEvent::Error(message) => engine.report_error(&message),
            }
        }
        count
    }
}

impl Drop for RenderDriver {
    fn drop(&mut self) {
        self.stop_render(true);
    }
}
