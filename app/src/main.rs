//! # SceneBridge
//!
//! Headless front end: builds a synthetic scene and runs one render mode
//! against the dummy renderer, playing the host's part with a
//! [`HeadlessEngine`].
//!
//! ```bash
//! # Show help
//! scenebridge --help
//!
//! # Final frame with verbose logging
//! RUST_LOG=debug scenebridge --mode batch
//! ```

mod args;
mod scene;

use std::process::ExitCode;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use scenebridge_render::{
    ConfigError, DriverConfig, DummyRenderer, DummyStatsClient, HeadlessEngine, RenderDriver,
    RenderError, Timeline,
};

use args::{Args, Mode};
use scene::AnimatedScene;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

static DRIVER: OnceLock<RenderDriver> = OnceLock::new();

/// The process-wide render driver. The first call creates it from `config`;
/// later calls ignore their argument.
fn driver(config: DriverConfig) -> &'static RenderDriver {
    DRIVER.get_or_init(|| {
        RenderDriver::new(
            Arc::new(DummyRenderer::new()),
            Arc::new(DummyStatsClient::new()),
            config,
        )
    })
}

fn report(engine: &HeadlessEngine) {
    for (title, info) in engine.stats().iter().rev().take(1) {
        log::info!("{} {}", title, info.trim());
    }
    for pass in engine.passes() {
        log::info!("Pass {} ({} channels)", pass.name, pass.channels);
    }
    for error in engine.errors() {
        log::error!("{}", error);
    }
}

fn run_interactive(
    driver: &RenderDriver,
    engine: Arc<HeadlessEngine>,
    scene: &mut AnimatedScene,
    edits: u32,
) -> Result<(), RenderError> {
    driver.start_interactive_render(engine.clone(), scene.snapshot())?;
    scene.mark_synced();
    let refresh = driver.config().timing.viewport_refresh();

    for step in 1..=edits as i32 {
        scene.set_frame(step + 1);
        if step % 2 == 0 {
            let visible = scene.toggle_hair();
            log::info!("Hair {}", if visible { "shown" } else { "hidden" });
        }
        if let Some(changes) = driver.update_scene(scene.depsgraph()) {
            log::info!("Edit {}: {} change(s)", step, changes.len());
        }
        driver.update_view(scene.depsgraph());
        scene.mark_synced();
        driver.process_events();
        std::thread::sleep(refresh);
    }

    driver.stop_render(true);
    driver.process_events();
    log::info!("Viewport redrawn {} time(s)", engine.redraws());
    Ok(())
}

fn run(args: &Args) -> Result<(), AppError> {
    let driver = driver(args.driver_config()?);
    let engine = Arc::new(HeadlessEngine::new());
    let mut scene = AnimatedScene::new(args.scene_settings());

    match args.mode {
        Mode::Batch => driver.start_render(engine.clone(), scene.depsgraph(), false)?,
        Mode::Background => driver.start_render(engine.clone(), scene.depsgraph(), true)?,
        Mode::Swatch => driver.start_swatch_render(engine.clone(), scene.depsgraph())?,
        Mode::Bake => driver.start_bake_render(engine.clone(), scene.depsgraph(), false)?,
        Mode::Rib => {
            let written =
                driver.start_external_render(engine.clone(), &mut scene, args.start..=args.end)?;
            log::info!("Wrote {} RIB file(s)", written.len());
        }
        Mode::Interactive => run_interactive(driver, engine.clone(), &mut scene, args.edits)?,
    }

    driver.process_events();
    if driver.config().session.persistent_data {
        driver.stop_render(true);
    }
    report(&engine);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    scenebridge_core::init();
    scenebridge_sync::init();
    scenebridge_render::init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
