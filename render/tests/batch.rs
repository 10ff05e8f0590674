use std::sync::Arc;

use glam::{Mat4, Vec3};
use scenebridge_core::RenderState;
use scenebridge_core::host::{
    DataId, HostGeometry, HostObject, MeshData, ObjectId, RenderVariant, SceneSettings,
    SceneSnapshot,
};
use scenebridge_core::motion::RenderBorder;
use scenebridge_render::config::{DriverConfig, RenderInto, RibCompression, RibFormat};
use scenebridge_render::{
    CallbackKind, DummyRenderer, DummyStatsClient, HeadlessEngine, LicenseError, LicenseStatus,
    RenderDriver, RenderError, RenderEvent, RendererError,
};

fn quad(id: u64) -> HostObject {
    HostObject::new(
        ObjectId(id),
        format!("Quad{id}"),
        DataId(id),
        format!("QuadMesh{id}"),
        HostGeometry::Mesh(MeshData::from_faces(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)],
            &[&[0, 1, 3, 2]],
        )),
    )
}

fn fast_config() -> DriverConfig {
    let mut config = DriverConfig::default();
    config.stats.connect_retry_ms = 1;
    config.stats.connect_timeout_ms = 500;
    config.stats.poll_interval_ms = 5;
    config.timing.pull_interval_ms = 1;
    config
}

fn small_scene() -> SceneSnapshot {
    let mut settings = SceneSettings::default();
    settings.resolution = (64, 32);
    let mut snapshot = SceneSnapshot::new(settings);
    snapshot.add_object(quad(1));
    snapshot.add_object(quad(2));
    snapshot
}

fn driver_with(renderer: &DummyRenderer, config: DriverConfig) -> RenderDriver {
    RenderDriver::new(
        Arc::new(renderer.clone()),
        Arc::new(DummyStatsClient::new()),
        config,
    )
}

fn assert_torn_down(driver: &RenderDriver, renderer: &DummyRenderer) {
    let context = driver.context();
    assert!(!context.is_render_running());
    assert!(!context.is_live_rendering());
    assert_eq!(context.render_state(), RenderState::Stopped);
    assert!(!renderer.session_open());
    assert!(!driver.has_scene());
    assert!(driver.engine().is_none());
}

// ---------------------------------------------------------------------------
// Final-frame renders
// ---------------------------------------------------------------------------

#[test]
fn batch_render_writes_the_combined_pass() {
    let _ = env_logger::builder().is_test(true).try_init();
    let renderer = DummyRenderer::new();
    renderer.set_display_channels(vec![3]);
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());

    driver
        .start_render(engine.clone(), &small_scene(), false)
        .unwrap();

    assert_eq!(renderer.commands(), vec!["prman -live"]);
    assert_eq!(engine.results_begun(), 1);
    assert_eq!(engine.results_ended(), 1);
    let combined = engine.last_result(0).unwrap();
    assert_eq!((combined.width, combined.height, combined.channels), (64, 32, 4));
    assert_eq!(combined.pixel(0, 0), &[0.5, 0.5, 0.5, 1.0]);
    assert!(engine.errors().is_empty());

    assert_eq!(renderer.scenes_deleted(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    let mut unregistered = renderer.unregistered();
    unregistered.sort_by_key(|kind| *kind == CallbackKind::Render);
    assert_eq!(unregistered, vec![CallbackKind::Progress, CallbackKind::Render]);
    assert_torn_down(&driver, &renderer);
}

#[test]
fn every_display_becomes_a_pass() {
    let renderer = DummyRenderer::new();
    renderer.set_display_channels(vec![4, 3, 6, 1]);
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());

    driver
        .start_render(engine.clone(), &small_scene(), false)
        .unwrap();

    let passes = engine.passes();
    let names: Vec<&str> = passes.iter().map(|p| p.name.as_str()).collect();
    let channels: Vec<usize> = passes.iter().map(|p| p.channels).collect();
    assert_eq!(names, vec!["Combined", "aov1", "aov2", "aov3"]);
    assert_eq!(channels, vec![4, 3, 4, 1]);
    assert_eq!(engine.last_result(2).unwrap().channels, 4);
}

#[test]
fn render_border_crops_the_result() {
    let renderer = DummyRenderer::new();
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());
    let mut snapshot = small_scene();
    snapshot.settings_mut().border = Some(RenderBorder {
        min_x: 0.0,
        max_x: 0.5,
        min_y: 0.5,
        max_y: 1.0,
    });

    driver.start_render(engine.clone(), &snapshot, false).unwrap();

    let combined = engine.last_result(0).unwrap();
    assert_eq!((combined.width, combined.height), (32, 16));
}

#[test]
fn background_render_reports_farm_progress() {
    let renderer = DummyRenderer::new();
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());

    driver
        .start_render(engine.clone(), &small_scene(), true)
        .unwrap();

    let events = driver.events().drain();
    assert!(events.contains(&RenderEvent::Progress(1.0)));
    assert_torn_down(&driver, &renderer);
}

#[test]
fn background_render_into_it_still_writes_a_result() {
    let renderer = DummyRenderer::new();
    let mut config = fast_config();
    config.session.render_into = RenderInto::It;
    let driver = driver_with(&renderer, config);
    let engine = Arc::new(HeadlessEngine::new());

    driver
        .start_render(engine.clone(), &small_scene(), true)
        .unwrap();

    assert_eq!(engine.results_ended(), 1);
    let combined = engine.last_result(0).unwrap();
    assert!(combined.data.iter().all(|v| *v == 0.0));
}

#[test]
fn cancelled_render_stops_pulling() {
    let renderer = DummyRenderer::manual();
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());
    engine.request_break();

    driver
        .start_render(engine.clone(), &small_scene(), false)
        .unwrap();

    assert_eq!(engine.results_ended(), 1);
    assert_torn_down(&driver, &renderer);
}

#[test]
fn xpu_scene_sets_the_xpu_flag() {
    let renderer = DummyRenderer::manual();
    let mut config = fast_config();
    config.timing.xpu_stats_delay_ms = 1;
    let driver = driver_with(&renderer, config);
    let engine = Arc::new(HeadlessEngine::new());
    let mut snapshot = small_scene();
    snapshot.settings_mut().variant = RenderVariant::Xpu;

    let render = std::thread::scope(|scope| {
        let handle = scope.spawn(|| driver.start_render(engine.clone(), &snapshot, false));
        while !driver.context().is_live_rendering() {
            std::thread::yield_now();
        }
        assert!(driver.context().is_xpu());
        renderer.emit(CallbackKind::Progress, 100);
        handle.join().unwrap()
    });
    render.unwrap();
    assert_torn_down(&driver, &renderer);
}

#[test]
fn persistent_data_keeps_the_scene_between_frames() {
    let renderer = DummyRenderer::new();
    let mut config = fast_config();
    config.session.persistent_data = true;
    let driver = driver_with(&renderer, config);
    let mut snapshot = small_scene();

    driver
        .start_render(Arc::new(HeadlessEngine::new()), &snapshot, false)
        .unwrap();
    assert!(driver.has_scene());
    snapshot.clear_updates();
    let scene = renderer.last_scene().unwrap();
    let defines = scene.total_defines();

    snapshot.set_transform(ObjectId(2), Mat4::from_translation(Vec3::Y));
    driver
        .start_render(Arc::new(HeadlessEngine::new()), &snapshot, false)
        .unwrap();

    assert_eq!(renderer.sessions_begun(), 1);
    assert_eq!(renderer.scenes().len(), 1);
    assert_eq!(scene.total_defines(), defines);
    assert_eq!(renderer.commands().len(), 2);

    driver.stop_render(true);
    assert_eq!(renderer.scenes_deleted(), 1);
    assert_torn_down(&driver, &renderer);
}

// ---------------------------------------------------------------------------
// Swatch and bake
// ---------------------------------------------------------------------------

#[test]
fn swatch_render_pulls_the_beauty_only() {
    let renderer = DummyRenderer::new();
    renderer.set_display_channels(vec![4, 3]);
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());

    driver
        .start_swatch_render(engine.clone(), &small_scene())
        .unwrap();

    assert_eq!(renderer.commands(), vec!["prman"]);
    assert_eq!(engine.passes().len(), 1);
    assert_eq!(engine.last_result(0).unwrap().channels, 4);
    assert_torn_down(&driver, &renderer);
}

#[test]
fn bake_render_blocks() {
    let renderer = DummyRenderer::new();
    let driver = driver_with(&renderer, fast_config());

    driver
        .start_bake_render(Arc::new(HeadlessEngine::new()), &small_scene(), false)
        .unwrap();

    assert_eq!(renderer.commands(), vec!["prman -blocking"]);
    assert_eq!(renderer.scenes_deleted(), 1);
    assert_torn_down(&driver, &renderer);
}

// ---------------------------------------------------------------------------
// RIB export
// ---------------------------------------------------------------------------

#[test]
fn rib_export_writes_one_file_per_frame() {
    let renderer = DummyRenderer::new();
    let mut config = fast_config();
    config.rib.output = "/tmp/shot.{frame}.rib".into();
    let driver = driver_with(&renderer, config);
    let mut snapshot = small_scene();

    let written = driver
        .start_external_render(Arc::new(HeadlessEngine::new()), &mut snapshot, 1..=3)
        .unwrap();

    assert_eq!(
        written,
        vec!["/tmp/shot.0001.rib", "/tmp/shot.0002.rib", "/tmp/shot.0003.rib"]
    );
    assert_eq!(
        renderer.commands()[0],
        "rib /tmp/shot.0001.rib -format ascii -indent"
    );
    assert_eq!(renderer.scenes().len(), 3);
    assert_eq!(renderer.scenes_deleted(), 3);
    assert_eq!(renderer.sessions_begun(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    assert_torn_down(&driver, &renderer);
}

#[test]
fn persistent_rib_export_reuses_one_scene() {
    let renderer = DummyRenderer::new();
    let mut config = fast_config();
    config.session.persistent_data = true;
    config.rib.format = RibFormat::Binary;
    config.rib.compression = RibCompression::Gzip;
    let driver = driver_with(&renderer, config);
    let mut snapshot = small_scene();

    driver
        .start_external_render(Arc::new(HeadlessEngine::new()), &mut snapshot, 4..=5)
        .unwrap();

    assert_eq!(renderer.scenes().len(), 1);
    assert_eq!(renderer.scenes_deleted(), 1);
    assert_eq!(
        renderer.commands(),
        vec![
            "rib scene.0004.rib -format binary -compression gzip",
            "rib scene.0005.rib -format binary -compression gzip",
        ]
    );
}

// ---------------------------------------------------------------------------
// Session failures
// ---------------------------------------------------------------------------

#[test]
fn session_begin_failure_is_reported() {
    let renderer = DummyRenderer::new();
    renderer.fail_sessions();
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());

    let err = driver
        .start_render(engine.clone(), &small_scene(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::Renderer(RendererError::SessionBegin(_))
    ));
    assert_eq!(engine.errors().len(), 1);
    assert!(renderer.scenes().is_empty());
    assert_torn_down(&driver, &renderer);
}

#[test]
fn license_is_checked_inside_the_session() {
    let renderer = DummyRenderer::new();
    let mut license = LicenseStatus::valid("26.0");
    license.valid = false;
    renderer.set_license(license);
    let driver = driver_with(&renderer, fast_config());
    let engine = Arc::new(HeadlessEngine::new());

    let err = driver
        .start_render(engine.clone(), &small_scene(), false)
        .unwrap_err();
    assert!(matches!(err, RenderError::License(LicenseError::NotFound)));
    assert_eq!(renderer.sessions_begun(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    assert_eq!(
        engine.errors(),
        vec!["Cannot find a valid RenderMan license. Aborting."]
    );
    assert!(renderer.scenes().is_empty());
    assert_torn_down(&driver, &renderer);
}

#[test]
fn unreachable_stats_server_aborts_the_render() {
    let renderer = DummyRenderer::new();
    let mut config = fast_config();
    config.stats.connect_timeout_ms = 50;
    let driver = RenderDriver::new(
        Arc::new(renderer.clone()),
        Arc::new(DummyStatsClient::unreachable()),
        config,
    );
    let engine = Arc::new(HeadlessEngine::new());

    let err = driver
        .start_render(engine.clone(), &small_scene(), false)
        .unwrap_err();
    assert!(matches!(err, RenderError::StatsConnection));
    assert_eq!(
        engine.errors(),
        vec!["Could not connect to the stats server. Aborting..."]
    );
    assert!(renderer.commands().is_empty());
    assert_eq!(renderer.scenes_deleted(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    assert_torn_down(&driver, &renderer);
}
