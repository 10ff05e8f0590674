use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};
use scenebridge_core::host::{
    DataId, HostCamera, HostGeometry, HostObject, MeshData, ObjectId, SceneSettings,
    SceneSnapshot,
};
use scenebridge_core::{NodeHandle, RenderState};
use scenebridge_render::config::DriverConfig;
use scenebridge_render::license::LicenseStatus;
use scenebridge_render::{
    CallbackKind, DummyRenderer, DummyStatsClient, HeadlessEngine, LicenseError, RenderDriver,
    RenderError, RenderEvent,
};
use scenebridge_sync::{ChangeKind, PrototypeData};

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
    config.timing.viewport_refresh_s = 0.002;
    config
}

fn driver(renderer: &DummyRenderer) -> RenderDriver {
    RenderDriver::new(
        Arc::new(renderer.clone()),
        Arc::new(DummyStatsClient::new()),
        fast_config(),
    )
}

fn one_quad() -> SceneSnapshot {
    let mut snapshot = SceneSnapshot::new(SceneSettings::default());
    snapshot.set_camera(HostCamera::default());
    snapshot.add_object(quad(1));
    snapshot
}

fn geometry_node(driver: &RenderDriver, data: u64) -> Option<NodeHandle> {
    driver.with_synchronizer(|sync| {
        match &sync.mirror().prototype(DataId(data))?.data {
            PrototypeData::Mesh(mesh) => Some(mesh.geometry),
            _ => None,
        }
    })
}

/// Pumps the event queue until `done` holds or two seconds pass.
fn pump_until(driver: &RenderDriver, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        driver.process_events();
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

// ---------------------------------------------------------------------------
// Live session
// ---------------------------------------------------------------------------

#[test]
fn edit_then_delete_in_a_live_session() {
    let _ = env_logger::builder().is_test(true).try_init();
    let renderer = DummyRenderer::new();
    let driver = driver(&renderer);
    let engine = Arc::new(HeadlessEngine::new());
    let mut snapshot = one_quad();

    driver
        .start_interactive_render(engine.clone(), &snapshot)
        .unwrap();
    snapshot.clear_updates();
    assert!(driver.context().is_interactive_running());
    assert!(driver.context().is_rendering_state());
    assert!(driver.context().is_live_rendering());

    let scene = renderer.last_scene().unwrap();
    let geometry = geometry_node(&driver, 1).unwrap();
    assert_eq!(scene.define_count(geometry), 1);

    snapshot.set_transform(ObjectId(1), Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)));
    let changes = driver.update_scene(&snapshot).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.for_object(ObjectId(1)), vec![&ChangeKind::Transform]);
    assert_eq!(scene.define_count(geometry), 1);
    snapshot.clear_updates();

    snapshot.remove_object(ObjectId(1));
    driver.update_scene(&snapshot).unwrap();
    assert!(geometry_node(&driver, 1).is_none());
    assert!(driver.with_synchronizer(|sync| sync.mirror().is_empty()));
    assert_eq!(scene.delete_count(geometry), 1);
    assert!(!scene.contains(geometry));
    assert_eq!(scene.mutations_outside_edit(), 0);

    driver.stop_render(true);
    let context = driver.context();
    assert!(!context.is_render_running());
    assert!(!context.is_interactive_running());
    assert!(!context.is_rendering_state());
    assert_eq!(context.render_state(), RenderState::Stopped);
    assert_eq!(renderer.scenes_deleted(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    assert!(!driver.has_scene());
}

#[test]
fn live_render_issues_a_live_command() {
    let renderer = DummyRenderer::new();
    let driver = driver(&renderer);
    driver
        .start_interactive_render(Arc::new(HeadlessEngine::new()), &one_quad())
        .unwrap();

    assert_eq!(renderer.commands(), vec!["prman -live"]);
    assert_eq!(renderer.sessions_begun(), 1);
    let args = &renderer.session_args()[0];
    assert_eq!(args[0], "prman");
    assert!(args.contains(&"-statssession".to_string()));
    assert!(renderer.has_callback(CallbackKind::Render));
    assert!(!renderer.has_callback(CallbackKind::Progress));
    assert!(driver.context().is_viewport_rendering());

    driver.stop_render(true);
    assert_eq!(renderer.unregistered(), vec![CallbackKind::Render]);
}

#[test]
fn refining_follows_render_events() {
    let renderer = DummyRenderer::manual();
    let driver = driver(&renderer);
    driver
        .start_interactive_render(Arc::new(HeadlessEngine::new()), &one_quad())
        .unwrap();

    renderer.emit(CallbackKind::Render, 1);
    assert!(driver.context().is_refining());
    renderer.emit(CallbackKind::Render, 0);
    assert!(!driver.context().is_refining());
    assert!(driver.context().is_live_rendering());

    driver.stop_render(true);
}

#[test]
fn camera_edits_reach_the_renderer() {
    let renderer = DummyRenderer::new();
    let driver = driver(&renderer);
    let mut snapshot = one_quad();
    driver
        .start_interactive_render(Arc::new(HeadlessEngine::new()), &snapshot)
        .unwrap();

    let mut camera = HostCamera::default();
    camera.transform = Mat4::from_translation(Vec3::new(0.0, 1.0, 5.0));
    snapshot.set_camera(camera);
    assert!(driver.update_view(&snapshot));

    driver.stop_render(true);
    assert!(!driver.update_view(&snapshot));
    assert!(driver.update_scene(&snapshot).is_none());
}

// ---------------------------------------------------------------------------
// Viewport draw thread
// ---------------------------------------------------------------------------

#[test]
fn buffer_updates_become_redraws() {
    let renderer = DummyRenderer::new();
    let driver = driver(&renderer);
    let engine = Arc::new(HeadlessEngine::new());
    driver
        .start_interactive_render(engine.clone(), &one_quad())
        .unwrap();

    renderer.mark_buffer_updated();
    assert!(pump_until(&driver, || engine.redraws() > 0));

    driver.stop_render(true);
}

#[test]
fn closing_the_viewport_releases_the_engine() {
    let renderer = DummyRenderer::new();
    let driver = driver(&renderer);
    let engine = Arc::new(HeadlessEngine::new());
    driver
        .start_interactive_render(engine.clone(), &one_quad())
        .unwrap();

    engine.close_viewport();
    renderer.mark_buffer_updated();
    assert!(pump_until(&driver, || !driver.context().is_live_rendering()));
    assert!(pump_until(&driver, || driver.engine().is_none()));

    driver.stop_render(true);
    assert!(!driver.context().is_render_running());
}

#[test]
fn stats_text_is_delivered_on_process_events() {
    let renderer = DummyRenderer::new();
    let driver = driver(&renderer);
    let engine = Arc::new(HeadlessEngine::new());
    driver
        .start_interactive_render(engine.clone(), &one_quad())
        .unwrap();

    assert!(pump_until(&driver, || {
        engine
            .stats()
            .iter()
            .any(|(title, _)| title == "RenderMan (Stats)")
    }));
    driver.stop_render(true);
    assert!(
        !driver
            .events()
            .drain()
            .iter()
            .any(|event| matches!(event, RenderEvent::Error(_)))
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn missing_license_stops_everything() {
    let renderer = DummyRenderer::new();
    let mut license = LicenseStatus::valid("26.0");
    license.valid = false;
    renderer.set_license(license);
    let driver = driver(&renderer);
    let engine = Arc::new(HeadlessEngine::new());

    let err = driver
        .start_interactive_render(engine.clone(), &one_quad())
        .unwrap_err();
    assert!(matches!(err, RenderError::License(LicenseError::NotFound)));
    assert_eq!(
        engine.errors(),
        vec!["Cannot find a valid RenderMan license. Aborting."]
    );
    assert!(!driver.context().is_interactive_running());
    assert!(!driver.context().is_render_running());
    assert_eq!(renderer.sessions_begun(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    assert!(renderer.scenes().is_empty());
    assert!(driver.engine().is_none());
}

#[test]
fn export_failure_tears_the_session_down() {
    let renderer = DummyRenderer::new();
    renderer.reject_definitions("QuadMesh1");
    let driver = driver(&renderer);
    let engine = Arc::new(HeadlessEngine::new());

    let err = driver
        .start_interactive_render(engine.clone(), &one_quad())
        .unwrap_err();
    assert!(matches!(err, RenderError::Export(_)));
    assert!(engine.errors()[0].starts_with("Export failed: "));
    assert!(!driver.context().is_render_running());
    assert_eq!(driver.context().render_state(), RenderState::Stopped);
    assert_eq!(renderer.scenes_deleted(), 1);
    assert_eq!(renderer.sessions_ended(), 1);
    assert!(!renderer.session_open());
    assert!(renderer.commands().is_empty());
    assert!(driver.engine().is_none());
}
