//! Live render statistics.
//!
//! # Architecture
//!
//! - [`StatsClient`] is the telemetry connection. It connects
//!   asynchronously and is polled for JSON payloads.
//! - [`LiveStats`] decodes payloads into display strings.
//! - [`StatsManager`] owns both. It bootstraps the connection on a
//!   background thread, keeps the progress counter the renderer callbacks
//!   write to, and turns the current values into [`RenderEvent`]s for the
//!   host.
//!
//! # Example
//!
//! ```ignore
//! let stats = StatsManager::new(Arc::new(DummyStatsClient::new()), &config.stats);
//! if !stats.attach() {
//!     return Err(RenderError::StatsConnection);
//! }
//! stats.update_payloads(&context, &events);
//! ```

mod client;
#[cfg(feature = "dummy")]
mod dummy;
mod live;

pub use client::StatsClient;
#[cfg(feature = "dummy")]
pub use dummy::DummyStatsClient;
pub use live::{
    LIVE_METRICS, LiveStats, NO_VALUE, format_cpu, format_memory, format_ray_share,
    format_rays_per_second, format_timer,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use scenebridge_core::RenderContext;

use crate::config::StatsConfig;
use crate::events::{EventQueue, RenderEvent};

/// Title of the status line during interactive renders.
pub const INTERACTIVE_TITLE: &str = "RenderMan (Stats)";

const NO_CONNECTION: &str = "(no stats connection) ";

pub const BASIC_STATS: &[&str] = &["Variant", "CPU%", "Memory", "Rays/Sec", "Total Rays"];

pub const MODERATE_STATS: &[&str] = &[
    "Variant",
    "CPU%",
    "Memory",
    "Rays/Sec",
    "Total Rays",
    "Shading Time",
    "Texturing Time",
    "Raytracing Time",
    "Camera Rays",
];

pub const MOST_STATS: &[&str] = &[
    "Variant",
    "CPU%",
    "Memory",
    "Rays/Sec",
    "Total Rays",
    "Shading Time",
    "Texturing Time",
    "Raytracing Time",
    "Camera Rays",
    "Transmission Rays",
    "Light Rays",
    "Indirect Rays",
    "Photon Rays",
];

pub const ALL_STATS: &[&str] = &[
    "Variant",
    "CPU%",
    "Memory",
    "First Ray",
    "First Pixel",
    "First Iteration",
    "Rays/Sec",
    "Total Rays",
    "Shading Time",
    "Texturing Time",
    "Raytracing Time",
    "Camera Rays",
    "Transmission Rays",
    "Light Rays",
    "Indirect Rays",
    "Photon Rays",
];

/// Labels shown during interactive renders for a print level.
pub fn stats_for_level(level: u8) -> &'static [&'static str] {
    match level {
        1 => BASIC_STATS,
        2 => MODERATE_STATS,
        3 => MOST_STATS,
        4 => ALL_STATS,
        _ => &[],
    }
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".into())
}

pub struct StatsManager {
    client: Arc<dyn StatsClient>,
    server_id: String,
    metric_interval_ms: u64,
    connect_timeout: Duration,
    connect_retry: Duration,
    draw_labels: &'static [&'static str],
    live: Mutex<LiveStats>,
    progress: AtomicI32,
    bootstrap: Mutex<Option<JoinHandle<()>>>,
    kill: Arc<AtomicBool>,
}

impl StatsManager {
    pub fn new(client: Arc<dyn StatsClient>, config: &StatsConfig) -> Self {
        let server_id = format!("{}_{}_{}", config.server_id, user_name(), std::process::id());
        Self {
            client,
            server_id,
            metric_interval_ms: config.poll_interval_ms,
            connect_timeout: config.connect_timeout(),
            connect_retry: config.connect_retry(),
            draw_labels: stats_for_level(config.print_level),
            live: Mutex::new(LiveStats::new()),
            progress: AtomicI32::new(0),
            bootstrap: Mutex::new(None),
            kill: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Id the renderer registers its telemetry server under.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn status(&self) -> &'static str {
        if self.is_connected() {
            "Connected"
        } else if self.client.failed_to_connect() {
            "Connection Failed"
        } else {
            "Disconnected"
        }
    }

    pub fn disconnect(&self) {
        if self.is_connected() {
            log::debug!("Disconnecting from stats server");
            self.client.disconnect();
        }
    }

    /// Connects to the telemetry server, waiting up to the configured
    /// timeout. Returns false when no connection could be made.
    pub fn attach(&self) -> bool {
        self.kill_bootstrap();

        let client = self.client.clone();
        let kill = self.kill.clone();
        let server_id = self.server_id.clone();
        let retry = self.connect_retry;
        let interval = self.metric_interval_ms;
        let spawned = std::thread::Builder::new()
            .name("stats-bootstrap".into())
            .spawn(move || bootstrap(client.as_ref(), &kill, &server_id, retry, interval));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("Failed to spawn the stats bootstrap thread: {}", err);
                return false;
            }
        };

        let deadline = Instant::now() + self.connect_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            let _ = handle.join();
            return self.is_connected();
        }

        *self.bootstrap.lock() = Some(handle);
        self.kill_bootstrap();
        if !self.is_connected() {
            log::debug!(
                "Giving up trying to connect to stats server: {}",
                self.client.status_string()
            );
            return false;
        }
        true
    }

    fn kill_bootstrap(&self) {
        if let Some(handle) = self.bootstrap.lock().take() {
            self.kill.store(true, Ordering::Release);
            let _ = handle.join();
        }
        self.kill.store(false, Ordering::Release);
    }

    /// Renderer progress in percent.
    pub fn progress(&self) -> i32 {
        self.progress.load(Ordering::Acquire)
    }

    /// Called from renderer callbacks when no telemetry is connected.
    pub fn set_progress(&self, percent: i32) {
        self.progress.store(percent, Ordering::Release);
    }

    pub fn reset_progress(&self) {
        self.set_progress(0);
    }

    /// Clears all values for a new render.
    pub fn reset(&self) {
        self.live.lock().reset();
        self.reset_progress();
    }

    pub fn set_export_stats(&self, label: &str, progress: f32) {
        self.live.lock().set_export_stats(label, progress);
    }

    /// Copy of the decoded values.
    pub fn snapshot(&self) -> LiveStats {
        self.live.lock().clone()
    }

    /// Pulls the latest payloads, decodes them and queues the status text.
    pub fn update_payloads(&self, context: &RenderContext, events: &EventQueue) {
        if self.is_connected()
            && let Some(latest) = self.client.pull_data()
        {
            match serde_json::from_str::<serde_json::Value>(&latest) {
                Ok(data) => {
                    let progress = self.live.lock().update(&data, &mut |metric| {
                        self.client.enable_metric(metric, self.metric_interval_ms)
                    });
                    if let Some(progress) = progress {
                        self.set_progress(progress);
                    }
                }
                Err(err) => log::debug!("Could not decode stats payload JSON: {}", err),
            }
        }
        self.draw_stats(context, events);
    }

    /// Queues status text for the current render state.
    pub fn draw_stats(&self, context: &RenderContext, events: &EventQueue) {
        if context.is_exporting_state() {
            self.draw_export_stats(context, events);
        } else {
            self.draw_render_stats(context, events);
        }
    }

    fn draw_export_stats(&self, context: &RenderContext, events: &EventQueue) {
        let (label, progress) = {
            let live = self.live.lock();
            let (label, progress) = live.export_stats();
            (label.to_string(), progress)
        };
        let percent = (progress * 100.0) as i32;
        if context.is_interactive_running() {
            events.push(RenderEvent::Stats {
                title: INTERACTIVE_TITLE.into(),
                info: format!("\n{}: {}%", label, percent),
            });
        } else {
            events.push(RenderEvent::Stats {
                title: label,
                info: format!("{}%", percent),
            });
            events.push(RenderEvent::Progress(progress));
        }
    }

    fn draw_render_stats(&self, context: &RenderContext, events: &EventQueue) {
        if !context.is_render_running() {
            return;
        }
        let connected = self.is_connected();
        let live = self.live.lock();
        let (iterations, max_samples) = live.iterations();

        if context.is_interactive_running() {
            let mut message = String::new();
            if connected {
                for label in self.draw_labels {
                    let value = live.get(label).unwrap_or(NO_VALUE);
                    message.push_str(&format!("\n{}: {}", label, value));
                }
                message.push_str(&format!("\nIterations: {} / {}", iterations, max_samples));
            }
            events.push(RenderEvent::Stats {
                title: INTERACTIVE_TITLE.into(),
                info: message,
            });
            return;
        }

        let message = if connected {
            let mut message = String::new();
            for label in BASIC_STATS {
                let value = live.get(label).unwrap_or(NO_VALUE);
                message.push_str(&format!("{}: {} ", label, value));
            }
            message.push_str(&format!("Iterations: {} / {} ", iterations, max_samples));
            message
        } else {
            NO_CONNECTION.to_string()
        };
        let progress = self.progress();
        events.push(RenderEvent::Stats {
            title: message,
            info: format!("{}%", progress),
        });
        events.push(RenderEvent::Progress(progress as f32 / 100.0));
    }
}

impl Drop for StatsManager {
    fn drop(&mut self) {
        self.kill_bootstrap();
    }
}

fn bootstrap(
    client: &dyn StatsClient,
    kill: &AtomicBool,
    server_id: &str,
    retry: Duration,
    metric_interval_ms: u64,
) {
    while !client.is_connected() {
        if kill.load(Ordering::Acquire) {
            log::debug!("Stats bootstrap thread killed");
            return;
        }
        client.connect(server_id);
        std::thread::sleep(retry);
        if client.failed_to_connect() {
            log::debug!(
                "Failed to connect to stats server: {}",
                client.status_string()
            );
        }
    }

    log::debug!("Connected to stats server. Declaring interest");
    for (metric, _) in LIVE_METRICS {
        if let Some(metric) = metric {
            client.enable_metric(metric, metric_interval_ms);
        }
    }
}
