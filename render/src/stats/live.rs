//! Live metric decoding.

use serde_json::Value;

/// Metric paths and the labels they are shown under, in display order.
/// A path without a label is tracked but not shown; a label without a path
/// is derived from another metric.
pub const LIVE_METRICS: &[(Option<&str>, Option<&str>)] = &[
    (Some("/rman/riley.variant"), Some("Variant")),
    (Some("/system.processTime"), Some("CPU%")),
    (Some("/system.processMemory"), Some("Memory")),
    (Some("/rman/renderer@isRendering"), None),
    (Some("/rman/renderer@progress"), None),
    (Some("/rman@iterationComplete"), None),
    (Some("/rman.timeToFirstRaytrace"), Some("First Ray")),
    (Some("/rman.timeToFirstPixel"), Some("First Pixel")),
    (Some("/rman.timeToFirstIteration"), Some("First Iteration")),
    (Some("/rman/raytracing.numRays"), Some("Rays/Sec")),
    (None, Some("Total Rays")),
    (
        Some("/rman/texturing/sampling:time.total"),
        Some("Texturing Time"),
    ),
    (Some("/rman/shading/hit/bxdf:time.total"), Some("Shading Time")),
    (
        Some("/rman/raytracing/intersection/allhits:time.total"),
        Some("Raytracing Time"),
    ),
    (Some("/rman/raytracing/camera.numRays"), Some("Camera Rays")),
    (
        Some("/rman/raytracing/transmission.numRays"),
        Some("Transmission Rays"),
    ),
    (Some("/rman/raytracing/light.numRays"), Some("Light Rays")),
    (Some("/rman/raytracing/indirect.numRays"), Some("Indirect Rays")),
    (Some("/rman/raytracing/photon.numRays"), Some("Photon Rays")),
];

const TIMER_METRICS: &[&str] = &[
    "/rman.timeToFirstRaytrace",
    "/rman.timeToFirstPixel",
    "/rman.timeToFirstIteration",
    "/rman/texturing/sampling:time.total",
    "/rman/shading/hit/bxdf:time.total",
    "/rman/raytracing/intersection/allhits:time.total",
];

const RAY_TYPE_METRICS: &[&str] = &[
    "/rman/raytracing/camera.numRays",
    "/rman/raytracing/transmission.numRays",
    "/rman/raytracing/light.numRays",
    "/rman/raytracing/indirect.numRays",
    "/rman/raytracing/photon.numRays",
];

/// Placeholder shown before a metric arrives.
pub const NO_VALUE: &str = "--";

/// Ray count metrics are sampled at 60Hz (1000 / 16 ms).
const RAY_SAMPLE_RATE: f64 = 62.5;

const ONE_MB: f64 = 1024.0 * 1024.0;

/// `"{current}% (Avg {average}%)"`.
pub fn format_cpu(current: f64, average: f64) -> String {
    format!("{:.2}% (Avg {:.2}%)", current, average)
}

/// Resident memory in megabytes.
pub fn format_memory(bytes: f64) -> String {
    format!("{:.2} MB", bytes / ONE_MB)
}

pub fn format_rays_per_second(rays_per_second: f64) -> String {
    if rays_per_second > 1e9 {
        format!("{:.3}B", rays_per_second / 1e9)
    } else if rays_per_second > 1e6 {
        format!("{:.3}M", rays_per_second / 1e6)
    } else if rays_per_second > 1e3 {
        format!("{:.3}K", rays_per_second / 1e3)
    } else {
        format!("{:.3}", rays_per_second)
    }
}

pub fn format_timer(seconds: f64) -> String {
    if seconds >= 60.0 {
        let minutes = (seconds / 60.0).floor();
        format!("{} min {:.4} sec", minutes as i64, seconds - minutes * 60.0)
    } else {
        format!("{:.4} sec", seconds)
    }
}

/// `"{rays} ({pct}%)"` of `total`, with 0% while the total is unknown.
pub fn format_ray_share(rays: u64, total: u64) -> String {
    let pct = if total > 0 {
        (rays as f64 / total as f64 * 100.0) as i64
    } else {
        0
    };
    format!("{} ({}%)", rays, pct)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decoded metric values plus the counters derived from them.
#[derive(Debug, Clone)]
pub struct LiveStats {
    values: Vec<(&'static str, String)>,
    prev_total_rays: u64,
    prev_total_rays_valid: bool,
    is_rendering: bool,
    iterations: i64,
    max_samples: i64,
    export_label: String,
    export_progress: f32,
}

impl LiveStats {
    pub fn new() -> Self {
        let values = LIVE_METRICS
            .iter()
            .filter_map(|(_, label)| label.map(|label| (label, NO_VALUE.to_string())))
            .collect();
        Self {
            values,
            prev_total_rays: 0,
            prev_total_rays_valid: true,
            is_rendering: false,
            iterations: 0,
            max_samples: 0,
            export_label: "Exporting".into(),
            export_progress: 0.0,
        }
    }

    /// Clears every value for a new render.
    pub fn reset(&mut self) {
        for (_, value) in &mut self.values {
            *value = NO_VALUE.to_string();
        }
        self.prev_total_rays = 0;
        self.prev_total_rays_valid = true;
        self.export_label.clear();
        self.export_progress = 0.0;
        self.is_rendering = true;
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, value)| value.as_str())
    }

    fn set(&mut self, label: &str, value: String) {
        if let Some(entry) = self.values.iter_mut().find(|(l, _)| *l == label) {
            entry.1 = value;
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.is_rendering
    }

    pub fn iterations(&self) -> (i64, i64) {
        (self.iterations, self.max_samples)
    }

    pub fn export_stats(&self) -> (&str, f32) {
        (&self.export_label, self.export_progress)
    }

    pub fn set_export_stats(&mut self, label: &str, progress: f32) {
        self.export_label = label.to_string();
        self.export_progress = progress;
    }

    /// Decodes one payload document.
    ///
    /// `missing` is called with every metric path the document lacks.
    /// Returns the renderer progress when the document carries it.
    pub fn update(&mut self, data: &Value, missing: &mut dyn FnMut(&str)) -> Option<i32> {
        let mut progress = None;
        for (name, label) in LIVE_METRICS {
            let Some(name) = *name else {
                continue;
            };
            let Some(payload) = data.get(name).and_then(|metric| metric.get("payload")) else {
                missing(name);
                continue;
            };
            if payload.is_null() {
                continue;
            }
            let label = label.unwrap_or_default();

            match name {
                "/system.processTime" => {
                    // user, sys, current %, average %
                    if let (Some(current), Some(average)) = (
                        payload.get(2).and_then(as_f64),
                        payload.get(3).and_then(as_f64),
                    ) {
                        self.set(label, format_cpu(current, average));
                    }
                }
                "/system.processMemory" => {
                    // max, resident, ...
                    if let Some(resident) = payload.get(1).and_then(as_f64) {
                        self.set(label, format_memory(resident));
                    }
                }
                "/rman/raytracing.numRays" => {
                    let Some(total) = as_f64(payload) else {
                        continue;
                    };
                    let total = total as u64;
                    if total <= self.prev_total_rays {
                        self.prev_total_rays_valid = false;
                    }
                    if self.prev_total_rays_valid {
                        let diff = (total - self.prev_total_rays) as f64;
                        self.set(label, format_rays_per_second(diff * RAY_SAMPLE_RATE));
                    }
                    self.set("Total Rays", total.to_string());
                    self.prev_total_rays_valid = true;
                    self.prev_total_rays = total;
                }
                "/rman/renderer@isRendering" => {
                    self.is_rendering = payload.as_bool().unwrap_or(false);
                }
                "/rman@iterationComplete" => {
                    if let Some(iteration) = payload.get(0).and_then(as_f64) {
                        self.iterations = iteration as i64;
                    }
                    if let Some(max) = payload.get(1).and_then(as_f64) {
                        self.max_samples = max as i64;
                    }
                }
                "/rman/renderer@progress" => {
                    progress = as_f64(payload).map(|p| p as i32);
                }
                name if TIMER_METRICS.contains(&name) => {
                    if let Some(seconds) = as_f64(payload) {
                        self.set(label, format_timer(seconds));
                    }
                }
                name if RAY_TYPE_METRICS.contains(&name) => {
                    if let Some(rays) = as_f64(payload) {
                        self.set(label, format_ray_share(rays as u64, self.prev_total_rays));
                    }
                }
                _ => self.set(label, display_value(payload)),
            }
        }
        progress
    }
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn decode(stats: &mut LiveStats, data: Value) -> (Option<i32>, Vec<String>) {
        let mut missing = Vec::new();
        let progress = stats.update(&data, &mut |name| missing.push(name.to_string()));
        (progress, missing)
    }

    #[rstest]
    #[case::plain(512.0, "512.000")]
    #[case::kilo(2_500.0, "2.500K")]
    #[case::mega(3_250_000.0, "3.250M")]
    #[case::giga(1_500_000_000.0, "1.500B")]
    fn rays_per_second_units(#[case] rate: f64, #[case] expected: &str) {
        assert_eq!(format_rays_per_second(rate), expected);
    }

    #[rstest]
    #[case::seconds(1.5, "1.5000 sec")]
    #[case::minute(60.0, "1 min 0.0000 sec")]
    #[case::minutes(125.25, "2 min 5.2500 sec")]
    fn timers(#[case] seconds: f64, #[case] expected: &str) {
        assert_eq!(format_timer(seconds), expected);
    }

    #[test]
    fn cpu_and_memory() {
        assert_eq!(format_cpu(87.456, 50.0), "87.46% (Avg 50.00%)");
        assert_eq!(format_memory(3.0 * 1024.0 * 1024.0), "3.00 MB");
    }

    #[test]
    fn ray_share_without_total_is_zero() {
        assert_eq!(format_ray_share(100, 0), "100 (0%)");
        assert_eq!(format_ray_share(25, 100), "25 (25%)");
    }

    #[test]
    fn new_stats_show_placeholders() {
        let stats = LiveStats::new();
        assert_eq!(stats.get("Rays/Sec"), Some(NO_VALUE));
        assert_eq!(stats.get("Total Rays"), Some(NO_VALUE));
        assert_eq!(stats.get("isRendering"), None);
    }

    #[test]
    fn ray_rate_from_count_deltas() {
        let mut stats = LiveStats::new();
        decode(&mut stats, json!({"/rman/raytracing.numRays": {"payload": 1000}}));
        assert_eq!(stats.get("Rays/Sec"), Some("62.500K"));
        assert_eq!(stats.get("Total Rays"), Some("1000"));

        decode(&mut stats, json!({"/rman/raytracing.numRays": {"payload": 1010}}));
        assert_eq!(stats.get("Rays/Sec"), Some("625.000"));
        assert_eq!(stats.get("Total Rays"), Some("1010"));
    }

    #[test]
    fn non_increasing_ray_count_keeps_the_last_rate() {
        let mut stats = LiveStats::new();
        decode(&mut stats, json!({"/rman/raytracing.numRays": {"payload": 1000}}));
        decode(&mut stats, json!({"/rman/raytracing.numRays": {"payload": 1000}}));
        assert_eq!(stats.get("Rays/Sec"), Some("62.500K"));
    }

    #[test]
    fn ray_types_share_the_current_total() {
        let mut stats = LiveStats::new();
        decode(
            &mut stats,
            json!({
                "/rman/raytracing.numRays": {"payload": 200},
                "/rman/raytracing/camera.numRays": {"payload": 50},
            }),
        );
        assert_eq!(stats.get("Camera Rays"), Some("50 (25%)"));
    }

    #[test]
    fn progress_iterations_and_variant() {
        let mut stats = LiveStats::new();
        let (progress, _) = decode(
            &mut stats,
            json!({
                "/rman/renderer@progress": {"payload": "42.7"},
                "/rman@iterationComplete": {"payload": [3, 64]},
                "/rman/renderer@isRendering": {"payload": true},
                "/rman/riley.variant": {"payload": "xpu"},
                "/system.processTime": {"payload": [1.0, 2.0, 12.5, 10.0]},
            }),
        );
        assert_eq!(progress, Some(42));
        assert_eq!(stats.iterations(), (3, 64));
        assert!(stats.is_rendering());
        assert_eq!(stats.get("Variant"), Some("xpu"));
        assert_eq!(stats.get("CPU%"), Some("12.50% (Avg 10.00%)"));
    }

    #[test]
    fn missing_metrics_are_reported() {
        let mut stats = LiveStats::new();
        let (progress, missing) = decode(&mut stats, json!({}));
        assert_eq!(progress, None);
        let tracked = LIVE_METRICS.iter().filter(|(name, _)| name.is_some()).count();
        assert_eq!(missing.len(), tracked);
        assert!(missing.contains(&"/rman/renderer@progress".to_string()));
    }

    #[test]
    fn reset_restores_placeholders() {
        let mut stats = LiveStats::new();
        decode(&mut stats, json!({"/rman/raytracing.numRays": {"payload": 1000}}));
        stats.set_export_stats("Exporting Cube", 0.5);
        stats.reset();
        assert_eq!(stats.get("Total Rays"), Some(NO_VALUE));
        assert_eq!(stats.export_stats(), ("", 0.0));
        assert!(stats.is_rendering());
    }
}
