/// Connection to the renderer's live telemetry server.
///
/// Connecting is asynchronous: [`connect`](Self::connect) only requests a
/// connection and [`is_connected`](Self::is_connected) reports when it is
/// live. Metric values are polled with [`pull_data`](Self::pull_data).
pub trait StatsClient: Send + Sync {
    fn connect(&self, server_id: &str);

    fn is_connected(&self) -> bool;

    fn failed_to_connect(&self) -> bool;

    fn status_string(&self) -> String;

    /// Asks the server to stream `metric` every `interval_ms`.
    fn enable_metric(&self, metric: &str, interval_ms: u64);

    /// Latest cached payloads as a JSON document keyed by metric path.
    fn pull_data(&self) -> Option<String>;

    fn disconnect(&self);
}
