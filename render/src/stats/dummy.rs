//! In-memory stats client for tests and headless runs.

use std::sync::Arc;

use parking_lot::Mutex;

use super::StatsClient;

#[derive(Debug, Default)]
struct DummyStatsState {
    connect_after: Option<usize>,
    attempts: usize,
    connected: bool,
    server_id: Option<String>,
    enabled: Vec<(String, u64)>,
    payload: Option<String>,
    disconnects: usize,
}

/// In-memory stats client. Clones share state.
#[derive(Debug, Clone)]
pub struct DummyStatsClient {
    state: Arc<Mutex<DummyStatsState>>,
}

impl DummyStatsClient {
    /// Connects on the first request.
    pub fn new() -> Self {
        Self::connecting_after(1)
    }

    /// Connects once `attempts` connection requests have been made.
    pub fn connecting_after(attempts: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(DummyStatsState {
                connect_after: Some(attempts.max(1)),
                ..Default::default()
            })),
        }
    }

    /// Never connects.
    pub fn unreachable() -> Self {
        Self {
            state: Arc::new(Mutex::new(DummyStatsState::default())),
        }
    }

    /// Payload document returned by the next pulls.
    pub fn set_payload(&self, json: impl Into<String>) {
        self.state.lock().payload = Some(json.into());
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    pub fn server_id(&self) -> Option<String> {
        self.state.lock().server_id.clone()
    }

    pub fn enabled_metrics(&self) -> Vec<(String, u64)> {
        self.state.lock().enabled.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }
}

impl Default for DummyStatsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsClient for DummyStatsClient {
    fn connect(&self, server_id: &str) {
        let mut state = self.state.lock();
        if state.connected && state.server_id.as_deref() == Some(server_id) {
            return;
        }
        state.attempts += 1;
        state.server_id = Some(server_id.to_string());
        if let Some(after) = state.connect_after
            && state.attempts >= after
        {
            state.connected = true;
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn failed_to_connect(&self) -> bool {
        let state = self.state.lock();
        state.connect_after.is_none() && state.attempts > 0
    }

    fn status_string(&self) -> String {
        let state = self.state.lock();
        if state.connected {
            "Connected".into()
        } else if state.connect_after.is_none() && state.attempts > 0 {
            "Connection Failed".into()
        } else {
            "Disconnected".into()
        }
    }

    fn enable_metric(&self, metric: &str, interval_ms: u64) {
        self.state
            .lock()
            .enabled
            .push((metric.to_string(), interval_ms));
    }

    fn pull_data(&self) -> Option<String> {
        self.state.lock().payload.clone()
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.server_id = None;
            state.disconnects += 1;
        }
    }
}
