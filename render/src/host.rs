//! The host application's render surface.
//!
//! [`HostEngine`] is the host-side render handle: status text, progress,
//! render result passes and the cancel query. The driver only calls it from
//! the thread that runs a render or from
//! [`RenderDriver::process_events`](crate::RenderDriver::process_events).

use parking_lot::Mutex;

use crate::display::PixelBuffer;

/// One pass of the render result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPass {
    pub name: String,
    pub channels: usize,
}

pub trait HostEngine: Send + Sync {
    /// Whether the user asked to cancel.
    fn test_break(&self) -> bool;

    /// Shows a one-line error to the user.
    fn report_error(&self, message: &str);

    fn update_stats(&self, title: &str, info: &str);

    /// Progress in `0.0..=1.0`.
    fn update_progress(&self, progress: f32);

    /// Starts a render result of `width` x `height` with `passes`.
    fn begin_result(&self, width: u32, height: u32, passes: &[ResultPass]);

    fn update_result(&self, pass: usize, buffer: &PixelBuffer);

    fn end_result(&self);

    /// Requests a viewport repaint. Returns false once viewport shading is
    /// no longer rendered.
    fn tag_redraw(&self) -> bool;
}

#[derive(Debug, Default)]
struct Recorded {
    errors: Vec<String>,
    stats: Vec<(String, String)>,
    progress: Vec<f32>,
    passes: Vec<ResultPass>,
    results_begun: usize,
    result_updates: Vec<(usize, PixelBuffer)>,
    results_ended: usize,
    redraws: usize,
    break_requested: bool,
    viewport_closed: bool,
}

/// Host engine with no UI. Records every call for later inspection.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    recorded: Mutex<Recorded>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`HostEngine::test_break`] return true.
    pub fn request_break(&self) {
        self.recorded.lock().break_requested = true;
    }

    /// Simulates the user switching viewport shading away from rendered.
    pub fn close_viewport(&self) {
        self.recorded.lock().viewport_closed = true;
    }

    pub fn errors(&self) -> Vec<String> {
        self.recorded.lock().errors.clone()
    }

    pub fn stats(&self) -> Vec<(String, String)> {
        self.recorded.lock().stats.clone()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.recorded.lock().progress.clone()
    }

    pub fn passes(&self) -> Vec<ResultPass> {
        self.recorded.lock().passes.clone()
    }

    pub fn results_begun(&self) -> usize {
        self.recorded.lock().results_begun
    }

    pub fn results_ended(&self) -> usize {
        self.recorded.lock().results_ended
    }

    /// Last buffer written to `pass`.
    pub fn last_result(&self, pass: usize) -> Option<PixelBuffer> {
        self.recorded
            .lock()
            .result_updates
            .iter()
            .rev()
            .find(|(index, _)| *index == pass)
            .map(|(_, buffer)| buffer.clone())
    }

    pub fn result_updates(&self) -> usize {
        self.recorded.lock().result_updates.len()
    }

    pub fn redraws(&self) -> usize {
        self.recorded.lock().redraws
    }
}

impl HostEngine for HeadlessEngine {
    fn test_break(&self) -> bool {
        self.recorded.lock().break_requested
    }

    fn report_error(&self, message: &str) {
        log::error!("{}", message);
        self.recorded.lock().errors.push(message.to_string());
    }

    fn update_stats(&self, title: &str, info: &str) {
        self.recorded
            .lock()
            .stats
            .push((title.to_string(), info.to_string()));
    }

    fn update_progress(&self, progress: f32) {
        self.recorded.lock().progress.push(progress);
    }

    fn begin_result(&self, width: u32, height: u32, passes: &[ResultPass]) {
        log::debug!("Result {}x{} with {} pass(es)", width, height, passes.len());
        let mut recorded = self.recorded.lock();
        recorded.results_begun += 1;
        recorded.passes = passes.to_vec();
    }

    fn update_result(&self, pass: usize, buffer: &PixelBuffer) {
        self.recorded
            .lock()
            .result_updates
            .push((pass, buffer.clone()));
    }

    fn end_result(&self) {
        self.recorded.lock().results_ended += 1;
    }

    fn tag_redraw(&self) -> bool {
        let mut recorded = self.recorded.lock();
        if recorded.viewport_closed {
            return false;
        }
        recorded.redraws += 1;
        true
    }
}
