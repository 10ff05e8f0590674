//! Cross-thread event queue.
//!
//! Renderer callbacks, the stats thread and the viewport draw thread never
//! call into the host. They push a [`RenderEvent`] here and the thread that
//! owns the host drains the queue in
//! [`RenderDriver::process_events`](crate::RenderDriver::process_events).

use std::fmt;

use parking_lot::Mutex;

/// Something the host should do on its own thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Replace the status text.
    Stats { title: String, info: String },
    /// Progress in `0.0..=1.0`.
    Progress(f32),
    /// The viewport has a new buffer to draw.
    Redraw,
    /// One-line error for the user.
    Error(String),
}

/// Thread-safe FIFO of [`RenderEvent`]s. [`push`](Self::push) only needs
/// `&self`.
pub struct EventQueue {
    queue: Mutex<Vec<RenderEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, event: RenderEvent) {
        self.queue.lock().push(event);
    }

    /// Takes every queued event in submission order.
    pub fn drain(&self) -> Vec<RenderEvent> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.len())
            .finish()
    }
}
