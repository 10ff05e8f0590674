//! Render context: the mode flag set and render state shared by every
//! component of a render session.
//!
//! The context is read from several threads at once (the render worker, the
//! stats poller, the viewport draw thread and renderer event callbacks), so
//! both halves are stored in atomics. The mode is a typed [`RenderMode`] flag
//! set; clearing a flag removes it from the typed set rather than masking with
//! a hand-maintained inverse constant.
//!
//! # Lifecycle
//!
//! ```text
//! stopped -> running + exporting -> running + rendering -> (denoising) -> stopped
//! ```
//!
//! No transition table is enforced here. The render driver sequences the
//! calls; this type only stores and answers.
//!
//! # Example
//!
//! ```ignore
//! let ctx = RenderContext::new();
//! ctx.set_mode(RenderMode::INTERACTIVE_RUNNING);
//! ctx.set_mode_append(RenderMode::RENDER_RUNNING);
//! ctx.set_render_state(RenderState::Rendering);
//! assert!(ctx.is_interactive_running());
//! ctx.stop();
//! assert!(!ctx.is_render_running());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Orthogonal render mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderMode: u32 {
        /// A render of any kind is running.
        const RENDER_RUNNING = 1 << 0;
        /// An interactive (IPR) session is running.
        const INTERACTIVE_RUNNING = 1 << 1;
        /// The interactive session draws into the host viewport.
        const VIEWPORT_RENDERING = 1 << 2;
        /// A material preview swatch is rendering.
        const SWATCH_RENDERING = 1 << 3;
        /// The XPU render variant is in use.
        const IS_XPU = 1 << 4;
        /// The renderer is producing pixels and the pull loop should keep going.
        const IS_LIVE_RENDERING = 1 << 5;
        /// The live image is still converging.
        const IS_REFINING = 1 << 6;
        /// Batch render launched from a background (command line) host.
        const FOR_BACKGROUND = 1 << 7;
        /// Output goes somewhere other than the host display.
        const IS_EXTERNAL = 1 << 8;
        /// Bake render.
        const IS_BAKE_MODE = 1 << 9;
        /// Scene archive (RIB) export.
        const IS_RIB_MODE = 1 << 10;
    }
}

impl Default for RenderMode {
    fn default() -> Self {
        Self::empty()
    }
}

/// Mutually exclusive render state.
///
/// Only meaningful while [`RenderMode::RENDER_RUNNING`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RenderState {
    #[default]
    Stopped = 0,
    Exporting = 1,
    Rendering = 2,
    Denoising = 3,
}

impl RenderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Exporting,
            2 => Self::Rendering,
            3 => Self::Denoising,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Exporting => f.write_str("exporting"),
            Self::Rendering => f.write_str("rendering"),
            Self::Denoising => f.write_str("denoising"),
        }
    }
}

/// Current render mode and render state.
///
/// Cannot fail; every operation is a plain atomic load or store. Share it
/// between threads behind an `Arc`.
#[derive(Default)]
pub struct RenderContext {
    mode: AtomicU32,
    render_state: AtomicU8,
}

impl RenderContext {
    /// Creates a stopped context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the mode flags.
    #[inline]
    pub fn mode(&self) -> RenderMode {
        RenderMode::from_bits_truncate(self.mode.load(Ordering::Acquire))
    }

    /// Returns the current render state.
    #[inline]
    pub fn render_state(&self) -> RenderState {
        RenderState::from_u8(self.render_state.load(Ordering::Acquire))
    }

    /// Replaces the mode flags.
    pub fn set_mode(&self, mode: RenderMode) {
        self.mode.store(mode.bits(), Ordering::Release);
    }

    /// ORs `mode` into the current flags.
    pub fn set_mode_append(&self, mode: RenderMode) {
        self.mode.fetch_or(mode.bits(), Ordering::AcqRel);
    }

    /// Keeps only the flags present in `mode`.
    pub fn set_mode_and(&self, mode: RenderMode) {
        self.mode.fetch_and(mode.bits(), Ordering::AcqRel);
    }

    /// Clears the given flags, leaving all others untouched.
    pub fn clear_mode(&self, mode: RenderMode) {
        self.mode.fetch_and(!mode.bits(), Ordering::AcqRel);
    }

    pub fn set_render_state(&self, state: RenderState) {
        self.render_state.store(state as u8, Ordering::Release);
    }

    /// Stores the stopped render state, then clears the mode. The two stores
    /// are separate, so a reader that sees an empty mode also sees
    /// [`RenderState::Stopped`].
    pub fn stop(&self) {
        self.set_render_state(RenderState::Stopped);
        self.set_mode(RenderMode::empty());
    }

    pub fn set_not_live_rendering(&self) {
        self.clear_mode(RenderMode::IS_LIVE_RENDERING);
    }

    /// Called from the renderer's live-render event while the image converges.
    pub fn set_is_refining(&self) {
        self.set_mode_append(RenderMode::IS_REFINING);
    }

    /// Called from the renderer's live-render event once the image settles.
    pub fn set_is_not_refining(&self) {
        self.clear_mode(RenderMode::IS_REFINING);
    }

    #[inline]
    fn has(&self, flag: RenderMode) -> bool {
        self.mode().contains(flag)
    }

    #[inline]
    pub fn is_render_running(&self) -> bool {
        self.has(RenderMode::RENDER_RUNNING)
    }

    #[inline]
    pub fn is_interactive_running(&self) -> bool {
        self.has(RenderMode::INTERACTIVE_RUNNING)
    }

    #[inline]
    pub fn is_viewport_rendering(&self) -> bool {
        self.has(RenderMode::VIEWPORT_RENDERING)
    }

    #[inline]
    pub fn is_swatch_rendering(&self) -> bool {
        self.has(RenderMode::SWATCH_RENDERING)
    }

    #[inline]
    pub fn is_xpu(&self) -> bool {
        self.has(RenderMode::IS_XPU)
    }

    #[inline]
    pub fn is_live_rendering(&self) -> bool {
        self.has(RenderMode::IS_LIVE_RENDERING)
    }

    #[inline]
    pub fn is_refining(&self) -> bool {
        self.has(RenderMode::IS_REFINING)
    }

    #[inline]
    pub fn is_for_background(&self) -> bool {
        self.has(RenderMode::FOR_BACKGROUND)
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.has(RenderMode::IS_EXTERNAL)
    }

    #[inline]
    pub fn is_bake_mode(&self) -> bool {
        self.has(RenderMode::IS_BAKE_MODE)
    }

    #[inline]
    pub fn is_rib_mode(&self) -> bool {
        self.has(RenderMode::IS_RIB_MODE)
    }

    #[inline]
    pub fn is_exporting_state(&self) -> bool {
        self.render_state() == RenderState::Exporting
    }

    #[inline]
    pub fn is_rendering_state(&self) -> bool {
        self.render_state() == RenderState::Rendering
    }

    #[inline]
    pub fn is_denoising_state(&self) -> bool {
        self.render_state() == RenderState::Denoising
    }

    /// A batch render that has finished exporting and is producing pixels.
    #[inline]
    pub fn is_regular_rendering(&self) -> bool {
        self.is_rendering_state() && !self.is_interactive_running()
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("mode", &self.mode())
            .field("render_state", &self.render_state())
            .finish()
    }
}
