//! Denoiser seam.

use crate::display::PixelBuffer;

/// Post-render denoise filter applied to the final result passes.
pub trait Denoiser: Send + Sync {
    /// Prepares the filter for a `width` x `height` result.
    fn bootstrap(&self, width: u32, height: u32, asymmetry: f32, use_color_pass: bool);

    /// Returns denoised copies of `passes`, or `None` when the filter could
    /// not run and the passes should be kept as rendered.
    fn denoise(&self, passes: &[PixelBuffer]) -> Option<Vec<PixelBuffer>>;
}

/// Returns the passes unchanged.
#[derive(Debug, Default)]
pub struct NullDenoiser;

impl Denoiser for NullDenoiser {
    fn bootstrap(&self, width: u32, height: u32, asymmetry: f32, use_color_pass: bool) {
        log::trace!(
            "NullDenoiser: bootstrap {}x{} (asymmetry {}, color pass {})",
            width,
            height,
            asymmetry,
            use_color_pass
        );
    }

    fn denoise(&self, passes: &[PixelBuffer]) -> Option<Vec<PixelBuffer>> {
        Some(passes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_denoiser_passes_through() {
        let passes = vec![PixelBuffer::empty(2, 2, 4), PixelBuffer::empty(2, 2, 1)];
        let denoiser = NullDenoiser;
        denoiser.bootstrap(2, 2, 0.0, false);
        assert_eq!(denoiser.denoise(&passes), Some(passes));
    }
}
