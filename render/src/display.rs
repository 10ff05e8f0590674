//! Display buffers pulled from the renderer.

use scenebridge_core::motion::RenderRegion;

use crate::renderer::Renderer;

/// Flat, channel-interleaved float image.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Zero-filled image.
    pub fn empty(width: u32, height: u32, channels: usize) -> Self {
        let len = width as usize * height as usize * channels;
        Self::new(width, height, channels, vec![0.0; len])
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Channels of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let offset = (y as usize * self.width as usize + x as usize) * self.channels;
        &self.data[offset..offset + self.channels]
    }

    /// Converts to `channels` per pixel. Missing channels are filled with
    /// 1.0, extra channels are dropped.
    pub fn adapt_channels(&self, channels: usize) -> PixelBuffer {
        if channels == self.channels {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.pixel_count() * channels);
        for pixel in self.data.chunks_exact(self.channels.max(1)) {
            for c in 0..channels {
                data.push(pixel.get(c).copied().unwrap_or(1.0));
            }
        }
        PixelBuffer::new(self.width, self.height, channels, data)
    }

    /// The pixels inside `region`, clamped to the image.
    pub fn crop(&self, region: &RenderRegion) -> PixelBuffer {
        let x0 = region.start.0.min(self.width);
        let y0 = region.start.1.min(self.height);
        let x1 = region.end.0.min(self.width).max(x0);
        let y1 = region.end.1.min(self.height).max(y0);
        if (x0, y0, x1, y1) == (0, 0, self.width, self.height) {
            return self.clone();
        }

        let row_len = (x1 - x0) as usize * self.channels;
        let mut data = Vec::with_capacity(row_len * (y1 - y0) as usize);
        for y in y0..y1 {
            let start = (y as usize * self.width as usize + x0 as usize) * self.channels;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        PixelBuffer::new(x1 - x0, y1 - y0, self.channels, data)
    }
}

/// Number of channels a result pass gets for a display with `channels`.
pub fn pass_channels(channels: usize) -> usize {
    match channels {
        0 => 1,
        1..=3 => channels,
        _ => 4,
    }
}

/// Pulls display image `image` at `width` x `height`, adapts it to
/// `channels` and crops it to `region`.
///
/// Returns `None` while the renderer has nothing for that image.
pub fn pull_image(
    renderer: &dyn Renderer,
    image: usize,
    width: u32,
    height: u32,
    channels: usize,
    region: &RenderRegion,
) -> Option<PixelBuffer> {
    let source_channels = renderer.num_channels(image);
    if source_channels == 0 {
        return None;
    }
    let data = renderer.pull_buffer(image, width, height)?;
    if data.len() != width as usize * height as usize * source_channels {
        log::debug!(
            "Display {} returned {} floats for {}x{}x{}",
            image,
            data.len(),
            width,
            height,
            source_channels
        );
        return None;
    }
    let buffer = PixelBuffer::new(width, height, source_channels, data);
    Some(buffer.adapt_channels(channels).crop(region))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenebridge_core::motion::{RenderBorder, render_region};

    fn ramp(width: u32, height: u32, channels: usize) -> PixelBuffer {
        let len = width as usize * height as usize * channels;
        PixelBuffer::new(width, height, channels, (0..len).map(|v| v as f32).collect())
    }

    #[test]
    fn missing_channels_are_padded_with_one() {
        let rgb = PixelBuffer::new(1, 2, 3, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let rgba = rgb.adapt_channels(4);
        assert_eq!(rgba.data, vec![0.1, 0.2, 0.3, 1.0, 0.4, 0.5, 0.6, 1.0]);
    }

    #[test]
    fn extra_channels_are_dropped() {
        let rgba = ramp(2, 1, 4);
        let rg = rgba.adapt_channels(2);
        assert_eq!(rg.channels, 2);
        assert_eq!(rg.data, vec![0.0, 1.0, 4.0, 5.0]);
    }

    #[test]
    fn crop_to_border() {
        let image = ramp(4, 4, 1);
        let border = RenderBorder {
            min_x: 0.25,
            max_x: 0.75,
            min_y: 0.5,
            max_y: 1.0,
        };
        let region = render_region(4, 4, Some(&border));
        let cropped = image.crop(&region);
        assert_eq!((cropped.width, cropped.height), (2, 2));
        assert_eq!(cropped.data, vec![9.0, 10.0, 13.0, 14.0]);
    }

    #[test]
    fn full_region_is_unchanged() {
        let image = ramp(3, 2, 2);
        assert_eq!(image.crop(&RenderRegion::full(3, 2)), image);
    }

    #[test]
    fn pixel_reads_interleaved_channels() {
        let image = ramp(2, 2, 3);
        assert_eq!(image.pixel(1, 1), &[9.0, 10.0, 11.0]);
    }

    #[test]
    fn pass_channel_rules() {
        assert_eq!(pass_channels(6), 4);
        assert_eq!(pass_channels(4), 4);
        assert_eq!(pass_channels(3), 3);
        assert_eq!(pass_channels(2), 2);
        assert_eq!(pass_channels(1), 1);
        assert_eq!(pass_channels(0), 1);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn pull_image_adapts_and_crops() {
        use crate::renderer::DummyRenderer;

        let renderer = DummyRenderer::new();
        renderer.set_display_channels(vec![3]);
        renderer.set_fill(0.5);
        let region = render_region(4, 2, None);
        let image = pull_image(&renderer, 0, 4, 2, 4, &region).unwrap();
        assert_eq!(image.channels, 4);
        assert_eq!(image.pixel(3, 1), &[0.5, 0.5, 0.5, 1.0]);
        assert!(pull_image(&renderer, 1, 4, 2, 4, &region).is_none());
    }
}
