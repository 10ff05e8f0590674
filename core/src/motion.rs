//! Shutter sampling and image-region helpers.

/// Where the shutter interval sits relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShutterTiming {
    FrameOpen,
    #[default]
    FrameCenter,
    FrameClose,
}

impl ShutterTiming {
    /// Offset of the first sample, in frames.
    fn start(self, interval: f32) -> f32 {
        match self {
            Self::FrameCenter => -0.5 * interval,
            Self::FrameClose => -interval,
            Self::FrameOpen => 0.0,
        }
    }
}

/// Motion sample times (in frames, relative to the current frame) for `segs`
/// segments.
///
/// Zero segments disables motion blur. A single segment yields only the
/// shutter start.
pub fn subframes(segs: u32, shutter_angle: f32, timing: ShutterTiming) -> Vec<f32> {
    if segs == 0 {
        return Vec::new();
    }
    let interval = shutter_angle / 360.0;
    let start = timing.start(interval);
    if segs == 1 {
        return vec![start];
    }
    let step = interval / (segs - 1) as f32;
    (0..segs).map(|i| start + i as f32 * step).collect()
}

/// Scale applied to a per-second velocity to get the displacement across
/// the open shutter.
pub fn velocity_motion_scale(shutter_angle: f32, fps: f32, fps_base: f32) -> f32 {
    let shutter_interval = shutter_angle / 360.0;
    shutter_interval / (fps / fps_base)
}

/// Output resolution after applying the resolution percentage.
pub fn scaled_resolution(resolution: (u32, u32), percentage: u32) -> (u32, u32) {
    let scale = percentage as f32 * 0.01;
    (
        (resolution.0 as f32 * scale) as u32,
        (resolution.1 as f32 * scale) as u32,
    )
}

/// Normalised render border, `0..=1` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderBorder {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Default for RenderBorder {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 1.0,
            min_y: 0.0,
            max_y: 1.0,
        }
    }
}

/// Pixel region covered by a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRegion {
    pub size: (u32, u32),
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl RenderRegion {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            start: (0, 0),
            end: (width, height),
        }
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.size.0 as usize * self.size.1 as usize
    }
}

/// Pixel region for an optional border on a `width` x `height` image.
pub fn render_region(width: u32, height: u32, border: Option<&RenderBorder>) -> RenderRegion {
    let Some(border) = border else {
        return RenderRegion::full(width, height);
    };
    let crop_x = (width as f32 * (border.max_x - border.min_x)).ceil() as u32;
    let crop_y = (height as f32 * (border.max_y - border.min_y)).ceil() as u32;
    let start_x = (width as f32 * border.min_x) as u32;
    let start_y = (height as f32 * border.min_y) as u32;
    RenderRegion {
        size: (crop_x, crop_y),
        start: (start_x, start_y),
        end: (start_x + crop_x, start_y + crop_y),
    }
}
