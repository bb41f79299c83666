use serde::{Deserialize, Serialize};

use crate::config::ZoomConfig;
use crate::types::TimeMs;

/// Unit-less timeline magnification. Always within `[1, max_level]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ZoomLevel(u32);

impl ZoomLevel {
    pub const MIN: u32 = 1;

    /// Clamp `level` into the legal range. Out-of-range requests are not
    /// errors.
    pub fn new(level: i64, config: &ZoomConfig) -> Self {
        let max = config.max_level.max(Self::MIN) as i64;
        Self(level.clamp(Self::MIN as i64, max) as u32)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn zoom_in(self, config: &ZoomConfig) -> Self {
        Self::new(self.0 as i64 + config.step as i64, config)
    }

    pub fn zoom_out(self, config: &ZoomConfig) -> Self {
        Self::new(self.0 as i64 - config.step as i64, config)
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        Self(10)
    }
}

/// Linear mapping between timeline durations and on-screen pixels.
///
/// At zoom level 1 one viewport width covers `viewport_span_at_level_1`
/// (1200 s by default); each zoom level divides that span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMapper {
    zoom: ZoomLevel,
    viewport_width: u32,
    span: i64,
}

impl PixelMapper {
    pub fn new(zoom: ZoomLevel, viewport_width: u32, config: &ZoomConfig) -> Self {
        Self {
            zoom,
            viewport_width,
            span: config.viewport_span_at_level_1.0.max(1),
        }
    }

    pub fn zoom(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    fn scale(&self) -> i128 {
        self.zoom.get() as i128 * self.viewport_width as i128
    }

    pub fn time_to_pixels(&self, duration: TimeMs) -> i64 {
        (self.scale() * duration.0 as i128 / self.span as i128) as i64
    }

    pub fn pixels_to_time(&self, pixels: i64) -> TimeMs {
        let scale = self.scale();
        if scale == 0 {
            return TimeMs::ZERO;
        }
        TimeMs((pixels as i128 * self.span as i128 / scale) as i64)
    }

    /// Milliseconds covered by one pixel, rounded up.
    pub fn ms_per_pixel(&self) -> i64 {
        let scale = self.scale();
        if scale == 0 {
            return self.span;
        }
        let span = self.span as i128;
        ((span + scale - 1) / scale) as i64
    }

    /// Full scrollable width for a movie of `total`: the content plus half a
    /// viewport of padding on each side.
    pub fn timeline_width(&self, total: TimeMs) -> i64 {
        self.viewport_width as i64 + self.time_to_pixels(total)
    }

    /// Padding before the first entry (half the viewport).
    pub fn leading_padding(&self) -> i64 {
        self.viewport_width as i64 / 2
    }
}
