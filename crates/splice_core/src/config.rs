use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::types::TimeMs;

/// Duration rules applied while editing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditLimits {
    pub min_video_clip_duration: TimeMs,
    pub min_image_duration: TimeMs,
    pub max_image_duration: TimeMs,
    pub min_transition_duration: TimeMs,
    pub max_transition_duration: TimeMs,
    /// Changes smaller than this are treated as jitter.
    pub time_tolerance: TimeMs,
}

impl Default for EditLimits {
    fn default() -> Self {
        Self {
            min_video_clip_duration: TimeMs(1_000),
            min_image_duration: TimeMs(1_000),
            max_image_duration: TimeMs(6_000),
            min_transition_duration: TimeMs(500),
            max_transition_duration: TimeMs(3_000),
            time_tolerance: TimeMs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoomConfig {
    pub max_level: u32,
    pub step: u32,
    /// Timeline span covered by one viewport width at zoom level 1.
    pub viewport_span_at_level_1: TimeMs,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            max_level: 120,
            step: 2,
            viewport_span_at_level_1: TimeMs(1_200_000),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DragConfig {
    pub hysteresis_px: i32,
    pub min_interval: TimeMs,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            hysteresis_px: 35,
            min_interval: TimeMs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// How often an element refreshes its thumbnails while the preview plays.
    pub playback_refresh_interval: TimeMs,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            playback_refresh_interval: TimeMs(10_000),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub limits: EditLimits,
    pub zoom: ZoomConfig,
    pub drag: DragConfig,
    pub thumbnails: ThumbnailConfig,
}

impl EditorConfig {
    /// Load a config file. Missing fields fall back to their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&data)?;
        Ok(config)
    }
}
