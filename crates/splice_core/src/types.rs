use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::EditLimits;
use crate::error::{CoreError, Result};
use crate::zoom::ZoomLevel;

// ---------------------------------------------------------------------------
// TimeMs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub const ZERO: Self = Self(0);

    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000.0) as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Absolute distance between two instants.
    pub fn abs_diff(self, other: Self) -> Self {
        Self((self.0 - other.0).abs())
    }
}

impl Add for TimeMs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for TimeMs {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for TimeMs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for TimeMs {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for TimeMs {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<i64> for TimeMs {
    type Output = Self;
    fn div(self, rhs: i64) -> Self {
        Self(self.0 / rhs)
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ms = self.0.unsigned_abs();
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

/// Generate a fresh element id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// RenderingMode
// ---------------------------------------------------------------------------

/// How a clip whose aspect ratio differs from the movie is fitted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RenderingMode {
    #[default]
    BlackBorders,
    Stretch,
    Crop,
}

// ---------------------------------------------------------------------------
// ClipSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClipSource {
    /// A decoded video. `begin..end` is the selected window of the source.
    Video {
        source_duration: TimeMs,
        begin: TimeMs,
        end: TimeMs,
    },
    /// A still image shown for `duration`.
    Image { duration: TimeMs },
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// A title/subtitle layer shown during part of a clip. `start` is relative
/// to the beginning of the owning clip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overlay {
    pub id: String,
    pub start: TimeMs,
    pub duration: TimeMs,
    pub title: String,
    pub subtitle: String,
}

impl Overlay {
    pub fn new(start: TimeMs, duration: TimeMs, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            start,
            duration,
            title: title.into(),
            subtitle: String::new(),
        }
    }

    pub fn end(&self) -> TimeMs {
        self.start + self.duration
    }

    /// Shrink or shift the overlay so that it stays inside a clip span of
    /// `clip_duration`.
    pub fn fit_within(&mut self, clip_duration: TimeMs) {
        if self.duration > clip_duration {
            self.duration = clip_duration;
        }
        if self.end() > clip_duration {
            self.start = clip_duration - self.duration;
        }
        if self.start < TimeMs::ZERO {
            self.start = TimeMs::ZERO;
        }
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: String,
    pub name: String,
    /// Media file the clip was created from.
    #[serde(default)]
    pub path: PathBuf,
    pub source: ClipSource,
    pub width: u32,
    pub height: u32,
    pub muted: bool,
    pub rendering_mode: RenderingMode,
    pub overlay: Option<Overlay>,
}

impl Clip {
    /// A video clip using its whole source.
    pub fn video(id: impl Into<String>, source_duration: TimeMs) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            path: PathBuf::new(),
            source: ClipSource::Video {
                source_duration,
                begin: TimeMs::ZERO,
                end: source_duration,
            },
            width: 1920,
            height: 1080,
            muted: false,
            rendering_mode: RenderingMode::default(),
            overlay: None,
        }
    }

    pub fn image(id: impl Into<String>, duration: TimeMs) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            path: PathBuf::new(),
            source: ClipSource::Image { duration },
            width: 1920,
            height: 1080,
            muted: false,
            rendering_mode: RenderingMode::default(),
            overlay: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn is_video(&self) -> bool {
        matches!(self.source, ClipSource::Video { .. })
    }

    pub fn timeline_duration(&self) -> TimeMs {
        match self.source {
            ClipSource::Video { begin, end, .. } => end - begin,
            ClipSource::Image { duration } => duration,
        }
    }

    pub fn boundary_begin(&self) -> TimeMs {
        match self.source {
            ClipSource::Video { begin, .. } => begin,
            ClipSource::Image { .. } => TimeMs::ZERO,
        }
    }

    pub fn boundary_end(&self) -> TimeMs {
        match self.source {
            ClipSource::Video { end, .. } => end,
            ClipSource::Image { duration } => duration,
        }
    }

    /// Full length of the underlying media. Images have no intrinsic length.
    pub fn source_duration(&self) -> Option<TimeMs> {
        match self.source {
            ClipSource::Video { source_duration, .. } => Some(source_duration),
            ClipSource::Image { .. } => None,
        }
    }

    /// Set the selected window. For images only the length of the window is
    /// kept. Values are clamped to the source; callers that need the duration
    /// rules go through `constraints`.
    pub fn set_boundaries(&mut self, new_begin: TimeMs, new_end: TimeMs) {
        match &mut self.source {
            ClipSource::Video {
                source_duration,
                begin,
                end,
            } => {
                let b = new_begin.max(TimeMs::ZERO).min(*source_duration);
                let e = new_end.max(b).min(*source_duration);
                *begin = b;
                *end = e;
            }
            ClipSource::Image { duration } => {
                *duration = (new_end - new_begin).max(TimeMs::ZERO);
            }
        }
        let span = self.timeline_duration();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.fit_within(span);
        }
    }

    /// Like `set_boundaries`, but a window outside the source is rejected
    /// instead of clamped.
    pub fn try_set_boundaries(&mut self, new_begin: TimeMs, new_end: TimeMs) -> Result<()> {
        let fits = match self.source {
            ClipSource::Video { source_duration, .. } => {
                TimeMs::ZERO <= new_begin && new_begin < new_end && new_end <= source_duration
            }
            ClipSource::Image { .. } => new_begin < new_end,
        };
        if !fits {
            return Err(self.invalid(format!("window {new_begin}..{new_end} does not fit the source")));
        }
        self.set_boundaries(new_begin, new_end);
        Ok(())
    }

    /// Videos need `0 <= begin < end <= source_duration`, images a positive
    /// duration.
    pub fn check_source(&self) -> Result<()> {
        match self.source {
            ClipSource::Video {
                source_duration,
                begin,
                end,
            } => {
                if begin < TimeMs::ZERO || begin >= end || end > source_duration {
                    return Err(self.invalid(format!(
                        "window {begin}..{end} does not fit a source of {source_duration}"
                    )));
                }
            }
            ClipSource::Image { duration } => {
                if duration <= TimeMs::ZERO {
                    return Err(self.invalid(format!("image duration {duration} is not positive")));
                }
            }
        }
        Ok(())
    }

    /// `check_source` plus the image duration range of `limits`.
    pub fn validate(&self, limits: &EditLimits) -> Result<()> {
        self.check_source()?;
        if let ClipSource::Image { duration } = self.source {
            if duration < limits.min_image_duration || duration > limits.max_image_duration {
                return Err(self.invalid(format!(
                    "image duration {duration} is outside {}..={}",
                    limits.min_image_duration, limits.max_image_duration
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> CoreError {
        CoreError::InvalidClip {
            clip_id: self.id.clone(),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransitionKind {
    AlphaContour,
    AlphaDiagonal,
    Crossfade,
    FadeBlack,
    SlidingRightOutLeftIn,
    SlidingLeftOutRightIn,
    SlidingTopOutBottomIn,
    SlidingBottomOutTopIn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub id: String,
    pub kind: TransitionKind,
    pub duration: TimeMs,
    /// Clip immediately before the transition, `None` at the sequence head.
    pub after_clip_id: Option<String>,
    /// Clip immediately after the transition, `None` at the sequence tail.
    pub before_clip_id: Option<String>,
}

impl Transition {
    pub fn new(id: impl Into<String>, kind: TransitionKind, duration: TimeMs) -> Self {
        Self {
            id: id.into(),
            kind,
            duration,
            after_clip_id: None,
            before_clip_id: None,
        }
    }

    /// True if the transition sits between two clips rather than at an edge.
    pub fn is_inner(&self) -> bool {
        self.after_clip_id.is_some() && self.before_clip_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// SequenceEntry / Sequence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SequenceEntry {
    Clip(Clip),
    Transition(Transition),
}

impl SequenceEntry {
    pub fn id(&self) -> &str {
        match self {
            SequenceEntry::Clip(c) => &c.id,
            SequenceEntry::Transition(t) => &t.id,
        }
    }

    pub fn as_clip(&self) -> Option<&Clip> {
        match self {
            SequenceEntry::Clip(c) => Some(c),
            SequenceEntry::Transition(_) => None,
        }
    }

    pub fn as_transition(&self) -> Option<&Transition> {
        match self {
            SequenceEntry::Transition(t) => Some(t),
            SequenceEntry::Clip(_) => None,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, SequenceEntry::Transition(_))
    }
}

/// Ordered clips interleaved with optional transitions. Entries are only
/// reachable through the editing operations so the adjacency rules hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Sequence {
    pub(crate) entries: Vec<SequenceEntry>,
}

// ---------------------------------------------------------------------------
// AudioTrack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrack {
    pub id: String,
    pub path: PathBuf,
    pub source_duration: TimeMs,
    /// Offset of the track on the master timeline.
    pub start: TimeMs,
    pub looping: bool,
    pub muted: bool,
    /// Percent, 0..=100.
    pub volume: u8,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, source_duration: TimeMs) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            source_duration,
            start: TimeMs::ZERO,
            looping: false,
            muted: false,
            volume: 100,
        }
    }

    /// Span occupied on a movie of `movie_duration`: looping tracks run to
    /// the end of the movie, others are cut at the movie end.
    pub fn timeline_span(&self, movie_duration: TimeMs) -> TimeMs {
        let available = (movie_duration - self.start).max(TimeMs::ZERO);
        if self.looping {
            available
        } else {
            self.source_duration.min(available)
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub theme: Option<String>,
    pub sequence: Sequence,
    pub audio_tracks: Vec<AudioTrack>,
    pub zoom: ZoomLevel,
    pub playhead: TimeMs,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
