use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use splice_core::config::ThumbnailConfig;
use splice_core::types::{AudioTrack, Clip, Sequence, TimeMs, Transition};
use tracing::{debug, trace};

use crate::pool::Bitmap;
use crate::waveform::WaveformData;

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub element_id: String,
    pub source: PathBuf,
    pub is_video: bool,
    pub width: u32,
    pub height: u32,
    pub start: TimeMs,
    pub end: TimeMs,
    pub count: u32,
}

/// One frame of a transition thumbnail. `source: None` stands for black
/// (the head or tail of the movie).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRef {
    pub source: Option<PathBuf>,
    pub time: TimeMs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionThumbnailRequest {
    pub transition_id: String,
    pub width: u32,
    pub height: u32,
    pub frames: [FrameRef; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveformRequest {
    pub track_id: String,
    pub source: PathBuf,
}

/// Asynchronous media work done outside the UI thread. Requests return
/// immediately; results arrive later as [`MediaEvent`]s.
pub trait ThumbnailService {
    fn request_thumbnails(&self, request: ThumbnailRequest);
    fn request_transition_thumbnails(&self, request: TransitionThumbnailRequest);
    fn request_waveform(&self, request: WaveformRequest);
    /// True while a request for `element_id` has not delivered its result.
    fn is_pending(&self, element_id: &str) -> bool;
}

#[derive(Debug)]
pub struct ThumbnailBatch {
    pub element_id: String,
    pub start: TimeMs,
    pub end: TimeMs,
    pub bitmaps: Vec<Bitmap>,
}

/// Results delivered back to the UI thread.
#[derive(Debug)]
pub enum MediaEvent {
    Thumbnails(ThumbnailBatch),
    TransitionThumbnails {
        transition_id: String,
        bitmaps: Vec<Bitmap>,
    },
    /// `data` is `None` when extraction failed.
    Waveform {
        track_id: String,
        data: Option<Arc<WaveformData>>,
    },
}

// ---------------------------------------------------------------------------
// Geometry and decisions
// ---------------------------------------------------------------------------

/// Position of an element on the scrollable timeline, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementGeometry {
    pub left: i64,
    pub right: i64,
    pub padding_left: i64,
    pub padding_right: i64,
    pub thumbnail_height: u32,
}

impl ElementGeometry {
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn content_width(&self) -> i64 {
        self.width() - self.padding_left - self.padding_right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub scroll_x: i64,
    pub width: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestReason {
    Refresh,
    ScrollEnd,
    NeedThumbnails,
    Playback,
    ProgressEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseDecision {
    /// Not visible; held bitmaps were released.
    OffScreen,
    /// Generation progress is displayed instead of thumbnails.
    Suppressed,
    /// The held bitmaps cover what is visible.
    Reused,
    /// Covered by the last request, whose result has not arrived.
    Waiting,
    /// A new request was issued.
    Requested,
    /// The visible part is too narrow for a thumbnail.
    TooSmall,
    /// The last request failed and will not be retried until invalidated.
    Failed,
}

// ---------------------------------------------------------------------------
// Clip thumbnails
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestedWindow {
    start: TimeMs,
    end: TimeMs,
    count: u32,
    start_offset: i64,
    end_offset: i64,
}

impl RequestedWindow {
    fn contains(&self, other: &RequestedWindow) -> bool {
        other.start >= self.start
            && other.end <= self.end
            && other.count <= self.count
            && other.start_offset >= self.start_offset
            && other.end_offset <= self.end_offset
    }
}

/// Thumbnails currently shown by an element, drawn from `start_offset` in
/// local pixels.
#[derive(Debug)]
pub struct DisplayedThumbnails {
    pub bitmaps: Vec<Bitmap>,
    pub start_offset: i64,
    pub end_offset: i64,
}

/// Thumbnail state of one clip element on the timeline.
///
/// Remembers the last requested window and reuses held bitmaps as long as
/// the visible window stays inside it. Results for any other window are
/// stale and dropped.
#[derive(Debug)]
pub struct ClipThumbnailTracker {
    element_id: String,
    requested: Option<RequestedWindow>,
    window: Option<(i64, i64)>,
    displayed: Option<DisplayedThumbnails>,
    progress: Option<u8>,
    scrolling: bool,
    trimming: bool,
    playing: bool,
    wait_after_scroll: bool,
    playback_requested_at: Option<Instant>,
    playback_interval: Duration,
}

impl ClipThumbnailTracker {
    pub fn new(element_id: impl Into<String>, config: &ThumbnailConfig) -> Self {
        Self {
            element_id: element_id.into(),
            requested: None,
            window: None,
            displayed: None,
            progress: None,
            scrolling: false,
            trimming: false,
            playing: false,
            wait_after_scroll: false,
            playback_requested_at: None,
            playback_interval: Duration::from_millis(
                config.playback_refresh_interval.0.max(0) as u64,
            ),
        }
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn displayed(&self) -> Option<&DisplayedThumbnails> {
        self.displayed.as_ref()
    }

    pub fn is_in_progress(&self) -> bool {
        self.progress.is_some()
    }

    /// True after a scroll-end request until its result arrives.
    pub fn is_waiting_after_scroll(&self) -> bool {
        self.wait_after_scroll
    }

    /// Drop held bitmaps and forget the pending request, so any result still
    /// in flight is treated as stale.
    pub fn release_and_clear(&mut self) {
        if let Some(d) = self.displayed.take() {
            trace!(element = %self.element_id, count = d.bitmaps.len(), "released thumbnails");
        }
        self.requested = None;
        self.window = None;
        self.wait_after_scroll = false;
    }

    pub fn request_or_reuse(
        &mut self,
        clip: &Clip,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        reason: RequestReason,
        service: &dyn ThumbnailService,
    ) -> ReuseDecision {
        if self.progress.is_some() {
            return ReuseDecision::Suppressed;
        }

        let pad_left = geometry.padding_left;
        let mut start = geometry.left + pad_left - viewport.scroll_x;
        let mut end = geometry.right - geometry.padding_right - viewport.scroll_x;
        if start >= viewport.width || end < 0 || start == end {
            trace!(element = %self.element_id, start, end, "element off screen");
            self.release_and_clear();
            return ReuseDecision::OffScreen;
        }

        // Clip to the screen, then convert to local coordinates.
        end = end.min(viewport.width);
        end -= start - pad_left;
        start = if start < 0 { -start } else { pad_left };

        if self.window == Some((start, end)) {
            return if self.displayed.is_some() {
                ReuseDecision::Reused
            } else {
                ReuseDecision::Waiting
            };
        }
        self.window = Some((start, end));

        let thumb_height = geometry.thumbnail_height as i64;
        let view_width = geometry.content_width();
        if clip.height == 0 || thumb_height <= 0 || view_width <= 0 {
            return ReuseDecision::TooSmall;
        }
        let thumb_width = thumb_height * clip.width as i64 / clip.height as i64;
        if thumb_width <= 0 {
            return ReuseDecision::TooSmall;
        }
        let duration = clip.timeline_duration().0;
        let begin = clip.boundary_begin();

        // Align the start to a thumbnail boundary.
        let off = start % thumb_width;
        let mut start_offset = if off > 0 { start - off + pad_left } else { start };
        let start_time = if start_offset <= pad_left {
            start_offset = pad_left;
            begin
        } else {
            begin + TimeMs(start_offset * duration / view_width)
        };

        let mut end_offset = end;
        let limit = geometry.width() - geometry.padding_right;
        let end_time = if end_offset > limit {
            end_offset = limit;
            clip.boundary_end()
        } else {
            (begin + TimeMs(end_offset * duration / view_width)).min(clip.boundary_end())
        };

        if start_offset >= end_offset {
            trace!(element = %self.element_id, start_offset, end_offset, "too small for thumbnails");
            return ReuseDecision::TooSmall;
        }

        let wanted = RequestedWindow {
            start: start_time,
            end: end_time,
            count: ((end_offset - start_offset) / thumb_width + 1) as u32,
            start_offset,
            end_offset,
        };

        if self.requested.is_some_and(|r| r.contains(&wanted)) {
            return if self.displayed.is_some() {
                ReuseDecision::Reused
            } else {
                ReuseDecision::Waiting
            };
        }

        self.wait_after_scroll = reason == RequestReason::ScrollEnd;
        debug!(
            element = %self.element_id,
            ?reason,
            start = %wanted.start,
            end = %wanted.end,
            count = wanted.count,
            "requesting thumbnails"
        );
        service.request_thumbnails(ThumbnailRequest {
            element_id: self.element_id.clone(),
            source: clip.path.clone(),
            is_video: clip.is_video(),
            width: thumb_width as u32,
            height: geometry.thumbnail_height,
            start: wanted.start,
            end: wanted.end,
            count: wanted.count,
        });
        self.requested = Some(wanted);
        ReuseDecision::Requested
    }

    /// Take delivered thumbnails. Returns `false` (and drops the batch) when
    /// the batch is for another window than the one last requested, when
    /// progress is shown, or when it carries no bitmaps.
    pub fn accept(&mut self, batch: ThumbnailBatch) -> bool {
        if batch.element_id != self.element_id {
            return false;
        }
        if self.progress.is_some() {
            trace!(element = %self.element_id, "ignoring thumbnails while progress is shown");
            self.wait_after_scroll = false;
            return false;
        }
        let Some(requested) = self.requested else {
            trace!(element = %self.element_id, "ignoring unrequested thumbnails");
            return false;
        };
        if batch.start != requested.start || batch.end != requested.end {
            trace!(
                element = %self.element_id,
                got_start = %batch.start,
                got_end = %batch.end,
                want_start = %requested.start,
                want_end = %requested.end,
                "dropping stale thumbnails"
            );
            return false;
        }
        if batch.bitmaps.is_empty() {
            debug!(element = %self.element_id, "no thumbnails available");
            self.wait_after_scroll = false;
            return false;
        }

        self.wait_after_scroll = false;
        self.displayed = Some(DisplayedThumbnails {
            bitmaps: batch.bitmaps,
            start_offset: requested.start_offset,
            end_offset: requested.end_offset,
        });
        true
    }

    /// Generation progress for the clip, reported by whatever renders its
    /// content (not the media service). 0 clears the thumbnails, values in
    /// between suppress requests, 100 issues one fresh request.
    pub fn set_progress(
        &mut self,
        percent: u8,
        clip: &Clip,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        service: &dyn ThumbnailService,
    ) -> Option<ReuseDecision> {
        match percent {
            0 => {
                self.progress = Some(0);
                self.release_and_clear();
                None
            }
            p if p >= 100 => {
                self.progress = None;
                Some(self.request_or_reuse(clip, geometry, viewport, RequestReason::ProgressEnd, service))
            }
            p => {
                self.progress = Some(p);
                None
            }
        }
    }

    /// The element was laid out again: everything held is stale.
    pub fn on_position_changed(
        &mut self,
        clip: &Clip,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        service: &dyn ThumbnailService,
    ) -> Option<ReuseDecision> {
        self.release_and_clear();
        if self.scrolling || self.trimming || self.progress.is_some() {
            return None;
        }
        Some(self.request_or_reuse(clip, geometry, viewport, RequestReason::Refresh, service))
    }

    pub fn set_scrolling(&mut self, scrolling: bool) {
        self.scrolling = scrolling;
    }

    pub fn on_scroll_end(
        &mut self,
        clip: &Clip,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        service: &dyn ThumbnailService,
    ) -> ReuseDecision {
        self.scrolling = false;
        self.request_or_reuse(clip, geometry, viewport, RequestReason::ScrollEnd, service)
    }

    pub fn set_trimming(&mut self, trimming: bool) {
        self.trimming = trimming;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.playback_requested_at = None;
    }

    /// During playback thumbnails are refreshed at most once per interval.
    pub fn on_playback_tick(
        &mut self,
        now: Instant,
        clip: &Clip,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        service: &dyn ThumbnailService,
    ) -> Option<ReuseDecision> {
        if !self.playing {
            return None;
        }
        let due = self
            .playback_requested_at
            .map(|at| now.saturating_duration_since(at) > self.playback_interval)
            .unwrap_or(true);
        if !due {
            return None;
        }
        self.playback_requested_at = Some(now);
        Some(self.request_or_reuse(clip, geometry, viewport, RequestReason::Playback, service))
    }

    /// Called when the element is drawn at rest without thumbnails.
    pub fn refresh_if_idle(
        &mut self,
        clip: &Clip,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        service: &dyn ThumbnailService,
    ) -> Option<ReuseDecision> {
        if self.progress.is_some()
            || self.playing
            || self.trimming
            || self.scrolling
            || self.wait_after_scroll
            || self.displayed.is_some()
        {
            return None;
        }
        Some(self.request_or_reuse(clip, geometry, viewport, RequestReason::NeedThumbnails, service))
    }
}

// ---------------------------------------------------------------------------
// Transition thumbnails
// ---------------------------------------------------------------------------

/// Two-frame thumbnail of a transition: the outgoing and the incoming clip.
#[derive(Debug)]
pub struct TransitionThumbnailTracker {
    transition_id: String,
    bitmaps: Option<Vec<Bitmap>>,
}

impl TransitionThumbnailTracker {
    pub fn new(transition_id: impl Into<String>) -> Self {
        Self {
            transition_id: transition_id.into(),
            bitmaps: None,
        }
    }

    pub fn bitmaps(&self) -> Option<&[Bitmap]> {
        self.bitmaps.as_deref()
    }

    pub fn release(&mut self) {
        self.bitmaps = None;
    }

    pub fn request_or_reuse(
        &mut self,
        transition: &Transition,
        sequence: &Sequence,
        geometry: &ElementGeometry,
        viewport: &Viewport,
        service: &dyn ThumbnailService,
    ) -> ReuseDecision {
        if self.bitmaps.is_some() {
            return ReuseDecision::Reused;
        }
        if service.is_pending(&self.transition_id) {
            return ReuseDecision::Waiting;
        }
        let start = geometry.left - viewport.scroll_x;
        let end = geometry.right - viewport.scroll_x;
        if start >= viewport.width || end < 0 || start == end {
            self.release();
            return ReuseDecision::OffScreen;
        }
        if geometry.thumbnail_height == 0 {
            return ReuseDecision::TooSmall;
        }

        let half = transition.duration / 2;
        let outgoing = transition.after_clip_id.as_deref().and_then(|id| sequence.clip(id));
        let incoming = transition.before_clip_id.as_deref().and_then(|id| sequence.clip(id));
        let frames = [
            FrameRef {
                source: outgoing.map(|c| c.path.clone()),
                time: outgoing
                    .map(|c| (c.boundary_end() - half).max(c.boundary_begin()))
                    .unwrap_or(TimeMs::ZERO),
            },
            FrameRef {
                source: incoming.map(|c| c.path.clone()),
                time: incoming
                    .map(|c| (c.boundary_begin() + half).min(c.boundary_end()))
                    .unwrap_or(TimeMs::ZERO),
            },
        ];
        let height = geometry.thumbnail_height;
        let width = outgoing
            .or(incoming)
            .filter(|c| c.height > 0)
            .map(|c| (height as u64 * c.width as u64 / c.height as u64) as u32)
            .unwrap_or(height * 16 / 9);

        debug!(transition = %self.transition_id, "requesting transition thumbnails");
        service.request_transition_thumbnails(TransitionThumbnailRequest {
            transition_id: self.transition_id.clone(),
            width,
            height,
            frames,
        });
        ReuseDecision::Requested
    }

    pub fn accept(&mut self, transition_id: &str, bitmaps: Vec<Bitmap>) -> bool {
        if transition_id != self.transition_id || bitmaps.is_empty() {
            return false;
        }
        self.bitmaps = Some(bitmaps);
        true
    }
}

// ---------------------------------------------------------------------------
// Waveforms
// ---------------------------------------------------------------------------

/// Waveform state of one audio track element.
#[derive(Debug)]
pub struct WaveformTracker {
    track_id: String,
    data: Option<Arc<WaveformData>>,
    progress: Option<u8>,
    failed: bool,
}

impl WaveformTracker {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            data: None,
            progress: None,
            failed: false,
        }
    }

    pub fn data(&self) -> Option<&Arc<WaveformData>> {
        self.data.as_ref()
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn request_if_needed(&mut self, track: &AudioTrack, service: &dyn ThumbnailService) -> ReuseDecision {
        if self.data.is_some() {
            return ReuseDecision::Reused;
        }
        if self.progress.is_some() || service.is_pending(&self.track_id) {
            return ReuseDecision::Waiting;
        }
        if self.failed {
            return ReuseDecision::Failed;
        }
        debug!(track = %self.track_id, "requesting waveform");
        service.request_waveform(WaveformRequest {
            track_id: self.track_id.clone(),
            source: track.path.clone(),
        });
        self.progress = Some(0);
        ReuseDecision::Requested
    }

    pub fn set_progress(&mut self, percent: u8) {
        self.progress = if percent >= 100 { None } else { Some(percent) };
    }

    pub fn accept(&mut self, track_id: &str, data: Option<Arc<WaveformData>>) -> bool {
        if track_id != self.track_id {
            return false;
        }
        self.progress = None;
        match data {
            Some(d) => {
                self.data = Some(d);
                self.failed = false;
                true
            }
            None => {
                debug!(track = %self.track_id, "waveform unavailable");
                self.failed = true;
                false
            }
        }
    }

    /// The track source changed.
    pub fn invalidate(&mut self) {
        self.data = None;
        self.failed = false;
        self.progress = None;
    }
}
