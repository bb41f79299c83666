use crate::types::*;
use crate::zoom::PixelMapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Clip,
    Transition,
}

/// Horizontal extent of one sequence entry, in both time and pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySpan {
    pub id: String,
    pub kind: EntryKind,
    pub start_time: TimeMs,
    pub end_time: TimeMs,
    pub left: i64,
    pub right: i64,
}

impl EntrySpan {
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn duration(&self) -> TimeMs {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpan {
    pub clip_id: String,
    pub overlay_id: String,
    pub start_time: TimeMs,
    pub end_time: TimeMs,
    pub left: i64,
    pub right: i64,
}

fn time_to_x(time: TimeMs, total: TimeMs, content_width: i64, leading_px: i64) -> i64 {
    if total.0 <= 0 {
        return leading_px;
    }
    (time.0 as i128 * content_width as i128 / total.0 as i128) as i64 + leading_px
}

/// Pixel layout of a whole sequence. Each entry's right edge is derived from
/// the cumulative time so rounding never accumulates across entries.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLayout {
    spans: Vec<EntrySpan>,
    total: TimeMs,
    content_width: i64,
    leading_px: i64,
}

impl TimelineLayout {
    pub fn compute(sequence: &Sequence, content_width: i64, leading_px: i64) -> Self {
        let total = sequence.compute_duration();
        let mut spans = Vec::with_capacity(sequence.len());
        let mut start = TimeMs::ZERO;
        let mut left = leading_px;

        for (index, entry) in sequence.entries().iter().enumerate() {
            let view = sequence.view_duration(index).unwrap_or_default().max(TimeMs::ZERO);
            let end = start + view;
            let right = time_to_x(end, total, content_width, leading_px);
            let kind = match entry {
                SequenceEntry::Clip(_) => EntryKind::Clip,
                SequenceEntry::Transition(_) => EntryKind::Transition,
            };
            spans.push(EntrySpan {
                id: entry.id().to_string(),
                kind,
                start_time: start,
                end_time: end,
                left,
                right,
            });
            start = end;
            left = right;
        }

        Self {
            spans,
            total,
            content_width,
            leading_px,
        }
    }

    /// Layout at the mapper's current zoom, with half a viewport of leading
    /// padding.
    pub fn with_mapper(sequence: &Sequence, mapper: &PixelMapper) -> Self {
        let total = sequence.compute_duration();
        Self::compute(sequence, mapper.time_to_pixels(total), mapper.leading_padding())
    }

    pub fn spans(&self) -> &[EntrySpan] {
        &self.spans
    }

    pub fn total(&self) -> TimeMs {
        self.total
    }

    pub fn content_width(&self) -> i64 {
        self.content_width
    }

    pub fn span(&self, id: &str) -> Option<&EntrySpan> {
        self.spans.iter().find(|s| s.id == id)
    }

    pub fn entry_at(&self, x: i64) -> Option<&EntrySpan> {
        self.spans.iter().find(|s| s.left <= x && x < s.right)
    }

    /// Timeline time under pixel `x`, clamped to the movie.
    pub fn time_at(&self, x: i64) -> TimeMs {
        if self.content_width <= 0 {
            return TimeMs::ZERO;
        }
        let offset = (x - self.leading_px) as i128;
        let t = offset * self.total.0 as i128 / self.content_width as i128;
        TimeMs(t as i64).clamp(TimeMs::ZERO, self.total)
    }

    pub fn x_at(&self, time: TimeMs) -> i64 {
        time_to_x(time, self.total, self.content_width, self.leading_px)
    }

    /// Absolute window of every clip overlay. A clip starts where its begin
    /// transition starts. Clips are looked up in `sequence` by the ids of
    /// this layout's spans; ids it does not contain are skipped.
    pub fn overlay_spans(&self, sequence: &Sequence) -> Vec<OverlaySpan> {
        let mut out = vec![];
        for (index, span) in self.spans.iter().enumerate() {
            if span.kind != EntryKind::Clip {
                continue;
            }
            let Some(overlay) = sequence.clip(&span.id).and_then(|c| c.overlay.as_ref()) else {
                continue;
            };
            let clip_start = match index.checked_sub(1).and_then(|i| self.spans.get(i)) {
                Some(prev) if prev.kind == EntryKind::Transition => prev.start_time,
                _ => span.start_time,
            };
            let start_time = clip_start + overlay.start;
            let end_time = (start_time + overlay.duration).min(self.total);
            out.push(OverlaySpan {
                clip_id: span.id.clone(),
                overlay_id: overlay.id.clone(),
                start_time,
                end_time,
                left: self.x_at(start_time),
                right: self.x_at(end_time),
            });
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSpan {
    pub track_id: String,
    pub start_time: TimeMs,
    pub end_time: TimeMs,
    pub left: i64,
    pub right: i64,
}

/// Audio tracks laid out against the movie. Looping tracks run to the movie
/// end, others stop at their source length or the movie end.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioLayout {
    pub spans: Vec<AudioSpan>,
}

impl AudioLayout {
    pub fn compute(
        tracks: &[AudioTrack],
        movie_duration: TimeMs,
        content_width: i64,
        leading_px: i64,
    ) -> Self {
        let spans = tracks
            .iter()
            .map(|track| {
                let start_time = track.start.clamp(TimeMs::ZERO, movie_duration.max(TimeMs::ZERO));
                let end_time = start_time + track.timeline_span(movie_duration);
                AudioSpan {
                    track_id: track.id.clone(),
                    start_time,
                    end_time,
                    left: time_to_x(start_time, movie_duration, content_width, leading_px),
                    right: time_to_x(end_time, movie_duration, content_width, leading_px),
                }
            })
            .collect();
        Self { spans }
    }

    pub fn span(&self, track_id: &str) -> Option<&AudioSpan> {
        self.spans.iter().find(|s| s.track_id == track_id)
    }
}
