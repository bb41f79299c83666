use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::DragConfig;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragDirection {
    Backward,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropResolution {
    /// Dropping now moves the clip after `after` (`None` = head). `time` is
    /// where the playhead should snap to.
    Valid { after: Option<String>, time: TimeMs },
    /// The slot under the playhead is next to the dragged clip.
    Invalid { time: TimeMs },
    /// The playhead is outside every clip segment.
    Outside { time: TimeMs },
}

impl DropResolution {
    pub fn time(&self) -> TimeMs {
        match self {
            DropResolution::Valid { time, .. }
            | DropResolution::Invalid { time }
            | DropResolution::Outside { time } => *time,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, DropResolution::Valid { .. })
    }
}

struct Segment<'a> {
    clip: &'a Clip,
    begin: TimeMs,
    end: TimeMs,
}

/// Clip segments on the movie timeline. A clip's segment stops where its end
/// transition starts, except for the last clip.
fn segments(sequence: &Sequence) -> Vec<Segment<'_>> {
    let clips: Vec<&Clip> = sequence.clips().collect();
    let last = clips.len().saturating_sub(1);
    let mut begin = TimeMs::ZERO;
    let mut out = Vec::with_capacity(clips.len());
    for (i, clip) in clips.into_iter().enumerate() {
        let mut end = begin + clip.timeline_duration();
        if i < last {
            if let Some(t) = sequence.end_transition(&clip.id) {
                end -= t.duration;
            }
        }
        out.push(Segment { clip, begin, end });
        begin = end;
    }
    out
}

/// Find where the dragged clip would land if dropped with the playhead at
/// `playhead`, scanning in the direction the pointer moves.
pub fn resolve_drop_position(
    sequence: &Sequence,
    dragged_id: &str,
    playhead: TimeMs,
    direction: DragDirection,
) -> DropResolution {
    let segments = segments(sequence);
    let count = segments.len();

    for (i, seg) in segments.iter().enumerate() {
        match direction {
            DragDirection::Backward => {
                if !(playhead > seg.begin && playhead <= seg.end) {
                    continue;
                }
                let mut time = seg.begin;
                if let Some(t) = sequence.begin_transition(&seg.clip.id) {
                    time += t.duration;
                }
                if seg.clip.id == dragged_id {
                    return DropResolution::Invalid { time };
                }
                if i == 0 {
                    return DropResolution::Valid {
                        after: None,
                        time: TimeMs::ZERO,
                    };
                }
                let prev = segments[i - 1].clip;
                if prev.id == dragged_id {
                    return DropResolution::Invalid { time };
                }
                return DropResolution::Valid {
                    after: Some(prev.id.clone()),
                    time,
                };
            }
            DragDirection::Forward => {
                if !(playhead >= seg.begin && playhead < seg.end) {
                    continue;
                }
                let time = seg.end;
                if seg.clip.id == dragged_id {
                    return DropResolution::Invalid { time };
                }
                if i + 1 < count && segments[i + 1].clip.id == dragged_id {
                    return DropResolution::Invalid { time };
                }
                return DropResolution::Valid {
                    after: Some(seg.clip.id.clone()),
                    time,
                };
            }
        }
    }

    DropResolution::Outside { time: playhead }
}

/// Where a drop commits the dragged clip, as arguments for `move_clip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub clip_id: String,
    pub after: Option<String>,
}

/// State of a drag-to-reorder gesture. Pointer moves are debounced by a
/// pixel hysteresis and a minimum interval between recomputations.
#[derive(Debug, Clone)]
pub struct ReorderDrag {
    dragged_id: String,
    hysteresis_px: i64,
    min_interval: Duration,
    prev_x: i64,
    prev_at: Option<Instant>,
    target: Option<DropTarget>,
}

impl ReorderDrag {
    pub fn new(dragged_id: impl Into<String>, start_x: i64, config: &DragConfig) -> Self {
        Self {
            dragged_id: dragged_id.into(),
            hysteresis_px: config.hysteresis_px as i64,
            min_interval: Duration::from_millis(config.min_interval.0.max(0) as u64),
            prev_x: start_x,
            prev_at: None,
            target: None,
        }
    }

    pub fn dragged_id(&self) -> &str {
        &self.dragged_id
    }

    /// Feed a pointer position (viewport coordinates). Returns a resolution
    /// only when the move was large enough and not too soon after the last
    /// one.
    pub fn pointer_moved(
        &mut self,
        x: i64,
        now: Instant,
        sequence: &Sequence,
        playhead: TimeMs,
    ) -> Option<DropResolution> {
        let due = self
            .prev_at
            .map(|at| now.saturating_duration_since(at) > self.min_interval)
            .unwrap_or(true);
        if !due {
            self.prev_x = x;
            return None;
        }

        let direction = if x < self.prev_x - self.hysteresis_px {
            DragDirection::Backward
        } else if x > self.prev_x + self.hysteresis_px {
            DragDirection::Forward
        } else {
            return None;
        };

        let resolution = resolve_drop_position(sequence, &self.dragged_id, playhead, direction);
        trace!(?direction, ?resolution, "drop position");
        match &resolution {
            DropResolution::Valid { after, .. } => {
                self.target = Some(DropTarget {
                    clip_id: self.dragged_id.clone(),
                    after: after.clone(),
                });
            }
            DropResolution::Invalid { .. } => self.target = None,
            DropResolution::Outside { .. } => {}
        }
        self.prev_x = x;
        self.prev_at = Some(now);
        Some(resolution)
    }

    /// The move to perform on drop, if the last resolution was valid.
    pub fn drop_target(&self) -> Option<&DropTarget> {
        self.target.as_ref()
    }

    pub fn finish(self) -> Option<DropTarget> {
        debug!(clip = %self.dragged_id, target = ?self.target, "reorder drag finished");
        self.target
    }
}
