use tracing::debug;

use crate::config::EditLimits;
use crate::error::{CoreError, Result};
use crate::types::*;

// ---------------------------------------------------------------------------
// Trim rules
// ---------------------------------------------------------------------------

/// Which edge of a clip is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrimHandle {
    Begin,
    End,
}

/// Whether a handle can still move toward the timeline start
/// (`begin_reached == false`) or toward its end (`end_reached == false`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleLimits {
    pub begin_reached: bool,
    pub end_reached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOutcome {
    /// Proposal within tolerance or equal to the current duration. The clip
    /// was not touched.
    Unchanged,
    Applied {
        duration: TimeMs,
        /// The proposal was outside the legal range.
        clamped: bool,
        limits: HandleLimits,
    },
}

impl TrimOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TrimOutcome::Applied { .. })
    }
}

/// Legal `(floor, ceiling)` for the timeline duration of `clip` when trimmed
/// with `handle`. `transitions` is the total of the adjacent transitions.
pub fn duration_bounds(
    clip: &Clip,
    handle: TrimHandle,
    transitions: TimeMs,
    limits: &EditLimits,
) -> (TimeMs, TimeMs) {
    match clip.source {
        ClipSource::Video {
            source_duration,
            begin,
            end,
        } => {
            let floor = (transitions * 2).max(limits.min_video_clip_duration);
            let ceiling = match handle {
                TrimHandle::Begin => end,
                TrimHandle::End => source_duration - begin,
            };
            (floor, ceiling)
        }
        ClipSource::Image { .. } => {
            let floor = limits.min_image_duration.max(transitions * 2);
            (floor, limits.max_image_duration)
        }
    }
}

/// Limit flags for the handle after the clip reached its current state.
pub fn handle_limits(
    clip: &Clip,
    handle: TrimHandle,
    transitions: TimeMs,
    limits: &EditLimits,
) -> HandleLimits {
    let (floor, _) = duration_bounds(clip, handle, transitions, limits);
    let duration = clip.timeline_duration();
    let at_floor = duration <= floor;
    let at_ceiling = match clip.source {
        ClipSource::Video {
            source_duration, end, ..
        } => match handle {
            TrimHandle::Begin => clip.boundary_begin() <= TimeMs::ZERO,
            TrimHandle::End => end >= source_duration,
        },
        ClipSource::Image { .. } => duration >= limits.max_image_duration,
    };
    match handle {
        TrimHandle::Begin => HandleLimits {
            begin_reached: at_ceiling,
            end_reached: at_floor,
        },
        TrimHandle::End => HandleLimits {
            begin_reached: at_floor,
            end_reached: at_ceiling,
        },
    }
}

/// Apply a proposed timeline duration to `clip`, clamped to the legal range.
///
/// The begin handle keeps the end boundary fixed, the end handle keeps the
/// begin boundary fixed. Image clips only change their duration. Nothing is
/// persisted here.
pub fn trim_to_duration(
    clip: &mut Clip,
    handle: TrimHandle,
    proposed: TimeMs,
    transitions: TimeMs,
    limits: &EditLimits,
) -> TrimOutcome {
    let current = clip.timeline_duration();
    if current.abs_diff(proposed) < limits.time_tolerance {
        return TrimOutcome::Unchanged;
    }

    let (floor, ceiling) = duration_bounds(clip, handle, transitions, limits);
    // A source shorter than the floor can only give what it has.
    let duration = proposed.min(ceiling).max(floor.min(ceiling));
    if duration == current {
        return TrimOutcome::Unchanged;
    }

    let (begin, end) = (clip.boundary_begin(), clip.boundary_end());
    match (clip.is_video(), handle) {
        (true, TrimHandle::Begin) => clip.set_boundaries(end - duration, end),
        (true, TrimHandle::End) => clip.set_boundaries(begin, begin + duration),
        (false, _) => clip.set_boundaries(TimeMs::ZERO, duration),
    }
    debug!(clip = %clip.id, ?handle, %proposed, %duration, "trim applied");

    TrimOutcome::Applied {
        duration,
        clamped: duration != proposed,
        limits: handle_limits(clip, handle, transitions, limits),
    }
}

/// Same as [`trim_to_duration`] but the proposal is the new position of the
/// dragged boundary in source time.
pub fn trim_to_boundary(
    clip: &mut Clip,
    handle: TrimHandle,
    proposed_boundary: TimeMs,
    transitions: TimeMs,
    limits: &EditLimits,
) -> TrimOutcome {
    let proposed = match handle {
        TrimHandle::Begin => clip.boundary_end() - proposed_boundary,
        TrimHandle::End => proposed_boundary - clip.boundary_begin(),
    };
    trim_to_duration(clip, handle, proposed, transitions, limits)
}

/// Convert the width of a clip being dragged into a timeline duration. The
/// drawn width excludes the transitions so they are added back.
pub fn duration_from_width(
    width_px: i64,
    transitions: TimeMs,
    total: TimeMs,
    content_width: i64,
) -> TimeMs {
    if content_width <= 0 {
        return transitions;
    }
    let d = width_px as i128 * total.0 as i128 / content_width as i128;
    transitions + TimeMs(d as i64)
}

// ---------------------------------------------------------------------------
// Transition rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBounds {
    pub min: TimeMs,
    pub default: TimeMs,
    pub max: TimeMs,
}

pub fn default_transition_duration(shorter_adjacent: TimeMs, limits: &EditLimits) -> TimeMs {
    (limits.max_transition_duration / 2).min(shorter_adjacent / 4)
}

pub fn max_transition_duration(shorter_adjacent: TimeMs, limits: &EditLimits) -> TimeMs {
    limits.max_transition_duration.min(shorter_adjacent / 4)
}

/// Duration of the clip that limits a transition placed after `after`.
///
/// The head slot is limited by the first clip and the tail slot by the last
/// clip; an inner slot by the shorter of its two neighbours.
pub fn adjacent_clip_duration(sequence: &Sequence, after: Option<&str>) -> Result<TimeMs> {
    match after {
        None => sequence
            .first_clip()
            .map(Clip::timeline_duration)
            .ok_or(CoreError::EmptySequence),
        Some(id) => {
            let clip = sequence
                .clip(id)
                .ok_or_else(|| CoreError::ClipNotFound(id.to_string()))?;
            let d = clip.timeline_duration();
            Ok(match sequence.next_clip(id) {
                Some(next) => d.min(next.timeline_duration()),
                None => d,
            })
        }
    }
}

/// Bounds for a transition in the slot after `after`. Fails with
/// `TransitionTooShort` when the neighbours are too short to host even the
/// minimum transition.
pub fn transition_bounds(
    sequence: &Sequence,
    after: Option<&str>,
    limits: &EditLimits,
) -> Result<TransitionBounds> {
    let shorter = adjacent_clip_duration(sequence, after)?;
    let default = default_transition_duration(shorter, limits);
    if default < limits.min_transition_duration {
        return Err(CoreError::TransitionTooShort {
            duration: default,
            minimum: limits.min_transition_duration,
        });
    }
    Ok(TransitionBounds {
        min: limits.min_transition_duration,
        default,
        max: max_transition_duration(shorter, limits),
    })
}

pub fn clamp_transition_duration(proposed: TimeMs, bounds: &TransitionBounds) -> TimeMs {
    proposed.clamp(bounds.min, bounds.max.max(bounds.min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::EdgeTransitions;
    use proptest::prelude::*;

    fn limits() -> EditLimits {
        EditLimits::default()
    }

    fn trimmed_video(source: i64, begin: i64, end: i64) -> Clip {
        let mut clip = Clip::video("v", TimeMs(source));
        clip.set_boundaries(TimeMs(begin), TimeMs(end));
        clip
    }

    #[test]
    fn small_change_is_jitter() {
        let mut clip = Clip::video("v", TimeMs(10_000));
        let outcome = trim_to_duration(&mut clip, TrimHandle::End, TimeMs(9_975), TimeMs::ZERO, &limits());
        assert_eq!(outcome, TrimOutcome::Unchanged);
        assert_eq!(clip.timeline_duration(), TimeMs(10_000));
    }

    #[test]
    fn end_handle_clamps_to_transition_floor() {
        // Right handle from 5000 to 3000 with 800 ms of transitions: the floor
        // is max(1600, 1000).
        let mut clip = Clip::video("a", TimeMs(5_000));
        let outcome = trim_to_boundary(&mut clip, TrimHandle::End, TimeMs(3_000), TimeMs(800), &limits());
        assert_eq!(
            outcome,
            TrimOutcome::Applied {
                duration: TimeMs(3_000),
                clamped: false,
                limits: HandleLimits {
                    begin_reached: false,
                    end_reached: false
                },
            }
        );

        let outcome = trim_to_boundary(&mut clip, TrimHandle::End, TimeMs(200), TimeMs(800), &limits());
        assert_eq!(
            outcome,
            TrimOutcome::Applied {
                duration: TimeMs(1_600),
                clamped: true,
                limits: HandleLimits {
                    begin_reached: true,
                    end_reached: false
                },
            }
        );
        assert_eq!(clip.boundary_begin(), TimeMs::ZERO);
        assert_eq!(clip.boundary_end(), TimeMs(1_600));
    }

    #[test]
    fn end_handle_ceiling_is_remaining_source() {
        let mut clip = trimmed_video(10_000, 2_000, 5_000);
        let outcome = trim_to_duration(&mut clip, TrimHandle::End, TimeMs(20_000), TimeMs::ZERO, &limits());
        match outcome {
            TrimOutcome::Applied { duration, clamped, limits } => {
                assert_eq!(duration, TimeMs(8_000));
                assert!(clamped);
                assert!(limits.end_reached);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(clip.boundary_begin(), TimeMs(2_000));
        assert_eq!(clip.boundary_end(), TimeMs(10_000));
    }

    #[test]
    fn begin_handle_keeps_end_fixed() {
        let mut clip = trimmed_video(10_000, 2_000, 6_000);
        trim_to_duration(&mut clip, TrimHandle::Begin, TimeMs(5_000), TimeMs::ZERO, &limits());
        assert_eq!(clip.boundary_begin(), TimeMs(1_000));
        assert_eq!(clip.boundary_end(), TimeMs(6_000));

        let outcome = trim_to_duration(&mut clip, TrimHandle::Begin, TimeMs(50_000), TimeMs::ZERO, &limits());
        assert_eq!(clip.boundary_begin(), TimeMs::ZERO);
        match outcome {
            TrimOutcome::Applied { limits, .. } => {
                assert!(limits.begin_reached);
                assert!(!limits.end_reached);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn image_duration_clamped_to_range() {
        let mut clip = Clip::image("img", TimeMs(3_000));
        let outcome = trim_to_duration(&mut clip, TrimHandle::End, TimeMs(9_000), TimeMs::ZERO, &limits());
        assert!(outcome.is_applied());
        assert_eq!(clip.timeline_duration(), TimeMs(6_000));

        trim_to_duration(&mut clip, TrimHandle::End, TimeMs(100), TimeMs(700), &limits());
        assert_eq!(clip.timeline_duration(), TimeMs(1_400));
    }

    #[test]
    fn clamp_to_current_is_unchanged() {
        let mut clip = Clip::image("img", TimeMs(6_000));
        let outcome = trim_to_duration(&mut clip, TrimHandle::End, TimeMs(7_000), TimeMs::ZERO, &limits());
        assert_eq!(outcome, TrimOutcome::Unchanged);
    }

    #[test]
    fn short_source_gives_whole_source() {
        let mut clip = Clip::video("v", TimeMs(1_200));
        let outcome = trim_to_duration(&mut clip, TrimHandle::End, TimeMs(100), TimeMs(800), &limits());
        assert_eq!(outcome, TrimOutcome::Unchanged);
        assert_eq!(clip.timeline_duration(), TimeMs(1_200));
    }

    #[test]
    fn width_converts_back_to_duration() {
        assert_eq!(duration_from_width(300, TimeMs(500), TimeMs(6_000), 600), TimeMs(3_500));
        assert_eq!(duration_from_width(300, TimeMs(500), TimeMs(6_000), 0), TimeMs(500));
    }

    #[test]
    fn transition_durations_follow_shorter_clip() {
        let l = limits();
        assert_eq!(default_transition_duration(TimeMs(5_000), &l), TimeMs(1_250));
        assert_eq!(default_transition_duration(TimeMs(60_000), &l), TimeMs(1_500));
        assert_eq!(max_transition_duration(TimeMs(5_000), &l), TimeMs(1_250));
        assert_eq!(max_transition_duration(TimeMs(60_000), &l), TimeMs(3_000));
    }

    fn two_clips(a: i64, b: i64) -> Sequence {
        let mut seq = Sequence::new();
        seq.insert_clip_after(Clip::video("a", TimeMs(a)), None, EdgeTransitions::default())
            .unwrap();
        seq.insert_clip_after(Clip::video("b", TimeMs(b)), Some("a"), EdgeTransitions::default())
            .unwrap();
        seq
    }

    #[test]
    fn bounds_per_slot() {
        let seq = two_clips(8_000, 4_000);
        let l = limits();
        assert_eq!(transition_bounds(&seq, None, &l).unwrap().default, TimeMs(1_500));
        let inner = transition_bounds(&seq, Some("a"), &l).unwrap();
        assert_eq!(inner, TransitionBounds {
            min: TimeMs(500),
            default: TimeMs(1_000),
            max: TimeMs(1_000),
        });
        assert_eq!(transition_bounds(&seq, Some("b"), &l).unwrap().default, TimeMs(1_000));
        assert!(transition_bounds(&seq, Some("zz"), &l).unwrap_err().is_not_found());
        assert!(matches!(
            transition_bounds(&Sequence::new(), None, &l),
            Err(CoreError::EmptySequence)
        ));
    }

    #[test]
    fn too_short_neighbour_is_rejected() {
        let seq = two_clips(8_000, 1_900);
        let err = transition_bounds(&seq, Some("a"), &limits()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TransitionTooShort { duration, minimum }
                if duration == TimeMs(475) && minimum == TimeMs(500)
        ));
    }

    #[test]
    fn edited_transition_duration_is_clamped() {
        let bounds = TransitionBounds {
            min: TimeMs(500),
            default: TimeMs(1_000),
            max: TimeMs(1_250),
        };
        assert_eq!(clamp_transition_duration(TimeMs(100), &bounds), TimeMs(500));
        assert_eq!(clamp_transition_duration(TimeMs(900), &bounds), TimeMs(900));
        assert_eq!(clamp_transition_duration(TimeMs(9_000), &bounds), TimeMs(1_250));
    }

    proptest! {
        #[test]
        fn video_trim_never_breaks_floor(
            transitions in 0i64..=2_000,
            proposals in proptest::collection::vec((any::<bool>(), -100_000i64..100_000), 1..30),
        ) {
            let l = limits();
            let t = TimeMs(transitions);
            let floor = (t * 2).max(l.min_video_clip_duration);
            let mut clip = Clip::video("v", TimeMs(60_000));
            for (begin_handle, proposed) in proposals {
                let handle = if begin_handle { TrimHandle::Begin } else { TrimHandle::End };
                trim_to_duration(&mut clip, handle, TimeMs(proposed), t, &l);
                prop_assert!(clip.timeline_duration() >= floor);
                prop_assert!(clip.boundary_begin() >= TimeMs::ZERO);
                prop_assert!(clip.boundary_end() <= TimeMs(60_000));
            }
        }

        #[test]
        fn image_trim_stays_in_range(
            transitions in 0i64..=3_000,
            proposals in proptest::collection::vec(-100_000i64..100_000, 1..30),
        ) {
            let l = limits();
            let t = TimeMs(transitions);
            let floor = l.min_image_duration.max(t * 2);
            let mut clip = Clip::image("img", TimeMs(3_000));
            for proposed in proposals {
                let before = clip.timeline_duration();
                trim_to_duration(&mut clip, TrimHandle::End, TimeMs(proposed), t, &l);
                let d = clip.timeline_duration();
                prop_assert!(d <= l.max_image_duration.max(before));
                prop_assert!(d >= floor.min(l.max_image_duration).min(before));
            }
        }

        #[test]
        fn short_defaults_are_always_rejected(shorter in 0i64..=20_000) {
            let seq = two_clips(60_000, shorter.max(1));
            let l = limits();
            let result = transition_bounds(&seq, Some("a"), &l);
            let default = default_transition_duration(TimeMs(shorter.max(1)), &l);
            prop_assert_eq!(result.is_err(), default < l.min_transition_duration);
        }
    }
}
