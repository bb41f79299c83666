use tracing::debug;

use crate::config::EditLimits;
use crate::constraints::{duration_from_width, trim_to_boundary, trim_to_duration, TrimHandle, TrimOutcome};
use crate::error::{CoreError, Result};
use crate::types::*;

/// Boundary change to persist once a trim gesture ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimCommit {
    pub clip_id: String,
    pub handle: TrimHandle,
    pub begin: TimeMs,
    pub end: TimeMs,
    pub is_video: bool,
}

impl TrimCommit {
    pub fn duration(&self) -> TimeMs {
        self.end - self.begin
    }
}

/// One drag of a trim handle, from pointer down to pointer up.
///
/// Every update mutates the clip in the sequence so the layout can follow
/// the finger. `cancel` restores the boundaries and overlay captured at
/// `begin`.
#[derive(Debug, Clone)]
pub struct TrimSession {
    clip_id: String,
    handle: TrimHandle,
    original_begin: TimeMs,
    original_end: TimeMs,
    original_overlay: Option<Overlay>,
    transitions: TimeMs,
    last_outcome: TrimOutcome,
}

impl TrimSession {
    pub fn begin(sequence: &Sequence, clip_id: &str, handle: TrimHandle) -> Result<Self> {
        let clip = sequence
            .clip(clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))?;
        if handle == TrimHandle::Begin && !clip.is_video() {
            return Err(CoreError::InvalidOperation(format!(
                "image clip {clip_id} has no begin handle"
            )));
        }
        let transitions = sequence.adjacent_transition_duration(clip_id)?;
        debug!(clip = clip_id, ?handle, %transitions, "trim started");
        Ok(Self {
            clip_id: clip_id.to_string(),
            handle,
            original_begin: clip.boundary_begin(),
            original_end: clip.boundary_end(),
            original_overlay: clip.overlay.clone(),
            transitions,
            last_outcome: TrimOutcome::Unchanged,
        })
    }

    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    pub fn handle(&self) -> TrimHandle {
        self.handle
    }

    /// Total duration of the transitions around the clip when the gesture
    /// started.
    pub fn transitions(&self) -> TimeMs {
        self.transitions
    }

    pub fn last_outcome(&self) -> TrimOutcome {
        self.last_outcome
    }

    fn clip_mut<'a>(&self, sequence: &'a mut Sequence) -> Result<&'a mut Clip> {
        sequence
            .clip_mut(&self.clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(self.clip_id.clone()))
    }

    pub fn update_duration(
        &mut self,
        sequence: &mut Sequence,
        proposed: TimeMs,
        limits: &EditLimits,
    ) -> Result<TrimOutcome> {
        let (handle, transitions) = (self.handle, self.transitions);
        let clip = self.clip_mut(sequence)?;
        let outcome = trim_to_duration(clip, handle, proposed, transitions, limits);
        if outcome.is_applied() {
            self.last_outcome = outcome;
        }
        Ok(outcome)
    }

    pub fn update_boundary(
        &mut self,
        sequence: &mut Sequence,
        proposed_boundary: TimeMs,
        limits: &EditLimits,
    ) -> Result<TrimOutcome> {
        let (handle, transitions) = (self.handle, self.transitions);
        let clip = self.clip_mut(sequence)?;
        let outcome = trim_to_boundary(clip, handle, proposed_boundary, transitions, limits);
        if outcome.is_applied() {
            self.last_outcome = outcome;
        }
        Ok(outcome)
    }

    /// Update from the drawn width of the clip. `content_width` is the pixel
    /// width of the whole movie.
    pub fn update_width(
        &mut self,
        sequence: &mut Sequence,
        width_px: i64,
        content_width: i64,
        limits: &EditLimits,
    ) -> Result<TrimOutcome> {
        let total = sequence.compute_duration();
        let proposed = duration_from_width(width_px, self.transitions, total, content_width);
        self.update_duration(sequence, proposed, limits)
    }

    /// Pointer cancel: put the boundaries and the overlay back.
    pub fn cancel(self, sequence: &mut Sequence) -> Result<()> {
        let clip = self.clip_mut(sequence)?;
        clip.set_boundaries(self.original_begin, self.original_end);
        clip.overlay = self.original_overlay.clone();
        debug!(clip = %self.clip_id, "trim cancelled");
        Ok(())
    }

    /// Pointer up. Returns the change to persist, or `None` when neither
    /// boundary moved by more than the tolerance.
    pub fn finish(self, sequence: &Sequence, limits: &EditLimits) -> Result<Option<TrimCommit>> {
        let clip = sequence
            .clip(&self.clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(self.clip_id.clone()))?;
        let begin = clip.boundary_begin();
        let end = clip.boundary_end();
        let moved = begin.abs_diff(self.original_begin) > limits.time_tolerance
            || end.abs_diff(self.original_end) > limits.time_tolerance;
        if !moved {
            debug!(clip = %self.clip_id, "trim ended without a net change");
            return Ok(None);
        }
        Ok(Some(TrimCommit {
            clip_id: self.clip_id,
            handle: self.handle,
            begin,
            end,
            is_video: clip.is_video(),
        }))
    }
}
