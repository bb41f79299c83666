use tracing::debug;

use crate::config::EditLimits;
use crate::error::{CoreError, Result};
use crate::types::*;

/// Transitions carried by a clip being inserted. They are placed directly
/// before and after the clip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeTransitions {
    pub begin: Option<Transition>,
    pub end: Option<Transition>,
}

/// A clip taken out of the sequence together with the transitions that
/// were attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedClip {
    pub clip: Clip,
    pub begin_transition: Option<Transition>,
    pub end_transition: Option<Transition>,
}

impl RemovedClip {
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.begin_transition.iter().chain(self.end_transition.iter())
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.entries.iter().filter_map(SequenceEntry::as_clip)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.entries.iter().filter_map(SequenceEntry::as_transition)
    }

    pub fn clip_count(&self) -> usize {
        self.clips().count()
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Entry index of any element with the given id.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    fn clip_index(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, SequenceEntry::Clip(c) if c.id == id))
    }

    fn transition_index(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, SequenceEntry::Transition(t) if t.id == id))
    }

    fn contains_id(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }

    pub fn clip(&self, id: &str) -> Option<&Clip> {
        self.clip_index(id).and_then(|i| self.entries[i].as_clip())
    }

    /// Mutable access to a clip. Changing boundaries never affects the
    /// ordering rules so this is safe to hand out.
    pub fn clip_mut(&mut self, id: &str) -> Option<&mut Clip> {
        self.entries.iter_mut().find_map(|e| match e {
            SequenceEntry::Clip(c) if c.id == id => Some(c),
            _ => None,
        })
    }

    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.transition_index(id)
            .and_then(|i| self.entries[i].as_transition())
    }

    pub fn first_clip(&self) -> Option<&Clip> {
        self.clips().next()
    }

    pub fn last_clip(&self) -> Option<&Clip> {
        self.clips().last()
    }

    pub fn is_last_clip(&self, id: &str) -> bool {
        self.last_clip().map(|c| c.id == id).unwrap_or(false)
    }

    pub fn next_clip(&self, id: &str) -> Option<&Clip> {
        let idx = self.clip_index(id)?;
        self.entries[idx + 1..].iter().find_map(SequenceEntry::as_clip)
    }

    pub fn previous_clip(&self, id: &str) -> Option<&Clip> {
        let idx = self.clip_index(id)?;
        self.entries[..idx].iter().rev().find_map(SequenceEntry::as_clip)
    }

    pub fn begin_transition(&self, clip_id: &str) -> Option<&Transition> {
        let idx = self.clip_index(clip_id)?;
        if idx == 0 {
            return None;
        }
        self.entries[idx - 1].as_transition()
    }

    pub fn end_transition(&self, clip_id: &str) -> Option<&Transition> {
        let idx = self.clip_index(clip_id)?;
        self.entries.get(idx + 1).and_then(SequenceEntry::as_transition)
    }

    /// Sum of the begin and end transition durations of a clip.
    pub fn adjacent_transition_duration(&self, clip_id: &str) -> Result<TimeMs> {
        if self.clip_index(clip_id).is_none() {
            return Err(CoreError::ClipNotFound(clip_id.to_string()));
        }
        let begin = self.begin_transition(clip_id).map(|t| t.duration);
        let end = self.end_transition(clip_id).map(|t| t.duration);
        Ok(begin.unwrap_or(TimeMs::ZERO) + end.unwrap_or(TimeMs::ZERO))
    }

    /// Movie length: clip durations minus the overlap of every transition
    /// that sits between two clips.
    pub fn compute_duration(&self) -> TimeMs {
        let last = self.entries.len().saturating_sub(1);
        self.entries
            .iter()
            .enumerate()
            .fold(TimeMs::ZERO, |acc, (i, entry)| match entry {
                SequenceEntry::Clip(c) => acc + c.timeline_duration(),
                SequenceEntry::Transition(t) if i > 0 && i < last => acc - t.duration,
                SequenceEntry::Transition(_) => acc,
            })
    }

    /// Length of an entry as drawn on the timeline. Clips give up the space
    /// covered by their transitions.
    /// `None` when `index` is out of range.
    pub fn view_duration(&self, index: usize) -> Option<TimeMs> {
        let duration = match self.entries.get(index)? {
            SequenceEntry::Clip(c) => {
                let mut d = c.timeline_duration();
                let before = index.checked_sub(1).and_then(|i| self.entries.get(i));
                let after = self.entries.get(index + 1);
                for t in before.into_iter().chain(after).filter_map(SequenceEntry::as_transition) {
                    d -= t.duration;
                }
                d
            }
            SequenceEntry::Transition(t) => t.duration,
        };
        Some(duration)
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Insert a clip after `after` (or at the head when `None`). A transition
    /// occupying the slot is removed and returned. Edge transitions carried in
    /// `edges` are placed next to the new clip.
    pub fn insert_clip_after(
        &mut self,
        clip: Clip,
        after: Option<&str>,
        edges: EdgeTransitions,
    ) -> Result<Option<Transition>> {
        clip.check_source()?;
        for id in std::iter::once(clip.id.as_str())
            .chain(edges.begin.iter().map(|t| t.id.as_str()))
            .chain(edges.end.iter().map(|t| t.id.as_str()))
        {
            if self.contains_id(id) {
                return Err(CoreError::DuplicateId(id.to_string()));
            }
        }

        let mut index = match after {
            Some(after_id) => {
                self.clip_index(after_id)
                    .ok_or_else(|| CoreError::ClipNotFound(after_id.to_string()))?
                    + 1
            }
            None => 0,
        };

        let displaced = if self.entries.get(index).is_some_and(SequenceEntry::is_transition) {
            match self.entries.remove(index) {
                SequenceEntry::Transition(t) => Some(t),
                SequenceEntry::Clip(_) => None,
            }
        } else {
            None
        };
        if let Some(t) = &displaced {
            debug!(transition = %t.id, "transition displaced by clip insert");
        }

        debug!(clip = %clip.id, index, "insert clip");
        self.entries.insert(index, SequenceEntry::Clip(clip));
        if let Some(t) = edges.begin {
            self.entries.insert(index, SequenceEntry::Transition(t));
            index += 1;
        }
        if let Some(t) = edges.end {
            self.entries.insert(index + 1, SequenceEntry::Transition(t));
        }

        self.relink();
        Ok(displaced)
    }

    /// Remove a clip and both of its transitions. When `replacement` is given
    /// and clips remain, it is inserted in the vacated slot.
    pub fn remove_clip(
        &mut self,
        clip_id: &str,
        replacement: Option<Transition>,
    ) -> Result<RemovedClip> {
        let mut idx = self
            .clip_index(clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))?;
        if let Some(t) = &replacement {
            if self.contains_id(&t.id) {
                return Err(CoreError::DuplicateId(t.id.clone()));
            }
        }

        let begin_transition = if idx > 0 && self.entries[idx - 1].is_transition() {
            idx -= 1;
            take_transition(self.entries.remove(idx))
        } else {
            None
        };

        let clip = match self.entries.remove(idx) {
            SequenceEntry::Clip(c) => c,
            SequenceEntry::Transition(_) => {
                return Err(CoreError::InvariantViolated(format!(
                    "expected clip {clip_id} at index {idx}"
                )))
            }
        };

        let end_transition = if self.entries.get(idx).is_some_and(SequenceEntry::is_transition) {
            take_transition(self.entries.remove(idx))
        } else {
            None
        };

        if let Some(t) = replacement {
            if self.clip_count() > 0 {
                debug!(transition = %t.id, index = idx, "insert replacement transition");
                self.entries.insert(idx, SequenceEntry::Transition(t));
            } else {
                debug!(transition = %t.id, "replacement transition dropped, no clips left");
            }
        }

        self.relink();
        Ok(RemovedClip {
            clip,
            begin_transition,
            end_transition,
        })
    }

    /// Move a clip after `after` (or to the head). The moved clip loses its
    /// transitions, and a transition occupying the destination slot is
    /// removed too. Every dropped transition is returned.
    pub fn move_clip(&mut self, clip_id: &str, after: Option<&str>) -> Result<Vec<Transition>> {
        if self.clip_index(clip_id).is_none() {
            return Err(CoreError::ClipNotFound(clip_id.to_string()));
        }
        if let Some(after_id) = after {
            if after_id == clip_id {
                return Err(CoreError::InvalidOperation(format!(
                    "cannot move clip {clip_id} after itself"
                )));
            }
            if self.clip_index(after_id).is_none() {
                return Err(CoreError::ClipNotFound(after_id.to_string()));
            }
        }

        let removed = self.remove_clip(clip_id, None)?;
        let mut affected: Vec<Transition> = removed.transitions().cloned().collect();
        let displaced = self.insert_clip_after(removed.clip, after, EdgeTransitions::default())?;
        affected.extend(displaced);
        Ok(affected)
    }

    /// Place a transition after `after` (or at the head). An existing
    /// transition in that slot is replaced and returned.
    pub fn add_transition(
        &mut self,
        transition: Transition,
        after: Option<&str>,
    ) -> Result<Option<Transition>> {
        if self.clip_count() == 0 {
            return Err(CoreError::EmptySequence);
        }
        if self.contains_id(&transition.id) {
            return Err(CoreError::DuplicateId(transition.id));
        }
        let slot = match after {
            Some(after_id) => {
                self.clip_index(after_id)
                    .ok_or_else(|| CoreError::ClipNotFound(after_id.to_string()))?
                    + 1
            }
            None => 0,
        };

        let replaced = if self.entries.get(slot).is_some_and(SequenceEntry::is_transition) {
            let old = std::mem::replace(
                &mut self.entries[slot],
                SequenceEntry::Transition(transition),
            );
            take_transition(old)
        } else {
            self.entries.insert(slot, SequenceEntry::Transition(transition));
            None
        };

        self.relink();
        Ok(replaced)
    }

    pub fn remove_transition(&mut self, transition_id: &str) -> Result<Transition> {
        let idx = self
            .transition_index(transition_id)
            .ok_or_else(|| CoreError::TransitionNotFound(transition_id.to_string()))?;
        let removed = take_transition(self.entries.remove(idx))
            .ok_or_else(|| CoreError::TransitionNotFound(transition_id.to_string()))?;
        self.relink();
        Ok(removed)
    }

    /// Change the style and duration of a transition in place.
    pub fn edit_transition(
        &mut self,
        transition_id: &str,
        kind: TransitionKind,
        duration: TimeMs,
    ) -> Result<()> {
        let transition = self
            .entries
            .iter_mut()
            .find_map(|e| match e {
                SequenceEntry::Transition(t) if t.id == transition_id => Some(t),
                _ => None,
            })
            .ok_or_else(|| CoreError::TransitionNotFound(transition_id.to_string()))?;
        transition.kind = kind;
        transition.duration = duration;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per-field setters
    // -----------------------------------------------------------------------

    pub fn set_clip_muted(&mut self, clip_id: &str, muted: bool) -> Result<()> {
        self.require_clip_mut(clip_id)?.muted = muted;
        Ok(())
    }

    pub fn set_clip_rendering_mode(&mut self, clip_id: &str, mode: RenderingMode) -> Result<()> {
        self.require_clip_mut(clip_id)?.rendering_mode = mode;
        Ok(())
    }

    /// Attach, replace or (with `None`) remove the overlay of a clip. The
    /// overlay window is fitted inside the clip.
    pub fn set_overlay(&mut self, clip_id: &str, overlay: Option<Overlay>) -> Result<()> {
        let clip = self.require_clip_mut(clip_id)?;
        let span = clip.timeline_duration();
        clip.overlay = overlay.map(|mut o| {
            o.fit_within(span);
            o
        });
        Ok(())
    }

    fn require_clip_mut(&mut self, clip_id: &str) -> Result<&mut Clip> {
        self.clip_mut(clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Verify the ordering rules: transitions are never adjacent, never exist
    /// without clips, and reference their actual neighbours. Every clip must
    /// also pass `Clip::check_source`.
    pub fn check_invariants(&self) -> Result<()> {
        if self.clip_count() == 0 && !self.entries.is_empty() {
            return Err(CoreError::InvariantViolated(
                "transition in a sequence without clips".into(),
            ));
        }
        for clip in self.clips() {
            clip.check_source()?;
        }
        for (i, entry) in self.entries.iter().enumerate() {
            let SequenceEntry::Transition(t) = entry else {
                continue;
            };
            let prev = if i > 0 { Some(&self.entries[i - 1]) } else { None };
            let next = self.entries.get(i + 1);
            if prev.is_some_and(SequenceEntry::is_transition) {
                return Err(CoreError::InvariantViolated(format!(
                    "transitions {} and {} are adjacent",
                    prev.map(SequenceEntry::id).unwrap_or_default(),
                    t.id
                )));
            }
            let expected_after = prev.and_then(SequenceEntry::as_clip).map(|c| c.id.as_str());
            if t.after_clip_id.as_deref() != expected_after {
                return Err(CoreError::InvariantViolated(format!(
                    "transition {} follows {:?} but references {:?}",
                    t.id, expected_after, t.after_clip_id
                )));
            }
            let expected_before = next.and_then(SequenceEntry::as_clip).map(|c| c.id.as_str());
            if t.before_clip_id.as_deref() != expected_before {
                return Err(CoreError::InvariantViolated(format!(
                    "transition {} precedes {:?} but references {:?}",
                    t.id, expected_before, t.before_clip_id
                )));
            }
        }
        Ok(())
    }

    /// Apply `Clip::validate` to every clip.
    pub fn validate_clips(&self, limits: &EditLimits) -> Result<()> {
        self.clips().try_for_each(|c| c.validate(limits))
    }

    /// Re-stamp every transition with its current neighbours.
    fn relink(&mut self) {
        let links: Vec<(Option<String>, Option<String>)> = (0..self.entries.len())
            .map(|i| {
                let after = if i > 0 {
                    self.entries[i - 1].as_clip().map(|c| c.id.clone())
                } else {
                    None
                };
                let before = self
                    .entries
                    .get(i + 1)
                    .and_then(SequenceEntry::as_clip)
                    .map(|c| c.id.clone());
                (after, before)
            })
            .collect();

        for (entry, (after, before)) in self.entries.iter_mut().zip(links) {
            if let SequenceEntry::Transition(t) = entry {
                t.after_clip_id = after;
                t.before_clip_id = before;
            }
        }
    }
}

fn take_transition(entry: SequenceEntry) -> Option<Transition> {
    match entry {
        SequenceEntry::Transition(t) => Some(t),
        SequenceEntry::Clip(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn video(id: &str, ms: i64) -> Clip {
        Clip::video(id, TimeMs(ms))
    }

    fn crossfade(id: &str, ms: i64) -> Transition {
        Transition::new(id, TransitionKind::Crossfade, TimeMs(ms))
    }

    fn ids(seq: &Sequence) -> Vec<&str> {
        seq.entries().iter().map(SequenceEntry::id).collect()
    }

    fn abc() -> Sequence {
        let mut seq = Sequence::new();
        seq.insert_clip_after(video("a", 5_000), None, EdgeTransitions::default())
            .unwrap();
        seq.insert_clip_after(video("b", 4_000), Some("a"), EdgeTransitions::default())
            .unwrap();
        seq.insert_clip_after(video("c", 3_000), Some("b"), EdgeTransitions::default())
            .unwrap();
        seq
    }

    #[test]
    fn insert_at_head_and_after() {
        let mut seq = abc();
        seq.insert_clip_after(video("z", 1_000), None, EdgeTransitions::default())
            .unwrap();
        assert_eq!(ids(&seq), vec!["z", "a", "b", "c"]);
        assert_eq!(seq.compute_duration(), TimeMs(13_000));
    }

    #[test]
    fn insert_with_edge_transitions() {
        let mut seq = abc();
        let edges = EdgeTransitions {
            begin: Some(crossfade("t1", 500)),
            end: Some(crossfade("t2", 600)),
        };
        seq.insert_clip_after(video("x", 6_000), Some("a"), edges).unwrap();

        assert_eq!(ids(&seq), vec!["a", "t1", "x", "t2", "b", "c"]);
        let t1 = seq.transition("t1").unwrap();
        assert_eq!(t1.after_clip_id.as_deref(), Some("a"));
        assert_eq!(t1.before_clip_id.as_deref(), Some("x"));
        assert_eq!(seq.begin_transition("x").map(|t| t.id.as_str()), Some("t1"));
        assert_eq!(seq.end_transition("x").map(|t| t.id.as_str()), Some("t2"));
        assert_eq!(seq.adjacent_transition_duration("x").unwrap(), TimeMs(1_100));
        seq.check_invariants().unwrap();
    }

    #[test]
    fn insert_replaces_transition_in_slot() {
        let mut seq = abc();
        seq.add_transition(crossfade("ab", 800), Some("a")).unwrap();
        let displaced = seq
            .insert_clip_after(video("x", 2_000), Some("a"), EdgeTransitions::default())
            .unwrap();
        assert_eq!(displaced.map(|t| t.id), Some("ab".to_string()));
        assert_eq!(ids(&seq), vec!["a", "x", "b", "c"]);
        seq.check_invariants().unwrap();
    }

    #[test]
    fn insert_at_head_removes_head_transition() {
        let mut seq = abc();
        seq.add_transition(Transition::new("fade", TransitionKind::FadeBlack, TimeMs(500)), None)
            .unwrap();
        let edges = EdgeTransitions {
            begin: Some(crossfade("intro", 700)),
            end: None,
        };
        let displaced = seq.insert_clip_after(video("x", 2_000), None, edges).unwrap();
        assert_eq!(displaced.map(|t| t.id), Some("fade".to_string()));
        assert_eq!(ids(&seq), vec!["intro", "x", "a", "b", "c"]);
        let intro = seq.transition("intro").unwrap();
        assert_eq!(intro.after_clip_id, None);
        assert_eq!(intro.before_clip_id.as_deref(), Some("x"));
    }

    #[test]
    fn insert_unknown_after_is_not_found() {
        let mut seq = abc();
        let err = seq
            .insert_clip_after(video("x", 1_000), Some("nope"), EdgeTransitions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::ClipNotFound(id) if id == "nope"));
        assert_eq!(seq.clip_count(), 3);
    }

    #[test]
    fn insert_duplicate_id_rejected() {
        let mut seq = abc();
        let err = seq
            .insert_clip_after(video("b", 1_000), None, EdgeTransitions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId(_)));
    }

    #[test]
    fn insert_rejects_clip_outside_its_source() {
        let mut seq = abc();
        for clip in [Clip::video("v", TimeMs::ZERO), Clip::image("z", TimeMs::ZERO)] {
            let err = seq
                .insert_clip_after(clip, Some("a"), EdgeTransitions::default())
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidClip { .. }));
        }
        assert_eq!(ids(&seq), vec!["a", "b", "c"]);
    }

    #[test]
    fn invariants_cover_clip_windows_and_limits() {
        let mut seq = abc();
        seq.insert_clip_after(Clip::image("long", TimeMs(20_000)), Some("c"), EdgeTransitions::default())
            .unwrap();
        seq.check_invariants().unwrap();
        assert!(matches!(
            seq.validate_clips(&EditLimits::default()),
            Err(CoreError::InvalidClip { ref clip_id, .. }) if clip_id == "long"
        ));

        let mut broken = video("x", 3_000);
        broken.source = ClipSource::Video {
            source_duration: TimeMs(3_000),
            begin: TimeMs(2_000),
            end: TimeMs(2_000),
        };
        seq.entries.push(SequenceEntry::Clip(broken));
        assert!(matches!(seq.check_invariants(), Err(CoreError::InvalidClip { .. })));
    }

    #[test]
    fn remove_clip_takes_its_transitions() {
        let mut seq = abc();
        seq.add_transition(crossfade("ab", 800), Some("a")).unwrap();
        seq.add_transition(crossfade("bc", 700), Some("b")).unwrap();

        let removed = seq.remove_clip("b", None).unwrap();
        assert_eq!(removed.clip.id, "b");
        assert_eq!(removed.begin_transition.map(|t| t.id), Some("ab".to_string()));
        assert_eq!(removed.end_transition.map(|t| t.id), Some("bc".to_string()));
        assert_eq!(ids(&seq), vec!["a", "c"]);
        assert_eq!(seq.compute_duration(), TimeMs(8_000));
    }

    #[test]
    fn remove_clip_with_replacement_transition() {
        let mut seq = abc();
        seq.remove_clip("b", Some(crossfade("theme", 600))).unwrap();
        assert_eq!(ids(&seq), vec!["a", "theme", "c"]);
        let t = seq.transition("theme").unwrap();
        assert_eq!(t.after_clip_id.as_deref(), Some("a"));
        assert_eq!(t.before_clip_id.as_deref(), Some("c"));

        seq.remove_clip("a", Some(crossfade("theme2", 600))).unwrap();
        assert_eq!(ids(&seq), vec!["theme2", "c"]);
        seq.check_invariants().unwrap();
    }

    #[test]
    fn replacement_dropped_when_no_clips_remain() {
        let mut seq = Sequence::new();
        seq.insert_clip_after(video("a", 1_000), None, EdgeTransitions::default())
            .unwrap();
        seq.remove_clip("a", Some(crossfade("t", 300))).unwrap();
        assert!(seq.is_empty());
        seq.check_invariants().unwrap();
    }

    #[test]
    fn remove_unknown_clip_is_not_found() {
        let mut seq = abc();
        let err = seq.remove_clip("zz", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn move_clip_reorders_and_reports_transitions() {
        let mut seq = abc();
        seq.add_transition(crossfade("ab", 800), Some("a")).unwrap();
        seq.add_transition(crossfade("bc", 700), Some("b")).unwrap();

        let affected = seq.move_clip("a", Some("c")).unwrap();
        let affected: Vec<_> = affected.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(affected, vec!["ab"]);
        assert_eq!(ids(&seq), vec!["b", "bc", "c", "a"]);
        seq.check_invariants().unwrap();

        let affected = seq.move_clip("a", None).unwrap();
        assert!(affected.is_empty());
        assert_eq!(ids(&seq), vec!["a", "b", "bc", "c"]);
    }

    #[test]
    fn move_after_itself_is_rejected() {
        let mut seq = abc();
        assert!(matches!(
            seq.move_clip("b", Some("b")),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(seq.move_clip("b", Some("missing")).unwrap_err().is_not_found());
        assert_eq!(ids(&seq), vec!["a", "b", "c"]);
    }

    #[test]
    fn add_transition_replaces_occupant() {
        let mut seq = abc();
        assert!(seq.add_transition(crossfade("t1", 500), Some("a")).unwrap().is_none());
        let old = seq.add_transition(crossfade("t2", 900), Some("a")).unwrap();
        assert_eq!(old.map(|t| t.id), Some("t1".to_string()));
        assert_eq!(ids(&seq), vec!["a", "t2", "b", "c"]);
    }

    #[test]
    fn add_transition_to_empty_sequence_fails() {
        let mut seq = Sequence::new();
        assert!(matches!(
            seq.add_transition(crossfade("t", 500), None),
            Err(CoreError::EmptySequence)
        ));
    }

    #[test]
    fn edge_transitions_do_not_shorten_movie() {
        let mut seq = abc();
        seq.add_transition(Transition::new("in", TransitionKind::FadeBlack, TimeMs(500)), None)
            .unwrap();
        seq.add_transition(Transition::new("out", TransitionKind::FadeBlack, TimeMs(500)), Some("c"))
            .unwrap();
        assert_eq!(seq.compute_duration(), TimeMs(12_000));

        seq.add_transition(crossfade("ab", 1_000), Some("a")).unwrap();
        assert_eq!(seq.compute_duration(), TimeMs(11_000));
    }

    #[test]
    fn view_durations_sum_to_movie_length() {
        let mut seq = abc();
        seq.add_transition(Transition::new("in", TransitionKind::FadeBlack, TimeMs(500)), None)
            .unwrap();
        seq.add_transition(crossfade("ab", 1_000), Some("a")).unwrap();
        let total = (0..seq.len()).filter_map(|i| seq.view_duration(i)).fold(TimeMs::ZERO, |acc, d| acc + d);
        assert_eq!(total, seq.compute_duration());
        assert_eq!(seq.view_duration(1), Some(TimeMs(3_500)));
        assert_eq!(seq.view_duration(seq.len()), None);
    }

    #[test]
    fn edit_and_remove_transition() {
        let mut seq = abc();
        seq.add_transition(crossfade("t", 500), Some("b")).unwrap();
        seq.edit_transition("t", TransitionKind::SlidingTopOutBottomIn, TimeMs(900))
            .unwrap();
        let t = seq.transition("t").unwrap();
        assert_eq!(t.kind, TransitionKind::SlidingTopOutBottomIn);
        assert_eq!(t.duration, TimeMs(900));

        let removed = seq.remove_transition("t").unwrap();
        assert_eq!(removed.id, "t");
        assert!(seq.remove_transition("t").unwrap_err().is_not_found());
    }

    #[test]
    fn neighbour_lookups() {
        let seq = abc();
        assert_eq!(seq.first_clip().map(|c| c.id.as_str()), Some("a"));
        assert_eq!(seq.last_clip().map(|c| c.id.as_str()), Some("c"));
        assert!(seq.is_last_clip("c"));
        assert!(!seq.is_last_clip("b"));
        assert_eq!(seq.next_clip("a").map(|c| c.id.as_str()), Some("b"));
        assert_eq!(seq.previous_clip("a").map(|c| c.id.as_str()), None);
        assert_eq!(seq.previous_clip("c").map(|c| c.id.as_str()), Some("b"));
        assert!(seq.adjacent_transition_duration("zz").is_err());
    }

    #[test]
    fn field_setters() {
        let mut seq = abc();
        seq.set_clip_muted("a", true).unwrap();
        seq.set_clip_rendering_mode("a", RenderingMode::Crop).unwrap();
        seq.set_overlay("c", Some(Overlay::new(TimeMs(2_000), TimeMs(5_000), "End")))
            .unwrap();

        let a = seq.clip("a").unwrap();
        assert!(a.muted);
        assert_eq!(a.rendering_mode, RenderingMode::Crop);
        let overlay = seq.clip("c").unwrap().overlay.as_ref().unwrap();
        assert_eq!(overlay.start, TimeMs::ZERO);
        assert_eq!(overlay.duration, TimeMs(3_000));

        seq.set_overlay("c", None).unwrap();
        assert!(seq.clip("c").unwrap().overlay.is_none());
        assert!(seq.set_clip_muted("zz", true).unwrap_err().is_not_found());
    }

    #[test]
    fn sequence_serde_roundtrip() {
        let mut seq = abc();
        seq.add_transition(crossfade("ab", 800), Some("a")).unwrap();
        let json = serde_json::to_string(&seq).unwrap();
        let back: Sequence = serde_json::from_str(&json).unwrap();
        assert_eq!(seq, back);
        back.check_invariants().unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert { after: Option<usize>, begin: bool, end: bool },
        Remove { clip: usize, replace: bool },
        Move { clip: usize, after: Option<usize> },
        AddTransition { after: Option<usize> },
        RemoveTransition { index: usize },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (proptest::option::of(0usize..8), any::<bool>(), any::<bool>())
                .prop_map(|(after, begin, end)| Op::Insert { after, begin, end }),
            (0usize..8, any::<bool>()).prop_map(|(clip, replace)| Op::Remove { clip, replace }),
            (0usize..8, proptest::option::of(0usize..8))
                .prop_map(|(clip, after)| Op::Move { clip, after }),
            proptest::option::of(0usize..8).prop_map(|after| Op::AddTransition { after }),
            (0usize..8).prop_map(|index| Op::RemoveTransition { index }),
        ]
    }

    fn nth_clip_id(seq: &Sequence, n: usize) -> Option<String> {
        let count = seq.clip_count();
        if count == 0 {
            return None;
        }
        seq.clips().nth(n % count).map(|c| c.id.clone())
    }

    proptest! {
        #[test]
        fn random_edits_keep_invariants(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let mut seq = Sequence::new();
            let mut next = 0u32;
            let mut fresh = |prefix: &str| {
                next += 1;
                format!("{prefix}{next}")
            };

            for op in ops {
                let _ = match op {
                    Op::Insert { after, begin, end } => {
                        let after_id = after.and_then(|n| nth_clip_id(&seq, n));
                        let edges = EdgeTransitions {
                            begin: begin.then(|| crossfade(&fresh("t"), 300)),
                            end: end.then(|| crossfade(&fresh("t"), 300)),
                        };
                        seq.insert_clip_after(video(&fresh("c"), 4_000), after_id.as_deref(), edges)
                            .map(|_| ())
                    }
                    Op::Remove { clip, replace } => match nth_clip_id(&seq, clip) {
                        Some(id) => {
                            let replacement = replace.then(|| crossfade(&fresh("t"), 300));
                            seq.remove_clip(&id, replacement).map(|_| ())
                        }
                        None => Ok(()),
                    },
                    Op::Move { clip, after } => match nth_clip_id(&seq, clip) {
                        Some(id) => {
                            let after_id = after.and_then(|n| nth_clip_id(&seq, n));
                            seq.move_clip(&id, after_id.as_deref()).map(|_| ())
                        }
                        None => Ok(()),
                    },
                    Op::AddTransition { after } => {
                        let after_id = after.and_then(|n| nth_clip_id(&seq, n));
                        seq.add_transition(crossfade(&fresh("t"), 300), after_id.as_deref())
                            .map(|_| ())
                    }
                    Op::RemoveTransition { index } => {
                        let ids: Vec<String> = seq.transitions().map(|t| t.id.clone()).collect();
                        match ids.get(index % ids.len().max(1)) {
                            Some(id) => seq.remove_transition(id).map(|_| ()),
                            None => Ok(()),
                        }
                    }
                };
                prop_assert!(seq.check_invariants().is_ok(), "{:?}", seq.check_invariants());
            }
        }
    }
}
