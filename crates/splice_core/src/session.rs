use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::constraints::{clamp_transition_duration, transition_bounds, TrimHandle, TrimOutcome};
use crate::editing::{EdgeTransitions, RemovedClip};
use crate::error::{CoreError, Result};
use crate::reorder::{DropResolution, ReorderDrag};
use crate::store::{ProjectEdit, ProjectStore};
use crate::trim::{TrimCommit, TrimSession};
use crate::types::*;
use crate::zoom::ZoomLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Change notification delivered to every subscribed observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    ClipInserted { clip_id: String },
    ClipRemoved { clip_id: String },
    ClipMoved { clip_id: String },
    ClipChanged { clip_id: String },
    TransitionAdded { transition_id: String },
    TransitionRemoved { transition_id: String },
    TransitionChanged { transition_id: String },
    AudioTrackAdded { track_id: String },
    AudioTrackRemoved { track_id: String },
    AudioTrackChanged { track_id: String },
    DurationChanged { duration: TimeMs },
    PlayheadMoved { time: TimeMs },
    ZoomChanged { zoom: ZoomLevel },
}

type Listener = Box<dyn FnMut(&ProjectEvent) + Send>;

/// The editing context shared by every timeline component.
///
/// Owns the project and applies each user edit to it, then notifies the
/// subscribed observers and hands the edit to the store. Store failures are
/// logged and never undo the in-memory edit.
pub struct EditSession {
    project: Project,
    path: PathBuf,
    config: EditorConfig,
    store: Box<dyn ProjectStore>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    duration: TimeMs,
    trim: Option<TrimSession>,
    drag: Option<ReorderDrag>,
}

impl EditSession {
    pub fn new(
        project: Project,
        path: impl Into<PathBuf>,
        config: EditorConfig,
        store: Box<dyn ProjectStore>,
    ) -> Self {
        let duration = project.compute_duration();
        Self {
            project,
            path: path.into(),
            config,
            store,
            listeners: vec![],
            next_listener: 0,
            duration,
            trim: None,
            drag: None,
        }
    }

    pub fn open(
        path: impl Into<PathBuf>,
        config: EditorConfig,
        store: Box<dyn ProjectStore>,
    ) -> Result<Self> {
        let path = path.into();
        let project = store.load(&path)?;
        project.sequence.validate_clips(&config.limits)?;
        info!(path = %path.display(), name = %project.name, "project opened");
        Ok(Self::new(project, path, config, store))
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> TimeMs {
        self.duration
    }

    /// Immutable copy for the preview thread.
    pub fn snapshot(&self) -> Arc<Project> {
        Arc::new(self.project.clone())
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.path, &self.project)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn subscribe(&mut self, listener: impl FnMut(&ProjectEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: ProjectEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    fn persist(&self, edit: ProjectEdit) {
        if let Err(e) = self.store.apply(&self.path, &edit) {
            warn!(path = %self.path.display(), error = %e, ?edit, "failed to persist edit");
        }
    }

    fn reject<T>(op: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(op, error = %e, "edit rejected");
        }
        result
    }

    /// Recompute the movie length after a structural change and keep the
    /// playhead inside it.
    fn refresh_duration(&mut self) {
        let duration = self.project.compute_duration();
        if duration != self.duration {
            self.duration = duration;
            self.emit(ProjectEvent::DurationChanged { duration });
        }
        if self.project.playhead > duration {
            let time = self.project.move_playhead(duration);
            self.emit(ProjectEvent::PlayheadMoved { time });
        }
    }

    // -----------------------------------------------------------------------
    // Clips
    // -----------------------------------------------------------------------

    pub fn insert_clip(&mut self, clip: Clip, after: Option<&str>, edges: EdgeTransitions) -> Result<()> {
        Self::reject("insert_clip", clip.validate(&self.config.limits))?;
        let edit = ProjectEdit::InsertClip {
            clip: clip.clone(),
            after: after.map(str::to_string),
            begin_transition: edges.begin.clone(),
            end_transition: edges.end.clone(),
        };
        let clip_id = clip.id.clone();
        let added: Vec<String> = edges.begin.iter().chain(edges.end.iter()).map(|t| t.id.clone()).collect();
        let displaced = Self::reject(
            "insert_clip",
            self.project.sequence.insert_clip_after(clip, after, edges),
        )?;

        if let Some(t) = displaced {
            self.emit(ProjectEvent::TransitionRemoved { transition_id: t.id });
        }
        self.emit(ProjectEvent::ClipInserted { clip_id });
        for transition_id in added {
            self.emit(ProjectEvent::TransitionAdded { transition_id });
        }
        self.refresh_duration();
        self.persist(edit);
        Ok(())
    }

    pub fn remove_clip(&mut self, clip_id: &str, replacement: Option<Transition>) -> Result<RemovedClip> {
        let edit = ProjectEdit::RemoveClip {
            clip_id: clip_id.to_string(),
            replacement: replacement.clone(),
        };
        let replacement_id = replacement.as_ref().map(|t| t.id.clone());
        let removed = Self::reject("remove_clip", self.project.sequence.remove_clip(clip_id, replacement))?;

        for t in removed.transitions() {
            self.emit(ProjectEvent::TransitionRemoved {
                transition_id: t.id.clone(),
            });
        }
        self.emit(ProjectEvent::ClipRemoved {
            clip_id: clip_id.to_string(),
        });
        if let Some(transition_id) = replacement_id {
            if self.project.sequence.transition(&transition_id).is_some() {
                self.emit(ProjectEvent::TransitionAdded { transition_id });
            }
        }
        self.refresh_duration();
        self.persist(edit);
        Ok(removed)
    }

    pub fn move_clip(&mut self, clip_id: &str, after: Option<&str>) -> Result<Vec<Transition>> {
        let affected = Self::reject("move_clip", self.project.sequence.move_clip(clip_id, after))?;
        for t in &affected {
            self.emit(ProjectEvent::TransitionRemoved {
                transition_id: t.id.clone(),
            });
        }
        self.emit(ProjectEvent::ClipMoved {
            clip_id: clip_id.to_string(),
        });
        self.refresh_duration();
        self.persist(ProjectEdit::MoveClip {
            clip_id: clip_id.to_string(),
            after: after.map(str::to_string),
        });
        Ok(affected)
    }

    pub fn set_clip_muted(&mut self, clip_id: &str, muted: bool) -> Result<()> {
        Self::reject("set_clip_muted", self.project.sequence.set_clip_muted(clip_id, muted))?;
        self.emit(ProjectEvent::ClipChanged {
            clip_id: clip_id.to_string(),
        });
        self.persist(ProjectEdit::SetClipMuted {
            clip_id: clip_id.to_string(),
            muted,
        });
        Ok(())
    }

    pub fn set_rendering_mode(&mut self, clip_id: &str, mode: RenderingMode) -> Result<()> {
        Self::reject(
            "set_rendering_mode",
            self.project.sequence.set_clip_rendering_mode(clip_id, mode),
        )?;
        self.emit(ProjectEvent::ClipChanged {
            clip_id: clip_id.to_string(),
        });
        self.persist(ProjectEdit::SetRenderingMode {
            clip_id: clip_id.to_string(),
            mode,
        });
        Ok(())
    }

    pub fn set_overlay(&mut self, clip_id: &str, overlay: Option<Overlay>) -> Result<()> {
        Self::reject("set_overlay", self.project.sequence.set_overlay(clip_id, overlay))?;
        let stored = self
            .project
            .sequence
            .clip(clip_id)
            .and_then(|c| c.overlay.clone());
        self.emit(ProjectEvent::ClipChanged {
            clip_id: clip_id.to_string(),
        });
        self.persist(ProjectEdit::SetOverlay {
            clip_id: clip_id.to_string(),
            overlay: stored,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Add a transition in the slot after `after`. Without an explicit
    /// duration the default for the slot is used; an explicit one is clamped.
    /// Fails with `TransitionTooShort` when the neighbours cannot host one.
    pub fn add_transition(
        &mut self,
        kind: TransitionKind,
        after: Option<&str>,
        duration: Option<TimeMs>,
    ) -> Result<Transition> {
        let bounds = Self::reject(
            "add_transition",
            transition_bounds(&self.project.sequence, after, &self.config.limits),
        )?;
        let duration = duration
            .map(|d| clamp_transition_duration(d, &bounds))
            .unwrap_or(bounds.default);
        let transition = Transition::new(new_id(), kind, duration);

        let replaced = Self::reject(
            "add_transition",
            self.project
                .sequence
                .add_transition(transition.clone(), after),
        )?;
        if let Some(old) = replaced {
            self.emit(ProjectEvent::TransitionRemoved { transition_id: old.id });
        }
        self.emit(ProjectEvent::TransitionAdded {
            transition_id: transition.id.clone(),
        });
        self.refresh_duration();
        self.persist(ProjectEdit::AddTransition {
            transition: transition.clone(),
            after: after.map(str::to_string),
        });

        let stored = self
            .project
            .sequence
            .transition(&transition.id)
            .cloned()
            .unwrap_or(transition);
        Ok(stored)
    }

    pub fn remove_transition(&mut self, transition_id: &str) -> Result<Transition> {
        let removed = Self::reject(
            "remove_transition",
            self.project.sequence.remove_transition(transition_id),
        )?;
        self.emit(ProjectEvent::TransitionRemoved {
            transition_id: transition_id.to_string(),
        });
        self.refresh_duration();
        self.persist(ProjectEdit::RemoveTransition {
            transition_id: transition_id.to_string(),
        });
        Ok(removed)
    }

    /// Change kind and duration of a transition. The duration is clamped to
    /// the bounds of its slot. Returns the duration actually stored.
    pub fn set_transition(
        &mut self,
        transition_id: &str,
        kind: TransitionKind,
        duration: TimeMs,
    ) -> Result<TimeMs> {
        let after = Self::reject(
            "set_transition",
            self.project
                .sequence
                .transition(transition_id)
                .map(|t| t.after_clip_id.clone())
                .ok_or_else(|| CoreError::TransitionNotFound(transition_id.to_string())),
        )?;
        let bounds = Self::reject(
            "set_transition",
            transition_bounds(&self.project.sequence, after.as_deref(), &self.config.limits),
        )?;
        let duration = clamp_transition_duration(duration, &bounds);
        Self::reject(
            "set_transition",
            self.project
                .sequence
                .edit_transition(transition_id, kind, duration),
        )?;
        self.emit(ProjectEvent::TransitionChanged {
            transition_id: transition_id.to_string(),
        });
        self.refresh_duration();
        self.persist(ProjectEdit::SetTransition {
            transition_id: transition_id.to_string(),
            kind,
            duration,
        });
        Ok(duration)
    }

    // -----------------------------------------------------------------------
    // Trim gesture
    // -----------------------------------------------------------------------

    pub fn begin_trim(&mut self, clip_id: &str, handle: TrimHandle) -> Result<()> {
        let session = Self::reject(
            "begin_trim",
            TrimSession::begin(&self.project.sequence, clip_id, handle),
        )?;
        if let Some(previous) = self.trim.replace(session) {
            debug!(clip = previous.clip_id(), "unfinished trim replaced");
        }
        Ok(())
    }

    fn trim_session(&mut self) -> Result<&mut TrimSession> {
        self.trim
            .as_mut()
            .ok_or_else(|| CoreError::InvalidOperation("no trim in progress".into()))
    }

    fn trim_applied(&mut self, outcome: TrimOutcome) {
        if !outcome.is_applied() {
            return;
        }
        if let Some(clip_id) = self.trim.as_ref().map(|t| t.clip_id().to_string()) {
            self.emit(ProjectEvent::ClipChanged { clip_id });
        }
        self.refresh_duration();
    }

    pub fn update_trim_boundary(&mut self, proposed: TimeMs) -> Result<TrimOutcome> {
        let limits = self.config.limits;
        let mut session = self.trim.take().ok_or_else(|| {
            CoreError::InvalidOperation("no trim in progress".into())
        })?;
        let result = session.update_boundary(&mut self.project.sequence, proposed, &limits);
        self.trim = Some(session);
        let outcome = result?;
        self.trim_applied(outcome);
        Ok(outcome)
    }

    /// Trim from the drawn width of the clip; `content_width` is the pixel
    /// width of the whole movie.
    pub fn update_trim_width(&mut self, width_px: i64, content_width: i64) -> Result<TrimOutcome> {
        let limits = self.config.limits;
        let mut session = self.trim.take().ok_or_else(|| {
            CoreError::InvalidOperation("no trim in progress".into())
        })?;
        let result = session.update_width(&mut self.project.sequence, width_px, content_width, &limits);
        self.trim = Some(session);
        let outcome = result?;
        self.trim_applied(outcome);
        Ok(outcome)
    }

    pub fn cancel_trim(&mut self) -> Result<()> {
        self.trim_session()?;
        if let Some(session) = self.trim.take() {
            let clip_id = session.clip_id().to_string();
            session.cancel(&mut self.project.sequence)?;
            self.emit(ProjectEvent::ClipChanged { clip_id });
            self.refresh_duration();
        }
        Ok(())
    }

    /// End the gesture and persist the boundaries if they moved by more than
    /// the tolerance.
    pub fn end_trim(&mut self) -> Result<Option<TrimCommit>> {
        let session = self
            .trim
            .take()
            .ok_or_else(|| CoreError::InvalidOperation("no trim in progress".into()))?;
        let commit = session.finish(&self.project.sequence, &self.config.limits)?;
        if let Some(c) = &commit {
            let edit = if c.is_video {
                ProjectEdit::SetClipBoundaries {
                    clip_id: c.clip_id.clone(),
                    begin: c.begin,
                    end: c.end,
                }
            } else {
                ProjectEdit::SetImageDuration {
                    clip_id: c.clip_id.clone(),
                    duration: c.duration(),
                }
            };
            info!(clip = %c.clip_id, begin = %c.begin, end = %c.end, "trim committed");
            self.persist(edit);
        }
        Ok(commit)
    }

    // -----------------------------------------------------------------------
    // Drag to reorder
    // -----------------------------------------------------------------------

    pub fn begin_reorder(&mut self, clip_id: &str, start_x: i64) -> Result<()> {
        if self.project.sequence.clip(clip_id).is_none() {
            return Self::reject("begin_reorder", Err(CoreError::ClipNotFound(clip_id.to_string())));
        }
        self.drag = Some(ReorderDrag::new(clip_id, start_x, &self.config.drag));
        Ok(())
    }

    /// Pointer moved during a reorder drag. When a new drop position is
    /// resolved the playhead jumps to it.
    pub fn reorder_pointer_moved(&mut self, x: i64, now: Instant) -> Option<DropResolution> {
        let playhead = self.project.playhead;
        let drag = self.drag.as_mut()?;
        let resolution = drag.pointer_moved(x, now, &self.project.sequence, playhead)?;
        let time = self.project.move_playhead(resolution.time());
        self.emit(ProjectEvent::PlayheadMoved { time });
        Some(resolution)
    }

    /// Drop: move the clip to the last valid position. Returns whether a move
    /// happened.
    pub fn drop_reorder(&mut self) -> Result<bool> {
        let Some(target) = self.drag.take().and_then(ReorderDrag::finish) else {
            return Ok(false);
        };
        self.move_clip(&target.clip_id, target.after.as_deref())?;
        Ok(true)
    }

    pub fn cancel_reorder(&mut self) {
        self.drag = None;
    }

    // -----------------------------------------------------------------------
    // Zoom and playhead
    // -----------------------------------------------------------------------

    pub fn set_zoom(&mut self, level: i64) -> ZoomLevel {
        let zoom = ZoomLevel::new(level, &self.config.zoom);
        self.apply_zoom(zoom)
    }

    pub fn zoom_in(&mut self) -> ZoomLevel {
        let zoom = self.project.zoom.zoom_in(&self.config.zoom);
        self.apply_zoom(zoom)
    }

    pub fn zoom_out(&mut self) -> ZoomLevel {
        let zoom = self.project.zoom.zoom_out(&self.config.zoom);
        self.apply_zoom(zoom)
    }

    fn apply_zoom(&mut self, zoom: ZoomLevel) -> ZoomLevel {
        if zoom != self.project.zoom {
            self.project.zoom = zoom;
            self.emit(ProjectEvent::ZoomChanged { zoom });
            self.persist(ProjectEdit::SetZoom { zoom });
        }
        zoom
    }

    pub fn move_playhead(&mut self, time: TimeMs) -> TimeMs {
        let time = self.project.move_playhead(time);
        self.emit(ProjectEvent::PlayheadMoved { time });
        time
    }

    // -----------------------------------------------------------------------
    // Audio tracks
    // -----------------------------------------------------------------------

    pub fn add_audio_track(&mut self, track: AudioTrack) -> Result<()> {
        let edit = ProjectEdit::AddAudioTrack {
            track: track.clone(),
        };
        let track_id = track.id.clone();
        Self::reject("add_audio_track", self.project.add_audio_track(track))?;
        self.emit(ProjectEvent::AudioTrackAdded { track_id });
        self.persist(edit);
        Ok(())
    }

    pub fn remove_audio_track(&mut self, track_id: &str) -> Result<AudioTrack> {
        let removed = Self::reject("remove_audio_track", self.project.remove_audio_track(track_id))?;
        self.emit(ProjectEvent::AudioTrackRemoved {
            track_id: track_id.to_string(),
        });
        self.persist(ProjectEdit::RemoveAudioTrack {
            track_id: track_id.to_string(),
        });
        Ok(removed)
    }

    pub fn set_audio_muted(&mut self, track_id: &str, muted: bool) -> Result<()> {
        Self::reject("set_audio_muted", self.project.set_audio_muted(track_id, muted))?;
        self.audio_changed(
            track_id,
            ProjectEdit::SetAudioMuted {
                track_id: track_id.to_string(),
                muted,
            },
        );
        Ok(())
    }

    pub fn set_audio_looping(&mut self, track_id: &str, looping: bool) -> Result<()> {
        Self::reject("set_audio_looping", self.project.set_audio_looping(track_id, looping))?;
        self.audio_changed(
            track_id,
            ProjectEdit::SetAudioLooping {
                track_id: track_id.to_string(),
                looping,
            },
        );
        Ok(())
    }

    pub fn set_audio_volume(&mut self, track_id: &str, volume: u8) -> Result<()> {
        Self::reject("set_audio_volume", self.project.set_audio_volume(track_id, volume))?;
        self.audio_changed(
            track_id,
            ProjectEdit::SetAudioVolume {
                track_id: track_id.to_string(),
                volume: volume.min(100),
            },
        );
        Ok(())
    }

    fn audio_changed(&mut self, track_id: &str, edit: ProjectEdit) {
        self.emit(ProjectEvent::AudioTrackChanged {
            track_id: track_id.to_string(),
        });
        self.persist(edit);
    }
}
