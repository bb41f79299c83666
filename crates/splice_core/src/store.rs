use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::editing::EdgeTransitions;
use crate::error::{CoreError, Result};
use crate::types::*;
use crate::zoom::ZoomLevel;

/// A single persisted change. The session builds one per user edit and the
/// store replays it on the saved project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectEdit {
    InsertClip {
        clip: Clip,
        after: Option<String>,
        begin_transition: Option<Transition>,
        end_transition: Option<Transition>,
    },
    RemoveClip {
        clip_id: String,
        replacement: Option<Transition>,
    },
    MoveClip {
        clip_id: String,
        after: Option<String>,
    },
    SetClipBoundaries {
        clip_id: String,
        begin: TimeMs,
        end: TimeMs,
    },
    SetImageDuration {
        clip_id: String,
        duration: TimeMs,
    },
    SetClipMuted {
        clip_id: String,
        muted: bool,
    },
    SetRenderingMode {
        clip_id: String,
        mode: RenderingMode,
    },
    SetOverlay {
        clip_id: String,
        overlay: Option<Overlay>,
    },
    AddTransition {
        transition: Transition,
        after: Option<String>,
    },
    RemoveTransition {
        transition_id: String,
    },
    SetTransition {
        transition_id: String,
        kind: TransitionKind,
        duration: TimeMs,
    },
    AddAudioTrack {
        track: AudioTrack,
    },
    RemoveAudioTrack {
        track_id: String,
    },
    SetAudioMuted {
        track_id: String,
        muted: bool,
    },
    SetAudioLooping {
        track_id: String,
        looping: bool,
    },
    SetAudioVolume {
        track_id: String,
        volume: u8,
    },
    SetZoom {
        zoom: ZoomLevel,
    },
}

impl ProjectEdit {
    pub fn apply_to(&self, project: &mut Project) -> Result<()> {
        match self {
            ProjectEdit::InsertClip {
                clip,
                after,
                begin_transition,
                end_transition,
            } => {
                let edges = EdgeTransitions {
                    begin: begin_transition.clone(),
                    end: end_transition.clone(),
                };
                project
                    .sequence
                    .insert_clip_after(clip.clone(), after.as_deref(), edges)?;
            }
            ProjectEdit::RemoveClip {
                clip_id,
                replacement,
            } => {
                project.sequence.remove_clip(clip_id, replacement.clone())?;
            }
            ProjectEdit::MoveClip { clip_id, after } => {
                project.sequence.move_clip(clip_id, after.as_deref())?;
            }
            ProjectEdit::SetClipBoundaries {
                clip_id,
                begin,
                end,
            } => {
                require_clip(project, clip_id)?.try_set_boundaries(*begin, *end)?;
            }
            ProjectEdit::SetImageDuration { clip_id, duration } => {
                let clip = require_clip(project, clip_id)?;
                if clip.is_video() {
                    return Err(CoreError::InvalidOperation(format!(
                        "clip {clip_id} is not an image"
                    )));
                }
                clip.try_set_boundaries(TimeMs::ZERO, *duration)?;
            }
            ProjectEdit::SetClipMuted { clip_id, muted } => {
                project.sequence.set_clip_muted(clip_id, *muted)?;
            }
            ProjectEdit::SetRenderingMode { clip_id, mode } => {
                project.sequence.set_clip_rendering_mode(clip_id, *mode)?;
            }
            ProjectEdit::SetOverlay { clip_id, overlay } => {
                project.sequence.set_overlay(clip_id, overlay.clone())?;
            }
            ProjectEdit::AddTransition { transition, after } => {
                project
                    .sequence
                    .add_transition(transition.clone(), after.as_deref())?;
            }
            ProjectEdit::RemoveTransition { transition_id } => {
                project.sequence.remove_transition(transition_id)?;
            }
            ProjectEdit::SetTransition {
                transition_id,
                kind,
                duration,
            } => {
                project
                    .sequence
                    .edit_transition(transition_id, *kind, *duration)?;
            }
            ProjectEdit::AddAudioTrack { track } => project.add_audio_track(track.clone())?,
            ProjectEdit::RemoveAudioTrack { track_id } => {
                project.remove_audio_track(track_id)?;
            }
            ProjectEdit::SetAudioMuted { track_id, muted } => {
                project.set_audio_muted(track_id, *muted)?
            }
            ProjectEdit::SetAudioLooping { track_id, looping } => {
                project.set_audio_looping(track_id, *looping)?
            }
            ProjectEdit::SetAudioVolume { track_id, volume } => {
                project.set_audio_volume(track_id, *volume)?
            }
            ProjectEdit::SetZoom { zoom } => project.zoom = *zoom,
        }
        Ok(())
    }
}

fn require_clip<'a>(project: &'a mut Project, clip_id: &str) -> Result<&'a mut Clip> {
    project
        .sequence
        .clip_mut(clip_id)
        .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))
}

/// Persistence collaborator, keyed by a project path.
pub trait ProjectStore: Send {
    fn load(&self, path: &Path) -> Result<Project>;
    fn save(&self, path: &Path, project: &Project) -> Result<()>;
    /// Apply one edit to the stored project.
    fn apply(&self, path: &Path, edit: &ProjectEdit) -> Result<()>;
}

/// Stores each project as a pretty-printed JSON file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProjectStore;

impl ProjectStore for JsonProjectStore {
    fn load(&self, path: &Path) -> Result<Project> {
        Project::load_from_file(path)
    }

    fn save(&self, path: &Path, project: &Project) -> Result<()> {
        project.save_to_file(path)?;
        Ok(())
    }

    fn apply(&self, path: &Path, edit: &ProjectEdit) -> Result<()> {
        let mut project = self.load(path)?;
        edit.apply_to(&mut project)?;
        debug!(path = %path.display(), ?edit, "edit persisted");
        self.save(path, &project)
    }
}
