use crate::config::ZoomConfig;
use crate::error::{CoreError, Result};
use crate::types::*;
use crate::zoom::{PixelMapper, ZoomLevel};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const PROJECT_EXTENSION: &str = "splice";

impl Project {
    /// Create a new empty project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            theme: None,
            sequence: Sequence::new(),
            audio_tracks: vec![],
            zoom: ZoomLevel::default(),
            playhead: TimeMs::ZERO,
        }
    }

    /// Save project to a file as pretty-printed JSON.
    /// Automatically appends `.splice` extension if not present.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = ensure_extension(path.as_ref());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Load a project from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let project: Project = serde_json::from_str(&data)?;
        project.sequence.check_invariants()?;
        Ok(project)
    }

    pub fn compute_duration(&self) -> TimeMs {
        self.sequence.compute_duration()
    }

    /// Move the playhead, clamped to the movie. Returns the new position.
    pub fn move_playhead(&mut self, time: TimeMs) -> TimeMs {
        self.playhead = time.clamp(TimeMs::ZERO, self.compute_duration());
        self.playhead
    }

    pub fn set_zoom(&mut self, level: i64, config: &ZoomConfig) -> ZoomLevel {
        self.zoom = ZoomLevel::new(level, config);
        self.zoom
    }

    pub fn mapper(&self, viewport_width: u32, config: &ZoomConfig) -> PixelMapper {
        PixelMapper::new(self.zoom, viewport_width, config)
    }

    // -----------------------------------------------------------------------
    // Audio tracks
    // -----------------------------------------------------------------------

    pub fn audio_track(&self, id: &str) -> Option<&AudioTrack> {
        self.audio_tracks.iter().find(|t| t.id == id)
    }

    fn audio_track_mut(&mut self, id: &str) -> Result<&mut AudioTrack> {
        self.audio_tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::AudioTrackNotFound(id.to_string()))
    }

    pub fn add_audio_track(&mut self, mut track: AudioTrack) -> Result<()> {
        if self.audio_track(&track.id).is_some() {
            return Err(CoreError::DuplicateId(track.id));
        }
        track.volume = track.volume.min(100);
        track.start = track.start.max(TimeMs::ZERO);
        self.audio_tracks.push(track);
        Ok(())
    }

    pub fn remove_audio_track(&mut self, id: &str) -> Result<AudioTrack> {
        let idx = self
            .audio_tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CoreError::AudioTrackNotFound(id.to_string()))?;
        Ok(self.audio_tracks.remove(idx))
    }

    pub fn set_audio_muted(&mut self, id: &str, muted: bool) -> Result<()> {
        self.audio_track_mut(id)?.muted = muted;
        Ok(())
    }

    pub fn set_audio_looping(&mut self, id: &str, looping: bool) -> Result<()> {
        self.audio_track_mut(id)?.looping = looping;
        Ok(())
    }

    /// Volume in percent; values above 100 are clamped.
    pub fn set_audio_volume(&mut self, id: &str, volume: u8) -> Result<()> {
        self.audio_track_mut(id)?.volume = volume.min(100);
        Ok(())
    }

    pub fn set_audio_start(&mut self, id: &str, start: TimeMs) -> Result<()> {
        self.audio_track_mut(id)?.start = start.max(TimeMs::ZERO);
        Ok(())
    }
}

fn ensure_extension(path: &Path) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some(PROJECT_EXTENSION) {
        path.to_path_buf()
    } else {
        let mut p = path.to_path_buf();
        let mut name = p.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(PROJECT_EXTENSION);
        p.set_file_name(name);
        p
    }
}
