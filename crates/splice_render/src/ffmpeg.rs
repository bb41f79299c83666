use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use splice_core::types::TimeMs;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, trace, warn};

use crate::error::{RenderError, Result};
use crate::pool::{Bitmap, BitmapPool};
use crate::tracker::{
    FrameRef, MediaEvent, ThumbnailBatch, ThumbnailRequest, ThumbnailService,
    TransitionThumbnailRequest, WaveformRequest,
};
use crate::waveform::extract_waveform;

const DEFAULT_SAMPLES_PER_PEAK: u32 = 256;

/// Decode a single RGBA frame scaled to `width` x `height`. `time` is
/// ignored for still images.
pub fn extract_frame(
    pool: &BitmapPool,
    source: &Path,
    time: Option<TimeMs>,
    width: u32,
    height: u32,
) -> Result<Bitmap> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidRequest(format!("frame size {width}x{height}")));
    }
    if !source.exists() {
        return Err(RenderError::FileNotFound(source.to_path_buf()));
    }

    let mut cmd = Command::new("ffmpeg");
    if let Some(t) = time {
        cmd.args(["-ss", &format!("{:.3}", t.as_seconds())]);
    }
    let output = cmd
        .args([
            "-i",
            &source.to_string_lossy(),
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={width}:{height}"),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RenderError::FfmpegNotFound,
            _ => RenderError::Io(e),
        })?;

    if !output.status.success() {
        return Err(RenderError::FfmpegFailed(format!(
            "frame extraction failed for {}",
            source.display()
        )));
    }

    let mut bitmap = pool.acquire(width, height);
    let expected = bitmap.pixels().len();
    if output.stdout.len() != expected {
        return Err(RenderError::FrameSize {
            expected,
            actual: output.stdout.len(),
        });
    }
    bitmap.pixels_mut().copy_from_slice(&output.stdout);
    Ok(bitmap)
}

/// Times of `count` evenly spaced thumbnails starting at `start`.
pub fn thumbnail_times(start: TimeMs, end: TimeMs, count: u32) -> Vec<TimeMs> {
    if count <= 1 {
        return vec![start];
    }
    let span = (end - start).max(TimeMs::ZERO);
    (0..count as i64).map(|i| start + span * i / count as i64).collect()
}

pub fn extract_thumbnails(pool: &BitmapPool, request: &ThumbnailRequest) -> Result<Vec<Bitmap>> {
    if request.count == 0 || request.end < request.start {
        return Err(RenderError::InvalidRequest(format!(
            "{} thumbnails for {}..{}",
            request.count, request.start, request.end
        )));
    }

    if !request.is_video {
        // A still image looks the same at every time.
        let first = extract_frame(pool, &request.source, None, request.width, request.height)?;
        let mut bitmaps = Vec::with_capacity(request.count as usize);
        for _ in 1..request.count {
            let mut copy = pool.acquire(request.width, request.height);
            copy.pixels_mut().copy_from_slice(first.pixels());
            bitmaps.push(copy);
        }
        bitmaps.insert(0, first);
        return Ok(bitmaps);
    }

    thumbnail_times(request.start, request.end, request.count)
        .into_iter()
        .map(|t| extract_frame(pool, &request.source, Some(t), request.width, request.height))
        .collect()
}

fn black_frame(pool: &BitmapPool, width: u32, height: u32) -> Bitmap {
    let mut bitmap = pool.acquire(width, height);
    for px in bitmap.pixels_mut().chunks_exact_mut(4) {
        px[3] = 255;
    }
    bitmap
}

pub fn extract_transition_frames(
    pool: &BitmapPool,
    request: &TransitionThumbnailRequest,
) -> Result<Vec<Bitmap>> {
    request
        .frames
        .iter()
        .map(|FrameRef { source, time }| match source {
            Some(path) => extract_frame(pool, path, Some(*time), request.width, request.height),
            None => Ok(black_frame(pool, request.width, request.height)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// In-flight request count per id.
type PendingCounts = Arc<Mutex<HashMap<String, usize>>>;

/// Releases one in-flight request for `id` when dropped. The id stays
/// pending until every request for it has finished.
struct PendingGuard {
    pending: PendingCounts,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = pending.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                pending.remove(&self.id);
            }
        }
    }
}

/// [`ThumbnailService`] backed by ffmpeg subprocesses on the tokio blocking
/// pool. Results are sent on the channel returned by [`FfmpegMediaService::new`];
/// failures are logged and delivered as empty results.
pub struct FfmpegMediaService {
    events: mpsc::UnboundedSender<MediaEvent>,
    pool: BitmapPool,
    pending: PendingCounts,
    runtime: Handle,
    permits: Arc<Semaphore>,
    cache_dir: PathBuf,
    samples_per_peak: u32,
}

impl FfmpegMediaService {
    pub fn new(
        runtime: Handle,
        cache_dir: impl Into<PathBuf>,
        max_concurrent: usize,
    ) -> (Self, mpsc::UnboundedReceiver<MediaEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let service = Self {
            events,
            pool: BitmapPool::default(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cache_dir: cache_dir.into(),
            samples_per_peak: DEFAULT_SAMPLES_PER_PEAK,
        };
        (service, rx)
    }

    pub fn pool(&self) -> &BitmapPool {
        &self.pool
    }

    fn mark_pending(&self, id: &str) -> PendingGuard {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        *pending.entry(id.to_string()).or_insert(0) += 1;
        PendingGuard {
            pending: Arc::clone(&self.pending),
            id: id.to_string(),
        }
    }

    /// Run `work` on the blocking pool once a permit is free, then send the
    /// event built from its result.
    fn spawn<T, W, E>(&self, id: String, work: W, into_event: E)
    where
        T: Send + 'static,
        W: FnOnce() -> Result<T> + Send + 'static,
        E: FnOnce(Option<T>) -> MediaEvent + Send + 'static,
    {
        let guard = self.mark_pending(&id);
        let permits = Arc::clone(&self.permits);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => tokio::task::spawn_blocking(work)
                    .await
                    .unwrap_or_else(|e| Err(RenderError::FfmpegFailed(e.to_string()))),
                Err(_) => Err(RenderError::FfmpegFailed("media service shut down".into())),
            };
            let value = match result {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(element = %id, error = %e, "media extraction failed");
                    None
                }
            };
            drop(guard);
            if events.send(into_event(value)).is_err() {
                trace!(element = %id, "media event receiver dropped");
            }
        });
    }
}

impl ThumbnailService for FfmpegMediaService {
    fn request_thumbnails(&self, request: ThumbnailRequest) {
        debug!(
            element = %request.element_id,
            start = %request.start,
            end = %request.end,
            count = request.count,
            "queue thumbnails"
        );
        let pool = self.pool.clone();
        let (element_id, start, end) = (request.element_id.clone(), request.start, request.end);
        self.spawn(
            request.element_id.clone(),
            move || extract_thumbnails(&pool, &request),
            move |bitmaps| {
                MediaEvent::Thumbnails(ThumbnailBatch {
                    element_id,
                    start,
                    end,
                    bitmaps: bitmaps.unwrap_or_default(),
                })
            },
        );
    }

    fn request_transition_thumbnails(&self, request: TransitionThumbnailRequest) {
        debug!(transition = %request.transition_id, "queue transition thumbnails");
        let pool = self.pool.clone();
        let transition_id = request.transition_id.clone();
        self.spawn(
            request.transition_id.clone(),
            move || extract_transition_frames(&pool, &request),
            move |bitmaps| MediaEvent::TransitionThumbnails {
                transition_id,
                bitmaps: bitmaps.unwrap_or_default(),
            },
        );
    }

    fn request_waveform(&self, request: WaveformRequest) {
        debug!(track = %request.track_id, "queue waveform");
        let cache_dir = self.cache_dir.join("waveforms");
        let samples_per_peak = self.samples_per_peak;
        let track_id = request.track_id.clone();
        self.spawn(
            request.track_id.clone(),
            move || extract_waveform(&request.source, &cache_dir, &request.track_id, samples_per_peak),
            move |data| MediaEvent::Waveform {
                track_id,
                data: data.map(Arc::new),
            },
        );
    }

    fn is_pending(&self, element_id: &str) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.contains_key(element_id)
    }
}
