use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use splice_core::types::{Project, TimeMs};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Renderer collaborator
// ---------------------------------------------------------------------------

/// Draws the movie onto the preview surface. Owned and driven by the preview
/// thread only.
pub trait PreviewRenderer: Send {
    fn render_frame(&mut self, snapshot: &Project, time: TimeMs) -> Result<()>;

    /// A frame of one clip, used while trimming it.
    fn render_clip_frame(&mut self, snapshot: &Project, clip_id: &str, time: TimeMs) -> Result<()>;

    fn clear_surface(&mut self);

    /// Begin playback and return without waiting for it to finish. Progress
    /// and the end of the movie are reported through `sink`, from any thread.
    fn start_playback(&mut self, snapshot: Arc<Project>, from: TimeMs, sink: PlaybackSink) -> Result<()>;

    /// Stop playback and return the time it stopped at.
    fn stop_playback(&mut self) -> TimeMs;
}

enum WorkerEvent {
    Started,
    StartFailed(String),
    Progress(TimeMs),
    Finished,
    Stopped(TimeMs),
}

/// Handle given to the renderer for reporting playback progress.
#[derive(Clone)]
pub struct PlaybackSink {
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl PlaybackSink {
    pub fn progress(&self, time: TimeMs) {
        let _ = self.events.send(WorkerEvent::Progress(time));
    }

    /// Playback reached the end of the movie.
    pub fn finished(&self) {
        let _ = self.events.send(WorkerEvent::Finished);
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl PreviewState {
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Starting | Self::Started)
    }
}

/// What the UI thread should react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewUpdate {
    Started,
    PlayheadMoved(TimeMs),
    /// `at` is the stop position, or `None` if playback never started.
    Stopped { at: Option<TimeMs> },
}

enum FrameJob {
    Movie { snapshot: Arc<Project>, time: TimeMs },
    Clip { snapshot: Arc<Project>, clip_id: String, time: TimeMs },
    Clear,
}

enum Command {
    /// Render whatever sits in the frame slot.
    Frame,
    Start { snapshot: Arc<Project>, from: TimeMs },
    Stop,
    Quit,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the preview thread and tracks playback state on the UI side.
///
/// Frame requests share a single slot, so a burst of requests renders only
/// the most recent one. A stop issued while playback is starting is held
/// until the thread reports that playback started.
pub struct PreviewController {
    state: PreviewState,
    stop_sent: bool,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    frame: Arc<Mutex<Option<FrameJob>>>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewController {
    pub fn spawn<R: PreviewRenderer + 'static>(renderer: R) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let frame = Arc::new(Mutex::new(None));
        let worker_frame = Arc::clone(&frame);

        let handle = thread::Builder::new()
            .name("preview".to_string())
            .spawn(move || run_worker(renderer, cmd_rx, event_tx, worker_frame))?;
        info!("preview thread started");

        Ok(Self {
            state: PreviewState::Stopped,
            stop_sent: false,
            commands: cmd_tx,
            events: event_rx,
            frame,
            worker: Some(handle),
        })
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PreviewState::Stopped
    }

    pub fn preview_frame(&mut self, snapshot: Arc<Project>, time: TimeMs) {
        trace!(time = %time, "preview frame");
        self.post_frame(FrameJob::Movie { snapshot, time });
    }

    pub fn preview_clip_frame(&mut self, snapshot: Arc<Project>, clip_id: impl Into<String>, time: TimeMs) {
        self.post_frame(FrameJob::Clip {
            snapshot,
            clip_id: clip_id.into(),
            time,
        });
    }

    pub fn clear(&mut self) {
        self.post_frame(FrameJob::Clear);
    }

    fn post_frame(&mut self, job: FrameJob) {
        if self.state.is_playing() {
            self.stop_playback();
        }
        *lock(&self.frame) = Some(job);
        self.send(Command::Frame);
    }

    /// Returns `false` if playback is not fully stopped.
    pub fn start_playback(&mut self, snapshot: Arc<Project>, from: TimeMs) -> bool {
        if self.state != PreviewState::Stopped {
            debug!(state = ?self.state, "preview did not start");
            return false;
        }
        lock(&self.frame).take();
        self.state = PreviewState::Starting;
        self.stop_sent = false;
        debug!(from = %from, "start preview");
        self.send(Command::Start { snapshot, from });
        true
    }

    pub fn stop_playback(&mut self) {
        match self.state {
            PreviewState::Stopped | PreviewState::Stopping => {
                trace!(state = ?self.state, "stop ignored");
            }
            PreviewState::Starting => {
                debug!("stop deferred until playback starts");
                self.state = PreviewState::Stopping;
            }
            PreviewState::Started => {
                self.state = PreviewState::Stopping;
                self.send_stop();
            }
        }
    }

    fn send_stop(&mut self) {
        if !self.stop_sent {
            self.stop_sent = true;
            self.send(Command::Stop);
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("preview thread is gone");
        }
    }

    fn handle(&mut self, event: WorkerEvent) -> Option<PreviewUpdate> {
        match event {
            WorkerEvent::Started => match self.state {
                PreviewState::Starting => {
                    self.state = PreviewState::Started;
                    Some(PreviewUpdate::Started)
                }
                PreviewState::Stopping => {
                    debug!("playback started, issuing deferred stop");
                    self.send_stop();
                    None
                }
                _ => None,
            },
            WorkerEvent::StartFailed(reason) => {
                debug!(%reason, "cannot start preview");
                match self.state {
                    PreviewState::Starting | PreviewState::Stopping => {
                        self.state = PreviewState::Stopped;
                        Some(PreviewUpdate::Stopped { at: None })
                    }
                    _ => None,
                }
            }
            WorkerEvent::Progress(time) => match self.state {
                PreviewState::Started | PreviewState::Stopping => Some(PreviewUpdate::PlayheadMoved(time)),
                _ => None,
            },
            WorkerEvent::Finished => {
                match self.state {
                    PreviewState::Starting => self.state = PreviewState::Stopping,
                    PreviewState::Started => {
                        self.state = PreviewState::Stopping;
                        self.send_stop();
                    }
                    _ => {}
                }
                None
            }
            WorkerEvent::Stopped(at) => {
                if self.state != PreviewState::Stopping {
                    return None;
                }
                info!(at = %at, "preview stopped");
                self.state = PreviewState::Stopped;
                Some(PreviewUpdate::Stopped { at: Some(at) })
            }
        }
    }

    /// Drain events without blocking.
    pub fn process_events(&mut self) -> Vec<PreviewUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            updates.extend(self.handle(event));
        }
        updates
    }

    /// Wait for the next update. `None` once the preview thread has exited.
    pub async fn next_update(&mut self) -> Option<PreviewUpdate> {
        loop {
            let event = self.events.recv().await?;
            if let Some(update) = self.handle(event) {
                return Some(update);
            }
        }
    }

    /// Stop the preview thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        let _ = self.commands.send(Command::Quit);
        if handle.join().is_err() {
            warn!("preview thread panicked");
        }
        self.state = PreviewState::Stopped;
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Preview thread
// ---------------------------------------------------------------------------

fn run_worker<R: PreviewRenderer>(
    mut renderer: R,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    frame: Arc<Mutex<Option<FrameJob>>>,
) {
    let mut playing = false;
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Frame => {
                let job = lock(&frame).take();
                if let Some(job) = job {
                    render_job(&mut renderer, job);
                }
            }
            Command::Start { snapshot, from } => {
                let sink = PlaybackSink {
                    events: events.clone(),
                };
                let event = match renderer.start_playback(snapshot, from, sink) {
                    Ok(()) => {
                        playing = true;
                        WorkerEvent::Started
                    }
                    Err(e) => WorkerEvent::StartFailed(e.to_string()),
                };
                let _ = events.send(event);
            }
            Command::Stop => {
                playing = false;
                let at = renderer.stop_playback();
                let _ = events.send(WorkerEvent::Stopped(at));
            }
            Command::Quit => {
                if playing {
                    renderer.stop_playback();
                }
                break;
            }
        }
    }
    debug!("preview thread exiting");
}

fn render_job<R: PreviewRenderer>(renderer: &mut R, job: FrameJob) {
    match job {
        FrameJob::Movie { snapshot, time } => {
            if let Err(e) = renderer.render_frame(&snapshot, time) {
                debug!(time = %time, error = %e, "cannot render preview frame");
            }
        }
        FrameJob::Clip {
            snapshot,
            clip_id,
            time,
        } => {
            if let Err(e) = renderer.render_clip_frame(&snapshot, &clip_id, time) {
                debug!(clip = %clip_id, time = %time, error = %e, "cannot render clip frame");
            }
        }
        FrameJob::Clear => renderer.clear_surface(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreviewError;
    use splice_core::editing::EdgeTransitions;
    use splice_core::types::Clip;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Frame(TimeMs),
        ClipFrame(String, TimeMs),
        Clear,
        Start(TimeMs),
        Stop,
    }

    #[derive(Default)]
    struct FakeRenderer {
        calls: Arc<Mutex<Vec<Call>>>,
        sink: Arc<Mutex<Option<PlaybackSink>>>,
        entered: Option<std_mpsc::Sender<()>>,
        gate: Option<std_mpsc::Receiver<()>>,
        fail_start: bool,
        stop_at: TimeMs,
    }

    impl PreviewRenderer for FakeRenderer {
        fn render_frame(&mut self, _snapshot: &Project, time: TimeMs) -> Result<()> {
            if let Some(entered) = self.entered.take() {
                let _ = entered.send(());
            }
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
            lock(&self.calls).push(Call::Frame(time));
            Ok(())
        }

        fn render_clip_frame(&mut self, snapshot: &Project, clip_id: &str, time: TimeMs) -> Result<()> {
            if snapshot.sequence.clip(clip_id).is_none() {
                return Err(PreviewError::ClipNotFound(clip_id.to_string()));
            }
            lock(&self.calls).push(Call::ClipFrame(clip_id.to_string(), time));
            Ok(())
        }

        fn clear_surface(&mut self) {
            lock(&self.calls).push(Call::Clear);
        }

        fn start_playback(&mut self, _snapshot: Arc<Project>, from: TimeMs, sink: PlaybackSink) -> Result<()> {
            lock(&self.calls).push(Call::Start(from));
            if self.fail_start {
                return Err(PreviewError::PlaybackFailed("at end of movie".into()));
            }
            *lock(&self.sink) = Some(sink);
            Ok(())
        }

        fn stop_playback(&mut self) -> TimeMs {
            lock(&self.calls).push(Call::Stop);
            self.stop_at
        }
    }

    fn snapshot() -> Arc<Project> {
        Arc::new(Project::new("demo"))
    }

    async fn next(controller: &mut PreviewController) -> Option<PreviewUpdate> {
        tokio::time::timeout(Duration::from_secs(5), controller.next_update())
            .await
            .expect("timed out waiting for preview update")
    }

    #[test]
    fn frame_requests_coalesce_to_latest() {
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let renderer = FakeRenderer {
            entered: Some(entered_tx),
            gate: Some(gate_rx),
            ..Default::default()
        };
        let calls = Arc::clone(&renderer.calls);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        controller.preview_frame(snapshot(), TimeMs(1_000));
        entered_rx.recv().unwrap();
        for t in [2_000, 3_000, 4_000] {
            controller.preview_frame(snapshot(), TimeMs(t));
        }
        gate_tx.send(()).unwrap();
        controller.shutdown();

        assert_eq!(*lock(&calls), vec![Call::Frame(TimeMs(1_000)), Call::Frame(TimeMs(4_000))]);
    }

    #[test]
    fn clip_frame_reaches_renderer() {
        let renderer = FakeRenderer::default();
        let calls = Arc::clone(&renderer.calls);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        let mut project = Project::new("demo");
        project
            .sequence
            .insert_clip_after(Clip::video("a", TimeMs(5_000)), None, EdgeTransitions::default())
            .unwrap();
        controller.preview_clip_frame(Arc::new(project), "a", TimeMs(1_500));
        controller.shutdown();

        assert_eq!(*lock(&calls), vec![Call::ClipFrame("a".into(), TimeMs(1_500))]);
    }

    #[test]
    fn failed_frame_is_skipped() {
        let renderer = FakeRenderer::default();
        let calls = Arc::clone(&renderer.calls);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        controller.preview_clip_frame(snapshot(), "missing", TimeMs(0));
        controller.clear();
        controller.shutdown();

        assert_eq!(*lock(&calls), vec![Call::Clear]);
    }

    #[tokio::test]
    async fn playback_reports_progress_and_stop_position() {
        let renderer = FakeRenderer {
            stop_at: TimeMs(2_600),
            ..Default::default()
        };
        let sink = Arc::clone(&renderer.sink);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        assert!(controller.start_playback(snapshot(), TimeMs(2_000)));
        assert_eq!(controller.state(), PreviewState::Starting);
        assert!(!controller.start_playback(snapshot(), TimeMs(0)));

        assert_eq!(next(&mut controller).await, Some(PreviewUpdate::Started));
        assert_eq!(controller.state(), PreviewState::Started);

        lock(&sink).as_ref().unwrap().progress(TimeMs(2_500));
        assert_eq!(
            next(&mut controller).await,
            Some(PreviewUpdate::PlayheadMoved(TimeMs(2_500)))
        );

        controller.stop_playback();
        assert_eq!(controller.state(), PreviewState::Stopping);
        assert_eq!(
            next(&mut controller).await,
            Some(PreviewUpdate::Stopped { at: Some(TimeMs(2_600)) })
        );
        assert!(controller.is_stopped());
    }

    #[tokio::test]
    async fn stop_while_starting_waits_for_start() {
        let renderer = FakeRenderer::default();
        let calls = Arc::clone(&renderer.calls);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        controller.start_playback(snapshot(), TimeMs(0));
        controller.stop_playback();
        assert_eq!(controller.state(), PreviewState::Stopping);
        controller.stop_playback();

        assert_eq!(
            next(&mut controller).await,
            Some(PreviewUpdate::Stopped { at: Some(TimeMs::ZERO) })
        );
        assert_eq!(*lock(&calls), vec![Call::Start(TimeMs(0)), Call::Stop]);
    }

    #[tokio::test]
    async fn failed_start_stops_without_position() {
        let renderer = FakeRenderer {
            fail_start: true,
            ..Default::default()
        };
        let mut controller = PreviewController::spawn(renderer).unwrap();

        controller.start_playback(snapshot(), TimeMs(9_000));
        assert_eq!(next(&mut controller).await, Some(PreviewUpdate::Stopped { at: None }));
        assert!(controller.is_stopped());
        assert!(controller.start_playback(snapshot(), TimeMs(0)));
    }

    #[tokio::test]
    async fn end_of_movie_stops_playback() {
        let renderer = FakeRenderer {
            stop_at: TimeMs(8_000),
            ..Default::default()
        };
        let sink = Arc::clone(&renderer.sink);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        controller.start_playback(snapshot(), TimeMs(0));
        assert_eq!(next(&mut controller).await, Some(PreviewUpdate::Started));
        lock(&sink).as_ref().unwrap().finished();
        assert_eq!(
            next(&mut controller).await,
            Some(PreviewUpdate::Stopped { at: Some(TimeMs(8_000)) })
        );
    }

    #[tokio::test]
    async fn frame_request_interrupts_playback() {
        let renderer = FakeRenderer::default();
        let calls = Arc::clone(&renderer.calls);
        let mut controller = PreviewController::spawn(renderer).unwrap();

        controller.start_playback(snapshot(), TimeMs(0));
        assert_eq!(next(&mut controller).await, Some(PreviewUpdate::Started));
        controller.preview_frame(snapshot(), TimeMs(3_000));
        assert_eq!(controller.state(), PreviewState::Stopping);
        assert!(matches!(next(&mut controller).await, Some(PreviewUpdate::Stopped { .. })));
        controller.shutdown();

        assert_eq!(
            *lock(&calls),
            vec![Call::Start(TimeMs(0)), Call::Stop, Call::Frame(TimeMs(3_000))]
        );
    }

    #[tokio::test]
    async fn drop_stops_playback_and_joins() {
        let renderer = FakeRenderer::default();
        let calls = Arc::clone(&renderer.calls);
        let mut controller = PreviewController::spawn(renderer).unwrap();
        controller.start_playback(snapshot(), TimeMs(0));
        assert_eq!(next(&mut controller).await, Some(PreviewUpdate::Started));

        drop(controller);
        assert_eq!(lock(&calls).last(), Some(&Call::Stop));
    }
}
