use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use splice_core::config::EditorConfig;
use splice_core::layout::{AudioLayout, EntryKind, TimelineLayout};
use splice_core::types::Project;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Print the timeline layout of a splice project.
#[derive(Parser, Debug)]
#[command(name = "splice-inspect")]
#[command(version)]
struct Args {
    /// Project file
    path: PathBuf,

    /// Zoom level (defaults to the level saved in the project)
    #[arg(long)]
    zoom: Option<i64>,

    /// Viewport width in pixels
    #[arg(long, default_value = "1080")]
    viewport_width: u32,

    /// Editor config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let report = inspect(&args)?;
    print!("{report}");
    Ok(())
}

fn inspect(args: &Args) -> Result<String> {
    let config = match &args.config {
        Some(path) => EditorConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EditorConfig::default(),
    };

    // Parsed directly rather than through `Project::load_from_file`, so a
    // project that fails the invariant check can still be inspected.
    let data = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let mut project: Project = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a valid project", args.path.display()))?;
    info!(name = %project.name, entries = project.sequence.len(), "loaded project");

    if let Some(level) = args.zoom {
        let applied = project.set_zoom(level, &config.zoom);
        debug!(requested = level, applied = applied.get(), "zoom override");
    }
    let mapper = project.mapper(args.viewport_width, &config.zoom);
    let layout = TimelineLayout::with_mapper(&project.sequence, &mapper);
    let total = layout.total();

    let mut out = String::new();
    writeln!(out, "project:   {} ({})", project.name, project.id)?;
    writeln!(
        out,
        "duration:  {} ({} clips, {} transitions)",
        total,
        project.sequence.clip_count(),
        project.sequence.transitions().count()
    )?;
    writeln!(
        out,
        "zoom:      {} ({} ms/px), width {} px + {} px leading",
        mapper.zoom().get(),
        mapper.ms_per_pixel(),
        layout.content_width(),
        mapper.leading_padding()
    )?;
    writeln!(out, "playhead:  {} (x = {})", project.playhead, layout.x_at(project.playhead))?;

    writeln!(out, "\nentries:")?;
    for span in layout.spans() {
        let kind = match span.kind {
            EntryKind::Clip => "clip",
            EntryKind::Transition => "transition",
        };
        writeln!(
            out,
            "  {kind:<10} {:<24} {} - {}  [{:>7}, {:>7})",
            span.id, span.start_time, span.end_time, span.left, span.right
        )?;
    }

    let overlays = layout.overlay_spans(&project.sequence);
    if !overlays.is_empty() {
        writeln!(out, "\noverlays:")?;
        for o in &overlays {
            writeln!(
                out,
                "  {:<24} on {:<24} {} - {}  [{:>7}, {:>7})",
                o.overlay_id, o.clip_id, o.start_time, o.end_time, o.left, o.right
            )?;
        }
    }

    let audio = AudioLayout::compute(
        &project.audio_tracks,
        total,
        layout.content_width(),
        mapper.leading_padding(),
    );
    if !audio.spans.is_empty() {
        writeln!(out, "\naudio:")?;
        for a in &audio.spans {
            writeln!(
                out,
                "  {:<24} {} - {}  [{:>7}, {:>7})",
                a.track_id, a.start_time, a.end_time, a.left, a.right
            )?;
        }
    }

    match project.sequence.check_invariants() {
        Ok(()) => writeln!(out, "\ninvariants: ok")?,
        Err(e) => writeln!(out, "\ninvariants: violated: {e}")?,
    }
    Ok(out)
}
