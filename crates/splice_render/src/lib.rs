pub mod error;
pub mod ffmpeg;
pub mod pool;
pub mod tracker;
pub mod waveform;

pub use error::{RenderError, Result};
