pub mod error;
pub mod preview;

pub use error::{PreviewError, Result};
