pub mod config;
pub mod constraints;
pub mod editing;
pub mod error;
pub mod layout;
pub mod project;
pub mod reorder;
pub mod session;
pub mod store;
pub mod trim;
pub mod types;
pub mod zoom;

pub use error::{CoreError, Result};
