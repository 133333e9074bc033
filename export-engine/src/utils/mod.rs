//! Utility modules for the export engine.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{ExportError, Result};
