pub mod archive;
pub mod staging;
pub mod walker;

pub use staging::StagingArea;
