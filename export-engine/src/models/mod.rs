pub mod export;
pub mod instance;

pub use export::ExportLogEntry;
pub use instance::InstanceRecord;
