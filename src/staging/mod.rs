mod loader;
mod mapping;
mod source;

pub use loader::{copy_catalog, copy_events, CopyReport};
pub use mapping::FieldMapping;
pub use source::{AccessPolicy, FsStagingSource, StagedObject, StagingSource};
