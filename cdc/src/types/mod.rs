mod event;

pub use event::{CdcEvent, EventType, FailedEvent, RawChange, RowImage};

/// Unique identifier of a pipeline, assigned at pipeline creation.
pub type PipelineId = u64;
