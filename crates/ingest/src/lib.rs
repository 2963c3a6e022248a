pub mod coordinator;
pub mod error;
pub mod report;

pub use coordinator::Coordinator;
pub use error::IngestError;
pub use report::{RunSummary, SkippedSource, SourceReport, SpanFailure};
