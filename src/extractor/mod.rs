pub mod orchestrator;
pub mod output;
pub mod summary;

pub use orchestrator::{BatchExtractor, BatchOptions, ProcessingOptions};
pub use summary::BatchResult;
