//! Event pipeline: reads JSON-lines input and feeds it to the sink callback in batches.

mod orchestrator;
mod source;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
