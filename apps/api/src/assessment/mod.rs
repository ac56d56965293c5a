// Credit assessment pipeline: structuring, report generation, persistence.
// All LLM calls go through llm_client::CompletionModel; all writes through db::RecordStore.

pub mod handlers;
pub mod persister;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod structurer;

pub use pipeline::{Assessment, AssessmentRequest, Pipeline};
