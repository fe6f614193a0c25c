//! Pipeline orchestration for vidkb.
//!
//! Ties the stage adapters and the checkpoint store together: each item
//! moves through download → transcribe → summarize → archive, resuming from
//! its checkpoint, and a batch keeps going when individual items fail.

pub mod cleanup;
pub mod driver;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
mod testing;

pub use cleanup::CleanupScope;
pub use driver::{RunSummary, run_batch};
pub use pipeline::{
    ItemReport, Pipeline, PipelineOptions, PipelineState, ProgressReporter, SilentProgress,
};
pub use stages::StageSet;
