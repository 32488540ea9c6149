//! Pipeline module.
//!
//! This module provides the preprocessing pipeline, the targeting merge and
//! criteria expansion, and progress/cancellation support.

mod builder;
pub mod criteria;
pub mod merge;
pub mod progress;
mod table;

pub use builder::{Pipeline, PipelineBuilder};
pub use criteria::{CriteriaProfile, TargetingCriteria};
pub use merge::{MergeOutcome, TargetingTable, merge_targeting};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PreprocessingStage, ProgressReporter,
    ProgressUpdate,
};
