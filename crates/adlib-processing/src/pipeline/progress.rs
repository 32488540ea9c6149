//! Progress reporting and cancellation for pipeline runs.
//!
//! A run emits [`ProgressUpdate`]s to a [`ProgressReporter`] and polls a
//! [`CancellationToken`] between stages and between record batches.
//!
//! ```rust,ignore
//! use adlib_processing::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let watcher = token.clone();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(30));
//!     watcher.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .build()?
//!     .process(&ad_library, &targeting);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessingStage {
    /// Validating inputs
    Initializing,
    /// Cleaning ad-library rows and expanding delivery demographics
    Cleaning,
    /// Joining ads with targeting rows and filtering by start date
    Merging,
    /// Deriving demographic distributions and distances
    Deriving,
    /// Building the output table
    Assembling,
    /// Writing the table and report to disk
    Writing,
    Complete,
    Cancelled,
    Failed,
}

impl PreprocessingStage {
    /// Stages that do work, in execution order.
    pub const WORKING: [PreprocessingStage; 6] = [
        Self::Initializing,
        Self::Cleaning,
        Self::Merging,
        Self::Deriving,
        Self::Assembling,
        Self::Writing,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Cleaning => "Cleaning Ad Library",
            Self::Merging => "Merging Targeting",
            Self::Deriving => "Deriving Distributions",
            Self::Assembling => "Assembling Table",
            Self::Writing => "Writing Output",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run spent in this stage. Working stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Cleaning => 0.30,
            Self::Merging => 0.15,
            Self::Deriving => 0.30,
            Self::Assembling => 0.13,
            Self::Writing => 0.10,
            Self::Complete | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Overall progress when this stage starts.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Cleaning => 0.02,
            Self::Merging => 0.32,
            Self::Deriving => 0.47,
            Self::Assembling => 0.77,
            Self::Writing => 0.90,
            Self::Complete => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PreprocessingStage,

    /// Finer-grained position, e.g. `"Batch 3/10"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within the stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    fn at(stage: PreprocessingStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        let progress = stage.base_progress() + stage.weight() * stage_progress;
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    pub fn new(stage: PreprocessingStage, stage_progress: f32, message: impl Into<String>) -> Self {
        Self::at(stage, stage_progress, message)
    }

    pub fn with_sub_stage(
        stage: PreprocessingStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::at(stage, stage_progress, message)
        }
    }

    /// Update for an iterative step, `current` of `total` items done.
    pub fn with_items(
        stage: PreprocessingStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::at(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::at(PreprocessingStage::Complete, 1.0, message)
    }

    pub fn cancelled() -> Self {
        Self::at(PreprocessingStage::Cancelled, 0.0, "Pipeline cancelled by user")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::at(PreprocessingStage::Failed, 0.0, message)
    }
}

/// Receiver of progress updates.
///
/// Called from the thread running the pipeline, so implementations must be
/// `Send + Sync` and should return quickly.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Shared flag for cancelling a running pipeline from another thread.
///
/// Clones share state. A cancelled run returns
/// [`PreprocessingError::Cancelled`](crate::error::PreprocessingError::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
