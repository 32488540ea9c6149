//! Ad-Library Demographics Preprocessing Library
//!
//! Turns a political ad-library export and its targeting export into one
//! analysis-ready table, built with Rust and Polars.
//!
//! # Overview
//!
//! - **Cleaning**: text unframing, platform flags, spend/impression/audience
//!   bounds, and election-window scaling of delivery estimates
//! - **Demographic Expansion**: per-gender and per-age delivery shares from
//!   the raw `demographic_distribution` field
//! - **Targeting Merge**: location-targeting left join, inner join on the ad
//!   id, start-date and spend filters
//! - **Targeting Criteria**: per-category columns, use flags and counts from
//!   the `include` / `exclude` audiences
//! - **Demographic Comparison**: targeting vs. actual distributions over
//!   gender and seven age bins, compared with the earth-mover distance
//! - **Progress Reporting**: progress updates with cancellation support
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use adlib_processing::{Pipeline, PipelineConfig, RecordErrorPolicy};
//! use polars::prelude::*;
//!
//! let ad_library = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("data/ad_library_DE.csv".into()))?
//!     .finish()?;
//! let targeting = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("data/targeting_DE.csv".into()))?
//!     .finish()?;
//!
//! let config = PipelineConfig::builder()
//!     .country_id("DE")
//!     .record_error_policy(RecordErrorPolicy::Skip)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .process(&ad_library, &targeting)?;
//!
//! println!("{} rows, {} skipped", result.data.height(), result.skipped_records.len());
//! ```
//!
//! # Demographic core
//!
//! The [`demographics`] module can be used without the pipeline:
//!
//! ```rust,ignore
//! use adlib_processing::demographics::*;
//!
//! let record = DemographicRecord {
//!     id: "42".into(),
//!     targeting_gender: "Women".into(),
//!     targeting_age: "18 - 65+".into(),
//!     shares,
//! };
//! let profile = derive_profile(&record)?;
//! println!("{}", profile.age_distribution_distance);
//! ```

pub mod cleaner;
pub mod config;
pub mod demographics;
pub mod error;
pub mod pipeline;
pub mod reporting;
pub mod types;
pub mod utils;

pub use cleaner::{AdLibraryCleaner, Bounds};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder, RecordErrorPolicy};
pub use demographics::{
    AgeBin, AgeInterval, DeliveryShares, DemographicProfile, DemographicRecord, Distribution,
    Gender, TargetGender, derive_profile, map_age_interval, wasserstein_over_ranks,
};
pub use error::{DemographicsError, PreprocessingError, Result as PreprocessingResult, ResultExt};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, CriteriaProfile, Pipeline, PipelineBuilder,
    PreprocessingStage, ProgressReporter, ProgressUpdate, TargetingCriteria,
};
pub use reporting::{PipelineReport, ReportGenerator};
pub use types::{AdRecord, PipelineResult, PipelineSummary, SkippedRecord, TargetingRecord};
