//! Configuration types for the ad-library preprocessing pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do when a single record cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordErrorPolicy {
    /// Drop the record, keep its error in the result, and continue.
    #[default]
    Skip,
    /// Stop the pipeline with the record's error.
    Abort,
}

fn default_election_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 9, 26).unwrap_or(NaiveDate::MIN)
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 7, 1).unwrap_or(NaiveDate::MIN)
}

/// Configuration for the preprocessing pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use adlib_processing::config::{PipelineConfig, RecordErrorPolicy};
///
/// let config = PipelineConfig::builder()
///     .country_id("DE")
///     .record_error_policy(RecordErrorPolicy::Abort)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Country code written to the `country_id` column.
    /// Default: "DE"
    pub country_id: String,

    /// Election day. Delivery after this date is excluded by scaling
    /// impressions, spend and audience by the share of active days before it.
    /// Default: 2021-09-26
    pub election_date: NaiveDate,

    /// Ads that started delivering before this date are dropped after the merge.
    /// Default: 2021-07-01
    pub start_date: NaiveDate,

    /// Skip-vs-abort policy for record-level failures.
    /// Default: Skip
    pub record_error_policy: RecordErrorPolicy,

    /// Output directory for the merged table and report.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Custom output file name (without extension).
    /// If None, uses "{country_id}_merged_data".
    /// Default: None
    pub output_name: Option<String>,

    /// Whether to save the merged table to disk.
    /// When false, results are kept in memory only.
    /// Default: true
    pub save_to_disk: bool,

    /// Whether to write a JSON report next to the merged table.
    /// Default: false
    pub emit_report: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            country_id: "DE".to_string(),
            election_date: default_election_date(),
            start_date: default_start_date(),
            record_error_policy: RecordErrorPolicy::default(),
            output_dir: PathBuf::from("output"),
            output_name: None,
            save_to_disk: true,
            emit_report: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Output file name without extension.
    pub fn output_file_stem(&self) -> String {
        self.output_name
            .clone()
            .unwrap_or_else(|| format!("{}_merged_data", self.country_id))
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.country_id.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("country_id".to_string()));
        }

        if self.start_date > self.election_date {
            return Err(ConfigValidationError::InvalidDateWindow {
                start_date: self.start_date,
                election_date: self.election_date,
            });
        }

        if let Some(name) = &self.output_name
            && name.trim().is_empty()
        {
            return Err(ConfigValidationError::EmptyField("output_name".to_string()));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Field '{0}' must not be empty")]
    EmptyField(String),

    #[error("Start date {start_date} is after election date {election_date}")]
    InvalidDateWindow {
        start_date: NaiveDate,
        election_date: NaiveDate,
    },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    country_id: Option<String>,
    election_date: Option<NaiveDate>,
    start_date: Option<NaiveDate>,
    record_error_policy: Option<RecordErrorPolicy>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    save_to_disk: Option<bool>,
    emit_report: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the country code written to every output row.
    pub fn country_id(mut self, country_id: impl Into<String>) -> Self {
        self.country_id = Some(country_id.into());
        self
    }

    /// Set the election date used for the delivery-window adjustment.
    pub fn election_date(mut self, date: NaiveDate) -> Self {
        self.election_date = Some(date);
        self
    }

    /// Set the earliest delivery start date kept after the merge.
    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Set the skip-vs-abort policy for record-level failures.
    pub fn record_error_policy(mut self, policy: RecordErrorPolicy) -> Self {
        self.record_error_policy = Some(policy);
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set a custom output file name (without extension).
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Enable or disable saving the merged table to disk.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Enable or disable the JSON report.
    pub fn emit_report(mut self, emit: bool) -> Self {
        self.emit_report = Some(emit);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            country_id: self.country_id.unwrap_or_else(|| "DE".to_string()),
            election_date: self.election_date.unwrap_or_else(default_election_date),
            start_date: self.start_date.unwrap_or_else(default_start_date),
            record_error_policy: self.record_error_policy.unwrap_or_default(),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            output_name: self.output_name,
            save_to_disk: self.save_to_disk.unwrap_or(true),
            emit_report: self.emit_report.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }
}
