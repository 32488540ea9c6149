//! Custom error types for the ad-library preprocessing pipeline.
//!
//! Two layers are defined here:
//!
//! - [`DemographicsError`]: failures of the per-record demographic core
//!   (age parsing, category lookup, degenerate distributions, bad row fields).
//!   Every variant carries the offending field and raw value.
//! - [`PreprocessingError`]: pipeline-level failures (IO, Polars, missing
//!   columns, cancellation) plus [`PreprocessingError::Record`], which attaches the
//!   record id to a core failure so the caller can decide skip vs. abort.
//!
//! Both serialize as `{ code, message }` for JSON reports.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// Errors raised while deriving demographic distributions for one record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DemographicsError {
    /// A raw string does not match any recognized pattern.
    #[error("Failed to parse {field} value '{value}': {reason}")]
    Parse {
        field: String,
        value: String,
        reason: String,
    },

    /// A categorical value outside its closed set.
    #[error("Unrecognized {field} category '{value}'")]
    UnrecognizedCategory { field: String, value: String },

    /// Weights cannot form a probability distribution (zero or invalid mass).
    #[error("Degenerate {field} distribution for '{value}': {reason}")]
    DegenerateDistribution {
        field: String,
        value: String,
        reason: String,
    },

    /// A required row field is missing or non-numeric.
    #[error("Field '{field}' is missing or malformed: {reason}")]
    SchemaMismatch { field: String, reason: String },
}

impl DemographicsError {
    pub(crate) fn parse(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Parse {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DegenerateDistribution {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the input field that triggered the error.
    pub fn field(&self) -> &str {
        match self {
            Self::Parse { field, .. }
            | Self::UnrecognizedCategory { field, .. }
            | Self::DegenerateDistribution { field, .. }
            | Self::SchemaMismatch { field, .. } => field,
        }
    }

    /// Error code used in reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "PARSE_ERROR",
            Self::UnrecognizedCategory { .. } => "UNRECOGNIZED_CATEGORY",
            Self::DegenerateDistribution { .. } => "DEGENERATE_DISTRIBUTION",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
        }
    }
}

/// The main error type for the preprocessing pipeline.
#[derive(Error, Debug)]
pub enum PreprocessingError {
    /// Pipeline was cancelled through its cancellation token.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A single record could not be processed.
    #[error("Record '{record_id}': {source}")]
    Record {
        record_id: String,
        #[source]
        source: DemographicsError,
    },

    /// Report generation failed.
    #[error("Failed to generate report: {0}")]
    ReportGenerationFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PreprocessingError>,
    },
}

impl PreprocessingError {
    /// Attach a record id to a core failure.
    pub fn record(record_id: impl Into<String>, source: DemographicsError) -> Self {
        PreprocessingError::Record {
            record_id: record_id.into(),
            source,
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PreprocessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for report handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::Record { source, .. } => source.error_code(),
            Self::ReportGenerationFailed(_) => "REPORT_GENERATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Record id and core failure, looking through any added context.
    pub fn record_failure(&self) -> Option<(&str, &DemographicsError)> {
        match self {
            Self::Record { record_id, source } => Some((record_id, source)),
            Self::WithContext { source, .. } => source.record_failure(),
            _ => None,
        }
    }

    /// Check if this error only affects a single record.
    pub fn is_record_level(&self) -> bool {
        self.record_failure().is_some()
    }
}

impl Serialize for DemographicsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DemographicsError", 3)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("field", self.field())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PreprocessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PreprocessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for preprocessing operations.
pub type Result<T> = std::result::Result<T, PreprocessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PreprocessingError::Polars(e).with_context(context))
    }
}
