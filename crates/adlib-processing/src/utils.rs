//! Shared utilities for the preprocessing pipeline.
//!
//! This module contains helpers for pulling typed row values out of Polars
//! frames and for recognising missing-value markers in raw export strings.

use polars::prelude::*;

use crate::error::{PreprocessingError, Result};

// =============================================================================
// Column Extraction Utilities
// =============================================================================

/// Read a column as optional strings, casting non-string columns.
///
/// Fails with [`PreprocessingError::ColumnNotFound`] if the column is absent.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PreprocessingError::ColumnNotFound(name.to_string()))?;
    let casted = column.cast(&DataType::String)?;
    let series = casted.as_materialized_series();
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Like [`string_values`], but returns `None` when the column is absent.
pub fn optional_string_values(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<String>>>> {
    if has_column(df, name) {
        string_values(df, name).map(Some)
    } else {
        Ok(None)
    }
}

/// Read a column as optional floats. Values that do not cast become `None`.
pub fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PreprocessingError::ColumnNotFound(name.to_string()))?;
    let casted = column.cast(&DataType::Float64)?;
    let series = casted.as_materialized_series();
    Ok(series.f64()?.into_iter().collect())
}

/// Check whether a frame has a column with this exact name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|column| column.as_str() == name)
}

/// All column names of a frame as owned strings.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// Value at `row` of an optional column, flattening absent columns and nulls.
pub fn cell(values: Option<&Vec<Option<String>>>, row: usize) -> Option<&str> {
    values
        .and_then(|column| column.get(row))
        .and_then(|value| value.as_deref())
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 5] = [',', '$', '%', '€', ' '];

/// Common missing value markers in exported data.
pub const MISSING_MARKERS: [&str; 7] = ["nan", "none", "null", "n/a", "na", "[]", "{}"];

/// Clean a string for numeric parsing by removing formatting characters.
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Check if a string is a missing-value marker (or blank).
pub fn is_missing_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.is_empty() || MISSING_MARKERS.iter().any(|&marker| lower == marker)
}

/// Try to parse a string as a numeric value (f64).
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

// =============================================================================
// Tests
// =============================================================================
