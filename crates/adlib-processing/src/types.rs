use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::cleaner::Bounds;
use crate::demographics::{DeliveryShares, DemographicProfile};
use crate::error::PreprocessingError;
use crate::pipeline::{CriteriaProfile, PreprocessingStage};

/// One cleaned ad-library row.
#[derive(Debug, Clone, PartialEq)]
pub struct AdRecord {
    /// Row index in the source frame, used to carry pass-through columns.
    pub row: usize,
    pub id: String,
    pub ad_creative_bodies: Option<String>,
    pub languages: Option<String>,
    pub facebook: bool,
    pub instagram: bool,
    pub spend: Bounds,
    pub impressions: Bounds,
    pub audience: Bounds,
    pub delivery_start: NaiveDate,
    /// Falls back to `delivery_start` when the export has no stop date.
    pub delivery_stop: NaiveDate,
    /// Share of delivery days on or before election day.
    pub ad_active: f64,
    pub shares: DeliveryShares,
}

impl AdRecord {
    pub fn spend_estimate(&self) -> Option<f64> {
        self.spend.midpoint().map(|v| v * self.ad_active)
    }

    pub fn impressions_estimate(&self) -> Option<f64> {
        self.impressions.midpoint().map(|v| v * self.ad_active)
    }

    pub fn audience_estimate(&self) -> Option<f64> {
        self.audience.midpoint().map(|v| v * self.ad_active)
    }

    /// `None` when spend is unknown or zero.
    pub fn impressions_per_spending(&self) -> Option<f64> {
        let spend = self.spend_estimate().filter(|spend| *spend > 0.0)?;
        self.impressions_estimate().map(|impressions| impressions / spend)
    }
}

/// One targeting-export row, joined with its location-targeting row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetingRecord {
    /// Row index in the source frame, used to carry pass-through columns.
    pub row: usize,
    /// Row index in the location frame, if one matched.
    pub location_row: Option<usize>,
    pub archive_id: String,
    /// Raw age range, e.g. `"18 - 65+"`.
    pub age: String,
    /// Raw declared gender, e.g. `"All"`.
    pub gender: String,
    /// Raw included audience criteria.
    pub include: Option<String>,
    /// Raw excluded audience criteria.
    pub exclude: Option<String>,
}

/// A merged ad with its derived demographic profile.
#[derive(Debug, Clone)]
pub struct ProcessedAd {
    pub ad: AdRecord,
    pub targeting: TargetingRecord,
    pub profile: DemographicProfile,
    pub criteria: CriteriaProfile,
}

/// A record dropped under the skip policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub record_id: String,
    pub stage: PreprocessingStage,
    pub code: String,
    pub field: Option<String>,
    pub message: String,
}

impl SkippedRecord {
    pub fn from_error(stage: PreprocessingStage, error: &PreprocessingError) -> Self {
        let (record_id, field) = match error.record_failure() {
            Some((record_id, source)) => (record_id.to_string(), Some(source.field().to_string())),
            None => (String::new(), None),
        };
        Self {
            record_id,
            stage,
            code: error.error_code().to_string(),
            field,
            message: error.to_string(),
        }
    }
}

/// Counts describing one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,
    /// Rows in the raw ad-library frame.
    pub ad_rows: usize,
    /// Rows in the raw targeting frame.
    pub targeting_rows: usize,
    /// Rows in the location-targeting frame, if one was given.
    #[serde(default)]
    pub location_rows: usize,
    /// Ad-library rows that survived cleaning.
    pub ads_cleaned: usize,
    /// Ads with no matching targeting row.
    pub ads_without_targeting: usize,
    /// Merged rows dropped for starting before the configured start date.
    pub ads_before_start_date: usize,
    /// Merged rows dropped for having no spend estimate.
    #[serde(default)]
    pub rows_without_spend: usize,
    /// Rows in the final table.
    pub records_derived: usize,
    /// Records dropped under the skip policy.
    pub records_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_gender_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_age_distance: Option<f64>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The merged, analysis-ready table.
    pub data: DataFrame,
    pub summary: PipelineSummary,
    pub skipped_records: Vec<SkippedRecord>,
    /// Where the table was written, if it was saved.
    pub output_file: Option<String>,
    /// Where the JSON report was written, if one was emitted.
    pub report_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DemographicsError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ad(spend: Bounds, impressions: Bounds, ad_active: f64) -> AdRecord {
        AdRecord {
            row: 0,
            id: "1".to_string(),
            ad_creative_bodies: None,
            languages: None,
            facebook: true,
            instagram: false,
            spend,
            impressions,
            audience: Bounds::default(),
            delivery_start: date(2021, 9, 1),
            delivery_stop: date(2021, 9, 10),
            ad_active,
            shares: DeliveryShares::default(),
        }
    }

    #[test]
    fn test_estimates_scale_by_active_share() {
        let record = ad(
            Bounds { lower: Some(100.0), upper: Some(200.0) },
            Bounds { lower: Some(1000.0), upper: Some(2000.0) },
            0.5,
        );
        assert_eq!(record.spend_estimate(), Some(75.0));
        assert_eq!(record.impressions_estimate(), Some(750.0));
        assert_eq!(record.impressions_per_spending(), Some(10.0));
        assert_eq!(record.audience_estimate(), None);
    }

    #[test]
    fn test_impressions_per_spending_zero_spend() {
        let record = ad(
            Bounds { lower: Some(0.0), upper: Some(0.0) },
            Bounds { lower: Some(1000.0), upper: Some(2000.0) },
            1.0,
        );
        assert_eq!(record.impressions_per_spending(), None);
    }

    #[test]
    fn test_skipped_record_from_error() {
        let error = PreprocessingError::record(
            "42",
            DemographicsError::schema("male", "missing or non-numeric"),
        );
        let skipped = SkippedRecord::from_error(PreprocessingStage::Deriving, &error);
        assert_eq!(skipped.record_id, "42");
        assert_eq!(skipped.code, "SCHEMA_MISMATCH");
        assert_eq!(skipped.field.as_deref(), Some("male"));
        assert_eq!(skipped.stage, PreprocessingStage::Deriving);
    }
}
