//! Cleaning of raw ad-library exports.
//!
//! This module provides functionality for:
//! - Unframing exported text fields and deriving platform indicators
//! - Scraping spend, impression and audience bound pairs
//! - Adjusting delivery estimates to the pre-election window
//! - Expanding the demographic distribution into delivery shares

mod bounds;
mod demographics;
mod sanitizers;

pub use bounds::Bounds;

pub(crate) use bounds::{inclusive_days, weekday_index};
pub(crate) use sanitizers::platform_code;

use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{DemographicsError, PreprocessingError, Result};
use crate::types::AdRecord;
use crate::utils::{cell, column_names, optional_string_values, string_values};

use bounds::{active_share, extract_bounds, parse_delivery_date};
use demographics::{DEMOGRAPHIC_FIELD, expand_demographic_distribution};
use sanitizers::{platform_flags, unframe_text};

/// Ad-library columns consumed by the cleaner and not carried through.
pub const CONSUMED_AD_COLUMNS: [&str; 16] = [
    "id",
    "ad_creative_bodies",
    "ad_creative_link_captions",
    "ad_creative_link_titles",
    "ad_creative_link_descriptions",
    "ad_snapshot_url",
    "languages",
    "publisher_platforms",
    "spend",
    "impressions",
    "estimated_audience_size",
    "demographic_distribution",
    "delivery_by_region",
    "ad_delivery_start_time",
    "ad_delivery_stop_time",
    "Unnamed: 0",
];

const START_FIELD: &str = "ad_delivery_start_time";

/// Cleaner for raw ad-library frames.
pub struct AdLibraryCleaner {
    election_date: NaiveDate,
}

impl AdLibraryCleaner {
    pub fn new(election_date: NaiveDate) -> Self {
        Self { election_date }
    }

    /// Clean every row of an ad-library frame.
    ///
    /// The outer error covers frame-level problems (a missing `id` or start
    /// time column). Each row yields its own result so the caller can apply
    /// a skip-vs-abort policy.
    pub fn clean(&self, df: &DataFrame) -> Result<Vec<Result<AdRecord>>> {
        info!("Cleaning {} ad-library rows...", df.height());

        let ids = string_values(df, "id")?;
        let starts = string_values(df, START_FIELD)?;

        let mut optional: HashMap<&str, Vec<Option<String>>> = HashMap::new();
        for name in [
            "ad_creative_bodies",
            "languages",
            "publisher_platforms",
            "spend",
            "impressions",
            "estimated_audience_size",
            DEMOGRAPHIC_FIELD,
            "ad_delivery_stop_time",
        ] {
            if let Some(values) = optional_string_values(df, name)? {
                optional.insert(name, values);
            } else {
                debug!("Ad-library frame has no '{}' column", name);
            }
        }
        let field = |name: &str, row: usize| cell(optional.get(name), row);

        let records = (0..df.height())
            .map(|row| {
                let id = ids[row].clone().unwrap_or_default();
                self.clean_row(row, &id, starts[row].as_deref(), &field)
                    .map_err(|source| PreprocessingError::record(id, source))
            })
            .collect();

        Ok(records)
    }

    fn clean_row<'a>(
        &self,
        row: usize,
        id: &str,
        start: Option<&str>,
        field: &impl Fn(&str, usize) -> Option<&'a str>,
    ) -> std::result::Result<AdRecord, DemographicsError> {
        if id.trim().is_empty() {
            return Err(DemographicsError::schema("id", "missing ad id"));
        }

        let delivery_start = start
            .and_then(parse_delivery_date)
            .ok_or_else(|| DemographicsError::schema(START_FIELD, "missing or not a date"))?;
        let delivery_stop = field("ad_delivery_stop_time", row)
            .and_then(parse_delivery_date)
            .unwrap_or(delivery_start);

        let (facebook, instagram) = platform_flags(field("publisher_platforms", row));

        Ok(AdRecord {
            row,
            id: id.trim().to_string(),
            ad_creative_bodies: field("ad_creative_bodies", row).and_then(unframe_text),
            languages: field("languages", row).and_then(unframe_text),
            facebook,
            instagram,
            spend: extract_bounds(field("spend", row)),
            impressions: extract_bounds(field("impressions", row)),
            audience: extract_bounds(field("estimated_audience_size", row)),
            delivery_start,
            delivery_stop,
            ad_active: active_share(delivery_start, delivery_stop, self.election_date),
            shares: expand_demographic_distribution(field(DEMOGRAPHIC_FIELD, row))?,
        })
    }
}

/// Ad-library columns that are carried through to the output unchanged.
pub fn passthrough_ad_columns(df: &DataFrame) -> Vec<String> {
    column_names(df)
        .into_iter()
        .filter(|name| !CONSUMED_AD_COLUMNS.contains(&name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::AgeBin;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_frame() -> DataFrame {
        df![
            "id" => ["1", "2", "3"],
            "page_name" => ["Partei A", "Partei B", "Partei C"],
            "ad_creative_bodies" => [Some("['Wählt uns\\nam Sonntag']"), None, Some("[' ']")],
            "publisher_platforms" => ["['facebook', 'instagram']", "['instagram']", "['facebook']"],
            "spend" => ["{'lower_bound': '100', 'upper_bound': '199'}", "{'lower_bound': '0', 'upper_bound': '99'}", "{'lower_bound': '500'}"],
            "impressions" => ["{'lower_bound': '1000', 'upper_bound': '1999'}", "{'lower_bound': '0', 'upper_bound': '999'}", "{'lower_bound': '1000000'}"],
            "demographic_distribution" => [
                Some("[{'percentage': '0.6', 'age': '25-34', 'gender': 'female'}, {'percentage': '0.4', 'age': '35-44', 'gender': 'male'}]"),
                None,
                Some("[{'percentage': 'x', 'age': '25-34', 'gender': 'female'}]"),
            ],
            "ad_delivery_start_time" => ["2021-09-01", "2021-09-20", "2021-09-01"],
            "ad_delivery_stop_time" => [Some("2021-09-30"), None, Some("2021-09-02")],
        ]
        .unwrap()
    }

    #[test]
    fn test_clean_rows() {
        let cleaner = AdLibraryCleaner::new(date(2021, 9, 26));
        let records = cleaner.clean(&sample_frame()).unwrap();
        assert_eq!(records.len(), 3);

        let first = records[0].as_ref().unwrap();
        assert_eq!(first.ad_creative_bodies.as_deref(), Some("Wählt uns am Sonntag"));
        assert!(first.facebook && first.instagram);
        assert_eq!(first.spend.lower, Some(100.0));
        assert!((first.ad_active - 26.0 / 30.0).abs() < 1e-12);
        assert_eq!(first.shares.female, 0.6);
        assert_eq!(first.shares.age_share(AgeBin::Age35To44), 0.4);

        let second = records[1].as_ref().unwrap();
        assert_eq!(second.ad_creative_bodies, None);
        assert_eq!(second.delivery_stop, date(2021, 9, 20));
        assert_eq!(second.ad_active, 1.0);
        assert!(!second.facebook && second.instagram);
    }

    #[test]
    fn test_clean_reports_row_errors_with_id() {
        let cleaner = AdLibraryCleaner::new(date(2021, 9, 26));
        let records = cleaner.clean(&sample_frame()).unwrap();

        let err = records[2].as_ref().unwrap_err();
        let (record_id, source) = err.record_failure().unwrap();
        assert_eq!(record_id, "3");
        assert!(matches!(source, DemographicsError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_clean_requires_id_column() {
        let df = df!["ad_delivery_start_time" => ["2021-09-01"]].unwrap();
        let cleaner = AdLibraryCleaner::new(date(2021, 9, 26));
        assert!(matches!(
            cleaner.clean(&df),
            Err(PreprocessingError::ColumnNotFound(name)) if name == "id"
        ));
    }

    #[test]
    fn test_passthrough_columns() {
        assert_eq!(passthrough_ad_columns(&sample_frame()), vec!["page_name".to_string()]);
    }
}
