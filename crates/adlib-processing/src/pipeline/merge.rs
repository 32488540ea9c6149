//! Joining cleaned ads with their targeting rows.
//!
//! Targeting rows are first left-joined with the optional location-targeting
//! export on `archive_id`, then inner-joined with the ads on `id`.

use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use tracing::debug;

use crate::error::Result;
use crate::types::{AdRecord, TargetingRecord};
use crate::utils::{column_names, optional_string_values, string_values};

use super::criteria::{EXCLUDE_FIELD, INCLUDE_FIELD, is_indicator_column};

const ARCHIVE_ID: &str = "archive_id";

/// Targeting columns that are consumed or dropped rather than carried through.
const CONSUMED_TARGETING_COLUMNS: [&str; 4] = [ARCHIVE_ID, "age", "gender", "ds"];

/// Location columns that are dropped rather than carried through.
const CONSUMED_LOCATION_COLUMNS: [&str; 2] = [ARCHIVE_ID, "ds"];

fn archive_id_at(ids: &[Option<String>], row: usize) -> Option<String> {
    ids[row]
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Targeting rows grouped by `archive_id`, in source order.
#[derive(Debug, Default)]
pub struct TargetingTable {
    by_archive_id: HashMap<String, Vec<TargetingRecord>>,
    rows: usize,
    location_rows: usize,
}

impl TargetingTable {
    /// Read a targeting export without location targeting.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        Self::from_frames(df, None)
    }

    /// Read `archive_id`, `age`, `gender`, `include` and `exclude` from a
    /// targeting export and left-join the location export on `archive_id`.
    ///
    /// Rows without an archive id can never join and are left out. Missing
    /// ages or genders are kept as empty strings so derivation reports them
    /// against the ad. A targeting row with several location rows yields one
    /// record per location row.
    pub fn from_frames(df: &DataFrame, location: Option<&DataFrame>) -> Result<Self> {
        let archive_ids = string_values(df, ARCHIVE_ID)?;
        let ages = string_values(df, "age")?;
        let genders = string_values(df, "gender")?;
        let includes = optional_string_values(df, INCLUDE_FIELD)?;
        let excludes = optional_string_values(df, EXCLUDE_FIELD)?;

        let mut location_by_id: HashMap<String, Vec<usize>> = HashMap::new();
        if let Some(location) = location {
            let location_ids = string_values(location, ARCHIVE_ID)?;
            for row in 0..location.height() {
                if let Some(id) = archive_id_at(&location_ids, row) {
                    location_by_id.entry(id).or_default().push(row);
                }
            }
        }

        let mut table = Self {
            rows: df.height(),
            location_rows: location.map_or(0, DataFrame::height),
            ..Self::default()
        };
        for row in 0..df.height() {
            let Some(archive_id) = archive_id_at(&archive_ids, row) else {
                debug!("Targeting row {} has no archive_id", row);
                continue;
            };
            let record = TargetingRecord {
                row,
                location_row: None,
                archive_id: archive_id.clone(),
                age: ages[row].clone().unwrap_or_default(),
                gender: genders[row].clone().unwrap_or_default(),
                include: includes.as_ref().and_then(|values| values[row].clone()),
                exclude: excludes.as_ref().and_then(|values| values[row].clone()),
            };

            let entry = table.by_archive_id.entry(archive_id.clone()).or_default();
            match location_by_id.get(&archive_id) {
                Some(location_rows) => entry.extend(location_rows.iter().map(|&location_row| {
                    TargetingRecord {
                        location_row: Some(location_row),
                        ..record.clone()
                    }
                })),
                None => entry.push(record),
            }
        }
        Ok(table)
    }

    /// Targeting rows for one ad id.
    pub fn matches(&self, id: &str) -> &[TargetingRecord] {
        self.by_archive_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows in the source frame.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Rows in the location frame, 0 without one.
    pub fn location_rows(&self) -> usize {
        self.location_rows
    }
}

/// Ad/targeting pairs that survived the join and the row filters.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub pairs: Vec<(AdRecord, TargetingRecord)>,
    pub ads_without_targeting: usize,
    pub ads_before_start_date: usize,
    pub rows_without_spend: usize,
}

/// Inner-join ads with targeting rows on `id = archive_id`, keep ads
/// delivered from `start_date` on, then drop rows without a spend estimate.
///
/// An ad with several targeting rows yields one pair per row. Pairs keep the
/// ad order, then the targeting order. Dropped rows are counted per pair.
pub fn merge_targeting(
    ads: Vec<AdRecord>,
    targeting: &TargetingTable,
    start_date: NaiveDate,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for ad in ads {
        let matches = targeting.matches(&ad.id);
        if matches.is_empty() {
            outcome.ads_without_targeting += 1;
            continue;
        }
        if ad.delivery_start < start_date {
            outcome.ads_before_start_date += matches.len();
            continue;
        }
        if ad.spend_estimate().is_none() {
            debug!("Ad {} has no spend estimate", ad.id);
            outcome.rows_without_spend += matches.len();
            continue;
        }
        for targeting_row in matches {
            outcome.pairs.push((ad.clone(), targeting_row.clone()));
        }
    }

    outcome
}

/// Targeting columns carried into the output as `(source, output)` names.
///
/// Raw `include` / `exclude` audiences become `include_raw` / `exclude_raw`.
/// Indicator columns are left out; the output table recodes them.
pub fn passthrough_targeting_columns(df: &DataFrame) -> Vec<(String, String)> {
    column_names(df)
        .into_iter()
        .filter(|name| !CONSUMED_TARGETING_COLUMNS.contains(&name.as_str()))
        .filter(|name| !is_indicator_column(name))
        .map(|name| {
            let output = match name.as_str() {
                INCLUDE_FIELD | EXCLUDE_FIELD => format!("{name}_raw"),
                _ => name.clone(),
            };
            (name, output)
        })
        .collect()
}

/// Location columns carried into the output unchanged.
pub fn passthrough_location_columns(df: &DataFrame) -> Vec<(String, String)> {
    column_names(df)
        .into_iter()
        .filter(|name| !CONSUMED_LOCATION_COLUMNS.contains(&name.as_str()))
        .filter(|name| !is_indicator_column(name))
        .map(|name| (name.clone(), name))
        .collect()
}
