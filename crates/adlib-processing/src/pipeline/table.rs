//! Assembly of the merged output table.
//!
//! Derived columns come first in a fixed order, then the targeting-criteria
//! columns, followed by the ad-library, targeting and location columns that
//! are carried through unchanged.

use std::collections::HashSet;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::cleaner::{Bounds, inclusive_days, passthrough_ad_columns, platform_code, weekday_index};
use crate::demographics::{AgeBin, Category, TARGETING_AGE_FIELD, TARGETING_GENDER_FIELD};
use crate::error::{Result, ResultExt};
use crate::types::ProcessedAd;
use crate::utils::{column_names, string_values};

use super::criteria::{
    EXCLUDE_FIELD, EXCLUDE_LOCATION, INCLUDE_FIELD, category_column, collect_categories,
    indicator_value, is_indicator_column,
};
use super::merge::{passthrough_location_columns, passthrough_targeting_columns};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column-by-column frame builder that drops repeated names.
#[derive(Default)]
struct TableBuilder {
    columns: Vec<Column>,
    names: HashSet<String>,
}

impl TableBuilder {
    fn push<T>(&mut self, name: &str, values: Vec<T>)
    where
        Series: NamedFrom<Vec<T>, [T]>,
    {
        self.push_column(Column::from(Series::new(name.into(), values)));
    }

    fn push_column(&mut self, column: Column) {
        let name = column.name().to_string();
        if !self.names.insert(name.clone()) {
            warn!("Dropping duplicate output column '{}'", name);
            return;
        }
        self.columns.push(column);
    }

    fn finish(self) -> Result<DataFrame> {
        DataFrame::new(self.columns).context("Failed to assemble output table")
    }
}

fn map<T>(processed: &[ProcessedAd], f: impl Fn(&ProcessedAd) -> T) -> Vec<T> {
    processed.iter().map(f).collect()
}

fn push_bounds(
    table: &mut TableBuilder,
    processed: &[ProcessedAd],
    prefix: &str,
    bounds: impl Fn(&ProcessedAd) -> Bounds,
) {
    table.push(&format!("{prefix}_lb"), map(processed, |p| bounds(p).lower));
    table.push(&format!("{prefix}_ub"), map(processed, |p| bounds(p).upper));
}

/// Carry `columns` of `source` through, reordered to the processed rows.
///
/// A `None` row yields nulls.
fn push_passthrough(
    table: &mut TableBuilder,
    source: &DataFrame,
    columns: &[(String, String)],
    rows: Vec<Option<IdxSize>>,
) -> Result<()> {
    if columns.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
    let indices = IdxCa::new("row".into(), rows);
    let taken = source.select(names)?.take(&indices)?;

    for ((_, output), column) in columns.iter().zip(taken.get_columns()) {
        table.push_column(column.clone().with_name(output.as_str().into()));
    }
    Ok(())
}

/// Per-category criteria as JSON lists, then a `_use` flag and a `_count`
/// for each category column.
fn push_criteria(table: &mut TableBuilder, processed: &[ProcessedAd]) -> Result<()> {
    let sides: Vec<(&str, Vec<String>)> = [INCLUDE_FIELD, EXCLUDE_FIELD]
        .into_iter()
        .map(|field| (field, collect_categories(processed.iter().map(|p| &p.criteria), field)))
        .collect();

    for (field, categories) in &sides {
        for category in categories {
            let values = processed
                .iter()
                .map(|p| p.criteria.side(field).get(category).map(serde_json::to_string).transpose())
                .collect::<std::result::Result<Vec<Option<String>>, _>>()?;
            table.push(&category_column(category, field), values);
        }
    }

    for (field, categories) in &sides {
        for category in categories {
            let column = category_column(category, field);
            let counts = map(processed, |p| {
                p.criteria.side(field).get(category).map_or(0, <[String]>::len) as u32
            });
            table.push(
                &format!("{column}_use"),
                counts.iter().map(|&count| i32::from(count > 0)).collect::<Vec<_>>(),
            );
            table.push(&format!("{column}_count"), counts);
        }
    }
    Ok(())
}

/// Recode `include_*` / `exclude_*` indicator columns to 0/1.
///
/// `exclude_location` is always emitted. Returns each row's sum of flags.
fn push_indicators(
    table: &mut TableBuilder,
    processed: &[ProcessedAd],
    targeting: &DataFrame,
    location: Option<&DataFrame>,
) -> Result<Vec<u32>> {
    let mut flags: Vec<(String, Vec<i32>)> = Vec::new();

    for name in column_names(targeting) {
        if !is_indicator_column(&name) || flags.iter().any(|(seen, _)| *seen == name) {
            continue;
        }
        let values = string_values(targeting, &name)?;
        let column = map(processed, |p| indicator_value(values[p.targeting.row].as_deref()));
        flags.push((name, column));
    }
    if let Some(location) = location {
        for name in column_names(location) {
            if !is_indicator_column(&name) || flags.iter().any(|(seen, _)| *seen == name) {
                continue;
            }
            let values = string_values(location, &name)?;
            let column = map(processed, |p| {
                indicator_value(p.targeting.location_row.and_then(|row| values[row].as_deref()))
            });
            flags.push((name, column));
        }
    }
    if !flags.iter().any(|(name, _)| name == EXCLUDE_LOCATION) {
        flags.push((EXCLUDE_LOCATION.to_string(), vec![0; processed.len()]));
    }

    let mut totals = vec![0_u32; processed.len()];
    for (name, column) in flags {
        for (total, flag) in totals.iter_mut().zip(&column) {
            *total += *flag as u32;
        }
        table.push(&name, column);
    }
    Ok(totals)
}

/// Build the analysis table for `processed` rows.
pub(crate) fn build_output_table(
    processed: &[ProcessedAd],
    ad_library: &DataFrame,
    targeting: &DataFrame,
    location: Option<&DataFrame>,
    country_id: &str,
) -> Result<DataFrame> {
    let mut table = TableBuilder::default();
    table.push("id", map(processed, |p| p.ad.id.clone()));
    table.push("country_id", vec![country_id.to_string(); processed.len()]);
    table.push("ad_creative_bodies", map(processed, |p| p.ad.ad_creative_bodies.clone()));
    table.push("languages", map(processed, |p| p.ad.languages.clone()));
    table.push("facebook", map(processed, |p| p.ad.facebook));
    table.push("instagram", map(processed, |p| p.ad.instagram));
    table.push(
        "platform",
        map(processed, |p| platform_code(p.ad.facebook, p.ad.instagram)),
    );

    push_bounds(&mut table, processed, "spend", |p| p.ad.spend);
    push_bounds(&mut table, processed, "impressions", |p| p.ad.impressions);
    push_bounds(&mut table, processed, "audience", |p| p.ad.audience);

    table.push(
        "ad_delivery_start_time",
        map(processed, |p| p.ad.delivery_start.format(DATE_FORMAT).to_string()),
    );
    table.push(
        "ad_delivery_stop_time",
        map(processed, |p| p.ad.delivery_stop.format(DATE_FORMAT).to_string()),
    );
    table.push("ad_active", map(processed, |p| p.ad.ad_active));
    table.push("spend", map(processed, |p| p.ad.spend_estimate()));
    table.push("impressions", map(processed, |p| p.ad.impressions_estimate()));
    table.push("audience", map(processed, |p| p.ad.audience_estimate()));
    table.push(
        "impressions_per_spending",
        map(processed, |p| p.ad.impressions_per_spending()),
    );
    table.push(
        "ad_duration",
        map(processed, |p| inclusive_days(p.ad.delivery_start, p.ad.delivery_stop)),
    );
    table.push("weekday_start", map(processed, |p| weekday_index(p.ad.delivery_start)));
    table.push("weekday_end", map(processed, |p| weekday_index(p.ad.delivery_stop)));

    table.push("male", map(processed, |p| p.ad.shares.male));
    table.push("female", map(processed, |p| p.ad.shares.female));
    table.push("unknown_gender", map(processed, |p| p.ad.shares.unknown_gender));
    table.push(
        "automated_ads_gender",
        map(processed, |p| p.ad.shares.automated_ads_gender),
    );
    for &bin in AgeBin::ALL {
        table.push(bin.label(), map(processed, |p| p.ad.shares.age_share(bin)));
    }
    table.push("unknown_age", map(processed, |p| p.ad.shares.unknown_age));
    table.push("automated_ads_age", map(processed, |p| p.ad.shares.automated_ads_age));

    table.push(TARGETING_AGE_FIELD, map(processed, |p| p.targeting.age.clone()));
    table.push(TARGETING_GENDER_FIELD, map(processed, |p| p.targeting.gender.clone()));

    table.push(
        "targeting_gender_distribution",
        map(processed, |p| p.profile.targeting_gender_distribution.to_json()),
    );
    table.push(
        "actual_gender_distribution",
        map(processed, |p| p.profile.actual_gender_distribution.to_json()),
    );
    table.push(
        "targeting_age_distribution",
        map(processed, |p| p.profile.targeting_age_distribution.to_json()),
    );
    table.push(
        "actual_age_distribution",
        map(processed, |p| p.profile.actual_age_distribution.to_json()),
    );
    table.push(
        "gender_distribution_distance",
        map(processed, |p| p.profile.gender_distribution_distance),
    );
    table.push(
        "age_distribution_distance",
        map(processed, |p| p.profile.age_distribution_distance),
    );

    push_criteria(&mut table, processed)?;
    let flag_totals = push_indicators(&mut table, processed, targeting, location)?;
    let include_count = map(processed, |p| p.criteria.include.count() as u32);
    let exclude_count = map(processed, |p| p.criteria.exclude.count() as u32);
    let total_count: Vec<u32> = include_count
        .iter()
        .zip(&exclude_count)
        .zip(&flag_totals)
        .map(|((include, exclude), flags)| include + exclude + flags)
        .collect();
    table.push("include_count", include_count);
    table.push("exclude_count", exclude_count);
    table.push("total_count", total_count);

    let ad_columns: Vec<(String, String)> = passthrough_ad_columns(ad_library)
        .into_iter()
        .map(|name| (name.clone(), name))
        .collect();
    debug!("Carrying {} ad-library columns through", ad_columns.len());
    push_passthrough(
        &mut table,
        ad_library,
        &ad_columns,
        map(processed, |p| Some(p.ad.row as IdxSize)),
    )?;

    let targeting_columns = passthrough_targeting_columns(targeting);
    debug!("Carrying {} targeting columns through", targeting_columns.len());
    push_passthrough(
        &mut table,
        targeting,
        &targeting_columns,
        map(processed, |p| Some(p.targeting.row as IdxSize)),
    )?;

    if let Some(location) = location {
        let location_columns = passthrough_location_columns(location);
        debug!("Carrying {} location columns through", location_columns.len());
        push_passthrough(
            &mut table,
            location,
            &location_columns,
            map(processed, |p| p.targeting.location_row.map(|row| row as IdxSize)),
        )?;
    }

    table.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::{DeliveryShares, DemographicRecord, derive_profile};
    use crate::pipeline::CriteriaProfile;
    use crate::types::{AdRecord, TargetingRecord};
    use crate::utils::float_values;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn processed(ad_row: usize, targeting_row: usize, id: &str) -> ProcessedAd {
        let mut shares = DeliveryShares {
            male: 0.5,
            female: 0.5,
            ..DeliveryShares::default()
        };
        shares.add_age_share(AgeBin::Age25To34, 1.0);
        let start = NaiveDate::from_ymd_opt(2021, 9, 20).unwrap();
        let ad = AdRecord {
            row: ad_row,
            id: id.to_string(),
            ad_creative_bodies: Some("Text".to_string()),
            languages: None,
            facebook: true,
            instagram: true,
            spend: Bounds { lower: Some(100.0), upper: Some(200.0) },
            impressions: Bounds { lower: Some(1000.0), upper: Some(2000.0) },
            audience: Bounds::default(),
            delivery_start: start,
            delivery_stop: start + chrono::Days::new(6),
            ad_active: 1.0,
            shares: shares.clone(),
        };
        let targeting = TargetingRecord {
            row: targeting_row,
            archive_id: id.to_string(),
            age: "25 - 34".to_string(),
            gender: "All".to_string(),
            ..TargetingRecord::default()
        };
        let profile = derive_profile(&DemographicRecord {
            id: id.to_string(),
            targeting_gender: targeting.gender.clone(),
            targeting_age: targeting.age.clone(),
            shares,
        })
        .unwrap();
        ProcessedAd {
            ad,
            targeting,
            profile,
            criteria: CriteriaProfile::default(),
        }
    }

    fn with_criteria(mut ad: ProcessedAd, include: &str, exclude: &str) -> ProcessedAd {
        ad.criteria = CriteriaProfile::parse(Some(include), Some(exclude)).unwrap();
        ad
    }

    fn counts(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
        float_values(df, column).unwrap()
    }

    #[test]
    fn test_build_output_table() {
        let ad_library = df![
            "id" => ["1", "2"],
            "page_name" => ["Partei A", "Partei B"],
            "spend" => ["x", "y"],
        ]
        .unwrap();
        let targeting = df![
            "archive_id" => [2i64, 1],
            "age" => ["25 - 34", "25 - 34"],
            "gender" => ["All", "All"],
            "exclude" => ["none", "students"],
            "page_name" => ["dup", "dup"],
        ]
        .unwrap();

        let rows = vec![processed(1, 0, "2"), processed(0, 1, "1")];

        let df = build_output_table(&rows, &ad_library, &targeting, None, "DE").unwrap();
        assert_eq!(df.height(), 2);

        let names = column_names(&df);
        assert_eq!(names[0], "id");
        assert_eq!(names[1], "country_id");
        assert!(names.contains(&"exclude_raw".to_string()));
        assert_eq!(names.iter().filter(|name| *name == "page_name").count(), 1);
        assert!(!names.contains(&"archive_id".to_string()));

        let pages = string_values(&df, "page_name").unwrap();
        assert_eq!(pages, vec![Some("Partei B".to_string()), Some("Partei A".to_string())]);
        let excludes = string_values(&df, "exclude_raw").unwrap();
        assert_eq!(excludes, vec![Some("none".to_string()), Some("students".to_string())]);

        assert_eq!(counts(&df, "platform"), vec![Some(3.0), Some(3.0)]);
        assert_eq!(counts(&df, "ad_duration"), vec![Some(7.0), Some(7.0)]);
        assert_eq!(counts(&df, "age_distribution_distance"), vec![Some(0.0), Some(0.0)]);
        assert_eq!(counts(&df, "weekday_start")[0], Some(0.0));
        assert_eq!(counts(&df, "exclude_location"), vec![Some(0.0), Some(0.0)]);
        assert_eq!(counts(&df, "total_count"), vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_criteria_columns() {
        let ad_library = df!["id" => ["1", "2"]].unwrap();
        let targeting = df![
            "archive_id" => ["1", "2"],
            "age" => ["25 - 34", "25 - 34"],
            "gender" => ["All", "All"],
            "include_lookalike" => ["True", "False"],
        ]
        .unwrap();
        let rows = vec![
            with_criteria(
                processed(0, 0, "1"),
                "[{'Politik': 'Interests', 'Umwelt': 'Interests'}, {'Eltern': 'Demographics'}]",
                "[]",
            ),
            with_criteria(
                processed(1, 1, "2"),
                "[{'Studium': 'Education Statuses'}]",
                "{'Rentner': 'Demographics'}",
            ),
        ];

        let df = build_output_table(&rows, &ad_library, &targeting, None, "DE").unwrap();
        let names = column_names(&df);
        let start = names.iter().position(|name| name == "interests_include").unwrap();
        assert_eq!(
            &names[start..start + 12],
            &[
                "interests_include",
                "demographics_include",
                "education_statuses_include",
                "demographics_exclude",
                "interests_include_use",
                "interests_include_count",
                "demographics_include_use",
                "demographics_include_count",
                "education_statuses_include_use",
                "education_statuses_include_count",
                "demographics_exclude_use",
                "demographics_exclude_count",
            ]
        );

        assert_eq!(
            string_values(&df, "interests_include").unwrap(),
            vec![Some(r#"["Politik","Umwelt"]"#.to_string()), None]
        );
        assert_eq!(counts(&df, "interests_include_use"), vec![Some(1.0), Some(0.0)]);
        assert_eq!(counts(&df, "interests_include_count"), vec![Some(2.0), Some(0.0)]);
        assert_eq!(counts(&df, "demographics_exclude_count"), vec![Some(0.0), Some(1.0)]);
        assert_eq!(counts(&df, "include_lookalike"), vec![Some(1.0), Some(0.0)]);
        assert_eq!(counts(&df, "include_count"), vec![Some(3.0), Some(1.0)]);
        assert_eq!(counts(&df, "exclude_count"), vec![Some(0.0), Some(1.0)]);
        // criteria plus indicator flags
        assert_eq!(counts(&df, "total_count"), vec![Some(4.0), Some(2.0)]);
    }

    #[test]
    fn test_location_columns() {
        let ad_library = df!["id" => ["1", "2"]].unwrap();
        let targeting = df![
            "archive_id" => ["1", "2"],
            "age" => ["25 - 34", "25 - 34"],
            "gender" => ["All", "All"],
        ]
        .unwrap();
        let location = df![
            "archive_id" => ["1"],
            "include_location" => ["['Berlin']"],
            "exclude_location" => ["True"],
        ]
        .unwrap();

        let mut first = processed(0, 0, "1");
        first.targeting.location_row = Some(0);
        let rows = vec![first, processed(1, 1, "2")];

        let df = build_output_table(&rows, &ad_library, &targeting, Some(&location), "DE").unwrap();
        assert_eq!(counts(&df, "exclude_location"), vec![Some(1.0), Some(0.0)]);
        assert_eq!(counts(&df, "total_count"), vec![Some(1.0), Some(0.0)]);
        assert_eq!(
            string_values(&df, "include_location").unwrap(),
            vec![Some("['Berlin']".to_string()), None]
        );
    }
}
