//! Expansion of the ad library's `demographic_distribution` field.
//!
//! The export stores delivery as a list of `{percentage, age, gender}`
//! entries, one per age/gender cell:
//!
//! ```text
//! [{'percentage': '0.12', 'age': '25-34', 'gender': 'female'}, ...]
//! ```
//!
//! Shares are summed per gender and per age bucket into [`DeliveryShares`].

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::demographics::{AgeBin, DeliveryShares};
use crate::error::DemographicsError;
use crate::utils::{is_missing_marker, parse_numeric_string};

/// Name of the raw demographic field.
pub(crate) const DEMOGRAPHIC_FIELD: &str = "demographic_distribution";

/// Bucket label the platform uses for automated app ads.
const AUTOMATED_ADS: &str = "All (Automated App Ads)";

static ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]*)\}").expect("Invalid regex: demographic entry"));

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"['"]?([A-Za-z_]+)['"]?\s*:\s*['"]?([^,'"]*)['"]?"#)
        .expect("Invalid regex: demographic key/value")
});

#[derive(Debug, PartialEq)]
struct Entry {
    percentage: f64,
    age: String,
    gender: String,
}

fn parse_entry(body: &str) -> Result<Entry, DemographicsError> {
    let mut percentage = None;
    let mut age = None;
    let mut gender = None;

    for captures in KEY_VALUE.captures_iter(body) {
        let value = captures[2].trim();
        match &captures[1] {
            "percentage" => {
                percentage = Some(parse_numeric_string(value).ok_or_else(|| {
                    DemographicsError::schema(
                        DEMOGRAPHIC_FIELD,
                        format!("percentage '{value}' is not numeric"),
                    )
                })?);
            }
            "age" => age = Some(value.to_string()),
            "gender" => gender = Some(value.to_string()),
            _ => {}
        }
    }

    let missing = |key: &str| {
        DemographicsError::schema(DEMOGRAPHIC_FIELD, format!("entry '{{{body}}}' has no {key}"))
    };
    Ok(Entry {
        percentage: percentage.ok_or_else(|| missing("percentage"))?,
        age: age.ok_or_else(|| missing("age"))?,
        gender: gender.ok_or_else(|| missing("gender"))?,
    })
}

fn add_entry(shares: &mut DeliveryShares, entry: &Entry) -> Result<(), DemographicsError> {
    match entry.gender.to_ascii_lowercase().as_str() {
        "male" => shares.male += entry.percentage,
        "female" => shares.female += entry.percentage,
        "unknown" => shares.unknown_gender += entry.percentage,
        _ if entry.gender == AUTOMATED_ADS => shares.automated_ads_gender += entry.percentage,
        _ => {
            return Err(DemographicsError::UnrecognizedCategory {
                field: format!("{DEMOGRAPHIC_FIELD}.gender"),
                value: entry.gender.clone(),
            });
        }
    }

    if let Some(bin) = AgeBin::from_label(&entry.age) {
        shares.add_age_share(bin, entry.percentage);
    } else if entry.age.eq_ignore_ascii_case("unknown") {
        shares.unknown_age += entry.percentage;
    } else if entry.age == AUTOMATED_ADS {
        shares.automated_ads_age += entry.percentage;
    } else {
        return Err(DemographicsError::UnrecognizedCategory {
            field: format!("{DEMOGRAPHIC_FIELD}.age"),
            value: entry.age.clone(),
        });
    }
    Ok(())
}

/// Aggregate a raw demographic distribution into per-gender and per-age shares.
///
/// A missing or empty distribution yields all-zero shares.
pub(crate) fn expand_demographic_distribution(
    raw: Option<&str>,
) -> Result<DeliveryShares, DemographicsError> {
    let mut shares = DeliveryShares::default();
    let Some(raw) = raw.filter(|raw| !is_missing_marker(raw)) else {
        return Ok(shares);
    };

    let mut entries = 0;
    for captures in ENTRY.captures_iter(raw) {
        let entry = parse_entry(&captures[1])?;
        add_entry(&mut shares, &entry)?;
        entries += 1;
    }

    if entries == 0 {
        return Err(DemographicsError::schema(
            DEMOGRAPHIC_FIELD,
            "no {percentage, age, gender} entries found",
        ));
    }
    debug!("Expanded {} demographic entries", entries);
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_parse_entry() {
        let entry = parse_entry("'percentage': '0.12', 'age': '25-34', 'gender': 'female'").unwrap();
        assert_eq!(
            entry,
            Entry {
                percentage: 0.12,
                age: "25-34".to_string(),
                gender: "female".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_entry_after_quote_stripping() {
        let entry = parse_entry("percentage: 0.5, age: 65+, gender: male").unwrap();
        assert_eq!(entry.age, "65+");
        assert_eq!(entry.gender, "male");
    }

    #[test]
    fn test_expand_aggregates_by_gender_and_age() {
        let raw = "[{'percentage': '0.1', 'age': '18-24', 'gender': 'female'}, \
                   {'percentage': '0.2', 'age': '18-24', 'gender': 'male'}, \
                   {'percentage': '0.3', 'age': '65+', 'gender': 'female'}, \
                   {'percentage': '0.4', 'age': 'Unknown', 'gender': 'unknown'}]";
        let shares = expand_demographic_distribution(Some(raw)).unwrap();

        assert!((shares.female - 0.4).abs() < TOLERANCE);
        assert!((shares.male - 0.2).abs() < TOLERANCE);
        assert!((shares.unknown_gender - 0.4).abs() < TOLERANCE);
        assert!((shares.age_share(AgeBin::Age18To24) - 0.3).abs() < TOLERANCE);
        assert!((shares.age_share(AgeBin::Age65Plus) - 0.3).abs() < TOLERANCE);
        assert!((shares.unknown_age - 0.4).abs() < TOLERANCE);
        assert_eq!(shares.age_share(AgeBin::Age13To17), 0.0);
    }

    #[test]
    fn test_expand_automated_app_ads() {
        let raw = "[{'percentage': '1.0', 'age': 'All (Automated App Ads)', 'gender': 'All (Automated App Ads)'}]";
        let shares = expand_demographic_distribution(Some(raw)).unwrap();
        assert_eq!(shares.automated_ads_age, 1.0);
        assert_eq!(shares.automated_ads_gender, 1.0);
    }

    #[test]
    fn test_expand_missing_is_zero() {
        assert_eq!(expand_demographic_distribution(None).unwrap(), DeliveryShares::default());
        assert_eq!(
            expand_demographic_distribution(Some("[]")).unwrap(),
            DeliveryShares::default()
        );
    }

    #[test]
    fn test_expand_rejects_malformed() {
        let err = expand_demographic_distribution(Some("[{'percentage': 'lots', 'age': '18-24', 'gender': 'male'}]"))
            .unwrap_err();
        assert!(matches!(err, DemographicsError::SchemaMismatch { .. }));

        let err = expand_demographic_distribution(Some("[{'percentage': '0.1', 'age': '10-12', 'gender': 'male'}]"))
            .unwrap_err();
        assert!(matches!(err, DemographicsError::UnrecognizedCategory { .. }));

        let err = expand_demographic_distribution(Some("garbage")).unwrap_err();
        assert!(matches!(err, DemographicsError::SchemaMismatch { .. }));
    }
}
