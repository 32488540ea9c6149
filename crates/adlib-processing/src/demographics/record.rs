//! Per-record demographic derivation.

use serde::Serialize;

use crate::error::{PreprocessingError, Result};

use super::age::AgeBin;
use super::distribution::{Distribution, Gender, TargetGender};
use super::engine::{
    DeliveryShares, actual_age_distribution, actual_gender_distribution,
    age_distribution_distance, gender_distribution_distance, targeting_age_distribution,
    targeting_gender_distribution,
};

/// Inputs the demographic core needs for one ad.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicRecord {
    pub id: String,
    pub targeting_gender: String,
    pub targeting_age: String,
    pub shares: DeliveryShares,
}

/// Distributions and distances derived for one ad.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemographicProfile {
    pub targeting_gender_distribution: Distribution<Gender>,
    pub actual_gender_distribution: Distribution<Gender>,
    pub targeting_age_distribution: Distribution<AgeBin>,
    pub actual_age_distribution: Distribution<AgeBin>,
    pub gender_distribution_distance: f64,
    pub age_distribution_distance: f64,
}

/// Derive all four distributions and both distances for `record`.
///
/// Any failure is returned as [`PreprocessingError::Record`] carrying the
/// record id; nothing is substituted.
pub fn derive_profile(record: &DemographicRecord) -> Result<DemographicProfile> {
    let in_record = |source| PreprocessingError::record(&record.id, source);

    let gender: TargetGender = record.targeting_gender.parse().map_err(in_record)?;
    let targeting_gender_distribution = targeting_gender_distribution(gender);
    let actual_gender_distribution = actual_gender_distribution(&record.shares);
    let targeting_age_distribution =
        targeting_age_distribution(&record.targeting_age).map_err(in_record)?;
    let actual_age_distribution = actual_age_distribution(&record.shares);

    let gender_distribution_distance =
        gender_distribution_distance(&targeting_gender_distribution, &actual_gender_distribution)
            .map_err(in_record)?;
    let age_distribution_distance =
        age_distribution_distance(&targeting_age_distribution, &actual_age_distribution)
            .map_err(in_record)?;

    Ok(DemographicProfile {
        targeting_gender_distribution,
        actual_gender_distribution,
        targeting_age_distribution,
        actual_age_distribution,
        gender_distribution_distance,
        age_distribution_distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DemographicsError;

    fn record(gender: &str, age: &str) -> DemographicRecord {
        DemographicRecord {
            id: "1001".to_string(),
            targeting_gender: gender.to_string(),
            targeting_age: age.to_string(),
            shares: DeliveryShares {
                male: 0.5,
                female: 0.5,
                age: [0.0, 0.2, 0.2, 0.2, 0.2, 0.2, 0.0],
                ..DeliveryShares::default()
            },
        }
    }

    #[test]
    fn test_derive_profile_matching_delivery() {
        let profile = derive_profile(&record("All", "18 - 64")).unwrap();
        assert_eq!(profile.gender_distribution_distance, 0.0);
        assert!(profile.age_distribution_distance.abs() < 1e-9);
    }

    #[test]
    fn test_derive_profile_mismatched_delivery() {
        let profile = derive_profile(&record("Women", "65+")).unwrap();
        assert!((profile.gender_distribution_distance - 0.5).abs() < 1e-9);
        assert!(profile.age_distribution_distance > 0.0);
    }

    #[test]
    fn test_derive_profile_reports_record_id() {
        let err = derive_profile(&record("Other", "18 - 64")).unwrap_err();
        match err {
            PreprocessingError::Record { record_id, source } => {
                assert_eq!(record_id, "1001");
                assert!(matches!(source, DemographicsError::UnrecognizedCategory { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = derive_profile(&record("All", "abc")).unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }
}
