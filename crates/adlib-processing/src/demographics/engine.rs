//! Targeting and delivery distributions, and the distances between them.

use serde::{Deserialize, Serialize};

use crate::error::DemographicsError;

use super::TARGETING_AGE_FIELD;
use super::age::{AgeBin, map_age_interval};
use super::distance::wasserstein_over_ranks;
use super::distribution::{Category, Distribution, Gender, TargetGender};

/// Observed delivery shares of one ad, as reported by the ad library.
///
/// Values are pass-through: they are neither validated to sum to one nor
/// renormalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryShares {
    pub male: f64,
    pub female: f64,
    /// Per-bin shares, indexed by [`AgeBin`] rank.
    pub age: [f64; 7],
    pub unknown_gender: f64,
    pub automated_ads_gender: f64,
    pub unknown_age: f64,
    pub automated_ads_age: f64,
}

impl DeliveryShares {
    pub fn age_share(&self, bin: AgeBin) -> f64 {
        self.age[bin.rank()]
    }

    pub fn add_age_share(&mut self, bin: AgeBin, share: f64) {
        self.age[bin.rank()] += share;
    }

    /// Read shares from a row through `lookup`, keyed by column name.
    ///
    /// `male`, `female` and every bin label are required; the unknown and
    /// automated buckets default to zero.
    pub fn from_row(lookup: impl Fn(&str) -> Option<f64>) -> Result<Self, DemographicsError> {
        let required = |field: &str| -> Result<f64, DemographicsError> {
            match lookup(field) {
                Some(value) if value.is_finite() => Ok(value),
                Some(value) => Err(DemographicsError::schema(
                    field,
                    format!("non-finite value {value}"),
                )),
                None => Err(DemographicsError::schema(field, "missing or non-numeric")),
            }
        };

        let mut shares = Self {
            male: required(Gender::Male.label())?,
            female: required(Gender::Female.label())?,
            unknown_gender: lookup("unknown_gender").unwrap_or(0.0),
            automated_ads_gender: lookup("automated_ads_gender").unwrap_or(0.0),
            unknown_age: lookup("unknown_age").unwrap_or(0.0),
            automated_ads_age: lookup("automated_ads_age").unwrap_or(0.0),
            ..Self::default()
        };
        for bin in AgeBin::ALL {
            shares.age[bin.rank()] = required(bin.label())?;
        }
        Ok(shares)
    }
}

/// Gender split implied by the declared targeting.
pub fn targeting_gender_distribution(gender: TargetGender) -> Distribution<Gender> {
    let (male, female) = match gender {
        TargetGender::All => (0.5, 0.5),
        TargetGender::Women => (0.0, 1.0),
        TargetGender::Men => (1.0, 0.0),
    };
    Distribution::from_pairs([(Gender::Male, male), (Gender::Female, female)])
}

pub fn actual_gender_distribution(shares: &DeliveryShares) -> Distribution<Gender> {
    Distribution::from_pairs([(Gender::Male, shares.male), (Gender::Female, shares.female)])
}

pub fn actual_age_distribution(shares: &DeliveryShares) -> Distribution<AgeBin> {
    Distribution::from_fn(|bin| shares.age_share(bin))
}

/// Normalized age distribution implied by a raw targeting age range.
///
/// Fails with [`DemographicsError::DegenerateDistribution`] when the range
/// lies entirely outside the delivery bins.
pub fn targeting_age_distribution(raw: &str) -> Result<Distribution<AgeBin>, DemographicsError> {
    map_age_interval(raw)?.normalized().ok_or_else(|| {
        DemographicsError::degenerate(
            TARGETING_AGE_FIELD,
            raw,
            "age range does not overlap any delivery bin (13-65)",
        )
    })
}

fn rank_distance<K: Category>(
    field: &str,
    target: &Distribution<K>,
    actual: &Distribution<K>,
) -> Result<f64, DemographicsError> {
    wasserstein_over_ranks(target.values(), actual.values()).map_err(|e| {
        DemographicsError::degenerate(
            field,
            format!("target={} actual={}", target.to_json(), actual.to_json()),
            e.to_string(),
        )
    })
}

/// Earth-mover distance between two age distributions over bin ranks 0..6.
pub fn age_distribution_distance(
    target: &Distribution<AgeBin>,
    actual: &Distribution<AgeBin>,
) -> Result<f64, DemographicsError> {
    rank_distance("age_distribution", target, actual)
}

/// Earth-mover distance between two gender distributions over `[male, female]`.
pub fn gender_distribution_distance(
    target: &Distribution<Gender>,
    actual: &Distribution<Gender>,
) -> Result<f64, DemographicsError> {
    rank_distance("gender_distribution", target, actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const TOLERANCE: f64 = 1e-9;

    fn shares(male: f64, female: f64, age: [f64; 7]) -> DeliveryShares {
        DeliveryShares {
            male,
            female,
            age,
            ..DeliveryShares::default()
        }
    }

    #[test]
    fn test_targeting_gender_lookup() {
        assert_eq!(
            targeting_gender_distribution(TargetGender::All).values(),
            &[0.5, 0.5]
        );
        assert_eq!(
            targeting_gender_distribution(TargetGender::Women).values(),
            &[0.0, 1.0]
        );
        assert_eq!(
            targeting_gender_distribution(TargetGender::Men).values(),
            &[1.0, 0.0]
        );
    }

    #[test]
    fn test_actual_distributions_are_pass_through() {
        let row = shares(0.3, 0.6, [0.1, 0.2, 0.0, 0.0, 0.3, 0.1, 0.1]);
        assert_eq!(actual_gender_distribution(&row).values(), &[0.3, 0.6]);
        assert_eq!(
            actual_age_distribution(&row).values(),
            &[0.1, 0.2, 0.0, 0.0, 0.3, 0.1, 0.1]
        );
    }

    #[test]
    fn test_targeting_age_distribution_sums_to_one() {
        for raw in ["15 - 48", "18 - 65+", "13 - 65", "65+", "30", "17 - 18", "40 - 99", "0 - 13"] {
            let distribution = targeting_age_distribution(raw).unwrap();
            assert!(
                (distribution.total() - 1.0).abs() < TOLERANCE,
                "{raw}: total {}",
                distribution.total()
            );
        }
    }

    #[test]
    fn test_targeting_age_distribution_values() {
        // Weights 0.6 + 1 + 1 + 1 + 0.4 = 4.0
        let distribution = targeting_age_distribution("15 - 48").unwrap();
        let expected = [0.15, 0.25, 0.25, 0.25, 0.1, 0.0, 0.0];
        for (got, want) in distribution.values().iter().zip(expected) {
            assert!((got - want).abs() < TOLERANCE);
        }
    }

    #[test]
    fn test_targeting_age_distribution_outside_bins() {
        for raw in ["5 - 12", "70 - 80", "66+"] {
            let err = targeting_age_distribution(raw).unwrap_err();
            assert!(
                matches!(err, DemographicsError::DegenerateDistribution { .. }),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn test_targeting_age_distribution_parse_error() {
        let err = targeting_age_distribution("abc").unwrap_err();
        assert!(matches!(err, DemographicsError::Parse { .. }));
    }

    #[test]
    fn test_age_distance_identity() {
        let target = targeting_age_distribution("25 - 54").unwrap();
        assert_eq!(age_distribution_distance(&target, &target).unwrap(), 0.0);

        let actual = actual_age_distribution(&shares(0.5, 0.5, [0.1, 0.2, 0.3, 0.2, 0.1, 0.05, 0.05]));
        assert_eq!(age_distribution_distance(&actual, &actual).unwrap(), 0.0);
    }

    #[test]
    fn test_age_distance_uses_bin_order() {
        let youngest = Distribution::from_pairs([(AgeBin::Age13To17, 1.0)]);
        let oldest = Distribution::from_pairs([(AgeBin::Age65Plus, 1.0)]);
        let next = Distribution::from_pairs([(AgeBin::Age18To24, 1.0)]);

        assert!((age_distribution_distance(&youngest, &oldest).unwrap() - 6.0).abs() < TOLERANCE);
        assert!((age_distribution_distance(&youngest, &next).unwrap() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_gender_distance_swapped_point_masses() {
        let men = targeting_gender_distribution(TargetGender::Men);
        let women = targeting_gender_distribution(TargetGender::Women);
        assert_eq!(gender_distribution_distance(&men, &women).unwrap(), 1.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let target = targeting_age_distribution("18 - 40").unwrap();
        let actual = actual_age_distribution(&shares(0.4, 0.6, [0.0, 0.1, 0.2, 0.3, 0.2, 0.1, 0.1]));
        assert_eq!(
            age_distribution_distance(&target, &actual).unwrap(),
            age_distribution_distance(&actual, &target).unwrap()
        );

        let target = targeting_gender_distribution(TargetGender::All);
        let actual = actual_gender_distribution(&shares(0.8, 0.2, [0.0; 7]));
        assert_eq!(
            gender_distribution_distance(&target, &actual).unwrap(),
            gender_distribution_distance(&actual, &target).unwrap()
        );
    }

    #[test]
    fn test_distance_rejects_empty_delivery() {
        let target = targeting_gender_distribution(TargetGender::All);
        let actual = actual_gender_distribution(&DeliveryShares::default());
        let err = gender_distribution_distance(&target, &actual).unwrap_err();
        assert!(matches!(err, DemographicsError::DegenerateDistribution { .. }));
    }

    #[test]
    fn test_from_row_requires_every_share() {
        let mut fields: HashMap<&str, f64> = HashMap::from([("male", 0.4), ("female", 0.6)]);
        for bin in AgeBin::ALL {
            fields.insert(bin.label(), 1.0 / 7.0);
        }
        let row = DeliveryShares::from_row(|name| fields.get(name).copied()).unwrap();
        assert_eq!(row.male, 0.4);
        assert_eq!(row.unknown_age, 0.0);

        fields.remove("45-54");
        let err = DeliveryShares::from_row(|name| fields.get(name).copied()).unwrap_err();
        assert_eq!(err, DemographicsError::schema("45-54", "missing or non-numeric"));
    }
}
