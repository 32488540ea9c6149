//! Demographic comparison core.
//!
//! This module reconciles targeting intent with observed delivery:
//!
//! - [`age`]: closed age intervals, the seven fixed delivery bins, and the
//!   proportional-overlap mapping between them
//! - [`distribution`]: fixed-key distributions indexed by category rank
//! - [`distance`]: 1-D earth-mover distance over category ranks
//! - [`engine`]: targeting/actual distributions and their distances
//! - [`record`]: per-record derivation with record-level error context
//!
//! Everything here is pure and per-record; no IO happens in this module.

pub mod age;
pub mod distance;
pub mod distribution;
pub mod engine;
pub mod record;

pub use age::{AgeBin, AgeInterval, map_age_interval, overlap};
pub use distance::{WeightError, wasserstein_over_ranks};
pub use distribution::{Category, Distribution, Gender, TargetGender};
pub use engine::{
    DeliveryShares, actual_age_distribution, actual_gender_distribution,
    age_distribution_distance, gender_distribution_distance, targeting_age_distribution,
    targeting_gender_distribution,
};
pub use record::{DemographicProfile, DemographicRecord, derive_profile};

/// Field name of the targeting age range.
pub const TARGETING_AGE_FIELD: &str = "targeting_age";
/// Field name of the targeting gender.
pub const TARGETING_GENDER_FIELD: &str = "targeting_gender";
