//! Distributions over a fixed, ordered key set.
//!
//! A [`Distribution`] always holds one value per key of its [`Category`],
//! stored by rank. Iteration, serialization and distance computation all use
//! that rank, never a container's iteration order.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

use crate::error::DemographicsError;

use super::TARGETING_GENDER_FIELD;

/// A closed, ordered set of distribution keys.
pub trait Category: Copy + Eq + fmt::Debug + 'static {
    /// Every key, in rank order.
    const ALL: &'static [Self];

    /// Position of this key in [`Category::ALL`].
    fn rank(self) -> usize;

    /// Label used for column names and serialization.
    fn label(self) -> &'static str;
}

/// Non-negative weights over every key of `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution<K: Category> {
    values: Vec<f64>,
    _keys: PhantomData<K>,
}

impl<K: Category> Distribution<K> {
    /// A distribution with every key set to zero.
    pub fn zeroed() -> Self {
        Self {
            values: vec![0.0; K::ALL.len()],
            _keys: PhantomData,
        }
    }

    /// Build a distribution by evaluating `f` for every key.
    pub fn from_fn(mut f: impl FnMut(K) -> f64) -> Self {
        Self {
            values: K::ALL.iter().map(|&key| f(key)).collect(),
            _keys: PhantomData,
        }
    }

    /// Build a distribution from `(key, value)` pairs.
    ///
    /// Absent keys are zero-filled; repeated keys accumulate.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (K, f64)>) -> Self {
        let mut distribution = Self::zeroed();
        for (key, value) in pairs {
            distribution.values[key.rank()] += value;
        }
        distribution
    }

    pub fn get(&self, key: K) -> f64 {
        self.values[key.rank()]
    }

    /// Values in rank order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `(key, value)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (K, f64)> + '_ {
        K::ALL.iter().copied().zip(self.values.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Divide every value by the total.
    ///
    /// Returns `None` when the total is zero, negative or not finite.
    pub fn normalized(&self) -> Option<Self> {
        let total = self.total();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        Some(Self::from_fn(|key| self.get(key) / total))
    }

    /// Serialize to a compact JSON object keyed by label in rank order.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl<K: Category> Index<K> for Distribution<K> {
    type Output = f64;

    fn index(&self, key: K) -> &f64 {
        &self.values[key.rank()]
    }
}

impl<K: Category> Serialize for Distribution<K> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key.label(), &value)?;
        }
        map.end()
    }
}

/// Delivery gender keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Category for Gender {
    const ALL: &'static [Self] = &[Self::Male, Self::Female];

    fn rank(self) -> usize {
        match self {
            Self::Male => 0,
            Self::Female => 1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

/// Declared gender of a targeting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetGender {
    All,
    Men,
    Women,
}

impl TargetGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Men => "Men",
            Self::Women => "Women",
        }
    }
}

impl fmt::Display for TargetGender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetGender {
    type Err = DemographicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "All" => Ok(Self::All),
            "Men" => Ok(Self::Men),
            "Women" => Ok(Self::Women),
            _ => Err(DemographicsError::UnrecognizedCategory {
                field: TARGETING_GENDER_FIELD.to_string(),
                value: s.to_string(),
            }),
        }
    }
}
