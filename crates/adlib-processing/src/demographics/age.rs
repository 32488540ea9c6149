//! Age intervals and the fixed ad-library delivery bins.
//!
//! Targeting exports describe an audience as an arbitrary closed range such
//! as `"15 - 48"` or `"65+"`, while delivery is reported per [`AgeBin`].
//! [`map_age_interval`] measures how much of each bin a targeting range
//! covers, counting ages inclusively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DemographicsError;

use super::TARGETING_AGE_FIELD;
use super::distribution::{Category, Distribution};

/// A closed integer age range `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeInterval {
    low: u32,
    high: u32,
}

impl AgeInterval {
    /// Returns `None` when `low > high`.
    pub fn new(low: u32, high: u32) -> Option<Self> {
        (low <= high).then_some(Self { low, high })
    }

    /// The degenerate interval `[age, age]`.
    pub fn singleton(age: u32) -> Self {
        Self {
            low: age,
            high: age,
        }
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    /// Number of whole ages in the interval (inclusive on both ends).
    pub fn width(&self) -> u64 {
        u64::from(self.high - self.low) + 1
    }
}

impl fmt::Display for AgeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{} - {}", self.low, self.high)
        }
    }
}

impl FromStr for AgeInterval {
    type Err = DemographicsError;

    /// Parses `"18 - 24"`, `"18-24"`, `"65+"` and `"30"`.
    ///
    /// A trailing `+` is dropped, so `"65+"` is the singleton `[65, 65]`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| DemographicsError::parse(TARGETING_AGE_FIELD, raw, reason);

        let body = raw.trim().trim_end_matches('+').trim();
        if body.is_empty() {
            return Err(fail("empty age range"));
        }

        let bounds = body
            .split('-')
            .map(|token| {
                let token = token.trim();
                token
                    .parse::<u32>()
                    .map_err(|_| fail(&format!("'{token}' is not a whole number of years")))
            })
            .collect::<Result<Vec<u32>, _>>()?;

        match bounds.as_slice() {
            [age] => Ok(Self::singleton(*age)),
            [low, high] => {
                Self::new(*low, *high).ok_or_else(|| fail("lower bound exceeds upper bound"))
            }
            _ => Err(fail("expected a single age or a 'low - high' pair")),
        }
    }
}

/// Inclusive intersection of two closed intervals.
///
/// Intervals that share a single endpoint overlap with width 1.
pub fn overlap(a: AgeInterval, b: AgeInterval) -> Option<AgeInterval> {
    AgeInterval::new(a.low.max(b.low), a.high.min(b.high))
}

/// Ad-library delivery age bins, in age order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBin {
    #[serde(rename = "13-17")]
    Age13To17,
    #[serde(rename = "18-24")]
    Age18To24,
    #[serde(rename = "25-34")]
    Age25To34,
    #[serde(rename = "35-44")]
    Age35To44,
    #[serde(rename = "45-54")]
    Age45To54,
    #[serde(rename = "55-64")]
    Age55To64,
    #[serde(rename = "65+")]
    Age65Plus,
}

impl AgeBin {
    /// Closed interval covered by the bin. `65+` is the singleton `[65, 65]`.
    pub fn interval(self) -> AgeInterval {
        let (low, high) = match self {
            Self::Age13To17 => (13, 17),
            Self::Age18To24 => (18, 24),
            Self::Age25To34 => (25, 34),
            Self::Age35To44 => (35, 44),
            Self::Age45To54 => (45, 54),
            Self::Age55To64 => (55, 64),
            Self::Age65Plus => (65, 65),
        };
        AgeInterval { low, high }
    }

    /// Look up a bin by its label (`"18-24"`, `"65+"`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.iter().copied().find(|bin| bin.label() == label)
    }
}

impl Category for AgeBin {
    const ALL: &'static [Self] = &[
        Self::Age13To17,
        Self::Age18To24,
        Self::Age25To34,
        Self::Age35To44,
        Self::Age45To54,
        Self::Age55To64,
        Self::Age65Plus,
    ];

    fn rank(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::Age13To17 => "13-17",
            Self::Age18To24 => "18-24",
            Self::Age25To34 => "25-34",
            Self::Age35To44 => "35-44",
            Self::Age45To54 => "45-54",
            Self::Age55To64 => "55-64",
            Self::Age65Plus => "65+",
        }
    }
}

impl fmt::Display for AgeBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fraction of `bin` covered by `interval`, in `[0, 1]`.
fn coverage(interval: AgeInterval, bin: AgeBin) -> f64 {
    let bin_interval = bin.interval();
    match overlap(interval, bin_interval) {
        None => 0.0,
        Some(shared) if shared == bin_interval => 1.0,
        Some(shared) => shared.width() as f64 / bin_interval.width() as f64,
    }
}

/// Map a raw targeting age range onto per-bin overlap weights.
///
/// The weights are not normalized; see
/// [`targeting_age_distribution`](super::engine::targeting_age_distribution).
pub fn map_age_interval(raw: &str) -> Result<Distribution<AgeBin>, DemographicsError> {
    let interval: AgeInterval = raw.parse()?;
    Ok(Distribution::from_fn(|bin| coverage(interval, bin)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn interval(low: u32, high: u32) -> AgeInterval {
        AgeInterval::new(low, high).unwrap()
    }

    #[test]
    fn test_overlap_documented_example() {
        assert_eq!(overlap(interval(0, 4), interval(1, 10)), Some(interval(1, 4)));
    }

    #[test]
    fn test_overlap_disjoint() {
        assert_eq!(overlap(interval(0, 4), interval(5, 10)), None);
        assert_eq!(overlap(interval(5, 10), interval(0, 4)), None);
    }

    #[test]
    fn test_overlap_touching_endpoints() {
        let shared = overlap(interval(1, 4), interval(4, 10)).unwrap();
        assert_eq!(shared, AgeInterval::singleton(4));
        assert_eq!(shared.width(), 1);
    }

    #[test]
    fn test_width_spans_full_u32_range() {
        assert_eq!(interval(0, u32::MAX).width(), u64::from(u32::MAX) + 1);
        assert_eq!(AgeInterval::singleton(u32::MAX).width(), 1);
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let cases = [
            (interval(0, 4), interval(1, 10)),
            (interval(13, 17), interval(15, 48)),
            (interval(65, 65), interval(60, 70)),
            (interval(20, 30), interval(22, 25)),
            (interval(0, 4), interval(5, 10)),
        ];
        for (a, b) in cases {
            assert_eq!(overlap(a, b), overlap(b, a), "{a} vs {b}");
        }
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!("18 - 24".parse::<AgeInterval>().unwrap(), interval(18, 24));
        assert_eq!("18-24".parse::<AgeInterval>().unwrap(), interval(18, 24));
        assert_eq!("65+".parse::<AgeInterval>().unwrap(), AgeInterval::singleton(65));
        assert_eq!(" 30 ".parse::<AgeInterval>().unwrap(), AgeInterval::singleton(30));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["abc", "", "+", "18 - ", "18 - 24 - 30", "40 - 20", "1.5"] {
            let err = raw.parse::<AgeInterval>().unwrap_err();
            assert!(
                matches!(err, DemographicsError::Parse { ref value, .. } if value == raw),
                "expected parse error for {raw:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_map_age_interval_documented_example() {
        let weights = map_age_interval("15 - 48").unwrap();
        let expected = [0.6, 1.0, 1.0, 1.0, 0.4, 0.0, 0.0];
        for (bin, want) in AgeBin::ALL.iter().zip(expected) {
            assert!(
                (weights[*bin] - want).abs() < TOLERANCE,
                "{bin}: {} != {want}",
                weights[*bin]
            );
        }
    }

    #[test]
    fn test_map_age_interval_open_ended() {
        let weights = map_age_interval("65+").unwrap();
        assert_eq!(weights[AgeBin::Age65Plus], 1.0);
        assert_eq!(weights.total(), 1.0);

        let weights = map_age_interval("60 - 65").unwrap();
        assert!((weights[AgeBin::Age55To64] - 0.5).abs() < TOLERANCE);
        assert_eq!(weights[AgeBin::Age65Plus], 1.0);
    }

    #[test]
    fn test_map_age_interval_outside_bins() {
        let weights = map_age_interval("5 - 12").unwrap();
        assert_eq!(weights.total(), 0.0);
    }

    #[test]
    fn test_bin_labels_round_trip() {
        for bin in AgeBin::ALL {
            assert_eq!(AgeBin::from_label(bin.label()), Some(*bin));
        }
        assert_eq!(AgeBin::from_label("Unknown"), None);
    }

    #[test]
    fn test_bin_ranks_follow_age_order() {
        for (position, bin) in AgeBin::ALL.iter().enumerate() {
            assert_eq!(bin.rank(), position);
        }
    }
}
