//! Bound-pair scraping and delivery-window arithmetic.
//!
//! The ad library reports spend, impressions and audience size as ranges
//! embedded in text (`{'lower_bound': '100', 'upper_bound': '199'}`). The
//! first digit run is the lower bound and the second the upper bound.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("Invalid regex: digit run"));

/// A reported `[lower, upper]` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    /// Midpoint of the range, `None` without a lower bound.
    pub fn midpoint(&self) -> Option<f64> {
        let lower = self.lower?;
        Some((lower + self.upper.unwrap_or(lower)) / 2.0)
    }
}

/// Extract a bound pair from a raw field.
///
/// The upper bound falls back to the lower bound: the platform omits it for
/// very large ads, and the lower bound is the conservative estimate.
pub(crate) fn extract_bounds(raw: Option<&str>) -> Bounds {
    let Some(raw) = raw else {
        return Bounds::default();
    };
    let mut numbers = DIGIT_RUN
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<f64>().ok());

    let lower = numbers.next();
    let upper = numbers.next().or(lower);
    Bounds { lower, upper }
}

/// Parse the date part of a delivery timestamp (`2021-08-01` or
/// `2021-08-01T10:00:00+0000`).
pub(crate) fn parse_delivery_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Inclusive number of days between two dates.
pub(crate) fn inclusive_days(start: NaiveDate, stop: NaiveDate) -> i64 {
    (stop - start).num_days() + 1
}

/// Share of an ad's delivery days that fall on or before election day.
///
/// Ads that stop by election day count fully. The result is clamped to
/// `[0, 1]`.
pub(crate) fn active_share(start: NaiveDate, stop: NaiveDate, election: NaiveDate) -> f64 {
    if stop <= election {
        return 1.0;
    }
    let total = inclusive_days(start, stop);
    if total <= 0 {
        return 0.0;
    }
    let before = inclusive_days(start, election);
    (before as f64 / total as f64).clamp(0.0, 1.0)
}

/// Weekday index with Monday = 0.
pub(crate) fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_monday() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_extract_bounds() {
        let bounds = extract_bounds(Some("{'lower_bound': '100', 'upper_bound': '199'}"));
        assert_eq!(bounds.lower, Some(100.0));
        assert_eq!(bounds.upper, Some(199.0));
        assert_eq!(bounds.midpoint(), Some(149.5));
    }

    #[test]
    fn test_extract_bounds_missing_upper() {
        let bounds = extract_bounds(Some("{'lower_bound': '1000000'}"));
        assert_eq!(bounds.upper, Some(1_000_000.0));
        assert_eq!(bounds.midpoint(), Some(1_000_000.0));
    }

    #[test]
    fn test_extract_bounds_empty() {
        assert_eq!(extract_bounds(None), Bounds::default());
        assert_eq!(extract_bounds(Some("n/a")).midpoint(), None);
    }

    #[test]
    fn test_parse_delivery_date() {
        assert_eq!(parse_delivery_date("2021-08-01"), Some(date(2021, 8, 1)));
        assert_eq!(
            parse_delivery_date("2021-08-01T10:00:00+0000"),
            Some(date(2021, 8, 1))
        );
        assert_eq!(parse_delivery_date("August"), None);
    }

    #[test]
    fn test_active_share() {
        let election = date(2021, 9, 26);
        assert_eq!(active_share(date(2021, 9, 1), date(2021, 9, 20), election), 1.0);
        assert_eq!(active_share(date(2021, 9, 1), election, election), 1.0);
        // 26 of 30 days before or on election day
        let share = active_share(date(2021, 9, 1), date(2021, 9, 30), election);
        assert!((share - 26.0 / 30.0).abs() < 1e-12);
        assert_eq!(active_share(date(2021, 10, 1), date(2021, 10, 5), election), 0.0);
    }

    #[test]
    fn test_weekday_index() {
        // 2021-09-26 was a Sunday
        assert_eq!(weekday_index(date(2021, 9, 26)), 6);
        assert_eq!(weekday_index(date(2021, 9, 27)), 0);
    }
}
