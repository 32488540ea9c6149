//! Targeting criteria from the `include` / `exclude` audience fields.
//!
//! The targeting export stores each side as a list of groups. A group maps
//! every criterion to the category it belongs to:
//!
//! ```text
//! [{'Politik': 'Interests', 'Umweltschutz': 'Interests'}, {'Eltern': 'Demographics'}]
//! ```
//!
//! A few rows hold a single group without the surrounding list. Non-ASCII
//! criteria may arrive as `\uXXXX` or `\xXX` escapes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::DemographicsError;
use crate::utils::is_missing_marker;

pub(crate) const INCLUDE_FIELD: &str = "include";
pub(crate) const EXCLUDE_FIELD: &str = "exclude";

/// Location indicator kept even when no location export is given.
pub(crate) const EXCLUDE_LOCATION: &str = "exclude_location";

static CRITERION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*:\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#,
    )
    .expect("Invalid regex: targeting criterion")
});

static ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:u([0-9a-fA-F]{4})|x([0-9a-fA-F]{2})|(.))")
        .expect("Invalid regex: escape sequence")
});

fn unescape(raw: &str) -> String {
    ESCAPE
        .replace_all(raw, |caps: &Captures| {
            let code = caps.get(1).or_else(|| caps.get(2));
            match code {
                Some(hex) => u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string()),
                None => caps[3].to_string(),
            }
        })
        .into_owned()
}

/// First non-empty quoted string among the alternative capture groups.
fn quoted(caps: &Captures, single: usize, double: usize) -> String {
    let raw = caps
        .get(single)
        .or_else(|| caps.get(double))
        .map_or("", |m| m.as_str());
    unescape(raw)
}

/// Criteria of one side of an ad's targeting, grouped by category.
///
/// Categories keep the order they first appear in; criteria keep their
/// order within the category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetingCriteria {
    categories: Vec<(String, Vec<String>)>,
}

impl TargetingCriteria {
    /// Parse a raw `include` or `exclude` value.
    ///
    /// Missing values and empty lists yield no criteria. Text outside the
    /// `'criterion': 'category'` pairs fails with
    /// [`DemographicsError::SchemaMismatch`] for `field`.
    pub fn parse(field: &str, raw: Option<&str>) -> Result<Self, DemographicsError> {
        let mut criteria = Self::default();
        let Some(raw) = raw.filter(|raw| !is_missing_marker(raw)) else {
            return Ok(criteria);
        };

        let residue = CRITERION.replace_all(raw, "");
        if residue
            .chars()
            .any(|c| !c.is_whitespace() && !matches!(c, '[' | ']' | '{' | '}' | ','))
        {
            return Err(DemographicsError::schema(
                field,
                format!("'{raw}' is not a list of {{criterion: category}} groups"),
            ));
        }

        for caps in CRITERION.captures_iter(raw) {
            criteria.push(quoted(&caps, 3, 4), quoted(&caps, 1, 2));
        }
        Ok(criteria)
    }

    fn push(&mut self, category: String, criterion: String) {
        match self.categories.iter_mut().find(|(name, _)| *name == category) {
            Some((_, values)) => values.push(criterion),
            None => self.categories.push((category, vec![criterion])),
        }
    }

    /// Criteria used under `category`, if any.
    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, values)| values.as_slice())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    /// Number of criteria across all categories.
    pub fn count(&self) -> usize {
        self.categories.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Both sides of an ad's targeting criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaProfile {
    pub include: TargetingCriteria,
    pub exclude: TargetingCriteria,
}

impl CriteriaProfile {
    pub fn parse(include: Option<&str>, exclude: Option<&str>) -> Result<Self, DemographicsError> {
        Ok(Self {
            include: TargetingCriteria::parse(INCLUDE_FIELD, include)?,
            exclude: TargetingCriteria::parse(EXCLUDE_FIELD, exclude)?,
        })
    }

    pub fn side(&self, field: &str) -> &TargetingCriteria {
        if field == EXCLUDE_FIELD {
            &self.exclude
        } else {
            &self.include
        }
    }
}

/// Output column for a category, e.g. `("Education Statuses", "include")`
/// becomes `education_statuses_include`.
pub(crate) fn category_column(category: &str, field: &str) -> String {
    format!("{}_{field}", category.replace(' ', "_").to_lowercase())
}

/// Categories in first-seen order across `profiles` for one side.
pub(crate) fn collect_categories<'a>(
    profiles: impl Iterator<Item = &'a CriteriaProfile>,
    field: &str,
) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for profile in profiles {
        for category in profile.side(field).categories() {
            if !seen.iter().any(|name| name == category) {
                seen.push(category.to_string());
            }
        }
    }
    seen
}

/// Whether a targeting or location column is a yes/no indicator counted in
/// `total_count`.
///
/// These are the `include_*` / `exclude_*` columns, except raw blobs and
/// location lists. `exclude_location` is the one location flag.
pub(crate) fn is_indicator_column(name: &str) -> bool {
    if name == EXCLUDE_LOCATION {
        return true;
    }
    (name.starts_with("include_") || name.starts_with("exclude_"))
        && !name.contains("raw")
        && !name.contains("location")
}

/// Truthy export values: `True`, `true`, `1`, `1.0`.
pub(crate) fn indicator_value(raw: Option<&str>) -> i32 {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "true" | "1" | "1.0") => 1,
        _ => 0,
    }
}
