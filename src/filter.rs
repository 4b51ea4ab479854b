//! Linear-scan record selection.
//!
//! A [`Predicate`] is a conjunction of [`Condition`]s; [`select`] returns the
//! matching records in source order.

use crate::types::{Field, Record};

/// Coordinates are grouped at this many decimal places.
pub const COORDINATE_DECIMALS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value exactly. An absent field never matches.
    Equals(Field, String),
    /// Field must not equal the excluded value, see [`passes_exclusion`].
    Excludes(Field, Option<String>),
    /// Case-insensitive substring; an absent field reads as "".
    ContainsIgnoreCase(Field, String),
    /// Same location once both sides are rounded to [`COORDINATE_DECIMALS`].
    AtCoordinates { lat: f64, lon: f64 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: Field, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::Equals(field, value.into()));
        self
    }

    pub fn excludes(mut self, field: Field, value: Option<&str>) -> Self {
        self.conditions
            .push(Condition::Excludes(field, value.map(str::to_string)));
        self
    }

    pub fn contains_ignore_case(mut self, field: Field, needle: &str) -> Self {
        self.conditions
            .push(Condition::ContainsIgnoreCase(field, needle.to_lowercase()));
        self
    }

    pub fn at_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.conditions.push(Condition::AtCoordinates { lat, lon });
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|condition| condition.matches(record))
    }
}

impl Condition {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Equals(field, value) => record.text(*field) == Some(value.as_str()),
            Condition::Excludes(field, excluded) => {
                passes_exclusion(record.text(*field), excluded.as_deref())
            }
            // Needles are lowercased when the condition is built.
            Condition::ContainsIgnoreCase(field, needle) => record
                .text(*field)
                .unwrap_or("")
                .to_lowercase()
                .contains(needle.as_str()),
            Condition::AtCoordinates { lat, lon } => {
                same_coordinates(
                    record.latitude.unwrap_or(0.0),
                    record.longitude.unwrap_or(0.0),
                    *lat,
                    *lon,
                )
            }
        }
    }
}

/// Exclusion test for the family-grouping lookups.
///
/// A record passes when its value differs from the excluded one, or when both
/// are blank (absent or empty). So a supplied exclusion drops exactly the
/// records equal to it, blank records always stay, and no exclusion keeps
/// everything.
pub fn passes_exclusion(value: Option<&str>, excluded: Option<&str>) -> bool {
    value != excluded || (is_blank(value) && is_blank(excluded))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}

/// Rounds the exact decimal value of `value` to [`COORDINATE_DECIMALS`]
/// places, ties to even.
pub fn round_coordinate(value: f64) -> f64 {
    format!("{:.*}", COORDINATE_DECIMALS as usize, value)
        .parse()
        .unwrap_or(value)
}

pub fn same_coordinates(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> bool {
    round_coordinate(lat_a) == round_coordinate(lat_b)
        && round_coordinate(lon_a) == round_coordinate(lon_b)
}

pub fn select<'a>(records: &'a [Record], predicate: &Predicate) -> Vec<&'a Record> {
    records.iter().filter(|record| predicate.matches(record)).collect()
}

pub fn select_ids(records: &[Record], predicate: &Predicate) -> Vec<i64> {
    records
        .iter()
        .filter(|record| predicate.matches(record))
        .map(|record| record.id)
        .collect()
}
