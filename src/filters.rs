//! Canonical query filters.
//!
//! This is the flattened form passed from the normalizer to the request
//! builder. Ranges are already collapsed into scalar bounds here; they are
//! only nested again when the wire body is built.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// A discrete filter matching one value or any of several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl FilterValue {
    /// Whether the value counts as set. Empty strings do not; lists always do.
    pub fn is_present(&self) -> bool {
        match self {
            FilterValue::One(value) => !value.is_empty(),
            FilterValue::Many(_) => true,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::One(value.to_string())
    }
}

/// Employment status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Inactive,
    OnLeave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusFilter {
    One(Status),
    Many(Vec<Status>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Canonical filters for a single query.
///
/// Known fields are typed. Anything else supplied by a caller is kept in
/// `additional` and forwarded to the query service as `additional_filters`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,

    /// Inclusive lower bound on project hours.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_hours"
    )]
    pub min_hours: Option<f64>,
    /// Inclusive upper bound on project hours.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_hours"
    )]
    pub max_hours: Option<f64>,

    /// YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_date_after: Option<String>,
    /// YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_date_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_whole_number"
    )]
    pub limit: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_whole_number"
    )]
    pub offset: Option<i64>,

    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

impl QueryFilters {
    /// True when no constraint of any kind is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// JSON form of an hour bound. Whole numbers are written as integers.
pub fn hours_to_json(hours: f64) -> Value {
    if hours.is_finite() && hours.fract() == 0.0 && hours.abs() < 9.0e15 {
        Value::from(hours as i64)
    } else {
        Value::from(hours)
    }
}

pub(crate) fn serialize_hours<S: Serializer>(
    hours: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match hours {
        Some(hours) => hours_to_json(*hours).serialize(serializer),
        None => serializer.serialize_none(),
    }
}

/// Reads an integer, also accepting a float with no fractional part such as
/// `10.0`, which JSON Schema counts as an integer.
pub(crate) fn deserialize_whole_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    let Some(number) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(n) = number.as_i64() {
        return Ok(Some(n));
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Some(f as i64)),
        _ => Err(D::Error::custom(format!(
            "expected a whole number, found {}",
            number
        ))),
    }
}
