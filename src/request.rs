//! Wire request body for the query service.

use crate::filters::{serialize_hours, FilterValue, QueryFilters, SortOrder, StatusFilter};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Body POSTed to the query service.
///
/// Every group is omitted entirely when it would be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<ExactFilters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Ranges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_filters: Option<BTreeMap<String, Value>>,
}

/// Exact-match filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExactFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<FilterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<FilterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<FilterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,
}

impl ExactFilters {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_hours: Option<HourRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_date: Option<DateRange>,
}

/// Inclusive bounds on project hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourRange {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_hours"
    )]
    pub gte: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_hours"
    )]
    pub lte: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

fn present(value: &Option<FilterValue>) -> Option<FilterValue> {
    value.as_ref().filter(|v| v.is_present()).cloned()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl QueryRequest {
    /// Build the wire body for a set of canonical filters.
    pub fn build(filters: &QueryFilters) -> Self {
        let exact = ExactFilters {
            department: present(&filters.department),
            name: present(&filters.name),
            role: present(&filters.role),
            status: filters.status.clone(),
        };

        let project_hours = if filters.min_hours.is_some() || filters.max_hours.is_some() {
            Some(HourRange {
                gte: filters.min_hours,
                lte: filters.max_hours,
            })
        } else {
            None
        };

        let after = non_empty(&filters.join_date_after);
        let before = non_empty(&filters.join_date_before);
        let join_date = if after.is_some() || before.is_some() {
            Some(DateRange { after, before })
        } else {
            None
        };

        let ranges = if project_hours.is_some() || join_date.is_some() {
            Some(Ranges {
                project_hours,
                join_date,
            })
        } else {
            None
        };

        let sort = non_empty(&filters.sort_by).map(|field| Sort {
            field,
            order: filters.sort_order.unwrap_or_default(),
        });

        Self {
            filters: if exact.is_empty() { None } else { Some(exact) },
            ranges,
            search: non_empty(&filters.search),
            sort,
            limit: filters.limit,
            offset: filters.offset,
            additional_filters: if filters.additional.is_empty() {
                None
            } else {
                Some(filters.additional.clone())
            },
        }
    }
}
