//! Turns completion output into canonical [`QueryFilters`].
//!
//! The completion endpoint answers with a JSON object shaped like the query
//! schema, sometimes wrapped in a markdown code fence. This module strips the
//! fence, optionally validates against the schema, and flattens the nested
//! filter/range groups into canonical filters.
//!
//! Exclusive numeric bounds are approximated: `gt: n` becomes
//! `min_hours = n + 1` and `lt: n` becomes `max_hours = n - 1`, applied after
//! the inclusive bound of the same side. This only holds for whole-number
//! hours and is kept for compatibility with existing backends. The bound is
//! derived from `n` itself, so `{gt: 10}` gives 11 and `{gte: 5, gt: 10}`
//! also gives 11, rather than bumping whatever inclusive bound was already
//! set (`(current or 0) + 1`).

use crate::error::NormalizeError;
use crate::filters::{
    deserialize_whole_number, FilterValue, QueryFilters, SortOrder, StatusFilter,
};
use crate::schema::QuerySchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Schema-shaped query as authored by the model.
///
/// Unknown keys are ignored here. Rejecting them is the schema's job.
#[derive(Debug, Default, Deserialize)]
struct QueryResult {
    #[serde(default)]
    filters: Option<ResultFilters>,
    #[serde(default)]
    ranges: Option<ResultRanges>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    sort: Option<ResultSort>,
    #[serde(default, deserialize_with = "deserialize_whole_number")]
    limit: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_whole_number")]
    offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultFilters {
    #[serde(default)]
    department: Option<FilterValue>,
    #[serde(default)]
    name: Option<FilterValue>,
    #[serde(default)]
    role: Option<FilterValue>,
    #[serde(default)]
    status: Option<StatusFilter>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultRanges {
    #[serde(default)]
    project_hours: Option<NumericRange>,
    #[serde(default)]
    join_date: Option<DateRange>,
}

#[derive(Debug, Default, Deserialize)]
struct NumericRange {
    #[serde(default)]
    gte: Option<f64>,
    #[serde(default)]
    lte: Option<f64>,
    #[serde(default)]
    gt: Option<f64>,
    #[serde(default)]
    lt: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DateRange {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    before: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSort {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    order: Option<SortOrder>,
}

/// Converts completion text into canonical filters.
#[derive(Debug, Clone)]
pub struct Normalizer {
    schema: Option<Arc<QuerySchema>>,
}

impl Normalizer {
    /// A normalizer that rejects anything the schema does not accept.
    pub fn validating(schema: Arc<QuerySchema>) -> Self {
        Self {
            schema: Some(schema),
        }
    }

    /// A normalizer that skips schema validation and drops unknown keys.
    pub fn lenient() -> Self {
        Self { schema: None }
    }

    /// Parse raw completion text.
    pub fn parse_completion(&self, raw: &str) -> Result<QueryFilters, NormalizeError> {
        let json = extract_json(raw);
        let value: Value = serde_json::from_str(json).map_err(NormalizeError::InvalidJson)?;
        self.normalize_value(value)
    }

    /// Normalize an already parsed query object.
    pub fn normalize_value(&self, value: Value) -> Result<QueryFilters, NormalizeError> {
        if let Some(schema) = &self.schema {
            schema
                .validate(&value)
                .map_err(NormalizeError::SchemaViolation)?;
        }

        let result: QueryResult = serde_json::from_value(value).map_err(NormalizeError::Shape)?;
        let filters = collapse(result);
        debug!("Normalized filters: {:?}", filters);
        Ok(filters)
    }
}

/// Extract the JSON payload from completion text.
///
/// If the text contains a fenced code block, only the first block's content
/// is returned. The opening fence may carry an info string such as `json`.
pub fn extract_json(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw.trim();
    };
    let after_open = &raw[open + 3..];

    let line_end = after_open.find('\n').unwrap_or(after_open.len());
    let info = after_open[..line_end].trim();
    let is_info_string = info
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'));
    let body = if is_info_string {
        &after_open[(line_end + 1).min(after_open.len())..]
    } else {
        after_open
    };

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn collapse(result: QueryResult) -> QueryFilters {
    let mut filters = QueryFilters::default();

    if let Some(discrete) = result.filters {
        filters.department = discrete.department.filter(FilterValue::is_present);
        filters.name = discrete.name.filter(FilterValue::is_present);
        filters.role = discrete.role.filter(FilterValue::is_present);
        filters.status = discrete.status;
    }

    if let Some(ranges) = result.ranges {
        if let Some(hours) = ranges.project_hours {
            if let Some(gte) = hours.gte {
                filters.min_hours = Some(gte);
            }
            if let Some(gt) = hours.gt {
                filters.min_hours = Some(gt + 1.0);
            }
            if let Some(lte) = hours.lte {
                filters.max_hours = Some(lte);
            }
            if let Some(lt) = hours.lt {
                filters.max_hours = Some(lt - 1.0);
            }
        }

        if let Some(join_date) = ranges.join_date {
            filters.join_date_after = non_empty(join_date.after);
            filters.join_date_before = non_empty(join_date.before);
        }
    }

    filters.search = non_empty(result.search);

    if let Some(sort) = result.sort {
        filters.sort_by = non_empty(sort.field);
        filters.sort_order = Some(sort.order.unwrap_or_default());
    }

    filters.limit = result.limit;
    filters.offset = result.offset;

    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Status;
    use serde_json::json;

    fn lenient(value: Value) -> QueryFilters {
        Normalizer::lenient().normalize_value(value).unwrap()
    }

    fn validating() -> Normalizer {
        Normalizer::validating(Arc::new(QuerySchema::new().unwrap()))
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"limit\": 5}\n"), "{\"limit\": 5}");
    }

    #[test]
    fn test_extract_json_fenced_with_language() {
        let raw = "```json\n{\"filters\":{\"department\":\"Engineering\"}}\n```";
        assert_eq!(extract_json(raw), "{\"filters\":{\"department\":\"Engineering\"}}");
    }

    #[test]
    fn test_extract_json_fenced_without_language() {
        assert_eq!(extract_json("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_extract_json_fence_on_same_line() {
        assert_eq!(extract_json("```{\"limit\": 3}```"), "{\"limit\": 3}");
    }

    #[test]
    fn test_extract_json_with_surrounding_prose() {
        let raw = "Here you go:\n```JSON\n{\"search\": \"rust\"}\n```\nLet me know!";
        assert_eq!(extract_json(raw), "{\"search\": \"rust\"}");
    }

    #[test]
    fn test_extract_json_unclosed_fence() {
        assert_eq!(extract_json("```json\n{\"limit\": 3}"), "{\"limit\": 3}");
    }

    #[test]
    fn test_parse_fenced_completion() {
        let raw = "```json\n{\"filters\":{\"department\":\"Engineering\"}}\n```";
        let filters = validating().parse_completion(raw).unwrap();
        assert_eq!(filters.department, Some(FilterValue::from("Engineering")));
        assert!(filters.additional.is_empty());
    }

    #[test]
    fn test_malformed_completion_is_an_error() {
        let err = validating()
            .parse_completion("Sorry, I can't help with that.")
            .unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidJson(_)));

        let err = Normalizer::lenient()
            .parse_completion("{\"filters\": ")
            .unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidJson(_)));
    }

    #[test]
    fn test_empty_object_is_empty_filters_not_error() {
        let filters = validating().parse_completion("{}").unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_wrong_types_are_shape_errors() {
        let err = Normalizer::lenient()
            .normalize_value(json!({ "filters": { "department": 42 } }))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Shape(_)));

        let err = Normalizer::lenient()
            .normalize_value(json!(["department"]))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Shape(_)));
    }

    #[test]
    fn test_discrete_filters_copied_when_truthy() {
        let filters = lenient(json!({
            "filters": {
                "department": ["Engineering", "Design"],
                "name": "",
                "role": "Manager",
                "status": "active"
            }
        }));
        assert_eq!(
            filters.department,
            Some(FilterValue::Many(vec!["Engineering".into(), "Design".into()]))
        );
        assert_eq!(filters.name, None);
        assert_eq!(filters.role, Some(FilterValue::from("Manager")));
        assert_eq!(filters.status, Some(StatusFilter::One(Status::Active)));
    }

    #[test]
    fn test_gt_collapses_to_next_whole_hour() {
        let filters = lenient(json!({ "ranges": { "project_hours": { "gt": 10 } } }));
        assert_eq!(filters.min_hours, Some(11.0));
    }

    #[test]
    fn test_gt_applied_after_gte() {
        let filters = lenient(json!({ "ranges": { "project_hours": { "gte": 5, "gt": 10 } } }));
        assert_eq!(filters.min_hours, Some(11.0));
    }

    #[test]
    fn test_gte_and_lte_are_inclusive() {
        let filters = lenient(json!({ "ranges": { "project_hours": { "gte": 0, "lte": 40 } } }));
        assert_eq!(filters.min_hours, Some(0.0));
        assert_eq!(filters.max_hours, Some(40.0));
    }

    #[test]
    fn test_lt_collapses_to_previous_whole_hour() {
        let filters = lenient(json!({ "ranges": { "project_hours": { "lt": 20 } } }));
        assert_eq!(filters.max_hours, Some(19.0));

        let filters = lenient(json!({ "ranges": { "project_hours": { "lte": 50, "lt": 20 } } }));
        assert_eq!(filters.max_hours, Some(19.0));
    }

    #[test]
    fn test_join_date_bounds() {
        let filters = lenient(json!({
            "ranges": { "join_date": { "after": "2021-01-01", "before": "" } }
        }));
        assert_eq!(filters.join_date_after.as_deref(), Some("2021-01-01"));
        assert_eq!(filters.join_date_before, None);
    }

    #[test]
    fn test_sort_defaults_to_ascending() {
        let filters = lenient(json!({ "sort": { "field": "name" } }));
        assert_eq!(filters.sort_by.as_deref(), Some("name"));
        assert_eq!(filters.sort_order, Some(SortOrder::Asc));

        let filters = lenient(json!({ "sort": { "field": "join_date", "order": "desc" } }));
        assert_eq!(filters.sort_order, Some(SortOrder::Desc));
    }

    #[test]
    fn test_pagination_copied_including_zero() {
        let filters = lenient(json!({ "limit": 5, "offset": 0, "search": "kotlin" }));
        assert_eq!(filters.limit, Some(5));
        assert_eq!(filters.offset, Some(0));
        assert_eq!(filters.search.as_deref(), Some("kotlin"));
    }

    #[test]
    fn test_whole_float_pagination_accepted_in_both_modes() {
        let value = json!({ "limit": 10.0, "offset": 0.0 });

        let filters = validating().normalize_value(value.clone()).unwrap();
        assert_eq!(filters.limit, Some(10));
        assert_eq!(filters.offset, Some(0));

        let filters = lenient(value);
        assert_eq!(filters.limit, Some(10));
        assert_eq!(filters.offset, Some(0));
    }

    #[test]
    fn test_fractional_limit_rejected() {
        let err = validating()
            .normalize_value(json!({ "limit": 10.5 }))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::SchemaViolation(_)));

        let err = Normalizer::lenient()
            .normalize_value(json!({ "limit": 10.5 }))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Shape(_)));
    }

    #[test]
    fn test_pagination_not_defaulted() {
        let filters = lenient(json!({ "search": "kotlin" }));
        assert_eq!(filters.limit, None);
        assert_eq!(filters.offset, None);
    }

    #[test]
    fn test_lenient_drops_unknown_keys() {
        let filters = lenient(json!({ "filters": { "department": "Sales" }, "explanation": "..." }));
        assert_eq!(filters.department, Some(FilterValue::from("Sales")));
        assert!(filters.additional.is_empty());
    }

    #[test]
    fn test_validating_rejects_unknown_keys() {
        let err = validating()
            .normalize_value(json!({ "filters": { "department": "Sales" }, "explanation": "..." }))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::SchemaViolation(_)));
    }

    #[test]
    fn test_validating_rejects_limit_over_maximum() {
        let err = validating()
            .normalize_value(json!({ "limit": 150 }))
            .unwrap_err();
        match err {
            NormalizeError::SchemaViolation(reasons) => assert!(reasons[0].contains("limit")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lenient_passes_limit_over_maximum() {
        let filters = lenient(json!({ "limit": 150 }));
        assert_eq!(filters.limit, Some(150));
    }
}
