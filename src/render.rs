//! Text rendering of query results.

use crate::error::AgentError;
use crate::filters::QueryFilters;
use crate::transport::{DataRecord, ErrorResponse, Pagination, QueryOutcome, QueryPage};
use crossterm::style::{Color, Stylize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Columns shown first, in this order, when present.
const PREFERRED_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "department",
    "role",
    "project_hours",
    "join_date",
    "status",
];

const MAX_CELL_WIDTH: usize = 40;

/// Renders results as plain or coloured text.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colour only when stdout is a terminal.
    pub fn for_stdout() -> Self {
        Self::new(atty::is(atty::Stream::Stdout))
    }

    fn paint(&self, text: &str, color: Color, bold: bool) -> String {
        if !self.color {
            return text.to_string();
        }
        let styled = text.with(color);
        if bold {
            styled.bold().to_string()
        } else {
            styled.to_string()
        }
    }

    pub fn outcome(&self, outcome: &QueryOutcome) -> String {
        match outcome {
            QueryOutcome::Success(page) => self.page(page),
            QueryOutcome::Failure(err) => self.error_response(err),
        }
    }

    pub fn page(&self, page: &QueryPage) -> String {
        if page.data.is_empty() {
            return self.paint("No matching records found.", Color::Yellow, false);
        }

        let mut out = self.table(&page.data);
        out.push('\n');
        out.push_str(&self.paint(&record_count(page.data.len()), Color::DarkGrey, false));

        if let Some(summary) = page.pagination.as_ref().and_then(pagination_line) {
            out.push('\n');
            out.push_str(&self.paint(&summary, Color::DarkGrey, false));
        }

        if let Some(ms) = page
            .metadata
            .as_ref()
            .and_then(|m| m.get("query_time_ms"))
            .and_then(Value::as_f64)
        {
            out.push('\n');
            out.push_str(&self.paint(&format!("Query time: {} ms", ms), Color::DarkGrey, false));
        }
        out
    }

    /// Column-aligned table of records.
    pub fn table(&self, records: &[DataRecord]) -> String {
        let columns = columns(records);
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell).unwrap_or_default())
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                rows.iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(column.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header = columns
            .iter()
            .zip(&widths)
            .map(|(column, width)| pad(column, *width))
            .collect::<Vec<_>>()
            .join("  ");
        let rule = widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("  ");

        let mut lines = vec![
            self.paint(header.trim_end(), Color::Cyan, true),
            self.paint(&rule, Color::DarkGrey, false),
        ];
        for row in rows {
            let line = row
                .iter()
                .zip(&widths)
                .map(|(value, width)| pad(value, *width))
                .collect::<Vec<_>>()
                .join("  ");
            lines.push(line.trim_end().to_string());
        }
        lines.join("\n")
    }

    pub fn error_response(&self, err: &ErrorResponse) -> String {
        let mut lines = vec![self.paint(&format!("Error: {}", err.error), Color::Red, true)];
        if let Some(details) = &err.details {
            lines.push(format!("  Details: {}", inline(details)));
        }
        if let Some(code) = &err.code {
            lines.push(format!("  Code: {}", inline(code)));
        }
        lines.push(self.paint(&format!("  Time: {}", err.timestamp), Color::DarkGrey, false));
        lines.join("\n")
    }

    /// One line describing the filters a query ran with.
    pub fn filters(&self, filters: &QueryFilters) -> String {
        if filters.is_empty() {
            return self.paint(
                "No filters recognized, querying all records.",
                Color::Yellow,
                false,
            );
        }
        format!(
            "Filters: {}",
            serde_json::to_string(filters).unwrap_or_default()
        )
    }

    pub fn agent_error(&self, err: &AgentError) -> String {
        self.paint(&format!("Error: {}", err), Color::Red, true)
    }

    pub fn heading(&self, text: &str) -> String {
        self.paint(text, Color::Green, true)
    }
}

fn record_count(n: usize) -> String {
    if n == 1 {
        "1 record".to_string()
    } else {
        format!("{} records", n)
    }
}

fn pagination_line(pagination: &Pagination) -> Option<String> {
    let mut line = match (pagination.page, pagination.total_pages) {
        (Some(page), Some(pages)) => format!("Page {} of {}", page, pages),
        (Some(page), None) => format!("Page {}", page),
        _ => String::new(),
    };
    if let Some(total) = pagination.total {
        if line.is_empty() {
            line = format!("{} total", total);
        } else {
            line.push_str(&format!(" ({} total)", total));
        }
    }
    (!line.is_empty()).then_some(line)
}

/// Preferred columns first, then every other key in name order.
fn columns(records: &[DataRecord]) -> Vec<String> {
    let present: BTreeSet<&String> = records
        .iter()
        .flat_map(|r| r.fields().map(|(key, _)| key))
        .collect();

    let mut columns: Vec<String> = PREFERRED_COLUMNS
        .iter()
        .filter(|c| present.iter().any(|p| p.as_str() == **c))
        .map(|c| c.to_string())
        .collect();
    columns.extend(
        present
            .into_iter()
            .filter(|p| !PREFERRED_COLUMNS.contains(&p.as_str()))
            .cloned(),
    );
    columns
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        other => inline(other),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let truncated: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        format!("{}…", truncated)
    } else {
        text
    }
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> DataRecord {
        serde_json::from_value(value).unwrap()
    }

    fn plain() -> Renderer {
        Renderer::new(false)
    }

    #[test]
    fn test_columns_preferred_then_alphabetical() {
        let records = vec![
            record(json!({ "zone": "EU", "name": "Ada", "id": 1, "badge": "gold" })),
            record(json!({ "id": 2, "department": "Sales" })),
        ];
        assert_eq!(
            columns(&records),
            vec!["id", "name", "department", "badge", "zone"]
        );
    }

    #[test]
    fn test_table_alignment() {
        let records = vec![
            record(json!({ "id": 1, "name": "Ada", "project_hours": 120 })),
            record(json!({ "id": 22, "name": "Grace Hopper", "project_hours": null })),
        ];
        let table = plain().table(&records);
        assert_eq!(
            table,
            [
                "id  name          project_hours",
                "--  ------------  -------------",
                "1   Ada           120",
                "22  Grace Hopper",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_empty_page() {
        assert_eq!(plain().page(&QueryPage::default()), "No matching records found.");
    }

    #[test]
    fn test_page_summary_lines() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("query_time_ms".into(), json!(12));
        let page = QueryPage {
            data: vec![record(json!({ "id": 1 }))],
            pagination: Some(Pagination {
                total: Some(41),
                page: Some(2),
                page_size: Some(20),
                total_pages: Some(3),
            }),
            metadata: Some(metadata),
        };
        let text = plain().page(&page);
        assert!(text.contains("1 record\n"));
        assert!(text.contains("Page 2 of 3 (41 total)"));
        assert!(text.ends_with("Query time: 12 ms"));
    }

    #[test]
    fn test_filters_line() {
        assert_eq!(
            plain().filters(&QueryFilters::default()),
            "No filters recognized, querying all records."
        );

        let filters = QueryFilters {
            search: Some("rust".into()),
            ..Default::default()
        };
        assert_eq!(plain().filters(&filters), r#"Filters: {"search":"rust"}"#);
    }

    #[test]
    fn test_partial_pagination() {
        let only_total = Pagination {
            total: Some(7),
            ..Default::default()
        };
        assert_eq!(pagination_line(&only_total).as_deref(), Some("7 total"));
        assert_eq!(pagination_line(&Pagination::default()), None);
    }

    #[test]
    fn test_error_response() {
        let err = ErrorResponse {
            error: "API request failed".into(),
            details: Some(json!("connection refused")),
            code: Some(json!(503)),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        };
        assert_eq!(
            plain().error_response(&err),
            "Error: API request failed\n  Details: connection refused\n  Code: 503\n  Time: 2024-01-01T00:00:00.000Z"
        );
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let long = "x".repeat(60);
        let text = cell(&json!(long));
        assert_eq!(text.chars().count(), MAX_CELL_WIDTH);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn test_color_adds_escape_codes() {
        let text = Renderer::new(true).heading("Results");
        assert!(text.contains("\u{1b}["));
        assert!(text.contains("Results"));
    }
}
