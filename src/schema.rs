//! The structured query schema the completion endpoint must answer with.
//!
//! The same document is shown to the model in the system prompt and used to
//! validate what comes back, so anything the model invents outside this shape
//! is rejected before it reaches the query service.

use anyhow::{anyhow, Result};
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};

/// Accepted values for `filters.status`.
pub const STATUS_VALUES: [&str; 3] = ["active", "inactive", "on_leave"];

/// Fields the query service can sort by.
pub const SORT_FIELDS: [&str; 7] = [
    "id",
    "name",
    "department",
    "role",
    "project_hours",
    "join_date",
    "status",
];

pub const SORT_ORDERS: [&str; 2] = ["asc", "desc"];

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
pub const DEFAULT_OFFSET: i64 = 0;

/// Compiled query schema.
#[derive(Debug)]
pub struct QuerySchema {
    document: Value,
    validator: JSONSchema,
}

impl QuerySchema {
    /// Compile the built-in schema document.
    pub fn new() -> Result<Self> {
        Self::from_document(schema_document())
    }

    /// Compile an arbitrary draft 7 schema document.
    pub fn from_document(document: Value) -> Result<Self> {
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|e| anyhow!("Schema compilation failed: {}", e))?;

        Ok(Self {
            document,
            validator,
        })
    }

    /// The raw schema document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Pretty-printed schema, as embedded in the system prompt.
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.document).unwrap_or_else(|_| self.document.to_string())
    }

    /// Validate a candidate query, collecting every violation.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        match self.validator.validate(value) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_string() } else { path };
                    format!("{}: {}", path, error)
                })
                .collect()),
        }
    }
}

fn string_or_strings(description: &str) -> Value {
    json!({
        "description": description,
        "anyOf": [
            { "type": "string" },
            { "type": "array", "items": { "type": "string" } }
        ]
    })
}

fn numeric_range(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "additionalProperties": false,
        "properties": {
            "gte": { "type": "number", "description": "Greater than or equal to" },
            "lte": { "type": "number", "description": "Less than or equal to" },
            "gt": { "type": "number", "description": "Strictly greater than" },
            "lt": { "type": "number", "description": "Strictly less than" }
        }
    })
}

fn date_range(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "additionalProperties": false,
        "properties": {
            "after": { "type": "string", "description": "On or after this date (YYYY-MM-DD)" },
            "before": { "type": "string", "description": "On or before this date (YYYY-MM-DD)" }
        }
    })
}

/// The built-in schema document.
pub fn schema_document() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "QueryResult",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "filters": {
                "type": "object",
                "description": "Exact-match filters",
                "additionalProperties": false,
                "properties": {
                    "department": string_or_strings("Filter by department name"),
                    "name": string_or_strings("Filter by person name"),
                    "role": string_or_strings("Filter by job role"),
                    "status": {
                        "description": "Filter by employment status",
                        "anyOf": [
                            { "type": "string", "enum": STATUS_VALUES },
                            { "type": "array", "items": { "type": "string", "enum": STATUS_VALUES } }
                        ]
                    }
                }
            },
            "ranges": {
                "type": "object",
                "description": "Range constraints",
                "additionalProperties": false,
                "properties": {
                    "project_hours": numeric_range("Bounds on project hours"),
                    "join_date": date_range("Bounds on the join date")
                }
            },
            "search": {
                "type": "string",
                "description": "Free-text search across all fields"
            },
            "sort": {
                "type": "object",
                "additionalProperties": false,
                "required": ["field"],
                "properties": {
                    "field": { "type": "string", "enum": SORT_FIELDS },
                    "order": { "type": "string", "enum": SORT_ORDERS, "default": "asc" }
                }
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_LIMIT,
                "default": DEFAULT_LIMIT
            },
            "offset": {
                "type": "integer",
                "minimum": 0,
                "default": DEFAULT_OFFSET
            }
        }
    })
}
