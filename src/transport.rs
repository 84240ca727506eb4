//! HTTP client for the query service.
//!
//! Every call resolves to a [`QueryOutcome`]. Network failures, timeouts and
//! non-success statuses all become [`QueryOutcome::Failure`] carrying whatever
//! detail the service sent back, stamped with the time of failure.

use crate::request::QueryRequest;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_QUERY_URL: &str = "http://localhost:8000/query";
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

const REQUEST_FAILED: &str = "API request failed";
const INVALID_RESPONSE: &str = "Invalid response from query service";

/// One row returned by the query service.
///
/// Records are not validated; any column the service sends is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRecord(pub Map<String, Value>);

impl DataRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Paging summary as reported by the service. Missing or null fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

/// A successful page of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryPage {
    pub data: Vec<DataRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Error detail for a failed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, details: Option<Value>, code: Option<Value>) -> Self {
        Self {
            error: error.into(),
            details,
            code,
            timestamp: now(),
        }
    }
}

/// Result of a query: exactly one of a page of records or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Success(QueryPage),
    Failure(ErrorResponse),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success(_))
    }
}

impl Serialize for QueryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T: Serialize> {
            success: bool,
            #[serde(flatten)]
            body: &'a T,
        }

        #[derive(Serialize)]
        struct FailureBody<'a> {
            error: &'a ErrorResponse,
        }

        match self {
            QueryOutcome::Success(page) => Tagged {
                success: true,
                body: page,
            }
            .serialize(serializer),
            QueryOutcome::Failure(error) => Tagged {
                success: false,
                body: &FailureBody { error },
            }
            .serialize(serializer),
        }
    }
}

/// Anything that can execute a built query.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn execute(&self, request: &QueryRequest) -> QueryOutcome;
}

/// HTTP transport to the query service.
pub struct QueryClient {
    endpoint: String,
    timeout: Duration,
    client: Client,
}

impl QueryClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryTransport for QueryClient {
    async fn execute(&self, request: &QueryRequest) -> QueryOutcome {
        info!("Sending query to {}", self.endpoint);
        debug!(
            "Query body: {}",
            serde_json::to_string(request).unwrap_or_default()
        );

        let response = match self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport_failure(&e, self.timeout),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return transport_failure(&e, self.timeout),
        };

        let outcome = if status.is_success() {
            success_outcome(&body)
        } else {
            status_failure(status, &body)
        };

        match &outcome {
            QueryOutcome::Success(page) => {
                info!("Query successful. Received {} records", page.data.len())
            }
            QueryOutcome::Failure(err) => error!("Query failed: {:?}", err),
        }
        outcome
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn transport_failure(err: &reqwest::Error, timeout: Duration) -> QueryOutcome {
    let details = if err.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs_f64())
    } else {
        err.to_string()
    };
    error!("Query transport error: {}", details);
    QueryOutcome::Failure(ErrorResponse::new(
        REQUEST_FAILED,
        Some(Value::String(details)),
        err.status().map(|s| Value::from(s.as_u16())),
    ))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<DataRecord>,
    #[serde(default, deserialize_with = "pass_through")]
    pagination: Option<Pagination>,
    #[serde(default, deserialize_with = "pass_through")]
    metadata: Option<Map<String, Value>>,
}

/// Optional summary fields never decide whether a page of records succeeded.
/// A value of the wrong shape is dropped.
fn pass_through<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            warn!("Ignoring malformed response field: {}", e);
            Ok(None)
        }
    }
}

fn success_outcome(body: &str) -> QueryOutcome {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return QueryOutcome::Failure(ErrorResponse::new(
                INVALID_RESPONSE,
                Some(Value::String(e.to_string())),
                None,
            ))
        }
    };

    match value {
        // A bare list of records.
        Value::Array(_) => match serde_json::from_value::<Vec<DataRecord>>(value) {
            Ok(data) => QueryOutcome::Success(QueryPage {
                data,
                ..Default::default()
            }),
            Err(e) => invalid_response(e),
        },
        Value::Object(ref object)
            if object.contains_key("error") && !object.contains_key("data") =>
        {
            error_body_failure(object, None)
        }
        Value::Object(_) => match serde_json::from_value::<Envelope>(value) {
            Ok(envelope) => QueryOutcome::Success(QueryPage {
                data: envelope.data,
                pagination: envelope.pagination,
                metadata: envelope.metadata,
            }),
            Err(e) => invalid_response(e),
        },
        other => QueryOutcome::Failure(ErrorResponse::new(
            INVALID_RESPONSE,
            Some(Value::String(format!("unexpected body: {}", other))),
            None,
        )),
    }
}

fn invalid_response(err: serde_json::Error) -> QueryOutcome {
    QueryOutcome::Failure(ErrorResponse::new(
        INVALID_RESPONSE,
        Some(Value::String(err.to_string())),
        None,
    ))
}

fn status_failure(status: StatusCode, body: &str) -> QueryOutcome {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => error_body_failure(&object, Some(status)),
        _ => {
            let details = if body.trim().is_empty() {
                format!("Request failed with status code {}", status.as_u16())
            } else {
                body.trim().to_string()
            };
            QueryOutcome::Failure(ErrorResponse::new(
                REQUEST_FAILED,
                Some(Value::String(details)),
                Some(Value::from(status.as_u16())),
            ))
        }
    }
}

/// Build the failure from an `{error, details?, code?, timestamp?}` body.
fn error_body_failure(object: &Map<String, Value>, status: Option<StatusCode>) -> QueryOutcome {
    let error = object
        .get("error")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .unwrap_or(REQUEST_FAILED)
        .to_string();

    // FastAPI reports validation problems under `detail`.
    let details = object
        .get("details")
        .or_else(|| object.get("detail"))
        .filter(|d| !d.is_null())
        .cloned()
        .or_else(|| {
            status.map(|s| Value::String(format!("Request failed with status code {}", s.as_u16())))
        });

    let code = object
        .get("code")
        .filter(|c| !c.is_null())
        .cloned()
        .or_else(|| status.map(|s| Value::from(s.as_u16())));

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(now);

    QueryOutcome::Failure(ErrorResponse {
        error,
        details,
        code,
        timestamp,
    })
}
