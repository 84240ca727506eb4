//! Natural language query pipeline.
//!
//! One query runs to completion before the next: completion request, JSON
//! extraction and normalization, request building, then the query service
//! call. Dropping the returned future cancels whichever call is in flight.

use crate::config::Config;
use crate::error::AgentError;
use crate::filters::QueryFilters;
use crate::llm::CompletionClient;
use crate::normalizer::Normalizer;
use crate::request::QueryRequest;
use crate::schema::QuerySchema;
use crate::transport::{QueryOutcome, QueryTransport};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything produced for one query.
#[derive(Debug)]
pub struct QueryReport {
    pub filters: QueryFilters,
    pub request: QueryRequest,
    pub outcome: QueryOutcome,
}

pub struct Agent {
    config: Config,
    schema: Arc<QuerySchema>,
    normalizer: Normalizer,
    completion: Box<dyn CompletionClient>,
    transport: Box<dyn QueryTransport>,
}

impl Agent {
    pub fn new(
        config: Config,
        schema: Arc<QuerySchema>,
        completion: Box<dyn CompletionClient>,
        transport: Box<dyn QueryTransport>,
    ) -> Self {
        let normalizer = if config.validation.enabled {
            Normalizer::validating(Arc::clone(&schema))
        } else {
            Normalizer::lenient()
        };

        Self {
            config,
            schema,
            normalizer,
            completion,
            transport,
        }
    }

    /// Translate a natural language query into canonical filters.
    pub async fn parse_query(&self, query: &str) -> Result<QueryFilters, AgentError> {
        info!("Converting to structured query: {}", query);
        let prompt = self.config.build_prompt(&self.schema, query);
        debug!("User prompt: {}", prompt.user);

        let raw = self.completion.complete(&prompt).await?;
        debug!("Completion text: {}", raw);

        let filters = self.normalizer.parse_completion(&raw)?;
        info!(
            "Structured query: {}",
            serde_json::to_string(&filters).unwrap_or_default()
        );
        Ok(filters)
    }

    /// Send canonical filters to the query service.
    pub async fn execute(&self, filters: &QueryFilters) -> (QueryRequest, QueryOutcome) {
        let request = QueryRequest::build(filters);
        let outcome = self.transport.execute(&request).await;
        (request, outcome)
    }

    /// Translate and run a natural language query.
    pub async fn process(&self, query: &str) -> Result<QueryReport, AgentError> {
        let filters = self.parse_query(query).await?;
        let (request, outcome) = self.execute(&filters).await;
        Ok(QueryReport {
            filters,
            request,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompletionError, NormalizeError};
    use crate::filters::FilterValue;
    use crate::llm::Prompt;
    use crate::transport::{ErrorResponse, QueryPage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        TimedOut,
    }

    struct FakeCompletion {
        reply: Reply,
        prompts: Arc<Mutex<Vec<Prompt>>>,
    }

    #[async_trait]
    impl CompletionClient for FakeCompletion {
        async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::TimedOut => Err(CompletionError::Timeout {
                    backend: "ollama",
                    secs: 30,
                }),
            }
        }
    }

    struct FakeTransport {
        outcome: QueryOutcome,
        requests: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl QueryTransport for FakeTransport {
        async fn execute(&self, request: &QueryRequest) -> QueryOutcome {
            self.requests
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            self.outcome.clone()
        }
    }

    struct Harness {
        agent: Agent,
        prompts: Arc<Mutex<Vec<Prompt>>>,
        requests: Arc<Mutex<Vec<Value>>>,
    }

    fn harness(reply: Reply, outcome: QueryOutcome, validate: bool) -> Harness {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut config = Config::default();
        config.validation.enabled = validate;

        let agent = Agent::new(
            config,
            Arc::new(QuerySchema::new().unwrap()),
            Box::new(FakeCompletion {
                reply,
                prompts: Arc::clone(&prompts),
            }),
            Box::new(FakeTransport {
                outcome,
                requests: Arc::clone(&requests),
            }),
        );
        Harness {
            agent,
            prompts,
            requests,
        }
    }

    fn empty_page() -> QueryOutcome {
        QueryOutcome::Success(QueryPage::default())
    }

    #[tokio::test]
    async fn test_fenced_completion_reaches_transport() {
        let h = harness(
            Reply::Text("```json\n{\"filters\":{\"department\":\"Engineering\"},\"ranges\":{\"project_hours\":{\"gt\":10}}}\n```"),
            empty_page(),
            true,
        );

        let report = h.agent.process("engineers with more than 10 hours").await.unwrap();
        assert_eq!(report.filters.department, Some(FilterValue::from("Engineering")));
        assert_eq!(report.filters.min_hours, Some(11.0));
        assert!(report.outcome.is_success());

        let requests = h.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            json!({
                "filters": { "department": "Engineering" },
                "ranges": { "project_hours": { "gte": 11 } }
            })
        );
    }

    #[tokio::test]
    async fn test_prompt_carries_schema_and_query() {
        let h = harness(Reply::Text("{}"), empty_page(), true);
        h.agent.parse_query("who is on leave?").await.unwrap();

        let prompts = h.prompts.lock().unwrap();
        assert!(prompts[0].system.contains("Available schema:"));
        assert!(prompts[0].user.ends_with("who is on leave?"));
    }

    #[tokio::test]
    async fn test_malformed_completion_is_not_empty_filters() {
        let h = harness(Reply::Text("I think you want engineers."), empty_page(), true);

        let err = h.agent.process("engineers").await.unwrap_err();
        assert!(matches!(err, AgentError::Parse(NormalizeError::InvalidJson(_))));
        assert!(h.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_completion_object_is_empty_filters() {
        let h = harness(Reply::Text("{}"), empty_page(), true);
        let report = h.agent.process("everyone").await.unwrap();
        assert!(report.filters.is_empty());
        assert_eq!(h.requests.lock().unwrap()[0], json!({}));
    }

    #[tokio::test]
    async fn test_completion_failure_skips_transport() {
        let h = harness(Reply::TimedOut, empty_page(), true);

        let err = h.agent.process("anything").await.unwrap_err();
        assert!(matches!(err, AgentError::Completion(CompletionError::Timeout { .. })));
        assert!(h.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_before_transport() {
        let h = harness(Reply::Text("{\"limit\": 150}"), empty_page(), true);

        let err = h.agent.process("150 people").await.unwrap_err();
        assert!(matches!(err, AgentError::Parse(NormalizeError::SchemaViolation(_))));
        assert!(h.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_without_validation_limit_passes_through() {
        let h = harness(Reply::Text("{\"limit\": 150}"), empty_page(), false);

        h.agent.process("150 people").await.unwrap();
        assert_eq!(h.requests.lock().unwrap()[0], json!({ "limit": 150 }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_raised() {
        let failure = QueryOutcome::Failure(ErrorResponse::new(
            "API request failed",
            Some(json!("connection refused")),
            None,
        ));
        let h = harness(Reply::Text("{\"search\": \"rust\"}"), failure, true);

        let report = h.agent.process("rust").await.unwrap();
        match report.outcome {
            QueryOutcome::Failure(err) => {
                assert_eq!(err.error, "API request failed");
                assert!(!err.timestamp.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_forwards_additional_filters() {
        let h = harness(Reply::Text("{}"), empty_page(), true);
        let filters: QueryFilters =
            serde_json::from_value(json!({ "role": "Lead", "location": "Remote" })).unwrap();

        let (request, _) = h.agent.execute(&filters).await;
        assert!(request.additional_filters.is_some());
        assert_eq!(
            h.requests.lock().unwrap()[0],
            json!({ "filters": { "role": "Lead" }, "additional_filters": { "location": "Remote" } })
        );
    }
}
