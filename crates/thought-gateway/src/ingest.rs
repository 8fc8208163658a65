//! Single validate-then-write path shared by every ingest entry point.

use serde::Deserialize;
use serde_json::{Map, Value};
use thought_common::{Error, Result};
use thought_db::{NewThought, ThoughtStore};

/// Default source for thoughts arriving through the OpenClaw webhook.
pub const WEBHOOK_SOURCE: &str = "openclaw";
/// Default source for direct API calls.
pub const API_SOURCE: &str = "api";

/// Tags as callers send them: a JSON list or one comma-separated string.
/// Any other shape is accepted and treated as no tags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
    Other(Value),
}

impl TagsInput {
    /// Split the string form on commas, trimming each tag and dropping empty
    /// ones. The list form is kept as sent.
    pub fn normalize(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(String::from)
                .collect(),
            Self::Other(_) => Vec::new(),
        }
    }
}

/// Entry-point independent ingest input.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl IngestRequest {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookEnvelope {
    pub data: IngestRequest,
}

/// Body of `POST /webhooks/ingest`: either the thought itself or the thought
/// wrapped in a `{"data": ...}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WebhookBody {
    Envelope(WebhookEnvelope),
    Flat(IngestRequest),
}

impl From<WebhookBody> for IngestRequest {
    fn from(body: WebhookBody) -> Self {
        match body {
            WebhookBody::Envelope(envelope) => envelope.data,
            WebhookBody::Flat(request) => request,
        }
    }
}

/// Body of `POST /ingest`. Direct callers cannot attach metadata.
#[derive(Debug, Deserialize)]
pub struct DirectBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
}

impl From<DirectBody> for IngestRequest {
    fn from(body: DirectBody) -> Self {
        Self {
            content: body.content,
            source: body.source,
            tags: body.tags,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestPipeline {
    store: ThoughtStore,
}

impl IngestPipeline {
    pub fn new(store: ThoughtStore) -> Self {
        Self { store }
    }

    /// Validate and normalize a request into the row that will be written.
    pub fn prepare(request: IngestRequest, default_source: &str) -> Result<NewThought> {
        let content = request
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Validation("content is required".into()))?;

        let source = request
            .source
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_source.to_string());

        Ok(NewThought {
            content,
            source,
            tags: request.tags.map(TagsInput::normalize).unwrap_or_default(),
            metadata: request.metadata.unwrap_or_default(),
        })
    }

    /// Validate, then insert exactly one thought. Returns the new id.
    pub fn ingest(&self, request: IngestRequest, default_source: &str) -> Result<i64> {
        let thought = Self::prepare(request, default_source)?;
        self.store.insert(&thought)
    }

    /// [`IngestPipeline::ingest`] on the blocking pool.
    pub async fn ingest_blocking(
        &self,
        request: IngestRequest,
        default_source: &'static str,
    ) -> Result<i64> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.ingest(request, default_source))
            .await
            .map_err(|e| Error::Other(format!("ingest task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::{
        API_SOURCE, DirectBody, IngestPipeline, IngestRequest, TagsInput, WEBHOOK_SOURCE,
        WebhookBody,
    };
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::Path;
    use tempfile::TempDir;
    use thought_db::{MigrationRunner, StorageGateway, ThoughtStore};

    fn pipeline() -> (TempDir, IngestPipeline, ThoughtStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let gateway = StorageGateway::new(dir.path().join("data.db")).expect("gateway");
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
        MigrationRunner::new(gateway.clone(), shipped)
            .migrate()
            .expect("migrations should apply");
        let store = ThoughtStore::new(gateway);
        (dir, IngestPipeline::new(store.clone()), store)
    }

    #[test]
    fn csv_tags_are_split_and_trimmed() {
        let tags = TagsInput::Csv("a, b ,c".to_string()).normalize();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn csv_tags_drop_empty_entries() {
        assert!(TagsInput::Csv(String::new()).normalize().is_empty());
        assert_eq!(
            TagsInput::Csv(" idea,, ,later ".to_string()).normalize(),
            vec!["idea", "later"]
        );
    }

    #[test]
    fn list_tags_are_kept_in_order() {
        let tags = TagsInput::List(vec!["z".into(), "a".into()]).normalize();
        assert_eq!(tags, vec!["z", "a"]);
    }

    #[test]
    fn tags_deserialize_from_either_shape() {
        let list: TagsInput = serde_json::from_value(json!(["x", "y"])).expect("list");
        let csv: TagsInput = serde_json::from_value(json!("x, y")).expect("csv");
        assert_eq!(list.normalize(), csv.normalize());
    }

    #[test]
    fn unexpected_tag_shapes_become_empty() {
        for raw in [json!(42), json!({"a": 1}), json!([1, 2]), json!(true)] {
            let tags: TagsInput = serde_json::from_value(raw.clone()).expect("any shape");
            assert!(tags.normalize().is_empty(), "{raw}");
        }
    }

    #[test]
    fn webhook_with_numeric_tags_is_still_stored() {
        let (_dir, pipeline, store) = pipeline();
        let body: WebhookBody = serde_json::from_value(json!({
            "content": "tags went wrong",
            "tags": 42
        }))
        .expect("webhook body");

        let id = pipeline
            .ingest(body.into(), WEBHOOK_SOURCE)
            .expect("ingest");

        let stored = store.get(id).expect("get").expect("exists");
        assert_eq!(stored.content, "tags went wrong");
        assert!(stored.tags.is_empty());
    }

    #[test]
    fn prepare_applies_defaults() {
        let thought = IngestPipeline::prepare(IngestRequest::content("hello"), API_SOURCE)
            .expect("valid request");

        assert_eq!(thought.content, "hello");
        assert_eq!(thought.source, "api");
        assert!(thought.tags.is_empty());
        assert!(thought.metadata.is_empty());
    }

    #[test]
    fn blank_source_falls_back_to_default() {
        let request = IngestRequest {
            source: Some("   ".into()),
            ..IngestRequest::content("hello")
        };
        let thought = IngestPipeline::prepare(request, WEBHOOK_SOURCE).expect("valid");
        assert_eq!(thought.source, "openclaw");
    }

    #[test]
    fn missing_or_blank_content_is_rejected_without_writing() {
        let (_dir, pipeline, store) = pipeline();

        for request in [
            IngestRequest::default(),
            IngestRequest::content(""),
            IngestRequest::content(" \n\t"),
        ] {
            let err = pipeline
                .ingest(request, API_SOURCE)
                .expect_err("content is required");
            assert!(err.is_validation());
            assert_eq!(err.to_string(), "validation error: content is required");
        }

        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn each_ingest_writes_one_row_with_a_new_id() {
        let (_dir, pipeline, store) = pipeline();
        let mut ids = HashSet::new();

        for i in 0..5 {
            let id = pipeline
                .ingest(IngestRequest::content(format!("thought {i}")), API_SOURCE)
                .expect("ingest");
            assert!(ids.insert(id), "id {id} was returned twice");
            assert_eq!(store.count().expect("count"), i + 1);
        }
    }

    #[test]
    fn webhook_and_direct_bodies_share_one_path() {
        let (_dir, pipeline, store) = pipeline();

        let webhook: WebhookBody = serde_json::from_value(json!({
            "content": "from the gateway",
            "tags": "inbox, later",
            "metadata": {"chat_id": 7}
        }))
        .expect("webhook body");
        let direct: DirectBody = serde_json::from_value(json!({
            "content": "from curl",
            "tags": ["cli"]
        }))
        .expect("direct body");

        let webhook_id = pipeline
            .ingest(webhook.into(), WEBHOOK_SOURCE)
            .expect("webhook ingest");
        let direct_id = pipeline
            .ingest(direct.into(), API_SOURCE)
            .expect("direct ingest");

        let from_webhook = store.get(webhook_id).expect("get").expect("exists");
        assert_eq!(from_webhook.source, "openclaw");
        assert_eq!(from_webhook.tags, vec!["inbox", "later"]);
        assert_eq!(from_webhook.metadata.get("chat_id"), Some(&json!(7)));

        let from_direct = store.get(direct_id).expect("get").expect("exists");
        assert_eq!(from_direct.source, "api");
        assert_eq!(from_direct.tags, vec!["cli"]);
        assert!(from_direct.metadata.is_empty());
    }

    #[test]
    fn webhook_envelope_is_unwrapped() {
        let body: WebhookBody = serde_json::from_value(json!({
            "data": {"content": "wrapped", "source": "telegram"}
        }))
        .expect("envelope");
        let request = IngestRequest::from(body);

        assert_eq!(request.content.as_deref(), Some("wrapped"));
        assert_eq!(request.source.as_deref(), Some("telegram"));
    }

    #[test]
    fn flat_body_with_data_metadata_is_not_an_envelope() {
        let body: WebhookBody = serde_json::from_value(json!({
            "content": "flat",
            "data": {"content": "ignored"}
        }))
        .expect("flat body");
        assert_eq!(IngestRequest::from(body).content.as_deref(), Some("flat"));
    }

    #[tokio::test]
    async fn ingest_blocking_returns_id() {
        let (_dir, pipeline, store) = pipeline();
        let id = pipeline
            .ingest_blocking(IngestRequest::content("async"), API_SOURCE)
            .await
            .expect("ingest");
        assert_eq!(store.get(id).expect("get").expect("exists").content, "async");
    }
}
