//! Per-request pipeline for the assistant API routes.
//!
//! ```text
//! RECEIVED → FORWARDED → DECODED → OVERRIDE_RESOLVED → [MERGED | REPLACED | PASSTHROUGH]
//!          → [CHAIN_APPLIED | CHAIN_SKIPPED | CHAIN_FAILED] → history → RESPONDED
//! ```
//!
//! Only the forward call can fail the request. Every later step degrades to the best
//! body known so far, and the upstream bytes are returned untouched unless a merge,
//! replacement or chain actually changed them.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Method;

use crate::interception::chain::SpeechChain;
use crate::interception::codec::{self, QueryResponse};
use crate::interception::merge::merge;
use crate::interception::resolver::{MatchStrategy, OverrideResolver, Resolution};
use crate::observability::metrics;
use crate::store::HistoryRecorder;
use crate::upstream::{
    Credentials, OutboundRequest, RouteClass, UpstreamClient, UpstreamError,
};

/// An inbound API request, already buffered.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: Option<String>,
    pub method: Method,
    /// Path plus query; also the logical endpoint used for lookups and history.
    pub path_and_query: String,
    pub credentials: Credentials,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl InboundRequest {
    /// The request body as text, used for payload lookups and history.
    pub fn payload(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Merged,
    /// Exact rule served verbatim over an undecodable upstream body.
    Replaced,
    Passthrough,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Merged => "merged",
            Disposition::Replaced => "replaced",
            Disposition::Passthrough => "passthrough",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Applied,
    Skipped,
    Failed,
}

impl ChainOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainOutcome::Applied => "applied",
            ChainOutcome::Skipped => "skipped",
            ChainOutcome::Failed => "failed",
        }
    }
}

/// What happened to one response on its way through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub strategy: Option<MatchStrategy>,
    pub rule_id: Option<i64>,
    pub disposition: Disposition,
    pub chain: ChainOutcome,
}

#[derive(Debug, Clone)]
pub struct Intercepted {
    pub body: Bytes,
    pub outcome: Outcome,
}

/// Ties forwarding, override resolution, merge, the speech chain and history together.
pub struct Interceptor {
    upstream: Arc<dyn UpstreamClient>,
    resolver: Option<OverrideResolver>,
    chain: Option<SpeechChain>,
    history: Option<HistoryRecorder>,
}

impl Interceptor {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            resolver: None,
            chain: None,
            history: None,
        }
    }

    pub fn with_resolver(mut self, resolver: OverrideResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_chain(mut self, chain: SpeechChain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_history(mut self, history: HistoryRecorder) -> Self {
        self.history = Some(history);
        self
    }

    pub async fn handle(&self, request: InboundRequest) -> Result<Intercepted, UpstreamError> {
        let endpoint = request.path_and_query.clone();
        let payload = request.payload();
        let request_id = request.request_id.clone().unwrap_or_default();

        let outbound = OutboundRequest {
            method: request.method.clone(),
            path_and_query: request.path_and_query.clone(),
            credentials: request.credentials.clone(),
            content_type: request.content_type.clone(),
            body: (!request.body.is_empty()).then(|| request.body.clone()),
        };

        let upstream = match self.upstream.forward(RouteClass::Api, outbound).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_upstream_error(RouteClass::Api.as_str(), e.kind());
                tracing::error!(
                    request_id = %request_id,
                    endpoint = %endpoint,
                    error = %e,
                    "Upstream forward failed"
                );
                if let Some(history) = &self.history {
                    history.record(&endpoint, &payload, b"").await;
                }
                return Err(e);
            }
        };
        let raw = upstream.body;

        let original = match codec::decode(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!(endpoint = %endpoint, error = %e, "Upstream body not decodable");
                None
            }
        };

        let resolution = self
            .lookup_override(&request_id, &endpoint, &payload, &raw, original.is_some())
            .await;

        let mut outcome = Outcome {
            strategy: resolution.as_ref().map(|r| r.strategy),
            rule_id: resolution.as_ref().map(|r| r.rule.id),
            disposition: Disposition::Passthrough,
            chain: ChainOutcome::Skipped,
        };

        // `baseline` is returned as-is unless `effective` is modified afterwards.
        let (mut baseline, mut effective) = (raw.clone(), original.clone());
        if let Some(found) = resolution {
            match &original {
                Some(doc) => match codec::decode(found.rule.response_override.as_bytes()) {
                    Ok(override_doc) => {
                        effective = Some(merge(doc, override_doc));
                        outcome.disposition = Disposition::Merged;
                    }
                    Err(e) => tracing::warn!(
                        request_id = %request_id,
                        rule_id = found.rule.id,
                        error = %e,
                        "Override document not decodable, passing through"
                    ),
                },
                None if found.strategy == MatchStrategy::Exact => {
                    baseline = Bytes::from(found.rule.response_override.clone());
                    effective = codec::decode(&baseline).ok();
                    outcome.disposition = Disposition::Replaced;
                }
                None => {}
            }
        }

        let mut changed = outcome.disposition == Disposition::Merged;
        if let (Some(chain), Some(doc)) = (&self.chain, effective.as_mut()) {
            if SpeechChain::triggers(doc) {
                match chain.apply(doc, &request.credentials).await {
                    Ok(()) => {
                        outcome.chain = ChainOutcome::Applied;
                        changed = true;
                    }
                    Err(e) => {
                        outcome.chain = ChainOutcome::Failed;
                        tracing::warn!(
                            request_id = %request_id,
                            error = %e,
                            "Speech chain aborted, keeping response"
                        );
                    }
                }
            }
        }

        let body = match (changed, &effective) {
            (true, Some(doc)) => self.reencode(doc, baseline, &request_id),
            _ => baseline,
        };

        self.report(&request_id, &endpoint, &outcome);
        if let Some(history) = &self.history {
            history.record(&endpoint, &payload, &body).await;
        }

        Ok(Intercepted { body, outcome })
    }

    async fn lookup_override(
        &self,
        request_id: &str,
        endpoint: &str,
        payload: &str,
        raw: &[u8],
        decodable: bool,
    ) -> Option<Resolution> {
        let resolver = self.resolver.as_ref()?;
        let searchable = decodable.then(|| String::from_utf8_lossy(raw));

        let result = resolver
            .resolve(endpoint, payload, searchable.as_deref())
            .await;

        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    endpoint = %endpoint,
                    error = %e,
                    "Override resolution failed, treating as no override"
                );
                None
            }
        }
    }

    fn reencode(&self, doc: &QueryResponse, fallback: Bytes, request_id: &str) -> Bytes {
        match codec::encode(doc) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Re-encode failed");
                fallback
            }
        }
    }

    fn report(&self, request_id: &str, endpoint: &str, outcome: &Outcome) {
        if outcome.disposition != Disposition::Passthrough {
            let strategy = outcome.strategy.map(|s| s.as_str()).unwrap_or("none");
            metrics::record_override(strategy, outcome.disposition.as_str());
            tracing::info!(
                request_id = %request_id,
                endpoint = %endpoint,
                strategy,
                rule_id = outcome.rule_id.unwrap_or_default(),
                disposition = outcome.disposition.as_str(),
                "Override applied"
            );
        }
        if outcome.chain != ChainOutcome::Skipped {
            metrics::record_chain(outcome.chain.as_str());
            tracing::info!(
                request_id = %request_id,
                endpoint = %endpoint,
                chain = outcome.chain.as_str(),
                "Speech chain finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::chain::{
        ChainError, RewriteRequest, RewriteResponse, SpeechBackend, SynthesisResponse,
    };
    use crate::store::{
        HistorySink, NewOverrideRule, OverrideRule, OverrideStore, SqliteStore, StoreError, StoreResult,
    };
    use crate::upstream::UpstreamResponse;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, StatusCode};
    use std::sync::Mutex;
    use std::time::Duration;

    const GREET: &str =
        r#"{"queryId":"abc","queryResult":{"resultCode":"OK","intent":{"name":"greet"}},"index":3}"#;

    struct FakeUpstream {
        reply: Result<&'static str, ()>,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl FakeUpstream {
        fn body(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(body),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl UpstreamClient for FakeUpstream {
        async fn forward(
            &self,
            route: RouteClass,
            request: OutboundRequest,
        ) -> Result<UpstreamResponse, UpstreamError> {
            assert_eq!(route, RouteClass::Api);
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(body) => Ok(UpstreamResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Bytes::from_static(body.as_bytes()),
                }),
                Err(()) => Err(UpstreamError::Timeout),
            }
        }
    }

    struct FixedSpeech;

    #[async_trait]
    impl SpeechBackend for FixedSpeech {
        async fn rewrite(&self, _: &RewriteRequest) -> Result<RewriteResponse, ChainError> {
            Ok(RewriteResponse {
                response_text: "hello there".into(),
            })
        }

        async fn synthesize(
            &self,
            _: &str,
            _: &str,
            credentials: &Credentials,
        ) -> Result<SynthesisResponse, ChainError> {
            assert_eq!(credentials.secret.as_deref(), Some("s"));
            Ok(SynthesisResponse {
                code: 200,
                errmessage: String::new(),
                url: "https://cdn/x.mp3".into(),
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl OverrideStore for BrokenStore {
        async fn find_by_endpoint_and_payload(
            &self,
            _: &str,
            _: &str,
        ) -> StoreResult<Option<OverrideRule>> {
            Err(StoreError::Poisoned)
        }

        async fn find_by_substring_of_response(&self, _: &str) -> StoreResult<Option<OverrideRule>> {
            Err(StoreError::Poisoned)
        }

        async fn insert(&self, _: NewOverrideRule) -> StoreResult<i64> {
            Err(StoreError::Poisoned)
        }

        async fn list_all(&self) -> StoreResult<Vec<OverrideRule>> {
            Err(StoreError::Poisoned)
        }
    }

    fn request(path: &str, body: &'static str) -> InboundRequest {
        InboundRequest {
            request_id: Some("test".into()),
            method: if body.is_empty() { Method::GET } else { Method::POST },
            path_and_query: path.into(),
            credentials: Credentials {
                authorization: Some("Bearer t".into()),
                secret: Some("s".into()),
            },
            content_type: (!body.is_empty()).then(|| "application/json".to_string()),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn greet_rule() -> NewOverrideRule {
        NewOverrideRule {
            endpoint_lookup: "/emo/".into(),
            payload_lookup: Some(String::new()),
            response_lookup: Some("greet".into()),
            response_override:
                r#"{"queryResult":{"intent":{"name":"greet"},"behavior_paras":{"txt":"hi!"}}}"#
                    .into(),
        }
    }

    async fn interceptor_with(
        upstream: Arc<FakeUpstream>,
        rules: Vec<NewOverrideRule>,
    ) -> (Interceptor, SqliteStore) {
        let store = SqliteStore::open_in_memory().unwrap();
        for rule in rules {
            store.insert(rule).await.unwrap();
        }
        let interceptor = Interceptor::new(upstream)
            .with_resolver(OverrideResolver::new(
                Arc::new(store.clone()),
                Duration::from_secs(2),
            ))
            .with_history(HistoryRecorder::new(
                Arc::new(store.clone()),
                Duration::from_secs(2),
            ));
        (interceptor, store)
    }

    #[tokio::test]
    async fn test_passthrough_is_byte_identical() {
        let (interceptor, store) = interceptor_with(FakeUpstream::body(GREET), vec![]).await;

        let out = interceptor.handle(request("/emo/query", "")).await.unwrap();
        assert_eq!(out.body, Bytes::from_static(GREET.as_bytes()));
        assert_eq!(out.outcome.disposition, Disposition::Passthrough);
        assert_eq!(out.outcome.chain, ChainOutcome::Skipped);

        let history = store.list().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].endpoint, "/emo/query");
        assert_eq!(history[0].response, GREET);
    }

    #[tokio::test]
    async fn test_substring_rule_merges_and_keeps_volatile_fields() {
        let (interceptor, store) =
            interceptor_with(FakeUpstream::body(GREET), vec![greet_rule()]).await;

        let out = interceptor.handle(request("/emo/query", "")).await.unwrap();
        assert_eq!(out.outcome.disposition, Disposition::Merged);
        assert_eq!(out.outcome.strategy, Some(MatchStrategy::ResponseSubstring));

        let doc = codec::decode(&out.body).unwrap();
        assert_eq!(doc.query_id.as_deref(), Some("abc"));
        assert_eq!(doc.result_code(), Some("OK"));
        assert_eq!(doc.index, Some(3));
        assert_eq!(doc.behavior_paras().unwrap().txt.as_deref(), Some("hi!"));

        let history = store.list().await.unwrap();
        assert_eq!(history[0].response.as_bytes(), &out.body[..]);
    }

    #[tokio::test]
    async fn test_exact_rule_uses_payload() {
        let rule = NewOverrideRule {
            endpoint_lookup: "/emo/query".into(),
            payload_lookup: Some(r#"{"q":"hi"}"#.into()),
            response_lookup: None,
            response_override: r#"{"queryResult":{"rec_behavior":"wave"}}"#.into(),
        };
        let upstream = FakeUpstream::body(GREET);
        let (interceptor, store) = interceptor_with(upstream.clone(), vec![rule]).await;

        let out = interceptor
            .handle(request("/emo/query", r#"{"q":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(out.outcome.strategy, Some(MatchStrategy::Exact));
        let doc = codec::decode(&out.body).unwrap();
        assert_eq!(
            doc.query_result.as_ref().unwrap().rec_behavior.as_deref(),
            Some("wave")
        );

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].body.as_deref(), Some(br#"{"q":"hi"}"#.as_slice()));
        assert_eq!(store.list().await.unwrap()[0].payload, r#"{"q":"hi"}"#);
    }

    #[tokio::test]
    async fn test_exact_rule_replaces_undecodable_body() {
        let rule = NewOverrideRule {
            endpoint_lookup: "/emo/raw".into(),
            payload_lookup: None,
            response_lookup: None,
            response_override: r#"{"queryResult":{"rec_behavior":"nod"}}"#.into(),
        };
        let (interceptor, _) =
            interceptor_with(FakeUpstream::body("<html>oops</html>"), vec![rule]).await;

        let out = interceptor.handle(request("/emo/raw", "")).await.unwrap();
        assert_eq!(out.outcome.disposition, Disposition::Replaced);
        assert_eq!(&out.body[..], br#"{"queryResult":{"rec_behavior":"nod"}}"#);
    }

    #[tokio::test]
    async fn test_substring_rule_never_touches_undecodable_body() {
        let mut rule = greet_rule();
        rule.endpoint_lookup = "/elsewhere".into();
        let (interceptor, _) =
            interceptor_with(FakeUpstream::body("greet, not json"), vec![rule]).await;

        let out = interceptor.handle(request("/emo/query", "")).await.unwrap();
        assert_eq!(out.outcome.disposition, Disposition::Passthrough);
        assert_eq!(&out.body[..], b"greet, not json");
    }

    #[tokio::test]
    async fn test_resolution_failure_passes_through() {
        let interceptor = Interceptor::new(FakeUpstream::body(GREET))
            .with_resolver(OverrideResolver::new(
                Arc::new(BrokenStore),
                Duration::from_secs(1),
            ));

        let out = interceptor.handle(request("/emo/query", "")).await.unwrap();
        assert_eq!(out.outcome.disposition, Disposition::Passthrough);
        assert_eq!(out.body, Bytes::from_static(GREET.as_bytes()));
    }

    #[tokio::test]
    async fn test_upstream_error_is_returned_and_recorded() {
        let upstream = Arc::new(FakeUpstream {
            reply: Err(()),
            seen: Mutex::new(Vec::new()),
        });
        let (interceptor, store) = interceptor_with(upstream, vec![]).await;

        let err = interceptor.handle(request("/emo/query", "")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout));

        let history = store.list().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].endpoint, "/emo/query");
        assert_eq!(history[0].response, "");
    }

    #[tokio::test]
    async fn test_chain_runs_on_merged_response() {
        let rule = NewOverrideRule {
            endpoint_lookup: "/emo/query".into(),
            payload_lookup: None,
            response_lookup: None,
            response_override: r#"{"queryResult":{"intent":{"name":"chatgpt_speak"},"behavior_paras":{"txt":"old"}}}"#.into(),
        };
        let (interceptor, _) = interceptor_with(FakeUpstream::body(GREET), vec![rule]).await;
        let interceptor = interceptor.with_chain(SpeechChain::new(Box::new(FixedSpeech)));

        let out = interceptor.handle(request("/emo/query", "")).await.unwrap();
        assert_eq!(out.outcome.disposition, Disposition::Merged);
        assert_eq!(out.outcome.chain, ChainOutcome::Applied);

        let doc = codec::decode(&out.body).unwrap();
        let paras = doc.behavior_paras().unwrap();
        assert_eq!(paras.txt.as_deref(), Some("hello there"));
        assert_eq!(paras.url.as_deref(), Some("https://cdn/x.mp3"));
        assert_eq!(doc.query_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_chain_without_trigger_is_skipped() {
        let interceptor = Interceptor::new(FakeUpstream::body(GREET))
            .with_chain(SpeechChain::new(Box::new(FixedSpeech)));

        let out = interceptor.handle(request("/emo/query", "")).await.unwrap();
        assert_eq!(out.outcome.chain, ChainOutcome::Skipped);
        assert_eq!(out.body, Bytes::from_static(GREET.as_bytes()));
    }
}
