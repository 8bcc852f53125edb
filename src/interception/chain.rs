//! Speech-override chain.
//!
//! When the effective response carries the `chatgpt_speak` intent, the spoken text is
//! rewritten by an external service and re-synthesized by the primary API:
//!
//! ```text
//! QueryResponse (intent = chatgpt_speak)
//!     → POST {rewrite_url}/speak      {queryText, languageCode, fallbackResponse}
//!     → GET  {api}/emo/speech/tts?q=&l= (device credentials forwarded)
//!     → behavior_paras.txt / behavior_paras.url replaced
//! ```
//!
//! Both hops must succeed before anything is written back. A failure at either hop
//! leaves the document exactly as it was.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::{SpeechConfig, TimeoutConfig, UpstreamsConfig};
use crate::interception::codec::QueryResponse;
use crate::upstream::client::{build_http_client, with_credentials};
use crate::upstream::Credentials;

/// Intent name that triggers the chain.
pub const SPEAK_INTENT: &str = "chatgpt_speak";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteRequest {
    #[serde(rename = "queryText")]
    pub query_text: String,
    #[serde(rename = "languageCode")]
    pub language_code: String,
    #[serde(rename = "fallbackResponse", skip_serializing_if = "String::is_empty")]
    pub fallback_response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RewriteResponse {
    #[serde(rename = "responseText", default)]
    pub response_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SynthesisResponse {
    pub code: i64,
    pub errmessage: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rewrite backend failed: {0}")]
    Rewrite(String),

    #[error("rewrite backend returned empty text")]
    EmptyRewrite,

    #[error("synthesis backend failed: {0}")]
    Synthesis(String),

    #[error("synthesis rejected with code {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("synthesis returned no audio URL")]
    EmptyUrl,

    #[error("chain call timed out")]
    Timeout,

    #[error("unreadable backend payload: {0}")]
    Decode(String),
}

impl ChainError {
    fn from_http(e: reqwest::Error, hop: fn(String) -> ChainError) -> Self {
        if e.is_timeout() {
            ChainError::Timeout
        } else if e.is_decode() {
            ChainError::Decode(e.to_string())
        } else {
            hop(e.to_string())
        }
    }
}

/// The two external calls the chain depends on.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse, ChainError>;

    async fn synthesize(
        &self,
        text: &str,
        language_code: &str,
        credentials: &Credentials,
    ) -> Result<SynthesisResponse, ChainError>;
}

/// HTTP implementation against the rewrite service and the primary API host.
pub struct HttpSpeechBackend {
    client: reqwest::Client,
    rewrite_endpoint: String,
    api_base: String,
}

impl HttpSpeechBackend {
    pub fn new(
        speech: &SpeechConfig,
        upstreams: &UpstreamsConfig,
        timeouts: &TimeoutConfig,
    ) -> reqwest::Result<Self> {
        let client = build_http_client(upstreams, timeouts, timeouts.chain())?;
        Ok(Self {
            client,
            rewrite_endpoint: format!("{}/speak", speech.rewrite_url.trim_end_matches('/')),
            api_base: upstreams.api.trim_end_matches('/').to_string(),
        })
    }

    fn synthesis_url(&self, text: &str, language_code: &str) -> Result<Url, ChainError> {
        let mut url = Url::parse(&format!("{}/emo/speech/tts", self.api_base))
            .map_err(|e| ChainError::Synthesis(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", text)
            .append_pair("l", language_code);
        Ok(url)
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse, ChainError> {
        let response = self
            .client
            .post(&self.rewrite_endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ChainError::from_http(e, ChainError::Rewrite))?;

        if !response.status().is_success() {
            return Err(ChainError::Rewrite(format!("status {}", response.status())));
        }

        response
            .json::<RewriteResponse>()
            .await
            .map_err(|e| ChainError::from_http(e, ChainError::Rewrite))
    }

    async fn synthesize(
        &self,
        text: &str,
        language_code: &str,
        credentials: &Credentials,
    ) -> Result<SynthesisResponse, ChainError> {
        let url = self.synthesis_url(text, language_code)?;
        let response = with_credentials(self.client.get(url), credentials)
            .send()
            .await
            .map_err(|e| ChainError::from_http(e, ChainError::Synthesis))?;

        response
            .json::<SynthesisResponse>()
            .await
            .map_err(|e| ChainError::from_http(e, ChainError::Synthesis))
    }
}

/// Runs the rewrite/synthesis chain against a decoded response.
pub struct SpeechChain {
    backend: Box<dyn SpeechBackend>,
}

impl SpeechChain {
    pub fn new(backend: Box<dyn SpeechBackend>) -> Self {
        Self { backend }
    }

    /// Build the HTTP-backed chain, or `None` when no rewrite service is configured.
    pub fn from_config(
        speech: &SpeechConfig,
        upstreams: &UpstreamsConfig,
        timeouts: &TimeoutConfig,
    ) -> reqwest::Result<Option<Self>> {
        if !speech.is_enabled() {
            return Ok(None);
        }
        let backend = HttpSpeechBackend::new(speech, upstreams, timeouts)?;
        Ok(Some(Self::new(Box::new(backend))))
    }

    pub fn triggers(response: &QueryResponse) -> bool {
        response.intent_name() == Some(SPEAK_INTENT)
    }

    /// Rewrite and re-synthesize the spoken text. On error `response` is untouched.
    pub async fn apply(
        &self,
        response: &mut QueryResponse,
        credentials: &Credentials,
    ) -> Result<(), ChainError> {
        let request = RewriteRequest {
            query_text: response.query_text().unwrap_or_default().to_string(),
            language_code: response.language_code.clone().unwrap_or_default(),
            fallback_response: response
                .behavior_paras()
                .and_then(|p| p.txt.clone())
                .unwrap_or_default(),
        };

        let rewritten = self.backend.rewrite(&request).await?;
        if rewritten.response_text.is_empty() {
            return Err(ChainError::EmptyRewrite);
        }

        let speech = self
            .backend
            .synthesize(&rewritten.response_text, &request.language_code, credentials)
            .await?;
        if speech.code != 200 {
            return Err(ChainError::Rejected {
                code: speech.code,
                message: speech.errmessage,
            });
        }
        if speech.url.is_empty() {
            return Err(ChainError::EmptyUrl);
        }

        let paras = response.behavior_paras_mut();
        paras.txt = Some(rewritten.response_text);
        paras.url = Some(speech.url);
        Ok(())
    }
}
