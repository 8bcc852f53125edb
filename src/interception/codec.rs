//! Typed response envelope and its JSON codec.
//!
//! Every field is optional and unpopulated fields are never emitted. Keys the model
//! does not know are kept in `extra` at each level, so decoding and re-encoding a
//! document only changes what the caller actually changed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Raised when a body is not a JSON object of the expected shape.
#[derive(Debug, Error)]
#[error("response body is not a query response: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Raised when a document cannot be serialized.
#[derive(Debug, Error)]
#[error("failed to encode query response: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// The envelope returned by the assistant API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "queryId", skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,

    #[serde(rename = "queryResult", skip_serializing_if = "Option::is_none")]
    pub query_result: Option<QueryResult>,

    #[serde(rename = "languageCode", skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "resultCode", skip_serializing_if = "Option::is_none")]
    pub result_code: Option<String>,

    #[serde(rename = "queryText", skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rec_behavior: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior_paras: Option<BehaviorParas>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Behaviour directive. Composite behaviours own exactly zero or one child node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorParas {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utility_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub txt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_animation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_animation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_behavior: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rec_behavior: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior_paras: Option<Box<BehaviorParas>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryResponse {
    /// Name of the recognised intent, if any.
    pub fn intent_name(&self) -> Option<&str> {
        self.query_result
            .as_ref()?
            .intent
            .as_ref()?
            .name
            .as_deref()
    }

    pub fn result_code(&self) -> Option<&str> {
        self.query_result.as_ref()?.result_code.as_deref()
    }

    pub fn query_text(&self) -> Option<&str> {
        self.query_result.as_ref()?.query_text.as_deref()
    }

    pub fn behavior_paras(&self) -> Option<&BehaviorParas> {
        self.query_result.as_ref()?.behavior_paras.as_ref()
    }

    /// Top-level behaviour node, created on demand.
    pub fn behavior_paras_mut(&mut self) -> &mut BehaviorParas {
        self.query_result
            .get_or_insert_with(QueryResult::default)
            .behavior_paras
            .get_or_insert_with(BehaviorParas::default)
    }
}

/// Decode an upstream (or override) body.
pub fn decode(bytes: &[u8]) -> Result<QueryResponse, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a document in canonical form: declared field order, unpopulated fields omitted.
pub fn encode(response: &QueryResponse) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(response)?)
}
