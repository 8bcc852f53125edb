//! Override merge.
//!
//! The override supplies intent and behaviour content wholesale. Request identity and
//! upstream status (the volatile fields `queryId`, `queryResult.resultCode`, `index`)
//! always come from the original response.

use crate::interception::codec::{QueryResponse, QueryResult};

/// Produce the override document with the original's volatile fields written over it.
pub fn merge(original: &QueryResponse, mut override_doc: QueryResponse) -> QueryResponse {
    override_doc.query_id = original.query_id.clone();
    override_doc.index = original.index;

    match original.result_code() {
        Some(code) => {
            override_doc
                .query_result
                .get_or_insert_with(QueryResult::default)
                .result_code = Some(code.to_string());
        }
        None => {
            if let Some(result) = override_doc.query_result.as_mut() {
                result.result_code = None;
            }
        }
    }

    override_doc
}
