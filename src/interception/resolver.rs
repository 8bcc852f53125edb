//! Override resolution.
//!
//! Two strategies, tried in a fixed order once the upstream body is in hand:
//! 1. Exact: endpoint equal, payload equal or wildcard.
//! 2. Response substring: a non-empty `response_lookup` occurs in the raw body.
//!
//! Within a strategy the most recently inserted rule wins. Store failures and
//! deadline overruns surface as [`ResolutionError`]; the orchestrator decides how
//! to degrade.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::within;
use crate::store::{OverrideRule, OverrideStore, StoreError};

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    ResponseSubstring,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::ResponseSubstring => "substring",
        }
    }
}

/// A matched rule together with the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub rule: OverrideRule,
    pub strategy: MatchStrategy,
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("override lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("override lookup exceeded {0:?}")]
    Timeout(Duration),
}

/// Finds the override rule, if any, for one request.
#[derive(Clone)]
pub struct OverrideResolver {
    store: Arc<dyn OverrideStore>,
    deadline: Duration,
}

impl OverrideResolver {
    pub fn new(store: Arc<dyn OverrideStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub async fn resolve_exact(
        &self,
        endpoint: &str,
        payload: &str,
    ) -> Result<Option<Resolution>, ResolutionError> {
        let rule = within(
            self.deadline,
            self.store.find_by_endpoint_and_payload(endpoint, payload),
        )
        .await
        .map_err(|e| ResolutionError::Timeout(e.0))??;

        Ok(rule.map(|rule| Resolution {
            rule,
            strategy: MatchStrategy::Exact,
        }))
    }

    pub async fn resolve_substring(
        &self,
        response_body: &str,
    ) -> Result<Option<Resolution>, ResolutionError> {
        let rule = within(
            self.deadline,
            self.store.find_by_substring_of_response(response_body),
        )
        .await
        .map_err(|e| ResolutionError::Timeout(e.0))??;

        Ok(rule.map(|rule| Resolution {
            rule,
            strategy: MatchStrategy::ResponseSubstring,
        }))
    }

    /// Exact strategy first, then substring. The first strategy with a match wins.
    ///
    /// `response_body` is `None` when the upstream body did not decode. Substring
    /// rules are skipped in that case.
    pub async fn resolve(
        &self,
        endpoint: &str,
        payload: &str,
        response_body: Option<&str>,
    ) -> Result<Option<Resolution>, ResolutionError> {
        if let Some(found) = self.resolve_exact(endpoint, payload).await? {
            return Ok(Some(found));
        }
        match response_body {
            Some(body) => self.resolve_substring(body).await,
            None => Ok(None),
        }
    }
}
