//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound store lookups and side calls with a deadline
//! - Keep timeout errors distinct from other errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - HTTP calls get their deadlines from the reqwest client; this covers everything else
//! - A timed-out future is dropped, which cancels it at its next suspension point

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("operation exceeded its {0:?} deadline")]
pub struct Elapsed(pub Duration);

/// Await `fut`, giving up after `deadline`.
pub async fn within<F, T>(deadline: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Elapsed(deadline))
}
