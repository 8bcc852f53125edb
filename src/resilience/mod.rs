//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store lookup / history write / chain hop:
//!     → timeouts.rs (enforce deadline)
//!     → On timeout: caller degrades to passthrough
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries and no circuit breaking: upstreams are single static hosts

pub mod timeouts;

pub use timeouts::{within, Elapsed};
