//! Interception and response-override engine.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → upstream::UpstreamClient::forward (RouteClass::Api)
//!     → codec::decode (raw bytes → QueryResponse, or "no typed data")
//!     → resolver::OverrideResolver (exact, then response substring)
//!     → merge::merge (override document + original volatile fields)
//!     → chain::SpeechChain (chatgpt_speak intent only)
//!     → codec::encode (only if something changed)
//!     → store::HistorySink::record
//! ```
//!
//! # Design Decisions
//! - `queryId`, `queryResult.resultCode` and `index` always come from the upstream
//! - Override and chain failures degrade to the best body known so far
//! - Each request owns its documents; nothing here is shared mutable state

pub mod chain;
pub mod codec;
pub mod merge;
pub mod orchestrator;
pub mod resolver;

pub use chain::{HttpSpeechBackend, SpeechBackend, SpeechChain, SPEAK_INTENT};
pub use codec::{decode, encode, BehaviorParas, QueryResponse, QueryResult};
pub use orchestrator::{ChainOutcome, Disposition, InboundRequest, Intercepted, Interceptor, Outcome};
pub use resolver::{MatchStrategy, OverrideResolver, Resolution, ResolutionError};
