//! emo-proxy library: reverse proxy with response overrides for emo cloud services.

// Core subsystems
pub mod config;
pub mod http;
pub mod interception;
pub mod store;
pub mod upstream;

// Supporting services
pub mod admin;
pub mod archive;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
