//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream hosts, one per route class.
    pub upstreams: UpstreamsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Speech-override chain settings.
    pub speech: SpeechConfig,

    /// Override and history database.
    pub database: DatabaseConfig,

    /// Request/response body archival.
    pub archive: ArchiveConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Process lifecycle settings.
    pub lifecycle: LifecycleConfig,

    /// Security hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream base URLs. Each is scheme + host (+ optional port), no trailing path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    /// Primary API server (`/token/`, `/emo/`, `/home/`, speech synthesis).
    pub api: String,

    /// API server used for `/tts/` requests.
    pub api_tts: String,

    /// TTS download server used for `/download/` requests.
    pub tts: String,

    /// Resource/firmware server for everything else.
    pub res: String,

    /// Skip TLS certificate verification for upstream calls.
    pub accept_invalid_certs: bool,

    /// Honour HTTP(S)_PROXY environment variables for outbound calls.
    pub use_system_proxy: bool,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            api: "https://api.living.ai".to_string(),
            api_tts: "http://eu-api.living.ai".to_string(),
            tts: "http://eu-tts.living.ai".to_string(),
            res: "https://res.living.ai".to_string(),
            accept_invalid_certs: true,
            use_system_proxy: false,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for a primary upstream call in seconds.
    pub upstream_secs: u64,

    /// Total time allowed for each speech chain hop in seconds.
    pub chain_secs: u64,

    /// Deadline for a single store lookup or write in milliseconds.
    pub store_millis: u64,

    /// Outer timeout for a whole inbound request in seconds. Must exceed
    /// [`TimeoutConfig::pipeline_budget`].
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            chain_secs: 15,
            store_millis: 2000,
            request_secs: 90,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }

    pub fn chain(&self) -> Duration {
        Duration::from_secs(self.chain_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_millis)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    /// Worst case for one intercepted request: the upstream call, both chain hops,
    /// two override lookups and the history write.
    pub fn pipeline_budget(&self) -> Duration {
        self.upstream() + self.chain() * 2 + self.store() * 3
    }
}

/// Speech-override chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SpeechConfig {
    /// Base URL of the text rewrite service. Empty disables the chain.
    pub rewrite_url: String,
}

impl SpeechConfig {
    pub fn is_enabled(&self) -> bool {
        !self.rewrite_url.trim().is_empty()
    }
}

/// Override/history database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable the database, overrides and the admin API.
    pub enabled: bool,

    /// SQLite file path (`:memory:` for an in-process database).
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/var/data/emo_logs.db".to_string(),
        }
    }
}

/// Body archival configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Write request/response bodies to disk.
    pub enabled: bool,

    /// Root directory; a dated subdirectory is created per day.
    pub directory: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "/tmp/".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Origin allowed by CORS on `/proxy-api/*`.
    pub cors_origin: String,

    /// Bearer token required on `/proxy-api/*`. Empty disables authentication.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            cors_origin: "http://localhost:3000".to_string(),
            api_key: String::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Append logs to this file instead of stdout.
    pub log_file: Option<String>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "emo_proxy=info,tower_http=info".to_string(),
            log_file: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Write the process id to this file at startup.
    pub pid_file: Option<String>,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
