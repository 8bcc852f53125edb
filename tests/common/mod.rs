//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use emo_proxy::config::ProxyConfig;
use emo_proxy::store::SqliteStore;
use emo_proxy::{HttpServer, Shutdown};

pub const GREET: &str =
    r#"{"queryId":"abc","queryResult":{"resultCode":"OK","intent":{"name":"greet"}},"index":3}"#;

pub const SPEAK: &str = r#"{"queryId":"sp1","queryResult":{"resultCode":"OK","queryText":"tell me something","intent":{"name":"chatgpt_speak"},"behavior_paras":{"txt":"original"}},"languageCode":"en","index":1}"#;

/// Serve `router` on an ephemeral local port.
pub async fn spawn_app(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

/// Mock of the primary API host, including the speech synthesis endpoint.
///
/// `synthesis_code` is what `/emo/speech/tts` reports.
pub fn mock_api(synthesis_code: u16) -> Router {
    Router::new()
        .route("/emo/query", get(|| async { GREET }).post(|| async { GREET }))
        .route("/emo/speak", get(|| async { SPEAK }))
        .route("/emo/html", get(|| async { "<html>maintenance</html>" }))
        .route(
            "/emo/headers",
            get(|headers: HeaderMap| async move {
                Json(json!({
                    "queryId": "h",
                    "authorization": header(&headers, "authorization"),
                    "secret": header(&headers, "secret"),
                    "user_agent": header(&headers, "user-agent"),
                }))
            }),
        )
        .route(
            "/emo/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                GREET
            }),
        )
        .route(
            "/emo/speech/tts",
            get(move |Query(params): Query<HashMap<String, String>>| async move {
                let text = params.get("q").cloned().unwrap_or_default();
                let message = if synthesis_code == 200 { "OK" } else { "failed" };
                Json(json!({
                    "code": synthesis_code,
                    "errmessage": message,
                    "url": format!("https://cdn/{}.mp3", text.replace(' ', "_")),
                }))
            }),
        )
        .route("/tts/hello", get(|| async { "RIFFapitts" }))
}

/// Mock of the TTS download host.
pub fn mock_tts() -> Router {
    Router::new().route(
        "/download/{file}",
        get(|| async { ([("content-type", "audio/mpeg")], "ID3audio") }),
    )
}

/// Mock of the resource host.
pub fn mock_res() -> Router {
    Router::new().route(
        "/fw/{file}",
        get(|| async {
            (
                StatusCode::OK,
                [("content-type", "application/zip"), ("x-fw-version", "1.2.3")],
                "PKfirmware",
            )
        }),
    )
}

/// Mock speech-rewrite service answering `POST /speak` with `text`.
pub fn mock_rewrite(text: &'static str) -> Router {
    Router::new().route(
        "/speak",
        post(move |Json(body): Json<Value>| async move {
            assert!(body.get("queryText").is_some());
            Json(json!({ "responseText": text }))
        }),
    )
}

/// Speech-rewrite service that accepts the request and never answers in time.
pub fn mock_rewrite_hanging() -> Router {
    Router::new().route(
        "/speak",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({ "responseText": "too late" }))
        }),
    )
}

/// Primary API host whose speech synthesis endpoint hangs.
pub fn mock_api_hanging_synthesis() -> Router {
    Router::new()
        .route("/emo/speak", get(|| async { SPEAK }))
        .route(
            "/emo/speech/tts",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(json!({ "code": 200, "errmessage": "OK", "url": "https://cdn/late.mp3" }))
            }),
        )
}

/// Default config with every upstream pointed at local mocks and an in-memory database.
pub fn config_for(api: SocketAddr, tts: SocketAddr, res: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstreams.api = format!("http://{api}");
    config.upstreams.api_tts = format!("http://{api}");
    config.upstreams.tts = format!("http://{tts}");
    config.upstreams.res = format!("http://{res}");
    config.timeouts.upstream_secs = 1;
    config.timeouts.chain_secs = 2;
    config.database.enabled = true;
    config.database.path = ":memory:".into();
    config
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let store = if config.database.enabled {
        Some(SqliteStore::open(&config.database.path).unwrap())
    } else {
        None
    };
    let server = HttpServer::new(config, store).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    RunningProxy { addr, shutdown }
}

/// Start all mocks plus a proxy wired to them.
pub async fn start_stack(synthesis_code: u16, rewrite: Option<&'static str>) -> RunningProxy {
    let api = spawn_app(mock_api(synthesis_code)).await;
    let tts = spawn_app(mock_tts()).await;
    let res = spawn_app(mock_res()).await;
    let mut config = config_for(api, tts, res);
    if let Some(text) = rewrite {
        let rewrite = spawn_app(mock_rewrite(text)).await;
        config.speech.rewrite_url = format!("http://{rewrite}");
    }
    start_proxy(config).await
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
