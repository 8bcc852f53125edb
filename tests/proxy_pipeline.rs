//! End-to-end tests of the proxy against mock upstreams.

use serde_json::{json, Value};

mod common;

use common::{client, start_stack, GREET};

#[tokio::test]
async fn test_no_rule_passes_body_through_unchanged() {
    let proxy = start_stack(200, None).await;

    let res = client().get(proxy.url("/emo/query")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["content-type"],
        "application/json; charset=utf-8"
    );
    assert_eq!(res.text().await.unwrap(), GREET);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_override_added_through_admin_api_is_merged() {
    let proxy = start_stack(200, None).await;
    let client = client();

    let created = client
        .post(proxy.url("/proxy-api/overrides"))
        .json(&json!({
            "endpoint_lookup": "/emo/",
            "payload_lookup": "",
            "response_lookup": "greet",
            "response_override": r#"{"queryResult":{"intent":{"name":"greet"},"behavior_paras":{"txt":"hi!"}}}"#,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    assert!(created["id"].as_i64().unwrap() >= 1);

    let merged: Value = client
        .get(proxy.url("/emo/query"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(merged["queryId"], "abc");
    assert_eq!(merged["queryResult"]["resultCode"], "OK");
    assert_eq!(merged["index"], 3);
    assert_eq!(merged["queryResult"]["behavior_paras"]["txt"], "hi!");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_exact_rule_matches_post_payload() {
    let proxy = start_stack(200, None).await;
    let client = client();

    client
        .post(proxy.url("/proxy-api/overrides"))
        .json(&json!({
            "endpoint_lookup": "/emo/query",
            "payload_lookup": r#"{"text":"dance"}"#,
            "response_override": r#"{"queryId":"ignored","queryResult":{"rec_behavior":"dance_01"}}"#,
        }))
        .send()
        .await
        .unwrap();

    let other: String = client
        .post(proxy.url("/emo/query"))
        .header("content-type", "application/json")
        .body(r#"{"text":"sing"}"#)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(other, GREET, "different payload is untouched");

    let matched: Value = client
        .post(proxy.url("/emo/query"))
        .header("content-type", "application/json")
        .body(r#"{"text":"dance"}"#)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(matched["queryId"], "abc");
    assert_eq!(matched["queryResult"]["rec_behavior"], "dance_01");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_speech_chain_rewrites_text_and_url() {
    let proxy = start_stack(200, Some("hello there")).await;

    let body: Value = client()
        .get(proxy.url("/emo/speak"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let paras = &body["queryResult"]["behavior_paras"];
    assert_eq!(paras["txt"], "hello there");
    assert_eq!(paras["url"], "https://cdn/hello_there.mp3");
    assert_eq!(body["queryId"], "sp1");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_only_credentials_are_forwarded() {
    let proxy = start_stack(200, None).await;

    let echoed: Value = client()
        .get(proxy.url("/emo/headers"))
        .header("authorization", "Bearer device")
        .header("secret", "s3cr3t")
        .header("user-agent", "emo-firmware/2.0")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echoed["authorization"], "Bearer device");
    assert_eq!(echoed["secret"], "s3cr3t");
    assert_ne!(echoed["user_agent"], "emo-firmware/2.0");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_plain_routes_and_history() {
    let proxy = start_stack(200, None).await;
    let client = client();

    let download = client.get(proxy.url("/download/a.mp3")).send().await.unwrap();
    assert_eq!(download.headers()["content-type"], "application/octet-stream");
    assert_eq!(download.text().await.unwrap(), "ID3audio");

    let tts = client.get(proxy.url("/tts/hello")).send().await.unwrap();
    assert_eq!(tts.headers()["content-type"], "application/octet-stream");
    assert_eq!(tts.text().await.unwrap(), "RIFFapitts");

    let fw = client.get(proxy.url("/fw/1.zip")).send().await.unwrap();
    assert_eq!(fw.headers()["content-type"], "application/zip");
    assert_eq!(fw.headers()["x-fw-version"], "1.2.3");
    assert_eq!(fw.text().await.unwrap(), "PKfirmware");

    client.get(proxy.url("/emo/query?lang=en")).send().await.unwrap();

    let history: Vec<Value> = client
        .get(proxy.url("/proxy-api/requests"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0]["endpoint"], "/download/a.mp3");
    assert_eq!(history[0]["response"], "");
    assert_eq!(history[1]["response"], "RIFFapitts");
    assert_eq!(history[2]["response"], "PKfirmware");
    assert_eq!(history[3]["endpoint"], "/emo/query?lang=en");
    assert_eq!(history[3]["response"], GREET);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_local_endpoints() {
    let proxy = start_stack(200, None).await;
    let client = client();

    let app: Value = client
        .get(proxy.url("/app/settings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(app, json!({"code": 200, "errmessage": "OK"}));

    let time: Value = client
        .get(proxy.url("/time"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(time["time"].as_i64().unwrap() > 0);
    assert!(time["offset"].is_i64());

    proxy.shutdown.trigger();
}
