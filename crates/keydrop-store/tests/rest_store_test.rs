// Integration tests for `RestStore` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keydrop_store::{KvStore, RestStore, StoreError, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestStore) {
    let server = MockServer::start().await;
    let url: Url = server.uri().parse().expect("mock server URI");
    let token = SecretString::from("test-token");
    let store = RestStore::new(url, &token, &TransportConfig::default()).expect("client");
    (server, store)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn get_present_and_absent() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_json(json!(["GET", "tier200-abc123"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "valid" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_json(json!(["GET", "tier200-zzzzzz"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
        .mount(&server)
        .await;

    assert_eq!(
        store.get("tier200-abc123").await.unwrap().as_deref(),
        Some("valid")
    );
    assert_eq!(store.get("tier200-zzzzzz").await.unwrap(), None);
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
        .expect(1)
        .mount(&server)
        .await;

    store.get("k").await.unwrap();
}

#[tokio::test]
async fn set_if_absent_maps_nx_reply() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(body_json(json!(["SET", "fresh", "valid", "NX"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "OK" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_json(json!(["SET", "taken", "valid", "NX"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
        .mount(&server)
        .await;

    assert!(store.set_if_absent("fresh", "valid").await.unwrap());
    assert!(!store.set_if_absent("taken", "valid").await.unwrap());
}

#[tokio::test]
async fn set_with_ttl_passes_ex() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(body_json(json!(["SET", "probe", "ok", "EX", "5"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "OK" })))
        .expect(1)
        .mount(&server)
        .await;

    store.set_with_ttl("probe", "ok", 5).await.unwrap();
}

#[tokio::test]
async fn compare_and_swap_maps_eval_reply() {
    let (server, store) = setup().await;

    // Won the race: script answers 1.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(
        store
            .compare_and_swap("tier200-abc123", "valid", "used")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn compare_and_swap_lost_race() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 0 })))
        .mount(&server)
        .await;

    assert!(
        !store
            .compare_and_swap("tier200-abc123", "valid", "used")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn scan_follows_cursor_pages() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(body_json(json!([
            "SCAN", "0", "MATCH", "tier200-*", "COUNT", "2"
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": ["7", ["tier200-aaaaaa", "tier200-bbbbbb"]]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_json(json!([
            "SCAN", "7", "MATCH", "tier200-*", "COUNT", "2"
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": ["0", ["tier200-cccccc"]]
        })))
        .mount(&server)
        .await;

    let first = store.scan("tier200-", 0, 2).await.unwrap();
    assert_eq!(first.keys.len(), 2);
    assert_eq!(first.cursor, 7);
    assert!(!first.is_last());

    let second = store.scan("tier200-", first.cursor, 2).await.unwrap();
    assert_eq!(second.keys, vec!["tier200-cccccc".to_owned()]);
    assert!(second.is_last());
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_status_maps_to_unauthorized() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "bad token" })))
        .mount(&server)
        .await;

    let err = store.get("k").await.unwrap_err();
    assert!(err.is_unauthorized(), "expected Unauthorized, got {err:?}");
}

#[tokio::test]
async fn envelope_error_maps_to_command() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": "ERR wrong number of arguments" })),
        )
        .mount(&server)
        .await;

    let err = store.get("k").await.unwrap_err();
    assert!(matches!(err, StoreError::Command { .. }), "got {err:?}");
}

#[tokio::test]
async fn garbage_body_maps_to_deserialization() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = store.get("k").await.unwrap_err();
    assert!(matches!(err, StoreError::Deserialization { .. }), "got {err:?}");
}

#[tokio::test]
async fn server_error_is_transient() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "result": null })))
        .mount(&server)
        .await;

    let err = store.get("k").await.unwrap_err();
    assert!(err.is_transient(), "expected transient, got {err:?}");
}
