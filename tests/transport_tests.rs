use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::matchers::{
    body_json, body_string_contains, header, header_regex, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelhub::error::{API_ERROR, CONNECTION_ERROR, DECODE_ERROR, TIMEOUT, VALIDATION_ERROR};
use modelhub::events::{self, EventPayload};
use modelhub::{Client, ClientConfig, Environment, ErrorKind, ResponseEnvelope, UploadForm, UploadPayload};

#[derive(Debug, Deserialize, PartialEq)]
struct Model {
    id: String,
    name: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client_for(server: &MockServer) -> Client {
    init_tracing();
    Client::new(
        ClientConfig::new("key-live-1", Environment::Sandbox)
            .with_endpoint(server.uri())
            .with_timeout(Duration::from_secs(5)),
    )
    .expect("client")
}

fn error_recorder(client: &Client) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.on(
        events::ERROR,
        Arc::new(move |payload: &EventPayload| {
            let err = payload.as_error().expect("error payload");
            sink.lock().unwrap().push(err.code.clone());
        }),
    );
    seen
}

#[tokio::test]
async fn get_attaches_default_headers_and_returns_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(query_param("limit", "2"))
        .and(header("authorization", "Bearer key-live-1"))
        .and(header("content-type", "application/json"))
        .and(header_regex("x-client-request-id", "^[0-9a-f-]{36}$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"id": "m1", "name": "resnet"}, {"id": "m2", "name": "bert"}],
            "meta": {"page": 1, "limit": 2, "total": 3, "hasMore": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let envelope: ResponseEnvelope<Vec<Model>> = client.get("/models", &[("limit", "2")]).await.unwrap();

    assert_eq!(envelope.success, Some(true));
    assert_eq!(envelope.meta.unwrap().has_more, Some(true));
    let models = envelope.data.unwrap();
    assert_eq!(models[1], Model { id: "m2".into(), name: "bert".into() });
}

#[tokio::test]
async fn post_put_delete_send_bodies_and_queries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models"))
        .and(body_json(json!({"name": "vit"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "m9", "name": "vit"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/models/m9"))
        .and(body_json(json!({"name": "vit-large"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "m9", "name": "vit-large"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/models/m9"))
        .and(query_param("hard", "true"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let created: ResponseEnvelope<Model> = client.post("/models", &json!({"name": "vit"})).await.unwrap();
    assert_eq!(created.data.unwrap().id, "m9");

    let updated: ResponseEnvelope<Model> = client
        .put("models/m9", &json!({"name": "vit-large"}))
        .await
        .unwrap();
    assert_eq!(updated.data.unwrap().name, "vit-large");

    let deleted: ResponseEnvelope = client.delete("/models/m9", &[("hard", "true")]).await.unwrap();
    assert_eq!(deleted, ResponseEnvelope::default());
}

#[tokio::test]
async fn session_identity_is_read_at_call_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer sess-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "session"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer key-live-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "key"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first: ResponseEnvelope<String> = client.get("/me", &[]).await.unwrap();
    client.set_identity("sess-abc").unwrap();
    let second: ResponseEnvelope<String> = client.get("/me", &[]).await.unwrap();
    client.clear_identity();
    let third: ResponseEnvelope<String> = client.get("/me", &[]).await.unwrap();

    assert_eq!(first.data.as_deref(), Some("key"));
    assert_eq!(second.data.as_deref(), Some("session"));
    assert_eq!(third.data.as_deref(), Some("key"));
}

#[tokio::test]
async fn error_body_is_normalized_and_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-request-id", "req-42")
                .set_body_json(json!({
                    "success": false,
                    "error": {"message": "model not found", "code": "MODEL_NOT_FOUND", "details": {"id": "missing"}}
                })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let seen = error_recorder(&client);

    let err = client.get::<Value>("/models/missing", &[]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(err.code, "MODEL_NOT_FOUND");
    assert_eq!(err.message, "model not found");
    assert_eq!(err.status, Some(404));
    assert_eq!(err.request_id.as_deref(), Some("req-42"));
    assert_eq!(err.details, json!({"id": "missing"}));
    assert_eq!(*seen.lock().unwrap(), vec!["MODEL_NOT_FOUND".to_string()]);
}

#[tokio::test]
async fn plain_error_body_falls_back_to_client_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.post::<_, Value>("/payments", &json!({})).await.unwrap_err();
    assert_eq!(err.code, API_ERROR);
    assert_eq!(err.message, "request failed with status code 503");

    let requests = server.received_requests().await.unwrap();
    let sent_id = requests[0].headers.get("x-client-request-id").unwrap().to_str().unwrap();
    assert_eq!(err.request_id.as_deref(), Some(sent_id));
    assert_eq!(err.details["requestId"], sent_id);
    assert_eq!(err.details["status"], 503);
}

#[tokio::test]
async fn timeout_surfaces_as_normalized_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let client = Client::new(
        ClientConfig::new("key", Environment::Sandbox)
            .with_endpoint(server.uri())
            .with_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    let seen = error_recorder(&client);

    let err = client.get::<Value>("/slow", &[]).await.unwrap_err();
    assert_eq!(err.code, TIMEOUT);
    assert!(err.is_timeout());
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_connection_error() {
    let client = Client::new(
        ClientConfig::new("key", Environment::Sandbox).with_endpoint("http://127.0.0.1:1"),
    )
    .unwrap();
    let err = client.get::<Value>("/models", &[]).await.unwrap_err();
    assert_eq!(err.code, CONNECTION_ERROR);
    assert!(!err.message.is_empty());
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.get::<Value>("/models", &[]).await.unwrap_err();
    assert_eq!(err.code, DECODE_ERROR);
    assert_eq!(err.status, Some(200));
}

#[tokio::test]
async fn blank_path_fails_validation_without_a_request() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let seen = error_recorder(&client);

    let err = client.get::<Value>("  ", &[]).await.unwrap_err();
    assert_eq!(err.code, VALIDATION_ERROR);
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![VALIDATION_ERROR.to_string()]);
}

#[tokio::test]
async fn in_memory_upload_reports_progress_to_100() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(header("authorization", "Bearer key-live-1"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"visibility\""))
        .and(body_string_contains("filename=\"weights.bin\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"cid": "bafy123"}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();

    let payload = UploadPayload::bytes(vec![7u8; 200 * 1024], "weights.bin")
        .with_mime("application/octet-stream");
    let form = UploadForm::new(payload).text("visibility", "public");
    let envelope: ResponseEnvelope = client
        .upload("/files", form, Some(Arc::new(move |p: u8| sink.lock().unwrap().push(p))))
        .await
        .unwrap();

    assert_eq!(envelope.data.unwrap()["cid"], "bafy123");
    let progress = progress.lock().unwrap();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*progress.last().unwrap(), 100);
}

#[tokio::test]
async fn file_path_upload_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("card.md");
    tokio::fs::write(&file, "# model card").await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(body_string_contains("# model card"))
        .and(body_string_contains("name=\"document\"; filename=\"card.md\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let form = UploadForm::new(UploadPayload::file(&file)).with_field_name("document");
    let envelope: ResponseEnvelope = client.upload("/files", form, None).await.unwrap();
    assert_eq!(envelope.success, Some(true));
}

#[tokio::test]
async fn missing_upload_file_is_normalized() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let form = UploadForm::new(UploadPayload::file("/no/such/model.bin"));
    let err = client.upload::<Value>("/files", form, None).await.unwrap_err();
    assert_eq!(err.code, modelhub::error::IO_ERROR);
    assert!(server.received_requests().await.unwrap().is_empty());
}
