use pretty_assertions::assert_eq;
use qrdrop_crypto::generate_access_key;
use qrdrop_exchange::{
    package_token, BlobSource, ClientConfig, ExchangeError, RetrievalFlow, RetrievalState,
    ShareClient, DEFAULT_FILE_NAME,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ID: &str = "5b2f0c7e9a1d4e3f8b6a0c2d4e6f8a1b";

fn setup(server: &MockServer) -> ShareClient {
    ShareClient::new(ClientConfig::with_base_url(server.uri())).unwrap()
}

// --- Upload ---

#[tokio::test]
async fn upload_returns_receipt_and_token() {
    let server = MockServer::start().await;
    let key = generate_access_key().to_hex();
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "fileId": ID,
            "key": key,
            "name": "t.txt",
            "type": "text/plain",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = setup(&server);
    let receipt = client
        .upload(b"helloworld".to_vec(), "t.txt", "text/plain")
        .await
        .unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.file_id, ID);

    let token = receipt.token().unwrap();
    assert_eq!(token.id, ID);
    assert_eq!(token.key, key);
    assert_eq!(token.name.as_deref(), Some("t.txt"));
}

#[tokio::test]
async fn upload_too_large_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(
            ResponseTemplate::new(413)
                .set_body_json(serde_json::json!({ "error": "File too large" })),
        )
        .mount(&server)
        .await;

    let err = setup(&server)
        .upload(vec![0u8; 16], "big.bin", "application/octet-stream")
        .await
        .unwrap_err();
    match err {
        ExchangeError::Api { status, message } => {
            assert_eq!(status, 413);
            assert_eq!(message, "File too large");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// --- Download ---

#[tokio::test]
async fn download_reads_body_and_headers() {
    let server = MockServer::start().await;
    let key = generate_access_key();
    Mock::given(method("GET"))
        .and(path(format!("/download/{ID}")))
        .and(query_param("key", key.to_hex()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .insert_header("content-disposition", r#"attachment; filename="t.txt""#)
                .set_body_bytes(b"helloworld".to_vec()),
        )
        .mount(&server)
        .await;

    let token = package_token(ID, &key, None, None);
    let file = setup(&server).download(&token).await.unwrap();
    assert_eq!(file.data, b"helloworld");
    assert_eq!(file.name, "t.txt");
    assert_eq!(file.mime_type, "text/plain");
}

#[tokio::test]
async fn download_without_disposition_uses_token_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .mount(&server)
        .await;

    let client = setup(&server);
    let key = generate_access_key();

    let named = package_token(ID, &key, Some("from-token.txt"), None);
    assert_eq!(client.download(&named).await.unwrap().name, "from-token.txt");

    let unnamed = package_token(ID, &key, None, None);
    assert_eq!(client.download(&unnamed).await.unwrap().name, DEFAULT_FILE_NAME);
}

#[tokio::test]
async fn download_maps_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({ "error": "File not found" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{ID}")))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({ "error": "Invalid decryption key" })),
        )
        .mount(&server)
        .await;

    let client = setup(&server);
    let key = generate_access_key();
    assert!(matches!(
        client.download(&package_token("missing", &key, None, None)).await,
        Err(ExchangeError::NotFound(_))
    ));
    assert!(matches!(
        client.download(&package_token(ID, &key, None, None)).await,
        Err(ExchangeError::Forbidden(_))
    ));
}

#[tokio::test]
async fn invalid_id_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = setup(&server);
    let token = package_token("../index", &generate_access_key(), None, None);
    assert!(matches!(
        client.download(&token).await,
        Err(ExchangeError::NotFound(_))
    ));
    assert!(matches!(client.info("a/b").await, Err(ExchangeError::NotFound(_))));
}

// --- Info / Delete / Health ---

#[tokio::test]
async fn info_parses_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/file/{ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": ID,
            "name": "t.txt",
            "type": "text/plain",
            "size": 10,
        })))
        .mount(&server)
        .await;

    let info = setup(&server).describe(ID).await.unwrap();
    assert_eq!(info.name, "t.txt");
    assert_eq!(info.mime_type, "text/plain");
    assert_eq!(info.size, 10);
}

#[tokio::test]
async fn delete_sends_key() {
    let server = MockServer::start().await;
    let key = generate_access_key();
    Mock::given(method("DELETE"))
        .and(path(format!("/file/{ID}")))
        .and(query_param("key", key.to_hex()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "File deleted successfully",
        })))
        .expect(1)
        .mount(&server)
        .await;

    setup(&server)
        .delete(&package_token(ID, &key, None, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn health_reports_file_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "service": "qrdrop-server",
            "version": "0.3.0",
            "files": 3,
        })))
        .mount(&server)
        .await;

    let health = setup(&server).health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.files, 3);
}

#[tokio::test]
async fn unreachable_server_fails_retrieval() {
    let client = ShareClient::new(ClientConfig {
        base_url: "http://127.0.0.1:9".into(),
        timeout_secs: 2,
    })
    .unwrap();
    let code = package_token(ID, &generate_access_key(), None, None).to_payload();

    let mut flow = RetrievalFlow::new();
    flow.begin_capture().unwrap();
    flow.submit_code(&code).unwrap();
    flow.confirm().unwrap();
    let state = flow.retrieve(&client).await.unwrap();
    assert!(matches!(state, RetrievalState::Failed { .. }));
}
