use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use b2b_remit::adapters::InMemoryTransactionRepository;
use b2b_remit::config::{Config, GatewayConfig};
use b2b_remit::domain::{Transaction, TransactionStatus};
use b2b_remit::ports::TransactionRepository;
use b2b_remit::{create_app, AppState};
use mockito::{Matcher, ServerGuard};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    gateway: ServerGuard,
    repository: InMemoryTransactionRepository,
    _certificate: NamedTempFile,
}

async fn setup_test_app(reference_field: &str) -> TestApp {
    let gateway = mockito::Server::new_async().await;

    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    let mut certificate = NamedTempFile::new().unwrap();
    certificate.write_all(pem.as_bytes()).unwrap();

    let config = Config {
        server_port: 3000,
        database_url: "postgres://unused".to_string(),
        reference_field: reference_field.to_string(),
        ack_utc_offset_seconds: 3 * 3600,
        log_request_body: true,
        gateway: GatewayConfig {
            base_url: gateway.url(),
            consumer_key: "consumer-key".to_string(),
            consumer_secret: "consumer-secret".to_string(),
            initiator: "Safaricom".to_string(),
            initiator_password: "initiator-password".to_string(),
            certificate_path: certificate.path().to_path_buf(),
            command_id: "PayTaxToKRA".to_string(),
            sender_identifier_type: "4".to_string(),
            receiver_identifier_type: "4".to_string(),
            short_code: "222".to_string(),
            party_b: "572572".to_string(),
            callback_base_url: "http://localhost:3000/api/v1.0".to_string(),
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        },
    };

    let repository = InMemoryTransactionRepository::new();
    let state = AppState::new(&config, Arc::new(repository.clone())).unwrap();

    TestApp {
        app: create_app(state),
        gateway,
        repository,
        _certificate: certificate,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Background tasks are detached from the response, so poll the store.
async fn wait_for_status(
    repository: &InMemoryTransactionRepository,
    reference: &str,
    expected: TransactionStatus,
) -> Transaction {
    for _ in 0..200 {
        if let Some(tx) = repository.find_by_reference(reference).await.unwrap() {
            if tx.status == expected {
                return tx;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {}", reference, expected);
}

#[tokio::test]
async fn test_initiate_with_empty_request_payload() {
    let t = setup_test_app("pnr").await;
    let (status, body) = post(&t.app, "/api/v1.0/payment/initiate", json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "request is empty."}));
}

#[tokio::test]
async fn test_initiate_with_non_json_payload() {
    let t = setup_test_app("pnr").await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1.0/payment/initiate")
        .body(Body::from("Amount=100&pnr=1"))
        .unwrap();

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_initiate_with_missing_keys() {
    let t = setup_test_app("pnr").await;

    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"pnr": "1234567890"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "missing key ~ <Amount>."}));

    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": "100"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "missing key ~ <pnr>."}));
}

#[tokio::test]
async fn test_initiate_with_invalid_amounts() {
    let t = setup_test_app("pnr").await;

    let (_, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": "100xBB3", "pnr": "1234567890"}),
    )
    .await;
    assert_eq!(body, json!({"error": "<Amount> must be a number."}));

    let (_, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": "0", "pnr": "1234567890"}),
    )
    .await;
    assert_eq!(
        body,
        json!({"error": "<Amount> cannot be less than or equal to zero."})
    );
}

#[tokio::test]
async fn test_validation_failure_makes_no_gateway_call() {
    let mut t = setup_test_app("pnr").await;
    let token = t
        .gateway
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (status, _) = post(&t.app, "/api/v1.0/payment/initiate", json!({"pnr": "X"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    token.assert_async().await;
}

#[tokio::test]
async fn test_end_to_end_initiate_and_confirm() {
    let mut t = setup_test_app("ref").await;
    let _token = t
        .gateway
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::UrlEncoded(
            "grant_type".into(),
            "client_credentials".into(),
        ))
        .with_status(200)
        .with_body(r#"{"access_token": "mock_token", "expires_in": "3599"}"#)
        .create_async()
        .await;
    let remit = t
        .gateway
        .mock("POST", "/mpesa/b2b/v1/remittax")
        .match_header("authorization", "Bearer mock_token")
        .match_body(Matcher::PartialJson(
            json!({"Amount": 100, "AccountReference": "PNR123"}),
        ))
        .with_status(200)
        .with_body(
            json!({
                "ConversationID": "C1",
                "OriginatorConversationID": "O1",
                "ResponseCode": "0",
                "ResponseDescription": "Accept the service request successfully."
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": "100", "ref": "PNR123"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({
            "status_message": "B2B payment initiated successfully.",
            "status_code": "0",
            "account_reference": "PNR123"
        })
    );
    remit.assert_async().await;

    let pending = wait_for_status(&t.repository, "PNR123", TransactionStatus::Pending).await;
    assert_eq!(pending.conversation_id, "C1");
    assert_eq!(pending.originator_conversation_id, "O1");
    assert_eq!(pending.amount, 100);

    let callback = json!({"Result": {
        "ResultType": 0,
        "ResultCode": 0,
        "ResultDesc": "The service request is processed successfully.",
        "OriginatorConversationID": "O1",
        "ConversationID": "C1",
        "TransactionID": "QKA81LK5CY"
    }});
    let (status, ack) = post(&t.app, "/api/v1.0/payment/confirm", callback.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "0");
    assert_eq!(ack["ResultDesc"], "Confirmation payload received successfully.");
    assert_eq!(ack["ThirdPartyTransID"].as_str().unwrap().len(), 14);

    let finalized = wait_for_status(&t.repository, "PNR123", TransactionStatus::Success).await;

    // A redelivered callback must leave the record untouched.
    let (status, _) = post(&t.app, "/api/v1.0/payment/confirm", callback).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = t
        .repository
        .find_by_reference("PNR123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after, finalized);
}

#[tokio::test]
async fn test_duplicate_reference_is_rejected_without_gateway_call() {
    let mut t = setup_test_app("pnr").await;
    t.repository
        .insert(&Transaction::new(
            "PNR999".to_string(),
            500,
            "O9".to_string(),
            "C9".to_string(),
        ))
        .await
        .unwrap();

    let token = t
        .gateway
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let remit = t
        .gateway
        .mock("POST", "/mpesa/b2b/v1/remittax")
        .expect(0)
        .create_async()
        .await;

    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": 500, "pnr": "PNR999"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status_message"], "A similar B2B payment already exists.");
    assert_eq!(body["status_code"], "999");
    assert_eq!(body["account_reference"], "PNR999");
    token.assert_async().await;
    remit.assert_async().await;
}

#[tokio::test]
async fn test_gateway_error_returns_400_and_creates_no_record() {
    let mut t = setup_test_app("pnr").await;
    let _token = t
        .gateway
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"access_token": "mock_token"}"#)
        .create_async()
        .await;
    let _remit = t
        .gateway
        .mock("POST", "/mpesa/b2b/v1/remittax")
        .with_status(200)
        .with_body(
            r#"{"requestId": "1-2-3", "errorCode": "401.002.01", "errorMessage": "Invalid Access Token"}"#,
        )
        .create_async()
        .await;

    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": 100, "pnr": "PNR555"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status_message"], "Invalid Access Token");
    assert_eq!(body["status_code"], "999");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(t.repository.all().await.is_empty());
}

#[tokio::test]
async fn test_timeout_callback_fails_pending_record() {
    let t = setup_test_app("pnr").await;
    t.repository
        .insert(&Transaction::new(
            "PNR777".to_string(),
            100,
            "O7".to_string(),
            "C7".to_string(),
        ))
        .await
        .unwrap();

    let (status, ack) = post(
        &t.app,
        "/api/v1.0/payment/timeout",
        json!({"Result": {"ConversationID": "C7", "OriginatorConversationID": "O7", "ResultCode": 1}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "1");
    wait_for_status(&t.repository, "PNR777", TransactionStatus::Failed).await;
}

#[tokio::test]
async fn test_callback_without_result_is_rejected() {
    let t = setup_test_app("pnr").await;

    for uri in ["/api/v1.0/payment/confirm", "/api/v1.0/payment/timeout"] {
        let (status, ack) = post(&t.app, uri, json!({"Body": {}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(ack["ResultCode"], "999");
        assert_eq!(ack["ResultDesc"], "Invalid request payload.");
    }
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let t = setup_test_app("pnr").await;

    let (status, body) = send(&t.app, "GET", "/api/v1.0/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "invalid resource URI."}));

    let (status, body) = send(&t.app, "GET", "/api/v1.0/payment/initiate", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({"error": "method not supported."}));
}

#[tokio::test]
async fn test_health_and_request_id() {
    let t = setup_test_app("pnr").await;
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db"], "connected");
}

#[tokio::test]
async fn test_large_callback_body_still_reconciles() {
    let t = setup_test_app("pnr").await;
    t.repository
        .insert(&Transaction::new(
            "PNR888".to_string(),
            100,
            "O8".to_string(),
            "C8".to_string(),
        ))
        .await
        .unwrap();

    // Well past the body logging cap; the handler must still see the full payload.
    let filler = "x".repeat(70 * 1024);
    let (status, ack) = post(
        &t.app,
        "/api/v1.0/payment/confirm",
        json!({"Result": {
            "ConversationID": "C8",
            "OriginatorConversationID": "O8",
            "ResultCode": 0,
            "ResultParameters": {"ResultParameter": [{"Key": "Notes", "Value": filler}]}
        }}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], "0");
    wait_for_status(&t.repository, "PNR888", TransactionStatus::Success).await;
}

#[tokio::test]
async fn test_body_over_buffer_limit_is_rejected() {
    let t = setup_test_app("pnr").await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1.0/payment/confirm")
        .header("content-type", "application/json")
        .body(Body::from(vec![b' '; 3 * 1024 * 1024]))
        .unwrap();

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_overlong_reference_is_rejected_before_gateway() {
    let mut t = setup_test_app("pnr").await;
    let token = t
        .gateway
        .mock("GET", "/oauth/v1/generate")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": 100, "pnr": "P".repeat(101)}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "<pnr> cannot be longer than 100 characters."})
    );
    token.assert_async().await;
    assert!(t.repository.all().await.is_empty());
}

#[tokio::test]
async fn test_missing_reference_wins_over_bad_amount() {
    let t = setup_test_app("pnr").await;
    let (status, body) = post(
        &t.app,
        "/api/v1.0/payment/initiate",
        json!({"Amount": "abc"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "missing key ~ <pnr>."}));
}
