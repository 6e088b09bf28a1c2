//! Session Endpoint Tests
//!
//! Exercises `POST /session` and `GET /health` through the router, with the
//! upstream realtime calls endpoint played by a wiremock server.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tower::util::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_session_gateway::core::realtime::{
    GATEWAY_TIMEOUT_MESSAGE, HttpSignalingClient, Modality, ModelPolicy, SessionOffer, SignalingError,
    SignalingExchange,
};
use voice_session_gateway::core::relay::{Backoff, RelayClient, RetryPolicy};
use voice_session_gateway::{ServerConfig, routes, state::AppState};

const OFFER: &str = "v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
const ANSWER: &str = "v=0\r\no=- 99 2 IN IP4 10.0.0.1\r\ns=-\r\nt=0 0\r\n";
const CALLS_PATH: &str = "/v1/realtime/calls";

fn test_config(upstream: &MockServer) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.openai_api_key = Some("sk-test".to_string());
    config.realtime_calls_url = format!("{}{}", upstream.uri(), CALLS_PATH);
    config
}

/// Fast retry schedule so retried failures don't slow the suite down.
fn fast_policy() -> RetryPolicy {
    let tiny = Backoff::new(Duration::from_millis(1), Duration::ZERO);
    RetryPolicy::new(3, Duration::from_secs(5)).with_backoff(tiny, tiny)
}

fn app(config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        config,
        relay: RelayClient::default(),
        retry_policy: fast_policy(),
    });
    routes::api::create_api_router().with_state(state)
}

fn offer_request(content_type: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/session")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_port() {
    let upstream = MockServer::start().await;
    let mut config = test_config(&upstream);
    config.port = 4010;

    let response = app(config)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["port"], 4010);
}

#[tokio::test]
async fn test_successful_exchange_returns_answer() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .and(header_eq("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-request-id", "req_ok")
                .set_body_string(ANSWER),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let response = app(test_config(&upstream))
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/sdp"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), ANSWER);

    // The upstream call is multipart with the offer and the session descriptor
    let requests = upstream.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(body.contains("name=\"sdp\""));
    assert!(body.contains(OFFER));
    assert!(body.contains("name=\"session\""));
    assert!(body.contains(r#""type":"realtime""#));
    assert!(body.contains(r#""model":"gpt-realtime""#));
    assert!(body.contains(r#""voice":"marin""#));
}

#[tokio::test]
async fn test_caller_request_id_is_forwarded_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .and(header_eq("x-client-request-id", "trace-42"))
        .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
        .expect(1)
        .mount(&upstream)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/session")
        .header(header::CONTENT_TYPE, "application/sdp")
        .header("x-request-id", "trace-42")
        .body(Body::from(OFFER))
        .unwrap();

    let response = app(test_config(&upstream)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_configured_output_modalities_are_sent() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
        .mount(&upstream)
        .await;

    let mut config = test_config(&upstream);
    config.realtime_output_modalities = Some(vec![Modality::Text]);

    let response = app(config)
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let requests = upstream.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(body.contains(r#""output_modalities":["text"]"#));
}

#[tokio::test]
async fn test_text_plain_offer_is_accepted() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(ANSWER))
        .mount(&upstream)
        .await;

    let response = app(test_config(&upstream))
        .oneshot(offer_request("text/plain; charset=utf-8", OFFER))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_empty_body_is_missing_sdp() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ANSWER))
        .expect(0)
        .mount(&upstream)
        .await;

    let response = app(test_config(&upstream))
        .oneshot(offer_request("application/sdp", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "missing_sdp");
    assert_eq!(body["message"], "Missing SDP offer (body must be SDP text)");
}

#[tokio::test]
async fn test_missing_api_key() {
    let upstream = MockServer::start().await;
    let mut config = test_config(&upstream);
    config.openai_api_key = None;

    let response = app(config)
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "missing_api_key");
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_required_model_policy_without_model() {
    let upstream = MockServer::start().await;
    let mut config = test_config(&upstream);
    config.model_policy = ModelPolicy::Required;
    config.realtime_model = None;

    let response = app(config)
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "missing_realtime_model");
}

#[tokio::test]
async fn test_upstream_rejection_keeps_status_and_request_id() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("x-request-id", "req_denied")
                .set_body_string("Incorrect API key provided"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let response = app(test_config(&upstream))
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "openai_error");
    assert_eq!(body["status"], 401);
    assert_eq!(body["request_id"], "req_denied");
    assert_eq!(body["message"], "Incorrect API key provided");
}

#[tokio::test]
async fn test_html_error_page_is_gateway_timeout() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(
            ResponseTemplate::new(502)
                .set_body_string("<!DOCTYPE html>\n<html><body>Bad gateway</body></html>"),
        )
        .expect(3)
        .mount(&upstream)
        .await;

    let response = app(test_config(&upstream))
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "openai_gateway_timeout");
    assert_eq!(body["status"], 504);
}

#[tokio::test]
async fn test_retry_recovers_from_transient_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
        .expect(1)
        .mount(&upstream)
        .await;

    let response = app(test_config(&upstream))
        .oneshot(offer_request("application/sdp", OFFER))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_signaling_client_against_running_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
        .mount(&upstream)
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, app(test_config(&upstream))).into_future());

    let client = HttpSignalingClient::new(&format!("http://{addr}")).unwrap();
    let answer = client.exchange(SessionOffer::new(OFFER)).await.unwrap();
    assert_eq!(answer.as_str(), ANSWER);

    server.abort();
}

#[tokio::test]
async fn test_signaling_client_surfaces_gateway_errors() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALLS_PATH))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_string("Project does not have access to model"),
        )
        .mount(&upstream)
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, app(test_config(&upstream))).into_future());

    let client = HttpSignalingClient::new(&format!("http://{addr}")).unwrap();
    let err = client.exchange(SessionOffer::new(OFFER)).await.unwrap_err();
    assert_eq!(
        err,
        SignalingError::Server("Project does not have access to model".to_string())
    );

    server.abort();
}

#[tokio::test]
async fn test_signaling_client_maps_html_page_to_retry_hint() {
    // A proxy in front of the gateway answering with an HTML error page
    let proxy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(504)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>504 Gateway Time-out</body></html>"),
        )
        .mount(&proxy)
        .await;

    let client = HttpSignalingClient::new(&proxy.uri()).unwrap();
    let err = client.exchange(SessionOffer::new(OFFER)).await.unwrap_err();
    assert_eq!(err, SignalingError::Server(GATEWAY_TIMEOUT_MESSAGE.to_string()));
}
