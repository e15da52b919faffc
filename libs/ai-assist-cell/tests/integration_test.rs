use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_string_contains, method, path};

use ai_assist_cell::ai_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

async fn setup() -> (MockServer, AppConfig) {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    (mock_server, config)
}

fn authed(uri: &str, user: &TestUser, config: &AppConfig, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", JwtTestUtils::bearer(user, config))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }]
    }))
}

#[tokio::test]
async fn test_detect_language() {
    let (_mock_server, config) = setup().await;
    let user = TestUser::patient("ravi@example.com");

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/language/detect", &user, &config, json!({ "text": "mujhe kal se bahut sir dard ho raha hai" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["language"], "hinglish");
    assert!((body["confidence"].as_f64().unwrap() - 0.889).abs() < 1e-3);
    assert!(body["scores"]["en"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_triage_refined_by_model() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("ravi@example.com");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("json_object"))
        .respond_with(completion(r#"{"urgency":"routine","recommended_specialty":"Dermatology","advice":"Book a dermatology visit this week."}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/triage", &user, &config, json!({ "symptoms": "itchy rash on arms", "age": 32, "duration_days": 1 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["urgency"], "routine");
    assert_eq!(body["recommended_specialty"], "Dermatology");
    assert_eq!(body["ai_refined"], true);
    assert_eq!(body["language"], "en");
}

#[tokio::test]
async fn test_triage_emergency_survives_model_downgrade() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("ravi@example.com");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(r#"{"urgency":"self_care","advice":"Drink water."}"#))
        .mount(&mock_server)
        .await;

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/triage", &user, &config, json!({ "symptoms": "seene mein dard aur pasina" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["urgency"], "emergency");
    assert_eq!(body["red_flags"], json!(["chest pain"]));
    assert_eq!(body["language"], "hinglish");
}

#[tokio::test]
async fn test_triage_without_ai_uses_rules() {
    let (_mock_server, mut config) = setup().await;
    config.openai_api_key = String::new();
    let user = TestUser::patient("ravi@example.com");

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/triage", &user, &config, json!({ "symptoms": "tez bukhar since two days" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["urgency"], "urgent");
    assert_eq!(body["ai_refined"], false);
}

#[tokio::test]
async fn test_chat_without_ai_is_unavailable() {
    let (_mock_server, mut config) = setup().await;
    config.openai_api_key = String::new();
    let user = TestUser::patient("ravi@example.com");

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/chat", &user, &config, json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_chat_replies_with_disclaimer() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("ravi@example.com");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Reply in English"))
        .respond_with(completion("Stay hydrated and rest. If the fever lasts more than three days, book a consultation."))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/chat", &user, &config, json!({ "message": "What should I do for a fever?" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["language"], "en");
    assert!(body["reply"].as_str().unwrap().contains("hydrated"));
    assert!(body["disclaimer"].as_str().unwrap().contains("not a medical diagnosis"));
}

#[tokio::test]
async fn test_translate_to_hindi() {
    let (mock_server, config) = setup().await;
    let user = TestUser::doctor("dr.mehta@example.com");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Hindi (Devanagari script)"))
        .respond_with(completion("दिन में दो बार एक गोली लें।"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/translate", &user, &config, json!({ "text": "Take one tablet twice a day.", "target_language": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["source_language"], "en");
    assert_eq!(body["target_language"], "hi");
    assert_eq!(body["translated"], true);
}

#[tokio::test]
async fn test_translate_unsupported_target() {
    let (_mock_server, config) = setup().await;
    let user = TestUser::patient("ravi@example.com");

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/translate", &user, &config, json!({ "text": "hello", "target_language": "ta" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transcription_codes_for_doctor() {
    let (mock_server, config) = setup().await;
    let user = TestUser::doctor("dr.mehta@example.com");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(r#"{"codes":[{"code":"E11.9","description":"Type 2 diabetes mellitus without complications"},{"code":"DM2","description":"bad"}]}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed(
            "/transcription/codes",
            &user,
            &config,
            json!({ "transcript": "Patient with known type 2 diabetes, sugars well controlled on metformin." }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["codes"][0]["code"], "E11.9");
    assert_eq!(body["codes"].as_array().unwrap().len(), 1);
    assert_eq!(body["discarded"], json!(["DM2"]));
}

#[tokio::test]
async fn test_transcription_codes_forbidden_for_patient() {
    let (_mock_server, config) = setup().await;
    let user = TestUser::patient("ravi@example.com");

    let app = ai_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("/transcription/codes", &user, &config, json!({ "transcript": "anything" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_requires_authentication() {
    let (_mock_server, config) = setup().await;

    let app = ai_routes(Arc::new(config));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/language/detect")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "text": "hi" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
