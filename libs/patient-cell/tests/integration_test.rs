use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use patient_cell::patient_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn setup() -> (MockServer, AppConfig) {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    (mock_server, config)
}

fn authed(method: &str, uri: &str, user: &TestUser, config: &AppConfig, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", JwtTestUtils::bearer(user, config))
        .header("content-type", "application/json");

    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_body() -> Value {
    json!({
        "first_name": "Asha",
        "last_name": "Verma",
        "email": "asha@example.com",
        "phone_number": "+919812345678",
        "date_of_birth": "1990-05-14",
        "gender": "female",
        "pincode": "411001",
        "blood_group": "B+",
        "preferred_language": "hi",
        "allergies": ["penicillin"]
    })
}

#[tokio::test]
async fn test_create_patient_success() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("asha@example.com");
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("email", "eq.asha@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, &user.id)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("POST", "/", &user, &config, Some(create_body())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], patient_id);
    assert_eq!(body["user_id"], user.id);
}

#[tokio::test]
async fn test_create_patient_duplicate_email_conflicts() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("asha@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("email", "eq.asha@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("POST", "/", &user, &config, Some(create_body())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_patient_invalid_pincode() {
    let (_mock_server, config) = setup().await;
    let user = TestUser::patient("asha@example.com");
    let mut body = create_body();
    body["pincode"] = json!("12AB");

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("POST", "/", &user, &config, Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patient_cannot_read_another_patient() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("asha@example.com");
    let other_patient = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("GET", &format!("/{}", other_patient), &user, &config, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_doctor_with_appointment_reads_patient() {
    let (mock_server, config) = setup().await;
    let user = TestUser::doctor("rohan@example.com");
    let doctor_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": doctor_id }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("GET", &format!("/{}", patient_id), &user, &config, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["blood_group"], "B+");
}

#[tokio::test]
async fn test_profile_returns_own_record() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("asha@example.com");
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, &user.id)
        ])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("GET", "/profile", &user, &config, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["patient"]["id"], patient_id);
    assert_eq!(body["full_name"], "Asha Verma");
}

#[tokio::test]
async fn test_profile_missing_is_not_found() {
    let (mock_server, config) = setup().await;
    let user = TestUser::patient("new@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("GET", "/profile", &user, &config, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_requires_clinical_role() {
    let (_mock_server, config) = setup().await;
    let user = TestUser::patient("asha@example.com");

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("GET", "/search?name=Asha", &user, &config, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_search_as_doctor() {
    let (mock_server, config) = setup().await;
    let user = TestUser::doctor("rohan@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "u-1"),
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "u-2")
        ])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(Arc::new(config.clone()));
    let response = app
        .oneshot(authed("GET", "/search?name=Verma&limit=1000", &user, &config, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_requires_authentication() {
    let (_mock_server, config) = setup().await;

    let app = patient_routes(Arc::new(config));
    let response = app
        .oneshot(Request::builder().uri("/profile").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
