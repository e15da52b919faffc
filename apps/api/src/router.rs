use std::sync::Arc;

use axum::{
    Json, Router,
    routing::get,
};
use serde_json::{json, Value};

use ai_assist_cell::ai_routes;
use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use doctor_cell::router::doctor_routes;
use medical_records_cell::router::medical_records_routes;
use patient_cell::patient_routes;
use payment_cell::payment_routes;
use prescription_cell::router::prescription_routes;
use shared_config::AppConfig;
use video_conferencing_cell::video_conferencing_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let status = state.clone();

    Router::new()
        .route("/", get(|| async { "TeleCare API is running!" }))
        .route("/status", get(move || service_status(status.clone())))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/records", medical_records_routes(state.clone()))
        .nest("/prescriptions", prescription_routes(state.clone()))
        .nest("/payments", payment_routes(state.clone()))
        .nest("/video", video_conferencing_routes(state.clone()))
        .nest("/ai", ai_routes(state))
}

/// Which integrations are usable; no secrets are echoed.
async fn service_status(config: Arc<AppConfig>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "database_configured": config.is_configured(),
        "video_configured": config.is_video_conferencing_configured(),
        "payments_configured": config.is_payments_configured(),
        "ai_configured": config.is_ai_configured(),
    }))
}
