// libs/medical-records-cell/src/handlers.rs
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AttachmentUpload, CreateMedicalRecordRequest, RecordListQuery, UpdateMedicalRecordRequest};
use crate::services::MedicalRecordService;

#[axum::debug_handler]
pub async fn create_record(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateMedicalRecordRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = MedicalRecordService::new(&config);

    let record = service.create_record(&user, request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(record))))
}

#[axum::debug_handler]
pub async fn get_record(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = MedicalRecordService::new(&config);

    let record = service.get_record(&user, record_id, auth.token()).await?;

    Ok(Json(json!(record)))
}

#[axum::debug_handler]
pub async fn list_patient_records(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<RecordListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = MedicalRecordService::new(&config);

    let records = service.list_patient_records(&user, patient_id, query, auth.token()).await?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "total": records.len(),
        "records": records,
    })))
}

#[axum::debug_handler]
pub async fn update_record(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<Uuid>,
    Json(request): Json<UpdateMedicalRecordRequest>,
) -> Result<Json<Value>, AppError> {
    let service = MedicalRecordService::new(&config);

    let record = service.update_record(&user, record_id, request, auth.token()).await?;

    Ok(Json(json!(record)))
}

#[axum::debug_handler]
pub async fn delete_record(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let service = MedicalRecordService::new(&config);

    service.delete_record(&user, record_id, auth.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn add_attachment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<Uuid>,
    Json(upload): Json<AttachmentUpload>,
) -> Result<Json<Value>, AppError> {
    let service = MedicalRecordService::new(&config);

    let record = service.add_attachment(&user, record_id, upload, auth.token()).await?;

    Ok(Json(json!(record)))
}
