// libs/medical-records-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub vitals: Option<Value>,
    #[serde(default)]
    pub icd10_codes: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<RecordAttachment>,
    #[serde(default)]
    pub is_confidential: bool,
    /// Auth user id of the author.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalRecord {
    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.created_by == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Consultation,
    LabReport,
    Imaging,
    Discharge,
    Vaccination,
    Other,
}

impl RecordType {
    /// Types a patient may upload about themselves.
    pub fn is_patient_uploadable(&self) -> bool {
        matches!(self, RecordType::LabReport | RecordType::Imaging | RecordType::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Consultation => "consultation",
            RecordType::LabReport => "lab_report",
            RecordType::Imaging => "imaging",
            RecordType::Discharge => "discharge",
            RecordType::Vaccination => "vaccination",
            RecordType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordAttachment {
    pub file_name: String,
    pub content_type: String,
    pub url: String,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMedicalRecordRequest {
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub vitals: Option<Value>,
    #[serde(default)]
    pub icd10_codes: Vec<String>,
    #[serde(default)]
    pub is_confidential: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMedicalRecordRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub diagnosis: Option<String>,
    pub symptoms: Option<Vec<String>>,
    pub vitals: Option<Value>,
    pub icd10_codes: Option<Vec<String>>,
    pub is_confidential: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordListQuery {
    pub record_type: Option<RecordType>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    /// Base64 payload, optionally as a `data:` URL.
    pub file_data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MedicalRecordError {
    #[error("Medical record not found")]
    NotFound,

    #[error("Not authorized to access this medical record")]
    Unauthorized,

    #[error("Invalid ICD-10 code: {0}")]
    InvalidIcd10Code(String),

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for MedicalRecordError {
    fn from(err: anyhow::Error) -> Self {
        MedicalRecordError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for MedicalRecordError {
    fn from(err: serde_json::Error) -> Self {
        MedicalRecordError::DatabaseError(err.to_string())
    }
}

impl From<MedicalRecordError> for AppError {
    fn from(err: MedicalRecordError) -> Self {
        match err {
            MedicalRecordError::NotFound => AppError::NotFound(err.to_string()),
            MedicalRecordError::Unauthorized => AppError::Forbidden(err.to_string()),
            MedicalRecordError::InvalidIcd10Code(_)
            | MedicalRecordError::InvalidAttachment(_) => AppError::BadRequest(err.to_string()),
            MedicalRecordError::ValidationError(msg) => AppError::ValidationError(msg),
            MedicalRecordError::StorageError(msg) => AppError::ExternalService(msg),
            MedicalRecordError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
