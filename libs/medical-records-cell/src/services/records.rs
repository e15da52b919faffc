// libs/medical-records-cell/src/services/records.rs
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::{User, UserRole};

use crate::models::{
    AttachmentUpload, CreateMedicalRecordRequest, MedicalRecord, MedicalRecordError, RecordAttachment,
    RecordListQuery, UpdateMedicalRecordRequest,
};
use crate::services::icd10::Icd10Validator;

pub const ATTACHMENT_BUCKET: &str = "medical-records";
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
/// Request body cap for uploads: base64 inflates by 4/3, plus room for the JSON envelope.
pub const MAX_ATTACHMENT_BODY_BYTES: usize = MAX_ATTACHMENT_BYTES / 3 * 4 + 1024 * 1024;
pub const DEFAULT_LIST_LIMIT: i32 = 50;
pub const MAX_LIST_LIMIT: i32 = 100;

const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "application/dicom",
];

pub struct MedicalRecordService {
    supabase: SupabaseClient,
    access: AccessControlService,
    icd10: Icd10Validator,
}

impl MedicalRecordService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            access: AccessControlService::new(config),
            icd10: Icd10Validator::new(),
        }
    }

    /// Confidential records are visible to their author, admins and the
    /// patient, never to other doctors.
    pub fn is_visible_to(user: &User, record: &MedicalRecord) -> bool {
        !(record.is_confidential && user.is_doctor() && !record.is_authored_by(&user.id))
    }

    fn validate_title(title: &str) -> Result<(), MedicalRecordError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(MedicalRecordError::ValidationError("Title is required".to_string()));
        }
        if title.chars().count() > 200 {
            return Err(MedicalRecordError::ValidationError("Title must be at most 200 characters".to_string()));
        }
        Ok(())
    }

    fn normalize_codes(&self, codes: &[String]) -> Result<Vec<String>, MedicalRecordError> {
        self.icd10.normalize_all(codes).map_err(MedicalRecordError::InvalidIcd10Code)
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_record(
        &self,
        user: &User,
        request: CreateMedicalRecordRequest,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        Self::validate_title(&request.title)?;
        let icd10_codes = self.normalize_codes(&request.icd10_codes)?;
        let patient_id = request.patient_id.to_string();

        let (doctor_id, is_confidential) = match user.app_role() {
            Some(UserRole::Admin) => (None, request.is_confidential),
            Some(UserRole::Doctor) => {
                if !self.access.can_access_patient(user, &patient_id, auth_token).await? {
                    return Err(MedicalRecordError::Unauthorized);
                }
                let doctor_id = self.access.doctor_id_for_user(&user.id, auth_token).await?;
                (doctor_id, request.is_confidential)
            }
            Some(UserRole::Patient) => {
                let own = self.access.patient_id_for_user(&user.id, auth_token).await?;
                if own.as_deref() != Some(patient_id.as_str()) {
                    return Err(MedicalRecordError::Unauthorized);
                }
                if !request.record_type.is_patient_uploadable() {
                    return Err(MedicalRecordError::ValidationError(format!(
                        "Patients cannot create {} records",
                        request.record_type.as_str()
                    )));
                }
                (None, false)
            }
            None => return Err(MedicalRecordError::Unauthorized),
        };

        let now = Utc::now().to_rfc3339();
        let record_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": doctor_id,
            "appointment_id": request.appointment_id,
            "record_type": request.record_type,
            "title": request.title.trim(),
            "description": request.description,
            "diagnosis": request.diagnosis,
            "symptoms": request.symptoms,
            "vitals": request.vitals,
            "icd10_codes": icd10_codes,
            "attachments": [],
            "is_confidential": is_confidential,
            "created_by": user.id,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/medical_records",
            Some(auth_token),
            Some(record_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| MedicalRecordError::DatabaseError("Failed to create medical record".to_string()))?;
        let record: MedicalRecord = serde_json::from_value(row)?;

        info!("Medical record {} created for patient {}", record.id, record.patient_id);
        Ok(record)
    }

    async fn fetch_record(&self, record_id: Uuid, auth_token: &str) -> Result<MedicalRecord, MedicalRecordError> {
        let path = format!("/rest/v1/medical_records?id=eq.{}", record_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(MedicalRecordError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Loads a record and applies both the patient access rule and the
    /// confidentiality rule. Hidden records read as missing.
    async fn load_visible(
        &self,
        user: &User,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let record = self.fetch_record(record_id, auth_token).await?;

        if !self.access.can_access_patient(user, &record.patient_id.to_string(), auth_token).await? {
            return Err(MedicalRecordError::Unauthorized);
        }
        if !Self::is_visible_to(user, &record) {
            return Err(MedicalRecordError::NotFound);
        }
        Ok(record)
    }

    pub async fn get_record(
        &self,
        user: &User,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        debug!("Fetching medical record {}", record_id);
        self.load_visible(user, record_id, auth_token).await
    }

    pub fn list_path(patient_id: Uuid, query: &RecordListQuery) -> String {
        let mut path = format!("/rest/v1/medical_records?patient_id=eq.{}", patient_id);
        if let Some(record_type) = query.record_type {
            path.push_str(&format!("&record_type=eq.{}", record_type.as_str()));
        }
        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        path.push_str(&format!("&order=created_at.desc&limit={}&offset={}", limit, offset));
        path
    }

    pub async fn list_patient_records(
        &self,
        user: &User,
        patient_id: Uuid,
        query: RecordListQuery,
        auth_token: &str,
    ) -> Result<Vec<MedicalRecord>, MedicalRecordError> {
        if !self.access.can_access_patient(user, &patient_id.to_string(), auth_token).await? {
            return Err(MedicalRecordError::Unauthorized);
        }

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &Self::list_path(patient_id, &query), Some(auth_token), None)
            .await?;

        let records = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<MedicalRecord>, _>>()?;

        Ok(records.into_iter().filter(|r| Self::is_visible_to(user, r)).collect())
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn update_record(
        &self,
        user: &User,
        record_id: Uuid,
        request: UpdateMedicalRecordRequest,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let record = self.fetch_record(record_id, auth_token).await?;
        if !user.is_admin() && !record.is_authored_by(&user.id) {
            return Err(MedicalRecordError::Unauthorized);
        }

        let mut update_data = serde_json::Map::new();
        if let Some(title) = request.title {
            Self::validate_title(&title)?;
            update_data.insert("title".to_string(), json!(title.trim()));
        }
        if let Some(description) = request.description {
            update_data.insert("description".to_string(), json!(description));
        }
        if let Some(diagnosis) = request.diagnosis {
            update_data.insert("diagnosis".to_string(), json!(diagnosis));
        }
        if let Some(symptoms) = request.symptoms {
            update_data.insert("symptoms".to_string(), json!(symptoms));
        }
        if let Some(vitals) = request.vitals {
            update_data.insert("vitals".to_string(), vitals);
        }
        if let Some(codes) = request.icd10_codes {
            update_data.insert("icd10_codes".to_string(), json!(self.normalize_codes(&codes)?));
        }
        if let Some(is_confidential) = request.is_confidential {
            update_data.insert("is_confidential".to_string(), json!(is_confidential));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.patch(record_id, Value::Object(update_data), auth_token).await
    }

    pub async fn delete_record(
        &self,
        user: &User,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<(), MedicalRecordError> {
        if !user.is_admin() {
            return Err(MedicalRecordError::Unauthorized);
        }

        // Surface a 404 for unknown ids instead of a silent no-op delete.
        self.fetch_record(record_id, auth_token).await?;

        let _: Value = self.supabase.request(
            Method::DELETE,
            &format!("/rest/v1/medical_records?id=eq.{}", record_id),
            Some(auth_token),
            None,
        ).await?;

        info!("Medical record {} deleted by {}", record_id, user.id);
        Ok(())
    }

    /// Decodes a base64 upload, checking type and size.
    pub fn decode_attachment(upload: &AttachmentUpload) -> Result<Vec<u8>, MedicalRecordError> {
        if upload.file_name.trim().is_empty() {
            return Err(MedicalRecordError::InvalidAttachment("File name is required".to_string()));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
            return Err(MedicalRecordError::InvalidAttachment(format!(
                "Unsupported content type: {}",
                upload.content_type
            )));
        }

        let encoded = match upload.file_data.split_once(";base64,") {
            Some((_, data)) => data,
            None => upload.file_data.as_str(),
        };
        let bytes = BASE64.decode(encoded.trim())
            .map_err(|e| MedicalRecordError::InvalidAttachment(format!("Failed to decode base64 data: {}", e)))?;

        if bytes.is_empty() {
            return Err(MedicalRecordError::InvalidAttachment("File is empty".to_string()));
        }
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(MedicalRecordError::InvalidAttachment("File exceeds the 10 MB limit".to_string()));
        }
        Ok(bytes)
    }

    fn storage_file_name(file_name: &str) -> String {
        file_name
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect()
    }

    #[instrument(skip(self, upload, auth_token), fields(user_id = %user.id))]
    pub async fn add_attachment(
        &self,
        user: &User,
        record_id: Uuid,
        upload: AttachmentUpload,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let record = self.load_visible(user, record_id, auth_token).await?;

        // Patients may attach to their own records; doctors only to their own.
        if user.is_doctor() && !record.is_authored_by(&user.id) {
            return Err(MedicalRecordError::Unauthorized);
        }

        let bytes = Self::decode_attachment(&upload)?;
        let size_bytes = bytes.len();
        let object_path = format!(
            "{}/{}/{}-{}",
            record.patient_id,
            record.id,
            Uuid::new_v4(),
            Self::storage_file_name(&upload.file_name)
        );

        let url = self.supabase
            .upload_object(ATTACHMENT_BUCKET, &object_path, bytes, &upload.content_type, auth_token)
            .await
            .map_err(|e| {
                error!("Attachment upload failed for record {}: {}", record.id, e);
                MedicalRecordError::StorageError(e.to_string())
            })?;

        let mut attachments = record.attachments;
        attachments.push(RecordAttachment {
            file_name: upload.file_name,
            content_type: upload.content_type,
            url,
            size_bytes,
            uploaded_at: Utc::now(),
        });

        let updated = self.patch(
            record_id,
            json!({
                "attachments": attachments,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        ).await?;

        info!("Attachment added to medical record {}", record_id);
        Ok(updated)
    }

    async fn patch(&self, record_id: Uuid, body: Value, auth_token: &str) -> Result<MedicalRecord, MedicalRecordError> {
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/medical_records?id=eq.{}", record_id),
            Some(auth_token),
            Some(body),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(MedicalRecordError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::{MockSupabaseResponses, TestUser};

    fn record(created_by: &str, confidential: bool) -> MedicalRecord {
        serde_json::from_value(MockSupabaseResponses::medical_record_response(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            None,
            created_by,
            confidential,
        ))
        .unwrap()
    }

    #[test]
    fn test_confidential_visibility() {
        let author = TestUser::doctor("author@example.com");
        let other = TestUser::doctor("other@example.com");
        let patient = TestUser::patient("asha@example.com");
        let admin = TestUser::admin("admin@example.com");

        let secret = record(&author.id, true);
        assert!(MedicalRecordService::is_visible_to(&author.to_user(), &secret));
        assert!(!MedicalRecordService::is_visible_to(&other.to_user(), &secret));
        assert!(MedicalRecordService::is_visible_to(&patient.to_user(), &secret));
        assert!(MedicalRecordService::is_visible_to(&admin.to_user(), &secret));

        let open = record(&author.id, false);
        assert!(MedicalRecordService::is_visible_to(&other.to_user(), &open));
    }

    #[test]
    fn test_list_path() {
        let patient_id = Uuid::new_v4();
        let path = MedicalRecordService::list_path(patient_id, &RecordListQuery {
            record_type: Some(crate::models::RecordType::LabReport),
            limit: Some(0),
            ..Default::default()
        });
        assert!(path.contains(&format!("patient_id=eq.{}", patient_id)));
        assert!(path.contains("record_type=eq.lab_report"));
        assert!(path.contains("limit=1"));
    }

    #[test]
    fn test_decode_attachment() {
        let upload = AttachmentUpload {
            file_name: "cbc report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            file_data: format!("data:application/pdf;base64,{}", BASE64.encode(b"%PDF-1.4")),
        };
        assert_eq!(MedicalRecordService::decode_attachment(&upload).unwrap(), b"%PDF-1.4");
        assert_eq!(MedicalRecordService::storage_file_name(&upload.file_name), "cbc_report.pdf");

        let bad_type = AttachmentUpload { content_type: "text/html".to_string(), ..upload.clone() };
        assert!(MedicalRecordService::decode_attachment(&bad_type).is_err());

        let bad_data = AttachmentUpload { file_data: "***".to_string(), ..upload };
        assert!(MedicalRecordService::decode_attachment(&bad_data).is_err());
    }
}
