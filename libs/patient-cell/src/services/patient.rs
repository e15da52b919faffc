// libs/patient-cell/src/services/patient.rs
use chrono::Utc;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;

use crate::models::{CreatePatientRequest, Patient, PatientError, PatientSearchQuery, UpdatePatientRequest};

pub const DEFAULT_SEARCH_LIMIT: i32 = 50;
pub const MAX_SEARCH_LIMIT: i32 = 100;

const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

pub struct PatientService {
    supabase: SupabaseClient,
    access: AccessControlService,
    email_pattern: Regex,
    phone_pattern: Regex,
    pincode_pattern: Regex,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            access: AccessControlService::new(config),
            email_pattern: Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
                .expect("email pattern is valid"),
            phone_pattern: Regex::new(r"^\+?[0-9]{10,15}$").expect("phone pattern is valid"),
            pincode_pattern: Regex::new(r"^[1-9][0-9]{5}$").expect("pincode pattern is valid"),
        }
    }

    fn validate_email(&self, email: &str) -> Result<(), PatientError> {
        if self.email_pattern.is_match(email) {
            Ok(())
        } else {
            Err(PatientError::ValidationError(format!("Invalid email address: {}", email)))
        }
    }

    /// Accepts spaces and dashes as separators.
    fn validate_phone(&self, phone: &str) -> Result<(), PatientError> {
        let compact: String = phone.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
        if self.phone_pattern.is_match(&compact) {
            Ok(())
        } else {
            Err(PatientError::ValidationError(format!("Invalid phone number: {}", phone)))
        }
    }

    fn validate_pincode(&self, pincode: &str) -> Result<(), PatientError> {
        if self.pincode_pattern.is_match(pincode) {
            Ok(())
        } else {
            Err(PatientError::ValidationError(format!("Invalid pincode: {}", pincode)))
        }
    }

    fn validate_blood_group(blood_group: &str) -> Result<(), PatientError> {
        if BLOOD_GROUPS.contains(&blood_group) {
            Ok(())
        } else {
            Err(PatientError::ValidationError(format!("Invalid blood group: {}", blood_group)))
        }
    }

    pub fn validate_create(&self, request: &CreatePatientRequest) -> Result<(), PatientError> {
        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(PatientError::ValidationError("First and last name are required".to_string()));
        }
        self.validate_email(&request.email)?;
        self.validate_phone(&request.phone_number)?;

        if request.date_of_birth > Utc::now().date_naive() {
            return Err(PatientError::InvalidDateOfBirth);
        }
        if let Some(pincode) = &request.pincode {
            self.validate_pincode(pincode)?;
        }
        if let Some(blood_group) = &request.blood_group {
            Self::validate_blood_group(blood_group)?;
        }
        if let Some(phone) = &request.emergency_contact_phone {
            self.validate_phone(phone)?;
        }
        Ok(())
    }

    pub fn validate_update(&self, request: &UpdatePatientRequest) -> Result<(), PatientError> {
        for name in [&request.first_name, &request.last_name].into_iter().flatten() {
            if name.trim().is_empty() {
                return Err(PatientError::ValidationError("Name cannot be empty".to_string()));
            }
        }
        if let Some(phone) = &request.phone_number {
            self.validate_phone(phone)?;
        }
        if let Some(pincode) = &request.pincode {
            self.validate_pincode(pincode)?;
        }
        if let Some(blood_group) = &request.blood_group {
            Self::validate_blood_group(blood_group)?;
        }
        if let Some(phone) = &request.emergency_contact_phone {
            self.validate_phone(phone)?;
        }
        Ok(())
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_patient(
        &self,
        user: &User,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Creating patient profile for: {}", request.email);
        self.validate_create(&request)?;

        let user_id = match (&request.user_id, user.is_admin()) {
            (Some(user_id), true) => user_id.clone(),
            _ => user.id.clone(),
        };

        if self.find_by_user_id(&user_id, auth_token).await?.is_some() {
            return Err(PatientError::ProfileAlreadyExists);
        }

        let email = request.email.trim().to_lowercase();
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?email=eq.{}&select=id", urlencoding::encode(&email)),
            Some(auth_token),
            None,
        ).await?;

        if !existing.is_empty() {
            return Err(PatientError::EmailAlreadyExists { email });
        }

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "user_id": user_id,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
            "email": email,
            "phone_number": request.phone_number,
            "date_of_birth": request.date_of_birth.format("%Y-%m-%d").to_string(),
            "gender": request.gender,
            "address": request.address,
            "city": request.city,
            "state": request.state,
            "pincode": request.pincode,
            "blood_group": request.blood_group,
            "preferred_language": request.preferred_language,
            "allergies": request.allergies,
            "chronic_conditions": request.chronic_conditions,
            "current_medications": request.current_medications,
            "emergency_contact_name": request.emergency_contact_name,
            "emergency_contact_phone": request.emergency_contact_phone,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(patient_data),
            Some(return_representation()),
        ).await?;

        let patient = Self::first_patient(result)?
            .ok_or_else(|| PatientError::DatabaseError("Failed to create patient profile".to_string()))?;

        info!("Patient profile created with ID: {}", patient.id);
        Ok(patient)
    }

    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn get_patient(
        &self,
        user: &User,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);

        let allowed = self.access.can_access_patient(user, patient_id, auth_token).await?;
        if !allowed {
            return Err(PatientError::Unauthorized);
        }

        self.fetch_patient(patient_id, auth_token).await
    }

    async fn fetch_patient(&self, patient_id: &str, auth_token: &str) -> Result<Patient, PatientError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?id=eq.{}", patient_id),
            Some(auth_token),
            None,
        ).await?;

        Self::first_patient(result)?.ok_or(PatientError::NotFound)
    }

    pub async fn find_by_user_id(&self, user_id: &str, auth_token: &str) -> Result<Option<Patient>, PatientError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?user_id=eq.{}", user_id),
            Some(auth_token),
            None,
        ).await?;

        Self::first_patient(result)
    }

    pub async fn get_profile(&self, user: &User, auth_token: &str) -> Result<Patient, PatientError> {
        self.find_by_user_id(&user.id, auth_token)
            .await?
            .ok_or(PatientError::NotFound)
    }

    /// Demographic edits belong to the patient themself or an admin.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn update_patient(
        &self,
        user: &User,
        patient_id: &str,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient profile: {}", patient_id);
        self.validate_update(&request)?;

        if !user.is_admin() {
            let own = self.access.patient_id_for_user(&user.id, auth_token).await?;
            if own.as_deref() != Some(patient_id) {
                return Err(PatientError::Unauthorized);
            }
        }

        let mut update_data = serde_json::Map::new();
        let mut set = |key: &str, value: Value| {
            update_data.insert(key.to_string(), value);
        };

        if let Some(v) = request.first_name { set("first_name", json!(v.trim())); }
        if let Some(v) = request.last_name { set("last_name", json!(v.trim())); }
        if let Some(v) = request.phone_number { set("phone_number", json!(v)); }
        if let Some(v) = request.gender { set("gender", json!(v)); }
        if let Some(v) = request.address { set("address", json!(v)); }
        if let Some(v) = request.city { set("city", json!(v)); }
        if let Some(v) = request.state { set("state", json!(v)); }
        if let Some(v) = request.pincode { set("pincode", json!(v)); }
        if let Some(v) = request.blood_group { set("blood_group", json!(v)); }
        if let Some(v) = request.preferred_language { set("preferred_language", json!(v)); }
        if let Some(v) = request.allergies { set("allergies", json!(v)); }
        if let Some(v) = request.chronic_conditions { set("chronic_conditions", json!(v)); }
        if let Some(v) = request.current_medications { set("current_medications", json!(v)); }
        if let Some(v) = request.emergency_contact_name { set("emergency_contact_name", json!(v)); }
        if let Some(v) = request.emergency_contact_phone { set("emergency_contact_phone", json!(v)); }
        set("updated_at", json!(Utc::now().to_rfc3339()));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/patients?id=eq.{}", patient_id),
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(return_representation()),
        ).await?;

        let patient = Self::first_patient(result)?.ok_or(PatientError::NotFound)?;
        info!("Patient profile {} updated", patient.id);
        Ok(patient)
    }

    pub fn search_path(query: &PatientSearchQuery) -> String {
        let mut query_parts = vec![];

        if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let name = urlencoding::encode(name);
            query_parts.push(format!("or=(first_name.ilike.*{}*,last_name.ilike.*{}*)", name, name));
        }
        if let Some(email) = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            query_parts.push(format!("email=ilike.*{}*", urlencoding::encode(email)));
        }
        if let Some(phone) = query.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            query_parts.push(format!("phone_number=ilike.*{}*", urlencoding::encode(phone)));
        }

        let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        query_parts.push("order=last_name.asc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        format!("/rest/v1/patients?{}", query_parts.join("&"))
    }

    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn search_patients(
        &self,
        user: &User,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        if !(user.is_doctor() || user.is_admin()) {
            return Err(PatientError::Unauthorized);
        }

        let path = Self::search_path(&query);
        debug!("Searching patients: {}", path);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string())))
            .collect()
    }

    fn first_patient(rows: Vec<Value>) -> Result<Option<Patient>, PatientError> {
        rows.into_iter()
            .next()
            .map(|row| serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string())))
            .transpose()
    }
}
