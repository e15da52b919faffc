// libs/doctor-cell/src/services/doctor.rs
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use chrono::Utc;

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, DoctorSearchFilters, UpdateDoctorRequest};
use crate::timezone::{is_valid_timezone, DEFAULT_TIMEZONE};

pub const DEFAULT_SEARCH_LIMIT: i32 = 20;
pub const MAX_SEARCH_LIMIT: i32 = 100;

pub struct DoctorService {
    supabase: SupabaseClient,
    access: AccessControlService,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            access: AccessControlService::new(config),
        }
    }

    /// PostgREST path for a doctor search. Unverified and unavailable
    /// doctors are excluded unless `verified_only` is explicitly false.
    pub fn search_path(filters: &DoctorSearchFilters) -> String {
        let mut query_parts = vec!["is_available=eq.true".to_string()];

        if filters.verified_only.unwrap_or(true) {
            query_parts.push("is_verified=eq.true".to_string());
        }
        if let Some(specialty) = filters.specialty.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query_parts.push(format!("specialty=ilike.*{}*", urlencoding::encode(specialty)));
        }
        if let Some(language) = filters.language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            query_parts.push(format!("languages=cs.%7B{}%7D", urlencoding::encode(&language.to_lowercase())));
        }
        if let Some(min_exp) = filters.min_experience {
            query_parts.push(format!("years_experience=gte.{}", min_exp));
        }
        if let Some(max_fee) = filters.max_fee {
            query_parts.push(format!("consultation_fee=lte.{}", max_fee));
        }
        if let Some(min_rating) = filters.min_rating {
            query_parts.push(format!("rating=gte.{}", min_rating));
        }

        let limit = filters.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = filters.offset.unwrap_or(0).max(0);

        format!(
            "/rest/v1/doctors?{}&order=rating.desc.nullslast,years_experience.desc&limit={}&offset={}",
            query_parts.join("&"),
            limit,
            offset
        )
    }

    /// Public directory search, served with the anon key.
    #[instrument(skip(self))]
    pub async fn search_doctors(&self, filters: DoctorSearchFilters) -> Result<Vec<Doctor>, DoctorError> {
        let path = Self::search_path(&filters);
        debug!("Searching doctors: {}", path);

        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }

    pub async fn get_doctor(&self, doctor_id: &str, auth_token: Option<&str>) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let row = self.supabase.fetch_one(&path, auth_token).await?
            .ok_or(DoctorError::NotFound)?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn find_by_user_id(&self, user_id: &str, auth_token: &str) -> Result<Option<Doctor>, DoctorError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}", user_id);
        match self.supabase.fetch_one(&path, Some(auth_token)).await? {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    fn validate_create(request: &CreateDoctorRequest) -> Result<(), DoctorError> {
        let required = [
            ("first_name", &request.first_name),
            ("last_name", &request.last_name),
            ("email", &request.email),
            ("specialty", &request.specialty),
            ("registration_number", &request.registration_number),
            ("user_id", &request.user_id),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(DoctorError::ValidationError(format!("{} is required", field)));
        }
        if !request.email.contains('@') {
            return Err(DoctorError::ValidationError("Invalid email address".to_string()));
        }
        Self::validate_numbers(Some(request.years_experience), Some(request.consultation_fee))?;
        if let Some(timezone) = &request.timezone {
            if !is_valid_timezone(timezone) {
                return Err(DoctorError::InvalidTimezone(timezone.clone()));
            }
        }
        Ok(())
    }

    fn validate_numbers(years: Option<i32>, fee: Option<f64>) -> Result<(), DoctorError> {
        if years.is_some_and(|y| !(0..=70).contains(&y)) {
            return Err(DoctorError::ValidationError("Years of experience must be between 0 and 70".to_string()));
        }
        if fee.is_some_and(|f| !f.is_finite() || f < 0.0) {
            return Err(DoctorError::ValidationError("Consultation fee must be zero or positive".to_string()));
        }
        Ok(())
    }

    async fn ensure_unique(&self, field: &'static str, value: &str, auth_token: &str) -> Result<(), DoctorError> {
        let path = format!("/rest/v1/doctors?{}=eq.{}&select=id", field, urlencoding::encode(value));
        if self.supabase.fetch_one(&path, Some(auth_token)).await?.is_some() {
            return Err(DoctorError::AlreadyExists { field, value: value.to_string() });
        }
        Ok(())
    }

    /// Admin-only onboarding. New doctors start unverified.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_doctor(
        &self,
        user: &User,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        if !user.is_admin() {
            return Err(DoctorError::UnauthorizedAccess);
        }
        Self::validate_create(&request)?;

        let email = request.email.trim().to_lowercase();
        self.ensure_unique("email", &email, auth_token).await?;
        self.ensure_unique("registration_number", request.registration_number.trim(), auth_token).await?;

        let languages: Vec<String> = if request.languages.is_empty() {
            vec!["en".to_string()]
        } else {
            request.languages.iter().map(|l| l.to_lowercase()).collect()
        };

        let now = Utc::now().to_rfc3339();
        let doctor_data = json!({
            "user_id": request.user_id,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
            "email": email,
            "phone_number": request.phone_number,
            "specialty": request.specialty.trim(),
            "qualification": request.qualification,
            "registration_number": request.registration_number.trim(),
            "years_experience": request.years_experience,
            "languages": languages,
            "consultation_fee": request.consultation_fee,
            "bio": request.bio,
            "is_verified": false,
            "is_available": true,
            "rating": null,
            "timezone": request.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/doctors",
            Some(auth_token),
            Some(doctor_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| DoctorError::DatabaseError("Failed to create doctor profile".to_string()))?;
        let doctor: Doctor = serde_json::from_value(row)?;

        info!("Doctor profile created with ID: {}", doctor.id);
        Ok(doctor)
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn update_doctor(
        &self,
        user: &User,
        doctor_id: &str,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        if !self.access.is_doctor_owner(user, doctor_id, auth_token).await? {
            return Err(DoctorError::UnauthorizedAccess);
        }

        Self::validate_numbers(request.years_experience, request.consultation_fee)?;
        if let Some(timezone) = &request.timezone {
            if !is_valid_timezone(timezone) {
                return Err(DoctorError::InvalidTimezone(timezone.clone()));
            }
        }

        let mut update_data = serde_json::Map::new();

        if let Some(first_name) = request.first_name {
            update_data.insert("first_name".to_string(), json!(first_name.trim()));
        }
        if let Some(last_name) = request.last_name {
            update_data.insert("last_name".to_string(), json!(last_name.trim()));
        }
        if let Some(phone_number) = request.phone_number {
            update_data.insert("phone_number".to_string(), json!(phone_number));
        }
        if let Some(specialty) = request.specialty {
            update_data.insert("specialty".to_string(), json!(specialty.trim()));
        }
        if let Some(qualification) = request.qualification {
            update_data.insert("qualification".to_string(), json!(qualification));
        }
        if let Some(years) = request.years_experience {
            update_data.insert("years_experience".to_string(), json!(years));
        }
        if let Some(languages) = request.languages {
            let languages: Vec<String> = languages.iter().map(|l| l.to_lowercase()).collect();
            update_data.insert("languages".to_string(), json!(languages));
        }
        if let Some(fee) = request.consultation_fee {
            update_data.insert("consultation_fee".to_string(), json!(fee));
        }
        if let Some(bio) = request.bio {
            update_data.insert("bio".to_string(), json!(bio));
        }
        if let Some(is_available) = request.is_available {
            update_data.insert("is_available".to_string(), json!(is_available));
        }
        if let Some(timezone) = request.timezone {
            update_data.insert("timezone".to_string(), json!(timezone));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.patch_doctor(doctor_id, Value::Object(update_data), auth_token).await
    }

    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn verify_doctor(
        &self,
        user: &User,
        doctor_id: &str,
        is_verified: bool,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        if !user.is_admin() {
            return Err(DoctorError::UnauthorizedAccess);
        }

        let doctor = self.patch_doctor(
            doctor_id,
            json!({
                "is_verified": is_verified,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        ).await?;

        info!("Doctor {} verification set to {}", doctor_id, is_verified);
        Ok(doctor)
    }

    async fn patch_doctor(&self, doctor_id: &str, body: Value, auth_token: &str) -> Result<Doctor, DoctorError> {
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/doctors?id=eq.{}", doctor_id),
            Some(auth_token),
            Some(body),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_search_defaults_to_verified() {
        let path = DoctorService::search_path(&DoctorSearchFilters::default());
        assert!(path.contains("is_verified=eq.true"));
        assert!(path.contains("is_available=eq.true"));
        assert!(path.contains("limit=20"));
    }

    #[test]
    fn test_search_filters() {
        let path = DoctorService::search_path(&DoctorSearchFilters {
            specialty: Some("Derma tology".to_string()),
            language: Some("HI".to_string()),
            min_experience: Some(5),
            max_fee: Some(800.0),
            min_rating: Some(4.0),
            verified_only: Some(false),
            limit: Some(1000),
            offset: Some(-3),
        });

        assert!(!path.contains("is_verified"));
        assert!(path.contains("specialty=ilike.*Derma%20tology*"));
        assert!(path.contains("languages=cs.%7Bhi%7D"));
        assert!(path.contains("years_experience=gte.5"));
        assert!(path.contains("consultation_fee=lte.800"));
        assert!(path.contains("rating=gte.4"));
        assert!(path.contains("limit=100"));
        assert!(path.contains("offset=0"));
    }

    #[test]
    fn test_validate_numbers() {
        assert!(DoctorService::validate_numbers(Some(10), Some(500.0)).is_ok());
        assert!(DoctorService::validate_numbers(Some(-1), None).is_err());
        assert!(DoctorService::validate_numbers(None, Some(-5.0)).is_err());
        assert!(DoctorService::validate_numbers(None, Some(f64::NAN)).is_err());
    }
}
