// libs/patient-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub blood_group: Option<String>,
    pub preferred_language: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn age_on(&self, today: NaiveDate) -> i32 {
        today.years_since(self.date_of_birth).unwrap_or(0) as i32
    }

    pub fn age(&self) -> i32 {
        self.age_on(Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    /// Only honoured for admins registering a patient on someone's behalf.
    pub user_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub blood_group: Option<String>,
    pub preferred_language: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub blood_group: Option<String>,
    pub preferred_language: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub chronic_conditions: Option<Vec<String>>,
    pub current_medications: Option<Vec<String>>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Patient with email {email} already exists")]
    EmailAlreadyExists { email: String },

    #[error("A patient profile already exists for this account")]
    ProfileAlreadyExists,

    #[error("Invalid date of birth")]
    InvalidDateOfBirth,

    #[error("Not authorized to access this patient")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for PatientError {
    fn from(err: anyhow::Error) -> Self {
        PatientError::DatabaseError(err.to_string())
    }
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => AppError::NotFound(err.to_string()),
            PatientError::EmailAlreadyExists { .. } | PatientError::ProfileAlreadyExists => {
                AppError::Conflict(err.to_string())
            }
            PatientError::InvalidDateOfBirth => AppError::ValidationError(err.to_string()),
            PatientError::ValidationError(msg) => AppError::ValidationError(msg),
            PatientError::Unauthorized => AppError::Forbidden(err.to_string()),
            PatientError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_counts_completed_years() {
        let patient: Patient = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": "user-1",
            "first_name": "Asha",
            "last_name": "Verma",
            "email": "asha@example.com",
            "phone_number": "+919812345678",
            "date_of_birth": "1990-05-14",
            "gender": null,
            "address": null,
            "city": null,
            "state": null,
            "pincode": null,
            "blood_group": null,
            "preferred_language": null,
            "emergency_contact_name": null,
            "emergency_contact_phone": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })).unwrap();

        assert_eq!(patient.full_name(), "Asha Verma");
        assert!(patient.allergies.is_empty());
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2024, 5, 13).unwrap()), 33);
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()), 34);
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = PatientError::EmailAlreadyExists { email: "a@b.co".into() }.into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = PatientError::Unauthorized.into();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err: AppError = PatientError::NotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
