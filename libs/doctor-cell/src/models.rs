// libs/doctor-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub specialty: String,
    pub qualification: Option<String>,
    pub registration_number: String,
    #[serde(default)]
    pub years_experience: i32,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Rupees per consultation.
    pub consultation_fee: f64,
    pub bio: Option<String>,
    pub is_verified: bool,
    pub is_available: bool,
    pub rating: Option<f64>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("Dr. {} {}", self.first_name, self.last_name)
    }

    pub fn speaks(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Verified and accepting bookings.
    pub fn is_bookable(&self) -> bool {
        self.is_verified && self.is_available
    }

    pub fn consultation_fee_paise(&self) -> i64 {
        (self.consultation_fee * 100.0).round() as i64
    }
}

/// A recurring weekly window. Times are wall-clock in the doctor's timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday .. 6 = Saturday
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorAvailability {
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

/// Start and length of an appointment already holding the doctor's time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedInterval {
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i32,
}

impl BookedInterval {
    pub fn end(&self) -> DateTime<Utc> {
        self.appointment_date + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.appointment_date < end && start < self.end()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorSearchFilters {
    pub specialty: Option<String>,
    pub language: Option<String>,
    pub min_experience: Option<i32>,
    pub max_fee: Option<f64>,
    pub min_rating: Option<f64>,
    pub verified_only: Option<bool>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub specialty: String,
    pub qualification: Option<String>,
    pub registration_number: String,
    #[serde(default)]
    pub years_experience: i32,
    #[serde(default)]
    pub languages: Vec<String>,
    pub consultation_fee: f64,
    pub bio: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub specialty: Option<String>,
    pub qualification: Option<String>,
    pub years_experience: Option<i32>,
    pub languages: Option<Vec<String>>,
    pub consultation_fee: Option<f64>,
    pub bio: Option<String>,
    pub is_available: Option<bool>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyDoctorRequest {
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Availability not found")]
    AvailabilityNotFound,

    #[error("Doctor with {field} {value} already exists")]
    AlreadyExists { field: &'static str, value: String },

    #[error("Availability overlaps an existing window on the same day")]
    OverlappingAvailability,

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Unauthorized access to doctor data")]
    UnauthorizedAccess,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for DoctorError {
    fn from(err: anyhow::Error) -> Self {
        DoctorError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DoctorError {
    fn from(err: serde_json::Error) -> Self {
        DoctorError::DatabaseError(err.to_string())
    }
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::AvailabilityNotFound => AppError::NotFound(err.to_string()),
            DoctorError::AlreadyExists { .. } | DoctorError::OverlappingAvailability => {
                AppError::Conflict(err.to_string())
            }
            DoctorError::InvalidTimezone(_) => AppError::ValidationError(err.to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::UnauthorizedAccess => AppError::Forbidden(err.to_string()),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booked_interval_overlap_is_half_open() {
        let start = "2024-06-03T04:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let booked = BookedInterval { appointment_date: start, duration_minutes: 30 };

        assert!(booked.overlaps(start, start + Duration::minutes(30)));
        assert!(booked.overlaps(start + Duration::minutes(15), start + Duration::minutes(45)));
        assert!(!booked.overlaps(start + Duration::minutes(30), start + Duration::minutes(60)));
        assert!(!booked.overlaps(start - Duration::minutes(30), start));
    }

    #[test]
    fn test_fee_in_paise() {
        let doctor: Doctor = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": "u-1",
            "first_name": "Rohan",
            "last_name": "Mehta",
            "email": "rohan@example.com",
            "phone_number": null,
            "specialty": "General Medicine",
            "qualification": null,
            "registration_number": "MMC-1",
            "languages": ["EN", "hi"],
            "consultation_fee": 499.5,
            "bio": null,
            "is_verified": true,
            "is_available": false,
            "rating": null,
            "timezone": "Asia/Kolkata",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })).unwrap();

        assert_eq!(doctor.consultation_fee_paise(), 49950);
        assert!(doctor.speaks("en"));
        assert!(!doctor.speaks("bn"));
        assert!(!doctor.is_bookable());
        assert_eq!(doctor.years_experience, 0);
    }
}
