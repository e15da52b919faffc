// libs/prescription-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_id: Uuid,
    pub diagnosis: Option<String>,
    pub medications: Vec<PrescribedMedication>,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl Prescription {
    /// Stored status with expiry applied: an active prescription past
    /// `valid_until` reports as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PrescriptionStatus {
        if self.status == PrescriptionStatus::Active && now > self.valid_until {
            PrescriptionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn with_effective_status(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrescribedMedication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: i32,
    pub route: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrescriptionStatus::Active => write!(f, "active"),
            PrescriptionStatus::Completed => write!(f, "completed"),
            PrescriptionStatus::Cancelled => write!(f, "cancelled"),
            PrescriptionStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: Uuid,
    pub diagnosis: Option<String>,
    pub medications: Vec<PrescribedMedication>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelPrescriptionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrescriptionListQuery {
    pub status: Option<PrescriptionStatus>,
}

#[derive(Debug, thiserror::Error)]
pub enum PrescriptionError {
    #[error("Prescription not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Prescriptions can only be issued during or after a consultation")]
    AppointmentNotStarted,

    #[error("Only {0} prescriptions can be cancelled")]
    InvalidStatus(PrescriptionStatus),

    #[error("Not authorized to access this prescription")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for PrescriptionError {
    fn from(err: anyhow::Error) -> Self {
        PrescriptionError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for PrescriptionError {
    fn from(err: serde_json::Error) -> Self {
        PrescriptionError::DatabaseError(err.to_string())
    }
}

impl From<PrescriptionError> for AppError {
    fn from(err: PrescriptionError) -> Self {
        match err {
            PrescriptionError::NotFound | PrescriptionError::AppointmentNotFound => {
                AppError::NotFound(err.to_string())
            }
            PrescriptionError::AppointmentNotStarted | PrescriptionError::InvalidStatus(_) => {
                AppError::BadRequest(err.to_string())
            }
            PrescriptionError::Unauthorized => AppError::Forbidden(err.to_string()),
            PrescriptionError::ValidationError(msg) => AppError::ValidationError(msg),
            PrescriptionError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared_utils::test_utils::MockSupabaseResponses;

    fn prescription(status: &str, valid_until: DateTime<Utc>) -> Prescription {
        serde_json::from_value(MockSupabaseResponses::prescription_response(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            status,
            valid_until,
        ))
        .unwrap()
    }

    #[test]
    fn test_effective_status() {
        let now = Utc::now();

        assert_eq!(
            prescription("active", now - Duration::days(1)).effective_status(now),
            PrescriptionStatus::Expired
        );
        assert_eq!(
            prescription("active", now + Duration::days(1)).effective_status(now),
            PrescriptionStatus::Active
        );
        assert_eq!(
            prescription("cancelled", now - Duration::days(1)).effective_status(now),
            PrescriptionStatus::Cancelled
        );
    }

    #[test]
    fn test_expired_is_reported_in_place() {
        let now = Utc::now();
        let p = prescription("active", now - Duration::hours(1)).with_effective_status(now);
        assert_eq!(serde_json::to_value(&p).unwrap()["status"], "expired");
    }
}
