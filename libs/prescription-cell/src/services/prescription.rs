// libs/prescription-cell/src/services/prescription.rs
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    CancelPrescriptionRequest, CreatePrescriptionRequest, PrescribedMedication, Prescription,
    PrescriptionError, PrescriptionListQuery, PrescriptionStatus,
};

pub const MAX_DURATION_DAYS: i32 = 365;
const MAX_MEDICATIONS: usize = 20;

/// Appointment statuses during or after which a prescription may be issued.
const PRESCRIBABLE_STATUSES: [&str; 2] = ["in_progress", "completed"];

/// The slice of an appointment row prescriptions care about.
#[derive(Debug, Deserialize)]
struct AppointmentRef {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    status: String,
}

pub struct PrescriptionService {
    supabase: SupabaseClient,
    access: AccessControlService,
}

impl PrescriptionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            access: AccessControlService::new(config),
        }
    }

    pub fn validate_medications(medications: &[PrescribedMedication]) -> Result<(), PrescriptionError> {
        if medications.is_empty() {
            return Err(PrescriptionError::ValidationError(
                "At least one medication is required".to_string(),
            ));
        }
        if medications.len() > MAX_MEDICATIONS {
            return Err(PrescriptionError::ValidationError(format!(
                "A prescription can list at most {} medications",
                MAX_MEDICATIONS
            )));
        }

        for (index, medication) in medications.iter().enumerate() {
            let line = index + 1;
            for (field, value) in [
                ("name", &medication.name),
                ("dosage", &medication.dosage),
                ("frequency", &medication.frequency),
            ] {
                if value.trim().is_empty() {
                    return Err(PrescriptionError::ValidationError(format!(
                        "Medication {} is missing {}",
                        line, field
                    )));
                }
            }
            if !(1..=MAX_DURATION_DAYS).contains(&medication.duration_days) {
                return Err(PrescriptionError::ValidationError(format!(
                    "Medication {} duration must be between 1 and {} days",
                    line, MAX_DURATION_DAYS
                )));
            }
        }
        Ok(())
    }

    /// Valid until the longest course finishes.
    pub fn valid_until(issued_at: DateTime<Utc>, medications: &[PrescribedMedication]) -> DateTime<Utc> {
        let days = medications.iter().map(|m| m.duration_days).max().unwrap_or(0);
        issued_at + Duration::days(days as i64)
    }

    async fn fetch_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<AppointmentRef, PrescriptionError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,patient_id,doctor_id,status",
            appointment_id
        );
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(PrescriptionError::AppointmentNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn is_issuing_doctor(&self, user: &User, doctor_id: Uuid, auth_token: &str) -> Result<bool, PrescriptionError> {
        if !user.is_doctor() {
            return Ok(false);
        }
        let own = self.access.doctor_id_for_user(&user.id, auth_token).await?;
        Ok(own.as_deref() == Some(doctor_id.to_string().as_str()))
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_prescription(
        &self,
        user: &User,
        request: CreatePrescriptionRequest,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        if !user.is_doctor() {
            return Err(PrescriptionError::Unauthorized);
        }
        Self::validate_medications(&request.medications)?;

        let appointment = self.fetch_appointment(request.appointment_id, auth_token).await?;
        if !self.is_issuing_doctor(user, appointment.doctor_id, auth_token).await? {
            warn!("Doctor {} tried to prescribe for appointment {}", user.id, appointment.id);
            return Err(PrescriptionError::Unauthorized);
        }
        if !PRESCRIBABLE_STATUSES.contains(&appointment.status.as_str()) {
            return Err(PrescriptionError::AppointmentNotStarted);
        }

        let issued_at = Utc::now();
        let prescription_data = json!({
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "appointment_id": appointment.id,
            "diagnosis": request.diagnosis,
            "medications": request.medications,
            "notes": request.notes,
            "status": PrescriptionStatus::Active,
            "issued_at": issued_at.to_rfc3339(),
            "valid_until": Self::valid_until(issued_at, &request.medications).to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/prescriptions",
            Some(auth_token),
            Some(prescription_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| PrescriptionError::DatabaseError("Failed to create prescription".to_string()))?;
        let prescription: Prescription = serde_json::from_value(row)?;

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
            Some(auth_token),
            Some(json!({
                "prescription_issued": true,
                "updated_at": Utc::now().to_rfc3339()
            })),
        ).await?;

        info!("Prescription {} issued for appointment {}", prescription.id, appointment.id);
        Ok(prescription)
    }

    async fn fetch_prescription(&self, prescription_id: Uuid, auth_token: &str) -> Result<Prescription, PrescriptionError> {
        let path = format!("/rest/v1/prescriptions?id=eq.{}", prescription_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(PrescriptionError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn get_prescription(
        &self,
        user: &User,
        prescription_id: Uuid,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        debug!("Fetching prescription {}", prescription_id);

        let prescription = self.fetch_prescription(prescription_id, auth_token).await?;
        if !self.access.can_access_patient(user, &prescription.patient_id.to_string(), auth_token).await? {
            return Err(PrescriptionError::Unauthorized);
        }
        Ok(prescription.with_effective_status(Utc::now()))
    }

    pub async fn list_patient_prescriptions(
        &self,
        user: &User,
        patient_id: Uuid,
        query: PrescriptionListQuery,
        auth_token: &str,
    ) -> Result<Vec<Prescription>, PrescriptionError> {
        if !self.access.can_access_patient(user, &patient_id.to_string(), auth_token).await? {
            return Err(PrescriptionError::Unauthorized);
        }

        let path = format!("/rest/v1/prescriptions?patient_id=eq.{}&order=issued_at.desc", patient_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        let now = Utc::now();
        let prescriptions = rows
            .into_iter()
            .map(|row| serde_json::from_value::<Prescription>(row).map(|p| p.with_effective_status(now)))
            .collect::<Result<Vec<_>, _>>()?;

        // Expiry is derived, so the status filter runs after it is applied.
        Ok(match query.status {
            Some(status) => prescriptions.into_iter().filter(|p| p.status == status).collect(),
            None => prescriptions,
        })
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn cancel_prescription(
        &self,
        user: &User,
        prescription_id: Uuid,
        request: CancelPrescriptionRequest,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        let prescription = self.fetch_prescription(prescription_id, auth_token).await?;

        if !user.is_admin() && !self.is_issuing_doctor(user, prescription.doctor_id, auth_token).await? {
            return Err(PrescriptionError::Unauthorized);
        }
        if prescription.effective_status(Utc::now()) != PrescriptionStatus::Active {
            return Err(PrescriptionError::InvalidStatus(PrescriptionStatus::Active));
        }

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(PrescriptionStatus::Cancelled));
        if let Some(reason) = request.reason {
            let notes = match prescription.notes {
                Some(existing) => format!("{}\nCancelled: {}", existing, reason),
                None => format!("Cancelled: {}", reason),
            };
            update_data.insert("notes".to_string(), json!(notes));
        }

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/prescriptions?id=eq.{}", prescription_id),
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(PrescriptionError::NotFound)?;
        info!("Prescription {} cancelled", prescription_id);
        Ok(serde_json::from_value(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn medication(name: &str, days: i32) -> PrescribedMedication {
        PrescribedMedication {
            name: name.to_string(),
            dosage: "500 mg".to_string(),
            frequency: "Twice a day".to_string(),
            duration_days: days,
            route: Some("oral".to_string()),
            instructions: None,
        }
    }

    #[test]
    fn test_medication_validation() {
        assert!(PrescriptionService::validate_medications(&[medication("Paracetamol", 5)]).is_ok());
        assert_matches!(
            PrescriptionService::validate_medications(&[]),
            Err(PrescriptionError::ValidationError(_))
        );
        assert_matches!(
            PrescriptionService::validate_medications(&[medication("Amoxicillin", 0)]),
            Err(PrescriptionError::ValidationError(ref m)) if m.contains("duration")
        );
        assert_matches!(
            PrescriptionService::validate_medications(&[medication("Amoxicillin", 366)]),
            Err(PrescriptionError::ValidationError(_))
        );

        let mut blank = medication("Cetirizine", 3);
        blank.frequency = "  ".to_string();
        assert_matches!(
            PrescriptionService::validate_medications(&[medication("Paracetamol", 5), blank]),
            Err(PrescriptionError::ValidationError(ref m)) if m.contains("Medication 2 is missing frequency")
        );
    }

    #[test]
    fn test_valid_until_uses_longest_course() {
        let issued: DateTime<Utc> = "2024-06-01T10:00:00Z".parse().unwrap();
        let until = PrescriptionService::valid_until(
            issued,
            &[medication("Paracetamol", 5), medication("Metformin", 30)],
        );
        assert_eq!(until, issued + Duration::days(30));
    }
}
