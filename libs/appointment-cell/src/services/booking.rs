// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use auth_cell::AccessControlService;
use doctor_cell::models::DoctorError;
use doctor_cell::services::DoctorService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::{User, UserRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, BookAppointmentRequest,
    CancelAppointmentRequest, ConflictCheckRequest, ConflictCheckResponse, PaymentStatus,
    RescheduleAppointmentRequest, UpdateAppointmentStatusRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{appointment_end, AppointmentLifecycleService};

pub const DEFAULT_DURATION_MINUTES: i32 = 30;
pub const DEFAULT_SEARCH_LIMIT: i32 = 50;
pub const MAX_SEARCH_LIMIT: i32 = 100;
const UPCOMING_LIMIT: i32 = 20;

/// Whose appointments the caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerScope {
    Admin,
    Patient(Uuid),
    Doctor(Uuid),
}

impl CallerScope {
    pub fn can_see(&self, appointment: &Appointment) -> bool {
        match self {
            CallerScope::Admin => true,
            CallerScope::Patient(id) => appointment.patient_id == *id,
            CallerScope::Doctor(id) => appointment.doctor_id == *id,
        }
    }
}

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    access: AccessControlService,
    doctors: DoctorService,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            access: AccessControlService::new(config),
            doctors: DoctorService::new(config),
            supabase,
        }
    }

    /// Resolves the caller's patient or doctor row.
    pub async fn caller_scope(&self, user: &User, auth_token: &str) -> Result<CallerScope, AppointmentError> {
        let own_id = match user.app_role() {
            Some(UserRole::Admin) => return Ok(CallerScope::Admin),
            Some(UserRole::Patient) => self.access.patient_id_for_user(&user.id, auth_token).await?
                .map(|id| parse_uuid(&id).map(CallerScope::Patient)),
            Some(UserRole::Doctor) => self.access.doctor_id_for_user(&user.id, auth_token).await?
                .map(|id| parse_uuid(&id).map(CallerScope::Doctor)),
            None => None,
        };

        own_id.unwrap_or(Err(AppointmentError::Unauthorized))
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn book_appointment(
        &self,
        user: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = match self.caller_scope(user, auth_token).await {
            Ok(CallerScope::Patient(id)) => id,
            Ok(CallerScope::Admin) => request.patient_id.ok_or_else(|| {
                AppointmentError::ValidationError("patient_id is required when booking as admin".to_string())
            })?,
            Ok(CallerScope::Doctor(_)) => return Err(AppointmentError::Unauthorized),
            Err(AppointmentError::Unauthorized) if user.is_patient() => {
                return Err(AppointmentError::PatientNotFound)
            }
            Err(e) => return Err(e),
        };

        let duration = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        let start = request.appointment_date;
        self.lifecycle_service.validate_appointment_timing(start, duration, Utc::now())?;

        let doctor = match self.doctors.get_doctor(&request.doctor_id.to_string(), Some(auth_token)).await {
            Ok(doctor) => doctor,
            Err(DoctorError::NotFound) => return Err(AppointmentError::DoctorNotFound),
            Err(e) => return Err(AppointmentError::DatabaseError(e.to_string())),
        };
        if !doctor.is_bookable() {
            return Err(AppointmentError::DoctorNotAvailable);
        }

        let end = appointment_end(start, duration)?;
        let conflicts = self.conflict_service.check_conflicts(doctor.id, start, end, None).await?;
        if conflicts.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let now = Utc::now().to_rfc3339();
        let payment_status = if doctor.consultation_fee_paise() == 0 {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        };

        let appointment_data = json!({
            "patient_id": patient_id,
            "doctor_id": doctor.id,
            "appointment_date": start.to_rfc3339(),
            "duration_minutes": duration,
            "status": AppointmentStatus::Pending,
            "appointment_type": request.appointment_type.unwrap_or_default(),
            "consultation_mode": request.consultation_mode.unwrap_or_default(),
            "reason": request.reason,
            "patient_notes": request.patient_notes,
            "doctor_notes": null,
            "cancellation_reason": null,
            "payment_status": payment_status,
            "prescription_issued": false,
            "video_session_id": null,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;
        let appointment: Appointment = serde_json::from_value(row)?;

        info!("Appointment {} booked with doctor {} at {}", appointment.id, doctor.id, start);
        Ok(appointment)
    }

    async fn fetch_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(AppointmentError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Loads an appointment the caller participates in.
    async fn load_for_caller(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(Appointment, CallerScope), AppointmentError> {
        let scope = self.caller_scope(user, auth_token).await?;
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;

        if !scope.can_see(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Ok((appointment, scope))
    }

    pub async fn get_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);
        self.load_for_caller(user, appointment_id, auth_token).await.map(|(a, _)| a)
    }

    pub fn search_path(scope: &CallerScope, query: &AppointmentSearchQuery) -> String {
        let mut query_parts = vec![];

        let (patient_id, doctor_id) = match scope {
            CallerScope::Admin => (query.patient_id, query.doctor_id),
            CallerScope::Patient(id) => (Some(*id), query.doctor_id),
            CallerScope::Doctor(id) => (query.patient_id, Some(*id)),
        };

        if let Some(patient_id) = patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.from_date {
            query_parts.push(format!("appointment_date=gte.{}", from.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(to) = query.to_date {
            query_parts.push(format!("appointment_date=lte.{}", to.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        query_parts.push("order=appointment_date.desc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        format!("/rest/v1/appointments?{}", query_parts.join("&"))
    }

    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn search_appointments(
        &self,
        user: &User,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let scope = self.caller_scope(user, auth_token).await?;
        self.list(&Self::search_path(&scope, &query), auth_token).await
    }

    pub async fn get_upcoming_appointments(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let scope = self.caller_scope(user, auth_token).await?;

        let owner_filter = match scope {
            CallerScope::Patient(id) => format!("patient_id=eq.{}&", id),
            CallerScope::Doctor(id) => format!("doctor_id=eq.{}&", id),
            CallerScope::Admin => String::new(),
        };
        let path = format!(
            "/rest/v1/appointments?{}status=in.({})&appointment_date=gte.{}&order=appointment_date.asc&limit={}",
            owner_filter,
            AppointmentStatus::active_filter(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            UPCOMING_LIMIT,
        );

        self.list(&path, auth_token).await
    }

    async fn list(&self, path: &str, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    /// Clinical status changes. Cancellation and rescheduling have their own
    /// operations because they carry extra rules.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn update_status(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: UpdateAppointmentStatusRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let (appointment, scope) = self.load_for_caller(user, appointment_id, auth_token).await?;
        let new_status = request.status;

        if matches!(new_status, AppointmentStatus::Cancelled | AppointmentStatus::Rescheduled) {
            return Err(AppointmentError::ValidationError(format!(
                "Use the {} endpoint for this change",
                if new_status == AppointmentStatus::Cancelled { "cancel" } else { "reschedule" }
            )));
        }
        if matches!(scope, CallerScope::Patient(_)) {
            return Err(AppointmentError::Unauthorized);
        }

        self.lifecycle_service.validate_status_transition(appointment.status, new_status)?;

        let now = Utc::now();
        match new_status {
            AppointmentStatus::InProgress
                if !self.lifecycle_service.can_start_appointment(appointment.status, appointment.appointment_date, now) =>
            {
                return Err(AppointmentError::InvalidTime(
                    "Consultation can start from 15 minutes before to 30 minutes after the scheduled time".to_string(),
                ));
            }
            AppointmentStatus::NoShow
                if !self.lifecycle_service.should_mark_no_show(appointment.status, appointment.appointment_date, now) =>
            {
                return Err(AppointmentError::InvalidTime(
                    "No-show can only be recorded 30 minutes after the scheduled start".to_string(),
                ));
            }
            _ => {}
        }

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(new_status));
        if let Some(notes) = request.doctor_notes {
            update_data.insert("doctor_notes".to_string(), json!(notes));
        }
        update_data.insert("updated_at".to_string(), json!(now.to_rfc3339()));

        let updated = self.patch(appointment_id, Value::Object(update_data), auth_token).await?;
        info!("Appointment {} moved {} -> {}", appointment_id, appointment.status, new_status);
        Ok(updated)
    }

    /// Moves the appointment to a new time. A confirmed booking becomes
    /// `rescheduled` and needs confirming again; pending and already
    /// rescheduled bookings keep their status.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn reschedule_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let (appointment, _) = self.load_for_caller(user, appointment_id, auth_token).await?;

        let new_status = match appointment.status {
            AppointmentStatus::Pending | AppointmentStatus::Rescheduled => appointment.status,
            current => {
                self.lifecycle_service
                    .validate_status_transition(current, AppointmentStatus::Rescheduled)?;
                AppointmentStatus::Rescheduled
            }
        };

        let duration = request.duration_minutes.unwrap_or(appointment.duration_minutes);
        let start = request.new_start_time;
        self.lifecycle_service.validate_appointment_timing(start, duration, Utc::now())?;

        let end = appointment_end(start, duration)?;
        let conflicts = self.conflict_service
            .check_conflicts(appointment.doctor_id, start, end, Some(appointment.id))
            .await?;
        if conflicts.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let mut update_data = serde_json::Map::new();
        update_data.insert("appointment_date".to_string(), json!(start.to_rfc3339()));
        update_data.insert("duration_minutes".to_string(), json!(duration));
        update_data.insert("status".to_string(), json!(new_status));
        if let Some(reason) = request.reason {
            update_data.insert("patient_notes".to_string(), json!(reason));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated = self.patch(appointment_id, Value::Object(update_data), auth_token).await?;
        info!("Appointment {} rescheduled to {}", appointment_id, start);
        Ok(updated)
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let (appointment, scope) = self.load_for_caller(user, appointment_id, auth_token).await?;

        self.lifecycle_service
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        if matches!(scope, CallerScope::Patient(_))
            && !self.lifecycle_service.can_patient_cancel(appointment.appointment_date, Utc::now())
        {
            warn!("Late cancellation rejected for appointment {}", appointment_id);
            return Err(AppointmentError::CancellationTooLate(
                self.lifecycle_service.rules().min_patient_cancellation_notice_hours,
            ));
        }

        let updated = self.patch(
            appointment_id,
            json!({
                "status": AppointmentStatus::Cancelled,
                "cancellation_reason": request.reason,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        ).await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(updated)
    }

    pub async fn check_conflicts(
        &self,
        request: ConflictCheckRequest,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        if request.duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError("Duration must be positive".to_string()));
        }
        let end = appointment_end(request.start_time, request.duration_minutes)?;
        self.conflict_service
            .check_conflicts(request.doctor_id, request.start_time, end, request.exclude_appointment_id)
            .await
    }

    async fn patch(&self, appointment_id: Uuid, body: Value, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
            Some(auth_token),
            Some(body),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }
}

fn parse_uuid(id: &str) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(id).map_err(|e| AppointmentError::DatabaseError(format!("Invalid id {}: {}", id, e)))
}
