// libs/doctor-cell/src/services/availability.rs
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    AvailableSlot, BookedInterval, CreateAvailabilityRequest, DoctorAvailability, DoctorError,
    UpdateAvailabilityRequest,
};
use crate::services::doctor::DoctorService;
use crate::timezone::{local_to_utc, utc_offset};

pub const MIN_SLOT_MINUTES: i32 = 5;
pub const MAX_SLOT_MINUTES: i32 = 120;
pub const DEFAULT_SLOT_MINUTES: i32 = 30;

/// Statuses that hold a doctor's time.
pub const ACTIVE_APPOINTMENT_STATUSES: &str = "pending,confirmed,in_progress,rescheduled";

pub struct AvailabilityService {
    supabase: SupabaseClient,
    access: AccessControlService,
    doctors: DoctorService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            access: AccessControlService::new(config),
            doctors: DoctorService::new(config),
        }
    }

    pub fn validate_window(
        day_of_week: i32,
        start_time: NaiveTime,
        end_time: NaiveTime,
        slot_duration_minutes: i32,
    ) -> Result<(), DoctorError> {
        if !(0..=6).contains(&day_of_week) {
            return Err(DoctorError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if start_time >= end_time {
            return Err(DoctorError::ValidationError("Start time must be before end time".to_string()));
        }
        if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&slot_duration_minutes) {
            return Err(DoctorError::ValidationError(format!(
                "Slot duration must be between {} and {} minutes",
                MIN_SLOT_MINUTES, MAX_SLOT_MINUTES
            )));
        }
        Ok(())
    }

    async fn ensure_owner(&self, user: &User, doctor_id: &str, auth_token: &str) -> Result<(), DoctorError> {
        if self.access.is_doctor_owner(user, doctor_id, auth_token).await? {
            Ok(())
        } else {
            Err(DoctorError::UnauthorizedAccess)
        }
    }

    /// Weekly windows for a doctor, readable without a session.
    pub async fn get_doctor_availability(&self, doctor_id: &str) -> Result<Vec<DoctorAvailability>, DoctorError> {
        debug!("Fetching availability for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }

    async fn get_availability_by_id(
        &self,
        doctor_id: &str,
        availability_id: &str,
    ) -> Result<DoctorAvailability, DoctorError> {
        let path = format!(
            "/rest/v1/doctor_availability?id=eq.{}&doctor_id=eq.{}",
            availability_id, doctor_id
        );
        let row = self.supabase.fetch_one(&path, None).await?
            .ok_or(DoctorError::AvailabilityNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn check_overlap(
        &self,
        doctor_id: &str,
        day_of_week: i32,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_id: Option<&str>,
    ) -> Result<(), DoctorError> {
        let clashes = self
            .get_doctor_availability(doctor_id)
            .await?
            .into_iter()
            .filter(|w| w.is_active && w.day_of_week == day_of_week)
            .filter(|w| exclude_id != Some(w.id.to_string().as_str()))
            .any(|w| w.overlaps(start_time, end_time));

        if clashes {
            warn!("Availability overlap for doctor {} on day {}", doctor_id, day_of_week);
            return Err(DoctorError::OverlappingAvailability);
        }
        Ok(())
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_availability(
        &self,
        user: &User,
        doctor_id: &str,
        request: CreateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<DoctorAvailability, DoctorError> {
        let slot_minutes = request.slot_duration_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
        Self::validate_window(request.day_of_week, request.start_time, request.end_time, slot_minutes)?;
        self.ensure_owner(user, doctor_id, auth_token).await?;
        self.check_overlap(doctor_id, request.day_of_week, request.start_time, request.end_time, None).await?;

        let now = Utc::now().to_rfc3339();
        let availability_data = json!({
            "doctor_id": doctor_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "slot_duration_minutes": slot_minutes,
            "is_active": true,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/doctor_availability",
            Some(auth_token),
            Some(availability_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| DoctorError::DatabaseError("Failed to create availability".to_string()))?;
        let availability: DoctorAvailability = serde_json::from_value(row)?;

        info!("Availability {} created for doctor {}", availability.id, doctor_id);
        Ok(availability)
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn update_availability(
        &self,
        user: &User,
        doctor_id: &str,
        availability_id: &str,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<DoctorAvailability, DoctorError> {
        self.ensure_owner(user, doctor_id, auth_token).await?;
        let current = self.get_availability_by_id(doctor_id, availability_id).await?;

        let start_time = request.start_time.unwrap_or(current.start_time);
        let end_time = request.end_time.unwrap_or(current.end_time);
        let slot_minutes = request.slot_duration_minutes.unwrap_or(current.slot_duration_minutes);
        Self::validate_window(current.day_of_week, start_time, end_time, slot_minutes)?;

        if request.is_active.unwrap_or(current.is_active) {
            self.check_overlap(doctor_id, current.day_of_week, start_time, end_time, Some(availability_id)).await?;
        }

        let mut update_data = serde_json::Map::new();
        update_data.insert("start_time".to_string(), json!(start_time.format("%H:%M:%S").to_string()));
        update_data.insert("end_time".to_string(), json!(end_time.format("%H:%M:%S").to_string()));
        update_data.insert("slot_duration_minutes".to_string(), json!(slot_minutes));
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/doctor_availability?id=eq.{}", availability_id),
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(DoctorError::AvailabilityNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn delete_availability(
        &self,
        user: &User,
        doctor_id: &str,
        availability_id: &str,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        self.ensure_owner(user, doctor_id, auth_token).await?;
        self.get_availability_by_id(doctor_id, availability_id).await?;

        let _: Value = self.supabase.request(
            Method::DELETE,
            &format!("/rest/v1/doctor_availability?id=eq.{}", availability_id),
            Some(auth_token),
            None,
        ).await?;

        info!("Availability {} deleted", availability_id);
        Ok(())
    }

    /// Open slots for `date`, in UTC.
    #[instrument(skip(self))]
    pub async fn get_available_slots(&self, doctor_id: &str, date: NaiveDate) -> Result<Vec<AvailableSlot>, DoctorError> {
        let doctor = self.doctors.get_doctor(doctor_id, None).await?;
        if !doctor.is_bookable() {
            debug!("Doctor {} is not bookable", doctor_id);
            return Ok(vec![]);
        }

        let offset = utc_offset(&doctor.timezone)
            .ok_or_else(|| DoctorError::InvalidTimezone(doctor.timezone.clone()))?;
        let windows = self.get_doctor_availability(doctor_id).await?;
        let booked = self.get_booked_intervals(doctor_id, date, offset).await?;

        let slots = compute_available_slots(date, &windows, offset, &booked, Utc::now());
        debug!("Found {} available slots for {} on {}", slots.len(), doctor_id, date);
        Ok(slots)
    }

    /// Appointments are private rows, so this read uses the service role and
    /// only selects timing columns.
    async fn get_booked_intervals(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Result<Vec<BookedInterval>, DoctorError> {
        let Some(day_start) = local_to_utc(date, NaiveTime::MIN, offset) else {
            return Ok(vec![]);
        };
        // Appointments may start before midnight and run into the day.
        let from = day_start - Duration::minutes(MAX_SLOT_MINUTES as i64 * 2);
        let to = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.({})&appointment_date=gte.{}&appointment_date=lt.{}&select=appointment_date,duration_minutes",
            doctor_id,
            ACTIVE_APPOINTMENT_STATUSES,
            from.to_rfc3339_opts(SecondsFormat::Secs, true),
            to.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let result: Vec<Value> = self.supabase.service_request(Method::GET, &path, None).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }
}

pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// Splits the active windows for `date` into fixed-length slots, dropping
/// slots that already started or overlap a booked interval.
pub fn compute_available_slots(
    date: NaiveDate,
    windows: &[DoctorAvailability],
    offset: FixedOffset,
    booked: &[BookedInterval],
    now: DateTime<Utc>,
) -> Vec<AvailableSlot> {
    let dow = day_of_week(date);
    let mut slots = Vec::new();

    for window in windows.iter().filter(|w| w.is_active && w.day_of_week == dow) {
        let step = window.slot_duration_minutes;
        if step <= 0 {
            continue;
        }
        let (Some(window_start), Some(window_end)) = (
            local_to_utc(date, window.start_time, offset),
            local_to_utc(date, window.end_time, offset),
        ) else {
            continue;
        };

        let mut start = window_start;
        loop {
            let end = start + Duration::minutes(step as i64);
            if end > window_end {
                break;
            }
            if start > now && !booked.iter().any(|b| b.overlaps(start, end)) {
                slots.push(AvailableSlot {
                    start_time: start,
                    end_time: end,
                    duration_minutes: step,
                });
            }
            start = end;
        }
    }

    slots.sort_by_key(|s| s.start_time);
    slots.dedup_by_key(|s| s.start_time);
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn window(dow: i32, start: (u32, u32), end: (u32, u32), minutes: i32) -> DoctorAvailability {
        DoctorAvailability {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            day_of_week: dow,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            slot_duration_minutes: minutes,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ist() -> FixedOffset {
        utc_offset("Asia/Kolkata").unwrap()
    }

    // 2024-06-03 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn long_ago() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_day_of_week_starts_sunday() {
        assert_eq!(day_of_week(monday()), 1);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()), 0);
    }

    #[test]
    fn test_window_split_into_slots() {
        let slots = compute_available_slots(
            monday(),
            &[window(1, (9, 0), (11, 0), 30)],
            ist(),
            &[],
            long_ago(),
        );

        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0].start_time.to_rfc3339(), "2024-06-03T03:30:00+00:00");
        assert_eq!(slots[3].end_time.to_rfc3339(), "2024-06-03T05:30:00+00:00");
    }

    #[test]
    fn test_partial_trailing_slot_is_dropped() {
        let slots = compute_available_slots(
            monday(),
            &[window(1, (9, 0), (10, 10), 30)],
            ist(),
            &[],
            long_ago(),
        );
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_booked_and_past_slots_are_removed() {
        let booked = [BookedInterval {
            // 09:30 IST for 45 minutes blocks 09:30 and 10:00.
            appointment_date: "2024-06-03T04:00:00Z".parse().unwrap(),
            duration_minutes: 45,
        }];
        // 09:10 IST, so the 09:00 slot has started.
        let now: DateTime<Utc> = "2024-06-03T03:40:00Z".parse().unwrap();

        let slots = compute_available_slots(monday(), &[window(1, (9, 0), (11, 0), 30)], ist(), &booked, now);

        let starts: Vec<String> = slots.iter().map(|s| s.start_time.format("%H:%M").to_string()).collect();
        assert_eq!(starts, vec!["05:00"]);
    }

    #[test]
    fn test_other_days_and_inactive_windows_ignored() {
        let mut inactive = window(1, (14, 0), (15, 0), 30);
        inactive.is_active = false;

        let slots = compute_available_slots(
            monday(),
            &[window(2, (9, 0), (11, 0), 30), inactive],
            ist(),
            &[],
            long_ago(),
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_validate_window() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();

        assert!(AvailabilityService::validate_window(1, nine, five, 30).is_ok());
        assert!(AvailabilityService::validate_window(7, nine, five, 30).is_err());
        assert!(AvailabilityService::validate_window(1, five, nine, 30).is_err());
        assert!(AvailabilityService::validate_window(1, nine, five, 4).is_err());
        assert!(AvailabilityService::validate_window(1, nine, five, 121).is_err());
    }
}
