// libs/video-conferencing-cell/src/services/session.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use auth_cell::AccessControlService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    AddTracksRequest, AddTracksResponse, CreateVideoSessionRequest, JoinSessionRequest,
    JoinSessionResponse, ParticipantType, VideoConferencingError, VideoSession, VideoSessionStatus,
};
use crate::services::cloudflare::CloudflareRealtimeClient;

/// The appointment columns a video session needs.
#[derive(Debug, Deserialize)]
struct AppointmentRef {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    status: String,
    appointment_date: DateTime<Utc>,
}

/// Video session lifecycle: creation per confirmed appointment, joining
/// through Cloudflare Realtime, track publishing and ending.
pub struct VideoSessionService {
    supabase: Arc<SupabaseClient>,
    access: AccessControlService,
    cloudflare: CloudflareRealtimeClient,
}

impl VideoSessionService {
    pub fn new(config: &AppConfig) -> Result<Self, VideoConferencingError> {
        Ok(Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            access: AccessControlService::new(config),
            cloudflare: CloudflareRealtimeClient::new(config)?,
        })
    }

    /// Opens (or returns the open) session for a confirmed appointment.
    /// The flag is true when a new session was stored.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn create_session(
        &self,
        user: &User,
        request: CreateVideoSessionRequest,
        auth_token: &str,
    ) -> Result<(VideoSession, bool), VideoConferencingError> {
        let appointment = self.get_appointment(request.appointment_id, auth_token).await?;
        self.participant_type(user, appointment.patient_id, appointment.doctor_id, auth_token).await?;

        if appointment.status != "confirmed" {
            return Err(VideoConferencingError::AppointmentNotConfirmed { status: appointment.status });
        }

        if let Some(existing) = self.open_session_for(appointment.id, auth_token).await? {
            debug!("Reusing video session {} for appointment {}", existing.id, appointment.id);
            return Ok((existing, false));
        }

        let now = Utc::now();
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/video_sessions",
            Some(auth_token),
            Some(json!({
                "id": Uuid::new_v4(),
                "appointment_id": appointment.id,
                "patient_id": appointment.patient_id,
                "doctor_id": appointment.doctor_id,
                "cloudflare_session_id": null,
                "status": VideoSessionStatus::Scheduled,
                "scheduled_start_time": appointment.appointment_date,
                "actual_start_time": null,
                "actual_end_time": null,
                "duration_minutes": null,
                "created_at": now,
                "updated_at": now
            })),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or_else(|| VideoConferencingError::DatabaseError {
            message: "Failed to store video session".to_string(),
        })?;
        let session: VideoSession = serde_json::from_value(row)?;

        let _: Value = self.supabase.service_request(
            Method::PATCH,
            &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
            Some(json!({ "video_session_id": session.id, "updated_at": now })),
        ).await?;

        info!("Created video session {} for appointment {}", session.id, appointment.id);
        Ok((session, true))
    }

    pub async fn get_session(&self, user: &User, session_id: Uuid, auth_token: &str) -> Result<VideoSession, VideoConferencingError> {
        let session = self.fetch_session(session_id, auth_token).await?;
        self.participant_type(user, session.patient_id, session.doctor_id, auth_token).await?;
        Ok(session)
    }

    /// Most recent session for an appointment.
    pub async fn get_session_for_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<VideoSession, VideoConferencingError> {
        let path = format!(
            "/rest/v1/video_sessions?appointment_id=eq.{}&order=created_at.desc&limit=1",
            appointment_id
        );
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(VideoConferencingError::SessionNotFound)?;
        let session: VideoSession = serde_json::from_value(row)?;

        self.participant_type(user, session.patient_id, session.doctor_id, auth_token).await?;
        Ok(session)
    }

    /// The first join must carry an SDP offer; it creates the Cloudflare
    /// session and gets the SDP answer back.
    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn join_session(
        &self,
        user: &User,
        session_id: Uuid,
        request: JoinSessionRequest,
        auth_token: &str,
    ) -> Result<JoinSessionResponse, VideoConferencingError> {
        let mut session = self.fetch_session(session_id, auth_token).await?;
        let participant = self.participant_type(user, session.patient_id, session.doctor_id, auth_token).await?;

        if !session.status.is_joinable() {
            return Err(VideoConferencingError::InvalidSessionState { status: session.status.to_string() });
        }

        let mut changes = serde_json::Map::new();
        let mut answer = None;

        let cloudflare_session_id = match session.cloudflare_session_id.clone() {
            Some(existing) => existing,
            None => {
                let offer = request.session_description.ok_or_else(|| VideoConferencingError::WebRTCError {
                    message: "An SDP offer is required to start the call".to_string(),
                })?;
                if offer.sdp_type != "offer" || offer.sdp.trim().is_empty() {
                    return Err(VideoConferencingError::WebRTCError {
                        message: "sessionDescription must be a non-empty offer".to_string(),
                    });
                }

                let created = self.cloudflare.create_session(offer.sdp).await?;
                changes.insert("cloudflare_session_id".to_string(), json!(created.session_id));
                answer = created.session_description;
                created.session_id
            }
        };

        if session.status != VideoSessionStatus::InProgress {
            changes.insert("status".to_string(), json!(VideoSessionStatus::InProgress));
        }
        if session.actual_start_time.is_none() {
            changes.insert("actual_start_time".to_string(), json!(Utc::now()));
        }
        if !changes.is_empty() {
            session = self.update_session(session.id, Value::Object(changes), auth_token).await?;
        }

        info!("User {} joined video session {} as {:?}", user.id, session.id, participant);
        Ok(JoinSessionResponse {
            session,
            participant,
            cloudflare_session_id,
            session_description: answer,
            ice_servers: self.cloudflare.get_ice_servers(),
        })
    }

    #[instrument(skip(self, request, auth_token), fields(user_id = %user.id))]
    pub async fn add_tracks(
        &self,
        user: &User,
        session_id: Uuid,
        request: AddTracksRequest,
        auth_token: &str,
    ) -> Result<AddTracksResponse, VideoConferencingError> {
        if request.tracks.is_empty() {
            return Err(VideoConferencingError::WebRTCError { message: "At least one track is required".to_string() });
        }

        let session = self.get_session(user, session_id, auth_token).await?;
        let cloudflare_session_id = active_cloudflare_session(&session)?;

        let response = self
            .cloudflare
            .add_tracks(cloudflare_session_id, request.tracks, request.session_description.map(|d| d.sdp))
            .await?;

        Ok(AddTracksResponse {
            tracks: response.tracks,
            session_description: response.session_description,
            requires_immediate_renegotiation: response.requires_immediate_renegotiation.unwrap_or(false),
        })
    }

    pub async fn renegotiate_session(
        &self,
        user: &User,
        session_id: Uuid,
        answer_sdp: String,
        auth_token: &str,
    ) -> Result<(), VideoConferencingError> {
        let session = self.get_session(user, session_id, auth_token).await?;
        let cloudflare_session_id = active_cloudflare_session(&session)?;

        self.cloudflare.renegotiate_session(cloudflare_session_id, answer_sdp).await
    }

    /// Marks the call completed and records how long it ran.
    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn end_session(&self, user: &User, session_id: Uuid, auth_token: &str) -> Result<VideoSession, VideoConferencingError> {
        let session = self.get_session(user, session_id, auth_token).await?;

        if session.status.is_terminal() {
            return Err(VideoConferencingError::InvalidSessionState { status: session.status.to_string() });
        }

        let ended_at = Utc::now();
        let duration_minutes = session
            .actual_start_time
            .map(|started| ended_at.signed_duration_since(started).num_minutes().max(0))
            .unwrap_or(0);

        let ended = self.update_session(session.id, json!({
            "status": VideoSessionStatus::Completed,
            "actual_end_time": ended_at,
            "duration_minutes": duration_minutes
        }), auth_token).await?;

        info!("Video session {} ended after {} minutes", ended.id, duration_minutes);
        Ok(ended)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Admins pass; patients and doctors must be the appointment's own.
    async fn participant_type(
        &self,
        user: &User,
        patient_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<ParticipantType, VideoConferencingError> {
        if user.is_admin() {
            return Ok(ParticipantType::Admin);
        }

        if user.is_patient() {
            let own = self.access.patient_id_for_user(&user.id, auth_token).await?;
            if own.as_deref() == Some(patient_id.to_string().as_str()) {
                return Ok(ParticipantType::Patient);
            }
        } else if user.is_doctor() {
            let own = self.access.doctor_id_for_user(&user.id, auth_token).await?;
            if own.as_deref() == Some(doctor_id.to_string().as_str()) {
                return Ok(ParticipantType::Doctor);
            }
        }

        warn!("User {} is not a participant of this consultation", user.id);
        Err(VideoConferencingError::Unauthorized)
    }

    async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<AppointmentRef, VideoConferencingError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,patient_id,doctor_id,status,appointment_date",
            appointment_id
        );
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(VideoConferencingError::AppointmentNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn open_session_for(&self, appointment_id: Uuid, auth_token: &str) -> Result<Option<VideoSession>, VideoConferencingError> {
        let path = format!(
            "/rest/v1/video_sessions?appointment_id=eq.{}&status=in.(scheduled,ready,in_progress)&order=created_at.desc&limit=1",
            appointment_id
        );
        self.supabase.fetch_one(&path, Some(auth_token)).await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(VideoConferencingError::from)
    }

    async fn fetch_session(&self, session_id: Uuid, auth_token: &str) -> Result<VideoSession, VideoConferencingError> {
        let path = format!("/rest/v1/video_sessions?id=eq.{}", session_id);
        let row = self.supabase.fetch_one(&path, Some(auth_token)).await?
            .ok_or(VideoConferencingError::SessionNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    async fn update_session(&self, session_id: Uuid, mut changes: Value, auth_token: &str) -> Result<VideoSession, VideoConferencingError> {
        changes["updated_at"] = json!(Utc::now());

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/video_sessions?id=eq.{}", session_id),
            Some(auth_token),
            Some(changes),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(VideoConferencingError::SessionNotFound)?;
        Ok(serde_json::from_value(row)?)
    }
}

fn active_cloudflare_session(session: &VideoSession) -> Result<&str, VideoConferencingError> {
    if session.status != VideoSessionStatus::InProgress && session.status != VideoSessionStatus::Ready {
        return Err(VideoConferencingError::InvalidSessionState { status: session.status.to_string() });
    }
    session.cloudflare_session_id.as_deref().ok_or_else(|| VideoConferencingError::InvalidSessionState {
        status: "no Cloudflare session has been started".to_string(),
    })
}
