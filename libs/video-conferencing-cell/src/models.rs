// libs/video-conferencing-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// VIDEO SESSIONS
// ==============================================================================

/// One consultation call per appointment, backed by a Cloudflare Realtime
/// session once the first participant joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSession {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub cloudflare_session_id: Option<String>,
    pub status: VideoSessionStatus,
    pub scheduled_start_time: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoSessionStatus {
    Scheduled,
    /// Cloudflare session created, nobody connected yet.
    Ready,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl VideoSessionStatus {
    pub fn is_joinable(&self) -> bool {
        matches!(self, VideoSessionStatus::Scheduled | VideoSessionStatus::Ready | VideoSessionStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoSessionStatus::Completed | VideoSessionStatus::Cancelled | VideoSessionStatus::Failed)
    }
}

impl fmt::Display for VideoSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSessionStatus::Scheduled => write!(f, "scheduled"),
            VideoSessionStatus::Ready => write!(f, "ready"),
            VideoSessionStatus::InProgress => write!(f, "in_progress"),
            VideoSessionStatus::Completed => write!(f, "completed"),
            VideoSessionStatus::Cancelled => write!(f, "cancelled"),
            VideoSessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Which side of the appointment the caller is on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Patient,
    Doctor,
    Admin,
}

// ==============================================================================
// CLOUDFLARE REALTIME API MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareSessionRequest {
    #[serde(rename = "sessionDescription")]
    pub session_description: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareSessionResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "sessionDescription")]
    pub session_description: Option<SessionDescription>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(rename = "errorDescription", skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" or "answer"
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: "offer".to_string(), sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: "answer".to_string(), sdp: sdp.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareTrackRequest {
    #[serde(rename = "sessionDescription", skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    pub tracks: Vec<TrackObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareTrackResponse {
    #[serde(rename = "sessionDescription", skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    #[serde(rename = "requiresImmediateRenegotiation", skip_serializing_if = "Option::is_none")]
    pub requires_immediate_renegotiation: Option<bool>,
    #[serde(default)]
    pub tracks: Vec<TrackResult>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(rename = "errorDescription", skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackObject {
    /// "local" to publish, "remote" to subscribe
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(rename = "trackName", skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResult {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(rename = "trackName")]
    pub track_name: String,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(rename = "errorDescription", skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareRenegotiateRequest {
    #[serde(rename = "sessionDescription")]
    pub session_description: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

// ==============================================================================
// API REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVideoSessionRequest {
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    #[serde(rename = "sessionDescription")]
    pub session_description: Option<SessionDescription>,
}

#[derive(Debug, Serialize)]
pub struct JoinSessionResponse {
    pub session: VideoSession,
    pub participant: ParticipantType,
    pub cloudflare_session_id: String,
    /// SDP answer; only present for the join that created the Cloudflare session.
    #[serde(rename = "sessionDescription", skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Deserialize)]
pub struct AddTracksRequest {
    pub tracks: Vec<TrackObject>,
    #[serde(rename = "sessionDescription")]
    pub session_description: Option<SessionDescription>,
}

#[derive(Debug, Serialize)]
pub struct AddTracksResponse {
    pub tracks: Vec<TrackResult>,
    #[serde(rename = "sessionDescription", skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    #[serde(rename = "requiresImmediateRenegotiation")]
    pub requires_immediate_renegotiation: bool,
}

#[derive(Debug, Deserialize)]
pub struct RenegotiateRequest {
    pub answer_sdp: String,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VideoConferencingError {
    #[error("Video session not found")]
    SessionNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Video sessions can only be created for confirmed appointments (appointment is {status})")]
    AppointmentNotConfirmed { status: String },

    #[error("User not authorized for this video session")]
    Unauthorized,

    #[error("Video session is not in a state that allows this operation: {status}")]
    InvalidSessionState { status: String },

    #[error("Cloudflare API error: {message}")]
    CloudflareApiError { message: String },

    #[error("WebRTC configuration error: {message}")]
    WebRTCError { message: String },

    #[error("Video conferencing not configured")]
    NotConfigured,

    #[error("Database error: {message}")]
    DatabaseError { message: String },
}

impl From<anyhow::Error> for VideoConferencingError {
    fn from(err: anyhow::Error) -> Self {
        VideoConferencingError::DatabaseError { message: err.to_string() }
    }
}

impl From<serde_json::Error> for VideoConferencingError {
    fn from(err: serde_json::Error) -> Self {
        VideoConferencingError::DatabaseError { message: err.to_string() }
    }
}

impl From<reqwest::Error> for VideoConferencingError {
    fn from(err: reqwest::Error) -> Self {
        VideoConferencingError::CloudflareApiError { message: err.to_string() }
    }
}

impl From<VideoConferencingError> for AppError {
    fn from(err: VideoConferencingError) -> Self {
        match err {
            VideoConferencingError::SessionNotFound
            | VideoConferencingError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            VideoConferencingError::Unauthorized => AppError::Forbidden(err.to_string()),
            VideoConferencingError::AppointmentNotConfirmed { .. }
            | VideoConferencingError::InvalidSessionState { .. }
            | VideoConferencingError::WebRTCError { .. } => AppError::BadRequest(err.to_string()),
            VideoConferencingError::CloudflareApiError { message } => AppError::ExternalService(message),
            VideoConferencingError::NotConfigured => AppError::Unavailable(err.to_string()),
            VideoConferencingError::DatabaseError { message } => AppError::Database(message),
        }
    }
}
