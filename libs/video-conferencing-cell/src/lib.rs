// libs/video-conferencing-cell/src/lib.rs
//! Video consultations over Cloudflare Realtime.
//!
//! A session is created per confirmed appointment. The first participant to
//! join supplies a WebRTC offer, which opens the Cloudflare session and
//! returns the SDP answer; tracks are then published and pulled through the
//! SFU until either side ends the call.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    CreateVideoSessionRequest, JoinSessionRequest, JoinSessionResponse, ParticipantType,
    VideoConferencingError, VideoSession, VideoSessionStatus,
};
pub use router::video_conferencing_routes;
pub use services::{CloudflareRealtimeClient, VideoSessionService};
