// libs/video-conferencing-cell/src/services/cloudflare.rs
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{
    CloudflareRenegotiateRequest, CloudflareSessionRequest, CloudflareSessionResponse,
    CloudflareTrackRequest, CloudflareTrackResponse, IceServer, SessionDescription,
    TrackObject, VideoConferencingError,
};

const CLOUDFLARE_STUN: &str = "stun:stun.cloudflare.com:3478";

/// Cloudflare Realtime SFU client.
/// See https://developers.cloudflare.com/realtime/
pub struct CloudflareRealtimeClient {
    client: Client,
    app_id: String,
    api_token: String,
    base_url: String,
}

impl CloudflareRealtimeClient {
    pub fn new(config: &AppConfig) -> Result<Self, VideoConferencingError> {
        if !config.is_video_conferencing_configured() {
            return Err(VideoConferencingError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            app_id: config.cloudflare_realtime_app_id.clone(),
            api_token: config.cloudflare_realtime_api_token.clone(),
            base_url: config.cloudflare_realtime_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST /apps/{appId}/sessions/new with the caller's offer.
    pub async fn create_session(&self, offer_sdp: String) -> Result<CloudflareSessionResponse, VideoConferencingError> {
        info!("Creating new Cloudflare Realtime session");

        let request_body = CloudflareSessionRequest {
            session_description: SessionDescription::offer(offer_sdp),
        };
        let response: CloudflareSessionResponse = self
            .send(Method::POST, "sessions/new", &request_body)
            .await?;

        if let Some(error_code) = &response.error_code {
            return Err(api_error(error_code, response.error_description.as_deref()));
        }

        info!("Created Cloudflare session: {}", response.session_id);
        Ok(response)
    }

    /// POST /apps/{appId}/sessions/{sessionId}/tracks/new to publish local
    /// tracks or pull remote ones.
    pub async fn add_tracks(
        &self,
        session_id: &str,
        tracks: Vec<TrackObject>,
        offer_sdp: Option<String>,
    ) -> Result<CloudflareTrackResponse, VideoConferencingError> {
        info!("Adding {} tracks to session: {}", tracks.len(), session_id);

        let request_body = CloudflareTrackRequest {
            session_description: offer_sdp.map(SessionDescription::offer),
            tracks,
        };
        let response: CloudflareTrackResponse = self
            .send(Method::POST, &format!("sessions/{}/tracks/new", session_id), &request_body)
            .await?;

        if let Some(error_code) = &response.error_code {
            return Err(api_error(error_code, response.error_description.as_deref()));
        }
        if let Some(track) = response.tracks.iter().find(|t| t.error_code.is_some()) {
            let code = track.error_code.as_deref().unwrap_or_default();
            return Err(api_error(
                &format!("track {}: {}", track.track_name, code),
                track.error_description.as_deref(),
            ));
        }

        Ok(response)
    }

    /// PUT /apps/{appId}/sessions/{sessionId}/renegotiate with the caller's answer.
    pub async fn renegotiate_session(&self, session_id: &str, answer_sdp: String) -> Result<(), VideoConferencingError> {
        info!("Renegotiating session: {}", session_id);

        let request_body = CloudflareRenegotiateRequest {
            session_description: SessionDescription::answer(answer_sdp),
        };
        let _: serde_json::Value = self
            .send(Method::PUT, &format!("sessions/{}/renegotiate", session_id), &request_body)
            .await?;

        Ok(())
    }

    pub fn get_ice_servers(&self) -> Vec<IceServer> {
        default_ice_servers()
    }

    /// Any answer other than a 5xx or an auth failure means the API is reachable.
    pub async fn health_check(&self) -> Result<bool, VideoConferencingError> {
        let url = format!("{}/apps/{}", self.base_url, self.app_id);
        debug!("Performing Cloudflare Realtime API health check against {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let status = response.status();
        let healthy = !status.is_server_error() && status != 401 && status != 403;
        if !healthy {
            warn!("Cloudflare Realtime API health check failed: {}", status);
        }
        Ok(healthy)
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, VideoConferencingError> {
        let url = format!("{}/apps/{}/{}", self.base_url, self.app_id, path);
        debug!("Sending Cloudflare request to: {}", url);

        let response = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Cloudflare request to {} failed: {} - {}", path, status, response_text);
            return Err(VideoConferencingError::CloudflareApiError {
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let body = if response_text.trim().is_empty() { "null" } else { &response_text };
        serde_json::from_str(body).map_err(|e| VideoConferencingError::CloudflareApiError {
            message: format!("Failed to parse Cloudflare response: {}", e),
        })
    }
}

/// Cloudflare's public STUN server; usable without credentials.
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer {
        urls: vec![CLOUDFLARE_STUN.to_string()],
        username: None,
        credential: None,
    }]
}

fn api_error(code: &str, description: Option<&str>) -> VideoConferencingError {
    let message = description.unwrap_or("Unknown error");
    error!("Cloudflare error: {} - {}", code, message);
    VideoConferencingError::CloudflareApiError {
        message: format!("{}: {}", code, message),
    }
}
