// libs/video-conferencing-cell/src/services/mod.rs
pub mod cloudflare;
pub mod session;

pub use cloudflare::CloudflareRealtimeClient;
pub use session::VideoSessionService;
