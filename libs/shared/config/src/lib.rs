use std::env;
use tracing::warn;

pub const DEFAULT_CLOUDFLARE_REALTIME_BASE_URL: &str = "https://rtc.live.cloudflare.com/v1";
pub const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub cloudflare_realtime_app_id: String,
    pub cloudflare_realtime_api_token: String,
    pub cloudflare_realtime_base_url: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: String,
    pub razorpay_base_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub password_reset_ttl_minutes: i64,
    pub password_reset_max_attempts: i32,
    pub port: u16,
}

fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn with_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using default", name);
        default.to_string()
    })
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: required("SUPABASE_URL"),
            supabase_anon_key: required("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET"),
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY"),
            cloudflare_realtime_app_id: required("CLOUDFLARE_REALTIME_APP_ID"),
            cloudflare_realtime_api_token: required("CLOUDFLARE_REALTIME_API_TOKEN"),
            cloudflare_realtime_base_url: with_default(
                "CLOUDFLARE_REALTIME_BASE_URL",
                DEFAULT_CLOUDFLARE_REALTIME_BASE_URL,
            ),
            razorpay_key_id: required("RAZORPAY_KEY_ID"),
            razorpay_key_secret: required("RAZORPAY_KEY_SECRET"),
            razorpay_webhook_secret: required("RAZORPAY_WEBHOOK_SECRET"),
            razorpay_base_url: with_default("RAZORPAY_BASE_URL", DEFAULT_RAZORPAY_BASE_URL),
            openai_api_key: required("OPENAI_API_KEY"),
            openai_base_url: with_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_model: with_default("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            password_reset_ttl_minutes: parsed_or("PASSWORD_RESET_TTL_MINUTES", 15),
            password_reset_max_attempts: parsed_or("PASSWORD_RESET_MAX_ATTEMPTS", 5),
            port: parsed_or("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_video_conferencing_configured(&self) -> bool {
        !self.cloudflare_realtime_app_id.is_empty()
            && !self.cloudflare_realtime_api_token.is_empty()
            && !self.cloudflare_realtime_base_url.is_empty()
    }

    pub fn is_payments_configured(&self) -> bool {
        !self.razorpay_key_id.is_empty() && !self.razorpay_key_secret.is_empty()
    }

    pub fn is_ai_configured(&self) -> bool {
        !self.openai_api_key.is_empty() && !self.openai_base_url.is_empty()
    }
}
