use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub payment_gateway_url: String,
    pub payment_gateway_key_id: String,
    pub payment_gateway_key_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            payment_gateway_url: env::var("PAYMENT_GATEWAY_URL")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_GATEWAY_URL not set, using default");
                    "https://api.razorpay.com/v1".to_string()
                }),
            payment_gateway_key_id: env::var("PAYMENT_GATEWAY_KEY_ID")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_GATEWAY_KEY_ID not set, using empty value");
                    String::new()
                }),
            payment_gateway_key_secret: env::var("PAYMENT_GATEWAY_KEY_SECRET")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_GATEWAY_KEY_SECRET not set, using empty value");
                    String::new()
                }),
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

    pub fn is_payment_gateway_configured(&self) -> bool {
        !self.payment_gateway_url.is_empty()
            && !self.payment_gateway_key_id.is_empty()
            && !self.payment_gateway_key_secret.is_empty()
    }
}
