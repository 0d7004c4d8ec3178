use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub payment_checkout_url: String,
    pub payment_merchant_id: String,
    pub payment_merchant_secret: String,
    pub payment_currency: String,
    pub booking_fee: f64,
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
            payment_checkout_url: env::var("PAYMENT_CHECKOUT_URL")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_CHECKOUT_URL not set, using empty value");
                    String::new()
                }),
            payment_merchant_id: env::var("PAYMENT_MERCHANT_ID")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_MERCHANT_ID not set, using empty value");
                    String::new()
                }),
            payment_merchant_secret: env::var("PAYMENT_MERCHANT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_MERCHANT_SECRET not set, using empty value");
                    String::new()
                }),
            payment_currency: env::var("PAYMENT_CURRENCY")
                .unwrap_or_else(|_| "LKR".to_string()),
            booking_fee: env::var("BOOKING_FEE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    warn!("BOOKING_FEE not set or invalid, using default 350.00");
                    350.0
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

    pub fn is_payment_configured(&self) -> bool {
        !self.payment_checkout_url.is_empty()
            && !self.payment_merchant_id.is_empty()
            && !self.payment_merchant_secret.is_empty()
    }
}
