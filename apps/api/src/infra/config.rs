use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use time::Duration;
use url::Url;

pub struct AppConfig {
    pub jwt_secret: SecretString,
    pub access_token_ttl: Duration,
    pub app_origin: Url,
    pub cors_origin: HeaderValue,
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub otp_ttl_minutes: i64,
    pub resend_api_key: SecretString,
    /// Sender address for OTP mail, e.g. "Pairly <hi@pairly.app>".
    pub email_from: String,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    /// ISO currency code for newly created plans.
    pub billing_currency: String,
    /// Upper bound for the pairing and purchase transactions.
    pub tx_timeout: std::time::Duration,
    /// Also cancel the provider subscription when a couple cancels.
    pub billing_dual_cancel: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let jwt_secret: SecretString = SecretString::new(get_env::<String>("JWT_SECRET").into());
        let access_token_ttl_secs: i64 = get_env_default("ACCESS_TOKEN_TTL_SECS", 86_400);

        let app_origin: Url = get_env("APP_ORIGIN");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3001".parse().unwrap());
        let database_url: String = get_env("DATABASE_URL");
        let db_max_connections: u32 = get_env_default("DB_MAX_CONNECTIONS", 5);
        let otp_ttl_minutes: i64 = get_env_default("OTP_TTL_MINUTES", 10);

        let resend_api_key = SecretString::new(get_env::<String>("RESEND_API_KEY").into());
        let email_from: String = get_env_default("EMAIL_FROM", "Pairly <hi@pairly.app>".to_string());

        let stripe_secret_key = SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into());
        let stripe_webhook_secret =
            SecretString::new(get_env::<String>("STRIPE_WEBHOOK_SECRET").into());
        let billing_currency: String = get_env_default("BILLING_CURRENCY", "usd".to_string());
        let tx_timeout_secs: u64 = get_env_default("TX_TIMEOUT_SECS", 10);
        let billing_dual_cancel: bool = get_env_default("BILLING_DUAL_CANCEL", false);

        Self {
            jwt_secret,
            access_token_ttl: Duration::seconds(access_token_ttl_secs),
            app_origin,
            cors_origin,
            bind_addr,
            database_url,
            db_max_connections,
            otp_ttl_minutes,
            resend_api_key,
            email_from,
            stripe_secret_key,
            stripe_webhook_secret,
            billing_currency: billing_currency.to_lowercase(),
            tx_timeout: std::time::Duration::from_secs(tx_timeout_secs),
            billing_dual_cancel,
        }
    }

    /// App origin without a trailing slash, for building redirect links.
    pub fn app_origin_str(&self) -> String {
        self.app_origin.as_str().trim_end_matches('/').to_string()
    }
}
