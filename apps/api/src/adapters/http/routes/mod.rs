pub mod auth;
pub mod billboard;
pub mod events;
pub mod payment;
pub mod subscription;
pub mod users;
pub mod webhooks;

use axum::Router;
use validator::Validate;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/subscription", subscription::router())
        .nest("/payment", payment::router())
        .nest("/event", events::router())
        .nest("/billboard", billboard::router())
        .nest("/webhooks", webhooks::router())
}

/// Run the payload's `validator` rules, mapping failures to `InvalidInput`.
fn validated<T: Validate>(payload: T) -> AppResult<T> {
    payload
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    Ok(payload)
}
