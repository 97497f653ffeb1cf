pub mod billing_event;
pub mod event_status;
pub mod payment_status;
pub mod plan_duration;
pub mod pricing;
pub mod subscription_window;
pub mod user_role;
pub mod user_status;
