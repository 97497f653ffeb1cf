pub mod admin;
pub mod auth;
pub mod billboard;
pub mod catalog;
pub mod events;
pub mod pairing;
pub mod payment;
pub mod reconciler;
pub mod subscription;
