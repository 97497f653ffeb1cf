//! Test utilities for integration testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - An in-memory store implementing every repository port
//! - Recording fakes for the email and billing provider ports
//! - A builder for an `AppState` wired against all of the above

mod app_state_builder;
mod factories;
mod persistence_mocks;
mod service_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use persistence_mocks::*;
pub use service_mocks::*;
