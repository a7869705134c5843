//! Dubmix API library
//!
//! Exposes the router, state and setup so integration tests can build the app
//! over fakes.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;
