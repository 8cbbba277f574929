//! HTTP API handlers for cantor-server
//!
//! Thin adapters over the core services; every failure leaves through
//! [`ApiError`].

pub mod convert;
pub mod error;
pub mod health;
pub mod project;
pub mod sse;

pub use convert::convert_routes;
pub use error::{ApiError, ApiResult};
pub use health::health_routes;
pub use project::project_routes;
pub use sse::event_routes;
