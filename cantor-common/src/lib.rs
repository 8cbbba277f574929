//! # Cantor Common Library
//!
//! Shared code for the Cantor vocal-synthesis services including:
//! - Event types (CantorEvent enum) and the EventBus used for progress reporting
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
