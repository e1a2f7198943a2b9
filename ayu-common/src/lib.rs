//! # AyuSethu Common Library
//!
//! Shared code for the AyuSethu traceability services:
//! - Error type and result alias
//! - Bootstrap configuration and root folder resolution
//! - Event types (AyuEvent enum) and EventBus
//! - Bearer token and role primitives
//! - SQLite pool opening
//! - Utility functions

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
