//! # Drover Common Library
//!
//! Shared code for the Drover tooling:
//! - Error type used across crates
//! - Configuration loading (TOML + environment)
//! - Database initialization, schema, and row models

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
