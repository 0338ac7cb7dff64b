//! # carscan common library
//!
//! Shared code for carscan services:
//! - Common error type and result alias
//! - Root folder resolution and TOML configuration loading
//! - Timestamp helpers for database persistence

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
