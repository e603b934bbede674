//! `Shogun` Core Library
//!
//! Shared functionality for `Shogun` components:
//! - Worker roles (commander, steward, laborers)
//! - Line protocol spoken between the pool and its runner processes
//! - Configuration resolution and hierarchy
//! - Section-aware editing of the shared dashboard document
//! - Common error types

pub mod config;
pub mod dashboard;
pub mod error;
pub mod protocol;
pub mod role;
pub mod tracing_init;

pub use config::Config;
pub use dashboard::Document;
pub use error::{Error, Result};
pub use role::Role;
