//! REST client for the Inclusa community platform.
//!
//! This crate provides typed access to the platform backend: profiles,
//! the forum, direct messages, course and job listings, and the XP system.
//!
//! ## Features
//!
//! - **HTTP Client**: bearer-authenticated requests with error normalization
//! - **Envelopes**: list and created-record responses decoded into one shape
//! - **Endpoints**: one method per backend route

mod client;
mod config;
mod endpoints;
pub mod envelope;
mod error;
mod types;

pub use client::{ApiClient, Auth};
pub use config::{ClientConfig, DEFAULT_API_URL};
pub use envelope::{Created, Page};
pub use error::ApiError;
pub use types::*;
