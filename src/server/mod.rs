//! HTTP server.
//!
//! - [`api`]: Router, application context and request orchestration
//! - [`auth`]: Basic authentication
//! - [`validation`]: Request body validation
//! - [`error`]: Error → response mapping
//! - [`metrics`]: Prometheus counters

pub mod api;
pub mod auth;
pub mod error;
pub mod metrics;
pub mod validation;
