//! clf-serve: authenticated HTTP serving for a pre-trained linear classifier.
//!
//! Every scored observation is captured, off the request path, into a
//! per-process CSV file for offline monitoring:
//!   request → auth → validation → model → response
//!                                       ↘ dispatch queue → monitoring sink

pub mod config;
pub mod inference;
pub mod logging;
pub mod monitoring;
pub mod server;
