//! Monitoring capture of every scored observation.
//!
//! - [`record`]: RecordGroup → MonitoringRecord transform
//! - [`sink`]: Buffered, append-only CSV writer
//! - [`dispatcher`]: Single-consumer queue feeding the sink

pub mod dispatcher;
pub mod record;
pub mod sink;
