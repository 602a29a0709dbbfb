//! Classifier inference.
//!
//! - [`batch`]: Named-feature input batches and index-aligned predictions
//! - [`model_loader`]: Versioned model artifact format and loading
//! - [`engine`]: Immutable, shareable inference engine

pub mod batch;
pub mod engine;
pub mod model_loader;
