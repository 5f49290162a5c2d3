//! # Timestamp Extraction
//!
//! Ties decoding, detection and the timestamp file together.

pub mod extractor;
pub mod output;

// Re-exports for convenience
pub use extractor::BeatExtractor;
pub use output::{format_record, TimestampWriter};
