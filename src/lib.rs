//! # Beat-Extractor
//!
//! Extract onset or beat timestamps from an audio file and save them as a
//! plain-text list, one time in seconds per line with four decimal places.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use beat_extractor::{BeatExtractor, Config, ExtractionMode};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let extractor = BeatExtractor::new(Config::default());
//! let extraction = extractor
//!     .extract("song.wav", "beats.txt", ExtractionMode::Beat)
//!     .await?;
//!
//! println!("{} beats at {:?} BPM", extraction.timestamps.len(), extraction.tempo_bpm);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`audio`] - Decoding and the native onset/beat detectors
//! - [`extract`] - The decode → detect → write pipeline and the output format
//! - [`config`] - Configuration management
//! - [`synth`] - Synthetic test signals
//!
//! ## Custom Backends
//!
//! Any detector can drive the pipeline by implementing
//! [`AnalysisProvider`](audio::AnalysisProvider) and passing it to
//! [`BeatExtractor::with_provider`].

pub mod audio;
pub mod config;
pub mod error;
pub mod extract;
pub mod synth;

// Re-export commonly used types for convenience
pub use crate::{
    audio::{AnalysisProvider, AudioAnalyzer, ExtractionMode, TimestampSequence},
    config::Config,
    error::{ExtractorError, FailureKind, Result},
    extract::BeatExtractor,
};
