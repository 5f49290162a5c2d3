//! # Audio Analysis Module
//!
//! Decoding plus the native onset and beat detectors.
//!
//! ## Core Features
//!
//! - **Decoding**: WAV through `hound`, everything else through Symphonia, mixed to mono
//! - **Onset Detection**: spectral flux on a log-mel spectrogram with adaptive peak picking
//! - **Tempo Estimation**: autocorrelation tempogram with a log-normal tempo prior
//! - **Beat Tracking**: dynamic programming over the onset envelope
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beat_extractor::audio::{AnalysisProvider, AudioAnalyzer};
//!
//! # fn main() -> beat_extractor::Result<()> {
//! let analyzer = AudioAnalyzer::new();
//! let signal = analyzer.decode("song.wav".as_ref())?;
//!
//! let track = analyzer.beat_track(&signal)?;
//! let times = analyzer.frames_to_time(&track.frames, signal.sample_rate);
//!
//! println!("Detected BPM: {:.2}", track.tempo_bpm);
//! println!("Found {} beats", times.len());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod loader;
pub mod provider;
pub mod spectral;
pub mod types;

pub use analyzer::AudioAnalyzer;
pub use loader::AudioLoader;
pub use provider::AnalysisProvider;
pub use types::{
    AudioFormat, AudioSignal, BeatTrack, Extraction, ExtractionMode, TimestampSequence,
};
