use std::path::Path;

use crate::audio::types::{AudioSignal, BeatTrack};
use crate::error::Result;

/// Capability the extractor needs from an audio-analysis backend
///
/// Implementations must be deterministic for a given input: running the same
/// signal twice must yield identical timestamps.
pub trait AnalysisProvider: Send + Sync {
    /// Returns the unique name of this backend
    fn name(&self) -> &str;

    /// Decode a file into mono samples at its native sample rate
    fn decode(&self, path: &Path) -> Result<AudioSignal>;

    /// Detect onset events, returned directly in seconds
    fn onset_detect(&self, signal: &AudioSignal) -> Result<Vec<f64>>;

    /// Estimate tempo and beat positions (in frames)
    fn beat_track(&self, signal: &AudioSignal) -> Result<BeatTrack>;

    /// Stride between analysis frames, in samples
    fn hop_length(&self) -> usize;

    /// Convert frame indices to seconds
    fn frames_to_time(&self, frames: &[usize], sample_rate: u32) -> Vec<f64> {
        let hop = self.hop_length() as f64;
        frames
            .iter()
            .map(|&frame| frame as f64 * hop / sample_rate as f64)
            .collect()
    }
}
