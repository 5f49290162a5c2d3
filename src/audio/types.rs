use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ExtractorError, Result};

/// Decoded mono audio ready for analysis
#[derive(Debug, Clone)]
pub struct AudioSignal {
    /// Mono samples in [-1.0, 1.0] (multi-channel sources are averaged)
    pub samples: Vec<f32>,

    /// Native sample rate in Hz
    pub sample_rate: u32,

    /// Channel count of the source before mixdown
    pub channels: u16,

    /// Original file path
    pub file_path: PathBuf,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioSignal {
    /// Wrap in-memory mono samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
            file_path: PathBuf::new(),
            format: AudioFormat::default(),
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Average interleaved channels down to one
    pub fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
        if channels <= 1 {
            return interleaved.to_vec();
        }

        interleaved
            .chunks(channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    }
}

/// Audio file format information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioFormat {
    /// File extension (wav, mp3, flac, etc.)
    pub extension: String,

    /// Bit depth (16, 24, 32, etc.)
    pub bit_depth: Option<u16>,

    /// Codec description for compressed formats
    pub compression: Option<String>,
}

/// Which detector produces the timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// One timestamp per detected onset, independent of tempo
    #[default]
    Onset,

    /// Timestamps aligned to an estimated periodic beat grid
    Beat,
}

impl ExtractionMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Onset => "onset",
            Self::Beat => "beat",
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["onset", "beat"]
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExtractionMode {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "onset" | "onsets" => Ok(Self::Onset),
            "beat" | "beats" | "tempo" => Ok(Self::Beat),
            other => Err(ExtractorError::generic(format!(
                "Unknown mode '{}'. Available modes: {}",
                other,
                Self::available().join(", ")
            ))),
        }
    }
}

/// Estimated tempo plus beat positions in analysis frames
#[derive(Debug, Clone, PartialEq)]
pub struct BeatTrack {
    /// Global tempo in beats per minute (0.0 when nothing was detected)
    pub tempo_bpm: f64,

    /// Beat positions as frame indices, ascending
    pub frames: Vec<usize>,
}

impl BeatTrack {
    pub fn empty() -> Self {
        Self { tempo_bpm: 0.0, frames: Vec::new() }
    }
}

/// Ordered event times in seconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimestampSequence(Vec<f64>);

impl TimestampSequence {
    pub fn new(times: Vec<f64>) -> Self {
        Self(times)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }

    /// True when every timestamp is >= its predecessor
    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|pair| pair[1] >= pair[0])
    }

    /// Gaps between consecutive timestamps
    pub fn intervals(&self) -> Vec<f64> {
        self.0.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

impl From<Vec<f64>> for TimestampSequence {
    fn from(times: Vec<f64>) -> Self {
        Self(times)
    }
}

/// Outcome of one extraction run
#[derive(Debug, Clone)]
pub struct Extraction {
    pub mode: ExtractionMode,

    pub sample_rate: u32,

    /// Signal duration in seconds
    pub duration: f64,

    /// Estimated tempo, only in beat mode
    pub tempo_bpm: Option<f64>,

    pub timestamps: TimestampSequence,

    pub output_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_mixdown() {
        let stereo_samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // L, R, L, R, L, R
        let mono = AudioSignal::mix_to_mono(&stereo_samples, 2);
        assert_eq!(mono, vec![1.5, 3.5, 5.5]);
    }

    #[test]
    fn test_duration() {
        let signal = AudioSignal::from_samples(vec![0.0; 22050], 44100);
        assert_eq!(signal.duration(), 0.5);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("onset".parse::<ExtractionMode>().unwrap(), ExtractionMode::Onset);
        assert_eq!("BEAT".parse::<ExtractionMode>().unwrap(), ExtractionMode::Beat);
        assert_eq!("tempo".parse::<ExtractionMode>().unwrap(), ExtractionMode::Beat);
        assert!("drums".parse::<ExtractionMode>().is_err());
        assert_eq!(ExtractionMode::default(), ExtractionMode::Onset);
    }

    #[test]
    fn test_sequence_monotonicity() {
        let sorted = TimestampSequence::new(vec![0.5, 1.0, 1.0, 1.5]);
        assert!(sorted.is_monotonic());
        assert_eq!(sorted.intervals(), vec![0.5, 0.0, 0.5]);

        let unsorted = TimestampSequence::new(vec![1.0, 0.5]);
        assert!(!unsorted.is_monotonic());

        assert!(TimestampSequence::default().is_monotonic());
    }
}
