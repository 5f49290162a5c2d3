use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the beat extractor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spectral analysis settings
    pub analysis: AnalysisConfig,

    /// Onset peak-picking settings
    pub onset: OnsetConfig,

    /// Tempo estimation and beat tracking settings
    pub beat: BeatConfig,

    /// Output file settings
    pub output: OutputConfig,

    /// Run-level settings
    pub run: RunConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.onset.validate()?;
        self.beat.validate()?;
        self.run.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// STFT and mel settings shared by both detection modes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT window size in samples
    pub n_fft: usize,

    /// Hop between successive frames in samples
    pub hop_length: usize,

    /// Number of mel bands
    pub n_mels: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
        }
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<()> {
        if self.n_fft == 0 || !self.n_fft.is_power_of_two() {
            return Err(invalid("analysis.n_fft", self.n_fft).into());
        }

        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(invalid("analysis.hop_length", self.hop_length).into());
        }

        if self.n_mels == 0 {
            return Err(invalid("analysis.n_mels", self.n_mels).into());
        }

        Ok(())
    }
}

/// Peak-picking windows (seconds) and threshold for onset detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub pre_max: f64,
    pub post_max: f64,
    pub pre_avg: f64,
    pub post_avg: f64,

    /// Minimum gap after a detected onset, in seconds
    pub wait: f64,

    /// Threshold above the local mean of the normalized envelope
    pub delta: f32,

    /// Roll each onset back to the preceding energy minimum
    pub backtrack: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            pre_max: 0.03,
            post_max: 0.0,
            pre_avg: 0.10,
            post_avg: 0.10,
            wait: 0.03,
            delta: 0.07,
            backtrack: false,
        }
    }
}

impl OnsetConfig {
    fn validate(&self) -> Result<()> {
        let windows = [
            ("onset.pre_max", self.pre_max),
            ("onset.post_max", self.post_max),
            ("onset.pre_avg", self.pre_avg),
            ("onset.post_avg", self.post_avg),
            ("onset.wait", self.wait),
        ];
        for (key, value) in windows {
            if !(value >= 0.0) {
                return Err(invalid(key, value).into());
            }
        }

        if !(self.delta >= 0.0) {
            return Err(invalid("onset.delta", self.delta).into());
        }

        Ok(())
    }
}

/// Tempo prior and dynamic-programming beat tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Center of the tempo prior (BPM)
    pub start_bpm: f64,

    /// Width of the tempo prior in octaves
    pub std_bpm: f64,

    /// Autocorrelation window in seconds
    pub ac_size: f64,

    /// Tempi at or above this are never chosen (BPM)
    pub max_tempo: f64,

    /// How strictly beats follow the estimated period
    pub tightness: f64,

    /// Drop weak beats at the start and end of the track
    pub trim: bool,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            std_bpm: 1.0,
            ac_size: 8.0,
            max_tempo: 320.0,
            tightness: 100.0,
            trim: true,
        }
    }
}

impl BeatConfig {
    fn validate(&self) -> Result<()> {
        if !(self.start_bpm > 0.0) {
            return Err(invalid("beat.start_bpm", self.start_bpm).into());
        }

        if !(self.std_bpm > 0.0) {
            return Err(invalid("beat.std_bpm", self.std_bpm).into());
        }

        if !(self.ac_size > 0.0) {
            return Err(invalid("beat.ac_size", self.ac_size).into());
        }

        if !(self.max_tempo > self.start_bpm) {
            return Err(invalid(
                "beat.tempo_range",
                format!("{}-{}", self.start_bpm, self.max_tempo),
            ).into());
        }

        if !(self.tightness > 0.0) {
            return Err(invalid("beat.tightness", self.tightness).into());
        }

        Ok(())
    }
}

/// Timestamp file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// How many timestamps to echo after writing
    pub preview_count: usize,

    /// Write through a temporary file and rename into place
    pub atomic: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            preview_count: 10,
            atomic: true,
        }
    }
}

/// Run-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Abort decode and detection after this many seconds
    pub timeout_secs: Option<u64>,
}

impl RunConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_secs == Some(0) {
            return Err(invalid("run.timeout_secs", 0).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.onset.backtrack = true;
        original_config.run.timeout_secs = Some(30);

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config.analysis.hop_length, loaded_config.analysis.hop_length);
        assert!(loaded_config.onset.backtrack);
        assert_eq!(loaded_config.run.timeout_secs, Some(30));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[beat]\nstart_bpm = 100.0\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.beat.start_bpm, 100.0);
        assert_eq!(config.analysis.n_fft, 2048);
        assert_eq!(config.output.preview_count, 10);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::from_file(dir.path().join("nope.toml"));
        assert!(matches!(
            result,
            Err(crate::error::ExtractorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_fft_size() {
        let mut config = Config::default();
        config.analysis.n_fft = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_tempo_range() {
        let mut config = Config::default();
        config.beat.start_bpm = 400.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.run.timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
