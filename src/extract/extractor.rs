use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    audio::{AnalysisProvider, AudioAnalyzer, Extraction, ExtractionMode, TimestampSequence},
    config::Config,
    error::{AudioError, OutputError, Result},
    extract::output::{format_record, TimestampWriter},
};

/// Result of decode + detection, before anything touches the output file
#[derive(Debug)]
struct Detection {
    sample_rate: u32,
    duration: f64,
    tempo_bpm: Option<f64>,
    timestamps: TimestampSequence,
}

/// Runs one decode → detect → write pipeline per call
///
/// The output file is only touched after decoding and detection have both
/// succeeded, so a failed run never truncates an existing file.
pub struct BeatExtractor {
    config: Config,
    provider: Arc<dyn AnalysisProvider>,
}

impl BeatExtractor {
    /// Create an extractor backed by the native analyzer
    pub fn new(config: Config) -> Self {
        let provider = Arc::new(AudioAnalyzer::from_config(&config));
        Self::with_provider(config, provider)
    }

    /// Create an extractor backed by a custom analysis provider
    pub fn with_provider(config: Config, provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { config, provider }
    }

    /// Extract timestamps from `audio_path` and write them to `output_path`
    ///
    /// # Arguments
    ///
    /// * `audio_path` - Audio file to analyze (WAV, MP3, FLAC, OGG, ...)
    /// * `output_path` - Text file to create or overwrite
    /// * `mode` - Onset detection or tempo-tracked beats
    pub async fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        audio_path: P,
        output_path: Q,
        mode: ExtractionMode,
    ) -> Result<Extraction> {
        let audio_path = audio_path.as_ref().to_path_buf();
        let output_path = output_path.as_ref().to_path_buf();

        Self::ensure_distinct(&audio_path, &output_path)?;

        info!("Loading audio file: {}", audio_path.display());
        debug!("Backend: {}, mode: {}", self.provider.name(), mode);

        let detection = self.detect_with_timeout(audio_path, mode).await?;

        TimestampWriter::new(self.config.output.atomic).write(&output_path, &detection.timestamps)?;
        info!("Beat timestamps saved to: {}", output_path.display());

        self.report_preview(&detection.timestamps);

        Ok(Extraction {
            mode,
            sample_rate: detection.sample_rate,
            duration: detection.duration,
            tempo_bpm: detection.tempo_bpm,
            timestamps: detection.timestamps,
            output_path,
        })
    }

    /// Refuse to write the timestamps over the audio being read
    fn ensure_distinct(audio_path: &Path, output_path: &Path) -> Result<()> {
        let same = match (audio_path.canonicalize(), output_path.canonicalize()) {
            (Ok(audio), Ok(output)) => audio == output,
            _ => audio_path == output_path,
        };
        if same {
            return Err(OutputError::SameAsInput { path: output_path.display().to_string() }.into());
        }
        Ok(())
    }

    /// Run the CPU-bound part on the blocking pool, bounded by `run.timeout_secs`
    async fn detect_with_timeout(&self, audio_path: PathBuf, mode: ExtractionMode) -> Result<Detection> {
        let provider = Arc::clone(&self.provider);
        let task = tokio::task::spawn_blocking(move || Self::detect(provider.as_ref(), &audio_path, mode));

        let joined = match self.config.run.timeout_secs {
            Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), task)
                .await
                .map_err(|_| {
                    warn!("Analysis exceeded {}s, abandoning", seconds);
                    AudioError::TimedOut { seconds }
                })?,
            None => task.await,
        };

        joined.map_err(|e| AudioError::AnalysisFailed {
            reason: format!("analysis worker failed: {}", e)
        })?
    }

    fn detect(provider: &dyn AnalysisProvider, audio_path: &Path, mode: ExtractionMode) -> Result<Detection> {
        let signal = provider.decode(audio_path)?;
        info!(
            "Audio loaded. Sample rate: {} Hz, Duration: {:.2} seconds",
            signal.sample_rate,
            signal.duration()
        );

        let (tempo_bpm, times) = match mode {
            ExtractionMode::Onset => (None, provider.onset_detect(&signal)?),
            ExtractionMode::Beat => {
                info!("Estimating tempo and detecting beats...");
                let track = provider.beat_track(&signal)?;
                let times = provider.frames_to_time(&track.frames, signal.sample_rate);
                info!("Estimated tempo: {:.2} beats per minute", track.tempo_bpm);
                (Some(track.tempo_bpm), times)
            }
        };

        let timestamps = TimestampSequence::new(times);
        if !timestamps.is_monotonic() {
            warn!("Detector returned out-of-order timestamps; writing them in detection order");
        }
        info!("Estimated {} {}s.", timestamps.len(), mode.name());

        Ok(Detection {
            sample_rate: signal.sample_rate,
            duration: signal.duration(),
            tempo_bpm,
            timestamps,
        })
    }

    fn report_preview(&self, timestamps: &TimestampSequence) {
        let count = self.config.output.preview_count;
        if count == 0 || timestamps.is_empty() {
            return;
        }

        info!("Timestamps (first {}):", count);
        for &t in timestamps.iter().take(count) {
            info!("  {}", format_record(t).trim_end());
        }
    }
}
