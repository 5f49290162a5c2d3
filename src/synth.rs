//! Synthetic test signals: digital silence and metronome click tracks.
//!
//! Used by the `make_fixtures` binary and the test suites.

use std::f32::consts::PI;
use std::path::Path;

use crate::audio::types::AudioSignal;
use crate::error::{AudioError, Result};

/// Length of one click in seconds
const CLICK_SECONDS: f64 = 0.01;

/// Digital silence
pub fn silence(duration: f64, sample_rate: u32) -> AudioSignal {
    let len = (duration * sample_rate as f64) as usize;
    AudioSignal::from_samples(vec![0.0; len], sample_rate)
}

/// Metronome at `bpm`, first click at `offset` seconds.
///
/// Each click is a sharply decaying 1 kHz burst, broadband enough to excite
/// every mel band.
pub fn click_track(duration: f64, bpm: f64, offset: f64, sample_rate: u32) -> AudioSignal {
    let len = (duration * sample_rate as f64) as usize;
    let mut samples = vec![0.0f32; len];
    let interval = 60.0 / bpm;
    let click_len = (CLICK_SECONDS * sample_rate as f64) as usize;
    let decay = sample_rate as f32 / 2205.0; // ~0.45 ms time constant

    let mut t = offset;
    while t < duration {
        let start = (t * sample_rate as f64).round() as usize;
        for j in 0..click_len {
            if let Some(sample) = samples.get_mut(start + j) {
                let phase = 2.0 * PI * 1000.0 * j as f32 / sample_rate as f32;
                *sample += 0.8 * phase.sin() * (-(j as f32) / decay).exp();
            }
        }
        t += interval;
    }

    AudioSignal::from_samples(samples, sample_rate)
}

/// Write a mono signal as 16-bit PCM WAV
pub fn write_wav<P: AsRef<Path>>(path: P, signal: &AudioSignal) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: signal.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let fail = |e: hound::Error| AudioError::AnalysisFailed {
        reason: format!("cannot write {}: {}", path.display(), e),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(fail)?;
    for &sample in &signal.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(fail)?;
    }
    writer.finalize().map_err(fail)?;
    Ok(())
}
