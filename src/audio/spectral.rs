//! Spectral front end shared by onset detection and beat tracking.
//!
//! Frames are centred: the signal is zero-padded by `n_fft / 2` on both sides,
//! giving `1 + len / hop` frames. Frame `t` is therefore centred on sample
//! `t * hop`.

use std::f32::consts::PI;

use realfft::RealFftPlanner;

use crate::error::{AudioError, Result};

/// Floor applied before taking logarithms of power
const AMIN: f32 = 1e-10;

/// Dynamic range kept by [`power_to_db`]
const TOP_DB: f32 = 80.0;

/// Reduction applied across mel bands for each onset-envelope frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Median,
}

/// Periodic Hann window (the DFT-even variant)
pub fn hann_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / length as f32).cos())
        .collect()
}

/// Number of centred frames for a signal of `len` samples
pub fn frame_count(len: usize, hop_length: usize) -> usize {
    1 + len / hop_length
}

/// Power spectrogram, one `n_fft / 2 + 1` row per frame
pub fn power_spectrogram(samples: &[f32], n_fft: usize, hop_length: usize) -> Result<Vec<Vec<f32>>> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut input_buffer = fft.make_input_vec();
    let mut spectrum_buffer = fft.make_output_vec();
    let window = hann_window(n_fft);

    let pad = (n_fft / 2) as isize;
    let n_frames = frame_count(samples.len(), hop_length);
    let mut spectrogram = Vec::with_capacity(n_frames);

    for frame_idx in 0..n_frames {
        let start = (frame_idx * hop_length) as isize - pad;
        for (i, slot) in input_buffer.iter_mut().enumerate() {
            let pos = start + i as isize;
            let sample = if pos >= 0 {
                samples.get(pos as usize).copied().unwrap_or(0.0)
            } else {
                0.0
            };
            *slot = sample * window[i];
        }

        fft.process(&mut input_buffer, &mut spectrum_buffer)
            .map_err(|e| AudioError::AnalysisFailed {
                reason: format!("FFT processing failed: {}", e)
            })?;

        spectrogram.push(spectrum_buffer.iter().map(|c| c.norm_sqr()).collect());
    }

    Ok(spectrogram)
}

fn hz_to_mel(hz: f64) -> f64 {
    // Slaney scale: linear below 1 kHz, logarithmic above
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = (6.4f64).ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = (6.4f64).ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// One triangular mel filter, stored sparsely
#[derive(Debug, Clone)]
struct MelBand {
    first_bin: usize,
    weights: Vec<f32>,
}

/// Slaney-style mel filterbank from 0 Hz to Nyquist, area-normalised
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    bands: Vec<MelBand>,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let n_bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..n_bins)
            .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
            .collect();

        let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
        let mel_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
            .collect();

        let bands = mel_points
            .windows(3)
            .map(|edges| {
                let (lower, center, upper) = (edges[0], edges[1], edges[2]);
                let enorm = 2.0 / (upper - lower);

                let weights: Vec<(usize, f32)> = fft_freqs
                    .iter()
                    .enumerate()
                    .filter_map(|(k, &freq)| {
                        let rising = (freq - lower) / (center - lower);
                        let falling = (upper - freq) / (upper - center);
                        let weight = rising.min(falling).max(0.0) * enorm;
                        (weight > 0.0).then_some((k, weight as f32))
                    })
                    .collect();

                match (weights.first(), weights.last()) {
                    (Some(&(first_bin, _)), Some(&(last_bin, _))) => {
                        let mut dense = vec![0.0f32; last_bin - first_bin + 1];
                        for (k, weight) in weights {
                            dense[k - first_bin] = weight;
                        }
                        MelBand { first_bin, weights: dense }
                    }
                    _ => MelBand { first_bin: 0, weights: Vec::new() },
                }
            })
            .collect();

        Self { bands }
    }

    pub fn n_mels(&self) -> usize {
        self.bands.len()
    }

    /// Project one power spectrum frame onto the mel bands
    pub fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.bands
            .iter()
            .map(|band| {
                band.weights
                    .iter()
                    .zip(power.iter().skip(band.first_bin))
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }
}

/// Convert a power spectrogram to decibels, keeping the top 80 dB
pub fn power_to_db(spectrogram: &mut [Vec<f32>]) {
    let mut max_db = f32::NEG_INFINITY;
    for frame in spectrogram.iter_mut() {
        for value in frame.iter_mut() {
            *value = 10.0 * value.max(AMIN).log10();
            max_db = max_db.max(*value);
        }
    }

    let floor = max_db - TOP_DB;
    for frame in spectrogram.iter_mut() {
        for value in frame.iter_mut() {
            *value = value.max(floor);
        }
    }
}

/// Log-power mel spectrogram, one row per frame
pub fn log_mel_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
) -> Result<Vec<Vec<f32>>> {
    let filterbank = MelFilterbank::new(sample_rate, n_fft, n_mels);
    let mut mel: Vec<Vec<f32>> = power_spectrogram(samples, n_fft, hop_length)?
        .iter()
        .map(|frame| filterbank.apply(frame))
        .collect();
    power_to_db(&mut mel);
    Ok(mel)
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Spectral-flux onset strength envelope.
///
/// Positive first differences of the log-mel spectrogram, aggregated across
/// bands, shifted right by `1 + n_fft / (2 * hop)` frames so that peaks line
/// up with the centred frames, and trimmed to the frame count.
pub fn onset_strength(
    samples: &[f32],
    sample_rate: u32,
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
    aggregate: Aggregate,
) -> Result<Vec<f32>> {
    let mel = log_mel_spectrogram(samples, sample_rate, n_fft, hop_length, n_mels)?;
    let n_frames = mel.len();

    let lag = 1;
    let pad_width = lag + n_fft / (2 * hop_length);
    let mut envelope = vec![0.0f32; pad_width.min(n_frames)];

    let mut scratch = Vec::with_capacity(n_mels);
    for pair in mel.windows(1 + lag) {
        scratch.clear();
        scratch.extend(
            pair[lag]
                .iter()
                .zip(pair[0].iter())
                .map(|(cur, prev)| (cur - prev).max(0.0)),
        );
        let value = match aggregate {
            Aggregate::Mean => scratch.iter().sum::<f32>() / scratch.len().max(1) as f32,
            Aggregate::Median => median(&mut scratch),
        };
        envelope.push(value);
    }

    envelope.truncate(n_frames);
    tracing::debug!(
        "Onset envelope: {} frames, peak {:.3}",
        envelope.len(),
        envelope.iter().copied().fold(0.0f32, f32::max)
    );
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_matches_centring() {
        assert_eq!(frame_count(0, 512), 1);
        assert_eq!(frame_count(511, 512), 1);
        assert_eq!(frame_count(512, 512), 2);
        assert_eq!(frame_count(44100, 512), 87);
    }

    #[test]
    fn test_hann_window_is_periodic() {
        let window = hann_window(4);
        assert!((window[0] - 0.0).abs() < 1e-6);
        assert!((window[1] - 0.5).abs() < 1e-6);
        assert!((window[2] - 1.0).abs() < 1e-6);
        assert!((window[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mel_scale_roundtrip_points() {
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
        assert!((mel_to_hz(15.0) - 1000.0).abs() < 1e-9);
        assert!((mel_to_hz(hz_to_mel(4000.0)) - 4000.0).abs() < 1e-6);
    }

    #[test]
    fn test_filterbank_shape() {
        let bank = MelFilterbank::new(22050, 2048, 128);
        assert_eq!(bank.n_mels(), 128);
        let flat = vec![1.0f32; 1025];
        let projected = bank.apply(&flat);
        assert_eq!(projected.len(), 128);
        assert!(projected.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(projected.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn test_sine_energy_lands_in_its_bin() {
        let sr = 8000;
        let n_fft = 256;
        let freq = 1000.0;
        let samples: Vec<f32> = (0..4096)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect();
        let spec = power_spectrogram(&samples, n_fft, 128).unwrap();
        let middle = &spec[spec.len() / 2];
        let peak_bin = middle
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(peak_bin, 32); // 1000 Hz * 256 / 8000
    }

    #[test]
    fn test_power_to_db_clips_dynamic_range() {
        let mut spec = vec![vec![1.0f32, 0.0], vec![1e-3, 1e-12]];
        power_to_db(&mut spec);
        assert!((spec[0][0] - 0.0).abs() < 1e-4);
        assert!((spec[1][0] + 30.0).abs() < 1e-3);
        assert!((spec[0][1] + 80.0).abs() < 1e-4);
        assert!((spec[1][1] + 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_silence_has_flat_envelope() {
        let silence = vec![0.0f32; 22050];
        let env = onset_strength(&silence, 22050, 2048, 512, 128, Aggregate::Mean).unwrap();
        assert_eq!(env.len(), frame_count(silence.len(), 512));
        assert!(env.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_click_produces_envelope_peak() {
        let sr = 22050u32;
        let mut samples = vec![0.0f32; sr as usize];
        for (j, sample) in samples.iter_mut().skip(11025).take(200).enumerate() {
            *sample = 0.8 * (-(j as f32) / 40.0).exp();
        }

        let env = onset_strength(&samples, sr, 2048, 512, 128, Aggregate::Mean).unwrap();
        let peak_frame = env
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let expected = 11025 / 512;
        assert!(
            (peak_frame as i64 - expected as i64).abs() <= 3,
            "peak at frame {peak_frame}, expected near {expected}"
        );
    }

    #[test]
    fn test_median_of_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }
}
