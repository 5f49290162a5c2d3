use std::path::Path;

use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

use crate::audio::loader::AudioLoader;
use crate::audio::provider::AnalysisProvider;
use crate::audio::spectral::{self, Aggregate};
use crate::audio::types::{AudioSignal, BeatTrack};
use crate::config::{AnalysisConfig, BeatConfig, Config, OnsetConfig};
use crate::error::{AudioError, Result};

/// Native analysis backend: spectral-flux onsets and dynamic-programming beat tracking
#[derive(Debug, Clone)]
pub struct AudioAnalyzer {
    analysis: AnalysisConfig,
    onset: OnsetConfig,
    beat: BeatConfig,
}

impl AudioAnalyzer {
    /// Create a new analyzer with default configuration
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create a new analyzer from the analysis sections of a config
    pub fn from_config(config: &Config) -> Self {
        Self {
            analysis: config.analysis.clone(),
            onset: config.onset.clone(),
            beat: config.beat.clone(),
        }
    }

    fn check_signal(signal: &AudioSignal) -> Result<()> {
        if signal.sample_rate == 0 {
            return Err(AudioError::InvalidParameters {
                details: "sample rate must be positive".to_string()
            }.into());
        }
        Ok(())
    }

    /// Onset strength envelope of a signal, one value per frame
    pub fn onset_envelope(&self, signal: &AudioSignal, aggregate: Aggregate) -> Result<Vec<f32>> {
        Self::check_signal(signal)?;
        spectral::onset_strength(
            &signal.samples,
            signal.sample_rate,
            self.analysis.n_fft,
            self.analysis.hop_length,
            self.analysis.n_mels,
            aggregate,
        )
    }

    fn seconds_to_frames(&self, seconds: f64, sample_rate: u32) -> usize {
        (seconds * sample_rate as f64 / self.analysis.hop_length as f64).floor() as usize
    }

    /// Onset positions in frames
    pub fn detect_onset_frames(&self, signal: &AudioSignal) -> Result<Vec<usize>> {
        let mut envelope = self.onset_envelope(signal, Aggregate::Mean)?;

        if envelope.iter().all(|&v| v == 0.0) {
            tracing::debug!("Onset envelope is flat, no onsets");
            return Ok(Vec::new());
        }

        normalize_unit_range(&mut envelope);

        let sr = signal.sample_rate;
        let picker = PeakPicker {
            pre_max: self.seconds_to_frames(self.onset.pre_max, sr),
            post_max: self.seconds_to_frames(self.onset.post_max, sr) + 1,
            pre_avg: self.seconds_to_frames(self.onset.pre_avg, sr),
            post_avg: self.seconds_to_frames(self.onset.post_avg, sr) + 1,
            wait: self.seconds_to_frames(self.onset.wait, sr),
            delta: self.onset.delta,
        };
        let mut onsets = picker.pick(&envelope);

        if self.onset.backtrack {
            onsets = backtrack_to_minima(&onsets, &envelope);
        }

        tracing::debug!("Peak picking kept {} of {} frames", onsets.len(), envelope.len());
        Ok(onsets)
    }

    /// Global tempo from the autocorrelation tempogram, weighted by a log-normal prior
    pub fn estimate_tempo(&self, envelope: &[f32], sample_rate: u32) -> Result<f64> {
        let hop = self.analysis.hop_length;
        let win_length = self.seconds_to_frames(self.beat.ac_size, sample_rate).max(2);
        let tempogram = mean_tempogram(envelope, win_length)?;

        let frames_per_minute = 60.0 * sample_rate as f64 / hop as f64;
        let log2_start = self.beat.start_bpm.log2();

        let best = tempogram
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(lag, &strength)| {
                let bpm = frames_per_minute / lag as f64;
                if bpm >= self.beat.max_tempo {
                    return None;
                }
                let prior = -0.5 * ((bpm.log2() - log2_start) / self.beat.std_bpm).powi(2);
                Some((bpm, (1.0 + 1e6 * strength as f64).ln() + prior))
            })
            .fold(None, |best: Option<(f64, f64)>, (bpm, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((bpm, score)),
            });

        let (bpm, score) = best.ok_or_else(|| AudioError::AnalysisFailed {
            reason: format!("no tempo candidates below {} BPM", self.beat.max_tempo)
        })?;

        tracing::debug!("Tempo estimate {:.2} BPM (score {:.3}, window {} frames)", bpm, score, win_length);
        Ok(bpm)
    }

    /// Beat frames following a fixed tempo through the onset envelope
    pub fn track_beats(&self, envelope: &[f32], tempo_bpm: f64, sample_rate: u32) -> Result<Vec<usize>> {
        if !(tempo_bpm > 0.0) {
            return Err(AudioError::InvalidParameters {
                details: format!("tempo must be positive, got {}", tempo_bpm)
            }.into());
        }
        if envelope.is_empty() {
            return Ok(Vec::new());
        }

        let frame_rate = sample_rate as f64 / self.analysis.hop_length as f64;
        let period = ((60.0 * frame_rate / tempo_bpm).round() as usize).max(1);
        let local = local_score(envelope, period);

        let (backlink, cumscore) = beat_dynamic_program(&local, period, self.beat.tightness);

        let Some(tail) = last_beat(&cumscore) else {
            return Ok(Vec::new());
        };

        let mut beats = vec![tail];
        while let Some(&prev) = beats.last() {
            match usize::try_from(backlink[prev]) {
                Ok(link) => beats.push(link),
                Err(_) => break,
            }
        }
        beats.reverse();

        let beats = trim_beats(&local, beats, self.beat.trim);
        tracing::debug!("Beat tracker: period {} frames, {} beats", period, beats.len());
        Ok(beats)
    }
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisProvider for AudioAnalyzer {
    fn name(&self) -> &str {
        "spectral-flux"
    }

    fn decode(&self, path: &Path) -> Result<AudioSignal> {
        AudioLoader::load(path)
    }

    fn onset_detect(&self, signal: &AudioSignal) -> Result<Vec<f64>> {
        let frames = self.detect_onset_frames(signal)?;
        Ok(self.frames_to_time(&frames, signal.sample_rate))
    }

    fn beat_track(&self, signal: &AudioSignal) -> Result<BeatTrack> {
        let envelope = self.onset_envelope(signal, Aggregate::Median)?;

        if envelope.iter().all(|&v| v == 0.0) {
            tracing::debug!("Onset envelope is flat, no beats");
            return Ok(BeatTrack::empty());
        }

        let tempo_bpm = self.estimate_tempo(&envelope, signal.sample_rate)?;
        let frames = self.track_beats(&envelope, tempo_bpm, signal.sample_rate)?;
        Ok(BeatTrack { tempo_bpm, frames })
    }

    fn hop_length(&self) -> usize {
        self.analysis.hop_length
    }
}

/// Shift to zero minimum and scale to unit maximum
fn normalize_unit_range(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    for v in values.iter_mut() {
        *v -= min;
    }
    let max = values.iter().copied().fold(0.0f32, f32::max);
    let scale = max + f32::MIN_POSITIVE;
    for v in values.iter_mut() {
        *v /= scale;
    }
}

/// Adaptive local-maximum peak picker (window sizes in frames)
#[derive(Debug, Clone, Copy)]
struct PeakPicker {
    pre_max: usize,
    post_max: usize,
    pre_avg: usize,
    post_avg: usize,
    wait: usize,
    delta: f32,
}

impl PeakPicker {
    /// A frame is a peak when it is the maximum of its max-window and exceeds
    /// the mean of its avg-window by `delta`. After a peak, `wait` frames are skipped.
    fn pick(&self, x: &[f32]) -> Vec<usize> {
        let len = x.len();
        let mut peaks = Vec::new();
        let mut n = 0;

        while n < len {
            let lo = n.saturating_sub(self.pre_max);
            let hi = (n + self.post_max.max(1)).min(len);
            let local_max = x[lo..hi].iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if x[n] != local_max {
                n += 1;
                continue;
            }

            let lo = n.saturating_sub(self.pre_avg);
            let hi = (n + self.post_avg.max(1)).min(len);
            let local_mean = x[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
            if x[n] < local_mean + self.delta {
                n += 1;
                continue;
            }

            peaks.push(n);
            n += self.wait + 1;
        }

        peaks
    }
}

/// Move each event back to the nearest preceding local minimum of `energy`
fn backtrack_to_minima(events: &[usize], energy: &[f32]) -> Vec<usize> {
    let mut minima = vec![0usize];
    minima.extend(
        (1..energy.len().saturating_sub(1))
            .filter(|&i| energy[i] <= energy[i - 1] && energy[i] < energy[i + 1]),
    );

    events
        .iter()
        .map(|&event| {
            let idx = minima.partition_point(|&m| m <= event);
            minima[idx.saturating_sub(1)]
        })
        .collect()
}

/// Time-averaged autocorrelation tempogram, one value per lag in `0..win_length`
fn mean_tempogram(envelope: &[f32], win_length: usize) -> Result<Vec<f32>> {
    let half = win_length / 2;

    // Linear ramp to zero on both sides
    let first = envelope.first().copied().unwrap_or(0.0);
    let last = envelope.last().copied().unwrap_or(0.0);
    let mut padded = Vec::with_capacity(envelope.len() + 2 * half);
    padded.extend((0..half).map(|i| first * i as f32 / half as f32));
    padded.extend_from_slice(envelope);
    padded.extend((0..half).map(|j| last * (half - 1 - j) as f32 / half as f32));

    let window = spectral::hann_window(win_length);
    let n_fft = (2 * win_length - 1).next_power_of_two();
    let mut planner = RealFftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n_fft);
    let inverse = planner.plan_fft_inverse(n_fft);
    let mut time_buf = forward.make_input_vec();
    let mut freq_buf = forward.make_output_vec();

    let mut accum = vec![0.0f32; win_length];
    let mut n_frames = 0usize;

    for frame in padded.windows(win_length) {
        time_buf.iter_mut().for_each(|v| *v = 0.0);
        for ((slot, &x), &w) in time_buf.iter_mut().zip(frame).zip(&window) {
            *slot = x * w;
        }

        forward.process(&mut time_buf, &mut freq_buf)
            .map_err(|e| AudioError::AnalysisFailed {
                reason: format!("tempogram FFT failed: {}", e)
            })?;
        for bin in freq_buf.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        inverse.process(&mut freq_buf, &mut time_buf)
            .map_err(|e| AudioError::AnalysisFailed {
                reason: format!("tempogram inverse FFT failed: {}", e)
            })?;

        let peak = time_buf[..win_length].iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        if peak > f32::MIN_POSITIVE {
            for (acc, &v) in accum.iter_mut().zip(&time_buf[..win_length]) {
                *acc += v / peak;
            }
        }
        n_frames += 1;
    }

    if n_frames > 0 {
        for acc in accum.iter_mut() {
            *acc /= n_frames as f32;
        }
    }
    Ok(accum)
}

/// Envelope scaled to unit sample std, smoothed with a Gaussian one period wide
fn local_score(envelope: &[f32], period: usize) -> Vec<f64> {
    let n = envelope.len();
    let values: Vec<f64> = envelope.iter().map(|&v| v as f64).collect();

    let std = if n > 1 {
        let mean = values.iter().sum::<f64>() / n as f64;
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    let norm = if std > 0.0 { std } else { 1.0 };

    let p = period as isize;
    let kernel: Vec<f64> = (-p..=p)
        .map(|k| (-0.5 * (k as f64 * 32.0 / period as f64).powi(2)).exp())
        .collect();

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .zip(-p..=p)
                .filter_map(|(&w, k)| {
                    let idx = i + k;
                    (idx >= 0 && idx < n as isize).then(|| values[idx as usize] / norm * w)
                })
                .sum()
        })
        .collect()
}

/// Cumulative beat score and best-predecessor links.
///
/// A link of -1 means the frame starts a new chain.
fn beat_dynamic_program(local: &[f64], period: usize, tightness: f64) -> (Vec<isize>, Vec<f64>) {
    let n = local.len();
    let p = period as isize;
    let offsets: Vec<isize> = (-2 * p..=-((period as f64 / 2.0).round() as isize)).collect();
    let txwt: Vec<f64> = offsets
        .iter()
        .map(|&off| -tightness * (-(off as f64) / period as f64).ln().powi(2))
        .collect();

    let max_local = local.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut backlink = vec![-1isize; n];
    let mut cumscore = vec![0.0f64; n];
    let mut first_beat = true;

    for i in 0..n {
        let mut best_score = f64::NEG_INFINITY;
        let mut best_pred = -1isize;
        for (&off, &weight) in offsets.iter().zip(&txwt) {
            let pred = i as isize + off;
            let score = if pred >= 0 { weight + cumscore[pred as usize] } else { weight };
            if score > best_score {
                best_score = score;
                best_pred = pred;
            }
        }

        cumscore[i] = local[i] + best_score;

        if first_beat && local[i] < 0.01 * max_local {
            backlink[i] = -1;
        } else {
            backlink[i] = best_pred;
            first_beat = false;
        }
    }

    (backlink, cumscore)
}

/// Last local maximum of the cumulative score above half the median peak
fn last_beat(cumscore: &[f64]) -> Option<usize> {
    let n = cumscore.len();
    let is_peak = |i: usize| {
        let prev = cumscore[i.saturating_sub(1)];
        let next = cumscore[(i + 1).min(n - 1)];
        cumscore[i] > prev && cumscore[i] >= next
    };

    let mut peaks: Vec<f64> = (0..n).filter(|&i| is_peak(i)).map(|i| cumscore[i]).collect();
    if peaks.is_empty() {
        return None;
    }
    peaks.sort_by(f64::total_cmp);
    let mid = peaks.len() / 2;
    let median = if peaks.len() % 2 == 0 {
        0.5 * (peaks[mid - 1] + peaks[mid])
    } else {
        peaks[mid]
    };

    (0..n).rev().find(|&i| {
        let value = if is_peak(i) { 2.0 * cumscore[i] } else { 0.0 };
        value > median
    })
}

/// Drop weak leading and trailing beats
fn trim_beats(local: &[f64], beats: Vec<usize>, trim: bool) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }

    let at_beats: Vec<f64> = beats.iter().map(|&b| local[b]).collect();
    let m = at_beats.len();
    // Hann(5) = [0, 0.5, 1, 0.5, 0]
    let smooth: Vec<f64> = (0..m)
        .map(|k| {
            let before = if k > 0 { at_beats[k - 1] } else { 0.0 };
            let after = if k + 1 < m { at_beats[k + 1] } else { 0.0 };
            0.5 * before + at_beats[k] + 0.5 * after
        })
        .collect();

    let threshold = if trim {
        0.5 * (smooth.iter().map(|v| v * v).sum::<f64>() / m as f64).sqrt()
    } else {
        0.0
    };

    let first = smooth.iter().position(|&v| v > threshold);
    let last = smooth.iter().rposition(|&v| v > threshold);
    match (first, last) {
        (Some(first), Some(last)) => beats[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn click_track(duration: f64, offset: f64) -> AudioSignal {
        crate::synth::click_track(duration, 120.0, offset, SR)
    }

    #[test]
    fn test_peak_picker_respects_wait() {
        let picker = PeakPicker { pre_max: 1, post_max: 1, pre_avg: 1, post_avg: 1, wait: 2, delta: 0.1 };
        let x = [0.0, 1.0, 0.0, 0.9, 0.0, 0.0, 1.0, 0.0];
        // frame 3 is inside the wait window after frame 1
        assert_eq!(picker.pick(&x), vec![1, 6]);
    }

    #[test]
    fn test_peak_picker_requires_delta_above_mean() {
        let picker = PeakPicker { pre_max: 2, post_max: 1, pre_avg: 2, post_avg: 1, wait: 0, delta: 0.3 };
        let x = [0.2, 0.4, 0.3, 1.0, 0.2];
        assert_eq!(picker.pick(&x), vec![3]);
    }

    #[test]
    fn test_backtrack_moves_to_preceding_minimum() {
        let energy = [0.5, 0.2, 0.8, 1.0, 0.3, 0.1, 0.6, 0.9];
        assert_eq!(backtrack_to_minima(&[3, 7], &energy), vec![1, 5]);
        assert_eq!(backtrack_to_minima(&[0], &energy), vec![0]);
    }

    #[test]
    fn test_normalize_unit_range() {
        let mut values = vec![1.0, 3.0, 2.0];
        normalize_unit_range(&mut values);
        assert_eq!(values[0], 0.0);
        assert!((values[1] - 1.0).abs() < 1e-6);
        assert!((values[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let analyzer = AudioAnalyzer::new();
        let silence = AudioSignal::from_samples(vec![0.0; SR as usize * 5], SR);
        assert!(analyzer.onset_detect(&silence).unwrap().is_empty());
    }

    #[test]
    fn test_silence_has_no_beats() {
        let analyzer = AudioAnalyzer::new();
        let silence = AudioSignal::from_samples(vec![0.0; SR as usize * 2], SR);
        let track = analyzer.beat_track(&silence).unwrap();
        assert_eq!(track, BeatTrack::empty());
    }

    #[test]
    fn test_onsets_follow_clicks() {
        let analyzer = AudioAnalyzer::new();
        let signal = click_track(4.0, 0.25);
        let onsets = analyzer.onset_detect(&signal).unwrap();

        assert_eq!(onsets.len(), 8, "onsets: {onsets:?}");
        for (i, &t) in onsets.iter().enumerate() {
            let expected = 0.25 + 0.5 * i as f64;
            assert!((t - expected).abs() < 0.05, "onset {i} at {t}, expected {expected}");
        }
    }

    #[test]
    fn test_backtracked_onsets_do_not_move_later() {
        let mut config = Config::default();
        let plain = AudioAnalyzer::from_config(&config);
        config.onset.backtrack = true;
        let backtracked = AudioAnalyzer::from_config(&config);

        let signal = click_track(3.0, 0.25);
        let a = plain.onset_detect(&signal).unwrap();
        let b = backtracked.onset_detect(&signal).unwrap();
        assert_eq!(a.len(), b.len());
        assert!(a.iter().zip(&b).all(|(x, y)| y <= x));
    }

    #[test]
    fn test_click_track_tempo_and_beats() {
        let analyzer = AudioAnalyzer::new();
        let signal = click_track(10.0, 0.0);
        let track = analyzer.beat_track(&signal).unwrap();

        assert!((track.tempo_bpm - 120.0).abs() <= 5.0, "tempo {}", track.tempo_bpm);
        assert!((15..=22).contains(&track.frames.len()), "{} beats", track.frames.len());

        let times = analyzer.frames_to_time(&track.frames, SR);
        assert!(times.windows(2).all(|w| w[1] >= w[0]));
        for gap in times.windows(2).map(|w| w[1] - w[0]) {
            assert!((gap - 0.5).abs() <= 0.05, "beat spacing {gap}");
        }
    }

    #[test]
    fn test_tempo_prefers_prior_octave() {
        let analyzer = AudioAnalyzer::new();
        let signal = click_track(10.0, 0.0);
        let envelope = analyzer.onset_envelope(&signal, Aggregate::Median).unwrap();
        let tempo = analyzer.estimate_tempo(&envelope, SR).unwrap();
        // 60 and 240 BPM are also periodic in this envelope
        assert!((tempo - 120.0).abs() <= 5.0, "tempo {tempo}");
    }

    #[test]
    fn test_trim_drops_weak_edges() {
        let local = vec![0.1, 0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.1];
        let beats = vec![0, 3, 6, 9, 12];
        assert_eq!(trim_beats(&local, beats.clone(), true), vec![3, 6, 9]);
        assert_eq!(trim_beats(&local, beats.clone(), false), beats);
    }

    #[test]
    fn test_track_beats_rejects_zero_tempo() {
        let analyzer = AudioAnalyzer::new();
        assert!(analyzer.track_beats(&[0.0, 1.0], 0.0, SR).is_err());
    }
}
