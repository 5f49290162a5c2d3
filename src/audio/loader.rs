use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::types::{AudioFormat, AudioSignal};
use crate::error::{AudioError, Result};

/// Audio file loader supporting multiple formats.
///
/// Always returns mono samples at the file's native sample rate.
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file and mix it down to mono
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioSignal> {
        let path = path.as_ref();
        let extension = Self::detect_format(path).unwrap_or_default();

        let signal = match extension.as_str() {
            // hound rejects some valid WAV variants (e.g. WAVE_FORMAT_EXTENSIBLE float)
            "wav" => Self::load_wav(path).or_else(|err| {
                tracing::debug!("hound could not read {:?} ({}), retrying with symphonia", path, err);
                Self::load_with_symphonia(path)
            })?,
            _ => Self::load_with_symphonia(path)?,
        };

        if signal.samples.is_empty() {
            return Err(AudioError::Empty { path: path.display().to_string() }.into());
        }

        Ok(signal)
    }

    /// Load WAV files using the hound crate (most reliable for WAV)
    fn load_wav(path: &Path) -> Result<AudioSignal> {
        let load_failed = || AudioError::LoadFailed { path: path.display().to_string() };

        let reader = hound::WavReader::open(path).map_err(|_| load_failed())?;

        let spec = reader.spec();
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(AudioError::InvalidStream {
                path: path.display().to_string(),
                details: format!("{} Hz, {} channels", spec.sample_rate, spec.channels),
            }.into());
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| load_failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| Self::int_to_float(s, bit_depth)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| load_failed())?
            }
        };

        Ok(AudioSignal {
            samples: AudioSignal::mix_to_mono(&interleaved, spec.channels),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            file_path: path.to_path_buf(),
            format: AudioFormat {
                extension: "wav".to_string(),
                bit_depth: Some(spec.bits_per_sample),
                compression: None,
            },
        })
    }

    /// Load any format Symphonia can probe
    fn load_with_symphonia(path: &Path) -> Result<AudioSignal> {
        let load_failed = || AudioError::LoadFailed { path: path.display().to_string() };

        let file = File::open(path).map_err(|_| load_failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a probe hint using the file extension
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|err| match err {
                SymphoniaError::Unsupported(_) => AudioError::UnsupportedFormat {
                    format: Self::detect_format(path).unwrap_or_else(|| "unknown".to_string()),
                },
                _ => load_failed(),
            })?;

        let mut format = probed.format;

        // Find the first audio track with a known (decodable) codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::NoAudioTrack { path: path.display().to_string() })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| AudioError::InvalidStream {
                path: path.display().to_string(),
                details: "no sample rate".to_string(),
            })?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|_| AudioError::UnsupportedFormat {
                format: format!("{:?}", codec_params.codec),
            })?;

        let mut mono = Vec::new();
        let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => {
                    tracing::warn!("Stopping at unreadable packet in {:?}: {}", path, err);
                    break;
                }
            };

            // Consume any new metadata
            while !format.metadata().is_latest() {
                format.metadata().pop();
            }

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    tracing::warn!("Skipping corrupt packet in {:?}: {}", path, err);
                    continue;
                }
                Err(_) => return Err(load_failed().into()),
            };

            let spec = *decoded.spec();
            let frames = decoded.capacity() as u64;
            if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < decoded.capacity() * spec.channels.count()) {
                sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            channels = spec.channels.count() as u16;
            mono.extend(AudioSignal::mix_to_mono(buf.samples(), channels));
        }

        Ok(AudioSignal {
            samples: mono,
            sample_rate,
            channels: channels.max(1),
            file_path: path.to_path_buf(),
            format: AudioFormat {
                extension: Self::detect_format(path).unwrap_or_else(|| "unknown".to_string()),
                bit_depth: codec_params.bits_per_sample.map(|b| b as u16),
                compression: Some(format!("{:?}", codec_params.codec)),
            },
        })
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => sample as f32 / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0, // Default to 16-bit
        }
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractorError, FailureKind};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[Vec<i16>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &sample in frame {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioLoader::detect_format("test.wav"), Some("wav".to_string()));
        assert_eq!(AudioLoader::detect_format("test.MP3"), Some("mp3".to_string()));
        assert_eq!(AudioLoader::detect_format("test"), None);
    }

    #[test]
    fn test_int_to_float_conversion() {
        assert_eq!(AudioLoader::int_to_float(0, 16), 0.0);
        assert_eq!(AudioLoader::int_to_float(-32768, 16), -1.0);
        assert_eq!(AudioLoader::int_to_float(16384, 16), 0.5);
        assert_eq!(AudioLoader::int_to_float(-128, 8), -1.0);
    }

    #[test]
    fn test_load_stereo_wav_keeps_native_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let frames: Vec<Vec<i16>> = (0..480).map(|_| vec![16384, 0]).collect();
        write_wav(&path, 2, 48000, &frames);

        let signal = AudioLoader::load(&path).unwrap();
        assert_eq!(signal.sample_rate, 48000);
        assert_eq!(signal.channels, 2);
        assert_eq!(signal.samples.len(), 480);
        assert!(signal.samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!((signal.duration() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let dir = tempdir().unwrap();
        let result = AudioLoader::load(dir.path().join("missing.wav"));
        assert!(matches!(
            result,
            Err(ExtractorError::Audio(AudioError::LoadFailed { .. }))
        ));
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.xyz");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"dummy content").unwrap();

        let err = AudioLoader::load(&file_path).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Decode);
    }

    #[test]
    fn test_empty_wav_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1, 44100, &[]);

        let result = AudioLoader::load(&path);
        assert!(matches!(
            result,
            Err(ExtractorError::Audio(AudioError::Empty { .. }))
        ));
    }

    #[test]
    fn test_zero_sample_rate_is_decode_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zero_rate.wav");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&0u32.to_le_bytes()); // sample rate
        bytes.extend_from_slice(&0u32.to_le_bytes()); // byte rate
        bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 16, 0, 240]);
        std::fs::write(&path, bytes).unwrap();

        let err = AudioLoader::load(&path).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Decode);
    }
}
