use thiserror::Error;

/// Main error type for the beat-extractor library
#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Audio decoding and analysis errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("No decodable audio track in: {path}")]
    NoAudioTrack { path: String },

    #[error("Audio file contains no samples: {path}")]
    Empty { path: String },

    #[error("Unusable audio stream in {path}: {details}")]
    InvalidStream { path: String, details: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },

    #[error("Audio analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("Analysis did not finish within {seconds}s")]
    TimedOut { seconds: u64 },
}

/// Errors raised while writing the timestamp file
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Cannot write output file {path}: {reason}")]
    Unwritable { path: String, reason: String },

    #[error("Output path {path} is the input audio file")]
    SameAsInput { path: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ExtractorError
pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Operator-facing failure taxonomy. Every kind terminates the run with status 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Wrong command-line usage
    Usage,
    /// Audio unreadable or undecodable
    Decode,
    /// Detection failed inside the analysis provider
    Analysis,
    /// Output path not writable
    Write,
    /// Configuration file missing or invalid
    Config,
}

impl FailureKind {
    /// Process exit status for this kind of failure
    pub fn exit_code(self) -> i32 {
        1
    }
}

impl ExtractorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Classify this error into the operator-facing taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Audio(
                AudioError::LoadFailed { .. }
                | AudioError::UnsupportedFormat { .. }
                | AudioError::NoAudioTrack { .. }
                | AudioError::Empty { .. }
                | AudioError::InvalidStream { .. },
            ) => FailureKind::Decode,
            Self::Audio(_) => FailureKind::Analysis,
            Self::Output(_) => FailureKind::Write,
            Self::Config(_) => FailureKind::Config,
            Self::Io(_) | Self::Generic(_) => FailureKind::Analysis,
        }
    }

    /// Get a user-friendly one-line error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Audio(AudioError::LoadFailed { path }) => {
                format!("Could not load audio file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Audio(AudioError::TimedOut { seconds }) => {
                format!("Analysis timed out after {}s; try a shorter file or raise --timeout.", seconds)
            }
            Self::Output(OutputError::Unwritable { path, reason }) => {
                format!("Could not write timestamps to '{}': {}", path, reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_classify_as_decode() {
        let err: ExtractorError = AudioError::LoadFailed { path: "a.wav".into() }.into();
        assert_eq!(err.kind(), FailureKind::Decode);

        let err: ExtractorError = AudioError::Empty { path: "a.wav".into() }.into();
        assert_eq!(err.kind(), FailureKind::Decode);

        let err: ExtractorError = AudioError::InvalidStream {
            path: "a.wav".into(),
            details: "0 Hz, 1 channels".into(),
        }.into();
        assert_eq!(err.kind(), FailureKind::Decode);

        // bad parameters handed to the detectors stay analysis failures
        let err: ExtractorError = AudioError::InvalidParameters { details: "tempo".into() }.into();
        assert_eq!(err.kind(), FailureKind::Analysis);
    }

    #[test]
    fn test_analysis_and_write_kinds() {
        let err: ExtractorError = AudioError::TimedOut { seconds: 3 }.into();
        assert_eq!(err.kind(), FailureKind::Analysis);

        let err: ExtractorError = OutputError::SameAsInput { path: "x".into() }.into();
        assert_eq!(err.kind(), FailureKind::Write);
    }

    #[test]
    fn test_every_kind_exits_non_zero() {
        for kind in [
            FailureKind::Usage,
            FailureKind::Decode,
            FailureKind::Analysis,
            FailureKind::Write,
            FailureKind::Config,
        ] {
            assert_eq!(kind.exit_code(), 1);
        }
    }

    #[test]
    fn test_user_message_is_single_line() {
        let err: ExtractorError = AudioError::LoadFailed { path: "missing.wav".into() }.into();
        let message = err.user_message();
        assert!(message.contains("missing.wav"));
        assert!(!message.contains('\n'));
    }
}
